//! Swap an exact input amount through the router

use std::str::FromStr;

use alloy::primitives::aliases::U160;
use tracing::info;

use crate::error::{DeployerError, DeployerResult};
use crate::liquidity::{
    deadline_from_now, format_amount, parse_amount, token_balance, token_decimals, SwapRequest,
    Swapper,
};
use crate::pipeline::plan::SWAP_ROUTER_KEY;

use super::{Stage, StageContext, StageReport};

pub async fn run(ctx: &mut StageContext) -> DeployerResult<StageReport> {
    let swap = ctx.config.swap.clone();
    let router = ctx.require(SWAP_ROUTER_KEY)?;
    let token_in = ctx.token_address(&swap.token_in)?;
    let token_out = ctx.token_address(&swap.token_out)?;
    let owner = ctx.preflight.deployer;

    let ledger = ctx.ledger.clone();
    let decimals_in = token_decimals(ledger.as_ref(), token_in).await?;
    let decimals_out = token_decimals(ledger.as_ref(), token_out).await?;
    let before = token_balance(ledger.as_ref(), token_out, owner).await?;

    let sqrt_price_limit_x96 = U160::from_str(&swap.sqrt_price_limit_x96).map_err(|e| {
        DeployerError::config(format!("invalid sqrt_price_limit_x96: {}", e))
    })?;
    let request = SwapRequest {
        token_in,
        token_out,
        fee: swap.fee,
        amount_in: parse_amount(&swap.amount_in, decimals_in)?,
        amount_out_minimum: parse_amount(&swap.amount_out_minimum, decimals_out)?,
        sqrt_price_limit_x96,
        recipient: owner,
        deadline: deadline_from_now(),
    };
    info!(
        "Swapping {} {} for {} at fee {}",
        swap.amount_in, swap.token_in, swap.token_out, swap.fee
    );

    let swapper = Swapper::new(ledger.clone(), router, ctx.config.gas.swap, ctx.confirmation);
    let result = swapper.swap_exact_in(&request).await?;
    let after = token_balance(ledger.as_ref(), token_out, owner).await?;

    let mut report = StageReport::new(Stage::Swap);
    report.entry(
        format!("{} in", swap.token_in),
        format_amount(request.amount_in, decimals_in),
    );
    report.entry(
        format!("{} out (quoted)", swap.token_out),
        format_amount(result.amount_out, decimals_out),
    );
    report.entry(
        format!("{} received", swap.token_out),
        format_amount(after.saturating_sub(before), decimals_out),
    );
    report.entry(
        format!("{} balance", swap.token_out),
        format!(
            "{} -> {}",
            format_amount(before, decimals_out),
            format_amount(after, decimals_out)
        ),
    );
    report.entry("Approvals sent", result.approvals);
    report.entry("Transaction", result.tx_hash);
    Ok(report)
}
