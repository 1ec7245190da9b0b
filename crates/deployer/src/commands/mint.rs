//! Mint a liquidity position through the position manager

use tracing::info;

use crate::error::DeployerResult;
use crate::liquidity::{
    deadline_from_now, format_amount, parse_amount, token_decimals, PositionMinter, PositionRequest,
};
use crate::pipeline::plan::POSITION_MANAGER_KEY;

use super::{Stage, StageContext, StageReport};

pub async fn run(ctx: &mut StageContext) -> DeployerResult<StageReport> {
    let position = ctx.config.position.clone();
    let position_manager = ctx.require(POSITION_MANAGER_KEY)?;
    let token_a = ctx.token_address(&position.token_a)?;
    let token_b = ctx.token_address(&position.token_b)?;

    let ledger = ctx.ledger.clone();
    let decimals_a = token_decimals(ledger.as_ref(), token_a).await?;
    let decimals_b = token_decimals(ledger.as_ref(), token_b).await?;

    let request = PositionRequest {
        token_a,
        token_b,
        fee: position.fee,
        tick_lower: position.tick_lower,
        tick_upper: position.tick_upper,
        amount_a: parse_amount(&position.amount_a, decimals_a)?,
        amount_b: parse_amount(&position.amount_b, decimals_b)?,
        amount_a_min: parse_amount(&position.amount_a_min, decimals_a)?,
        amount_b_min: parse_amount(&position.amount_b_min, decimals_b)?,
        recipient: ctx.preflight.deployer,
        deadline: deadline_from_now(),
    };
    info!(
        "Minting {} {} + {} {} at fee {}",
        position.amount_a, position.token_a, position.amount_b, position.token_b, position.fee
    );

    let minter = PositionMinter::new(ledger, position_manager, ctx.config.gas.mint, ctx.confirmation);
    let minted = minter.mint_position(&request).await?;

    // amount0/amount1 follow the pool's token order
    let (decimals0, decimals1) = if token_a < token_b {
        (decimals_a, decimals_b)
    } else {
        (decimals_b, decimals_a)
    };

    // Receipts carry no logs here, so these are the values quoted before sending
    let mut report = StageReport::new(Stage::Mint);
    report.entry("Position id (quoted)", minted.token_id);
    report.entry("Liquidity (quoted)", minted.liquidity);
    report.entry("Amount0 (quoted)", format_amount(minted.amount0, decimals0));
    report.entry("Amount1 (quoted)", format_amount(minted.amount1, decimals1));
    report.entry("Approvals sent", minted.approvals);
    report.entry("Transaction", minted.tx_hash);
    Ok(report)
}
