//! Deploy the test tokens and mint an initial supply to the deployer

use alloy::sol_types::SolCall;
use tracing::info;
use v3_deployer_types::contracts::IMintableToken;
use v3_deployer_types::CallRequest;

use crate::error::DeployerResult;
use crate::liquidity::{format_amount, parse_amount, token_balance, token_decimals};
use crate::pipeline::{token_plan, Outcome, Pipeline};
use crate::retry::retry;
use crate::submit::send_and_confirm;

use super::{Stage, StageContext, StageReport};

pub async fn run(ctx: &mut StageContext) -> DeployerResult<StageReport> {
    let tokens = ctx.config.tokens.clone();
    info!("Deploying {} token(s) to {}", tokens.len(), ctx.network);

    let artifacts = ctx.artifacts(tokens.iter().map(|token| token.contract.as_str()))?;
    let plan = token_plan(&tokens);
    let pipeline = Pipeline::new(ctx.contract_deployer(), &artifacts);

    let run = pipeline.run_batch(&plan, &mut ctx.registry).await?;
    ctx.save()?;

    let mut report = StageReport::new(Stage::Tokens).with_outcome(&run);
    if matches!(run.outcome, Outcome::Failed { .. }) {
        for (key, deployed) in &run.deployed {
            report.entry(key, deployed.address);
        }
        return Ok(report);
    }

    let ledger = ctx.ledger.clone();
    let owner = ctx.preflight.deployer;
    for token in &tokens {
        let address = ctx.require(&token.key)?;
        let decimals = token_decimals(ledger.as_ref(), address).await?;
        let amount = parse_amount(&token.mint_amount, decimals)?;

        if !amount.is_zero() {
            info!("Minting {} {} to {}", token.mint_amount, token.symbol, owner);
            let data = IMintableToken::mintCall { to: owner, amount }.abi_encode();
            let context = format!("mint {}", token.symbol);
            retry(&ctx.config.retry, &context, |_| {
                send_and_confirm(
                    ledger.as_ref(),
                    ctx.confirmation,
                    &context,
                    CallRequest::new(address, data.clone()),
                )
            })
            .await?;
        }

        let balance = token_balance(ledger.as_ref(), address, owner).await?;
        report.entry(&token.key, address);
        report.entry(
            format!("{} balance", token.symbol),
            format_amount(balance, decimals),
        );
    }

    Ok(report)
}
