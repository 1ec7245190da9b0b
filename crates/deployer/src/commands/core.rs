//! Deploy the exchange core and periphery contracts

use tracing::info;

use crate::config::CORE_CONTRACTS;
use crate::error::DeployerResult;
use crate::pipeline::{core_plan, Pipeline, RunMode};

use super::{Stage, StageContext, StageReport};

pub async fn run(ctx: &mut StageContext, mode: RunMode) -> DeployerResult<StageReport> {
    info!("Deploying core contracts to {}", ctx.network);
    if mode == RunMode::Force {
        info!("Force mode: existing registry entries will be redeployed");
    }

    let artifacts = ctx.artifacts(CORE_CONTRACTS)?;
    let plan = core_plan(&ctx.config.native_currency_label);
    let pipeline = Pipeline::new(ctx.contract_deployer(), &artifacts);

    let run = pipeline.run(&plan, &mut ctx.registry, mode).await?;
    ctx.save()?;

    let mut report = StageReport::new(Stage::Core).with_outcome(&run);
    for step in plan.steps() {
        match ctx.registry.get(&step.key) {
            Some(address) if run.reused.contains(&step.key) => {
                report.entry(&step.key, format!("{} (reused)", address))
            }
            Some(address) => report.entry(&step.key, address),
            None => report.entry(&step.key, "not deployed"),
        }
    }
    for (key, note) in &ctx.registry.pending_remediation {
        report.entry(format!("{} pending", key), note);
    }
    Ok(report)
}
