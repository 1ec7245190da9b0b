//! Create and initialize the configured pools

use std::str::FromStr;

use bigdecimal::BigDecimal;
use tracing::{error, info};
use v3_deployer_math::{encode_sqrt_price_x96, PoolKey};

use crate::bootstrap::{pool_registry_key, PoolBootstrapper};
use crate::error::{DeployerError, DeployerResult};
use crate::pipeline::plan::{FACTORY_KEY, POSITION_MANAGER_KEY};

use super::{Stage, StageContext, StageReport, StageStatus};

pub async fn run(ctx: &mut StageContext) -> DeployerResult<StageReport> {
    let factory = ctx.require(FACTORY_KEY)?;
    let position_manager = ctx.require(POSITION_MANAGER_KEY)?;
    info!("Factory: {}", factory);
    info!("Position manager: {}", position_manager);

    let bootstrapper = PoolBootstrapper::new(
        ctx.ledger.clone(),
        factory,
        position_manager,
        ctx.config.gas.create_pool,
        ctx.confirmation,
    );

    // Resolve every key and price up front so a bad entry fails the stage
    // before any pool is created
    let mut planned = Vec::with_capacity(ctx.config.pools.len());
    for pool in &ctx.config.pools {
        let token_a = ctx.token_address(&pool.token_a)?;
        let token_b = ctx.token_address(&pool.token_b)?;
        let key = PoolKey::new(token_a, token_b, pool.fee)?;

        // The pool price is token1 per token0
        let (reserve0, reserve1) = if key.is_token0(token_a) {
            (&pool.reserve_a, &pool.reserve_b)
        } else {
            (&pool.reserve_b, &pool.reserve_a)
        };
        let sqrt_price_x96 = encode_sqrt_price_x96(&decimal(reserve1)?, &decimal(reserve0)?)?;
        let registry_key = pool_registry_key(&pool.token_a, &pool.token_b, pool.fee);
        planned.push((registry_key, key, sqrt_price_x96));
    }

    let mut report = StageReport::new(Stage::Pools);
    let mut unresolved = Vec::new();
    for (registry_key, key, sqrt_price_x96) in planned {
        let result = bootstrapper.ensure_pool(&key, sqrt_price_x96).await;
        if result.is_resolved() {
            ctx.registry.record(registry_key.clone(), result.address);
            report.entry(registry_key, format!("{} ({})", result.address, result.creation));
        } else {
            error!("Pool {} could not be resolved", registry_key);
            report.entry(registry_key.clone(), format!("unresolved ({})", result.creation));
            unresolved.push(registry_key);
        }
    }

    ctx.save()?;

    if !unresolved.is_empty() {
        report.status = StageStatus::Failed(format!("unresolved pools: {}", unresolved.join(", ")));
    }
    Ok(report)
}

fn decimal(value: &str) -> DeployerResult<BigDecimal> {
    BigDecimal::from_str(value)
        .map_err(|e| DeployerError::config(format!("invalid reserve '{}': {}", value, e)))
}
