//! Idempotent pool creation.
//!
//! `ensure_pool` always asks the position manager to create and initialize
//! the pool, tolerating any failure of that call, and then takes the
//! factory's `getPool` answer as the truth. Running it again with the same
//! key converges on the same address.

use std::fmt;
use std::sync::Arc;

use alloy::primitives::aliases::{U160, U24};
use alloy::primitives::Address;
use alloy::sol_types::SolCall;
use tracing::{error, info, warn};
use v3_deployer_math::{sqrt_price_x96_to_price, PoolKey};
use v3_deployer_types::contracts::{INonfungiblePositionManager, IUniswapV3Factory};
use v3_deployer_types::{CallRequest, Ledger, LedgerError};

use crate::error::DeployerResult;
use crate::pipeline::ConfirmationPolicy;
use crate::submit::send_and_confirm;

/// What the creation call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolCreation {
    Created,
    AlreadyExists,
    /// The creation call failed; the pool may still exist
    CreationFailed(String),
}

impl fmt::Display for PoolCreation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolCreation::Created => write!(f, "created"),
            PoolCreation::AlreadyExists => write!(f, "already exists"),
            PoolCreation::CreationFailed(reason) => write!(f, "creation failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrappedPool {
    pub key: PoolKey,
    /// Zero when the factory lookup failed
    pub address: Address,
    pub creation: PoolCreation,
    pub sqrt_price_x96: U160,
}

impl BootstrappedPool {
    pub fn is_resolved(&self) -> bool {
        self.address != Address::ZERO
    }
}

pub struct PoolBootstrapper {
    ledger: Arc<dyn Ledger>,
    factory: Address,
    position_manager: Address,
    gas_limit: u64,
    confirmation: ConfirmationPolicy,
}

impl PoolBootstrapper {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        factory: Address,
        position_manager: Address,
        gas_limit: u64,
        confirmation: ConfirmationPolicy,
    ) -> Self {
        Self {
            ledger,
            factory,
            position_manager,
            gas_limit,
            confirmation,
        }
    }

    /// Create the pool if needed and return its canonical address
    pub async fn ensure_pool(&self, key: &PoolKey, sqrt_price_x96: U160) -> BootstrappedPool {
        info!(
            "Bootstrapping pool {} at price {}",
            key,
            sqrt_price_x96_to_price(sqrt_price_x96)
        );

        let existed = matches!(self.get_pool(key).await, Ok(address) if address != Address::ZERO);

        let creation = match self.create(key, sqrt_price_x96).await {
            Ok(()) if existed => PoolCreation::AlreadyExists,
            Ok(()) => PoolCreation::Created,
            Err(e) => {
                warn!("createAndInitializePoolIfNecessary failed for {}: {}", key, e);
                PoolCreation::CreationFailed(e.to_string())
            }
        };
        info!("Pool {}: {}", key, creation);

        let address = match self.get_pool(key).await {
            Ok(address) => {
                info!("Pool {} address: {}", key, address);
                address
            }
            Err(e) => {
                error!("getPool failed for {}: {}", key, e);
                Address::ZERO
            }
        };

        BootstrappedPool {
            key: *key,
            address,
            creation,
            sqrt_price_x96,
        }
    }

    async fn create(&self, key: &PoolKey, sqrt_price_x96: U160) -> DeployerResult<()> {
        let data = INonfungiblePositionManager::createAndInitializePoolIfNecessaryCall {
            token0: key.token0,
            token1: key.token1,
            fee: U24::from(key.fee),
            sqrtPriceX96: sqrt_price_x96,
        }
        .abi_encode();

        let request = CallRequest::new(self.position_manager, data).with_gas_limit(self.gas_limit);
        send_and_confirm(
            self.ledger.as_ref(),
            self.confirmation,
            &format!("create pool {}", key),
            request,
        )
        .await?;
        Ok(())
    }

    /// Ask the factory for the pool address (zero when it does not exist)
    pub async fn get_pool(&self, key: &PoolKey) -> DeployerResult<Address> {
        let data = IUniswapV3Factory::getPoolCall {
            tokenA: key.token0,
            tokenB: key.token1,
            fee: U24::from(key.fee),
        }
        .abi_encode();

        let output = self.ledger.call(self.factory, data.into()).await?;
        let pool = IUniswapV3Factory::getPoolCall::abi_decode_returns(&output)
            .map_err(LedgerError::from)?;
        Ok(pool)
    }
}

/// Registry key for a pool, e.g. `POOL_USDT_USDC_500`
pub fn pool_registry_key(symbol_a: &str, symbol_b: &str, fee: u32) -> String {
    format!(
        "POOL_{}_{}_{}",
        symbol_a.to_uppercase(),
        symbol_b.to_uppercase(),
        fee
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_registry_key() {
        assert_eq!(pool_registry_key("USDT", "usdc", 500), "POOL_USDT_USDC_500");
    }

    #[test]
    fn test_zero_address_is_unresolved() {
        let key = PoolKey::new(Address::repeat_byte(1), Address::repeat_byte(2), 500).unwrap();
        let pool = BootstrappedPool {
            key,
            address: Address::ZERO,
            creation: PoolCreation::CreationFailed("reverted".into()),
            sqrt_price_x96: v3_deployer_math::Q96,
        };
        assert!(!pool.is_resolved());
    }
}
