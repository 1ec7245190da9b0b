//! Pool bootstrapping against the simulated factory and position manager

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::sol_types::SolCall;
use v3_deployer::{ConfirmationPolicy, PoolBootstrapper, PoolCreation};
use v3_deployer_math::{encode_sqrt_price_x96_from_u128, PoolKey, Q96};
use v3_deployer_test_utils::SimulatedChain;
use v3_deployer_types::contracts::INonfungiblePositionManager;
use v3_deployer_types::{Ledger, DEFAULT_CREATE_POOL_GAS};

struct Fixture {
    chain: Arc<SimulatedChain>,
    bootstrapper: PoolBootstrapper,
    factory: Address,
    token_x: Address,
    token_y: Address,
}

fn fixture() -> Fixture {
    let chain = Arc::new(SimulatedChain::new());
    let factory = chain.install_factory();
    chain.install_router();
    let position_manager = chain.install_position_manager();
    let token_x = chain.install_token(18);
    let token_y = chain.install_token(6);

    let ledger: Arc<dyn Ledger> = chain.clone();
    let bootstrapper = PoolBootstrapper::new(
        ledger,
        factory,
        position_manager,
        DEFAULT_CREATE_POOL_GAS,
        ConfirmationPolicy {
            confirmations: 1,
            timeout: Duration::from_secs(5),
        },
    );

    Fixture {
        chain,
        bootstrapper,
        factory,
        token_x,
        token_y,
    }
}

#[tokio::test]
async fn test_ensure_pool_is_idempotent() {
    let f = fixture();
    let key = PoolKey::new(f.token_x, f.token_y, 500).unwrap();
    let price = encode_sqrt_price_x96_from_u128(1, 1).unwrap();
    assert_eq!(price, Q96);

    let first = f.bootstrapper.ensure_pool(&key, price).await;
    assert!(first.is_resolved());
    assert_eq!(first.creation, PoolCreation::Created);

    let second = f.bootstrapper.ensure_pool(&key, price).await;
    assert_eq!(second.address, first.address);
    assert_eq!(second.creation, PoolCreation::AlreadyExists);
    assert_eq!(f.chain.pools_created(), 1);
    assert_eq!(f.chain.pool(key.token0, key.token1, 500), Some(first.address));
}

#[tokio::test]
async fn test_pair_order_does_not_change_the_pool() {
    let f = fixture();
    let forward = PoolKey::new(f.token_x, f.token_y, 3000).unwrap();
    let reverse = PoolKey::new(f.token_y, f.token_x, 3000).unwrap();
    assert_eq!(forward, reverse);

    let a = f.bootstrapper.ensure_pool(&forward, Q96).await;
    let b = f.bootstrapper.ensure_pool(&reverse, Q96).await;
    assert_eq!(a.address, b.address);
    assert_eq!(f.chain.pools_created(), 1);
}

#[tokio::test]
async fn test_fee_tiers_are_separate_pools() {
    let f = fixture();
    let low = f
        .bootstrapper
        .ensure_pool(&PoolKey::new(f.token_x, f.token_y, 500).unwrap(), Q96)
        .await;
    let medium = f
        .bootstrapper
        .ensure_pool(&PoolKey::new(f.token_x, f.token_y, 3000).unwrap(), Q96)
        .await;

    assert_ne!(low.address, medium.address);
    assert_eq!(f.chain.pools_created(), 2);
}

#[tokio::test]
async fn test_failed_lookup_reports_zero_address() {
    let f = fixture();
    f.chain.fail_reads_to(f.factory);
    let key = PoolKey::new(f.token_x, f.token_y, 500).unwrap();

    let pool = f.bootstrapper.ensure_pool(&key, Q96).await;

    assert_eq!(pool.address, Address::ZERO);
    assert!(!pool.is_resolved());
    // The creation itself went through; only the lookup failed
    assert_eq!(f.chain.pools_created(), 1);
}

#[tokio::test]
async fn test_creation_failure_is_tolerated() {
    let f = fixture();
    let key = PoolKey::new(f.token_x, f.token_y, 500).unwrap();
    f.bootstrapper.ensure_pool(&key, Q96).await;

    f.chain.revert_sends_with_selector(
        INonfungiblePositionManager::createAndInitializePoolIfNecessaryCall::SELECTOR,
    );
    let again = f.bootstrapper.ensure_pool(&key, Q96).await;

    assert!(matches!(again.creation, PoolCreation::CreationFailed(_)));
    assert!(again.is_resolved());
    assert_eq!(again.address, f.bootstrapper.get_pool(&key).await.unwrap());
}
