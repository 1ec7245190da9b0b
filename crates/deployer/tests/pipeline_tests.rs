//! Deployment pipeline integration tests against the simulated chain

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use serde_json::Value;
use v3_deployer::pipeline::plan::{
    FACTORY_KEY, NFT_DESCRIPTOR_KEY, POSITION_DESCRIPTOR_KEY, POSITION_MANAGER_KEY,
    SWAP_ROUTER_KEY, WETH_KEY,
};
use v3_deployer::pipeline::{core_plan, token_plan, DeploymentStep};
use v3_deployer::{
    AddressRegistry, ArtifactSet, ConfirmationPolicy, ContractArtifact, ContractDeployer,
    DeployerError, DeploymentPlan, LinkError, Outcome, Pipeline, PlanError, RetryPolicy, RunMode,
};
use v3_deployer::config::TokenConfig;
use v3_deployer_test_utils::constants::{DEPLOYER, OPAQUE_KIND, ROUTER_KIND, SIMULATED_CHAIN_ID};
use v3_deployer_test_utils::{
    core_artifacts, linked_artifact_json, tagged_code, token_artifacts, SimulatedChain,
};
use v3_deployer_types::{Ledger, LedgerError};

fn artifact_set(artifacts: &[(String, Value)]) -> ArtifactSet {
    let mut set = ArtifactSet::default();
    for (name, json) in artifacts {
        set.insert(name.clone(), ContractArtifact::from_json(&json.to_string()).unwrap());
    }
    set
}

fn deployer_for(chain: &Arc<SimulatedChain>) -> ContractDeployer {
    let ledger: Arc<dyn Ledger> = chain.clone();
    ContractDeployer::new(
        ledger,
        ConfirmationPolicy {
            confirmations: 1,
            timeout: Duration::from_secs(5),
        },
        RetryPolicy::immediate(3),
    )
}

fn registry() -> AddressRegistry {
    AddressRegistry::new("localhost", SIMULATED_CHAIN_ID, DEPLOYER)
}

/// Address passed as the `index`th constructor word after `code_len` bytes of code
fn constructor_address(init_code: &[u8], code_len: usize, index: usize) -> Address {
    let start = code_len + index * 32 + 12;
    Address::from_slice(&init_code[start..start + 20])
}

#[tokio::test]
async fn test_core_plan_deploys_in_dependency_order() {
    let chain = Arc::new(SimulatedChain::new());
    let artifacts = artifact_set(&core_artifacts());
    let pipeline = Pipeline::new(deployer_for(&chain), &artifacts);
    let mut registry = registry();

    let report = pipeline
        .run(&core_plan("ETH"), &mut registry, RunMode::ReuseExisting)
        .await
        .unwrap();

    assert!(matches!(report.outcome, Outcome::Done));
    assert_eq!(report.deployed.len(), 6);
    for (index, key) in [
        WETH_KEY,
        FACTORY_KEY,
        SWAP_ROUTER_KEY,
        NFT_DESCRIPTOR_KEY,
        POSITION_DESCRIPTOR_KEY,
        POSITION_MANAGER_KEY,
    ]
    .iter()
    .enumerate()
    {
        assert_eq!(registry.get(key), Some(DEPLOYER.create(index as u64)));
    }

    // The descriptor was linked against the deployed library
    let deployments = chain.deployments();
    let descriptor_code = &deployments[4];
    let library = registry.get(NFT_DESCRIPTOR_KEY).unwrap();
    assert_eq!(&descriptor_code[8..28], library.as_slice());

    // The router received (factory, weth)
    let router_code = &deployments[2];
    assert_eq!(constructor_address(router_code, 8, 0), registry.get(FACTORY_KEY).unwrap());
    assert_eq!(constructor_address(router_code, 8, 1), registry.get(WETH_KEY).unwrap());
    assert!(registry.pending_remediation.is_empty());
}

#[tokio::test]
async fn test_retry_succeeds_on_third_attempt() {
    let chain = Arc::new(SimulatedChain::new());
    chain.fail_next_deploys(2, LedgerError::Rejected("nonce too low".into()));

    let artifacts = artifact_set(&core_artifacts());
    let pipeline = Pipeline::new(deployer_for(&chain), &artifacts);
    let mut registry = registry();

    let report = pipeline
        .run(&core_plan(""), &mut registry, RunMode::ReuseExisting)
        .await
        .unwrap();

    assert!(matches!(report.outcome, Outcome::Done));
    // Rejected submissions never reached the chain, so WETH9 still got nonce 0
    assert_eq!(registry.get(WETH_KEY), Some(DEPLOYER.create(0)));
    assert_eq!(chain.deployments().len(), 6);
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_run_and_keep_earlier_deployments() {
    let chain = Arc::new(SimulatedChain::new());
    chain.reject_code_with_prefix(&tagged_code(ROUTER_KIND));

    let artifacts = artifact_set(&core_artifacts());
    let pipeline = Pipeline::new(deployer_for(&chain), &artifacts);
    let mut registry = registry();

    let report = pipeline
        .run(&core_plan(""), &mut registry, RunMode::ReuseExisting)
        .await
        .unwrap();

    match &report.outcome {
        Outcome::Failed { stage, error } => {
            assert_eq!(stage, "SwapRouter");
            assert!(matches!(
                error,
                DeployerError::Deployment { attempts: 3, .. }
            ));
        }
        other => panic!("expected failure, got {}", other),
    }
    assert_eq!(report.deployed.len(), 2);
    assert!(registry.contains(WETH_KEY));
    assert!(registry.contains(FACTORY_KEY));
    assert!(!registry.contains(SWAP_ROUTER_KEY));
    assert!(!registry.contains(POSITION_MANAGER_KEY));
}

#[tokio::test]
async fn test_unlinkable_descriptor_degrades_to_zero_address() {
    let chain = Arc::new(SimulatedChain::new());
    let mut artifacts = core_artifacts();
    for (name, json) in artifacts.iter_mut() {
        if name == "NonfungibleTokenPositionDescriptor" {
            *json = linked_artifact_json(name, "NFTDescriptorV2");
        }
    }
    let artifacts = artifact_set(&artifacts);
    let pipeline = Pipeline::new(deployer_for(&chain), &artifacts);
    let mut registry = registry();

    let report = pipeline
        .run(&core_plan(""), &mut registry, RunMode::ReuseExisting)
        .await
        .unwrap();

    match &report.outcome {
        Outcome::Degraded { gaps } => {
            assert_eq!(gaps.len(), 1);
            assert_eq!(gaps[0].key, POSITION_DESCRIPTOR_KEY);
            assert!(gaps[0].reason.contains("NFTDescriptorV2"));
        }
        other => panic!("expected degraded run, got {}", other),
    }
    assert!(report.outcome.is_success());

    // Five deployments: the descriptor was skipped, the manager still deployed
    assert_eq!(chain.deployments().len(), 5);
    assert!(!registry.contains(POSITION_DESCRIPTOR_KEY));
    let manager_code = chain.deployments().pop().unwrap();
    assert_eq!(constructor_address(&manager_code, 8, 2), Address::ZERO);

    assert!(registry.pending_remediation.contains_key(POSITION_DESCRIPTOR_KEY));
    assert!(registry.pending_remediation.contains_key(POSITION_MANAGER_KEY));
}

#[tokio::test]
async fn test_rejected_descriptor_deployment_degrades() {
    let chain = Arc::new(SimulatedChain::new());
    // The descriptor is the only opaque contract followed by the library address
    let mut prefix = tagged_code(OPAQUE_KIND);
    prefix.extend_from_slice(DEPLOYER.create(3).as_slice());
    chain.reject_code_with_prefix(&prefix);

    let artifacts = artifact_set(&core_artifacts());
    let pipeline = Pipeline::new(deployer_for(&chain), &artifacts);
    let mut registry = registry();

    let report = pipeline
        .run(&core_plan(""), &mut registry, RunMode::ReuseExisting)
        .await
        .unwrap();

    assert!(matches!(report.outcome, Outcome::Degraded { .. }));
    assert!(registry.contains(POSITION_MANAGER_KEY));
    assert!(!registry.contains(POSITION_DESCRIPTOR_KEY));
}

#[tokio::test]
async fn test_link_failure_on_required_step_aborts_before_submitting() {
    let chain = Arc::new(SimulatedChain::new());
    let mut artifacts = core_artifacts();
    for (name, json) in artifacts.iter_mut() {
        if name == "SwapRouter" {
            *json = linked_artifact_json(name, "PoolAddress");
        }
    }
    let artifacts = artifact_set(&artifacts);
    let pipeline = Pipeline::new(deployer_for(&chain), &artifacts);
    let mut registry = registry();

    let result = pipeline
        .run(&core_plan(""), &mut registry, RunMode::ReuseExisting)
        .await;

    assert!(matches!(
        result,
        Err(DeployerError::Link(LinkError::MissingLinkSymbol { ref symbol })) if symbol == "PoolAddress"
    ));
    assert!(chain.deployments().is_empty());
    assert!(registry.contracts.is_empty());
}

#[tokio::test]
async fn test_existing_entries_are_reused_unless_forced() {
    let chain = Arc::new(SimulatedChain::new());
    let artifacts = artifact_set(&core_artifacts());
    let pipeline = Pipeline::new(deployer_for(&chain), &artifacts);
    let mut registry = registry();

    pipeline
        .run(&core_plan(""), &mut registry, RunMode::ReuseExisting)
        .await
        .unwrap();
    let first = registry.clone();

    let again = pipeline
        .run(&core_plan(""), &mut registry, RunMode::ReuseExisting)
        .await
        .unwrap();
    assert!(again.deployed.is_empty());
    assert_eq!(again.reused.len(), 6);
    assert_eq!(registry.contracts, first.contracts);
    assert_eq!(chain.deployments().len(), 6);

    let forced = pipeline
        .run(&core_plan(""), &mut registry, RunMode::Force)
        .await
        .unwrap();
    assert_eq!(forced.deployed.len(), 6);
    assert_ne!(registry.get(WETH_KEY), first.get(WETH_KEY));
}

#[tokio::test]
async fn test_plan_errors_are_reported_before_any_deployment() {
    let chain = Arc::new(SimulatedChain::new());
    let artifacts = artifact_set(&core_artifacts());
    let pipeline = Pipeline::new(deployer_for(&chain), &artifacts);

    let unknown_dependency = DeploymentPlan::new()
        .step(DeploymentStep::new(SWAP_ROUTER_KEY, "SwapRouter").address_of(FACTORY_KEY));
    let result = pipeline
        .run(&unknown_dependency, &mut registry(), RunMode::ReuseExisting)
        .await;
    assert!(matches!(
        result,
        Err(DeployerError::Plan(PlanError::UnresolvedDependency { .. }))
    ));

    let missing_artifact = DeploymentPlan::new().step(DeploymentStep::new("QUOTER_ADDRESS", "Quoter"));
    let result = pipeline
        .run(&missing_artifact, &mut registry(), RunMode::ReuseExisting)
        .await;
    assert!(matches!(
        result,
        Err(DeployerError::Plan(PlanError::MissingArtifact(ref name))) if name == "Quoter"
    ));

    assert!(chain.deployments().is_empty());
}

#[tokio::test]
async fn test_stalled_confirmation_times_out() {
    let chain = Arc::new(SimulatedChain::with_chain_id(11_155_111));
    chain.stall_confirmations(true);

    let ledger: Arc<dyn Ledger> = chain.clone();
    let deployer = ContractDeployer::new(
        ledger,
        ConfirmationPolicy {
            confirmations: 2,
            timeout: Duration::from_millis(50),
        },
        RetryPolicy::immediate(3),
    );
    let artifacts = artifact_set(&core_artifacts());
    let pipeline = Pipeline::new(deployer, &artifacts);
    let mut registry = registry();

    let report = pipeline
        .run(&core_plan(""), &mut registry, RunMode::ReuseExisting)
        .await
        .unwrap();

    match &report.outcome {
        Outcome::Failed { stage, error } => {
            assert_eq!(stage, "WETH9");
            match error {
                DeployerError::Unconfirmed { address, source, .. } => {
                    assert_eq!(*address, DEPLOYER.create(0));
                    assert!(matches!(
                        **source,
                        DeployerError::ConfirmationTimeout { confirmations: 2, .. }
                    ));
                }
                other => panic!("expected an unconfirmed deployment, got {}", other),
            }
        }
        other => panic!("expected timeout, got {}", other),
    }
    // A timeout is not retried: only one submission went out
    assert_eq!(chain.deployments().len(), 1);
    assert!(!registry.contains(WETH_KEY));
    assert!(registry.pending_remediation[WETH_KEY].contains(&DEPLOYER.create(0).to_string()));
}

#[tokio::test]
async fn test_receipt_error_after_submission_waits_on_the_same_transaction() {
    let chain = Arc::new(SimulatedChain::new());
    chain.fail_next_receipt_waits(1, LedgerError::Transport("header not found".into()));

    let artifacts = artifact_set(&core_artifacts());
    let pipeline = Pipeline::new(deployer_for(&chain), &artifacts);
    let mut registry = registry();

    let report = pipeline
        .run(&core_plan(""), &mut registry, RunMode::ReuseExisting)
        .await
        .unwrap();

    assert!(matches!(report.outcome, Outcome::Done));
    // The mined WETH9 was not deployed a second time
    assert_eq!(chain.deployments().len(), 6);
    assert_eq!(registry.contracts.len(), 6);
    assert_eq!(registry.get(WETH_KEY), Some(DEPLOYER.create(0)));
    assert_eq!(registry.get(FACTORY_KEY), Some(DEPLOYER.create(1)));
    assert!(registry.pending_remediation.is_empty());
}

#[tokio::test]
async fn test_unconfirmable_submission_is_left_for_remediation() {
    let chain = Arc::new(SimulatedChain::new());
    chain.fail_next_receipt_waits(3, LedgerError::Transport("connection reset".into()));

    let artifacts = artifact_set(&core_artifacts());
    let pipeline = Pipeline::new(deployer_for(&chain), &artifacts);
    let mut registry = registry();

    let report = pipeline
        .run(&core_plan(""), &mut registry, RunMode::ReuseExisting)
        .await
        .unwrap();

    match &report.outcome {
        Outcome::Failed { stage, error } => {
            assert_eq!(stage, "WETH9");
            assert!(matches!(error, DeployerError::Unconfirmed { .. }));
            assert!(!error.is_retryable());
        }
        other => panic!("expected failure, got {}", other),
    }
    assert_eq!(chain.deployments().len(), 1);
    assert!(registry.contracts.is_empty());
    assert!(registry.pending_remediation[WETH_KEY].contains(&DEPLOYER.create(0).to_string()));
}

#[tokio::test]
async fn test_token_batch_records_every_token() {
    let chain = Arc::new(SimulatedChain::new());
    let artifacts = artifact_set(&token_artifacts(&[("Tether", 6), ("UsdCoin", 6), ("WrappedBitcoin", 8)]));
    let pipeline = Pipeline::new(deployer_for(&chain), &artifacts);
    let mut registry = registry();

    let tokens: Vec<TokenConfig> = [
        ("TETHER_ADDRESS", "Tether", "USDT"),
        ("USDC_ADDRESS", "UsdCoin", "USDC"),
        ("WRAPPED_BITCOIN_ADDRESS", "WrappedBitcoin", "WBTC"),
    ]
    .iter()
    .map(|(key, contract, symbol)| TokenConfig {
        key: key.to_string(),
        contract: contract.to_string(),
        symbol: symbol.to_string(),
        mint_amount: "100000".to_string(),
    })
    .collect();

    let report = pipeline.run_batch(&token_plan(&tokens), &mut registry).await.unwrap();

    assert!(matches!(report.outcome, Outcome::Done));
    assert_eq!(report.deployed.len(), 3);
    assert_eq!(registry.get("TETHER_ADDRESS"), Some(DEPLOYER.create(0)));
    assert_eq!(registry.get("USDC_ADDRESS"), Some(DEPLOYER.create(1)));
    assert_eq!(registry.get("WRAPPED_BITCOIN_ADDRESS"), Some(DEPLOYER.create(2)));
}
