//! Dependency-ordered contract deployment.
//!
//! A run resolves the plan order, dry-links every artifact with placeholder
//! addresses before anything is submitted, then deploys step by step. A
//! failing step either aborts the run or, when the step is marked
//! degradable, leaves a gap that dependents fill with the zero address. In
//! every outcome the caller's registry holds whatever was deployed.

pub mod deployer;
pub mod plan;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::utils::format_ether;
use alloy::primitives::{Address, Bytes, U256};
use futures::future::join_all;
use tracing::{error, info, warn};
use v3_deployer_types::Ledger;

use crate::artifact::{init_code, ArtifactSet};
use crate::config::NetworkConfig;
use crate::error::{DeployerError, DeployerResult, PlanError};
use crate::linker::link;
use crate::registry::AddressRegistry;

pub use deployer::{ConfirmationPolicy, ContractDeployer, DeployedContract};
pub use plan::{
    core_plan, encode_label, token_plan, ConstructorArg, DeploymentPlan, DeploymentStep,
    FailurePolicy,
};

/// Address used for libraries and constructor arguments during the dry run
const PLACEHOLDER_ADDRESS: Address = Address::repeat_byte(0x11);

// ============================================================================
// Outcome
// ============================================================================

/// A degradable step that was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gap {
    pub key: String,
    pub contract: String,
    pub reason: String,
}

#[derive(Debug)]
pub enum Outcome {
    /// Every step deployed
    Done,
    /// Finished with skipped steps that need manual follow-up
    Degraded { gaps: Vec<Gap> },
    /// Stopped at `stage`; earlier deployments remain on chain
    Failed { stage: String, error: DeployerError },
}

impl Outcome {
    /// Done and Degraded both count as a completed run
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Done => write!(f, "completed"),
            Outcome::Degraded { gaps } => write!(f, "completed with {} gap(s)", gaps.len()),
            Outcome::Failed { stage, error } => write!(f, "failed at {}: {}", stage, error),
        }
    }
}

/// Result of a pipeline run
#[derive(Debug)]
pub struct RunReport {
    pub outcome: Outcome,
    /// (registry key, deployment) in deployment order
    pub deployed: Vec<(String, DeployedContract)>,
    /// Keys already in the registry that were reused
    pub reused: Vec<String>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            outcome: Outcome::Done,
            deployed: Vec::new(),
            reused: Vec::new(),
        }
    }
}

// ============================================================================
// Preflight
// ============================================================================

/// Connection facts gathered before a stage runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preflight {
    pub chain_id: u64,
    pub deployer: Address,
    pub balance: U256,
}

/// Check the chain id and report the deployer's balance
pub async fn preflight(
    ledger: &dyn Ledger,
    network_name: &str,
    network: &NetworkConfig,
) -> DeployerResult<Preflight> {
    let chain_id = ledger.chain_id().await?;
    let deployer = ledger.signer();
    let balance = ledger.balance(deployer).await?;

    info!("Network: {} (chain id {})", network_name, chain_id);
    info!("Deployer: {}", deployer);
    info!("Balance: {} ETH", format_ether(balance));

    if let Some(expected) = network.expected_chain_id {
        if expected != chain_id {
            return Err(DeployerError::config(format!(
                "network {} expects chain id {} but the node reports {}",
                network_name, expected, chain_id
            )));
        }
    }

    if balance < network.min_balance_wei()? {
        warn!(
            "Low balance: {} ETH is below the {} ETH threshold; deployment may run out of funds",
            format_ether(balance),
            network.min_balance_eth
        );
    }

    Ok(Preflight {
        chain_id,
        deployer,
        balance,
    })
}

// ============================================================================
// Pipeline
// ============================================================================

/// How already-recorded keys are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Skip steps whose key is already in the registry
    #[default]
    ReuseExisting,
    /// Deploy every step again
    Force,
}

pub struct Pipeline<'a> {
    deployer: ContractDeployer,
    artifacts: &'a ArtifactSet,
}

impl<'a> Pipeline<'a> {
    pub fn new(deployer: ContractDeployer, artifacts: &'a ArtifactSet) -> Self {
        Self {
            deployer,
            artifacts,
        }
    }

    /// Execute `plan`, recording results into `registry`.
    ///
    /// Returns `Err` only for problems found before the first submission
    /// (plan errors, link errors on non-degradable steps). Once anything has
    /// been submitted the result is a report whose outcome says how the run
    /// ended.
    pub async fn run(
        &self,
        plan: &DeploymentPlan,
        registry: &mut AddressRegistry,
        mode: RunMode,
    ) -> DeployerResult<RunReport> {
        let mut report = RunReport::new();

        let satisfied: BTreeSet<String> = match mode {
            RunMode::ReuseExisting => registry.contracts.keys().cloned().collect(),
            RunMode::Force => BTreeSet::new(),
        };
        let ordered = plan.resolve_order(&satisfied)?;

        let mut gaps: BTreeMap<String, Gap> = BTreeMap::new();
        let mut pending = Vec::new();
        for step in ordered {
            if satisfied.contains(&step.key) {
                info!("Reusing {} for {} from the registry", step.key, step.contract);
                report.reused.push(step.key.clone());
                continue;
            }

            match self.dry_link(step) {
                Ok(()) => pending.push(step),
                Err(err) if step.on_failure == FailurePolicy::Degrade => {
                    warn!("{} cannot be linked and will be skipped: {}", step.contract, err);
                    gaps.insert(
                        step.key.clone(),
                        Gap {
                            key: step.key.clone(),
                            contract: step.contract.clone(),
                            reason: err.to_string(),
                        },
                    );
                    pending.push(step);
                }
                Err(err) => return Err(err),
            }
        }

        for step in pending {
            if let Some(gap) = gaps.get(&step.key) {
                record_gap(registry, gap);
                continue;
            }

            match self.deploy_step(step, registry, &gaps).await {
                Ok(deployed) => {
                    registry.record(step.key.clone(), deployed.address);
                    for dependency in step.dependencies() {
                        if gaps.contains_key(dependency) {
                            let note = format!(
                                "{} was deployed with the zero address in place of {}; redeploy it once {} exists",
                                step.contract, dependency, dependency
                            );
                            warn!("{}", note);
                            registry.mark_pending(step.key.clone(), note);
                        }
                    }
                    report.deployed.push((step.key.clone(), deployed));
                }
                Err(err) if step.on_failure == FailurePolicy::Degrade => {
                    error!("{} failed, continuing without it: {}", step.contract, err);
                    let gap = Gap {
                        key: step.key.clone(),
                        contract: step.contract.clone(),
                        reason: err.to_string(),
                    };
                    record_gap(registry, &gap);
                    gaps.insert(step.key.clone(), gap);
                }
                Err(err) => {
                    error!("{} failed: {}", step.contract, err);
                    note_unconfirmed(registry, &step.key, &err);
                    report.outcome = Outcome::Failed {
                        stage: step.contract.clone(),
                        error: err,
                    };
                    registry.touch();
                    return Ok(report);
                }
            }
        }

        if !gaps.is_empty() {
            report.outcome = Outcome::Degraded {
                gaps: gaps.into_values().collect(),
            };
        }
        registry.touch();
        Ok(report)
    }

    /// Deploy independent steps: submissions go out one by one, then all
    /// confirmations are awaited together.
    pub async fn run_batch(
        &self,
        plan: &DeploymentPlan,
        registry: &mut AddressRegistry,
    ) -> DeployerResult<RunReport> {
        let mut report = RunReport::new();

        let ordered = plan.resolve_order(&BTreeSet::new())?;
        if let Some(step) = ordered.iter().find(|step| !step.dependencies().is_empty()) {
            return Err(PlanError::UnresolvedDependency {
                step: step.key.clone(),
                dependency: step.dependencies()[0].to_string(),
            }
            .into());
        }

        let mut codes = Vec::with_capacity(ordered.len());
        for step in &ordered {
            self.dry_link(step)?;
            codes.push(self.build_init_code(step, &BTreeMap::new(), registry, &BTreeMap::new())?);
        }

        let mut submitted = Vec::new();
        let mut failure = None;
        for (step, code) in ordered.iter().zip(codes) {
            match self.deployer.submit_with_retry(&step.contract, code).await {
                Ok(pending) => submitted.push((*step, pending)),
                Err(err) => {
                    error!("{} failed: {}", step.contract, err);
                    failure = Some((step.contract.clone(), err));
                    break;
                }
            }
        }

        let confirmations = join_all(
            submitted
                .iter()
                .map(|(step, pending)| self.deployer.await_deployment(&step.contract, *pending)),
        )
        .await;

        for ((step, _), result) in submitted.iter().zip(confirmations) {
            match result {
                Ok(deployed) => {
                    registry.record(step.key.clone(), deployed.address);
                    report.deployed.push((step.key.clone(), deployed));
                }
                Err(err) => {
                    error!("{} was not confirmed: {}", step.contract, err);
                    note_unconfirmed(registry, &step.key, &err);
                    if failure.is_none() {
                        failure = Some((step.contract.clone(), err));
                    }
                }
            }
        }

        if let Some((stage, error)) = failure {
            report.outcome = Outcome::Failed { stage, error };
        } else {
            info!("All {} deployments confirmed", report.deployed.len());
        }
        registry.touch();
        Ok(report)
    }

    /// Link and encode `step` with placeholder addresses, submitting nothing
    fn dry_link(&self, step: &DeploymentStep) -> DeployerResult<()> {
        let placeholders: BTreeMap<String, Address> = step
            .libraries
            .iter()
            .map(|(symbol, _)| (symbol.clone(), PLACEHOLDER_ADDRESS))
            .collect();
        let artifact = self
            .artifacts
            .get(&step.contract)
            .ok_or_else(|| PlanError::MissingArtifact(step.contract.clone()))?;

        let linked = link(&artifact.bytecode, &artifact.link_references(), &placeholders)?;
        let args: Vec<DynSolValue> = step
            .constructor_args
            .iter()
            .map(|arg| arg.to_value(Some(PLACEHOLDER_ADDRESS)))
            .collect();
        init_code(&step.contract, &linked, &args)?;
        Ok(())
    }

    async fn deploy_step(
        &self,
        step: &DeploymentStep,
        registry: &AddressRegistry,
        gaps: &BTreeMap<String, Gap>,
    ) -> DeployerResult<DeployedContract> {
        let mut libraries = BTreeMap::new();
        for (symbol, key) in &step.libraries {
            if let Some(address) = registry.get(key) {
                libraries.insert(symbol.clone(), address);
            }
        }

        let code = self.build_init_code(step, &libraries, registry, gaps)?;
        self.deployer.deploy_with_retry(&step.contract, code).await
    }

    fn build_init_code(
        &self,
        step: &DeploymentStep,
        libraries: &BTreeMap<String, Address>,
        registry: &AddressRegistry,
        gaps: &BTreeMap<String, Gap>,
    ) -> DeployerResult<Bytes> {
        let artifact = self
            .artifacts
            .get(&step.contract)
            .ok_or_else(|| PlanError::MissingArtifact(step.contract.clone()))?;
        let linked = link(&artifact.bytecode, &artifact.link_references(), libraries)?;

        let mut args = Vec::with_capacity(step.constructor_args.len());
        for arg in &step.constructor_args {
            let resolved = match arg {
                ConstructorArg::AddressOf(key) if gaps.contains_key(key) => {
                    warn!("{} receives the zero address for missing {}", step.contract, key);
                    Some(Address::ZERO)
                }
                ConstructorArg::AddressOf(key) => Some(registry.get(key).ok_or_else(|| {
                    PlanError::UnresolvedDependency {
                        step: step.key.clone(),
                        dependency: key.clone(),
                    }
                })?),
                _ => None,
            };
            args.push(arg.to_value(resolved));
        }

        init_code(&step.contract, &linked, &args)
    }
}

fn record_gap(registry: &mut AddressRegistry, gap: &Gap) {
    let note = format!(
        "{} was not deployed ({}); deploy it manually and update its dependents",
        gap.contract, gap.reason
    );
    warn!("Manual remediation required: {}", note);
    registry.mark_pending(gap.key.clone(), note);
}

/// Leave the address of a submitted but unconfirmed creation for the operator
fn note_unconfirmed(registry: &mut AddressRegistry, key: &str, err: &DeployerError) {
    if let DeployerError::Unconfirmed {
        stage,
        address,
        tx_hash,
        ..
    } = err
    {
        let note = format!(
            "{} may exist at {} (tx {}); check the transaction before redeploying",
            stage, address, tx_hash
        );
        warn!("Manual remediation required: {}", note);
        registry.mark_pending(key.to_string(), note);
    }
}
