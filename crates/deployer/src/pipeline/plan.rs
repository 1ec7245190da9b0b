//! Deployment plans: ordered steps with declared dependencies

use std::collections::{BTreeMap, BTreeSet};

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::config::TokenConfig;
use crate::error::PlanError;

// ============================================================================
// Registry keys
// ============================================================================

pub const WETH_KEY: &str = "WETH_ADDRESS";
pub const FACTORY_KEY: &str = "FACTORY_ADDRESS";
pub const SWAP_ROUTER_KEY: &str = "SWAP_ROUTER_ADDRESS";
pub const NFT_DESCRIPTOR_KEY: &str = "NFT_DESCRIPTOR_ADDRESS";
pub const POSITION_DESCRIPTOR_KEY: &str = "POSITION_DESCRIPTOR_ADDRESS";
pub const POSITION_MANAGER_KEY: &str = "POSITION_MANAGER_ADDRESS";

// ============================================================================
// Steps
// ============================================================================

/// One constructor parameter, resolved just before submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstructorArg {
    /// Address recorded under a registry key by this run or an earlier one
    AddressOf(String),
    Address(Address),
    Bytes32(B256),
    Uint(U256),
}

impl ConstructorArg {
    /// ABI value given the address resolved for `AddressOf`
    pub fn to_value(&self, resolved: Option<Address>) -> DynSolValue {
        match self {
            ConstructorArg::AddressOf(_) => DynSolValue::Address(resolved.unwrap_or(Address::ZERO)),
            ConstructorArg::Address(address) => DynSolValue::Address(*address),
            ConstructorArg::Bytes32(word) => DynSolValue::FixedBytes(*word, 32),
            ConstructorArg::Uint(value) => DynSolValue::Uint(*value, 256),
        }
    }
}

/// What a failing step does to the rest of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Stop the run
    Abort,
    /// Record a gap and continue; dependents receive the zero address
    Degrade,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentStep {
    /// Registry key the deployed address is recorded under
    pub key: String,
    /// Artifact name
    pub contract: String,
    pub constructor_args: Vec<ConstructorArg>,
    /// (library symbol, registry key of the deployed library)
    pub libraries: Vec<(String, String)>,
    pub on_failure: FailurePolicy,
}

impl DeploymentStep {
    pub fn new(key: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            contract: contract.into(),
            constructor_args: Vec::new(),
            libraries: Vec::new(),
            on_failure: FailurePolicy::Abort,
        }
    }

    pub fn arg(mut self, arg: ConstructorArg) -> Self {
        self.constructor_args.push(arg);
        self
    }

    pub fn address_of(self, key: impl Into<String>) -> Self {
        self.arg(ConstructorArg::AddressOf(key.into()))
    }

    pub fn link(mut self, symbol: impl Into<String>, key: impl Into<String>) -> Self {
        self.libraries.push((symbol.into(), key.into()));
        self
    }

    pub fn degradable(mut self) -> Self {
        self.on_failure = FailurePolicy::Degrade;
        self
    }

    /// Registry keys this step needs before it can be submitted
    pub fn dependencies(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .constructor_args
            .iter()
            .filter_map(|arg| match arg {
                ConstructorArg::AddressOf(key) => Some(key.as_str()),
                _ => None,
            })
            .chain(self.libraries.iter().map(|(_, key)| key.as_str()))
            .collect();
        keys.dedup();
        keys
    }
}

// ============================================================================
// Plans
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentPlan {
    steps: Vec<DeploymentStep>,
}

impl DeploymentPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: DeploymentStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[DeploymentStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Order the steps so every dependency precedes its dependents.
    ///
    /// Keys in `satisfied` (already in the registry) count as available.
    /// Among steps whose dependencies are met, declaration order wins, so a
    /// plan that is already ordered comes back unchanged.
    pub fn resolve_order(&self, satisfied: &BTreeSet<String>) -> Result<Vec<&DeploymentStep>, PlanError> {
        let mut by_key: BTreeMap<&str, usize> = BTreeMap::new();
        for (index, step) in self.steps.iter().enumerate() {
            if by_key.insert(step.key.as_str(), index).is_some() {
                return Err(PlanError::DuplicateKey(step.key.clone()));
            }
        }

        for step in &self.steps {
            for dependency in step.dependencies() {
                if !by_key.contains_key(dependency) && !satisfied.contains(dependency) {
                    return Err(PlanError::UnresolvedDependency {
                        step: step.key.clone(),
                        dependency: dependency.to_string(),
                    });
                }
            }
        }

        let mut placed = vec![false; self.steps.len()];
        let mut ordered = Vec::with_capacity(self.steps.len());

        while ordered.len() < self.steps.len() {
            let next = self.steps.iter().enumerate().find(|(index, step)| {
                !placed[*index]
                    && step.dependencies().iter().all(|dependency| match by_key.get(dependency) {
                        Some(&producer) => placed[producer],
                        None => true,
                    })
            });

            match next {
                Some((index, step)) => {
                    placed[index] = true;
                    ordered.push(step);
                }
                None => {
                    let remaining = self
                        .steps
                        .iter()
                        .enumerate()
                        .filter(|(index, _)| !placed[*index])
                        .map(|(_, step)| step.key.clone())
                        .collect();
                    return Err(PlanError::Cycle(remaining));
                }
            }
        }

        Ok(ordered)
    }
}

/// Right-pad a short label into a bytes32 word
pub fn encode_label(label: &str) -> B256 {
    let mut word = [0u8; 32];
    let bytes = label.as_bytes();
    let len = bytes.len().min(32);
    word[..len].copy_from_slice(&bytes[..len]);
    B256::from(word)
}

/// Core periphery deployment.
///
/// The position descriptor is the only step allowed to degrade: without it
/// the position manager still works, it just cannot render token URIs.
pub fn core_plan(native_currency_label: &str) -> DeploymentPlan {
    DeploymentPlan::new()
        .step(DeploymentStep::new(WETH_KEY, "WETH9"))
        .step(DeploymentStep::new(FACTORY_KEY, "UniswapV3Factory"))
        .step(
            DeploymentStep::new(SWAP_ROUTER_KEY, "SwapRouter")
                .address_of(FACTORY_KEY)
                .address_of(WETH_KEY),
        )
        .step(DeploymentStep::new(NFT_DESCRIPTOR_KEY, "NFTDescriptor"))
        .step(
            DeploymentStep::new(POSITION_DESCRIPTOR_KEY, "NonfungibleTokenPositionDescriptor")
                .address_of(WETH_KEY)
                .arg(ConstructorArg::Bytes32(encode_label(native_currency_label)))
                .link("NFTDescriptor", NFT_DESCRIPTOR_KEY)
                .degradable(),
        )
        .step(
            DeploymentStep::new(POSITION_MANAGER_KEY, "NonfungiblePositionManager")
                .address_of(FACTORY_KEY)
                .address_of(WETH_KEY)
                .address_of(POSITION_DESCRIPTOR_KEY),
        )
}

/// Independent token deployments
pub fn token_plan(tokens: &[TokenConfig]) -> DeploymentPlan {
    tokens.iter().fold(DeploymentPlan::new(), |plan, token| {
        plan.step(DeploymentStep::new(token.key.clone(), token.contract.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(steps: &[&DeploymentStep]) -> Vec<String> {
        steps.iter().map(|s| s.key.clone()).collect()
    }

    #[test]
    fn test_core_plan_order_is_preserved() {
        let plan = core_plan("ETH");
        let ordered = plan.resolve_order(&BTreeSet::new()).unwrap();
        assert_eq!(
            keys(&ordered),
            vec![
                WETH_KEY,
                FACTORY_KEY,
                SWAP_ROUTER_KEY,
                NFT_DESCRIPTOR_KEY,
                POSITION_DESCRIPTOR_KEY,
                POSITION_MANAGER_KEY
            ]
        );
    }

    #[test]
    fn test_dependencies_are_hoisted() {
        let plan = DeploymentPlan::new()
            .step(DeploymentStep::new("ROUTER", "SwapRouter").address_of("FACTORY"))
            .step(DeploymentStep::new("FACTORY", "UniswapV3Factory"))
            .step(DeploymentStep::new("WETH", "WETH9"));

        let ordered = plan.resolve_order(&BTreeSet::new()).unwrap();
        assert_eq!(keys(&ordered), vec!["FACTORY", "ROUTER", "WETH"]);
    }

    #[test]
    fn test_registry_entries_satisfy_dependencies() {
        let plan = DeploymentPlan::new()
            .step(DeploymentStep::new("ROUTER", "SwapRouter").address_of("FACTORY"));

        assert!(matches!(
            plan.resolve_order(&BTreeSet::new()),
            Err(PlanError::UnresolvedDependency { .. })
        ));

        let satisfied: BTreeSet<String> = ["FACTORY".to_string()].into_iter().collect();
        assert_eq!(plan.resolve_order(&satisfied).unwrap().len(), 1);
    }

    #[test]
    fn test_cycle_detected() {
        let plan = DeploymentPlan::new()
            .step(DeploymentStep::new("A", "A").address_of("B"))
            .step(DeploymentStep::new("B", "B").address_of("A"))
            .step(DeploymentStep::new("C", "C"));

        match plan.resolve_order(&BTreeSet::new()) {
            Err(PlanError::Cycle(remaining)) => assert_eq!(remaining, vec!["A", "B"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let plan = DeploymentPlan::new()
            .step(DeploymentStep::new("A", "WETH9"))
            .step(DeploymentStep::new("A", "WETH9"));
        assert_eq!(
            plan.resolve_order(&BTreeSet::new()),
            Err(PlanError::DuplicateKey("A".into()))
        );
    }

    #[test]
    fn test_descriptor_step_links_and_degrades() {
        let plan = core_plan("ETH");
        let descriptor = &plan.steps()[4];
        assert_eq!(descriptor.on_failure, FailurePolicy::Degrade);
        assert_eq!(descriptor.dependencies(), vec![WETH_KEY, NFT_DESCRIPTOR_KEY]);
        assert_eq!(
            descriptor.constructor_args[1],
            ConstructorArg::Bytes32(encode_label("ETH"))
        );
    }

    #[test]
    fn test_encode_label() {
        let word = encode_label("ETH");
        assert_eq!(&word[..3], b"ETH");
        assert!(word[3..].iter().all(|b| *b == 0));
        assert_eq!(encode_label(""), B256::ZERO);
    }
}
