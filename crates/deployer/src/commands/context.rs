//! Shared setup for every stage

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::Address;
use tracing::info;
use v3_deployer_types::Ledger;

use crate::artifact::ArtifactSet;
use crate::config::DeployerConfig;
use crate::error::DeployerResult;
use crate::pipeline::{preflight, ConfirmationPolicy, ContractDeployer, Preflight};
use crate::registry::{AddressRegistry, RegistryLock, RegistryStore};
use crate::rpc::RpcLedger;

/// Connected ledger plus the locked registry of one network
pub struct StageContext {
    pub config: DeployerConfig,
    pub network: String,
    pub ledger: Arc<dyn Ledger>,
    pub preflight: Preflight,
    pub confirmation: ConfirmationPolicy,
    pub store: RegistryStore,
    pub registry: AddressRegistry,
    _lock: RegistryLock,
}

impl StageContext {
    /// Connect to `network` over JSON-RPC with the configured private key
    pub async fn connect(config: DeployerConfig, network: &str) -> DeployerResult<Self> {
        let rpc_url = config.network(network)?.rpc_url.clone();
        let private_key = config.private_key()?;
        let ledger = RpcLedger::connect(&rpc_url, &private_key).await?;
        Self::open(config, network, Arc::new(ledger)).await
    }

    /// Run preflight checks, take the registry lock and load the registry
    pub async fn open(config: DeployerConfig, network: &str, ledger: Arc<dyn Ledger>) -> DeployerResult<Self> {
        let network_config = config.network(network)?.clone();
        let preflight = preflight(ledger.as_ref(), network, &network_config).await?;
        let confirmation = ConfirmationPolicy::for_chain(&config, &network_config, preflight.chain_id);
        if config.is_local_chain(preflight.chain_id) {
            info!("Local chain detected, waiting for inclusion only");
        }

        let store = RegistryStore::new(&config.registry_dir, network);
        let lock = store.lock()?;
        let registry = store.load_or_new(network, preflight.chain_id, preflight.deployer)?;
        info!(
            "Registry {} holds {} address(es)",
            store.path().display(),
            registry.contracts.len()
        );

        Ok(Self {
            config,
            network: network.to_string(),
            ledger,
            preflight,
            confirmation,
            store,
            registry,
            _lock: lock,
        })
    }

    /// Load the artifacts of `contracts` from the configured directory
    pub fn artifacts<'c>(&self, contracts: impl IntoIterator<Item = &'c str>) -> DeployerResult<ArtifactSet> {
        let mut files = BTreeMap::new();
        for contract in contracts {
            files.insert(contract.to_string(), self.config.artifact_file(contract)?.clone());
        }
        ArtifactSet::load(&self.config.artifacts.dir, &files)
    }

    pub fn contract_deployer(&self) -> ContractDeployer {
        ContractDeployer::new(self.ledger.clone(), self.confirmation, self.config.retry.clone())
    }

    /// Address recorded under `key` by an earlier stage
    pub fn require(&self, key: &str) -> DeployerResult<Address> {
        self.store.require(&self.registry, key)
    }

    /// Address of the token configured with `symbol`
    pub fn token_address(&self, symbol: &str) -> DeployerResult<Address> {
        let token = self.config.token(symbol)?;
        self.require(&token.key)
    }

    /// Write the registry back in a single atomic replace
    pub fn save(&mut self) -> DeployerResult<()> {
        self.registry.touch();
        self.store.save(&self.registry)?;
        info!("Addresses saved to {}", self.store.path().display());
        Ok(())
    }
}
