//! Per-network address registry persisted as JSON.
//!
//! The registry file is the only channel between stages: every stage loads
//! it, appends what it deployed and writes it back once. Writes go through a
//! temporary file in the same directory followed by a rename, so readers see
//! either the previous or the new contents and never a partial file. A lock
//! file next to the registry keeps two runs against the same network from
//! interleaving their read-modify-write cycles.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{DeployerError, DeployerResult};

/// Addresses recorded for one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRegistry {
    pub network: String,
    pub chain_id: u64,
    pub deployer: Address,
    pub contracts: BTreeMap<String, Address>,
    /// Manual follow-ups left by degraded runs, keyed by the skipped entry
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pending_remediation: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl AddressRegistry {
    pub fn new(network: impl Into<String>, chain_id: u64, deployer: Address) -> Self {
        Self {
            network: network.into(),
            chain_id,
            deployer,
            contracts: BTreeMap::new(),
            pending_remediation: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Address> {
        self.contracts.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.contracts.contains_key(key)
    }

    /// Record an address, replacing (and warning about) any previous entry
    pub fn record(&mut self, key: impl Into<String>, address: Address) {
        let key = key.into();
        if let Some(previous) = self.contracts.insert(key.clone(), address) {
            if previous != address {
                warn!("Registry entry {} replaced: {} -> {}", key, previous, address);
            }
        }
        self.pending_remediation.remove(&key);
    }

    pub fn mark_pending(&mut self, key: impl Into<String>, note: impl Into<String>) {
        self.pending_remediation.insert(key.into(), note.into());
    }

    pub fn touch(&mut self) {
        self.timestamp = Utc::now();
    }
}

/// Location and I/O for one network's registry file
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(dir: impl AsRef<Path>, network: &str) -> Self {
        Self {
            path: dir
                .as_ref()
                .join(format!("deployed-addresses-{}.json", network)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take the per-network lock; held until the returned guard is dropped
    pub fn lock(&self) -> DeployerResult<RegistryLock> {
        let path = self.lock_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                debug!("Acquired registry lock {}", path.display());
                Ok(RegistryLock { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(DeployerError::RegistryLocked { path })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read the registry, `None` when no stage has written it yet
    pub fn load(&self) -> DeployerResult<Option<AddressRegistry>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the registry or start a fresh one for this network.
    ///
    /// A file recorded for a different chain id is a configuration error:
    /// its addresses do not exist on the connected chain.
    pub fn load_or_new(
        &self,
        network: &str,
        chain_id: u64,
        deployer: Address,
    ) -> DeployerResult<AddressRegistry> {
        match self.load()? {
            Some(registry) if registry.chain_id != chain_id => Err(DeployerError::config(format!(
                "{} was written for chain id {} but the connected chain is {}",
                self.path.display(),
                registry.chain_id,
                chain_id
            ))),
            Some(mut registry) => {
                registry.deployer = deployer;
                Ok(registry)
            }
            None => Ok(AddressRegistry::new(network, chain_id, deployer)),
        }
    }

    /// Replace the registry file atomically
    pub fn save(&self, registry: &AddressRegistry) -> DeployerResult<()> {
        let write_error = |message: String| DeployerError::RegistryWrite {
            path: self.path.clone(),
            message,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| write_error(e.to_string()))?;

        let content = serde_json::to_string_pretty(registry)
            .map_err(|e| write_error(e.to_string()))?;

        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| write_error(e.to_string()))?;
        writeln!(temp, "{}", content).map_err(|e| write_error(e.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| write_error(e.to_string()))?;
        temp.persist(&self.path)
            .map_err(|e| write_error(e.error.to_string()))?;

        debug!("Wrote registry {}", self.path.display());
        Ok(())
    }

    /// Load and fail unless the registry exists
    pub fn load_required(&self) -> DeployerResult<AddressRegistry> {
        self.load()?.ok_or_else(|| {
            DeployerError::config(format!(
                "No registry at {}; run the earlier stages first",
                self.path.display()
            ))
        })
    }

    /// Look up `key` in `registry`, naming this file when it is absent
    pub fn require(&self, registry: &AddressRegistry, key: &str) -> DeployerResult<Address> {
        registry.get(key).ok_or_else(|| DeployerError::MissingAddress {
            key: key.to_string(),
            path: self.path.clone(),
        })
    }
}

/// Guard for the per-network lock file
#[derive(Debug)]
pub struct RegistryLock {
    path: PathBuf,
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release registry lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn deployer() -> Address {
        "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = RegistryStore::new(dir.path(), "localhost");

        let mut registry = AddressRegistry::new("localhost", 31337, deployer());
        registry.record("WETH_ADDRESS", Address::repeat_byte(1));
        registry.record("FACTORY_ADDRESS", Address::repeat_byte(2));
        store.save(&registry).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, registry);
        assert!(store
            .path()
            .ends_with("deployed-addresses-localhost.json"));
    }

    #[test]
    fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let store = RegistryStore::new(dir.path(), "sepolia");

        let mut registry = AddressRegistry::new("sepolia", 11155111, deployer());
        registry.record("WETH_ADDRESS", Address::repeat_byte(1));
        registry.mark_pending("POSITION_DESCRIPTOR_ADDRESS", "deploy manually");
        store.save(&registry).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["network"], "sepolia");
        assert_eq!(raw["chainId"], 11155111);
        assert!(raw["deployer"].is_string());
        assert!(raw["contracts"]["WETH_ADDRESS"].is_string());
        assert_eq!(raw["pendingRemediation"]["POSITION_DESCRIPTOR_ADDRESS"], "deploy manually");
        assert!(raw["timestamp"].is_string());
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = RegistryStore::new(dir.path(), "localhost");
        assert!(store.load().unwrap().is_none());
        assert!(matches!(store.load_required(), Err(DeployerError::Config(_))));
    }

    #[test]
    fn test_chain_id_mismatch_is_config_error() {
        let dir = TempDir::new().unwrap();
        let store = RegistryStore::new(dir.path(), "localhost");
        store
            .save(&AddressRegistry::new("localhost", 31337, deployer()))
            .unwrap();

        let result = store.load_or_new("localhost", 1337, deployer());
        assert!(matches!(result, Err(DeployerError::Config(_))));
    }

    #[test]
    fn test_require_names_key_and_file() {
        let dir = TempDir::new().unwrap();
        let store = RegistryStore::new(dir.path(), "localhost");
        let registry = AddressRegistry::new("localhost", 31337, deployer());

        match store.require(&registry, "FACTORY_ADDRESS") {
            Err(DeployerError::MissingAddress { key, path }) => {
                assert_eq!(key, "FACTORY_ADDRESS");
                assert_eq!(path, store.path());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let dir = TempDir::new().unwrap();
        let store = RegistryStore::new(dir.path(), "localhost");

        let guard = store.lock().unwrap();
        assert!(matches!(store.lock(), Err(DeployerError::RegistryLocked { .. })));

        drop(guard);
        assert!(store.lock().is_ok());
    }

    #[test]
    fn test_record_clears_pending_note() {
        let mut registry = AddressRegistry::new("localhost", 31337, deployer());
        registry.mark_pending("POSITION_DESCRIPTOR_ADDRESS", "deploy manually");
        registry.record("POSITION_DESCRIPTOR_ADDRESS", Address::repeat_byte(9));
        assert!(registry.pending_remediation.is_empty());
    }
}
