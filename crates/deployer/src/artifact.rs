//! Compiled contract artifacts (Hardhat JSON format)

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{hex, Bytes};
use serde::{Deserialize, Serialize};

use crate::error::{DeployerError, DeployerResult};
use crate::linker::{has_unlinked_placeholder, LinkReference};

/// Placeholder position as stored in the artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOffset {
    pub start: usize,
    pub length: usize,
}

/// Immutable build output for one contract
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub contract_name: String,
    #[serde(default)]
    pub abi: serde_json::Value,
    /// Hex encoded creation bytecode, possibly with unlinked placeholders
    pub bytecode: String,
    /// file -> library -> offsets
    #[serde(default)]
    pub link_references: BTreeMap<String, BTreeMap<String, Vec<LinkOffset>>>,
}

impl ContractArtifact {
    pub fn from_json(content: &str) -> DeployerResult<Self> {
        let artifact: ContractArtifact = serde_json::from_str(content)?;
        if artifact.bytecode.trim_start_matches("0x").is_empty() {
            return Err(DeployerError::artifact(format!(
                "{} has no creation bytecode (interface or abstract contract?)",
                artifact.contract_name
            )));
        }
        Ok(artifact)
    }

    /// Load an artifact from disk
    pub fn from_file(path: &Path) -> DeployerResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DeployerError::artifact(format!("Failed to read artifact {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Flatten the nested link reference table
    pub fn link_references(&self) -> Vec<LinkReference> {
        self.link_references
            .iter()
            .flat_map(|(file, symbols)| {
                symbols.iter().flat_map(move |(symbol, offsets)| {
                    offsets.iter().map(move |offset| LinkReference {
                        file: file.clone(),
                        symbol: symbol.clone(),
                        start: offset.start,
                        length: offset.length,
                    })
                })
            })
            .collect()
    }

    pub fn needs_linking(&self) -> bool {
        !self.link_references.is_empty()
    }
}

/// Decode linked bytecode and append ABI-encoded constructor arguments
pub fn init_code(
    contract: &str,
    linked_bytecode: &str,
    constructor_args: &[DynSolValue],
) -> DeployerResult<Bytes> {
    if has_unlinked_placeholder(linked_bytecode) {
        return Err(DeployerError::artifact(format!(
            "{} bytecode still contains unlinked library placeholders",
            contract
        )));
    }

    let mut code = hex::decode(linked_bytecode).map_err(|e| {
        DeployerError::artifact(format!("{} bytecode is not valid hex: {}", contract, e))
    })?;

    if !constructor_args.is_empty() {
        code.extend(DynSolValue::Tuple(constructor_args.to_vec()).abi_encode_params());
    }

    Ok(code.into())
}

/// Artifacts keyed by contract name
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    artifacts: BTreeMap<String, ContractArtifact>,
}

impl ArtifactSet {
    /// Load `files` (contract name -> path relative to `dir`)
    pub fn load(dir: &Path, files: &BTreeMap<String, String>) -> DeployerResult<Self> {
        let mut set = Self::default();
        for (name, file) in files {
            let artifact = ContractArtifact::from_file(&dir.join(file))?;
            set.insert(name.clone(), artifact);
        }
        Ok(set)
    }

    pub fn insert(&mut self, name: impl Into<String>, artifact: ContractArtifact) {
        self.artifacts.insert(name.into(), artifact);
    }

    pub fn get(&self, name: &str) -> Option<&ContractArtifact> {
        self.artifacts.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.artifacts.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};

    const LINKED_ARTIFACT: &str = r#"{
        "_format": "hh-sol-artifact-1",
        "contractName": "NonfungibleTokenPositionDescriptor",
        "sourceName": "contracts/NonfungibleTokenPositionDescriptor.sol",
        "abi": [],
        "bytecode": "0x6080__$cea9be979eee3d87fb124d6cbb244bb0b5$__6040",
        "linkReferences": {
            "contracts/libraries/NFTDescriptor.sol": {
                "NFTDescriptor": [{ "length": 20, "start": 2 }]
            }
        }
    }"#;

    #[test]
    fn test_parse_hardhat_artifact() {
        let artifact = ContractArtifact::from_json(LINKED_ARTIFACT).unwrap();
        assert_eq!(artifact.contract_name, "NonfungibleTokenPositionDescriptor");
        assert!(artifact.needs_linking());

        let references = artifact.link_references();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].symbol, "NFTDescriptor");
        assert_eq!(references[0].file, "contracts/libraries/NFTDescriptor.sol");
        assert_eq!(references[0].start, 2);
    }

    #[test]
    fn test_artifact_without_link_references() {
        let artifact =
            ContractArtifact::from_json(r#"{"contractName": "WETH9", "abi": [], "bytecode": "0x6080"}"#)
                .unwrap();
        assert!(!artifact.needs_linking());
        assert!(artifact.link_references().is_empty());
    }

    #[test]
    fn test_empty_bytecode_rejected() {
        let result = ContractArtifact::from_json(r#"{"contractName": "IERC20", "bytecode": "0x"}"#);
        assert!(matches!(result, Err(DeployerError::Artifact(_))));
    }

    #[test]
    fn test_init_code_rejects_placeholders() {
        let artifact = ContractArtifact::from_json(LINKED_ARTIFACT).unwrap();
        let result = init_code(&artifact.contract_name, &artifact.bytecode, &[]);
        assert!(matches!(result, Err(DeployerError::Artifact(_))));
    }

    #[test]
    fn test_init_code_appends_constructor_words() {
        let factory = Address::repeat_byte(0xaa);
        let code = init_code(
            "SwapRouter",
            "0x6080",
            &[DynSolValue::Address(factory), DynSolValue::Uint(U256::from(7u8), 256)],
        )
        .unwrap();

        assert_eq!(code.len(), 2 + 64);
        assert_eq!(&code[..2], &[0x60, 0x80]);
        assert_eq!(&code[14..34], factory.as_slice());
        assert_eq!(code[65], 7);
    }
}
