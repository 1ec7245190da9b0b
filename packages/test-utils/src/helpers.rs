use std::fs;
use std::path::Path;

use alloy_primitives::hex;
use serde_json::{json, Value};

use crate::constants::{
    CODE_TAG, FACTORY_KIND, NFT_DESCRIPTOR_PLACEHOLDER, NFT_DESCRIPTOR_SOURCE, OPAQUE_KIND,
    POSITION_MANAGER_KIND, ROUTER_KIND, TOKEN_KIND,
};

/// Runtime-looking filler appended to every fixture
const FILLER: [u8; 4] = [0x60, 0x80, 0x60, 0x40];

pub fn tagged_code(kind: u8) -> Vec<u8> {
    let mut code = CODE_TAG.to_vec();
    code.push(kind);
    code.extend_from_slice(&FILLER);
    code
}

pub fn token_code(decimals: u8) -> Vec<u8> {
    let mut code = CODE_TAG.to_vec();
    code.extend_from_slice(&[TOKEN_KIND, decimals]);
    code.extend_from_slice(&FILLER);
    code
}

/// Hardhat-style artifact with no link references
pub fn artifact_json(name: &str, code: &[u8]) -> Value {
    json!({
        "contractName": name,
        "abi": [],
        "bytecode": format!("0x{}", hex::encode(code)),
        "linkReferences": {}
    })
}

/// Artifact whose bytecode carries one library placeholder for `symbol`
pub fn linked_artifact_json(name: &str, symbol: &str) -> Value {
    let head = tagged_code(OPAQUE_KIND);
    let bytecode = format!(
        "0x{}{}{}",
        hex::encode(&head),
        NFT_DESCRIPTOR_PLACEHOLDER,
        hex::encode(FILLER)
    );
    json!({
        "contractName": name,
        "abi": [],
        "bytecode": bytecode,
        "linkReferences": {
            NFT_DESCRIPTOR_SOURCE: {
                symbol: [{ "start": head.len(), "length": 20 }]
            }
        }
    })
}

/// Artifacts for the six core contracts, keyed by contract name
pub fn core_artifacts() -> Vec<(String, Value)> {
    vec![
        ("WETH9".to_string(), artifact_json("WETH9", &tagged_code(OPAQUE_KIND))),
        (
            "UniswapV3Factory".to_string(),
            artifact_json("UniswapV3Factory", &tagged_code(FACTORY_KIND)),
        ),
        (
            "SwapRouter".to_string(),
            artifact_json("SwapRouter", &tagged_code(ROUTER_KIND)),
        ),
        (
            "NFTDescriptor".to_string(),
            artifact_json("NFTDescriptor", &tagged_code(OPAQUE_KIND)),
        ),
        (
            "NonfungibleTokenPositionDescriptor".to_string(),
            linked_artifact_json("NonfungibleTokenPositionDescriptor", "NFTDescriptor"),
        ),
        (
            "NonfungiblePositionManager".to_string(),
            artifact_json("NonfungiblePositionManager", &tagged_code(POSITION_MANAGER_KIND)),
        ),
    ]
}

/// Token artifacts for (contract name, decimals) pairs
pub fn token_artifacts(tokens: &[(&str, u8)]) -> Vec<(String, Value)> {
    tokens
        .iter()
        .map(|(name, decimals)| (name.to_string(), artifact_json(name, &token_code(*decimals))))
        .collect()
}

/// Write each artifact to `<dir>/<name>.json`
pub fn write_artifacts(dir: &Path, artifacts: &[(String, Value)]) {
    fs::create_dir_all(dir).expect("Failed to create artifact directory");
    for (name, artifact) in artifacts {
        let path = dir.join(format!("{name}.json"));
        fs::write(&path, serde_json::to_string_pretty(artifact).unwrap())
            .unwrap_or_else(|_| panic!("Failed to write artifact {}", path.display()));
    }
}
