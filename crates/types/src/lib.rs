/// Shared types for the v3 deployer
///
/// This crate provides the ledger call surface, the minimal contract
/// interfaces and the constants used by the deployer, the math crate
/// and the test utilities.

pub mod constants;
pub mod contracts;
pub mod errors;
pub mod ledger;

// Re-export all public types
pub use constants::*;
pub use errors::*;
pub use ledger::*;

pub use alloy_primitives::{Address, Bytes, TxHash, B256, U256};
