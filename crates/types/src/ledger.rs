//! Ledger port: the only functions the deployer needs from a node

use alloy_primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::LedgerResult;

/// A contract creation that has been accepted by the node but not yet mined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeployment {
    /// Address the contract will live at (derived from creator and nonce)
    pub address: Address,
    /// Hash of the creation transaction
    pub tx_hash: TxHash,
}

/// A state-changing call to an existing contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
    /// Explicit gas limit; the node estimates when `None`
    pub gas_limit: Option<u64>,
}

impl CallRequest {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            gas_limit: None,
        }
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// Mined transaction as seen at the time the wait completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// `true` when execution succeeded, `false` when it reverted
    pub status: bool,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    /// Blocks on top of (and including) the inclusion block
    pub confirmations: u64,
}

/// Minimal view of a blockchain node bound to one signing identity.
///
/// Submissions for the signer are strictly ordered by the node, so callers
/// await each receipt before issuing a dependent submission.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Chain id reported by the node
    async fn chain_id(&self) -> LedgerResult<u64>;

    /// Address of the signing identity
    fn signer(&self) -> Address;

    /// Native currency balance of `address`
    async fn balance(&self, address: Address) -> LedgerResult<U256>;

    /// Submit a contract creation transaction
    async fn deploy(&self, init_code: Bytes) -> LedgerResult<PendingDeployment>;

    /// Submit a state-changing call
    async fn send(&self, request: CallRequest) -> LedgerResult<TxHash>;

    /// Wait until `tx_hash` is mined with at least `confirmations` blocks
    async fn wait_for_receipt(&self, tx_hash: TxHash, confirmations: u64) -> LedgerResult<Receipt>;

    /// Execute a read-only call as the signer against the latest state
    async fn call(&self, to: Address, data: Bytes) -> LedgerResult<Bytes>;
}
