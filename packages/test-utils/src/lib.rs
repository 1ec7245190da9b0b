//! In-memory ledger for deployer tests.
//!
//! [`SimulatedChain`] implements [`Ledger`] for a single signer. Every
//! submission is mined immediately into its own block; confirmations are
//! produced on demand unless the chain is told to stall. Failures can be
//! injected per deployment, per call selector and per read target, and every
//! submission is counted so tests can assert on side effects.

pub mod constants;
pub mod contracts;
pub mod helpers;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use alloy_primitives::{keccak256, Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use v3_deployer_types::{CallRequest, Ledger, LedgerError, LedgerResult, PendingDeployment, Receipt};

use constants::{DEPLOYER, INITIAL_BALANCE_WEI, SIMULATED_CHAIN_ID};
use contracts::World;

pub use contracts::{pool_address, ContractKind};
pub use helpers::*;

#[derive(Debug, Default)]
struct ChainState {
    world: World,
    nonce: u64,
    head: u64,
    native: HashMap<Address, U256>,
    receipts: HashMap<TxHash, Receipt>,
    deployments: Vec<Bytes>,
    sends: HashMap<[u8; 4], usize>,
    deploy_failures: VecDeque<LedgerError>,
    send_failures: VecDeque<LedgerError>,
    receipt_failures: VecDeque<LedgerError>,
    rejected_code: Vec<Vec<u8>>,
    reverting_selectors: HashSet<[u8; 4]>,
    failing_reads: HashSet<Address>,
    stalled: bool,
}

impl ChainState {
    fn next_tx(&mut self, signer: Address) -> (u64, TxHash) {
        let nonce = self.nonce;
        self.nonce += 1;
        let mut preimage = signer.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        (nonce, keccak256(preimage))
    }

    fn mine(&mut self, tx_hash: TxHash, status: bool, contract_address: Option<Address>) {
        self.head += 1;
        self.receipts.insert(
            tx_hash,
            Receipt {
                tx_hash,
                block_number: self.head,
                status,
                contract_address,
                gas_used: 21_000,
                confirmations: 1,
            },
        );
    }
}

pub struct SimulatedChain {
    chain_id: u64,
    signer: Address,
    state: Mutex<ChainState>,
}

impl Default for SimulatedChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedChain {
    pub fn new() -> Self {
        Self::with_chain_id(SIMULATED_CHAIN_ID)
    }

    pub fn with_chain_id(chain_id: u64) -> Self {
        let mut state = ChainState::default();
        state.native.insert(DEPLOYER, U256::from(INITIAL_BALANCE_WEI));
        Self {
            chain_id,
            signer: DEPLOYER,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().expect("simulated chain state poisoned")
    }

    // ── Failure injection ─────────────────────────────────────────────

    /// The next `count` deployments are refused with `error`
    pub fn fail_next_deploys(&self, count: usize, error: LedgerError) {
        let mut state = self.state();
        for _ in 0..count {
            state.deploy_failures.push_back(error.clone());
        }
    }

    /// Every deployment whose init code starts with `prefix` is refused
    pub fn reject_code_with_prefix(&self, prefix: &[u8]) {
        self.state().rejected_code.push(prefix.to_vec());
    }

    /// The next `count` state-changing calls are refused with `error`
    pub fn fail_next_sends(&self, count: usize, error: LedgerError) {
        let mut state = self.state();
        for _ in 0..count {
            state.send_failures.push_back(error.clone());
        }
    }

    /// The next `count` receipt waits fail with `error`; the transactions stay mined
    pub fn fail_next_receipt_waits(&self, count: usize, error: LedgerError) {
        let mut state = self.state();
        for _ in 0..count {
            state.receipt_failures.push_back(error.clone());
        }
    }

    /// Calls with `selector` are mined but revert; read-only calls still succeed
    pub fn revert_sends_with_selector(&self, selector: [u8; 4]) {
        self.state().reverting_selectors.insert(selector);
    }

    /// Read-only calls to `address` fail with a transport error
    pub fn fail_reads_to(&self, address: Address) {
        self.state().failing_reads.insert(address);
    }

    /// Receipt waits never complete while stalled
    pub fn stall_confirmations(&self, stalled: bool) {
        self.state().stalled = stalled;
    }

    // ── Direct setup ──────────────────────────────────────────────────

    /// Put a contract with `code` on chain without a transaction
    pub fn install(&self, code: &[u8]) -> Address {
        let mut state = self.state();
        let (nonce, _) = state.next_tx(self.signer);
        let address = self.signer.create(nonce);
        state.world.install(address, code);
        address
    }

    pub fn install_token(&self, decimals: u8) -> Address {
        self.install(&helpers::token_code(decimals))
    }

    pub fn install_factory(&self) -> Address {
        self.install(&helpers::tagged_code(constants::FACTORY_KIND))
    }

    pub fn install_position_manager(&self) -> Address {
        self.install(&helpers::tagged_code(constants::POSITION_MANAGER_KIND))
    }

    pub fn install_router(&self) -> Address {
        self.install(&helpers::tagged_code(constants::ROUTER_KIND))
    }

    pub fn set_token_balance(&self, token: Address, owner: Address, amount: U256) {
        let mut state = self.state();
        let token = state.world.token_mut(token).expect("not a simulated token");
        token.balances.insert(owner, amount);
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        let mut state = self.state();
        let token = state.world.token_mut(token).expect("not a simulated token");
        token.allowances.insert((owner, spender), amount);
    }

    pub fn set_native_balance(&self, owner: Address, amount: U256) {
        self.state().native.insert(owner, amount);
    }

    // ── Inspection ────────────────────────────────────────────────────

    pub fn token_balance(&self, token: Address, owner: Address) -> U256 {
        self.state()
            .world
            .token(token)
            .and_then(|t| t.balances.get(&owner).copied())
            .unwrap_or_default()
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.state()
            .world
            .token(token)
            .and_then(|t| t.allowances.get(&(owner, spender)).copied())
            .unwrap_or_default()
    }

    /// Submitted state-changing calls with `selector`, reverted ones included
    pub fn sent_count(&self, selector: [u8; 4]) -> usize {
        self.state().sends.get(&selector).copied().unwrap_or_default()
    }

    /// Init code of every accepted deployment, in order
    pub fn deployments(&self) -> Vec<Bytes> {
        self.state().deployments.clone()
    }

    pub fn pools_created(&self) -> usize {
        self.state().world.pools_created
    }

    pub fn pool(&self, token0: Address, token1: Address, fee: u32) -> Option<Address> {
        self.state().world.pool(token0, token1, fee)
    }

    pub fn kind_at(&self, address: Address) -> Option<ContractKind> {
        self.state().world.kind(address)
    }

    pub fn nonce(&self) -> u64 {
        self.state().nonce
    }
}

#[async_trait]
impl Ledger for SimulatedChain {
    async fn chain_id(&self) -> LedgerResult<u64> {
        Ok(self.chain_id)
    }

    fn signer(&self) -> Address {
        self.signer
    }

    async fn balance(&self, address: Address) -> LedgerResult<U256> {
        Ok(self.state().native.get(&address).copied().unwrap_or_default())
    }

    async fn deploy(&self, init_code: Bytes) -> LedgerResult<PendingDeployment> {
        let mut state = self.state();
        if let Some(error) = state.deploy_failures.pop_front() {
            return Err(error);
        }
        if state
            .rejected_code
            .iter()
            .any(|prefix| init_code.starts_with(prefix))
        {
            return Err(LedgerError::Rejected(
                "execution reverted during gas estimation".to_string(),
            ));
        }

        let (nonce, tx_hash) = state.next_tx(self.signer);
        let address = self.signer.create(nonce);
        state.world.install(address, &init_code);
        state.deployments.push(init_code);
        state.mine(tx_hash, true, Some(address));

        Ok(PendingDeployment { address, tx_hash })
    }

    async fn send(&self, request: CallRequest) -> LedgerResult<TxHash> {
        let mut state = self.state();
        if let Some(error) = state.send_failures.pop_front() {
            return Err(error);
        }

        let selector: [u8; 4] = request
            .data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .unwrap_or_default();
        *state.sends.entry(selector).or_default() += 1;

        let (_, tx_hash) = state.next_tx(self.signer);
        let mut next = state.world.clone();
        let status = !state.reverting_selectors.contains(&selector)
            && next.execute(self.signer, request.to, &request.data).is_ok();
        if status {
            state.world = next;
        }
        state.mine(tx_hash, status, None);

        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash, confirmations: u64) -> LedgerResult<Receipt> {
        let stalled = self.state().stalled;
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.state();
        if let Some(error) = state.receipt_failures.pop_front() {
            return Err(error);
        }
        let mined = state
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| LedgerError::Receipt {
                tx_hash,
                message: "unknown transaction".to_string(),
            })?;

        // Mine empty blocks until the requested depth exists
        let target = mined.block_number + confirmations.max(1) - 1;
        if state.head < target {
            state.head = target;
        }

        Ok(Receipt {
            confirmations: state.head - mined.block_number + 1,
            ..mined
        })
    }

    async fn call(&self, to: Address, data: Bytes) -> LedgerResult<Bytes> {
        let state = self.state();
        if state.failing_reads.contains(&to) {
            return Err(LedgerError::Transport(format!("connection refused reading {}", to)));
        }

        let mut scratch = state.world.clone();
        scratch
            .execute(self.signer, to, &data)
            .map(Bytes::from)
            .map_err(LedgerError::CallReverted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deploy_addresses_follow_nonce() {
        let chain = SimulatedChain::new();
        let first = chain.deploy(Bytes::from(vec![0x60, 0x80])).await.unwrap();
        let second = chain.deploy(Bytes::from(vec![0x60, 0x80])).await.unwrap();

        assert_eq!(first.address, DEPLOYER.create(0));
        assert_eq!(second.address, DEPLOYER.create(1));
        assert_ne!(first.tx_hash, second.tx_hash);
    }

    #[tokio::test]
    async fn test_confirmations_are_mined_on_demand() {
        let chain = SimulatedChain::new();
        let pending = chain.deploy(Bytes::from(vec![0x60])).await.unwrap();
        let receipt = chain.wait_for_receipt(pending.tx_hash, 3).await.unwrap();
        assert_eq!(receipt.confirmations, 3);
        assert_eq!(receipt.contract_address, Some(pending.address));
    }

    #[tokio::test]
    async fn test_injected_deploy_failure_does_not_consume_nonce() {
        let chain = SimulatedChain::new();
        chain.fail_next_deploys(1, LedgerError::Rejected("insufficient funds".into()));

        assert!(chain.deploy(Bytes::from(vec![0x60])).await.is_err());
        let pending = chain.deploy(Bytes::from(vec![0x60])).await.unwrap();
        assert_eq!(pending.address, DEPLOYER.create(0));
    }

    #[tokio::test]
    async fn test_failed_receipt_wait_leaves_transaction_mined() {
        let chain = SimulatedChain::new();
        chain.fail_next_receipt_waits(1, LedgerError::Transport("connection reset".into()));
        let pending = chain.deploy(Bytes::from(vec![0x60])).await.unwrap();

        assert!(chain.wait_for_receipt(pending.tx_hash, 1).await.is_err());
        let receipt = chain.wait_for_receipt(pending.tx_hash, 1).await.unwrap();
        assert_eq!(receipt.contract_address, Some(pending.address));
        assert_eq!(chain.deployments().len(), 1);
    }
}
