//! JSON-RPC ledger backed by an alloy provider and a local private key

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use v3_deployer_types::{CallRequest, Ledger, LedgerError, LedgerResult, PendingDeployment, Receipt};

use crate::error::{DeployerError, DeployerResult};

/// `Ledger` over HTTP JSON-RPC.
///
/// Submissions take an explicit pending nonce under a lock, so the contract
/// address of a deployment is known before the node mines it and concurrent
/// callers in this process can never race for the same nonce.
pub struct RpcLedger {
    provider: DynProvider,
    signer: Address,
    submission: Mutex<()>,
}

impl RpcLedger {
    pub async fn connect(rpc_url: &str, private_key: &str) -> DeployerResult<Self> {
        let key: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| DeployerError::config(format!("invalid private key: {}", e)))?;
        let signer = key.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(key))
            .connect(rpc_url)
            .await
            .map_err(|e| LedgerError::Transport(format!("failed to connect to {}: {}", rpc_url, e)))?
            .erased();

        debug!("Connected to {} as {}", rpc_url, signer);
        Ok(Self {
            provider,
            signer,
            submission: Mutex::new(()),
        })
    }

    async fn pending_nonce(&self) -> LedgerResult<u64> {
        self.provider
            .get_transaction_count(self.signer)
            .pending()
            .await
            .map_err(transport_error)
    }

    async fn submit(&self, tx: TransactionRequest) -> LedgerResult<TxHash> {
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(submission_error)?;
        Ok(*pending.tx_hash())
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn chain_id(&self) -> LedgerResult<u64> {
        self.provider.get_chain_id().await.map_err(transport_error)
    }

    fn signer(&self) -> Address {
        self.signer
    }

    async fn balance(&self, address: Address) -> LedgerResult<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(transport_error)
    }

    async fn deploy(&self, init_code: Bytes) -> LedgerResult<PendingDeployment> {
        let _guard = self.submission.lock().await;
        let nonce = self.pending_nonce().await?;

        let tx = TransactionRequest::default()
            .with_from(self.signer)
            .with_nonce(nonce)
            .with_deploy_code(init_code);
        let tx_hash = self.submit(tx).await?;

        Ok(PendingDeployment {
            address: self.signer.create(nonce),
            tx_hash,
        })
    }

    async fn send(&self, request: CallRequest) -> LedgerResult<TxHash> {
        let _guard = self.submission.lock().await;
        let nonce = self.pending_nonce().await?;

        let mut tx = TransactionRequest::default()
            .with_from(self.signer)
            .with_nonce(nonce)
            .with_to(request.to)
            .with_input(request.data);
        if let Some(gas_limit) = request.gas_limit {
            tx = tx.with_gas_limit(gas_limit);
        }

        self.submit(tx).await
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash, confirmations: u64) -> LedgerResult<Receipt> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .with_required_confirmations(confirmations)
            .get_receipt()
            .await
            .map_err(|e| LedgerError::Receipt {
                tx_hash,
                message: e.to_string(),
            })?;

        let block_number = receipt.block_number.ok_or_else(|| LedgerError::Receipt {
            tx_hash,
            message: "receipt has no block number".to_string(),
        })?;
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(transport_error)?;

        Ok(Receipt {
            tx_hash,
            block_number,
            status: receipt.status(),
            contract_address: receipt.contract_address,
            gas_used: receipt.gas_used,
            confirmations: head.saturating_sub(block_number) + 1,
        })
    }

    async fn call(&self, to: Address, data: Bytes) -> LedgerResult<Bytes> {
        let tx = TransactionRequest::default()
            .with_from(self.signer)
            .with_to(to)
            .with_input(data);

        self.provider.call(tx).await.map_err(|e| match e.as_error_resp() {
            Some(payload) => LedgerError::CallReverted(payload.message.to_string()),
            None => LedgerError::Transport(e.to_string()),
        })
    }
}

/// Node-side refusals (insufficient funds, nonce, revert during estimation)
/// versus connectivity failures.
fn submission_error(err: RpcError<TransportErrorKind>) -> LedgerError {
    match err.as_error_resp() {
        Some(payload) => LedgerError::Rejected(payload.message.to_string()),
        None => LedgerError::Transport(err.to_string()),
    }
}

fn transport_error(err: RpcError<TransportErrorKind>) -> LedgerError {
    LedgerError::Transport(err.to_string())
}
