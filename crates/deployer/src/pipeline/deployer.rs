//! Single contract deployment: submit, then wait for finality

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use v3_deployer_types::{Ledger, LedgerError, PendingDeployment};

use crate::config::{DeployerConfig, NetworkConfig};
use crate::error::{DeployerError, DeployerResult};
use crate::retry::{retry, RetryPolicy};

/// A mined contract creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    pub name: String,
    pub address: Address,
    pub tx_hash: TxHash,
    /// Confirmations observed when the wait completed
    pub confirmations: u64,
}

/// How long a submission is awaited before it counts as final
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub confirmations: u64,
    pub timeout: Duration,
}

impl ConfirmationPolicy {
    /// Local chains only wait for inclusion; others for the configured depth
    pub fn for_chain(config: &DeployerConfig, network: &NetworkConfig, chain_id: u64) -> Self {
        let confirmations = if config.is_local_chain(chain_id) {
            1
        } else {
            network.required_confirmations
        };

        Self {
            confirmations,
            timeout: Duration::from_secs(network.confirmation_timeout_secs),
        }
    }
}

/// Submits creations through a ledger and waits for them
#[derive(Clone)]
pub struct ContractDeployer {
    ledger: Arc<dyn Ledger>,
    confirmation: ConfirmationPolicy,
    retry: RetryPolicy,
}

impl ContractDeployer {
    pub fn new(ledger: Arc<dyn Ledger>, confirmation: ConfirmationPolicy, retry: RetryPolicy) -> Self {
        Self {
            ledger,
            confirmation,
            retry,
        }
    }

    /// Submit a creation; the address is known once the node accepts it
    pub async fn submit(&self, name: &str, init_code: Bytes) -> DeployerResult<PendingDeployment> {
        info!("Deploying {}...", name);
        let pending = self.ledger.deploy(init_code).await?;
        info!("{} submitted: address {} tx {}", name, pending.address, pending.tx_hash);
        Ok(pending)
    }

    /// Wait for `pending` to reach the confirmation depth
    async fn confirm(&self, name: &str, pending: PendingDeployment) -> DeployerResult<DeployedContract> {
        let ConfirmationPolicy {
            confirmations,
            timeout,
        } = self.confirmation;

        if confirmations > 1 {
            info!("Waiting for {} confirmations of {}...", confirmations, name);
        }

        let receipt = tokio::time::timeout(
            timeout,
            self.ledger.wait_for_receipt(pending.tx_hash, confirmations),
        )
        .await
        .map_err(|_| DeployerError::ConfirmationTimeout {
            stage: name.to_string(),
            tx_hash: pending.tx_hash,
            confirmations,
            timeout,
        })??;

        if !receipt.status {
            return Err(DeployerError::Deployment {
                stage: name.to_string(),
                attempts: 1,
                message: format!("creation transaction {} reverted", pending.tx_hash),
            });
        }

        let address = match receipt.contract_address {
            Some(mined) if mined != pending.address => {
                warn!(
                    "{} mined at {} instead of the predicted {}",
                    name, mined, pending.address
                );
                mined
            }
            _ => pending.address,
        };

        info!("{} deployed to {} (block {})", name, address, receipt.block_number);
        Ok(DeployedContract {
            name: name.to_string(),
            address,
            tx_hash: pending.tx_hash,
            confirmations: receipt.confirmations,
        })
    }

    /// Wait for `pending`, re-waiting on the same transaction after transient
    /// receipt errors.
    ///
    /// A reverted creation comes back as a retryable `Deployment` error since
    /// nothing was deployed. Every other failure is wrapped in `Unconfirmed`,
    /// which carries the submitted address and is never re-submitted.
    pub async fn await_deployment(&self, name: &str, pending: PendingDeployment) -> DeployerResult<DeployedContract> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.confirm(name, pending).await {
                Ok(deployed) => return Ok(deployed),
                Err(err @ DeployerError::Deployment { .. }) => return Err(err),
                Err(DeployerError::Ledger(
                    err @ (LedgerError::Transport(_) | LedgerError::Receipt { .. }),
                )) if attempt < max_attempts => {
                    warn!(
                        "Receipt wait for {} (tx {}) failed on attempt {}/{}: {}",
                        name, pending.tx_hash, attempt, max_attempts, err
                    );
                    tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(DeployerError::Unconfirmed {
                        stage: name.to_string(),
                        address: pending.address,
                        tx_hash: pending.tx_hash,
                        source: Box::new(err),
                    })
                }
            }
        }
    }

    /// Deploy with retry; only submission failures and reverted creations
    /// lead to a new transaction
    pub async fn deploy_with_retry(&self, name: &str, init_code: Bytes) -> DeployerResult<DeployedContract> {
        retry(&self.retry, name, move |_| {
            let init_code = init_code.clone();
            async move {
                let pending = self.submit(name, init_code).await?;
                self.await_deployment(name, pending).await
            }
        })
        .await
    }

    /// Submit with retry but leave the wait to the caller
    pub async fn submit_with_retry(&self, name: &str, init_code: Bytes) -> DeployerResult<PendingDeployment> {
        retry(&self.retry, name, move |_| self.submit(name, init_code.clone())).await
    }
}
