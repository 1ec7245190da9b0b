//! Send a state-changing call and wait for it

use alloy::primitives::TxHash;
use tracing::debug;
use v3_deployer_types::{CallRequest, Ledger, Receipt};

use crate::error::{DeployerError, DeployerResult};
use crate::pipeline::ConfirmationPolicy;

/// Submit `request` and wait for `policy`'s confirmation depth.
///
/// A reverted receipt becomes `TransactionReverted`; callers never retry it.
pub async fn send_and_confirm(
    ledger: &dyn Ledger,
    policy: ConfirmationPolicy,
    context: &str,
    request: CallRequest,
) -> DeployerResult<Receipt> {
    let tx_hash = ledger.send(request).await?;
    debug!("{} submitted: {}", context, tx_hash);

    let receipt = wait(ledger, policy, context, tx_hash).await?;
    if !receipt.status {
        return Err(DeployerError::TransactionReverted {
            context: context.to_string(),
            tx_hash,
        });
    }
    Ok(receipt)
}

async fn wait(
    ledger: &dyn Ledger,
    policy: ConfirmationPolicy,
    context: &str,
    tx_hash: TxHash,
) -> DeployerResult<Receipt> {
    let receipt = tokio::time::timeout(
        policy.timeout,
        ledger.wait_for_receipt(tx_hash, policy.confirmations),
    )
    .await
    .map_err(|_| DeployerError::ConfirmationTimeout {
        stage: context.to_string(),
        tx_hash,
        confirmations: policy.confirmations,
        timeout: policy.timeout,
    })??;
    Ok(receipt)
}
