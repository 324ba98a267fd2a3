//! Broadcast and confirmation of approved transactions.

use crate::endpoint::ApprovedTransaction;
use crate::locks::KeyedLocks;
use crate::network::{Network, Receipt, ReceiptStatus, TxHash};
use crate::{Error, Result};
use policy::Address;

/// What the caller expects the transaction to do.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Expectation {
    #[default]
    Success,
    /// A revert whose reason contains the pattern is the expected result.
    /// An empty pattern matches any revert.
    Revert(String),
}

impl Expectation {
    fn accepts_revert(&self, reason: &str) -> bool {
        match self {
            Self::Success => false,
            Self::Revert(pattern) => reason.contains(pattern.as_str()),
        }
    }
}

/// How an executed transaction ended, when it ended as expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Confirmed {
        hash: TxHash,
        block_number: Option<u64>,
    },
    /// Reverted as the caller expected. `hash` is `None` when the node
    /// refused the call before broadcasting it.
    ExpectedRevert { hash: Option<TxHash>, reason: String },
}

impl Outcome {
    pub fn hash(&self) -> Option<&TxHash> {
        match self {
            Self::Confirmed { hash, .. } => Some(hash),
            Self::ExpectedRevert { hash, .. } => hash.as_ref(),
        }
    }
}

/// Durable record of a broadcast in progress.
///
/// Every hook runs with the signer's lock held. A failing hook stops the
/// execution before its next step.
pub trait BroadcastJournal {
    /// The transaction is about to be handed to the node.
    fn sending(&self) -> Result<()>;

    /// The node accepted the transaction as `hash`.
    fn sent(&self, hash: &TxHash) -> Result<()>;

    /// The node answered with a refusal; nothing was broadcast.
    fn refused(&self, reason: &str) -> Result<()>;
}

/// Sends approved transactions, one at a time per signer.
pub struct TransactionExecutor<N> {
    network: N,
    signers: KeyedLocks<Address>,
}

impl<N: Network> TransactionExecutor<N> {
    pub fn new(network: N) -> Self {
        Self {
            network,
            signers: KeyedLocks::new(),
        }
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    /// Broadcast `tx` and wait for its receipt.
    ///
    /// The signer's lock is held from broadcast until the receipt arrives.
    /// When the node gives no answer the journal is left at
    /// [`sending`](BroadcastJournal::sending) and the error is returned.
    pub async fn execute<J>(
        &self,
        tx: &ApprovedTransaction,
        expectation: &Expectation,
        journal: &J,
    ) -> Result<Outcome>
    where
        J: BroadcastJournal + Sync,
    {
        let signer = tx.signer();
        let _guard = self.signers.lock(signer).await;

        journal.sending()?;
        let hash = match self.network.send_transaction(tx).await {
            Ok(hash) => hash,
            Err(Error::ExecutionRevert { hash: None, reason }) => {
                tracing::info!(%signer, %reason, "call reverted before broadcast");
                journal.refused(&reason)?;
                return classify_revert(expectation, None, reason);
            }
            Err(err) if was_refused(&err) => {
                tracing::warn!(%signer, error = %err, "node refused transaction");
                journal.refused(&err.to_string())?;
                return Err(err);
            }
            Err(err) => {
                tracing::error!(%signer, error = %err, "broadcast outcome unknown");
                return Err(err);
            }
        };
        tracing::info!(%signer, %hash, "transaction submitted");
        journal.sent(&hash)?;

        self.confirm(&hash, expectation).await
    }

    /// Wait for an already broadcast transaction and classify its receipt.
    pub async fn confirm(&self, hash: &TxHash, expectation: &Expectation) -> Result<Outcome> {
        let receipt = self.network.wait_for_receipt(hash).await?;
        classify(expectation, receipt)
    }
}

/// Errors that carry the node's answer, so the call was not broadcast.
fn was_refused(err: &Error) -> bool {
    matches!(
        err,
        Error::NonceConflict { .. } | Error::Node(_) | Error::Serialization(_)
    )
}

fn classify(expectation: &Expectation, receipt: Receipt) -> Result<Outcome> {
    match receipt.status {
        ReceiptStatus::Success => {
            if let Expectation::Revert(pattern) = expectation {
                tracing::warn!(
                    hash = %receipt.hash,
                    %pattern,
                    "expected a revert, transaction confirmed"
                );
            }
            tracing::info!(
                hash = %receipt.hash,
                block = ?receipt.block_number,
                "transaction confirmed"
            );
            Ok(Outcome::Confirmed {
                hash: receipt.hash,
                block_number: receipt.block_number,
            })
        }
        ReceiptStatus::Reverted => {
            let reason = receipt
                .revert_reason
                .unwrap_or_else(|| "execution reverted".to_string());
            classify_revert(expectation, Some(receipt.hash), reason)
        }
    }
}

fn classify_revert(
    expectation: &Expectation,
    hash: Option<TxHash>,
    reason: String,
) -> Result<Outcome> {
    if expectation.accepts_revert(&reason) {
        tracing::info!(hash = ?hash, %reason, "transaction reverted as expected");
        Ok(Outcome::ExpectedRevert { hash, reason })
    } else {
        tracing::warn!(hash = ?hash, %reason, "transaction reverted");
        Err(Error::ExecutionRevert {
            hash: hash.map(|h| h.0),
            reason,
        })
    }
}
