//! Chain access.

mod json_rpc;

pub use json_rpc::{JsonRpcNetwork, decode_revert_reason};

use crate::Result;
use crate::endpoint::ApprovedTransaction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Hash of a broadcast transaction, as the node reports it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TxHash {
    fn from(hash: String) -> Self {
        Self(hash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// The mined result of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub hash: TxHash,
    pub status: ReceiptStatus,
    pub block_number: Option<u64>,
    /// Decoded revert message, when the node reports one.
    pub revert_reason: Option<String>,
}

/// A chain that accepts transactions.
pub trait Network: Send + Sync {
    /// Broadcast `tx` from its signer.
    ///
    /// A revert found while the node simulates the call is reported as
    /// [`Error::ExecutionRevert`](crate::Error::ExecutionRevert) without a
    /// hash; nothing was broadcast. The same holds for
    /// [`NonceConflict`](crate::Error::NonceConflict) and
    /// [`Node`](crate::Error::Node). When the node gave no answer the error is
    /// [`BroadcastUnknown`](crate::Error::BroadcastUnknown).
    fn send_transaction(
        &self,
        tx: &ApprovedTransaction,
    ) -> impl Future<Output = Result<TxHash>> + Send;

    /// Wait until `hash` is mined with one confirmation.
    fn wait_for_receipt(&self, hash: &TxHash) -> impl Future<Output = Result<Receipt>> + Send;
}
