//! Ethereum JSON-RPC node adapter.

use super::{Network, Receipt, ReceiptStatus, TxHash};
use crate::endpoint::ApprovedTransaction;
use crate::{Error, Result};
use rpc::{HttpClient, JsonRpcError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Selector of `Error(string)`.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Node error fragments that mean the signer's nonce was taken.
const NONCE_MESSAGES: &[&str] = &[
    "nonce too low",
    "nonce too high",
    "nonce has already been used",
    "replacement transaction underpriced",
    "already known",
];

/// A node that signs with its own unlocked accounts.
#[derive(Debug)]
pub struct JsonRpcNetwork {
    client: HttpClient,
    poll_interval: Duration,
    receipt_timeout: Duration,
}

impl JsonRpcNetwork {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: HttpClient::new(url),
            poll_interval: Duration::from_secs(1),
            receipt_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        self.client.url()
    }
}

/// Transaction object for `eth_sendTransaction`.
fn call_object(tx: &ApprovedTransaction) -> Value {
    let mut object = Map::new();
    for (key, value) in &tx.attestation {
        object.insert(key.clone(), value.clone());
    }
    let request = &tx.request;
    object.insert("from".into(), request.from.to_string().into());
    object.insert("to".into(), request.to.to_string().into());
    object.insert("data".into(), request.data.to_string().into());
    object.insert("value".into(), format!("{:#x}", request.value).into());
    Value::Object(object)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    revert_reason: Option<String>,
}

impl RawReceipt {
    fn into_receipt(self) -> Receipt {
        let status = match self.status.as_deref() {
            Some("0x0") => ReceiptStatus::Reverted,
            _ => ReceiptStatus::Success,
        };
        let revert_reason = self
            .revert_reason
            .map(|raw| decode_revert_reason(&raw).unwrap_or(raw));
        Receipt {
            hash: TxHash(self.transaction_hash),
            status,
            block_number: self.block_number.as_deref().and_then(parse_quantity),
            revert_reason,
        }
    }
}

fn parse_quantity(s: &str) -> Option<u64> {
    u64::from_str_radix(s.strip_prefix("0x")?, 16).ok()
}

impl Network for JsonRpcNetwork {
    async fn send_transaction(&self, tx: &ApprovedTransaction) -> Result<TxHash> {
        let signer = tx.signer();
        let hash: String = self
            .client
            .request("eth_sendTransaction", [call_object(tx)])
            .await
            .map_err(|err| send_error(err, &signer.to_string()))?;
        tracing::debug!(%signer, %hash, "transaction broadcast");
        Ok(TxHash(hash))
    }

    async fn wait_for_receipt(&self, hash: &TxHash) -> Result<Receipt> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            let receipt: Option<RawReceipt> = self
                .client
                .request("eth_getTransactionReceipt", [&hash.0])
                .await
                .map_err(node_error)?;
            if let Some(receipt) = receipt {
                return Ok(receipt.into_receipt());
            }
            if Instant::now() >= deadline {
                return Err(Error::Transport(format!(
                    "no receipt for {hash} after {}s",
                    self.receipt_timeout.as_secs()
                )));
            }
            sleep(self.poll_interval).await;
        }
    }
}

fn node_error(err: rpc::Error) -> Error {
    match err {
        rpc::Error::Serialize(err) => Error::Serialization(err),
        err if err.is_transport() => Error::Transport(err.to_string()),
        err => Error::Node(err.to_string()),
    }
}

/// Classify a failed `eth_sendTransaction`.
///
/// Only an answer from the node proves nothing was broadcast. Anything else
/// (a lost connection, a timeout, an unreadable reply) may have reached the
/// mempool and becomes [`Error::BroadcastUnknown`].
fn send_error(err: rpc::Error, signer: &str) -> Error {
    let err = match err {
        rpc::Error::JsonRpc(err) => err,
        rpc::Error::Serialize(err) => return Error::Serialization(err),
        other => {
            return Error::BroadcastUnknown {
                reason: format!("sending from {signer}: {other}"),
            };
        }
    };
    let message = err.message.to_lowercase();
    if NONCE_MESSAGES.iter().any(|m| message.contains(m)) {
        return Error::NonceConflict {
            signer: signer.to_string(),
        };
    }
    if is_execution_error(&err) {
        return Error::ExecutionRevert {
            hash: None,
            reason: revert_reason(&err),
        };
    }
    Error::Node(err.to_string())
}

/// Code 3 is the execution-error code geth and most nodes use.
fn is_execution_error(err: &JsonRpcError) -> bool {
    err.code == 3 || err.message.to_lowercase().contains("revert")
}

fn revert_reason(err: &JsonRpcError) -> String {
    // Some nodes nest the payload one level deeper.
    let payload = err.data_str().or_else(|| {
        err.data
            .as_ref()
            .and_then(|data| data.get("data"))
            .and_then(Value::as_str)
    });
    let from_data = payload.and_then(decode_revert_reason);
    from_data.unwrap_or_else(|| {
        err.message
            .strip_prefix("execution reverted: ")
            .map(str::to_string)
            .unwrap_or_else(|| err.message.clone())
    })
}

/// Decode ABI-encoded `Error(string)` revert data.
///
/// Returns `None` for anything else: custom errors, panics, empty data.
pub fn decode_revert_reason(data: &str) -> Option<String> {
    let bytes = hex::decode(data.strip_prefix("0x").unwrap_or(data)).ok()?;
    let payload = bytes.strip_prefix(&ERROR_STRING_SELECTOR[..])?;
    let offset = read_word(payload, 0)?;
    let len = read_word(payload, offset)?;
    let start = offset.checked_add(32)?;
    let text = payload.get(start..start.checked_add(len)?)?;
    String::from_utf8(text.to_vec()).ok()
}

/// Big-endian word at `at`, if it fits in a `usize`.
fn read_word(payload: &[u8], at: usize) -> Option<usize> {
    let word = payload.get(at..at.checked_add(32)?)?;
    let (high, low) = word.split_at(24);
    if high.iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(low);
    usize::try_from(u64::from_be_bytes(buf)).ok()
}
