//! JSON-RPC client error types.

use crate::protocol::JsonRpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("http error: {0}")]
    Http(String),

    #[error("timeout waiting for response")]
    Timeout,

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),
}

impl Error {
    /// Whether the failure happened before the server produced an answer.
    ///
    /// JSON-RPC error objects and malformed bodies are answers; they are not
    /// transport failures.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Serialize(_) | Self::InvalidResponse(_) | Self::JsonRpc(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
