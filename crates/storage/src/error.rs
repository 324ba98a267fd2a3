//! Ledger errors.

use crate::{RequestId, RequestState};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("ledger database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to encode event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request has no events, so only a `composed` event may start it.
    #[error("unknown request {0}")]
    UnknownRequest(RequestId),

    /// The event would move the request along an edge the state machine lacks.
    #[error("request cannot move from {from} to {to}")]
    InvalidTransition { from: RequestState, to: RequestState },
}

pub type Result<T> = std::result::Result<T, Error>;
