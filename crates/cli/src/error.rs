//! Errors surfaced by the `gatekeeper` binary.

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("no ledger at {path}; nothing has been submitted yet")]
    DatabaseNotFound { path: PathBuf },

    #[error("no request id starts with '{prefix}'")]
    RequestNotFound { prefix: String },

    /// More than one request id starts with the prefix; a longer one is needed.
    #[error("'{prefix}' matches {} requests: {}", matches.len(), matches.join(", "))]
    AmbiguousRequest {
        prefix: String,
        matches: Vec<String>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runtime(#[from] runtime::Error),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Policy(#[from] policy::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
