//! Policy error types.

use thiserror::Error;

/// Policy errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The actor does not hold the admin role.
    #[error("unauthorized: {actor} does not hold the admin role")]
    Unauthorized { actor: String },

    /// An admin operation would leave the firewall misconfigured.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Failed to parse an address, selector, or configuration file.
    #[error("failed to parse: {0}")]
    Parse(String),

    /// An I/O error occurred while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
