use thiserror::Error;

/// Runtime errors.
///
/// The variants partition every way a submission can stop short of a
/// confirmed transaction. Only [`Error::Transport`] and
/// [`Error::NonceConflict`] are worth retrying.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The decision endpoint (or an evaluator) denied the call.
    ///
    /// The reason is reported verbatim.
    #[error("{reason}")]
    PolicyRejection { reason: String },

    /// An endpoint or node could not be reached, or timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// The decision endpoint answered, but not with a usable decision.
    #[error("decision endpoint error: {0}")]
    Endpoint(String),

    /// The transaction reached the network and reverted.
    ///
    /// `hash` is `None` when the node refused it during simulation.
    #[error("execution reverted: {reason}")]
    ExecutionRevert { hash: Option<String>, reason: String },

    /// The transaction was handed to the node but no answer came back, so it
    /// may or may not be on-chain.
    ///
    /// Not retryable: sending again could execute the call twice. The
    /// request stays in the broadcasting state until someone checks the
    /// signer's transactions.
    #[error("broadcast outcome unknown: {reason}")]
    BroadcastUnknown { reason: String },

    /// Another transaction from the same signer claimed the nonce.
    #[error("nonce conflict for signer {signer}")]
    NonceConflict { signer: String },

    /// The chain node refused the transaction for another reason.
    #[error("node error: {0}")]
    Node(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Policy(#[from] policy::Error),
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NonceConflict { .. })
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::PolicyRejection { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
