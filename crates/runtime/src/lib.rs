//! Gatekeeper runtime: approval, execution and the request pipeline.
//!
//! Every transaction passes through a decision endpoint before it reaches
//! the network. Denied requests never reach the executor.
//!
//! # Overview
//!
//! - **DecisionEndpoint**: a trait for services that approve or deny calls
//!   ([`HttpEndpoint`], [`FixedEndpoint`], [`LocalEndpoint`]).
//! - **PolicyDecisionClient**: asks an endpoint, retrying transport failures.
//! - **Network**: a trait for chains that accept transactions ([`JsonRpcNetwork`]).
//! - **TransactionExecutor**: broadcasts one transaction per signer at a time.
//! - **Pipeline**: ties the above to the request ledger.
//!
//! # Example
//!
//! ```no_run
//! use policy::TransactionRequest;
//! use runtime::{
//!     Expectation, FixedEndpoint, JsonRpcNetwork, Pipeline, PolicyDecisionClient,
//!     TransactionExecutor,
//! };
//! use storage::EventStore;
//!
//! # async fn example() -> runtime::Result<()> {
//! let pipeline = Pipeline::new(
//!     EventStore::in_memory()?,
//!     PolicyDecisionClient::new(FixedEndpoint::approve_all()),
//!     TransactionExecutor::new(JsonRpcNetwork::new("http://127.0.0.1:8545")),
//! );
//! let request = TransactionRequest::new(
//!     "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse()?,
//!     "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".parse()?,
//! );
//! let submission = pipeline.submit(request, Expectation::Success).await?;
//! println!("{}: {:?}", submission.id, submission.outcome);
//! # Ok(())
//! # }
//! ```

mod client;
pub mod endpoint;
mod error;
mod executor;
mod locks;
pub mod network;
mod pipeline;

pub use client::{ApprovalResult, PolicyDecisionClient, RetryConfig};
pub use endpoint::{
    APPROVE_METHOD, ApprovalRequest, ApprovalResponse, ApprovedTransaction, DecisionEndpoint,
    FixedEndpoint, HttpEndpoint, LocalEndpoint,
};
pub use error::{Error, Result};
pub use executor::{BroadcastJournal, Expectation, Outcome, TransactionExecutor};
pub use network::{JsonRpcNetwork, Network, Receipt, ReceiptStatus, TxHash};
pub use pipeline::{Pipeline, Submission};
