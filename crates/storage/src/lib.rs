//! SQLite-backed request ledger for Gatekeeper.
//!
//! Every submission attempt gets a [`RequestId`] and leaves a trail of
//! events in the ledger: composed, sent for approval, approved or rejected,
//! broadcast, reverted or confirmed. The ledger serves two purposes:
//!
//! 1. **Audit trail**: "why was this call blocked?" and "what hash did it
//!    land under?" are answered from the event log.
//!
//! 2. **Idempotency**: a request id recorded as submitted is never
//!    broadcast again; retries resume from the recorded hash.
//!
//! [`EventStore::record`] enforces the [`RequestState`] machine, so a
//! rejected request can never be recorded as submitted.
//!
//! # Example
//!
//! ```no_run
//! use policy::{Address, TransactionRequest};
//! use storage::{EventKind, EventStore, RequestId};
//!
//! let store = EventStore::open("ledger.db")?;
//! let id = RequestId::new();
//! let request = TransactionRequest::new(Address([1; 20]), Address([2; 20]));
//!
//! store.record(id, EventKind::Composed { request })?;
//! store.record(id, EventKind::ApprovalRequested { endpoint: "deny".into() })?;
//! store.record(id, EventKind::Rejected { reason: "firewall rejected: denied".into() })?;
//!
//! for summary in store.list_requests()? {
//!     println!("{}: {}", summary.id, summary.state);
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod event;
mod store;

pub use error::{Error, Result};
pub use event::{Event, EventKind, RequestId, RequestState};
pub use store::{EventStore, RequestSummary};
