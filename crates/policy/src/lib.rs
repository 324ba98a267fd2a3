//! Policy firewall for on-chain calls.
//!
//! Core principle: **a consumer's calls execute only when every active policy approves.**
//!
//! - [`Policy`] is the single evaluation capability; [`AllowlistPolicy`],
//!   [`ApprovedCallsPolicy`], [`FixedPolicy`] and [`CombinedPolicy`] implement it.
//! - [`FirewallRegistry`] maps consumers to their ordered active policies.
//! - [`AccessControl`] gates every mutation behind a single admin role.
//! - [`FirewallConfig`] builds a registry from TOML.

mod access;
mod allowlist;
mod approved_calls;
mod combined;
mod config;
mod error;
mod policy;
mod registry;
mod sync;
mod types;

pub use access::AccessControl;
pub use allowlist::AllowlistPolicy;
pub use approved_calls::{ApprovedCall, ApprovedCallsPolicy};
pub use combined::{CombinationRule, CombinedPolicy, MAX_SUB_POLICIES, all_of, any_of};
pub use config::{
    AllowlistSpec, ApprovedCallsSpec, AttachmentSpec, CombinationSpec, Firewall, FirewallConfig,
    PolicyHandle, PolicySpec,
};
pub use error::{Error, Result};
pub use policy::{FixedPolicy, Policy};
pub use registry::FirewallRegistry;
pub use types::{
    Address, Calldata, Decision, EvaluationContext, PolicyKind, PolicyRef, REJECTION_PREFIX,
    Selector, TransactionRequest, wei,
};
