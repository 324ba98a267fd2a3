//! Event types for the request ledger.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use policy::TransactionRequest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for one submission attempt.
///
/// This is the idempotency key: a request id recorded as submitted is never
/// broadcast again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Lifecycle state of a request.
///
/// ```text
/// Composed -> AwaitingApproval -> Rejected
///                              -> Approved <-> Broadcasting -> Submitted -> Reverted
///                                                                        -> Confirmed
/// ```
///
/// `Broadcasting` is entered just before the transaction is handed to the
/// node. It returns to `Approved` only when the node answered with a refusal,
/// so a request left in `Broadcasting` may or may not be on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Composed,
    AwaitingApproval,
    Rejected,
    Approved,
    Broadcasting,
    Submitted,
    Reverted,
    Confirmed,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Reverted | Self::Confirmed)
    }

    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Composed, AwaitingApproval)
                | (AwaitingApproval, Rejected)
                | (AwaitingApproval, Approved)
                | (Approved, Broadcasting)
                | (Broadcasting, Approved)
                | (Broadcasting, Submitted)
                | (Submitted, Reverted)
                | (Submitted, Confirmed)
        )
    }

    /// Move to `next`, or fail with [`Error::InvalidTransition`].
    pub fn transition(self, next: RequestState) -> Result<RequestState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Composed => "composed",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Rejected => "rejected",
            Self::Approved => "approved",
            Self::Broadcasting => "broadcasting",
            Self::Submitted => "submitted",
            Self::Reverted => "reverted",
            Self::Confirmed => "confirmed",
        };
        f.write_str(name)
    }
}

/// The kind of event that occurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// The caller composed a request.
    Composed { request: TransactionRequest },
    /// The request was sent to the decision endpoint.
    ApprovalRequested { endpoint: String },
    /// The decision endpoint approved; `transaction` is the ready-to-broadcast payload.
    Approved { transaction: serde_json::Value },
    /// The decision endpoint denied the request.
    Rejected { reason: String },
    /// The approved transaction is about to be handed to the node.
    Broadcasting,
    /// The node refused the transaction; nothing was broadcast.
    BroadcastRefused { reason: String },
    /// The approved transaction was broadcast.
    Submitted { hash: String },
    /// The transaction reverted on-chain.
    Reverted {
        hash: String,
        reason: String,
        expected: bool,
    },
    /// The transaction confirmed successfully.
    Confirmed {
        hash: String,
        block_number: Option<u64>,
    },
}

impl EventKind {
    /// The state a request is in after this event.
    pub fn state(&self) -> RequestState {
        match self {
            Self::Composed { .. } => RequestState::Composed,
            Self::ApprovalRequested { .. } => RequestState::AwaitingApproval,
            Self::Approved { .. } => RequestState::Approved,
            Self::Rejected { .. } => RequestState::Rejected,
            Self::Broadcasting => RequestState::Broadcasting,
            Self::BroadcastRefused { .. } => RequestState::Approved,
            Self::Submitted { .. } => RequestState::Submitted,
            Self::Reverted { .. } => RequestState::Reverted,
            Self::Confirmed { .. } => RequestState::Confirmed,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Composed { .. } => "composed",
            Self::ApprovalRequested { .. } => "approval_requested",
            Self::Approved { .. } => "approved",
            Self::Rejected { .. } => "rejected",
            Self::Broadcasting => "broadcasting",
            Self::BroadcastRefused { .. } => "broadcast_refused",
            Self::Submitted { .. } => "submitted",
            Self::Reverted { .. } => "reverted",
            Self::Confirmed { .. } => "confirmed",
        }
    }
}

/// An event in the request ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub request_id: RequestId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(request_id: RequestId, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            timestamp: Utc::now(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequestState::*;

    #[test]
    fn happy_path_transitions() {
        let state = Composed
            .transition(AwaitingApproval)
            .and_then(|s| s.transition(Approved))
            .and_then(|s| s.transition(Broadcasting))
            .and_then(|s| s.transition(Submitted))
            .and_then(|s| s.transition(Confirmed))
            .unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn terminal_states_have_no_exits() {
        let all = [
            Composed,
            AwaitingApproval,
            Rejected,
            Approved,
            Broadcasting,
            Submitted,
            Reverted,
            Confirmed,
        ];
        for terminal in [Rejected, Reverted, Confirmed] {
            for next in all {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn rejected_requests_never_submit() {
        assert!(matches!(
            Rejected.transition(Submitted),
            Err(Error::InvalidTransition { .. })
        ));
        assert!(!AwaitingApproval.can_transition_to(Submitted));
        assert!(!Composed.can_transition_to(Approved));
    }

    #[test]
    fn broadcast_goes_through_the_marker() {
        assert!(!Approved.can_transition_to(Submitted));
        assert!(Broadcasting.can_transition_to(Approved));
        assert!(!Broadcasting.can_transition_to(Reverted));
        assert_eq!(EventKind::BroadcastRefused { reason: "nonce".into() }.state(), Approved);
        let json = serde_json::to_value(EventKind::Broadcasting).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "broadcasting" }));
    }

    #[test]
    fn event_kind_serializes_tagged() {
        let kind = EventKind::Rejected {
            reason: "firewall rejected: denied".into(),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "rejected");
        assert_eq!(kind.state(), Rejected);
    }
}
