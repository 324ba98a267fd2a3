//! Endpoints with a fixed answer.

use super::{ApprovalRequest, ApprovalResponse, ApprovedTransaction, DecisionEndpoint};
use crate::Result;

/// Default reason given by [`FixedEndpoint::deny_all`].
pub const DEFAULT_DENY_REASON: &str = "firewall rejected: endpoint denies all calls";

/// Approves every request unchanged, or denies every request.
#[derive(Debug, Clone)]
pub struct FixedEndpoint {
    deny_reason: Option<String>,
}

impl FixedEndpoint {
    pub fn approve_all() -> Self {
        Self { deny_reason: None }
    }

    pub fn deny_all() -> Self {
        Self::deny_with(DEFAULT_DENY_REASON)
    }

    pub fn deny_with(reason: impl Into<String>) -> Self {
        Self {
            deny_reason: Some(reason.into()),
        }
    }
}

impl DecisionEndpoint for FixedEndpoint {
    fn name(&self) -> &str {
        match self.deny_reason {
            None => "approve",
            Some(_) => "deny",
        }
    }

    async fn approve(&self, request: &ApprovalRequest) -> Result<ApprovalResponse> {
        Ok(match &self.deny_reason {
            None => ApprovalResponse::approve(ApprovedTransaction::unattested(
                request.transaction.clone(),
            )),
            Some(reason) => ApprovalResponse::deny(reason.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy::{Address, TransactionRequest};

    fn request() -> ApprovalRequest {
        ApprovalRequest {
            transaction: TransactionRequest::new(Address([1; 20]), Address([2; 20])),
            policy_address: None,
        }
    }

    #[tokio::test]
    async fn approve_all_returns_request() {
        let response = FixedEndpoint::approve_all().approve(&request()).await.unwrap();
        assert!(response.approved);
        assert_eq!(response.transaction.unwrap().request, request().transaction);
    }

    #[tokio::test]
    async fn deny_all_carries_reason() {
        let response = FixedEndpoint::deny_with("firewall rejected: paused")
            .approve(&request())
            .await
            .unwrap();
        assert!(!response.approved);
        assert_eq!(response.rejection_reason.as_deref(), Some("firewall rejected: paused"));
        assert_eq!(FixedEndpoint::deny_all().name(), "deny");
    }
}
