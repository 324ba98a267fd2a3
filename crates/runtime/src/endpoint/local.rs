//! In-process evaluation against a [`FirewallRegistry`].

use super::{ApprovalRequest, ApprovalResponse, ApprovedTransaction, DecisionEndpoint};
use crate::Result;
use policy::{Decision, FirewallRegistry};
use std::sync::Arc;

/// Decides by evaluating the request against a local registry.
///
/// The policy address of a request is ignored; the registry selects
/// policies by the consumer being called.
#[derive(Debug, Clone)]
pub struct LocalEndpoint {
    registry: Arc<FirewallRegistry>,
}

impl LocalEndpoint {
    pub fn new(registry: Arc<FirewallRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<FirewallRegistry> {
        &self.registry
    }
}

impl DecisionEndpoint for LocalEndpoint {
    fn name(&self) -> &str {
        "local"
    }

    async fn approve(&self, request: &ApprovalRequest) -> Result<ApprovalResponse> {
        let decision = self.registry.evaluate(&request.transaction);
        tracing::debug!(
            consumer = %request.transaction.to,
            allowed = decision.is_allowed(),
            "local evaluation"
        );
        Ok(match decision {
            Decision::Allow => ApprovalResponse::approve(ApprovedTransaction::unattested(
                request.transaction.clone(),
            )),
            Decision::Deny { reason } => ApprovalResponse::deny(reason),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy::{AccessControl, Address, FixedPolicy, REJECTION_PREFIX, TransactionRequest};

    const ADMIN: Address = Address([0xad; 20]);
    const CONSUMER: Address = Address([0xc0; 20]);

    #[tokio::test]
    async fn denies_with_policy_reason() {
        let registry = Arc::new(FirewallRegistry::new(AccessControl::new(ADMIN)));
        let kill_switch = Address([0xf0; 20]);
        registry
            .set_policy_status(ADMIN, Arc::new(FixedPolicy::deny_all(kill_switch)), true)
            .unwrap();
        registry
            .add_global_policy_for_consumers(ADMIN, &[CONSUMER], kill_switch)
            .unwrap();

        let endpoint = LocalEndpoint::new(registry);
        let request = ApprovalRequest {
            transaction: TransactionRequest::new(Address([1; 20]), CONSUMER),
            policy_address: None,
        };
        let response = endpoint.approve(&request).await.unwrap();
        assert!(!response.approved);
        assert!(response.rejection_reason.unwrap().starts_with(REJECTION_PREFIX));

        // Other consumers are not gated.
        let ungated = ApprovalRequest {
            transaction: TransactionRequest::new(Address([1; 20]), Address([0xc1; 20])),
            policy_address: None,
        };
        assert!(endpoint.approve(&ungated).await.unwrap().approved);
    }
}
