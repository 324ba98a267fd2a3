//! The policy capability and the trivial fixed-verdict policy.

use crate::{Address, EvaluationContext, PolicyKind, PolicyRef, TransactionRequest};
use std::sync::Arc;

/// A unit of logic producing an approve/deny verdict for a pending call.
///
/// Evaluation is a pure read: implementations must not mutate state.
pub trait Policy: Send + Sync {
    /// Handle identifying this policy instance.
    fn policy_ref(&self) -> PolicyRef;

    /// Render a verdict for `request`.
    fn evaluate(&self, request: &TransactionRequest, ctx: &EvaluationContext) -> bool;

    /// Policies this one delegates to. Only combinators have any.
    fn sub_policies(&self) -> Vec<Arc<dyn Policy>> {
        Vec::new()
    }
}

/// A policy that always returns the same verdict.
#[derive(Debug, Clone)]
pub struct FixedPolicy {
    address: Address,
    verdict: bool,
}

impl FixedPolicy {
    pub fn new(address: Address, verdict: bool) -> Self {
        Self { address, verdict }
    }

    pub fn approve_all(address: Address) -> Self {
        Self::new(address, true)
    }

    pub fn deny_all(address: Address) -> Self {
        Self::new(address, false)
    }
}

impl Policy for FixedPolicy {
    fn policy_ref(&self) -> PolicyRef {
        PolicyRef {
            address: self.address,
            kind: PolicyKind::Fixed,
        }
    }

    fn evaluate(&self, _request: &TransactionRequest, _ctx: &EvaluationContext) -> bool {
        self.verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_ignores_request() {
        let req = TransactionRequest::new(Address([1; 20]), Address([2; 20]));
        let ctx = EvaluationContext::for_request(&req);
        assert!(FixedPolicy::approve_all(Address::ZERO).evaluate(&req, &ctx));
        assert!(!FixedPolicy::deny_all(Address::ZERO).evaluate(&req, &ctx));
        assert_eq!(
            FixedPolicy::deny_all(Address::ZERO).policy_ref().kind,
            PolicyKind::Fixed
        );
    }
}
