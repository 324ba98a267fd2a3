//! Decision endpoints.
//!
//! A decision endpoint answers one question: may this transaction be sent?
//! It either approves, returning the transaction to broadcast, or denies
//! with a reason.

mod fixed;
mod http;
mod local;

pub use fixed::FixedEndpoint;
pub use http::{APPROVE_METHOD, HttpEndpoint};
pub use local::LocalEndpoint;

use crate::Result;
use policy::{Address, TransactionRequest};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;

/// Params of a `firewall_approve` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    #[serde(flatten)]
    pub transaction: TransactionRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_address: Option<Address>,
}

/// Result of a `firewall_approve` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<ApprovedTransaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl ApprovalResponse {
    pub fn approve(transaction: ApprovedTransaction) -> Self {
        Self {
            approved: true,
            transaction: Some(transaction),
            rejection_reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            transaction: None,
            rejection_reason: Some(reason.into()),
        }
    }
}

/// A transaction the endpoint approved, ready to broadcast.
///
/// The endpoint may rewrite `data` to embed its attestation. Any fields
/// beyond the call itself (signatures, deadlines, gas hints) are kept in
/// `attestation` and forwarded to the node untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovedTransaction {
    #[serde(flatten)]
    pub request: TransactionRequest,
    #[serde(flatten)]
    pub attestation: Map<String, Value>,
}

impl ApprovedTransaction {
    /// Approve `request` as is, with no attestation.
    pub fn unattested(request: TransactionRequest) -> Self {
        Self {
            request,
            attestation: Map::new(),
        }
    }

    pub fn with_attestation(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attestation.insert(key.into(), value.into());
        self
    }

    pub fn signer(&self) -> Address {
        self.request.from
    }

    /// Whether this transaction is the call `request` asked for.
    ///
    /// Calldata is not compared; endpoints append attestations to it.
    pub fn matches(&self, request: &TransactionRequest) -> bool {
        self.request.from == request.from
            && self.request.to == request.to
            && self.request.value == request.value
    }
}

/// A service that approves or denies transactions.
pub trait DecisionEndpoint: Send + Sync {
    /// Short label recorded in the ledger.
    fn name(&self) -> &str;

    /// Ask for a decision on `request`.
    ///
    /// A denial is an `Ok` response. Errors mean no decision was obtained.
    fn approve(
        &self,
        request: &ApprovalRequest,
    ) -> impl Future<Output = Result<ApprovalResponse>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn approval_request_wire_format() {
        let request = ApprovalRequest {
            transaction: TransactionRequest::new(Address([1; 20]), Address([2; 20])).with_value(5),
            policy_address: Some(Address([3; 20])),
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["from"], "0x0101010101010101010101010101010101010101");
        assert_eq!(wire["value"], "5");
        assert_eq!(wire["policyAddress"], "0x0303030303030303030303030303030303030303");
    }

    #[test]
    fn approved_transaction_keeps_attestation_fields() {
        let response: ApprovalResponse = serde_json::from_value(json!({
            "approved": true,
            "transaction": {
                "from": "0x0101010101010101010101010101010101010101",
                "to": "0x0202020202020202020202020202020202020202",
                "data": "0x095ea7b3",
                "value": "0",
                "signature": "0xdead",
                "deadline": 1700000000
            }
        }))
        .unwrap();

        let tx = response.transaction.unwrap();
        assert_eq!(tx.request.data.selector().unwrap().to_string(), "0x095ea7b3");
        assert_eq!(tx.attestation["signature"], "0xdead");
        assert_eq!(tx.attestation["deadline"], 1700000000);
        assert!(!tx.attestation.contains_key("from"));
    }

    #[test]
    fn denial_wire_format() {
        let response: ApprovalResponse = serde_json::from_value(json!({
            "approved": false,
            "rejectionReason": "firewall rejected: allowlist policy denied call"
        }))
        .unwrap();
        assert!(!response.approved);
        assert!(response.transaction.is_none());
        assert_eq!(
            response.rejection_reason.as_deref(),
            Some("firewall rejected: allowlist policy denied call")
        );
    }

    #[test]
    fn matches_ignores_calldata() {
        let request = TransactionRequest::new(Address([1; 20]), Address([2; 20]));
        let mut approved = ApprovedTransaction::unattested(request.clone());
        approved.request.data = "0xdeadbeef".parse().unwrap();
        assert!(approved.matches(&request));

        approved.request.to = Address([9; 20]);
        assert!(!approved.matches(&request));
    }
}
