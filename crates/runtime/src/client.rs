//! Policy decision client with bounded retry.

use crate::endpoint::{ApprovalRequest, ApprovalResponse, ApprovedTransaction, DecisionEndpoint};
use crate::{Error, Result};
use policy::{Address, REJECTION_PREFIX, TransactionRequest};
use std::time::Duration;

/// Backoff schedule for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, for `attempt` starting at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// The decision for one request.
#[derive(Debug, Clone)]
pub enum ApprovalResult {
    Approved(ApprovedTransaction),
    Rejected { reason: String },
}

impl ApprovalResult {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved(_))
    }

    /// The approved transaction, or the rejection as an error.
    pub fn into_transaction(self) -> Result<ApprovedTransaction> {
        match self {
            Self::Approved(tx) => Ok(tx),
            Self::Rejected { reason } => Err(Error::PolicyRejection { reason }),
        }
    }
}

/// Asks a [`DecisionEndpoint`] for approval.
#[derive(Debug)]
pub struct PolicyDecisionClient<E> {
    endpoint: E,
    policy_address: Option<Address>,
    retry: RetryConfig,
}

impl<E: DecisionEndpoint> PolicyDecisionClient<E> {
    pub fn new(endpoint: E) -> Self {
        Self {
            endpoint,
            policy_address: None,
            retry: RetryConfig::default(),
        }
    }

    /// Name the firewall policy the endpoint should evaluate against.
    pub fn with_policy_address(mut self, policy_address: Address) -> Self {
        self.policy_address = Some(policy_address);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Request approval for `request`.
    ///
    /// Transport failures are retried up to `max_attempts`; every other
    /// error, and every decision, is returned at once.
    pub async fn approve(&self, request: &TransactionRequest) -> Result<ApprovalResult> {
        let call = ApprovalRequest {
            transaction: request.clone(),
            policy_address: self.policy_address,
        };
        let max_attempts = self.retry.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            match self.endpoint.approve(&call).await {
                Ok(response) => return decide(response, request),
                Err(err @ Error::Transport(_)) if attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        endpoint = self.endpoint.name(),
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "approval attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn decide(response: ApprovalResponse, request: &TransactionRequest) -> Result<ApprovalResult> {
    if !response.approved {
        let reason = response
            .rejection_reason
            .unwrap_or_else(|| format!("{REJECTION_PREFIX}: no reason given"));
        return Ok(ApprovalResult::Rejected { reason });
    }

    let tx = response
        .transaction
        .ok_or_else(|| Error::Endpoint("approval carried no transaction".into()))?;
    if !tx.matches(request) {
        return Err(Error::Endpoint(
            "approved transaction does not match the request".into(),
        ));
    }
    Ok(ApprovalResult::Approved(tx))
}
