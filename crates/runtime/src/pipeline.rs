//! The request pipeline: compose, approve, execute, record.

use crate::client::{ApprovalResult, PolicyDecisionClient};
use crate::endpoint::{ApprovedTransaction, DecisionEndpoint};
use crate::executor::{BroadcastJournal, Expectation, Outcome, TransactionExecutor};
use crate::locks::KeyedLocks;
use crate::network::{Network, TxHash};
use crate::{Error, Result};
use policy::TransactionRequest;
use storage::{EventKind, EventStore, RequestId};
use tracing::Instrument;

/// A finished submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: RequestId,
    pub outcome: Outcome,
}

/// Drives requests through approval and execution, recording every step.
///
/// The ledger is the source of truth for a request's progress. Submitting
/// a known request id continues from its recorded state, so a request that
/// reached [`Broadcasting`](storage::RequestState::Broadcasting) is never
/// handed to the node a second time. Concurrent submissions of one id run
/// one after the other.
pub struct Pipeline<E, N> {
    store: EventStore,
    client: PolicyDecisionClient<E>,
    executor: TransactionExecutor<N>,
    requests: KeyedLocks<RequestId>,
}

impl<E: DecisionEndpoint, N: Network> Pipeline<E, N> {
    pub fn new(
        store: EventStore,
        client: PolicyDecisionClient<E>,
        executor: TransactionExecutor<N>,
    ) -> Self {
        Self {
            store,
            client,
            executor,
            requests: KeyedLocks::new(),
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn client(&self) -> &PolicyDecisionClient<E> {
        &self.client
    }

    pub fn executor(&self) -> &TransactionExecutor<N> {
        &self.executor
    }

    /// Submit `request` under a fresh request id.
    pub async fn submit(
        &self,
        request: TransactionRequest,
        expectation: Expectation,
    ) -> Result<Submission> {
        let id = RequestId::new();
        let outcome = self.submit_with_id(id, request, expectation).await?;
        Ok(Submission { id, outcome })
    }

    /// Submit `request` under `id`, or resume it if `id` is already known.
    ///
    /// A known id must have been recorded for the same call. Terminal
    /// requests return their recorded result without side effects.
    pub async fn submit_with_id(
        &self,
        id: RequestId,
        request: TransactionRequest,
        expectation: Expectation,
    ) -> Result<Outcome> {
        async {
            let _request = self.requests.lock(id).await;
            self.drive(id, request, expectation).await
        }
        .instrument(tracing::info_span!("submit", request_id = %id))
        .await
    }

    async fn drive(
        &self,
        id: RequestId,
        request: TransactionRequest,
        expectation: Expectation,
    ) -> Result<Outcome> {
        match self.store.load_request(id)?.into_iter().next().map(|e| e.kind) {
            None => {
                tracing::info!(from = %request.from, to = %request.to, "request composed");
                self.store.record(
                    id,
                    EventKind::Composed {
                        request: request.clone(),
                    },
                )?;
            }
            Some(EventKind::Composed { request: recorded }) if recorded == request => {
                tracing::debug!("resuming known request");
            }
            Some(_) => {
                return Err(Error::InvalidState(format!(
                    "request {id} was recorded for a different call"
                )));
            }
        }

        loop {
            let latest = self
                .store
                .load_request(id)?
                .pop()
                .map(|event| event.kind)
                .ok_or_else(|| Error::InvalidState(format!("request {id} has no events")))?;

            match latest {
                EventKind::Composed { .. } => {
                    self.store.record(
                        id,
                        EventKind::ApprovalRequested {
                            endpoint: self.client.endpoint().name().to_string(),
                        },
                    )?;
                }
                EventKind::ApprovalRequested { .. } => self.request_approval(id, &request).await?,
                EventKind::Approved { transaction } => {
                    let tx: ApprovedTransaction = serde_json::from_value(transaction)?;
                    return self.broadcast(id, &tx, &expectation).await;
                }
                EventKind::BroadcastRefused { .. } => {
                    let transaction = self.store.approved_transaction(id)?.ok_or_else(|| {
                        Error::InvalidState(format!("request {id} has no approved transaction"))
                    })?;
                    let tx: ApprovedTransaction = serde_json::from_value(transaction)?;
                    return self.broadcast(id, &tx, &expectation).await;
                }
                EventKind::Broadcasting => {
                    tracing::error!("request stopped mid-broadcast, refusing to resend");
                    return Err(Error::BroadcastUnknown {
                        reason: format!(
                            "request {id} was handed to the node without a recorded answer"
                        ),
                    });
                }
                EventKind::Submitted { hash } => {
                    tracing::info!(%hash, "awaiting receipt of recorded submission");
                    let result = self.executor.confirm(&TxHash(hash), &expectation).await;
                    return self.finish(id, result);
                }
                EventKind::Rejected { reason } => return Err(Error::PolicyRejection { reason }),
                EventKind::Confirmed { hash, block_number } => {
                    return Ok(Outcome::Confirmed {
                        hash: TxHash(hash),
                        block_number,
                    });
                }
                EventKind::Reverted {
                    hash,
                    reason,
                    expected: true,
                } => {
                    return Ok(Outcome::ExpectedRevert {
                        hash: Some(TxHash(hash)),
                        reason,
                    });
                }
                EventKind::Reverted {
                    hash,
                    reason,
                    expected: false,
                } => {
                    return Err(Error::ExecutionRevert {
                        hash: Some(hash),
                        reason,
                    });
                }
            }
        }
    }

    async fn request_approval(&self, id: RequestId, request: &TransactionRequest) -> Result<()> {
        match self.client.approve(request).await? {
            ApprovalResult::Approved(tx) => {
                tracing::info!(signer = %tx.signer(), "request approved");
                self.store.record(
                    id,
                    EventKind::Approved {
                        transaction: serde_json::to_value(&tx)?,
                    },
                )?;
            }
            ApprovalResult::Rejected { reason } => {
                tracing::warn!(%reason, "request rejected");
                self.store.record(id, EventKind::Rejected { reason })?;
            }
        }
        Ok(())
    }

    async fn broadcast(
        &self,
        id: RequestId,
        tx: &ApprovedTransaction,
        expectation: &Expectation,
    ) -> Result<Outcome> {
        let journal = Ledger {
            store: &self.store,
            id,
        };
        let result = self.executor.execute(tx, expectation, &journal).await;
        self.finish(id, result)
    }

    /// Record the terminal event of an execution that reached the chain.
    fn finish(&self, id: RequestId, result: Result<Outcome>) -> Result<Outcome> {
        let terminal = match &result {
            Ok(Outcome::Confirmed { hash, block_number }) => Some(EventKind::Confirmed {
                hash: hash.to_string(),
                block_number: *block_number,
            }),
            Ok(Outcome::ExpectedRevert {
                hash: Some(hash),
                reason,
            }) => Some(EventKind::Reverted {
                hash: hash.to_string(),
                reason: reason.clone(),
                expected: true,
            }),
            Err(Error::ExecutionRevert {
                hash: Some(hash),
                reason,
            }) => Some(EventKind::Reverted {
                hash: hash.clone(),
                reason: reason.clone(),
                expected: false,
            }),
            _ => None,
        };
        if let Some(kind) = terminal {
            self.store.record(id, kind)?;
        }
        result
    }
}

/// Broadcast progress written to the request ledger.
struct Ledger<'a> {
    store: &'a EventStore,
    id: RequestId,
}

impl BroadcastJournal for Ledger<'_> {
    fn sending(&self) -> Result<()> {
        self.store.record(self.id, EventKind::Broadcasting)?;
        Ok(())
    }

    fn sent(&self, hash: &TxHash) -> Result<()> {
        self.store.record(
            self.id,
            EventKind::Submitted {
                hash: hash.to_string(),
            },
        )?;
        Ok(())
    }

    fn refused(&self, reason: &str) -> Result<()> {
        self.store.record(
            self.id,
            EventKind::BroadcastRefused {
                reason: reason.to_string(),
            },
        )?;
        Ok(())
    }
}
