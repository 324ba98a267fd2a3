//! Admin-gated mapping of consumer to active policy set.

use crate::sync::{read, write};
use crate::{
    AccessControl, Address, Decision, Error, EvaluationContext, Policy, PolicyRef, Result,
    TransactionRequest,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

struct PolicyEntry {
    policy: Arc<dyn Policy>,
    enabled: bool,
}

#[derive(Default)]
struct RegistryState {
    policies: HashMap<Address, PolicyEntry>,
    /// Ordered policy addresses per consumer.
    consumers: HashMap<Address, Vec<Address>>,
}

/// The firewall: known policies and the consumers they protect.
///
/// Every mutation validates the whole batch before writing anything, under
/// a single write lock. Evaluation snapshots the consumer's policies under a
/// read lock, so it sees each mutation either entirely or not at all.
pub struct FirewallRegistry {
    access: AccessControl,
    state: RwLock<RegistryState>,
}

impl FirewallRegistry {
    pub fn new(access: AccessControl) -> Self {
        Self {
            access,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    /// Register `policy` (or update its status). Only enabled policies can be attached.
    pub fn set_policy_status(
        &self,
        actor: Address,
        policy: Arc<dyn Policy>,
        enabled: bool,
    ) -> Result<()> {
        self.access.require_admin(actor)?;
        let address = policy.policy_ref().address;
        write(&self.state)
            .policies
            .insert(address, PolicyEntry { policy, enabled });
        Ok(())
    }

    /// `Some(enabled)` for a registered policy, `None` otherwise.
    pub fn policy_status(&self, policy: Address) -> Option<bool> {
        read(&self.state).policies.get(&policy).map(|e| e.enabled)
    }

    pub fn policy(&self, policy: Address) -> Option<Arc<dyn Policy>> {
        read(&self.state)
            .policies
            .get(&policy)
            .map(|e| Arc::clone(&e.policy))
    }

    /// Attach `policy` to every consumer in `consumers`, or to none of them.
    pub fn add_global_policy_for_consumers(
        &self,
        actor: Address,
        consumers: &[Address],
        policy: Address,
    ) -> Result<()> {
        self.access.require_admin(actor)?;
        let consumers = dedup(consumers)?;
        let mut state = write(&self.state);

        match state.policies.get(&policy) {
            Some(entry) if entry.enabled => {}
            Some(_) => return Err(Error::config(format!("policy {policy} is disabled"))),
            None => return Err(Error::config(format!("policy {policy} is not registered"))),
        }
        for consumer in &consumers {
            let attached = state.consumers.get(consumer);
            if attached.is_some_and(|list| list.contains(&policy)) {
                return Err(Error::config(format!(
                    "policy {policy} is already attached to {consumer}"
                )));
            }
        }

        for consumer in consumers {
            state.consumers.entry(consumer).or_default().push(policy);
        }
        Ok(())
    }

    /// Detach `policy` from every consumer in `consumers`, or from none of them.
    ///
    /// Detaching a policy that is not attached is an error, not a no-op.
    pub fn remove_global_policy_for_consumers(
        &self,
        actor: Address,
        consumers: &[Address],
        policy: Address,
    ) -> Result<()> {
        self.access.require_admin(actor)?;
        let consumers = dedup(consumers)?;
        let mut state = write(&self.state);

        for consumer in &consumers {
            let attached = state.consumers.get(consumer);
            if !attached.is_some_and(|list| list.contains(&policy)) {
                return Err(Error::config(format!(
                    "policy {policy} is not attached to {consumer}"
                )));
            }
        }

        for consumer in consumers {
            if let Some(list) = state.consumers.get_mut(&consumer) {
                list.retain(|p| *p != policy);
                if list.is_empty() {
                    state.consumers.remove(&consumer);
                }
            }
        }
        Ok(())
    }

    /// Ordered list of the policies that gate `consumer`.
    ///
    /// Attached policies that are currently disabled are left out, matching
    /// what [`evaluate`](Self::evaluate) consults.
    pub fn get_active_global_policies(&self, consumer: Address) -> Vec<PolicyRef> {
        let state = read(&self.state);
        state
            .consumers
            .get(&consumer)
            .into_iter()
            .flatten()
            .filter_map(|address| state.policies.get(address))
            .filter(|entry| entry.enabled)
            .map(|entry| entry.policy.policy_ref())
            .collect()
    }

    /// Evaluate `request` against the policies of its target consumer.
    ///
    /// Every enabled attached policy must approve; the first to deny names
    /// the rejection. A consumer with no policies is not gated.
    pub fn evaluate(&self, request: &TransactionRequest) -> Decision {
        let ctx = EvaluationContext::for_request(request);
        let snapshot: Vec<Arc<dyn Policy>> = {
            let state = read(&self.state);
            state
                .consumers
                .get(&ctx.consumer)
                .into_iter()
                .flatten()
                .filter_map(|address| state.policies.get(address))
                .filter(|entry| entry.enabled)
                .map(|entry| Arc::clone(&entry.policy))
                .collect()
        };

        for policy in snapshot {
            if !policy.evaluate(request, &ctx) {
                return Decision::denied_by(&policy.policy_ref());
            }
        }
        Decision::Allow
    }
}

impl fmt::Debug for FirewallRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = read(&self.state);
        f.debug_struct("FirewallRegistry")
            .field("policies", &state.policies.len())
            .field("consumers", &state.consumers.len())
            .finish()
    }
}

fn dedup(consumers: &[Address]) -> Result<Vec<Address>> {
    if consumers.is_empty() {
        return Err(Error::config("consumer list is empty"));
    }
    let mut seen = HashSet::new();
    Ok(consumers
        .iter()
        .copied()
        .filter(|c| seen.insert(*c))
        .collect())
}
