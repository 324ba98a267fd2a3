//! Pre-approved call patterns per caller.

use crate::sync::{read, write};
use crate::{
    AccessControl, Address, EvaluationContext, Policy, PolicyKind, PolicyRef, Result, Selector,
    TransactionRequest,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// A call a caller is approved to make.
///
/// A `None` selector approves any call to `target`, including plain
/// value transfers with empty calldata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovedCall {
    pub target: Address,
    #[serde(default)]
    pub selector: Option<Selector>,
}

impl ApprovedCall {
    pub fn exact(target: Address, selector: Selector) -> Self {
        Self {
            target,
            selector: Some(selector),
        }
    }

    pub fn any(target: Address) -> Self {
        Self {
            target,
            selector: None,
        }
    }
}

#[derive(Debug)]
pub struct ApprovedCallsPolicy {
    address: Address,
    access: AccessControl,
    approved: RwLock<HashMap<Address, HashSet<ApprovedCall>>>,
}

impl ApprovedCallsPolicy {
    pub fn new(address: Address, access: AccessControl) -> Self {
        Self {
            address,
            access,
            approved: RwLock::new(HashMap::new()),
        }
    }

    pub fn approve_calls(
        &self,
        actor: Address,
        caller: Address,
        calls: &[ApprovedCall],
    ) -> Result<()> {
        self.access.require_admin(actor)?;
        write(&self.approved)
            .entry(caller)
            .or_default()
            .extend(calls.iter().copied());
        Ok(())
    }

    pub fn revoke_calls(
        &self,
        actor: Address,
        caller: Address,
        calls: &[ApprovedCall],
    ) -> Result<()> {
        self.access.require_admin(actor)?;
        let mut approved = write(&self.approved);
        if let Some(set) = approved.get_mut(&caller) {
            for call in calls {
                set.remove(call);
            }
            if set.is_empty() {
                approved.remove(&caller);
            }
        }
        Ok(())
    }

    pub fn is_approved(
        &self,
        caller: Address,
        target: Address,
        selector: Option<Selector>,
    ) -> bool {
        let approved = read(&self.approved);
        let Some(set) = approved.get(&caller) else {
            return false;
        };
        set.contains(&ApprovedCall::any(target))
            || selector.is_some_and(|s| set.contains(&ApprovedCall::exact(target, s)))
    }
}

impl Policy for ApprovedCallsPolicy {
    fn policy_ref(&self) -> PolicyRef {
        PolicyRef {
            address: self.address,
            kind: PolicyKind::ApprovedCalls,
        }
    }

    fn evaluate(&self, request: &TransactionRequest, _ctx: &EvaluationContext) -> bool {
        self.is_approved(request.from, request.to, request.data.selector())
    }
}
