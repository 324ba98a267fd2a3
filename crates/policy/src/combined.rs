//! Boolean truth-table combinator over sub-policy verdicts.
//!
//! A [`CombinedPolicy`] evaluates each configured sub-policy in order,
//! forms the verdict vector, and approves iff that vector is one of the
//! accepted rows. AND, OR and arbitrary custom combinations are all just
//! different row sets:
//!
//! ```
//! use policy::{all_of, any_of};
//!
//! assert_eq!(all_of(2), vec![vec![true, true]]);
//! assert_eq!(any_of(2)?.len(), 3);
//! # Ok::<(), policy::Error>(())
//! ```

use crate::sync::{read, write};
use crate::{
    AccessControl, Address, Error, EvaluationContext, Policy, PolicyKind, PolicyRef, Result,
    TransactionRequest,
};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Maximum number of sub-policies in one combination.
///
/// An OR over `n` policies accepts `2^n - 1` rows, so the matrix is bounded
/// here rather than left to grow with the sub-policy list.
pub const MAX_SUB_POLICIES: usize = 16;

/// Serializes reconfiguration of every combined policy, so a cycle check
/// and the write it guards see the same graph.
static RECONFIGURE: Mutex<()> = Mutex::new(());

/// Rows accepting only the all-true vector.
pub fn all_of(arity: usize) -> Vec<Vec<bool>> {
    vec![vec![true; arity]]
}

/// Rows accepting every vector with at least one `true`.
///
/// Fails for an arity of zero or above [`MAX_SUB_POLICIES`].
pub fn any_of(arity: usize) -> Result<Vec<Vec<bool>>> {
    if arity == 0 || arity > MAX_SUB_POLICIES {
        return Err(Error::config(format!(
            "any_of arity must be between 1 and {MAX_SUB_POLICIES}, got {arity}"
        )));
    }
    Ok((1u32..(1u32 << arity))
        .map(|bits| (0..arity).map(|i| bits & (1 << i) != 0).collect())
        .collect())
}

/// Validated combination configuration.
pub struct CombinationRule {
    sub_policies: Vec<Arc<dyn Policy>>,
    accepted_rows: HashSet<Vec<bool>>,
}

impl CombinationRule {
    /// Validate arity and build a rule. Duplicate rows collapse.
    pub fn new(
        sub_policies: Vec<Arc<dyn Policy>>,
        accepted_rows: Vec<Vec<bool>>,
    ) -> Result<Self> {
        if sub_policies.is_empty() {
            return Err(Error::config("combination needs at least one sub-policy"));
        }
        if sub_policies.len() > MAX_SUB_POLICIES {
            return Err(Error::config(format!(
                "combination has {} sub-policies (max {MAX_SUB_POLICIES})",
                sub_policies.len()
            )));
        }
        if let Some(row) = accepted_rows.iter().find(|row| row.len() != sub_policies.len()) {
            return Err(Error::config(format!(
                "accepted row {row:?} has arity {}, expected {}",
                row.len(),
                sub_policies.len()
            )));
        }

        Ok(Self {
            sub_policies,
            accepted_rows: accepted_rows.into_iter().collect(),
        })
    }

    pub fn sub_policies(&self) -> Vec<PolicyRef> {
        self.sub_policies.iter().map(|p| p.policy_ref()).collect()
    }

    pub fn accepted_rows(&self) -> &HashSet<Vec<bool>> {
        &self.accepted_rows
    }

    /// Verdict vector for `request`, in configured order.
    pub fn verdicts(&self, request: &TransactionRequest, ctx: &EvaluationContext) -> Vec<bool> {
        self.sub_policies
            .iter()
            .map(|p| p.evaluate(request, ctx))
            .collect()
    }

    pub fn accepts(&self, verdicts: &[bool]) -> bool {
        self.accepted_rows.contains(verdicts)
    }
}

impl fmt::Debug for CombinationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinationRule")
            .field("sub_policies", &self.sub_policies())
            .field("accepted_rows", &self.accepted_rows)
            .finish()
    }
}

/// A policy whose verdict is a truth-table lookup over other policies.
///
/// An unconfigured combined policy denies everything.
#[derive(Debug)]
pub struct CombinedPolicy {
    address: Address,
    access: AccessControl,
    rule: RwLock<Option<Arc<CombinationRule>>>,
}

impl CombinedPolicy {
    pub fn new(address: Address, access: AccessControl) -> Self {
        Self {
            address,
            access,
            rule: RwLock::new(None),
        }
    }

    /// Replace the full configuration.
    pub fn set_allowed_combinations(
        &self,
        actor: Address,
        sub_policies: Vec<Arc<dyn Policy>>,
        accepted_rows: Vec<Vec<bool>>,
    ) -> Result<()> {
        self.access.require_admin(actor)?;
        let _reconfigure = RECONFIGURE.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = self.find_cycle(&sub_policies) {
            return Err(Error::config(format!(
                "combined policy {} would reference itself via {path}",
                self.address
            )));
        }
        let rule = CombinationRule::new(sub_policies, accepted_rows)?;
        *write(&self.rule) = Some(Arc::new(rule));
        Ok(())
    }

    /// Current configuration, if any.
    pub fn rule(&self) -> Option<Arc<CombinationRule>> {
        read(&self.rule).clone()
    }

    fn find_cycle(&self, sub_policies: &[Arc<dyn Policy>]) -> Option<Address> {
        let mut stack: Vec<Arc<dyn Policy>> = sub_policies.to_vec();
        let mut seen = HashSet::new();
        while let Some(policy) = stack.pop() {
            let address = policy.policy_ref().address;
            if address == self.address {
                return Some(address);
            }
            if seen.insert(address) {
                stack.extend(policy.sub_policies());
            }
        }
        None
    }
}

impl Policy for CombinedPolicy {
    fn policy_ref(&self) -> PolicyRef {
        PolicyRef {
            address: self.address,
            kind: PolicyKind::Combined,
        }
    }

    fn evaluate(&self, request: &TransactionRequest, ctx: &EvaluationContext) -> bool {
        // Snapshot so a concurrent reconfiguration is seen whole or not at all.
        let Some(rule) = self.rule() else {
            return false;
        };
        rule.accepts(&rule.verdicts(request, ctx))
    }

    fn sub_policies(&self) -> Vec<Arc<dyn Policy>> {
        self.rule()
            .map(|rule| rule.sub_policies.clone())
            .unwrap_or_default()
    }
}
