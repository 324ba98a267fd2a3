//! Deny-by-default per-consumer address allowlist.

use crate::sync::{read, write};
use crate::{
    AccessControl, Address, EvaluationContext, Policy, PolicyKind, PolicyRef, Result,
    TransactionRequest,
};
use std::collections::HashMap;
use std::sync::RwLock;

/// Allowlist keyed by consumer, then by caller address.
///
/// Absent entries read as `false`.
#[derive(Debug)]
pub struct AllowlistPolicy {
    address: Address,
    access: AccessControl,
    entries: RwLock<HashMap<Address, HashMap<Address, bool>>>,
}

impl AllowlistPolicy {
    pub fn new(address: Address, access: AccessControl) -> Self {
        Self {
            address,
            access,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Set every listed address to `value` for `consumer`.
    ///
    /// Applied under one write lock; duplicates collapse to the last write.
    pub fn set_consumer_allowlist(
        &self,
        actor: Address,
        consumer: Address,
        addresses: &[Address],
        value: bool,
    ) -> Result<()> {
        self.access.require_admin(actor)?;
        let mut entries = write(&self.entries);
        let list = entries.entry(consumer).or_default();
        for address in addresses {
            list.insert(*address, value);
        }
        Ok(())
    }

    pub fn consumer_allowlist(&self, consumer: Address, address: Address) -> bool {
        read(&self.entries)
            .get(&consumer)
            .and_then(|list| list.get(&address))
            .copied()
            .unwrap_or(false)
    }

    /// Addresses currently allowed for `consumer`, sorted.
    pub fn allowed_addresses(&self, consumer: Address) -> Vec<Address> {
        let entries = read(&self.entries);
        let mut allowed: Vec<Address> = entries
            .get(&consumer)
            .map(|list| {
                list.iter()
                    .filter(|(_, allowed)| **allowed)
                    .map(|(address, _)| *address)
                    .collect()
            })
            .unwrap_or_default();
        allowed.sort();
        allowed
    }
}

impl Policy for AllowlistPolicy {
    fn policy_ref(&self) -> PolicyRef {
        PolicyRef {
            address: self.address,
            kind: PolicyKind::Allowlist,
        }
    }

    fn evaluate(&self, request: &TransactionRequest, ctx: &EvaluationContext) -> bool {
        self.consumer_allowlist(ctx.consumer, request.from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    const ADMIN: Address = Address([0xad; 20]);
    const CONSUMER: Address = Address([0xc0; 20]);

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    fn policy() -> AllowlistPolicy {
        AllowlistPolicy::new(addr(0xa1), AccessControl::new(ADMIN))
    }

    #[test]
    fn deny_by_default() {
        let policy = policy();
        for n in 0..8 {
            assert!(!policy.consumer_allowlist(CONSUMER, addr(n)));
        }
        let req = TransactionRequest::new(addr(1), CONSUMER);
        assert!(!policy.evaluate(&req, &EvaluationContext::for_request(&req)));
    }

    #[test]
    fn allowlist_is_per_consumer() {
        let policy = policy();
        policy
            .set_consumer_allowlist(ADMIN, CONSUMER, &[addr(1)], true)
            .unwrap();
        assert!(policy.consumer_allowlist(CONSUMER, addr(1)));
        assert!(!policy.consumer_allowlist(addr(0xc1), addr(1)));
    }

    #[test]
    fn idempotent_writes() {
        let policy = policy();
        policy
            .set_consumer_allowlist(ADMIN, CONSUMER, &[addr(1)], true)
            .unwrap();
        let before = policy.allowed_addresses(CONSUMER);
        policy
            .set_consumer_allowlist(ADMIN, CONSUMER, &[addr(1)], true)
            .unwrap();
        assert_eq!(policy.allowed_addresses(CONSUMER), before);
        assert_eq!(before, vec![addr(1)]);
    }

    #[test]
    fn duplicates_collapse_to_last_write() {
        let policy = policy();
        policy
            .set_consumer_allowlist(ADMIN, CONSUMER, &[addr(1), addr(2), addr(1)], true)
            .unwrap();
        assert_eq!(policy.allowed_addresses(CONSUMER), vec![addr(1), addr(2)]);

        policy
            .set_consumer_allowlist(ADMIN, CONSUMER, &[addr(2)], false)
            .unwrap();
        assert!(!policy.consumer_allowlist(CONSUMER, addr(2)));
        assert_eq!(policy.allowed_addresses(CONSUMER), vec![addr(1)]);
    }

    #[test]
    fn evaluates_caller_against_consumer() {
        let policy = policy();
        policy
            .set_consumer_allowlist(ADMIN, CONSUMER, &[addr(1)], true)
            .unwrap();
        let allowed = TransactionRequest::new(addr(1), CONSUMER);
        let other = TransactionRequest::new(addr(2), CONSUMER);
        assert!(policy.evaluate(&allowed, &EvaluationContext::for_request(&allowed)));
        assert!(!policy.evaluate(&other, &EvaluationContext::for_request(&other)));
    }

    #[test]
    fn mutation_requires_admin() {
        let policy = policy();
        let err = policy
            .set_consumer_allowlist(addr(9), CONSUMER, &[addr(9)], true)
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));
        assert!(!policy.consumer_allowlist(CONSUMER, addr(9)));
    }
}
