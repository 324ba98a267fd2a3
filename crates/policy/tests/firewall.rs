//! Firewall setups exercised through the public API.

use policy::{
    AccessControl, Address, AllowlistPolicy, ApprovedCall, ApprovedCallsPolicy, Calldata,
    CombinedPolicy, Decision, Error, EvaluationContext, FirewallRegistry, FixedPolicy, Policy,
    PolicyKind, REJECTION_PREFIX, Selector, TransactionRequest,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

const ADMIN: Address = Address([0xad; 20]);
const ALICE: Address = Address([0x0a; 20]);
const BOB: Address = Address([0x0b; 20]);
const POOL: Address = Address([0xb0; 20]);
const VAULT: Address = Address([0xb1; 20]);
const DEPOSIT: Selector = Selector([0xd0, 0xe3, 0x0d, 0xb0]);

struct Setup {
    registry: FirewallRegistry,
    allowlist: Arc<AllowlistPolicy>,
    approved: Arc<ApprovedCallsPolicy>,
    combined: Arc<CombinedPolicy>,
}

fn setup() -> Setup {
    let access = AccessControl::new(ADMIN);
    let registry = FirewallRegistry::new(access.clone());
    let allowlist = Arc::new(AllowlistPolicy::new(Address([0xa1; 20]), access.clone()));
    let approved = Arc::new(ApprovedCallsPolicy::new(Address([0xa2; 20]), access.clone()));
    let combined = Arc::new(CombinedPolicy::new(Address([0xcc; 20]), access));

    registry.set_policy_status(ADMIN, allowlist.clone(), true).unwrap();
    registry.set_policy_status(ADMIN, approved.clone(), true).unwrap();
    registry.set_policy_status(ADMIN, combined.clone(), true).unwrap();

    Setup {
        registry,
        allowlist,
        approved,
        combined,
    }
}

fn deposit(from: Address) -> TransactionRequest {
    TransactionRequest::new(from, POOL).with_data(Calldata::new(DEPOSIT.0.to_vec()))
}

#[test]
fn allowlisting_twice_keeps_one_entry() {
    let s = setup();
    s.allowlist
        .set_consumer_allowlist(ADMIN, POOL, &[ALICE], true)
        .unwrap();
    s.allowlist
        .set_consumer_allowlist(ADMIN, POOL, &[ALICE], true)
        .unwrap();

    assert_eq!(s.allowlist.allowed_addresses(POOL), vec![ALICE]);
    let ctx = EvaluationContext::for_request(&deposit(ALICE));
    assert!(s.allowlist.evaluate(&deposit(ALICE), &ctx));
    assert!(!s.allowlist.evaluate(&deposit(BOB), &ctx));
}

#[test]
fn combined_requires_every_configured_verdict() {
    let s = setup();
    s.allowlist
        .set_consumer_allowlist(ADMIN, POOL, &[ALICE, BOB], true)
        .unwrap();
    s.approved
        .approve_calls(ADMIN, ALICE, &[ApprovedCall::exact(POOL, DEPOSIT)])
        .unwrap();
    let subs: Vec<Arc<dyn Policy>> = vec![s.allowlist.clone(), s.approved.clone()];
    s.combined
        .set_allowed_combinations(ADMIN, subs, vec![vec![true, true]])
        .unwrap();
    s.registry
        .add_global_policy_for_consumers(ADMIN, &[POOL], s.combined.policy_ref().address)
        .unwrap();

    // Alice: [true, true].
    assert_eq!(s.registry.evaluate(&deposit(ALICE)), Decision::Allow);

    // Bob: allowlisted but not approved, [true, false].
    match s.registry.evaluate(&deposit(BOB)) {
        Decision::Deny { reason } => {
            assert!(reason.starts_with(REJECTION_PREFIX));
            assert!(reason.contains("combined"));
        }
        Decision::Allow => panic!("[true, false] must be rejected"),
    }
}

#[test]
fn attach_detach_round_trip() {
    let s = setup();
    let policy = s.allowlist.policy_ref();

    s.registry
        .add_global_policy_for_consumers(ADMIN, &[POOL, VAULT], policy.address)
        .unwrap();
    assert_eq!(s.registry.get_active_global_policies(POOL), vec![policy]);
    assert_eq!(s.registry.get_active_global_policies(VAULT), vec![policy]);
    assert_eq!(policy.kind, PolicyKind::Allowlist);

    s.registry
        .remove_global_policy_for_consumers(ADMIN, &[POOL], policy.address)
        .unwrap();
    assert!(s.registry.get_active_global_policies(POOL).is_empty());
    assert_eq!(s.registry.get_active_global_policies(VAULT), vec![policy]);

    let err = s
        .registry
        .remove_global_policy_for_consumers(ADMIN, &[POOL], policy.address)
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn failed_attach_changes_nothing() {
    let s = setup();
    let policy = s.allowlist.policy_ref().address;
    s.registry
        .add_global_policy_for_consumers(ADMIN, &[VAULT], policy)
        .unwrap();

    // VAULT already has the policy, so POOL must not get it either.
    let err = s
        .registry
        .add_global_policy_for_consumers(ADMIN, &[POOL, VAULT], policy)
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(s.registry.get_active_global_policies(POOL).is_empty());
    assert_eq!(s.registry.get_active_global_policies(VAULT).len(), 1);
}

#[test]
fn strangers_cannot_administer() {
    let s = setup();
    let err = s
        .allowlist
        .set_consumer_allowlist(BOB, POOL, &[BOB], true)
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));

    let err = s
        .registry
        .add_global_policy_for_consumers(BOB, &[POOL], s.allowlist.policy_ref().address)
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));
    assert!(!s.allowlist.consumer_allowlist(POOL, BOB));
}

#[test]
fn evaluation_never_sees_a_half_applied_combination() {
    let s = setup();
    let pass: Arc<dyn Policy> = Arc::new(FixedPolicy::approve_all(Address([0xf1; 20])));
    let fail: Arc<dyn Policy> = Arc::new(FixedPolicy::deny_all(Address([0xf0; 20])));
    // Both configurations accept. Old sub-policies with new rows, or the
    // reverse, would reject.
    let before = (vec![pass.clone(), fail.clone()], vec![vec![true, false]]);
    let after = (vec![fail, pass], vec![vec![false, true]]);

    s.combined
        .set_allowed_combinations(ADMIN, before.0.clone(), before.1.clone())
        .unwrap();
    s.registry
        .add_global_policy_for_consumers(ADMIN, &[POOL], s.combined.policy_ref().address)
        .unwrap();

    let done = AtomicBool::new(false);
    thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..500 {
                let (subs, rows) = if i % 2 == 0 { &after } else { &before };
                s.combined
                    .set_allowed_combinations(ADMIN, subs.clone(), rows.clone())
                    .unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });
        for _ in 0..4 {
            scope.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    assert_eq!(s.registry.evaluate(&deposit(ALICE)), Decision::Allow);
                }
            });
        }
    });
}

#[test]
fn evaluation_sees_attachment_before_or_after() {
    let s = setup();
    let deny = Arc::new(FixedPolicy::deny_all(Address([0xf0; 20])));
    let denied_by_it = Decision::denied_by(&deny.policy_ref());
    s.registry.set_policy_status(ADMIN, deny.clone(), true).unwrap();
    let address = deny.policy_ref().address;

    let done = AtomicBool::new(false);
    thread::scope(|scope| {
        scope.spawn(|| {
            for _ in 0..250 {
                s.registry
                    .add_global_policy_for_consumers(ADMIN, &[POOL, VAULT], address)
                    .unwrap();
                s.registry
                    .remove_global_policy_for_consumers(ADMIN, &[POOL, VAULT], address)
                    .unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });
        for consumer in [POOL, VAULT] {
            let denied_by_it = &denied_by_it;
            let done = &done;
            let s = &s;
            scope.spawn(move || {
                let request = TransactionRequest::new(ALICE, consumer);
                while !done.load(Ordering::SeqCst) {
                    let decision = s.registry.evaluate(&request);
                    assert!(
                        decision == Decision::Allow || decision == *denied_by_it,
                        "unexpected verdict {decision:?}"
                    );
                    let active = s.registry.get_active_global_policies(consumer);
                    assert!(active.len() <= 1);
                }
            });
        }
    });

    assert!(s.registry.get_active_global_policies(POOL).is_empty());
    assert!(s.registry.get_active_global_policies(VAULT).is_empty());
}
