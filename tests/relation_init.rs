//! Relation Handle Initialization Tests
//!
//! The membership relation is created at most once per service, even when
//! the first calls race, and a failed creation is retried on the next call.

use aerogrant::membership::{
    Actor, CountingNotifier, InMemoryRelationStore, MembershipConfig, MembershipError,
    MembershipService, StoreOp, MEMBERSHIP_TABLE,
};
use std::sync::{Arc, Barrier};
use std::thread;

fn service() -> (Arc<InMemoryRelationStore>, Arc<MembershipService>) {
    let store = Arc::new(InMemoryRelationStore::new());
    let service = MembershipService::new(
        store.clone(),
        Arc::new(CountingNotifier::new()),
        MembershipConfig::default(),
    )
    .unwrap();
    (store, Arc::new(service))
}

// =============================================================================
// Single Creation
// =============================================================================

#[test]
fn test_concurrent_first_callers_create_once() {
    let (store, service) = service();
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.relation(&Actor::system()).unwrap()
            })
        })
        .collect();

    let handles: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(store.op_count(StoreOp::AssertRelation), 1);
    assert_eq!(service.metrics().relation_inits(), 1);
    assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
}

#[test]
fn test_handle_describes_membership_table() {
    let (_store, service) = service();
    let handle = service.relation(&Actor::system()).unwrap();

    assert_eq!(handle.table_name(), MEMBERSHIP_TABLE);
    assert_eq!(handle.descriptor().qualified_name(), "aerodb._user_granted_authority");
    assert_eq!(handle.bounds().principal_max_len, 80);
}

#[test]
fn test_operations_reuse_cached_handle() {
    let (store, service) = service();
    let actor = Actor::system();

    service
        .reconcile_authorities_for_principal(&actor, "uid:alice", ["ROLE_USER"])
        .unwrap();
    service.granted_authorities(&actor, "uid:alice").unwrap();
    service.delete_all_for_principal(&actor, "uid:alice").unwrap();

    assert_eq!(store.op_count(StoreOp::AssertRelation), 1);
}

// =============================================================================
// Failure Handling
// =============================================================================

#[test]
fn test_failed_creation_is_retried() {
    let (store, service) = service();
    let actor = Actor::system();
    store.fail_next(StoreOp::AssertRelation);

    let err = service
        .reconcile_authorities_for_principal(&actor, "uid:alice", ["ROLE_USER"])
        .unwrap_err();
    assert!(matches!(err, MembershipError::RelationInit(_)));
    assert_eq!(err.code(), "AERO_GRANT_RELATION_INIT_FAILED");
    assert_eq!(store.mutation_count(), 0);

    service
        .reconcile_authorities_for_principal(&actor, "uid:alice", ["ROLE_USER"])
        .unwrap();
    assert_eq!(store.op_count(StoreOp::AssertRelation), 2);
    assert_eq!(service.metrics().relation_inits(), 1);
}

#[test]
fn test_services_over_one_store_each_assert() {
    let store = Arc::new(InMemoryRelationStore::new());
    let make = || {
        MembershipService::new(
            store.clone(),
            Arc::new(CountingNotifier::new()),
            MembershipConfig::default(),
        )
        .unwrap()
    };
    let a = make();
    let b = make();

    a.relation(&Actor::system()).unwrap();
    b.relation(&Actor::system()).unwrap();

    assert_eq!(store.op_count(StoreOp::AssertRelation), 2);
}
