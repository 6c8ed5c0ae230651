use super::*;
use crate::config::LeaseConfig;
use crate::error::Error;
use crate::lease::memory::{MemorySlotStore, MemoryWorkerSlotLease};
use crate::lease::refresh::LeaseRefreshLoop;
use core::time::Duration;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn config() -> LeaseConfig {
    LeaseConfig::new("orders")
}

fn lease(store: &MemorySlotStore, identity: &str) -> MemoryWorkerSlotLease {
    MemoryWorkerSlotLease::with_identity(store.clone(), config(), identity.into()).unwrap()
}

fn slot_key(slot: u16) -> String {
    MemoryWorkerSlotLease::slot_key(&config(), slot)
}

#[tokio::test]
async fn slots_are_assigned_in_ascending_order() {
    let store = MemorySlotStore::new();

    for expected in 0..4u16 {
        let lease = lease(&store, &format!("proc-{expected}"));
        assert_eq!(lease.acquire().await.unwrap(), expected);
        assert!(lease.is_healthy());
        assert_eq!(lease.slot_id(), Some(expected));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn thirty_two_concurrent_acquires_get_distinct_slots() {
    let store = MemorySlotStore::new();

    let tasks: Vec<_> = (0..SLOT_RANGE)
        .map(|i| {
            let lease = lease(&store, &format!("proc-{i}"));
            tokio::spawn(async move { lease.acquire().await })
        })
        .collect();

    let mut slots = HashSet::new();
    for task in tasks {
        let slot = task.await.unwrap().unwrap();
        assert!(slot < SLOT_RANGE);
        assert!(slots.insert(slot), "slot {slot} assigned twice");
    }
    assert_eq!(slots.len(), usize::from(SLOT_RANGE));

    // The store is full: one more process cannot start.
    let extra = lease(&store, "proc-extra");
    match extra.acquire().await {
        Err(Error::WorkerIdAllocationFailed { scanned }) => assert_eq!(scanned, SLOT_RANGE),
        other => panic!("expected WorkerIdAllocationFailed, got {other:?}"),
    }
    assert!(!extra.is_healthy());
}

#[tokio::test]
async fn refresh_succeeds_while_lease_is_held() {
    let store = MemorySlotStore::new();
    let lease = lease(&store, "proc-a");

    lease.acquire().await.unwrap();
    lease.refresh().await.unwrap();
    assert!(lease.is_healthy());
    assert!(lease.health().is_healthy());
}

#[tokio::test]
async fn refresh_before_acquire_is_an_error() {
    let store = MemorySlotStore::new();
    let lease = lease(&store, "proc-a");
    assert!(matches!(lease.refresh().await, Err(Error::Backend(_))));
}

#[tokio::test]
async fn natural_expiry_without_contender_is_reclaimed() {
    let store = MemorySlotStore::new();
    let lease = lease(&store, "proc-a");

    let slot = lease.acquire().await.unwrap();
    store.force_expire(&slot_key(slot));

    // Nobody else claimed the slot in the meantime; refresh re-claims it.
    lease.refresh().await.unwrap();
    assert!(lease.is_healthy());
}

#[tokio::test]
async fn expired_lease_can_be_claimed_by_another_process() {
    let store = MemorySlotStore::new();
    let original = lease(&store, "proc-a");
    let claimant = lease(&store, "proc-b");

    let slot = original.acquire().await.unwrap();
    store.force_expire(&slot_key(slot));

    // The slot's TTL elapsed without refresh: a different process may take
    // it over.
    assert_eq!(claimant.acquire().await.unwrap(), slot);

    // The original owner now observes a foreign identity.
    match original.refresh().await {
        Err(Error::WorkerIdConflict { slot: s, details }) => {
            assert_eq!(s, slot);
            assert!(details.contains("proc-b"));
        }
        other => panic!("expected WorkerIdConflict, got {other:?}"),
    }
    assert!(!original.is_healthy());

    let health = original.health();
    assert!(!health.is_healthy());
    assert!(health.message.contains(&format!("workerId {slot}")));
    assert!(health.message.contains("lock failed"));
}

#[tokio::test]
async fn conflicted_release_does_not_clobber_the_new_owner() {
    let store = MemorySlotStore::new();
    let original = lease(&store, "proc-a");
    let claimant = lease(&store, "proc-b");

    let slot = original.acquire().await.unwrap();
    store.force_expire(&slot_key(slot));
    claimant.acquire().await.unwrap();
    assert!(original.refresh().await.is_err());

    original.release().await;
    assert_eq!(original.slot_id(), None);

    // proc-b's claim must survive proc-a's shutdown.
    claimant.refresh().await.unwrap();
    assert!(claimant.is_healthy());
}

#[tokio::test]
async fn release_frees_the_slot_for_others() {
    let store = MemorySlotStore::new();
    let first = lease(&store, "proc-a");
    let second = lease(&store, "proc-b");

    let slot = first.acquire().await.unwrap();
    first.release().await;
    assert_eq!(first.slot_id(), None);
    assert!(!first.is_healthy());

    assert_eq!(second.acquire().await.unwrap(), slot);
}

#[tokio::test]
async fn refresh_loop_acquires_then_releases_on_shutdown() {
    let store = MemorySlotStore::new();
    let lease: Arc<dyn WorkerSlotLease> = Arc::new(lease(&store, "proc-a"));
    let shutdown = CancellationToken::new();

    let (slot, handle) = LeaseRefreshLoop::start(Arc::clone(&lease), &config(), shutdown.clone())
        .await
        .unwrap();
    assert_eq!(slot, 0);
    assert!(lease.is_healthy());

    shutdown.cancel();
    handle.await.unwrap();

    // The lease was released: the slot is free again.
    assert_eq!(lease.slot_id(), None);
    let next = self::lease(&store, "proc-b");
    assert_eq!(next.acquire().await.unwrap(), 0);
}

#[tokio::test]
async fn refresh_loop_keeps_the_lease_healthy() {
    let store = MemorySlotStore::new();
    let lease: Arc<dyn WorkerSlotLease> = Arc::new(lease(&store, "proc-a"));
    let shutdown = CancellationToken::new();

    lease.acquire().await.unwrap();
    let handle = LeaseRefreshLoop::new(
        Arc::clone(&lease),
        Duration::from_millis(10),
        shutdown.clone(),
    )
    .spawn();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(lease.is_healthy());

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn refresh_loop_surfaces_conflict_through_health() {
    let store = MemorySlotStore::new();
    let original: Arc<dyn WorkerSlotLease> = Arc::new(lease(&store, "proc-a"));
    let shutdown = CancellationToken::new();

    let slot = original.acquire().await.unwrap();
    // Interval long enough that the expire-and-steal below lands before the
    // loop's first refresh.
    let handle = LeaseRefreshLoop::new(
        Arc::clone(&original),
        Duration::from_millis(100),
        shutdown.clone(),
    )
    .spawn();

    // Simulate the lease expiring and another process stealing the slot.
    store.force_expire(&slot_key(slot));
    let claimant = lease(&store, "proc-b");
    assert_eq!(claimant.acquire().await.unwrap(), slot);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!original.is_healthy());
    let health = original.health();
    assert!(health.message.contains(&format!("workerId {slot}")));

    shutdown.cancel();
    handle.await.unwrap();

    // The conflicted loop must not have deleted the new owner's claim.
    claimant.refresh().await.unwrap();
}
