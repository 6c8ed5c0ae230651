//! Distributed worker-slot leases.
//!
//! Each process acquires a lease on one small-integer worker slot before it
//! may generate ids. The backing store (Consul session-scoped KV or Redis
//! TTL keys) is the sole source of truth for slot ownership; the refresh
//! loop's only job is to keep the local slot assignment valid in that store.
//!
//! The backends are structurally identical state machines differing only in
//! the store primitive, so health bookkeeping and the slot scan live here
//! and each backend supplies its claim/verify/extend/remove operations.

#[cfg(feature = "consul")]
mod consul;
mod identity;
mod memory;
mod refresh;
#[cfg(feature = "redis")]
mod redis;
#[cfg(test)]
mod tests;

#[cfg(feature = "consul")]
pub use consul::ConsulWorkerSlotLease;
pub use identity::process_identity;
pub use memory::{MemorySlotStore, MemoryWorkerSlotLease};
pub use refresh::LeaseRefreshLoop;
#[cfg(feature = "redis")]
pub use redis::RedisWorkerSlotLease;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::health::{Health, HealthStatus};

/// Number of candidate worker slots scanned by `acquire`, i.e. slots
/// `0..SLOT_RANGE`.
///
/// Deliberately narrower than the id layout's 12-bit worker field; see
/// [`SnowflakeId`] and the repository design notes.
///
/// [`SnowflakeId`]: crate::id::SnowflakeId
pub const SLOT_RANGE: u16 = 32;

/// A time-bounded claim on a worker slot recorded in an external store.
///
/// Lifecycle: `acquire` once at startup (fatal on failure), periodic
/// `refresh` from the background loop, one best-effort `release` on
/// shutdown. `refresh` must verify that the store still records *this
/// process's* identity before extending; observing a foreign identity means
/// the slot was lost and is reported as [`Error::WorkerIdConflict`].
///
/// [`Error::WorkerIdConflict`]: crate::error::Error::WorkerIdConflict
#[async_trait]
pub trait WorkerSlotLease: Send + Sync {
    /// Scans the candidate range in ascending order and claims the first
    /// free slot, stamping it with this process's identity and the lease
    /// TTL.
    ///
    /// # Errors
    /// [`Error::WorkerIdAllocationFailed`] when no candidate can be claimed;
    /// the process cannot start issuing ids.
    ///
    /// [`Error::WorkerIdAllocationFailed`]: crate::error::Error::WorkerIdAllocationFailed
    async fn acquire(&self) -> Result<u16>;

    /// Re-validates and extends the lease for the owned slot.
    async fn refresh(&self) -> Result<()>;

    /// Best-effort removal of the lease on graceful shutdown. Failures are
    /// logged, never escalated; shutdown must not hang on cleanup.
    async fn release(&self);

    /// Whether the most recent acquire/refresh cycle succeeded.
    fn is_healthy(&self) -> bool;

    /// The slot currently held, if any. This is the worker id handed to the
    /// generator.
    fn slot_id(&self) -> Option<u16>;

    /// The health report consumed by external health-check collaborators.
    fn health(&self) -> Health;
}

/// Health and slot bookkeeping shared by every backend.
pub(crate) struct SlotState {
    inner: Mutex<SlotStateInner>,
    conflict_status: HealthStatus,
}

struct SlotStateInner {
    slot: Option<u16>,
    status: HealthStatus,
    cause: String,
    conflicted: bool,
}

impl SlotState {
    pub(crate) fn new(conflict_status: HealthStatus) -> Self {
        Self {
            inner: Mutex::new(SlotStateInner {
                slot: None,
                status: HealthStatus::Unhealthy,
                cause: "not yet acquired".into(),
                conflicted: false,
            }),
            conflict_status,
        }
    }

    pub(crate) fn slot(&self) -> Option<u16> {
        self.inner.lock().slot
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.inner.lock().status == HealthStatus::Healthy
    }

    /// True once a conflict has been observed; the slot is permanently lost.
    pub(crate) fn is_conflicted(&self) -> bool {
        self.inner.lock().conflicted
    }

    pub(crate) fn mark_acquired(&self, slot: u16) {
        let mut inner = self.inner.lock();
        inner.slot = Some(slot);
        inner.status = HealthStatus::Healthy;
        inner.cause.clear();
    }

    pub(crate) fn mark_refreshed(&self) {
        let mut inner = self.inner.lock();
        inner.status = HealthStatus::Healthy;
        inner.cause.clear();
    }

    pub(crate) fn mark_unhealthy(&self, cause: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.status = HealthStatus::Unhealthy;
        inner.cause = cause.into();
    }

    /// Records a slot conflict. Unlike transient failures this is terminal:
    /// the state never returns to healthy without a fresh acquire.
    pub(crate) fn mark_conflict(&self, cause: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.status = self.conflict_status;
        inner.cause = cause.into();
        inner.conflicted = true;
    }

    pub(crate) fn mark_released(&self) {
        let mut inner = self.inner.lock();
        inner.slot = None;
        inner.status = HealthStatus::Unhealthy;
        inner.cause = "released".into();
    }

    pub(crate) fn health(&self) -> Health {
        let inner = self.inner.lock();
        match inner.status {
            HealthStatus::Healthy => match inner.slot {
                Some(slot) => Health::healthy(slot),
                None => Health::failed(HealthStatus::Unhealthy, None, "no slot held"),
            },
            status => Health::failed(status, inner.slot, &inner.cause),
        }
    }
}
