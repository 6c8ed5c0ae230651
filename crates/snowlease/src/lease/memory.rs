use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::LeaseConfig;
use crate::error::{Error, Result};
use crate::health::Health;
use crate::lease::{SLOT_RANGE, SlotState, WorkerSlotLease, process_identity};

/// An in-process slot table with TTL semantics.
///
/// Cloning shares the underlying table, so several
/// [`MemoryWorkerSlotLease`] instances over clones of one store behave like
/// independent processes against one backing store. Used by the lease tests
/// and handy for local development; production deployments use the Consul or
/// Redis backends.
#[derive(Clone, Default)]
pub struct MemorySlotStore {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
}

struct Entry {
    identity: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim-if-free: succeeds when the key is absent or its entry expired.
    fn claim(&self, key: &str, identity: &str, ttl: Duration) -> bool {
        let mut table = self.inner.lock();
        match table.get(key) {
            Some(entry) if !entry.is_expired() => false,
            _ => {
                table.insert(
                    key.to_owned(),
                    Entry {
                        identity: identity.to_owned(),
                        expires_at: Instant::now() + ttl,
                    },
                );
                true
            }
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        let table = self.inner.lock();
        table
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.identity.clone())
    }

    fn extend(&self, key: &str, identity: &str, ttl: Duration) -> bool {
        let mut table = self.inner.lock();
        match table.get_mut(key) {
            Some(entry) if !entry.is_expired() && entry.identity == identity => {
                entry.expires_at = Instant::now() + ttl;
                true
            }
            _ => false,
        }
    }

    fn remove(&self, key: &str) {
        self.inner.lock().remove(key);
    }

    /// Forces the entry for `key` to expire immediately, simulating TTL
    /// elapse without waiting out a real lease window.
    pub fn force_expire(&self, key: &str) {
        if let Some(entry) = self.inner.lock().get_mut(key) {
            entry.expires_at = Instant::now();
        }
    }
}

/// [`WorkerSlotLease`] over a [`MemorySlotStore`].
///
/// Same state machine as the Redis backend with the store primitive swapped
/// for an in-process table.
pub struct MemoryWorkerSlotLease {
    store: MemorySlotStore,
    config: LeaseConfig,
    identity: String,
    state: SlotState,
}

impl MemoryWorkerSlotLease {
    pub fn new(store: MemorySlotStore, config: LeaseConfig) -> Result<Self> {
        Self::with_identity(store, config, process_identity())
    }

    /// Like [`MemoryWorkerSlotLease::new`] with an explicit identity string,
    /// so tests can model several distinct processes.
    pub fn with_identity(
        store: MemorySlotStore,
        config: LeaseConfig,
        identity: String,
    ) -> Result<Self> {
        config.validate()?;
        let state = SlotState::new(config.unhealthy_status);
        Ok(Self {
            store,
            config,
            identity,
            state,
        })
    }

    pub(crate) fn slot_key(config: &LeaseConfig, slot: u16) -> String {
        format!(
            "{}:workerid:{}:{}",
            config.key_prefix, config.app_name, slot
        )
    }

    fn key(&self, slot: u16) -> String {
        Self::slot_key(&self.config, slot)
    }
}

#[async_trait]
impl WorkerSlotLease for MemoryWorkerSlotLease {
    async fn acquire(&self) -> Result<u16> {
        for slot in 0..SLOT_RANGE {
            if self
                .store
                .claim(&self.key(slot), &self.identity, self.config.session_ttl)
            {
                self.state.mark_acquired(slot);
                tracing::info!(slot, app = %self.config.app_name, "acquired worker slot");
                return Ok(slot);
            }
        }
        self.state.mark_unhealthy("allocation failed: no free slot");
        Err(Error::WorkerIdAllocationFailed { scanned: SLOT_RANGE })
    }

    async fn refresh(&self) -> Result<()> {
        let Some(slot) = self.state.slot() else {
            return Err(Error::backend_msg("refresh called before acquire"));
        };
        let key = self.key(slot);

        match self.store.get(&key) {
            Some(holder) if holder == self.identity => {
                if self
                    .store
                    .extend(&key, &self.identity, self.config.session_ttl)
                {
                    self.state.mark_refreshed();
                    return Ok(());
                }
                // Expired between the read and the extend; fall through to a
                // fresh claim.
                self.reclaim(slot, &key)
            }
            None => self.reclaim(slot, &key),
            Some(holder) => {
                self.state.mark_conflict(format!("lock failed: held by {holder}"));
                Err(Error::WorkerIdConflict {
                    slot,
                    details: format!("held by {holder}"),
                })
            }
        }
    }

    async fn release(&self) {
        let Some(slot) = self.state.slot() else {
            return;
        };
        if self.state.is_conflicted() {
            // The slot belongs to someone else now; deleting would clobber
            // their lease.
            tracing::debug!(slot, "skipping release of conflicted slot");
        } else {
            self.store.remove(&self.key(slot));
        }
        self.state.mark_released();
    }

    fn is_healthy(&self) -> bool {
        self.state.is_healthy()
    }

    fn slot_id(&self) -> Option<u16> {
        self.state.slot()
    }

    fn health(&self) -> Health {
        self.state.health()
    }
}

impl MemoryWorkerSlotLease {
    /// The key expired naturally with no contender: claim it again.
    fn reclaim(&self, slot: u16, key: &str) -> Result<()> {
        if self.store.claim(key, &self.identity, self.config.session_ttl) {
            self.state.mark_refreshed();
            Ok(())
        } else {
            let holder = self.store.get(key).unwrap_or_else(|| "unknown".into());
            self.state.mark_conflict(format!("lock failed: held by {holder}"));
            Err(Error::WorkerIdConflict {
                slot,
                details: format!("reclaim failed, held by {holder}"),
            })
        }
    }
}
