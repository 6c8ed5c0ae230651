use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::config::LeaseConfig;
use crate::error::{Error, Result};
use crate::health::Health;
use crate::lease::{SLOT_RANGE, SlotState, WorkerSlotLease, process_identity};

/// [`WorkerSlotLease`] backed by Redis TTL keys.
///
/// A claim is a `SET key identity NX EX ttl` on
/// `{prefix}:workerid:{app_name}:{slot}`: first-writer-wins, and the key
/// expires on its own if the owner stops refreshing. Refresh reads the key
/// back and only extends the TTL when it still holds this process's
/// identity; an absent key is re-claimed (it expired naturally with no
/// contender) and a foreign identity is a conflict.
pub struct RedisWorkerSlotLease {
    conn: ConnectionManager,
    config: LeaseConfig,
    identity: String,
    state: SlotState,
}

impl RedisWorkerSlotLease {
    /// Opens a connection to `url` (e.g. `redis://127.0.0.1/`) and wraps it.
    pub async fn connect(url: &str, config: LeaseConfig) -> Result<Self> {
        let client = Client::open(url).map_err(Error::backend)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(Error::backend)?;
        Self::new(conn, config)
    }

    /// Wraps an existing [`ConnectionManager`].
    pub fn new(conn: ConnectionManager, config: LeaseConfig) -> Result<Self> {
        config.validate()?;
        let state = SlotState::new(config.unhealthy_status);
        Ok(Self {
            conn,
            config,
            identity: process_identity(),
            state,
        })
    }

    fn key(&self, slot: u16) -> String {
        format!(
            "{}:workerid:{}:{}",
            self.config.key_prefix, self.config.app_name, slot
        )
    }

    fn ttl_secs(&self) -> u64 {
        self.config.session_ttl.as_secs().max(1)
    }

    /// `SET key identity NX EX ttl` — the conditional claim primitive.
    async fn try_claim(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(&self.identity)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs())
            .query_async(&mut conn)
            .await
            .map_err(Error::backend)
    }

    async fn reclaim(&self, slot: u16, key: &str) -> Result<()> {
        if self.transient(self.try_claim(key).await, "re-claim")? {
            self.state.mark_refreshed();
            Ok(())
        } else {
            let mut conn = self.conn.clone();
            let holder: Option<String> = conn.get(key).await.unwrap_or(None);
            let holder = holder.unwrap_or_else(|| "unknown".into());
            self.state
                .mark_conflict(format!("lock failed: held by {holder}"));
            Err(Error::WorkerIdConflict {
                slot,
                details: format!("reclaim failed, held by {holder}"),
            })
        }
    }

    /// Notes a transient backend failure in the health state before
    /// propagating it.
    fn transient<T>(&self, result: Result<T>, context: &str) -> Result<T> {
        if let Err(err) = &result {
            self.state.mark_unhealthy(format!("{context} failed: {err}"));
        }
        result
    }
}

#[async_trait]
impl WorkerSlotLease for RedisWorkerSlotLease {
    async fn acquire(&self) -> Result<u16> {
        for slot in 0..SLOT_RANGE {
            if self.transient(self.try_claim(&self.key(slot)).await, "claim")? {
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

        let mut conn = self.conn.clone();
        let current: Option<String> =
            self.transient(conn.get(&key).await.map_err(Error::backend), "refresh")?;

        match current {
            Some(holder) if holder == self.identity => {
                let extended: bool = self.transient(
                    conn.expire(&key, self.ttl_secs() as i64)
                        .await
                        .map_err(Error::backend),
                    "refresh",
                )?;
                if extended {
                    self.state.mark_refreshed();
                    return Ok(());
                }
                // Expired between the GET and the EXPIRE.
                self.reclaim(slot, &key).await
            }
            None => self.reclaim(slot, &key).await,
            Some(holder) => {
                self.state
                    .mark_conflict(format!("lock failed: held by {holder}"));
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
            tracing::debug!(slot, "skipping release of conflicted slot");
        } else {
            let mut conn = self.conn.clone();
            if let Err(err) = conn.del::<_, ()>(self.key(slot)).await {
                tracing::warn!(slot, error = %err, "failed to release worker slot");
            }
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
