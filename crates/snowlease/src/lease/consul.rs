use core::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::LeaseConfig;
use crate::error::{Error, Result};
use crate::health::Health;
use crate::lease::{SLOT_RANGE, SlotState, WorkerSlotLease, process_identity};

/// Response of `PUT /v1/session/create`.
#[derive(Debug, Deserialize)]
struct SessionCreated {
    #[serde(rename = "ID")]
    id: String,
}

/// [`WorkerSlotLease`] backed by Consul sessions.
///
/// A TTL session with `Behavior=delete` is created first; claims are then
/// session-scoped KV acquires on
/// `{prefix}/snowflake/{app_name}/workerId/{slot}` (first-writer-wins per
/// key). Refresh renews the session; when Consul reports the session gone,
/// a *new* session is created and the *same* slot re-acquired — a failed
/// re-acquire means another process took the slot and is a conflict.
/// Destroying the session on release cascades to removal of the owned key.
pub struct ConsulWorkerSlotLease {
    http: reqwest::Client,
    base_url: String,
    config: LeaseConfig,
    identity: String,
    state: SlotState,
    // Serializes session create/renew/destroy against each other. Held
    // across backend calls, hence a tokio mutex.
    session: tokio::sync::Mutex<Option<String>>,
}

impl ConsulWorkerSlotLease {
    /// Creates a lease client against a Consul HTTP address, e.g.
    /// `http://127.0.0.1:8500`.
    pub fn new(base_url: impl Into<String>, config: LeaseConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(Error::backend)?;
        let state = SlotState::new(config.unhealthy_status);
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            config,
            identity: process_identity(),
            state,
            session: tokio::sync::Mutex::new(None),
        })
    }

    fn key(&self, slot: u16) -> String {
        format!(
            "{}/snowflake/{}/workerId/{}",
            self.config.key_prefix, self.config.app_name, slot
        )
    }

    async fn create_session(&self) -> Result<String> {
        let body = serde_json::json!({
            "Name": format!("{}-{}", self.config.key_prefix, self.config.app_name),
            "TTL": format!("{}s", self.config.session_ttl.as_secs().max(10)),
            "Behavior": "delete",
            "LockDelay": "0s",
        });
        let response = self
            .http
            .put(format!("{}/v1/session/create", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(Error::backend)?
            .error_for_status()
            .map_err(Error::backend)?;
        let created: SessionCreated = response.json().await.map_err(Error::backend)?;
        Ok(created.id)
    }

    /// Session-scoped conditional KV write. Returns whether the claim won.
    async fn try_claim(&self, session: &str, slot: u16) -> Result<bool> {
        let url = format!(
            "{}/v1/kv/{}?acquire={}",
            self.base_url,
            self.key(slot),
            session
        );
        let response = self
            .http
            .put(url)
            .body(self.identity.clone())
            .send()
            .await
            .map_err(Error::backend)?
            .error_for_status()
            .map_err(Error::backend)?;
        let body = response.text().await.map_err(Error::backend)?;
        Ok(body.trim() == "true")
    }

    /// Renews the session TTL. `Ok(false)` means Consul no longer knows the
    /// session (it expired and was reaped).
    async fn renew_session(&self, session: &str) -> Result<bool> {
        let response = self
            .http
            .put(format!("{}/v1/session/renew/{}", self.base_url, session))
            .send()
            .await
            .map_err(Error::backend)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        response.error_for_status().map_err(Error::backend)?;
        Ok(true)
    }

    async fn destroy_session(&self, session: &str) {
        let result = self
            .http
            .put(format!("{}/v1/session/destroy/{}", self.base_url, session))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to destroy consul session");
        }
    }

    fn transient<T>(&self, result: Result<T>, context: &str) -> Result<T> {
        if let Err(err) = &result {
            self.state.mark_unhealthy(format!("{context} failed: {err}"));
        }
        result
    }
}

#[async_trait]
impl WorkerSlotLease for ConsulWorkerSlotLease {
    async fn acquire(&self) -> Result<u16> {
        let mut session = self.session.lock().await;
        let sid = self.transient(self.create_session().await, "session create")?;

        for slot in 0..SLOT_RANGE {
            if self.transient(self.try_claim(&sid, slot).await, "claim")? {
                *session = Some(sid);
                self.state.mark_acquired(slot);
                tracing::info!(slot, app = %self.config.app_name, "acquired worker slot");
                return Ok(slot);
            }
        }

        // No slot claimed; do not leak the session.
        self.destroy_session(&sid).await;
        self.state.mark_unhealthy("allocation failed: no free slot");
        Err(Error::WorkerIdAllocationFailed { scanned: SLOT_RANGE })
    }

    async fn refresh(&self) -> Result<()> {
        let Some(slot) = self.state.slot() else {
            return Err(Error::backend_msg("refresh called before acquire"));
        };
        let mut session = self.session.lock().await;
        let Some(sid) = session.clone() else {
            return Err(Error::backend_msg("refresh called before acquire"));
        };

        if self.transient(self.renew_session(&sid).await, "refresh")? {
            self.state.mark_refreshed();
            return Ok(());
        }

        // The session already expired server-side. Try to reclaim the same
        // slot under a fresh session rather than re-scanning; if someone
        // else claimed it in the gap, the slot is lost.
        tracing::warn!(slot, "consul session expired, attempting to reclaim slot");
        let new_sid = self.transient(self.create_session().await, "session create")?;
        if self.transient(self.try_claim(&new_sid, slot).await, "re-claim")? {
            *session = Some(new_sid);
            self.state.mark_refreshed();
            Ok(())
        } else {
            self.destroy_session(&new_sid).await;
            *session = None;
            self.state
                .mark_conflict("lock failed: slot reclaimed by another process");
            Err(Error::WorkerIdConflict {
                slot,
                details: "session expired and slot was reclaimed by another process".into(),
            })
        }
    }

    async fn release(&self) {
        let mut session = self.session.lock().await;
        if let Some(sid) = session.take() {
            // Destroying the session cascades to deletion of the owned key.
            self.destroy_session(&sid).await;
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
