use core::time::Duration;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::LeaseConfig;
use crate::error::Result;
use crate::lease::WorkerSlotLease;

/// The background task that keeps a worker-slot lease alive.
///
/// State machine: `Starting -> Acquiring -> Healthy ⇄ Unhealthy -> Stopped`.
/// Acquisition happens once, synchronously, in [`LeaseRefreshLoop::start`]
/// before the generator may serve requests; the spawned task then renews the
/// lease on a fixed interval. Transient refresh failures flip the lease
/// unhealthy and are retried on the next tick, indefinitely. A slot conflict
/// is terminal: the loop stops refreshing and only waits for shutdown, while
/// the lease's health report keeps surfacing the conflict.
///
/// Cancellation is cooperative and observed between refresh attempts. On
/// shutdown the loop calls `release` exactly once, then exits.
pub struct LeaseRefreshLoop {
    lease: Arc<dyn WorkerSlotLease>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl LeaseRefreshLoop {
    /// Builds a loop with an explicit refresh interval.
    pub fn new(
        lease: Arc<dyn WorkerSlotLease>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            lease,
            interval,
            shutdown,
        }
    }

    /// Acquires a slot and spawns the refresh task.
    ///
    /// This is the hosting-collaborator entry point: the returned slot id is
    /// what the process hands to its [`IdGenerator`], and the join handle
    /// resolves once shutdown has released the lease.
    ///
    /// # Errors
    /// Propagates [`Error::WorkerIdAllocationFailed`] (or a backend error)
    /// from the initial acquire; the process should not start serving ids.
    ///
    /// [`IdGenerator`]: crate::generator::IdGenerator
    /// [`Error::WorkerIdAllocationFailed`]: crate::error::Error::WorkerIdAllocationFailed
    pub async fn start(
        lease: Arc<dyn WorkerSlotLease>,
        config: &LeaseConfig,
        shutdown: CancellationToken,
    ) -> Result<(u16, JoinHandle<()>)> {
        config.validate()?;
        let slot = lease.acquire().await?;
        let handle = Self::new(lease, config.refresh_interval, shutdown).spawn();
        Ok((slot, handle))
    }

    /// Spawns [`LeaseRefreshLoop::run`] onto the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs the refresh loop until cancellation.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so the cadence
        // starts one interval after acquisition.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.lease.refresh().await {
                        Ok(()) => {
                            tracing::trace!(slot = ?self.lease.slot_id(), "lease refreshed");
                        }
                        Err(err) if err.is_conflict() => {
                            tracing::error!(
                                slot = ?self.lease.slot_id(),
                                error = %err,
                                "worker slot lost; id generation under this worker id is no longer safe"
                            );
                            // Terminal for the slot: stop refreshing, hold
                            // the unhealthy report, and wait for shutdown.
                            self.shutdown.cancelled().await;
                            break;
                        }
                        Err(err) => {
                            tracing::warn!(
                                slot = ?self.lease.slot_id(),
                                error = %err,
                                "lease refresh failed; retrying on next tick"
                            );
                        }
                    }
                }
            }
        }

        self.lease.release().await;
        tracing::info!("lease refresh loop stopped");
    }
}
