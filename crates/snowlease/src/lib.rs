//! Snowflake-style 64-bit ids with distributed worker-slot leases.
//!
//! `snowlease` issues globally unique, roughly time-ordered `i64` identifiers
//! across many concurrent processes without a central sequencer. Each id
//! packs a timestamp delta, a worker id, and a per-millisecond sequence; the
//! worker id is a small integer leased from a shared backing store (Consul
//! or Redis) so that no two live processes in the same namespace ever embed
//! the same one.
//!
//! # Startup flow
//!
//! 1. Build a [`WorkerSlotLease`] backend and hand it to
//!    [`LeaseRefreshLoop::start`], which acquires a slot synchronously and
//!    spawns the background refresh task.
//! 2. Construct an [`IdGenerator`] with the acquired slot.
//! 3. Serve [`IdGenerator::next_id`] calls for the process lifetime.
//! 4. On shutdown, cancel the loop's token; the lease is released
//!    best-effort.
//!
//! ```no_run
//! use std::sync::Arc;
//! use snowlease::{
//!     GeneratorConfig, IdGenerator, LeaseConfig, LeaseRefreshLoop,
//!     RedisWorkerSlotLease, WorkerSlotLease,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn start() -> snowlease::Result<()> {
//! let config = LeaseConfig::new("orders");
//! let lease: Arc<dyn WorkerSlotLease> =
//!     Arc::new(RedisWorkerSlotLease::connect("redis://127.0.0.1/", config.clone()).await?);
//!
//! let shutdown = CancellationToken::new();
//! let (worker_id, refresh_task) =
//!     LeaseRefreshLoop::start(Arc::clone(&lease), &config, shutdown.clone()).await?;
//!
//! let generator = IdGenerator::new(worker_id, GeneratorConfig::default())?;
//! let id = generator.next_id()?;
//!
//! shutdown.cancel();
//! refresh_task.await.ok();
//! # Ok(())
//! # }
//! ```
//!
//! # Guarantees and non-guarantees
//!
//! - Ids from one generator are strictly increasing under a non-decreasing
//!   clock; ids from different workers never collide.
//! - There is **no** strict global ordering across processes, only rough
//!   time ordering plus per-process monotonicity.
//! - Issued ids are not persisted anywhere.

mod config;
mod error;
mod generator;
mod health;
mod id;
mod lease;
mod time;

pub use crate::config::{
    DEFAULT_BACKWARD_TOLERANCE, DEFAULT_EPOCH_MS, DEFAULT_REFRESH_INTERVAL, DEFAULT_SESSION_TTL,
    GeneratorConfig, LeaseConfig,
};
pub use crate::error::{Error, Result};
pub use crate::generator::IdGenerator;
pub use crate::health::{Health, HealthStatus};
pub use crate::id::SnowflakeId;
#[cfg(feature = "consul")]
pub use crate::lease::ConsulWorkerSlotLease;
#[cfg(feature = "redis")]
pub use crate::lease::RedisWorkerSlotLease;
pub use crate::lease::{
    LeaseRefreshLoop, MemorySlotStore, MemoryWorkerSlotLease, SLOT_RANGE, WorkerSlotLease,
    process_identity,
};
pub use crate::time::{SystemClock, TimeSource};
