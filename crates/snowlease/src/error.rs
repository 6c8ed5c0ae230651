//! Error types for id generation and worker-slot leasing.
//!
//! The taxonomy follows the failure model of the system:
//! - `ClockBackwardsExceeded`: fatal, surfaced synchronously to the
//!   `next_id()` caller; never retried internally.
//! - `WorkerIdAllocationFailed`: fatal at startup; the process cannot issue
//!   ids without a worker slot.
//! - `WorkerIdConflict`: fatal to the held slot; raised from the refresh
//!   path and surfaced through the health contract.
//! - `Backend`: transient backend failure (network, timeout); logged and
//!   retried by the refresh loop on its next tick.

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for the id generation and lease subsystems.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The wall clock moved backwards past the configured tolerance.
    ///
    /// Small regressions (e.g. NTP corrections) are absorbed by waiting; a
    /// regression beyond the tolerance indicates a misconfigured clock and
    /// is fatal to the caller.
    #[error("clock moved backwards by {behind_ms}ms, exceeding the {tolerance_ms}ms tolerance")]
    ClockBackwardsExceeded { behind_ms: i64, tolerance_ms: i64 },

    /// Every candidate slot in the scan range was already held.
    #[error("workerId allocation failed: no free slot in 0..{scanned}")]
    WorkerIdAllocationFailed { scanned: u16 },

    /// The backing store no longer records this process as the slot owner.
    ///
    /// Continuing to issue ids under this worker id risks collisions; the
    /// hosting layer should treat this as a signal to restart the process.
    #[error("workerId {slot} lock failed: {details}")]
    WorkerIdConflict { slot: u16, details: String },

    /// A transient failure talking to the lease backend.
    #[error("lease backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The provided configuration is unusable.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Wraps an arbitrary backend failure as a transient [`Error::Backend`].
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }

    /// A transient backend failure described only by a message.
    pub(crate) fn backend_msg(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into().into())
    }

    /// Whether the error is fatal to the held slot (as opposed to transient).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::WorkerIdConflict { .. })
    }
}
