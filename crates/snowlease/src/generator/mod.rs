#[cfg(test)]
mod tests;

use core::cmp::Ordering;
use core::time::Duration;

use parking_lot::Mutex;

use crate::config::GeneratorConfig;
use crate::error::{Error, Result};
use crate::id::SnowflakeId;
use crate::time::{SystemClock, TimeSource};

/// Mutable generator state. Only ever touched inside the critical section.
struct ClockState {
    last_ms: i64,
    sequence: i64,
}

/// A thread-safe Snowflake id generator bound to one worker slot.
///
/// The generator owns the `(last_ms, sequence)` pair behind a
/// [`parking_lot::Mutex`]; concurrent callers observe serialized, consistent
/// state. The worker id is handed over once at construction (typically from a
/// [`WorkerSlotLease`]) and never changes.
///
/// `next_id()` never blocks indefinitely under normal clock behavior: the
/// only waits are a bounded catch-up after a small backward clock correction
/// and the spin until the next millisecond once the per-millisecond sequence
/// space is exhausted. Both are bounded by real wall-clock progression, not
/// by other callers.
///
/// # Example
/// ```
/// use snowlease::{GeneratorConfig, IdGenerator};
///
/// let generator = IdGenerator::new(3, GeneratorConfig::default()).unwrap();
/// let a = generator.next_id().unwrap();
/// let b = generator.next_id().unwrap();
/// assert!(b > a);
/// ```
///
/// [`WorkerSlotLease`]: crate::lease::WorkerSlotLease
pub struct IdGenerator<T: TimeSource = SystemClock> {
    worker_id: i64,
    epoch_ms: i64,
    tolerance_ms: i64,
    initial_sequence: i64,
    state: Mutex<ClockState>,
    time: T,
}

impl IdGenerator<SystemClock> {
    /// Creates a generator for `worker_id` using the system wall clock.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `worker_id` exceeds the id
    /// layout's worker field or the config is unusable.
    pub fn new(worker_id: u16, config: GeneratorConfig) -> Result<Self> {
        Self::with_time_source(worker_id, config, SystemClock)
    }
}

impl<T: TimeSource> IdGenerator<T> {
    /// Creates a generator with an explicit [`TimeSource`].
    ///
    /// Production code wants [`IdGenerator::new`]; this constructor exists so
    /// tests can inject deterministic clocks.
    pub fn with_time_source(worker_id: u16, config: GeneratorConfig, time: T) -> Result<Self> {
        config.validate()?;
        if i64::from(worker_id) > SnowflakeId::max_worker_id() {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "worker_id {worker_id} exceeds layout maximum {}",
                    SnowflakeId::max_worker_id()
                ),
            });
        }
        Ok(Self {
            worker_id: i64::from(worker_id),
            epoch_ms: config.epoch_ms,
            tolerance_ms: config.backward_tolerance.as_millis() as i64,
            initial_sequence: config.initial_sequence,
            state: Mutex::new(ClockState {
                last_ms: 0,
                sequence: config.initial_sequence,
            }),
            time,
        })
    }

    /// The worker id embedded in every generated id.
    pub fn worker_id(&self) -> u16 {
        self.worker_id as u16
    }

    /// Generates the next id as a raw `i64`.
    ///
    /// # Errors
    /// Returns [`Error::ClockBackwardsExceeded`] if the wall clock regressed
    /// past the configured tolerance. This is fatal and not retried
    /// internally.
    pub fn next_id(&self) -> Result<i64> {
        self.next().map(|id| id.to_raw())
    }

    /// Generates the next id as a typed [`SnowflakeId`].
    pub fn next(&self) -> Result<SnowflakeId> {
        let mut state = self.state.lock();
        loop {
            let now = self.time.current_millis();
            match now.cmp(&state.last_ms) {
                Ordering::Less => {
                    self.wait_for_clock_catch_up(&state, now)?;
                }
                Ordering::Equal => {
                    state.sequence = (state.sequence + 1) & SnowflakeId::max_sequence();
                    if state.sequence == 0 {
                        // Sequence space exhausted for this millisecond: hold
                        // the section until the clock ticks over, then take
                        // the fresh-millisecond path.
                        self.spin_until_after(state.last_ms);
                        continue;
                    }
                    return Ok(self.encode(now, state.sequence));
                }
                Ordering::Greater => {
                    state.sequence = self.initial_sequence;
                    state.last_ms = now;
                    return Ok(self.encode(now, state.sequence));
                }
            }
        }
    }

    fn encode(&self, now: i64, sequence: i64) -> SnowflakeId {
        debug_assert!(now >= self.epoch_ms, "clock reads before the custom epoch");
        SnowflakeId::from_components(now - self.epoch_ms, self.worker_id, sequence)
    }

    /// Absorbs a small backward clock correction by sleeping until the clock
    /// catches back up to `last_ms`. Regressions beyond the tolerance are
    /// fatal.
    #[cold]
    fn wait_for_clock_catch_up(&self, state: &ClockState, now: i64) -> Result<()> {
        let behind_ms = state.last_ms - now;
        if behind_ms > self.tolerance_ms {
            return Err(Error::ClockBackwardsExceeded {
                behind_ms,
                tolerance_ms: self.tolerance_ms,
            });
        }
        std::thread::sleep(Duration::from_millis(1));
        Ok(())
    }

    #[cold]
    fn spin_until_after(&self, last_ms: i64) {
        while self.time.current_millis() <= last_ms {
            core::hint::spin_loop();
        }
    }
}
