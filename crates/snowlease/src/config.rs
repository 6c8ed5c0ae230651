use crate::error::{Error, Result};
use crate::health::HealthStatus;
use crate::id::SnowflakeId;
use core::time::Duration;

/// Default custom epoch: 2020-01-01T00:00:00Z, in Unix milliseconds.
///
/// Every cooperating process must encode against the same epoch, otherwise
/// their ids are not comparable cluster-wide.
pub const DEFAULT_EPOCH_MS: i64 = 1_577_836_800_000;

/// Default tolerance for backward clock drift before `next_id()` fails.
pub const DEFAULT_BACKWARD_TOLERANCE: Duration = Duration::from_secs(2 * 60);

/// Default lease TTL recorded in the backing store.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60);

/// Default cadence of the background refresh loop.
///
/// Several refresh attempts fit inside one TTL window so a single transient
/// backend failure does not cost the slot.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Tuning for a single [`IdGenerator`] instance.
///
/// [`IdGenerator`]: crate::generator::IdGenerator
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// The fixed reference instant subtracted from wall-clock milliseconds
    /// before encoding. Immutable for the generator's lifetime.
    pub epoch_ms: i64,

    /// Maximum backward clock drift absorbed by waiting. Regressions beyond
    /// this fail fast with [`Error::ClockBackwardsExceeded`].
    ///
    /// [`Error::ClockBackwardsExceeded`]: crate::error::Error::ClockBackwardsExceeded
    pub backward_tolerance: Duration,

    /// Sequence value assigned whenever the timestamp advances.
    pub initial_sequence: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            epoch_ms: DEFAULT_EPOCH_MS,
            backward_tolerance: DEFAULT_BACKWARD_TOLERANCE,
            initial_sequence: 0,
        }
    }
}

impl GeneratorConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.epoch_ms < 0 {
            return Err(Error::InvalidConfig {
                reason: "epoch_ms must be non-negative".into(),
            });
        }
        if self.initial_sequence < 0 || self.initial_sequence > SnowflakeId::max_sequence() {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "initial_sequence must be in 0..={}",
                    SnowflakeId::max_sequence()
                ),
            });
        }
        Ok(())
    }
}

/// Configuration shared by all [`WorkerSlotLease`] backends.
///
/// [`WorkerSlotLease`]: crate::lease::WorkerSlotLease
#[derive(Clone, Debug)]
pub struct LeaseConfig {
    /// Logical namespace for slot keys. Processes sharing an `app_name` (and
    /// `key_prefix`) compete for the same slot range.
    pub app_name: String,

    /// Optional namespace prefix prepended to every key.
    pub key_prefix: String,

    /// Lease TTL recorded in the backing store.
    pub session_ttl: Duration,

    /// How often the refresh loop renews the lease.
    pub refresh_interval: Duration,

    /// Severity reported through the health contract on a slot conflict.
    pub unhealthy_status: HealthStatus,
}

impl LeaseConfig {
    /// Creates a configuration for `app_name` with default TTLs and prefix.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            key_prefix: "snowlease".into(),
            session_ttl: DEFAULT_SESSION_TTL,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            unhealthy_status: HealthStatus::Unhealthy,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.app_name.is_empty() {
            return Err(Error::InvalidConfig {
                reason: "app_name must not be empty".into(),
            });
        }
        if self.session_ttl.is_zero() {
            return Err(Error::InvalidConfig {
                reason: "session_ttl must be greater than zero".into(),
            });
        }
        if self.refresh_interval >= self.session_ttl {
            return Err(Error::InvalidConfig {
                reason: "refresh_interval must be shorter than session_ttl".into(),
            });
        }
        if self.unhealthy_status == HealthStatus::Healthy {
            return Err(Error::InvalidConfig {
                reason: "unhealthy_status cannot be Healthy".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        GeneratorConfig::default().validate().unwrap();
        LeaseConfig::new("orders").validate().unwrap();
    }

    #[test]
    fn refresh_interval_must_fit_inside_ttl() {
        let mut config = LeaseConfig::new("orders");
        config.refresh_interval = config.session_ttl;
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn initial_sequence_is_bounded() {
        let config = GeneratorConfig {
            initial_sequence: SnowflakeId::max_sequence() + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn app_name_is_required() {
        assert!(matches!(
            LeaseConfig::new("").validate(),
            Err(Error::InvalidConfig { .. })
        ));
    }
}
