use std::time::{SystemTime, UNIX_EPOCH};

/// A source of wall-clock time in Unix milliseconds.
///
/// The generator compares successive readings to detect backward drift, so
/// implementations should reflect the real wall clock (including corrections
/// such as NTP adjustments) rather than a monotonic timer. Tests substitute
/// deterministic implementations.
pub trait TimeSource: Send + Sync {
    /// Returns the current time as milliseconds since the Unix epoch.
    fn current_millis(&self) -> i64;
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn current_millis(&self) -> i64 {
        (**self).current_millis()
    }
}

/// The default [`TimeSource`], backed by [`SystemTime`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn current_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_past_default_epoch() {
        let now = SystemClock.current_millis();
        assert!(now > crate::config::DEFAULT_EPOCH_MS);
    }
}
