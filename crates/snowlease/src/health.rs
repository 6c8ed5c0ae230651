use core::fmt;

/// Severity reported through the health contract when a check fails.
///
/// `Unhealthy` is the default and what a conflict reports; `Degraded` lets a
/// deployment keep routing traffic while still surfacing the condition.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum HealthStatus {
    /// The lease is valid and refreshing on schedule.
    Healthy,
    /// The check failed but the process may keep serving.
    Degraded,
    /// The check failed and the process should stop serving ids.
    #[default]
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// A point-in-time health report for a worker-slot lease.
///
/// This is the boolean-plus-message pair consumed by external health-check
/// collaborators. Unhealthy messages always name the worker id and a
/// human-readable cause, e.g. `"workerId 3 lock failed: held by other-host"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Health {
    pub status: HealthStatus,
    pub message: String,
}

impl Health {
    /// Reports a healthy lease for `slot`.
    pub fn healthy(slot: u16) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: format!("workerId {slot} lease held"),
        }
    }

    /// Reports a failed check for `slot` with the given severity and cause.
    pub fn failed(status: HealthStatus, slot: Option<u16>, cause: &str) -> Self {
        let message = match slot {
            Some(slot) => format!("workerId {slot} {cause}"),
            None => format!("workerId unassigned: {cause}"),
        };
        Self { status, message }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unhealthy_message_names_the_worker_id() {
        let health = Health::failed(HealthStatus::Unhealthy, Some(3), "lock failed: held by peer");
        assert!(!health.is_healthy());
        assert!(health.message.contains("workerId 3"));
        assert!(health.message.contains("lock failed"));
    }

    #[test]
    fn healthy_report() {
        let health = Health::healthy(7);
        assert!(health.is_healthy());
        assert!(health.message.contains("workerId 7"));
    }
}
