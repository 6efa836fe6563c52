use std::sync::atomic::{AtomicU8, Ordering};

use twin_client::{ChatBackend, ClientResult, FailureKind, HealthStatus};

/// State of the "connected" indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connectivity {
    Unknown,
    Online,
    Offline,
}

impl Connectivity {
    fn as_u8(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Online => 1,
            Self::Offline => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Online,
            2 => Self::Offline,
            _ => Self::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Tracks whether the backend was reachable the last time we talked to it.
#[derive(Debug)]
pub struct ConnectionMonitor {
    state: AtomicU8,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(Connectivity::Unknown.as_u8()),
        }
    }

    pub fn current(&self) -> Connectivity {
        Connectivity::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn mark_online(&self) {
        self.set(Connectivity::Online);
    }

    pub fn mark_offline(&self) {
        self.set(Connectivity::Offline);
    }

    /// Applies the result of a finished exchange. Only connection-level
    /// failures say anything about reachability.
    pub fn record_exchange(&self, failure: Option<FailureKind>) {
        match failure {
            None => self.mark_online(),
            Some(FailureKind::Connection) => self.mark_offline(),
            Some(_) => {}
        }
    }

    /// Calls the health endpoint and updates the indicator from the answer.
    pub async fn probe(&self, backend: &dyn ChatBackend) -> ClientResult<HealthStatus> {
        match backend.health().await {
            Ok(status) => {
                if status.is_healthy() {
                    self.mark_online();
                } else {
                    tracing::warn!(status = %status.status, "backend reported unhealthy status");
                    self.mark_offline();
                }
                Ok(status)
            }
            Err(error) => {
                tracing::warn!(error = %error, stage = error.stage(), "health probe failed");
                self.mark_offline();
                Err(error)
            }
        }
    }

    fn set(&self, next: Connectivity) {
        let previous = Connectivity::from_u8(self.state.swap(next.as_u8(), Ordering::AcqRel));
        if previous != next {
            tracing::info!(from = previous.label(), to = next.label(), "connectivity changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubBackend;

    #[test]
    fn exchange_results_drive_the_indicator() {
        let monitor = ConnectionMonitor::new();
        assert_eq!(monitor.current(), Connectivity::Unknown);

        monitor.record_exchange(Some(FailureKind::Connection));
        assert_eq!(monitor.current(), Connectivity::Offline);

        monitor.record_exchange(Some(FailureKind::Timeout));
        assert_eq!(monitor.current(), Connectivity::Offline);

        monitor.record_exchange(None);
        assert_eq!(monitor.current(), Connectivity::Online);
    }

    #[tokio::test]
    async fn probe_accepts_ok_and_healthy() {
        let monitor = ConnectionMonitor::new();

        for status in ["ok", "healthy"] {
            monitor.mark_offline();
            let backend = StubBackend::new().with_health(status);
            monitor.probe(&backend).await.unwrap();
            assert_eq!(monitor.current(), Connectivity::Online);
        }
    }

    #[tokio::test]
    async fn probe_with_other_status_goes_offline() {
        let monitor = ConnectionMonitor::new();
        monitor.mark_online();
        let backend = StubBackend::new().with_health("degraded");

        let status = monitor.probe(&backend).await.unwrap();

        assert!(!status.is_healthy());
        assert_eq!(monitor.current(), Connectivity::Offline);
    }

    #[tokio::test]
    async fn failed_probe_goes_offline() {
        let monitor = ConnectionMonitor::new();
        monitor.mark_online();
        let backend = StubBackend::new();

        assert!(monitor.probe(&backend).await.is_err());
        assert_eq!(monitor.current(), Connectivity::Offline);
    }
}
