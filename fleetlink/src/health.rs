use crate::connection::Connectivity;
use crate::state::{new_state, snapshot, Shared};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkHealthReport {
    pub uptime_seconds: u64,
    pub link_status: String,
    pub link_reconnects: u32,
    pub failed_attempts: u32,
    pub badge: String,
}

/// Connection health as shown in the status badge, fed from the
/// connection manager's connectivity notifications.
#[derive(Clone)]
pub struct LinkHealth {
    start_time: Instant,
    reconnects: Arc<AtomicU32>,
    failed_attempts: Arc<AtomicU32>,
    status: Shared<String>,
}

impl LinkHealth {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            reconnects: Arc::new(AtomicU32::new(0)),
            failed_attempts: Arc::new(AtomicU32::new(0)),
            status: new_state("connecting".to_string()),
        }
    }

    pub fn record(&self, change: Connectivity) {
        match change {
            Connectivity::Connected => self.mark_connected(),
            Connectivity::Disconnected { attempts } => self.mark_disconnected(attempts),
        }
    }

    pub fn mark_connected(&self) {
        self.failed_attempts.store(0, Ordering::Relaxed);
        *self.status.lock() = "connected".to_string();
    }

    pub fn mark_disconnected(&self, attempts: u32) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        self.failed_attempts.store(attempts, Ordering::Relaxed);
        *self.status.lock() = "disconnected".to_string();
    }

    pub fn is_connected(&self) -> bool {
        *self.status.lock() == "connected"
    }

    /// `LINKED`, `OFFLINE`, or `OFFLINE (n)` once more than one attempt failed.
    pub fn badge(&self) -> String {
        if self.is_connected() {
            return "LINKED".to_string();
        }
        match self.failed_attempts.load(Ordering::Relaxed) {
            n if n > 1 => format!("OFFLINE ({n})"),
            _ => "OFFLINE".to_string(),
        }
    }

    pub fn report(&self) -> LinkHealthReport {
        LinkHealthReport {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            link_status: snapshot(&self.status),
            link_reconnects: self.reconnects.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            badge: self.badge(),
        }
    }
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_badge_follows_connectivity() {
        let health = LinkHealth::new();
        assert_eq!(health.badge(), "OFFLINE");

        health.record(Connectivity::Disconnected { attempts: 1 });
        assert_eq!(health.badge(), "OFFLINE");
        health.record(Connectivity::Disconnected { attempts: 3 });
        assert_eq!(health.badge(), "OFFLINE (3)");

        health.record(Connectivity::Connected);
        assert_eq!(health.badge(), "LINKED");

        let report = health.report();
        assert_eq!(report.link_status, "connected");
        assert_eq!(report.link_reconnects, 2);
        assert_eq!(report.failed_attempts, 0);
    }
}
