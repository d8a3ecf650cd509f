//! Shared daemon status: one human-readable line plus counters.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub version: &'static str,
    pub status: String,
    pub gallery: Vec<String>,
    pub cycles: u64,
    pub skipped_ticks: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
    /// Local time of the last alert dispatch.
    pub last_alert: Option<String>,
}

/// Clone-safe handle to the status line. Writes are last-write-wins.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    inner: Arc<Mutex<StatusSnapshot>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatusSnapshot {
                version: env!("CARGO_PKG_VERSION"),
                ..StatusSnapshot::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatusSnapshot> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_status(&self, text: impl Into<String>) {
        let text = text.into();
        let mut inner = self.lock();
        if inner.status != text {
            tracing::info!(status = %text, "status");
            inner.status = text;
        }
    }

    pub fn status(&self) -> String {
        self.lock().status.clone()
    }

    pub fn set_gallery(&self, labels: Vec<String>) {
        self.lock().gallery = labels;
    }

    pub fn record_cycle(&self) {
        self.lock().cycles += 1;
    }

    pub fn record_skipped(&self, ticks: u64) {
        self.lock().skipped_ticks += ticks;
    }

    pub fn record_alert(&self, at: SystemTime) {
        let at: DateTime<Local> = at.into();
        self.lock().last_alert = Some(at.format("%Y-%m-%d %H:%M:%S").to_string());
    }

    pub fn record_deliveries(&self, sent: u64, failed: u64) {
        let mut inner = self.lock();
        inner.alerts_sent = sent;
        inner.alerts_failed = failed;
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let board = StatusBoard::new();
        let other = board.clone();
        board.set_status("Detecting faces...");
        other.set_status("Welcome, Alice");
        board.set_status("Unknown face detected");
        assert_eq!(other.status(), "Unknown face detected");
    }

    #[test]
    fn test_snapshot_serializes_counters() {
        let board = StatusBoard::new();
        board.set_gallery(vec!["Alice".into(), "Bob".into()]);
        board.record_cycle();
        board.record_cycle();
        board.record_skipped(3);
        board.record_alert(SystemTime::now());

        let json = serde_json::to_value(board.snapshot()).unwrap();
        assert_eq!(json["cycles"], 2);
        assert_eq!(json["skipped_ticks"], 3);
        assert_eq!(json["gallery"][1], "Bob");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert!(json["last_alert"].is_string());
    }
}
