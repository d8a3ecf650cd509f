//! Cooldown gate for unknown-face alerts.
//!
//! The cooldown window starts at the dispatch *attempt*. Delivery happens
//! asynchronously in the [`AlertSink`] and its outcome never feeds back here.

use crate::tracker::{TrackId, Transition};
use std::time::{Duration, Instant, SystemTime};

/// Default minimum time between two alert dispatches.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(60_000);

/// An unknown face worth notifying someone about.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    /// Wall-clock time of the detection, for the message body.
    pub detected_at: SystemTime,
    /// Distance to the nearest gallery entry.
    pub distance: f32,
    /// Face track that raised the alert, when tracking per face.
    pub track: Option<TrackId>,
}

/// Non-blocking alert dispatch.
///
/// Implementations must return immediately; delivery and its result are
/// their own concern.
pub trait AlertSink {
    fn dispatch(&self, alert: Alert);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    Dispatched,
    /// Cooldown still active; nothing was sent or queued.
    Suppressed { remaining: Duration },
}

#[derive(Debug, Clone)]
pub struct AlertThrottler {
    cooldown: Duration,
    last_alert: Option<Instant>,
}

impl Default for AlertThrottler {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl AlertThrottler {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_alert: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Instant of the last dispatch attempt, `None` if never alerted.
    pub fn last_alert(&self) -> Option<Instant> {
        self.last_alert
    }

    /// Gate a transition. Returns `None` for transitions to a known label,
    /// which never alert.
    pub fn on_transition(
        &mut self,
        transition: &Transition,
        now: Instant,
        alert: Alert,
        sink: &dyn AlertSink,
    ) -> Option<AlertDecision> {
        if !transition.to.is_unknown() {
            return None;
        }

        // `never` counts as an infinitely long time ago.
        let elapsed = self.last_alert.map(|t| now.saturating_duration_since(t));
        let decision = match elapsed {
            Some(elapsed) if elapsed <= self.cooldown => {
                let remaining = self.cooldown - elapsed;
                tracing::info!(remaining_ms = remaining.as_millis() as u64, "cooldown active; alert suppressed");
                AlertDecision::Suppressed { remaining }
            }
            _ => {
                sink.dispatch(alert);
                self.last_alert = Some(now);
                tracing::info!(cooldown_ms = self.cooldown.as_millis() as u64, "unknown face alert dispatched");
                AlertDecision::Dispatched
            }
        };
        Some(decision)
    }
}
