//! Periodic detection loop.
//!
//! One cycle in flight at a time: the next tick is only awaited after the
//! previous cycle has replied, and ticks missed meanwhile are skipped rather
//! than queued.

use crate::engine::{EngineHandle, MonitorError};
use crate::notify::DeliveryStats;
use crate::status::StatusBoard;
use facewatch_core::AlertDecision;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::time::MissedTickBehavior;

pub struct Monitor {
    engine: EngineHandle,
    status: StatusBoard,
    deliveries: Arc<DeliveryStats>,
    period: Duration,
}

impl Monitor {
    pub fn new(engine: EngineHandle, status: StatusBoard, deliveries: Arc<DeliveryStats>, period: Duration) -> Self {
        Self {
            engine,
            status,
            deliveries,
            period,
        }
    }

    /// Run cycles every `period` until `shutdown` resolves or the engine
    /// thread goes away.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), MonitorError> {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("monitor stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            match self.engine.run_cycle().await {
                Ok(report) => {
                    self.status.record_cycle();
                    if report.faces.iter().any(|f| f.alert == Some(AlertDecision::Dispatched)) {
                        self.status.record_alert(SystemTime::now());
                    }
                    if let Some(text) = report.status {
                        self.status.set_status(text);
                    }
                    tracing::debug!(faces = report.faces.len(), "cycle complete");
                }
                Err(MonitorError::ChannelClosed) => return Err(MonitorError::ChannelClosed),
                Err(e) => {
                    self.status.record_cycle();
                    tracing::warn!(error = %e, "detection cycle failed");
                    self.status.set_status(match &e {
                        MonitorError::Camera(inner) => format!("Camera access error: {inner}"),
                        other => format!("Detection error: {other}"),
                    });
                }
            }
            self.status
                .record_deliveries(self.deliveries.sent(), self.deliveries.failed());

            let elapsed = started.elapsed();
            if elapsed > self.period {
                let skipped = (elapsed.as_nanos() / self.period.as_nanos()) as u64;
                tracing::warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    skipped,
                    "cycle overran its period; skipping ticks"
                );
                self.status.record_skipped(skipped);
            }
        }
    }
}
