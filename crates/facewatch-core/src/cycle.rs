//! One detection cycle: detect → match → track → (alert) → render.
//!
//! [`CycleDriver`] owns the only state that survives between cycles. It is
//! driven by an external periodic timer, one cycle at a time.

use crate::engine::{EngineError, FaceEngine};
use crate::matcher::Matcher;
use crate::throttle::{Alert, AlertDecision, AlertSink, AlertThrottler};
use crate::tracker::{FaceTracks, TrackId, Transition, TransitionTracker};
use crate::types::{BoundingBox, Detection, Gallery, MatchResult};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;

/// Drawable surface for per-cycle overlays.
pub trait DisplaySurface {
    fn clear(&mut self);
    fn draw_box(&mut self, bbox: &BoundingBox, label: &str, unknown: bool);
    /// Flush the finished overlay. Called once per cycle after all boxes.
    fn present(&mut self, _frame: &RgbImage) {}
}

/// How label history is keyed across cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    /// One label shared by every face in the frame.
    #[default]
    Aggregate,
    /// One label per face track, associated by box overlap.
    PerFace,
}

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("inference failed: {0}")]
    Inference(#[from] EngineError),
}

#[derive(Debug, Clone)]
enum LabelHistory {
    Aggregate(TransitionTracker),
    PerFace(FaceTracks),
}

/// State carried from one cycle to the next.
#[derive(Debug, Clone)]
pub struct CycleState {
    history: LabelHistory,
    throttler: AlertThrottler,
}

impl CycleState {
    /// Fresh state: no prior decision, never alerted.
    pub fn new(mode: TrackingMode, cooldown: Duration) -> Self {
        let history = match mode {
            TrackingMode::Aggregate => LabelHistory::Aggregate(TransitionTracker::new()),
            TrackingMode::PerFace => LabelHistory::PerFace(FaceTracks::default()),
        };
        Self {
            history,
            throttler: AlertThrottler::new(cooldown),
        }
    }

    pub fn last_alert(&self) -> Option<Instant> {
        self.throttler.last_alert()
    }
}

/// Decision for one face in one frame.
#[derive(Debug, Clone)]
pub struct FaceDecision {
    pub bbox: BoundingBox,
    pub result: MatchResult,
    pub track: Option<TrackId>,
    pub transition: Option<Transition>,
    pub alert: Option<AlertDecision>,
}

/// Everything a cycle decided, for the caller's status line and logs.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub faces: Vec<FaceDecision>,
    /// Status text from the last transition of the cycle, if any.
    pub status: Option<String>,
}

impl CycleReport {
    pub fn alerts_dispatched(&self) -> usize {
        self.faces
            .iter()
            .filter(|f| f.alert == Some(AlertDecision::Dispatched))
            .count()
    }
}

/// Status line text for a transition.
pub fn transition_status(transition: &Transition) -> String {
    if transition.to.is_unknown() {
        "Unknown face detected".to_string()
    } else {
        format!("Welcome, {}", transition.to)
    }
}

/// Periodic detection-cycle orchestrator.
pub struct CycleDriver<M> {
    gallery: Arc<Gallery>,
    matcher: M,
    state: CycleState,
    cycles: u64,
}

impl<M: Matcher> CycleDriver<M> {
    pub fn new(gallery: Arc<Gallery>, matcher: M, mode: TrackingMode, cooldown: Duration) -> Self {
        Self {
            gallery,
            matcher,
            state: CycleState::new(mode, cooldown),
            cycles: 0,
        }
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one full cycle on `frame`.
    ///
    /// An inference error ends the cycle before any state is touched; the
    /// overlay is left as it was.
    pub fn run_cycle<E>(
        &mut self,
        engine: &mut E,
        frame: &RgbImage,
        sink: &dyn AlertSink,
        display: &mut dyn DisplaySurface,
        now: Instant,
    ) -> Result<CycleReport, CycleError>
    where
        E: FaceEngine + ?Sized,
    {
        self.cycles += 1;

        // Detecting
        let detections = engine.detect_all(frame)?;
        tracing::trace!(cycle = self.cycles, faces = detections.len(), "detections");

        // Deciding
        let report = self.decide(detections, sink, now, SystemTime::now());

        // Rendering
        display.clear();
        for face in &report.faces {
            display.draw_box(&face.bbox, &face.result.to_string(), face.result.label.is_unknown());
        }
        display.present(frame);

        Ok(report)
    }

    /// Match every detection and feed it through the tracker and throttler,
    /// strictly in detection order.
    pub fn decide(
        &mut self,
        detections: Vec<Detection>,
        sink: &dyn AlertSink,
        now: Instant,
        wall_clock: SystemTime,
    ) -> CycleReport {
        let track_ids: Vec<Option<TrackId>> = match &mut self.state.history {
            LabelHistory::Aggregate(_) => vec![None; detections.len()],
            LabelHistory::PerFace(tracks) => {
                let boxes: Vec<BoundingBox> = detections.iter().map(|d| d.bbox.clone()).collect();
                tracks.associate(&boxes).into_iter().map(Some).collect()
            }
        };

        let mut report = CycleReport::default();

        for (detection, track) in detections.into_iter().zip(track_ids) {
            let result = self.matcher.find_best_match(&detection.embedding, &self.gallery);

            let tracker = match (&mut self.state.history, track) {
                (LabelHistory::Aggregate(tracker), _) => Some(tracker),
                (LabelHistory::PerFace(tracks), Some(id)) => tracks.tracker_mut(id),
                (LabelHistory::PerFace(_), None) => None,
            };
            let transition = tracker.and_then(|t| t.observe(&result.label));

            let mut alert = None;
            if let Some(transition) = &transition {
                tracing::info!(
                    from = transition.from.as_ref().map(|l| l.as_str()).unwrap_or(""),
                    to = %transition.to,
                    distance = result.distance,
                    track,
                    "label transition"
                );
                report.status = Some(transition_status(transition));

                let candidate = Alert {
                    detected_at: wall_clock,
                    distance: result.distance,
                    track,
                };
                alert = self.state.throttler.on_transition(transition, now, candidate, sink);
            }

            report.faces.push(FaceDecision {
                bbox: detection.bbox,
                result,
                track,
                transition,
                alert,
            });
        }

        report
    }
}
