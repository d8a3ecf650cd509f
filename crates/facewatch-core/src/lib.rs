//! facewatch-core: Identity matching and alert decision loop.
//!
//! Builds a labelled gallery of reference embeddings, matches live faces
//! against it, and turns label transitions into rate-limited alerts.
//! Face inference uses SCRFD for detection and ArcFace for embeddings via
//! ONNX Runtime.

pub mod alignment;
pub mod cycle;
pub mod detector;
pub mod engine;
pub mod gallery;
pub mod matcher;
pub mod recognizer;
pub mod throttle;
pub mod tracker;
pub mod types;

pub use cycle::{CycleDriver, CycleError, CycleReport, DisplaySurface, FaceDecision, TrackingMode};
pub use engine::{default_model_dir, EngineError, FaceEngine, OnnxFaceEngine};
pub use gallery::{build_gallery, GalleryEntry, GalleryError};
pub use matcher::{EuclideanMatcher, Matcher, DEFAULT_DISTANCE_THRESHOLD};
pub use throttle::{Alert, AlertDecision, AlertSink, AlertThrottler, DEFAULT_COOLDOWN};
pub use tracker::{TrackId, Transition, TransitionTracker};
pub use types::{BoundingBox, Detection, Embedding, Gallery, Label, MatchResult, ReferenceFace, UNKNOWN_LABEL};
