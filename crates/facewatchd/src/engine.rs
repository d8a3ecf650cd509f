use facewatch_core::{CycleDriver, CycleError, CycleReport, DisplaySurface, EuclideanMatcher, FaceEngine};
use facewatch_hw::{Camera, CameraError};
use image::RgbImage;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::notify::Dispatcher;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("{0}")]
    Cycle(#[from] CycleError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Live frame source owned by the engine thread.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<RgbImage, CameraError>;
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<RgbImage, CameraError> {
        self.capture_frame()
    }
}

/// Everything one detection cycle touches. Moved onto the engine thread.
pub struct EngineParts<S, E> {
    pub source: S,
    pub engine: E,
    pub driver: CycleDriver<EuclideanMatcher>,
    pub sink: Dispatcher,
    pub display: Box<dyn DisplaySurface + Send>,
}

/// Messages sent from the async side to the engine thread.
enum EngineRequest {
    Cycle {
        reply: oneshot::Sender<Result<CycleReport, MonitorError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Capture one frame and run a full detection cycle on it.
    pub async fn run_cycle(&self) -> Result<CycleReport, MonitorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Cycle { reply: reply_tx })
            .await
            .map_err(|_| MonitorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| MonitorError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Camera, models and cycle state live on that thread for its whole life;
/// requests are served one at a time in arrival order.
pub fn spawn_engine<S, E>(parts: EngineParts<S, E>) -> Result<EngineHandle, MonitorError>
where
    S: FrameSource + 'static,
    E: FaceEngine + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(1);
    let EngineParts {
        mut source,
        mut engine,
        mut driver,
        sink,
        mut display,
    } = parts;

    std::thread::Builder::new()
        .name("facewatch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Cycle { reply } => {
                        let result = source
                            .next_frame()
                            .map_err(MonitorError::from)
                            .and_then(|frame| {
                                driver
                                    .run_cycle(&mut engine, &frame, &sink, display.as_mut(), Instant::now())
                                    .map_err(MonitorError::from)
                            });
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(MonitorError::Spawn)?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::NotifyConfig;
    use crate::notify::LogTransport;
    use facewatch_core::detector::DetectorError;
    use facewatch_core::{
        BoundingBox, Detection, Embedding, EngineError, Gallery, Label, ReferenceFace, TrackingMode,
    };
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    pub(crate) struct StillSource {
        pub fail_after: Option<usize>,
        pub served: usize,
    }

    impl FrameSource for StillSource {
        fn next_frame(&mut self) -> Result<RgbImage, CameraError> {
            self.served += 1;
            if self.fail_after.is_some_and(|n| self.served > n) {
                return Err(CameraError::CaptureFailed("unplugged".into()));
            }
            Ok(RgbImage::new(8, 8))
        }
    }

    /// Replays one embedding per frame, optionally sleeping to simulate slow
    /// inference. With `fail` set every call is an inference error.
    pub(crate) struct ReplayEngine {
        pub frames: VecDeque<Vec<f32>>,
        pub delay: Duration,
        pub fail: bool,
    }

    impl ReplayEngine {
        pub(crate) fn new(frames: Vec<Vec<f32>>) -> Self {
            Self {
                frames: frames.into(),
                delay: Duration::ZERO,
                fail: false,
            }
        }
    }

    impl FaceEngine for ReplayEngine {
        fn detect_all(&mut self, _image: &RgbImage) -> Result<Vec<Detection>, EngineError> {
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(DetectorError::InferenceFailed("session lost".into()).into());
            }
            Ok(self
                .frames
                .pop_front()
                .map(|values| {
                    vec![Detection {
                        bbox: BoundingBox {
                            x: 0.0, y: 0.0, width: 4.0, height: 4.0, confidence: 0.9, landmarks: None,
                        },
                        embedding: Embedding::new(values),
                    }]
                })
                .unwrap_or_default())
        }
    }

    pub(crate) fn parts(
        source: StillSource,
        engine: ReplayEngine,
    ) -> EngineParts<StillSource, ReplayEngine> {
        let gallery = Arc::new(Gallery::new(vec![ReferenceFace {
            label: "Alice".into(),
            image_path: "alice.jpg".into(),
            embedding: Embedding::new(vec![0.0, 0.0]),
        }]));
        EngineParts {
            source,
            engine,
            driver: CycleDriver::new(
                gallery,
                EuclideanMatcher::new(0.6),
                TrackingMode::Aggregate,
                Duration::from_secs(60),
            ),
            sink: Dispatcher::new(
                Arc::new(LogTransport),
                NotifyConfig::default(),
                tokio::runtime::Handle::current(),
            ),
            display: Box::new(crate::display::LogDisplay),
        }
    }

    #[tokio::test]
    async fn test_cycles_run_in_order_on_engine_thread() {
        let engine = ReplayEngine::new(vec![vec![0.1, 0.0], vec![0.9, 0.0]]);
        let handle = spawn_engine(parts(StillSource { fail_after: None, served: 0 }, engine)).unwrap();

        let first = handle.run_cycle().await.unwrap();
        assert_eq!(first.faces[0].result.label, Label::Known("Alice".into()));
        assert_eq!(first.status.as_deref(), Some("Welcome, Alice"));

        let second = handle.run_cycle().await.unwrap();
        assert_eq!(second.alerts_dispatched(), 1);
        assert_eq!(second.status.as_deref(), Some("Unknown face detected"));
    }

    #[tokio::test]
    async fn test_camera_error_is_reported_per_cycle() {
        let engine = ReplayEngine::new(vec![]);
        let handle = spawn_engine(parts(StillSource { fail_after: Some(1), served: 0 }, engine)).unwrap();

        assert!(handle.run_cycle().await.is_ok());
        assert!(matches!(handle.run_cycle().await, Err(MonitorError::Camera(_))));
        // The thread keeps serving after a failed cycle.
        assert!(matches!(handle.run_cycle().await, Err(MonitorError::Camera(_))));
    }

    #[tokio::test]
    async fn test_inference_error_is_reported_per_cycle() {
        let engine = ReplayEngine {
            fail: true,
            ..ReplayEngine::new(vec![vec![0.9, 0.0]])
        };
        let handle = spawn_engine(parts(StillSource { fail_after: None, served: 0 }, engine)).unwrap();

        assert!(matches!(handle.run_cycle().await, Err(MonitorError::Cycle(_))));
        assert!(matches!(handle.run_cycle().await, Err(MonitorError::Cycle(_))));
    }
}
