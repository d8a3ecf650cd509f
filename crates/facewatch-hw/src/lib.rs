//! facewatch-hw: Webcam capture.
//!
//! Provides V4L2-based camera access delivering RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::FrameError;
