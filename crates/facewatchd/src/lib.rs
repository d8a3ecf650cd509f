//! facewatchd: Camera-driven face identity monitor.
//!
//! Owns the camera and inference models on a dedicated engine thread,
//! drives one detection cycle per period and dispatches throttled alerts
//! for unknown faces. Status is exposed over the session D-Bus.

pub mod config;
pub mod dbus_interface;
pub mod display;
pub mod engine;
pub mod monitor;
pub mod notify;
pub mod status;

pub use config::{Config, ConfigError, NotifyConfig, TransportKind};
pub use engine::{spawn_engine, EngineHandle, EngineParts, FrameSource, MonitorError};
pub use monitor::Monitor;
pub use notify::{AlertMessage, Dispatcher, NotifyError, Transport};
pub use status::{StatusBoard, StatusSnapshot};
