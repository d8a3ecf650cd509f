use crate::status::StatusBoard;
use zbus::{interface, proxy};

pub const BUS_NAME: &str = "org.facewatch.Monitor1";
pub const OBJECT_PATH: &str = "/org/facewatch/Monitor1";

/// D-Bus interface for the facewatch monitor.
///
/// Bus name: org.facewatch.Monitor1
/// Object path: /org/facewatch/Monitor1
pub struct MonitorService {
    status: StatusBoard,
}

impl MonitorService {
    pub fn new(status: StatusBoard) -> Self {
        Self { status }
    }
}

#[interface(name = "org.facewatch.Monitor1")]
impl MonitorService {
    /// Return daemon status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        tracing::debug!("status requested");
        serde_json::to_string(&self.status.snapshot()).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }
}

/// Client side of [`MonitorService`].
#[proxy(
    interface = "org.facewatch.Monitor1",
    default_service = "org.facewatch.Monitor1",
    default_path = "/org/facewatch/Monitor1"
)]
pub trait Monitor {
    fn status(&self) -> zbus::Result<String>;
}

/// Claim the bus name and serve [`MonitorService`] on the session bus.
pub async fn serve(status: StatusBoard) -> zbus::Result<zbus::Connection> {
    zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, MonitorService::new(status))?
        .build()
        .await
}
