use anyhow::{Context, Result};
use clap::Parser;
use facewatch_core::{build_gallery, CycleDriver, DisplaySurface, EuclideanMatcher, OnnxFaceEngine};
use facewatch_hw::Camera;
use facewatchd::display::{LogDisplay, SnapshotDisplay};
use facewatchd::{dbus_interface, notify, spawn_engine, Config, Dispatcher, EngineParts, Monitor, StatusBoard};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facewatchd", about = "facewatch face monitoring daemon")]
struct Args {
    /// Config file (default: $FACEWATCH_CONFIG, then $XDG_CONFIG_HOME/facewatch/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    tracing::info!("facewatchd starting");

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    tracing::info!(
        threshold = config.distance_threshold,
        cooldown_ms = config.cooldown_ms,
        period_ms = config.cycle_period_ms,
        tracking = ?config.tracking,
        gallery = config.gallery.len(),
        "configuration loaded"
    );

    let status = StatusBoard::new();

    status.set_status("Loading models...");
    let model_dir = config.model_dir.clone();
    let loaded = tokio::task::spawn_blocking(move || OnnxFaceEngine::load(&model_dir)).await?;
    let mut engine = match loaded {
        Ok(engine) => engine,
        Err(e) => {
            status.set_status(format!("Failed to load models: {e}"));
            return Err(e).context("model load failed");
        }
    };

    status.set_status("Models loaded. Starting camera...");
    let camera = match Camera::open(&config.camera_device, config.frame_width, config.frame_height) {
        Ok(camera) => camera,
        Err(e) => {
            status.set_status(format!("Camera access error: {e}"));
            return Err(e).context("camera open failed");
        }
    };
    tracing::info!(
        device = %camera.device_path,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    let entries = config.gallery.clone();
    let (engine, built) = tokio::task::spawn_blocking(move || {
        let gallery = build_gallery(&mut engine, &entries);
        (engine, gallery)
    })
    .await?;
    let gallery = built.context("gallery build failed")?;
    if gallery.is_empty() {
        tracing::warn!("gallery is empty; every face will be reported as unknown");
    }
    status.set_gallery(gallery.labels().map(str::to_string).collect());

    let display: Box<dyn DisplaySurface + Send> = match &config.snapshot_path {
        Some(path) => Box::new(
            SnapshotDisplay::new(path, config.font_path.as_deref()).context("snapshot display setup failed")?,
        ),
        None => Box::new(LogDisplay),
    };

    let transport = notify::transport_from_config(&config.notify).context("notification transport setup failed")?;
    tracing::info!(transport = transport.name(), "notifications ready");
    let sink = Dispatcher::new(transport, config.notify.clone(), tokio::runtime::Handle::current());
    let deliveries = sink.stats();

    let driver = CycleDriver::new(
        Arc::new(gallery),
        EuclideanMatcher::new(config.distance_threshold),
        config.tracking,
        config.cooldown(),
    );
    let handle = spawn_engine(EngineParts {
        source: camera,
        engine,
        driver,
        sink,
        display,
    })?;

    // The monitor runs without the bus when no session bus is available.
    let _connection = match dbus_interface::serve(status.clone()).await {
        Ok(conn) => {
            tracing::info!(name = dbus_interface::BUS_NAME, "D-Bus service registered");
            Some(conn)
        }
        Err(e) => {
            tracing::warn!(error = %e, "D-Bus unavailable; status queries disabled");
            None
        }
    };

    status.set_status("Detecting faces...");
    tracing::info!("facewatchd ready");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
    };
    Monitor::new(handle, status, deliveries, config.cycle_period())
        .run(shutdown)
        .await?;

    tracing::info!("facewatchd shutting down");
    Ok(())
}
