use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facewatch_core::{build_gallery, OnnxFaceEngine};
use facewatch_hw::Camera;
use facewatchd::dbus_interface::MonitorProxy;
use facewatchd::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facewatch", about = "facewatch face monitor CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,
    /// Build the reference gallery offline and report each entry
    Gallery {
        /// Config file (default: $XDG_CONFIG_HOME/facewatch/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status => {
            let connection = zbus::Connection::session()
                .await
                .context("cannot connect to session bus")?;
            let proxy = MonitorProxy::new(&connection).await?;
            match proxy.status().await {
                Ok(json) => {
                    let value: serde_json::Value = serde_json::from_str(&json)?;
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "status call failed");
                    println!("facewatchd: not running");
                }
            }
        }
        Commands::Gallery { config } => {
            let config = Config::load(config.as_deref())?;
            println!("Loading models from {}...", config.model_dir.display());
            let mut engine = OnnxFaceEngine::load(&config.model_dir)?;

            let gallery = build_gallery(&mut engine, &config.gallery)?;
            for entry in &config.gallery {
                let embedded = gallery
                    .faces()
                    .iter()
                    .any(|f| f.label == entry.label && f.image_path == entry.image_path);
                let mark = if embedded { "ok     " } else { "skipped" };
                println!("{mark}  {:<20} {}", entry.label, entry.image_path.display());
            }
            println!(
                "{} of {} reference images embedded",
                gallery.len(),
                config.gallery.len()
            );
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}
