use facewatch_core::{GalleryEntry, TrackingMode, DEFAULT_COOLDOWN, DEFAULT_DISTANCE_THRESHOLD, UNKNOWN_LABEL};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// How alerts leave the machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum TransportKind {
    /// Write the alert to the log only.
    #[default]
    #[serde(rename = "log")]
    Log,
    /// Send through the EmailJS REST API.
    #[serde(rename = "emailjs")]
    EmailJs,
}

/// Notification recipient, message template and transport credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    pub transport: TransportKind,
    pub recipient_name: String,
    pub recipient_email: String,
    pub from_name: String,
    pub subject: String,
    pub service_id: String,
    pub template_id: String,
    pub public_key: String,
    /// HTTP timeout for one delivery attempt.
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Log,
            recipient_name: "Dean".to_string(),
            recipient_email: String::new(),
            from_name: "FACE RECOGNITION SYSTEM".to_string(),
            subject: "facewatch: unknown face detected".to_string(),
            service_id: String::new(),
            template_id: String::new(),
            public_key: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Daemon configuration: TOML file, then `FACEWATCH_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Ordered reference identities.
    pub gallery: Vec<GalleryEntry>,
    /// L2 embedding distance at or below which a face matches.
    ///
    /// Embeddings are L2-normalised, so distance `d` corresponds to cosine
    /// similarity `1 - d²/2`. The default 0.6 is cosine ≈ 0.82, stricter than
    /// common ArcFace operating points; recalibrate against your own gallery.
    pub distance_threshold: f32,
    /// Minimum time between two alert dispatches.
    pub cooldown_ms: u64,
    /// Detection cycle period.
    pub cycle_period_ms: u64,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    pub tracking: TrackingMode,
    /// Where to write the annotated frame each cycle, if anywhere.
    pub snapshot_path: Option<PathBuf>,
    /// TrueType/OpenType font for snapshot labels.
    pub font_path: Option<PathBuf>,
    pub notify: NotifyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gallery: Vec::new(),
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            cooldown_ms: DEFAULT_COOLDOWN.as_millis() as u64,
            cycle_period_ms: 1000,
            camera_device: "/dev/video0".to_string(),
            frame_width: 640,
            frame_height: 480,
            model_dir: facewatch_core::default_model_dir(),
            tracking: TrackingMode::Aggregate,
            snapshot_path: None,
            font_path: None,
            notify: NotifyConfig::default(),
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/facewatch/config.toml`.
    pub fn default_path() -> PathBuf {
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".config")
            })
            .join("facewatch/config.toml")
    }

    /// Load the config file, apply environment overrides and validate.
    ///
    /// An explicit `path` must exist; the default path may be absent, in
    /// which case built-in defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("FACEWATCH_CONFIG").map(PathBuf::from));

        let path = explicit.clone().unwrap_or_else(Self::default_path);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_toml_str(&text, &path)?,
            Err(e) if explicit.is_none() && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file; using defaults");
                Self::default()
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML; relative gallery image paths resolve against the file's directory.
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(base) = path.parent() {
            for entry in &mut config.gallery {
                if entry.image_path.is_relative() {
                    entry.image_path = base.join(&entry.image_path);
                }
            }
        }
        Ok(config)
    }

    /// Apply `FACEWATCH_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        override_parsed(&lookup, "FACEWATCH_DISTANCE_THRESHOLD", &mut self.distance_threshold);
        override_parsed(&lookup, "FACEWATCH_COOLDOWN_MS", &mut self.cooldown_ms);
        override_parsed(&lookup, "FACEWATCH_CYCLE_PERIOD_MS", &mut self.cycle_period_ms);
        override_parsed(&lookup, "FACEWATCH_FRAME_WIDTH", &mut self.frame_width);
        override_parsed(&lookup, "FACEWATCH_FRAME_HEIGHT", &mut self.frame_height);

        if let Some(device) = lookup("FACEWATCH_CAMERA_DEVICE") {
            self.camera_device = device;
        }
        if let Some(dir) = lookup("FACEWATCH_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("FACEWATCH_SNAPSHOT_PATH") {
            self.snapshot_path = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        if let Some(mode) = lookup("FACEWATCH_TRACKING") {
            match mode.as_str() {
                "aggregate" => self.tracking = TrackingMode::Aggregate,
                "per_face" => self.tracking = TrackingMode::PerFace,
                other => tracing::warn!(value = other, "ignoring unknown FACEWATCH_TRACKING"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for entry in &self.gallery {
            let label = entry.label.trim();
            if label.is_empty() || label.eq_ignore_ascii_case(UNKNOWN_LABEL) {
                return Err(ConfigError::Invalid {
                    key: "gallery",
                    reason: format!("`{}` is not a usable label ({})", entry.label, entry.image_path.display()),
                });
            }
        }
        if !self.distance_threshold.is_finite() || self.distance_threshold <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "distance_threshold",
                reason: format!("must be a positive number, got {}", self.distance_threshold),
            });
        }
        if self.cycle_period_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "cycle_period_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::Invalid {
                key: "frame_width/frame_height",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.notify.transport == TransportKind::EmailJs {
            let n = &self.notify;
            if n.service_id.is_empty() || n.template_id.is_empty() || n.public_key.is_empty() {
                return Err(ConfigError::Invalid {
                    key: "notify",
                    reason: "emailjs transport needs service_id, template_id and public_key".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }
}

fn override_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable override"),
    }
}
