//! Configuration: a TOML file with defaults written on first use, then
//! `ROLLCALL_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "rollcall.toml";

const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io at {path}: {source}")]
    Io {
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
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("distance threshold must be finite and positive, got {0}")]
    InvalidThreshold(f32),
    #[error("face size must be {expected} pixels to fit the recognizer input, got {got}")]
    InvalidFaceSize { expected: u32, got: u32 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub data: DataConfig,
    pub matching: MatchingConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory holding the detector and recognizer ONNX files.
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Gallery root: one subdirectory per identity.
    pub dataset_path: PathBuf,
    /// Edge length of aligned face crops fed to the recognizer.
    pub face_size: u32,
    pub detection_confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Euclidean distance below which a face is accepted.
    pub threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub attendance_dir: PathBuf,
    pub reports_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("models") }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("registered_faces"),
            face_size: crate::recognizer::INPUT_SIZE,
            detection_confidence: crate::detector::DEFAULT_CONFIDENCE,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self { threshold: 1.0 }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            attendance_dir: PathBuf::from("Attendance"),
            reports_dir: PathBuf::from("reports"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { request_timeout_secs: 30 }
    }
}

impl Config {
    /// Load `path`, writing the defaults there first if it does not exist,
    /// then apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            Self::default().write(path)?;
            tracing::info!(path = %path.display(), "wrote default config");
        }

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Serialize to `path`, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io { path: path.to_path_buf(), source };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, self.to_toml()?).map_err(io_err)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Override fields from `ROLLCALL_*` variables. Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("ROLLCALL_MODEL_DIR") {
            self.model.dir = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_DATASET_PATH") {
            self.data.dataset_path = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_ATTENDANCE_DIR") {
            self.output.attendance_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_REPORTS_DIR") {
            self.output.reports_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_LOG") {
            self.logging.level = v;
        }
        if let Some(v) = var("ROLLCALL_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.matching.threshold = v;
        }
        if let Some(v) = var("ROLLCALL_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.daemon.request_timeout_secs = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.matching.threshold;
        if !t.is_finite() || t <= 0.0 {
            return Err(ConfigError::InvalidThreshold(t));
        }
        if self.data.face_size != crate::recognizer::INPUT_SIZE {
            return Err(ConfigError::InvalidFaceSize {
                expected: crate::recognizer::INPUT_SIZE,
                got: self.data.face_size,
            });
        }
        Ok(())
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model.dir.join(DETECTOR_MODEL_FILE)
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> PathBuf {
        self.model.dir.join(RECOGNIZER_MODEL_FILE)
    }
}
