use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Capture device settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device path (`/dev/video0`), device name, or a video file.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_device().to_string(),
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

#[cfg(target_os = "macos")]
fn default_device() -> &'static str {
    "0"
}

#[cfg(target_os = "windows")]
fn default_device() -> &'static str {
    "video=Integrated Camera"
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn default_device() -> &'static str {
    "/dev/video0"
}

/// Runtime settings for a recognition session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurretConfig {
    pub camera: CameraConfig,
    /// Prefer a GPU execution provider for ONNX sessions.
    pub use_gpu: bool,
    /// Detector confidence floor, handed to the detector untouched.
    pub det_conf_threshold: f64,
    /// Maximum accepted cosine distance for a match (0 to 2, lower is stricter).
    pub reg_conf_threshold: f32,
    /// Seconds between recognition attempts for a track that is still unknown.
    pub retry_interval_secs: f64,
    /// Bounding box smoothing factor in (0, 1].
    pub alpha: f64,
    /// Seconds a track may go unseen before its state is dropped.
    pub track_ttl_secs: f64,
    /// Worker threads running embedding extraction and matching.
    pub recognition_workers: usize,
    /// Floor for the per-iteration sleep of the processing loop.
    pub min_sleep_ms: u64,
    /// Persisted embedding collection.
    pub database_path: PathBuf,
    /// Directory searched for model files before the user cache.
    pub models_dir: PathBuf,
}

impl Default for TurretConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            use_gpu: true,
            det_conf_threshold: 0.6,
            reg_conf_threshold: 0.5,
            retry_interval_secs: 10.0,
            alpha: 0.2,
            track_ttl_secs: 2.0,
            recognition_workers: 2,
            min_sleep_ms: 1,
            database_path: PathBuf::from("assets/faces/embeddings/w600k_r50_encodings.json"),
            models_dir: PathBuf::from("assets/models"),
        }
    }
}

impl TurretConfig {
    /// Reads a JSON config file; fields missing from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check(
            "det_conf_threshold",
            "between 0.0 and 1.0",
            self.det_conf_threshold,
            (0.0..=1.0).contains(&self.det_conf_threshold),
        )?;
        check(
            "reg_conf_threshold",
            "between 0.0 and 2.0",
            self.reg_conf_threshold,
            (0.0..=2.0).contains(&self.reg_conf_threshold),
        )?;
        check(
            "retry_interval_secs",
            "a non-negative number of seconds",
            self.retry_interval_secs,
            self.retry_interval_secs.is_finite() && self.retry_interval_secs >= 0.0,
        )?;
        check(
            "alpha",
            "in (0.0, 1.0]",
            self.alpha,
            self.alpha > 0.0 && self.alpha <= 1.0,
        )?;
        check(
            "track_ttl_secs",
            "a positive number of seconds",
            self.track_ttl_secs,
            self.track_ttl_secs.is_finite() && self.track_ttl_secs > 0.0,
        )?;
        check(
            "recognition_workers",
            "at least 1",
            self.recognition_workers,
            self.recognition_workers >= 1,
        )?;
        check(
            "camera.fps",
            "at least 1",
            self.camera.fps,
            self.camera.fps >= 1,
        )?;
        Ok(())
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs_f64(self.retry_interval_secs)
    }

    pub fn track_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.track_ttl_secs)
    }

    /// Target duration of one processing iteration.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.camera.fps.max(1) as f64)
    }

    pub fn min_sleep(&self) -> Duration {
        Duration::from_millis(self.min_sleep_ms)
    }
}

fn check(
    field: &'static str,
    expected: &'static str,
    value: impl ToString,
    ok: bool,
) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            expected,
            value: value.to_string(),
        })
    }
}
