//! Recorder configuration
//!
//! Every field has a default, so a config file only needs the values it changes.

use crate::encoder::EncoderSettings;
use crate::utils::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Where video files go when a selection gives a relative path
    pub output_dir: PathBuf,

    /// How long a consumer-gated start waits for a subscriber
    pub consumer_wait_secs: u64,

    pub liveness_interval_secs: u64,

    /// Delay before retrying after the camera returned no frame
    pub empty_frame_backoff_ms: u64,

    pub loop_yield_ms: u64,

    pub camera_open_timeout_secs: u64,

    /// Used when the camera does not report a usable frame rate
    pub fallback_fps: f64,

    pub marker_bind_addr: IpAddr,

    /// 0 picks ephemeral ports; otherwise each session gets base + its position
    pub marker_base_port: u16,

    pub encoder: EncoderSettings,

    /// Burn FPS and frame index into the frames
    pub overlay: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            consumer_wait_secs: 1200,
            liveness_interval_secs: 5,
            empty_frame_backoff_ms: 10,
            loop_yield_ms: 1,
            camera_open_timeout_secs: 10,
            fallback_fps: 30.0,
            marker_bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            marker_base_port: 0,
            encoder: EncoderSettings::default(),
            overlay: true,
        }
    }
}

impl RecorderConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: RecorderConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        tracing::debug!("Loaded recorder config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.liveness_interval_secs == 0 {
            return Err(AppError::Config(
                "livenessIntervalSecs must be at least 1".to_string(),
            ));
        }
        if !(self.fallback_fps.is_finite() && self.fallback_fps > 0.0) {
            return Err(AppError::Config(format!(
                "fallbackFps must be positive, got {}",
                self.fallback_fps
            )));
        }
        if self.camera_open_timeout_secs == 0 {
            return Err(AppError::Config(
                "cameraOpenTimeoutSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Timing knobs handed to each session
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            consumer_wait: Duration::from_secs(self.consumer_wait_secs),
            liveness_interval: Duration::from_secs(self.liveness_interval_secs),
            empty_frame_backoff: Duration::from_millis(self.empty_frame_backoff_ms),
            loop_yield: Duration::from_millis(self.loop_yield_ms),
            camera_open_timeout: Duration::from_secs(self.camera_open_timeout_secs),
            fallback_fps: self.fallback_fps,
            overlay: self.overlay,
        }
    }
}

/// Per-session timing and behaviour
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub consumer_wait: Duration,
    pub liveness_interval: Duration,
    pub empty_frame_backoff: Duration,
    pub loop_yield: Duration,
    pub camera_open_timeout: Duration,
    pub fallback_fps: f64,
    pub overlay: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        RecorderConfig::default().session_options()
    }
}
