//! Session state
//!
//! The per-camera state machine's states plus the snapshots and reports handed
//! back to callers.

use crate::capture::Resolution;
use crate::encoder::EncodeSummary;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Lifecycle of one camera session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Previewing; nothing is written
    Idle,
    /// Start is waiting for a marker consumer
    WaitingForConsumers,
    /// Frames go to the file and their indices to the marker stream
    Recording,
    /// Terminal
    Stopped,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

/// One camera picked for a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraSelection {
    pub device_index: u32,
    pub file_path: PathBuf,
    pub stream_name: String,
}

impl CameraSelection {
    /// `Cam{i}.mp4` in `output_dir`, streamed as `Cam{i}_Stream`
    pub fn with_defaults(device_index: u32, output_dir: &Path) -> Self {
        Self {
            device_index,
            file_path: output_dir.join(format!("Cam{}.mp4", device_index)),
            stream_name: format!("Cam{}_Stream", device_index),
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub device_index: u32,
    pub file_path: PathBuf,
    pub stream_name: String,
    pub stream_id: String,
    pub state: SessionState,
    pub frame_index: u64,
    pub consumers: usize,
    pub camera_open: bool,
    pub resolution: Option<Resolution>,
    pub frame_rate: Option<f64>,
    pub marker_endpoint: Option<SocketAddr>,
}

/// What a call to `stop` did
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReport {
    pub device_index: u32,
    pub stream_name: String,

    /// Another caller had already stopped the session; nothing was released
    pub already_stopped: bool,

    pub frames_recorded: u64,

    /// Present when the video file was finalised by this call
    pub encode_summary: Option<EncodeSummary>,

    /// Release failures; cleanup continued past each of them
    pub diagnostics: Vec<String>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selection_names() {
        let selection = CameraSelection::with_defaults(2, Path::new("/rec"));
        assert_eq!(selection.file_path, PathBuf::from("/rec/Cam2.mp4"));
        assert_eq!(selection.stream_name, "Cam2_Stream");
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&SessionState::WaitingForConsumers).unwrap();
        assert_eq!(json, "\"waitingforconsumers\"");
        assert_eq!(SessionState::default(), SessionState::Idle);
    }
}
