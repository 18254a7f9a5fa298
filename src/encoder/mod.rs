//! Video encoding
//!
//! The session engine writes frames through the `FrameEncoder` trait; the
//! production implementation pipes raw frames into an FFmpeg child process.

pub mod ffmpeg;

use crate::capture::{Frame, Resolution};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use ffmpeg::{EncoderSettings, FfmpegEncoder, FfmpegEncoderFactory};

/// Errors from the encoding pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncoderError {
    #[error("FFmpeg not found at `{0}`. Please install ffmpeg.")]
    FfmpegNotFound(String),

    #[error("Failed to start encoder: {0}")]
    SpawnFailed(String),

    #[error("Invalid encoder parameters: {0}")]
    InvalidParameters(String),

    #[error("Frame is {actual}, encoder expects {expected}")]
    FrameMismatch {
        expected: Resolution,
        actual: Resolution,
    },

    #[error("Failed to write frame: {0}")]
    WriteFailed(String),

    #[error("Encoder process failed with exit code {exit_code}: {stderr}")]
    ProcessFailed { exit_code: i32, stderr: String },

    #[error("Encoder is not open")]
    NotOpen,
}

pub type EncoderResult<T> = Result<T, EncoderError>;

/// What to encode and where
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSpec {
    pub output_path: PathBuf,
    pub resolution: Resolution,
    pub frame_rate: f64,
}

/// Outcome of a finished encode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeSummary {
    pub output_path: PathBuf,
    pub frames_written: u64,
}

/// An open encoder bound to one output file
pub trait FrameEncoder: Send {
    /// Append one frame. Frames must match the resolution the encoder was opened with.
    fn write_frame(&mut self, frame: &Frame) -> EncoderResult<()>;

    /// Flush and close the output. Called at most once by `VideoSink`.
    fn finish(&mut self) -> EncoderResult<EncodeSummary>;
}

/// Opens encoders for sessions
pub trait EncoderFactory: Send + Sync {
    fn open(&self, spec: &EncoderSpec) -> EncoderResult<Box<dyn FrameEncoder>>;
}
