//! FFmpeg encoder for session video files
//!
//! Raw RGB24 frames are written to FFmpeg's stdin and encoded to H.264 MP4.

use super::{EncodeSummary, EncoderError, EncoderFactory, EncoderResult, EncoderSpec, FrameEncoder};
use crate::capture::Frame;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::{Child, ChildStdin, Command, Stdio};

/// Encoder settings shared by every session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncoderSettings {
    /// FFmpeg executable
    pub ffmpeg_path: String,

    /// Video codec (H.264 class)
    pub codec: String,

    /// Encoder preset
    pub preset: String,

    /// Constant rate factor; lower is higher quality
    pub crf: u8,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 18,
        }
    }
}

/// Build the FFmpeg argument list for one session file
pub fn build_encoder_args(settings: &EncoderSettings, spec: &EncoderSpec) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-nostats".to_string(),
        "-y".to_string(), // Overwrite output
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pixel_format".to_string(),
        "rgb24".to_string(),
        "-video_size".to_string(),
        spec.resolution.to_string(),
        "-framerate".to_string(),
        spec.frame_rate.to_string(),
        "-i".to_string(),
        "-".to_string(), // Read from stdin
        "-c:v".to_string(),
        settings.codec.clone(),
        "-preset".to_string(),
        settings.preset.clone(),
        "-crf".to_string(),
        settings.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(), // Required for player compatibility
        "-movflags".to_string(),
        "+faststart".to_string(),
        spec.output_path.to_string_lossy().to_string(),
    ]
}

/// Opens an `FfmpegEncoder` per session
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoderFactory {
    settings: EncoderSettings,
}

impl FfmpegEncoderFactory {
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn open(&self, spec: &EncoderSpec) -> EncoderResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(FfmpegEncoder::spawn(&self.settings, spec)?))
    }
}

/// FFmpeg child process fed with raw frames
pub struct FfmpegEncoder {
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    spec: EncoderSpec,
    frames_written: u64,
}

impl FfmpegEncoder {
    pub fn spawn(settings: &EncoderSettings, spec: &EncoderSpec) -> EncoderResult<Self> {
        if spec.resolution.is_empty() {
            return Err(EncoderError::InvalidParameters(format!(
                "resolution {} has no pixels",
                spec.resolution
            )));
        }
        if !(spec.frame_rate.is_finite() && spec.frame_rate > 0.0) {
            return Err(EncoderError::InvalidParameters(format!(
                "frame rate {} is not positive",
                spec.frame_rate
            )));
        }

        if let Some(parent) = spec.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| EncoderError::SpawnFailed(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let args = build_encoder_args(settings, spec);
        tracing::debug!("FFmpeg args: {:?}", args);

        let mut process = Command::new(&settings.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    EncoderError::FfmpegNotFound(settings.ffmpeg_path.clone())
                }
                _ => EncoderError::SpawnFailed(e.to_string()),
            })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EncoderError::SpawnFailed("Failed to capture FFmpeg stdin".to_string()))?;

        tracing::info!(
            "Started FFmpeg encoder: {} @ {}fps, codec={}, output: {}",
            spec.resolution,
            spec.frame_rate,
            settings.codec,
            spec.output_path.display()
        );

        Ok(Self {
            process: Some(process),
            stdin: Some(stdin),
            spec: spec.clone(),
            frames_written: 0,
        })
    }
}

impl FrameEncoder for FfmpegEncoder {
    fn write_frame(&mut self, frame: &Frame) -> EncoderResult<()> {
        if frame.resolution() != self.spec.resolution {
            return Err(EncoderError::FrameMismatch {
                expected: self.spec.resolution,
                actual: frame.resolution(),
            });
        }

        let stdin = self.stdin.as_mut().ok_or(EncoderError::NotOpen)?;
        stdin
            .write_all(&frame.data)
            .map_err(|e| EncoderError::WriteFailed(e.to_string()))?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> EncoderResult<EncodeSummary> {
        // Close stdin to signal EOF
        drop(self.stdin.take());

        let process = self.process.take().ok_or(EncoderError::NotOpen)?;
        let output = process
            .wait_with_output()
            .map_err(|e| EncoderError::WriteFailed(format!("FFmpeg wait failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(EncoderError::ProcessFailed {
                exit_code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        tracing::info!(
            "FFmpeg encoder finished: {} frames, output: {}",
            self.frames_written,
            self.spec.output_path.display()
        );

        Ok(EncodeSummary {
            output_path: self.spec.output_path.clone(),
            frames_written: self.frames_written,
        })
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut process) = self.process.take() {
            tracing::warn!(
                "FFmpeg encoder for {} dropped without finishing, killing process",
                self.spec.output_path.display()
            );
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}
