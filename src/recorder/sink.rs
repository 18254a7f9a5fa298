//! Video sink
//!
//! Owns one session's encoder. A sink that failed to open stays around so the
//! session can report why, and so `release` is uniform for every session.

use crate::capture::Frame;
use crate::encoder::{EncodeSummary, EncoderError, EncoderFactory, EncoderResult, EncoderSpec, FrameEncoder};

pub struct VideoSink {
    encoder: Option<Box<dyn FrameEncoder>>,
    open_error: Option<String>,
    released: bool,
}

impl VideoSink {
    /// A sink with nothing behind it, e.g. when the camera never opened
    pub fn unopened(reason: impl Into<String>) -> Self {
        Self {
            encoder: None,
            open_error: Some(reason.into()),
            released: false,
        }
    }

    /// Open an encoder for `spec`. Failure is recorded, not returned.
    pub fn open(factory: &dyn EncoderFactory, spec: EncoderSpec) -> Self {
        match factory.open(&spec) {
            Ok(encoder) => {
                tracing::info!(
                    "Video sink open: {:?} ({} @ {:.2}fps)",
                    spec.output_path,
                    spec.resolution,
                    spec.frame_rate
                );
                Self {
                    encoder: Some(encoder),
                    open_error: None,
                    released: false,
                }
            }
            Err(e) => {
                tracing::error!("Failed to open video sink {:?}: {}", spec.output_path, e);
                Self {
                    encoder: None,
                    open_error: Some(e.to_string()),
                    released: false,
                }
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.encoder.is_some()
    }

    /// Why the sink is not open, if it never was
    pub fn open_error(&self) -> Option<&str> {
        self.open_error.as_deref()
    }

    pub fn write(&mut self, frame: &Frame) -> EncoderResult<()> {
        match self.encoder.as_mut() {
            Some(encoder) => encoder.write_frame(frame),
            None => Err(EncoderError::NotOpen),
        }
    }

    /// Finish the file. Later calls, and calls on a sink that never opened,
    /// return `Ok(None)`.
    pub fn release(&mut self) -> EncoderResult<Option<EncodeSummary>> {
        if self.released {
            return Ok(None);
        }
        self.released = true;

        match self.encoder.take() {
            Some(mut encoder) => {
                let summary = encoder.finish()?;
                tracing::info!(
                    "Video sink released: {:?} ({} frames)",
                    summary.output_path,
                    summary.frames_written
                );
                Ok(Some(summary))
            }
            None => Ok(None),
        }
    }
}
