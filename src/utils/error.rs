//! Error types and handling
//!
//! Common error types used across the application.

use thiserror::Error;

use crate::capture::CaptureError;
use crate::encoder::EncoderError;
use crate::marker::MarkerError;
use crate::recorder::SessionError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Marker stream error: {0}")]
    Marker(#[from] MarkerError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
