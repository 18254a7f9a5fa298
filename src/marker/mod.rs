//! Marker streams
//!
//! One integer marker stream per camera session. Each recorded frame's index is
//! published so that consumers can line up their own data with exact frames.

pub mod info;
pub mod outlet;
pub mod publisher;
pub mod tcp;

use std::net::SocketAddr;
use thiserror::Error;

pub use info::{ChannelFormat, MarkerSample, StreamInfo, MARKER_CONTENT_TYPE};
pub use outlet::{MarkerOutlet, OutletFactory};
pub use publisher::MarkerPublisher;
pub use tcp::{MarkerInlet, TcpOutlet, TcpOutletFactory};

/// Errors from marker stream transports
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarkerError {
    #[error("Failed to bind marker outlet on {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },

    #[error("Marker stream I/O failed: {0}")]
    Io(String),

    #[error("Malformed marker message: {0}")]
    Serialization(String),

    #[error("Marker protocol error: {0}")]
    Protocol(String),

    #[error("Marker stream is closed")]
    Closed,
}

impl From<std::io::Error> for MarkerError {
    fn from(error: std::io::Error) -> Self {
        MarkerError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for MarkerError {
    fn from(error: serde_json::Error) -> Self {
        MarkerError::Serialization(error.to_string())
    }
}

pub type MarkerResult<T> = Result<T, MarkerError>;
