//! Capture trait definitions
//!
//! Platform-agnostic types and traits for camera sources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use thiserror::Error;

/// Bytes per pixel of the packed RGB24 layout every camera backend delivers.
pub const RGB_BYTES_PER_PIXEL: usize = 3;

/// Errors raised by camera sources and devices
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Camera {0} not found")]
    DeviceNotFound(u32),

    #[error("Failed to open camera {index}: {reason}")]
    OpenFailed { index: u32, reason: String },

    #[error("Failed to read frame: {0}")]
    ReadFailed(String),

    #[error("Camera backend unavailable: {0}")]
    Unsupported(String),

    #[error("Camera open timed out after {0:?}")]
    OpenTimeout(std::time::Duration),

    #[error("Camera has been released")]
    Released,
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size in bytes of one RGB24 frame at this resolution
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * RGB_BYTES_PER_PIXEL
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Device index as understood by the camera source
    pub index: u32,

    /// Device name
    pub name: String,

    /// Resolutions the device is known to support (may be empty)
    pub supported_resolutions: Vec<Resolution>,
}

/// Negotiated stream format of an opened camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFormat {
    pub resolution: Resolution,

    /// Frames per second reported by the device; 0.0 when unknown
    pub frame_rate: f64,
}

/// A single captured frame in packed RGB24
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,

    /// Number of frames read from the device before this one
    pub sequence: u64,

    pub captured_at: Instant,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, sequence: u64) -> Self {
        Self {
            width,
            height,
            data,
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// A frame is usable when it has pixels and the buffer matches its dimensions.
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty() && self.data.len() == self.resolution().frame_len()
    }
}

/// An opened camera.
///
/// Devices are not required to be `Send`: the capture loop opens the device on
/// its own thread and keeps it there until release.
pub trait CameraDevice {
    /// Negotiated format, fixed for the lifetime of the device
    fn format(&self) -> DeviceFormat;

    /// Read the next frame. `Ok(None)` means the device produced an empty frame.
    fn read_frame(&mut self) -> CaptureResult<Option<Frame>>;

    /// Stop streaming and free the device. Must be safe to call more than once.
    fn release(&mut self) -> CaptureResult<()>;
}

/// Something that can enumerate and open cameras
pub trait CameraSource: Send + Sync {
    /// Cameras currently available
    fn list_cameras(&self) -> Vec<CameraInfo>;

    /// Open a camera by index
    fn open(&self, index: u32) -> CaptureResult<Box<dyn CameraDevice>>;
}
