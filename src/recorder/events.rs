//! Events sent out of the session engine
//!
//! Both kinds travel over broadcast channels, so senders never wait on a slow
//! or absent subscriber.

use crate::capture::Frame;
use std::sync::Arc;

/// Delivered to the preview boundary
#[derive(Debug, Clone)]
pub enum PreviewEvent {
    /// Every captured frame, annotated when the overlay is on
    Frame { device_index: u32, frame: Arc<Frame> },
    /// The session stopped; no more frames follow
    Closed { device_index: u32 },
}

impl PreviewEvent {
    pub fn device_index(&self) -> u32 {
        match self {
            PreviewEvent::Frame { device_index, .. } | PreviewEvent::Closed { device_index } => {
                *device_index
            }
        }
    }
}

/// User-facing notices about session lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    Started {
        device_index: u32,
        stream_name: String,
    },
    /// The session stopped on its own: consumers left or the video file
    /// stopped accepting frames
    AutoStopped {
        device_index: u32,
        stream_name: String,
        reason: String,
    },
    Stopped {
        device_index: u32,
        stream_name: String,
        frames_recorded: u64,
    },
    /// A resource failed outside any caller's request, e.g. while the capture
    /// thread released the camera
    Fault {
        device_index: u32,
        stream_name: String,
        message: String,
    },
}
