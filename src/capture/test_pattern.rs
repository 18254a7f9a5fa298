//! Synthetic camera source
//!
//! Produces moving colour bars at a fixed rate. Used for dry runs on machines
//! without cameras and by the test suite.

use super::traits::{
    CameraDevice, CameraInfo, CameraSource, CaptureError, CaptureResult, DeviceFormat, Frame,
    Resolution,
};
use std::time::{Duration, Instant};

const BARS: [[u8; 3]; 7] = [
    [192, 192, 192],
    [192, 192, 0],
    [0, 192, 192],
    [0, 192, 0],
    [192, 0, 192],
    [192, 0, 0],
    [0, 0, 192],
];

/// Camera source exposing `cameras` synthetic devices
#[derive(Debug, Clone)]
pub struct TestPatternSource {
    cameras: u32,
    resolution: Resolution,
    frame_rate: f64,
}

impl TestPatternSource {
    pub fn new(cameras: u32, resolution: Resolution, frame_rate: f64) -> Self {
        Self {
            cameras,
            resolution,
            frame_rate,
        }
    }
}

impl Default for TestPatternSource {
    fn default() -> Self {
        Self::new(2, Resolution::new(640, 480), 30.0)
    }
}

impl CameraSource for TestPatternSource {
    fn list_cameras(&self) -> Vec<CameraInfo> {
        (0..self.cameras)
            .map(|index| CameraInfo {
                index,
                name: format!("Test Pattern {index}"),
                supported_resolutions: vec![self.resolution],
            })
            .collect()
    }

    fn open(&self, index: u32) -> CaptureResult<Box<dyn CameraDevice>> {
        if index >= self.cameras {
            return Err(CaptureError::DeviceNotFound(index));
        }
        if self.resolution.is_empty() {
            return Err(CaptureError::OpenFailed {
                index,
                reason: "zero-sized test pattern".to_string(),
            });
        }

        tracing::info!(
            "Opened test pattern camera {} ({} @ {}fps)",
            index,
            self.resolution,
            self.frame_rate
        );

        Ok(Box::new(TestPatternCamera {
            index,
            format: DeviceFormat {
                resolution: self.resolution,
                frame_rate: self.frame_rate,
            },
            sequence: 0,
            next_due: None,
            released: false,
        }))
    }
}

struct TestPatternCamera {
    index: u32,
    format: DeviceFormat,
    sequence: u64,
    next_due: Option<Instant>,
    released: bool,
}

impl TestPatternCamera {
    fn frame_interval(&self) -> Duration {
        if self.format.frame_rate > 0.0 {
            Duration::from_secs_f64(1.0 / self.format.frame_rate)
        } else {
            Duration::ZERO
        }
    }

    fn render(&self) -> Vec<u8> {
        let Resolution { width, height } = self.format.resolution;
        let bar_width = (width as usize / BARS.len()).max(1);
        let shift = (self.sequence as usize * 4 + self.index as usize * 40) % width as usize;

        let mut data = Vec::with_capacity(self.format.resolution.frame_len());
        for _y in 0..height {
            for x in 0..width as usize {
                let bar = ((x + shift) / bar_width) % BARS.len();
                data.extend_from_slice(&BARS[bar]);
            }
        }
        data
    }
}

impl CameraDevice for TestPatternCamera {
    fn format(&self) -> DeviceFormat {
        self.format
    }

    fn read_frame(&mut self) -> CaptureResult<Option<Frame>> {
        if self.released {
            return Err(CaptureError::Released);
        }

        // Pace like a real device: block until the next frame is due.
        let interval = self.frame_interval();
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        self.next_due = Some(due.max(now) + interval);

        let frame = Frame::new(
            self.format.resolution.width,
            self.format.resolution.height,
            self.render(),
            self.sequence,
        );
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) -> CaptureResult<()> {
        if !self.released {
            self.released = true;
            tracing::debug!("Released test pattern camera {}", self.index);
        }
        Ok(())
    }
}
