//! Native webcam capture using nokhwa
//!
//! Frames are decoded to packed RGB24 on the capture thread so that the overlay,
//! the encoder, and the preview all see the same layout.

use super::traits::{
    CameraDevice, CameraInfo, CameraSource, CaptureError, CaptureResult, DeviceFormat, Frame,
    Resolution,
};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

/// Camera source backed by the platform's native capture API
#[derive(Debug, Default, Clone)]
pub struct NativeCameraSource;

impl CameraSource for NativeCameraSource {
    fn list_cameras(&self) -> Vec<CameraInfo> {
        match nokhwa::query(ApiBackend::Auto) {
            Ok(cameras) => cameras
                .into_iter()
                .filter_map(|info| {
                    let index = match info.index() {
                        CameraIndex::Index(i) => *i,
                        CameraIndex::String(s) => s.parse::<u32>().ok()?,
                    };
                    Some(CameraInfo {
                        index,
                        name: info.human_name().to_string(),
                        // Common resolutions
                        supported_resolutions: vec![
                            Resolution::new(1920, 1080),
                            Resolution::new(1280, 720),
                            Resolution::new(640, 480),
                        ],
                    })
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to enumerate cameras: {:?}", e);
                Vec::new()
            }
        }
    }

    fn open(&self, index: u32) -> CaptureResult<Box<dyn CameraDevice>> {
        let format =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

        let mut camera = Camera::new(CameraIndex::Index(index), format).map_err(|e| {
            CaptureError::OpenFailed {
                index,
                reason: e.to_string(),
            }
        })?;

        camera.open_stream().map_err(|e| CaptureError::OpenFailed {
            index,
            reason: format!("failed to open stream: {e}"),
        })?;

        let camera_format = camera.camera_format();
        let format = DeviceFormat {
            resolution: Resolution::new(
                camera_format.resolution().width(),
                camera_format.resolution().height(),
            ),
            frame_rate: camera_format.frame_rate() as f64,
        };

        tracing::info!(
            "Webcam {} opened: {} @ {}fps, format={:?}",
            index,
            format.resolution,
            format.frame_rate,
            camera_format.format()
        );

        Ok(Box::new(NativeCamera {
            index,
            camera: Some(camera),
            format,
            sequence: 0,
        }))
    }
}

struct NativeCamera {
    index: u32,
    camera: Option<Camera>,
    format: DeviceFormat,
    sequence: u64,
}

impl CameraDevice for NativeCamera {
    fn format(&self) -> DeviceFormat {
        self.format
    }

    fn read_frame(&mut self) -> CaptureResult<Option<Frame>> {
        let camera = self.camera.as_mut().ok_or(CaptureError::Released)?;

        // Blocks until the camera delivers the next frame
        let buffer = camera
            .frame()
            .map_err(|e| CaptureError::ReadFailed(e.to_string()))?;
        if buffer.buffer().is_empty() {
            return Ok(None);
        }

        let image = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::ReadFailed(format!("decode failed: {e}")))?;
        let (width, height) = image.dimensions();

        let frame = Frame::new(width, height, image.into_raw(), self.sequence);
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) -> CaptureResult<()> {
        if let Some(mut camera) = self.camera.take() {
            camera
                .stop_stream()
                .map_err(|e| CaptureError::ReadFailed(format!("failed to stop stream: {e}")))?;
            tracing::info!("Webcam {} released", self.index);
        }
        Ok(())
    }
}

impl Drop for NativeCamera {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("Error stopping camera stream: {}", e);
        }
    }
}
