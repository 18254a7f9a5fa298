//! Camera capture
//!
//! This module provides the frame type, the camera traits the session engine is
//! written against, and the available camera backends.

pub mod overlay;
pub mod test_pattern;
pub mod traits;

#[cfg(feature = "native-camera")]
pub mod native;

use std::sync::Arc;

pub use test_pattern::TestPatternSource;
pub use traits::{
    CameraDevice, CameraInfo, CameraSource, CaptureError, CaptureResult, DeviceFormat, Frame,
    Resolution,
};

#[cfg(feature = "native-camera")]
pub use native::NativeCameraSource;

/// Pick the camera backend: the synthetic source when asked for, otherwise the
/// native one if this build includes it.
pub fn default_source(test_pattern: bool) -> CaptureResult<Arc<dyn CameraSource>> {
    if test_pattern {
        return Ok(Arc::new(TestPatternSource::default()));
    }

    #[cfg(feature = "native-camera")]
    {
        Ok(Arc::new(NativeCameraSource))
    }

    #[cfg(not(feature = "native-camera"))]
    {
        Err(CaptureError::Unsupported(
            "built without the `native-camera` feature; use --test-pattern".to_string(),
        ))
    }
}
