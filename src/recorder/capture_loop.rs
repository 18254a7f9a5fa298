//! Per-session acquisition loop
//!
//! Runs on a dedicated OS thread that opens the camera, owns it for the whole
//! session and releases it on the way out. Camera handles are not `Send` on
//! every backend, so they never leave this thread.
//!
//! The thread only holds a `Weak` to the session: once every handle is gone
//! the loop exits and the camera is released.

use super::events::{PreviewEvent, SessionNotice};
use super::session::{CameraSession, SessionCore};
use super::state::SessionState;
use crate::capture::{overlay, CameraDevice, CameraSource, CaptureError, CaptureResult, DeviceFormat, Frame};
use crate::encoder::{EncoderError, EncoderResult};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, oneshot};

/// Start the capture thread. The open result is reported through `ready`.
pub(super) fn spawn(
    core: &Arc<SessionCore>,
    cameras: Arc<dyn CameraSource>,
    ready: oneshot::Sender<CaptureResult<DeviceFormat>>,
) -> std::io::Result<()> {
    let weak = Arc::downgrade(core);
    let device_index = core.device_index;
    let stream_name = core.stream_name.clone();
    let notices = core.notices.clone();

    let name = format!("capture-cam{}", device_index);
    std::thread::Builder::new().name(name).spawn(move || {
        let mut camera = match cameras.open(device_index) {
            Ok(camera) => camera,
            Err(e) => {
                tracing::error!("Failed to open camera {}: {}", device_index, e);
                let _ = ready.send(Err(e));
                return;
            }
        };

        let format = camera.format();
        if let Some(core) = weak.upgrade() {
            core.camera_open.store(true, Ordering::SeqCst);
        }
        if ready.send(Ok(format)).is_err() {
            tracing::debug!(
                "Camera {} opened after the session gave up waiting",
                device_index
            );
        }

        run(&weak, device_index, camera.as_mut(), format);

        if let Err(e) = camera.release() {
            tracing::warn!("Failed to release camera {}: {}", device_index, e);
            report_release_failure(&notices, device_index, stream_name, e);
        }
        if let Some(core) = weak.upgrade() {
            core.camera_open.store(false, Ordering::SeqCst);
        }
        tracing::info!("Camera {} released", device_index);
    })?;
    Ok(())
}

fn report_release_failure(
    notices: &broadcast::Sender<SessionNotice>,
    device_index: u32,
    stream_name: String,
    error: CaptureError,
) {
    let _ = notices.send(SessionNotice::Fault {
        device_index,
        stream_name,
        message: format!("camera release failed: {}", error),
    });
}

fn run(weak: &Weak<SessionCore>, device_index: u32, camera: &mut dyn CameraDevice, format: DeviceFormat) {
    let mut empty_reads: u64 = 0;

    tracing::debug!("Capture loop for camera {} running", device_index);

    loop {
        let Some(core) = weak.upgrade() else {
            tracing::debug!("Camera {} session dropped", device_index);
            break;
        };
        if core.cancel.is_cancelled() {
            break;
        }
        let options = &core.options;

        let mut frame = match camera.read_frame() {
            Ok(Some(frame)) if frame.is_valid() => frame,
            Ok(_) => {
                empty_reads += 1;
                std::thread::sleep(options.empty_frame_backoff);
                continue;
            }
            Err(CaptureError::Released) => break,
            Err(e) => {
                empty_reads += 1;
                tracing::debug!("Camera {} read glitch: {}", device_index, e);
                std::thread::sleep(options.empty_frame_backoff);
                continue;
            }
        };

        if options.overlay {
            overlay::annotate_fps(&mut frame, format.frame_rate);
        }

        if let Err(e) = record_frame(&core, &mut frame) {
            abandon_recording(&core, e);
        }

        let _ = core.preview_tx.send(PreviewEvent::Frame {
            device_index,
            frame: Arc::new(frame),
        });

        if options.loop_yield.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(options.loop_yield);
        }
    }

    tracing::debug!(
        "Capture loop for camera {} exiting after {} empty reads",
        device_index,
        empty_reads
    );
}

/// A sink that refused a frame will refuse the next one too (broken pipe or a
/// frame size the file was not opened for), so the session stops rather than
/// sitting in `Recording` without writing.
fn abandon_recording(core: &Arc<SessionCore>, error: EncoderError) {
    let reason = match &error {
        EncoderError::FrameMismatch { expected, actual } => format!(
            "camera delivers {} frames but the video file was opened for {}",
            actual, expected
        ),
        other => format!("video file rejected a frame: {}", other),
    };
    tracing::error!("Camera {}: {}, stopping", core.device_index, reason);

    let _ = core.notices.send(SessionNotice::AutoStopped {
        device_index: core.device_index,
        stream_name: core.stream_name.clone(),
        reason,
    });
    CameraSession::from_core(core.clone()).stop();
}

/// Write the frame and publish its index if the session is recording.
///
/// Returns the index written, or `None` when not armed. The sink lock is held
/// across write, push and increment so the file and the marker stream see the
/// same index; the state is re-read under that lock because `stop` flips it
/// before taking the sink.
pub(super) fn record_frame(core: &SessionCore, frame: &mut Frame) -> EncoderResult<Option<u64>> {
    if *core.state.read() != SessionState::Recording {
        return Ok(None);
    }

    let mut sink = core.sink.lock();
    if *core.state.read() != SessionState::Recording {
        return Ok(None);
    }

    let index = core.frame_index.load(Ordering::Acquire);
    if core.options.overlay {
        overlay::annotate_frame_index(frame, index);
    }

    sink.write(frame)?;
    core.publisher.push(index);
    core.frame_index.store(index + 1, Ordering::Release);
    Ok(Some(index))
}
