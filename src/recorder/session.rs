//! Camera session
//!
//! One camera's capture/record/publish lifecycle:
//!
//! ```text
//! Idle ──start──▶ WaitingForConsumers ──▶ Recording
//!   │                    │                    │
//!   └────────────────────┴───────stop─────────┴──▶ Stopped
//! ```
//!
//! The capture loop starts with the session and previews until `start`
//! arms it. `stop` is terminal and releases each resource once, however many
//! callers race to it.

use super::capture_loop;
use super::config::SessionOptions;
use super::error::{SessionError, SessionResult};
use super::events::{PreviewEvent, SessionNotice};
use super::liveness;
use super::sink::VideoSink;
use super::state::{CameraSelection, SessionState, SessionStatus, StopReport};
use crate::capture::{CameraSource, CaptureError, DeviceFormat};
use crate::encoder::{EncoderFactory, EncoderSpec};
use crate::marker::{MarkerOutlet, MarkerPublisher};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Frames buffered per preview subscriber; slow subscribers skip ahead
const PREVIEW_BUFFER: usize = 8;

/// State shared by the session handle, its capture thread and its monitor.
///
/// `state` is written only by `start`, `stop` and the monitor (through
/// `stop`); `frame_index` only by the capture loop. `state` and `sink` are
/// never locked in the order sink-then-state-write.
pub(super) struct SessionCore {
    pub(super) device_index: u32,
    pub(super) file_path: PathBuf,
    pub(super) stream_name: String,
    pub(super) options: SessionOptions,
    pub(super) state: RwLock<SessionState>,
    pub(super) frame_index: AtomicU64,
    pub(super) format: OnceLock<DeviceFormat>,
    pub(super) camera_open: AtomicBool,
    pub(super) sink: Mutex<VideoSink>,
    pub(super) publisher: MarkerPublisher,
    pub(super) cancel: CancellationToken,
    pub(super) monitor: Mutex<Option<JoinHandle<()>>>,
    pub(super) preview_tx: broadcast::Sender<PreviewEvent>,
    pub(super) notices: broadcast::Sender<SessionNotice>,
}

impl Drop for SessionCore {
    /// Every handle went away without `stop`: finish the file and close the
    /// stream. The capture thread sees the session gone and releases the
    /// camera.
    fn drop(&mut self) {
        if *self.state.get_mut() == SessionState::Stopped {
            return;
        }
        tracing::warn!(
            "Camera {} session dropped without stop, finishing it",
            self.device_index
        );
        self.cancel.cancel();
        if let Err(e) = self.sink.get_mut().release() {
            tracing::warn!("Camera {}: video sink release failed: {}", self.device_index, e);
        }
        self.publisher.close();
        if let Some(monitor) = self.monitor.get_mut().take() {
            monitor.abort();
        }
    }
}

/// Puts a session still in `WaitingForConsumers` back to `Idle` when `start`
/// returns or its future is dropped mid-wait.
struct WaitingGuard<'a> {
    core: &'a SessionCore,
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.core.state.write();
        if *state == SessionState::WaitingForConsumers {
            *state = SessionState::Idle;
        }
    }
}

/// Handle to one camera session. Clones share the session; dropping the last
/// one stops it.
#[derive(Clone)]
pub struct CameraSession {
    core: Arc<SessionCore>,
}

impl CameraSession {
    /// Open the camera and the video sink and start previewing.
    ///
    /// Camera and encoder failures do not fail construction: the session is
    /// returned idle and `start` reports the failure.
    pub async fn open(
        selection: CameraSelection,
        cameras: Arc<dyn CameraSource>,
        encoders: &dyn EncoderFactory,
        outlet: Arc<dyn MarkerOutlet>,
        options: SessionOptions,
        notices: broadcast::Sender<SessionNotice>,
    ) -> Self {
        let (preview_tx, _) = broadcast::channel(PREVIEW_BUFFER);
        let open_timeout = options.camera_open_timeout;
        let fallback_fps = options.fallback_fps;

        let core = Arc::new(SessionCore {
            device_index: selection.device_index,
            file_path: selection.file_path,
            stream_name: selection.stream_name,
            options,
            state: RwLock::new(SessionState::Idle),
            frame_index: AtomicU64::new(0),
            format: OnceLock::new(),
            camera_open: AtomicBool::new(false),
            sink: Mutex::new(VideoSink::unopened("camera not open")),
            publisher: MarkerPublisher::new(outlet),
            cancel: CancellationToken::new(),
            monitor: Mutex::new(None),
            preview_tx,
            notices,
        });

        let (ready_tx, ready_rx) = oneshot::channel();
        let opened = match capture_loop::spawn(&core, cameras, ready_tx) {
            Ok(()) => match tokio::time::timeout(open_timeout, ready_rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(CaptureError::OpenFailed {
                    index: core.device_index,
                    reason: "capture thread exited".to_string(),
                }),
                Err(_) => {
                    // The thread releases the camera if it ever opens
                    core.cancel.cancel();
                    Err(CaptureError::OpenTimeout(open_timeout))
                }
            },
            Err(e) => Err(CaptureError::OpenFailed {
                index: core.device_index,
                reason: format!("failed to start capture thread: {}", e),
            }),
        };

        match opened {
            Ok(format) => {
                let frame_rate = if format.frame_rate.is_finite() && format.frame_rate > 0.0 {
                    format.frame_rate
                } else {
                    tracing::warn!(
                        "Camera {} reports no frame rate, using {}fps",
                        core.device_index,
                        fallback_fps
                    );
                    fallback_fps
                };
                let _ = core.format.set(DeviceFormat {
                    resolution: format.resolution,
                    frame_rate,
                });

                let spec = EncoderSpec {
                    output_path: core.file_path.clone(),
                    resolution: format.resolution,
                    frame_rate,
                };
                *core.sink.lock() = VideoSink::open(encoders, spec);

                tracing::info!(
                    "Session for camera {} ready: {} @ {:.2}fps -> {:?}, stream '{}'",
                    core.device_index,
                    format.resolution,
                    frame_rate,
                    core.file_path,
                    core.stream_name
                );
            }
            Err(e) => {
                tracing::error!("Camera {} unavailable: {}", core.device_index, e);
                *core.sink.lock() = VideoSink::unopened(e.to_string());
            }
        }

        Self { core }
    }

    pub(super) fn from_core(core: Arc<SessionCore>) -> Self {
        Self { core }
    }

    pub fn device_index(&self) -> u32 {
        self.core.device_index
    }

    pub fn file_path(&self) -> &Path {
        &self.core.file_path
    }

    pub fn stream_name(&self) -> &str {
        &self.core.stream_name
    }

    pub fn state(&self) -> SessionState {
        *self.core.state.read()
    }

    pub fn is_recording(&self) -> bool {
        self.state() == SessionState::Recording
    }

    /// Index the next recorded frame will get
    pub fn frame_index(&self) -> u64 {
        self.core.frame_index.load(Ordering::Acquire)
    }

    /// Camera format, once the camera has opened
    pub fn format(&self) -> Option<DeviceFormat> {
        self.core.format.get().copied()
    }

    pub fn publisher(&self) -> &MarkerPublisher {
        &self.core.publisher
    }

    pub fn subscribe_preview(&self) -> broadcast::Receiver<PreviewEvent> {
        self.core.preview_tx.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        let format = self.format();
        SessionStatus {
            device_index: self.core.device_index,
            file_path: self.core.file_path.clone(),
            stream_name: self.core.stream_name.clone(),
            stream_id: self.core.publisher.stream_id().to_string(),
            state: self.state(),
            frame_index: self.frame_index(),
            consumers: self.core.publisher.consumer_count(),
            camera_open: self.core.camera_open.load(Ordering::SeqCst),
            resolution: format.map(|f| f.resolution),
            frame_rate: format.map(|f| f.frame_rate),
            marker_endpoint: self.core.publisher.endpoint(),
        }
    }

    fn check_preconditions(&self) -> SessionResult<()> {
        let core = &self.core;
        if !core.camera_open.load(Ordering::SeqCst) || core.cancel.is_cancelled() {
            return Err(SessionError::Precondition(format!(
                "camera {} is not open",
                core.device_index
            )));
        }

        let sink = core.sink.lock();
        if !sink.is_open() {
            return Err(SessionError::Precondition(format!(
                "video file {:?} is not open: {}",
                core.file_path,
                sink.open_error().unwrap_or("unknown error")
            )));
        }
        Ok(())
    }

    /// Arm recording.
    ///
    /// With `wait_for_consumers`, waits up to the configured timeout for a
    /// marker consumer and watches for consumer loss once recording. Any
    /// failure leaves the session idle so `start` can be retried, and so does
    /// dropping the returned future during the wait.
    pub async fn start(&self, wait_for_consumers: bool) -> SessionResult<()> {
        let core = &self.core;
        let mut _waiting = None;

        if wait_for_consumers {
            let ready = self.check_preconditions();
            {
                let mut state = core.state.write();
                match *state {
                    SessionState::Idle => {}
                    SessionState::Stopped => return Err(SessionError::AlreadyStopped),
                    other => {
                        return Err(SessionError::InvalidState {
                            action: "start",
                            state: other,
                        })
                    }
                }
                ready?;
                *state = SessionState::WaitingForConsumers;
            }
            _waiting = Some(WaitingGuard { core: &**core });

            tracing::info!(
                "Camera {} waiting up to {:?} for a consumer on '{}'",
                core.device_index,
                core.options.consumer_wait,
                core.stream_name
            );

            let attached = tokio::select! {
                attached = core.publisher.wait_for_consumers(core.options.consumer_wait) => attached,
                _ = core.cancel.cancelled() => false,
            };

            if !attached {
                let mut state = core.state.write();
                if *state == SessionState::Stopped {
                    return Err(SessionError::AlreadyStopped);
                }
                *state = SessionState::Idle;
                return Err(SessionError::NoConsumers {
                    stream: core.stream_name.clone(),
                    waited: core.options.consumer_wait,
                });
            }
        }

        // The camera may have dropped out during the wait
        let ready = self.check_preconditions();
        {
            let mut state = core.state.write();
            let expected = if wait_for_consumers {
                SessionState::WaitingForConsumers
            } else {
                SessionState::Idle
            };
            if *state == SessionState::Stopped {
                return Err(SessionError::AlreadyStopped);
            }
            if *state != expected {
                return Err(SessionError::InvalidState {
                    action: "start",
                    state: *state,
                });
            }
            if let Err(e) = ready {
                *state = SessionState::Idle;
                return Err(e);
            }
            if wait_for_consumers && !core.publisher.has_consumers() {
                *state = SessionState::Idle;
                return Err(SessionError::NoConsumers {
                    stream: core.stream_name.clone(),
                    waited: core.options.consumer_wait,
                });
            }
            *state = SessionState::Recording;
        }

        if wait_for_consumers {
            let handle = liveness::spawn(
                Arc::downgrade(core),
                core.cancel.clone(),
                core.options.liveness_interval,
            );
            *core.monitor.lock() = Some(handle);
        }

        tracing::info!(
            "Camera {} recording to {:?}, markers on '{}'",
            core.device_index,
            core.file_path,
            core.stream_name
        );
        let _ = core.notices.send(SessionNotice::Started {
            device_index: core.device_index,
            stream_name: core.stream_name.clone(),
        });
        Ok(())
    }

    /// Stop the session. Terminal and safe to call from any state, any number
    /// of times, from any thread.
    ///
    /// Does not wait for the capture loop; the loop sees the cancellation on
    /// its next iteration and releases the camera itself. Finalising the video
    /// file can block, so async callers should use `spawn_blocking`.
    pub fn stop(&self) -> StopReport {
        let core = &self.core;

        let previous = {
            let mut state = core.state.write();
            std::mem::replace(&mut *state, SessionState::Stopped)
        };

        if previous == SessionState::Stopped {
            return StopReport {
                device_index: core.device_index,
                stream_name: core.stream_name.clone(),
                already_stopped: true,
                frames_recorded: self.frame_index(),
                encode_summary: None,
                diagnostics: Vec::new(),
            };
        }

        tracing::info!("Stopping camera {} (was {:?})", core.device_index, previous);
        let mut diagnostics = Vec::new();

        core.cancel.cancel();

        let encode_summary = match core.sink.lock().release() {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("Camera {}: video sink release failed: {}", core.device_index, e);
                diagnostics.push(format!("video sink: {}", e));
                None
            }
        };

        core.publisher.close();

        let _ = core.preview_tx.send(PreviewEvent::Closed {
            device_index: core.device_index,
        });

        if let Some(monitor) = core.monitor.lock().take() {
            monitor.abort();
        }

        let frames_recorded = self.frame_index();
        tracing::info!(
            "Camera {} stopped after {} frames",
            core.device_index,
            frames_recorded
        );
        let _ = core.notices.send(SessionNotice::Stopped {
            device_index: core.device_index,
            stream_name: core.stream_name.clone(),
            frames_recorded,
        });

        StopReport {
            device_index: core.device_index,
            stream_name: core.stream_name.clone(),
            already_stopped: false,
            frames_recorded,
            encode_summary,
            diagnostics,
        }
    }
}
