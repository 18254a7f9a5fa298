//! Session manager
//!
//! Runs a batch of camera sessions: create them all, start them all, stop them
//! all. Per-session failures are collected, never allowed to abort the batch.

use super::config::SessionOptions;
use super::error::{SessionError, SessionResult};
use super::events::SessionNotice;
use super::session::CameraSession;
use super::state::{CameraSelection, SessionState, SessionStatus, StopReport};
use crate::capture::CameraSource;
use crate::encoder::EncoderFactory;
use crate::marker::{OutletFactory, StreamInfo};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

const NOTICE_BUFFER: usize = 64;

/// A session that could not be created or started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub device_index: u32,
    pub stream_name: String,
    pub error: String,
}

/// Outcome of a batch operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub succeeded: Vec<u32>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, device_index: u32, stream_name: &str, error: impl ToString) {
        self.failures.push(BatchFailure {
            device_index,
            stream_name: stream_name.to_string(),
            error: error.to_string(),
        });
    }
}

pub struct SessionManager {
    options: SessionOptions,
    cameras: Arc<dyn CameraSource>,
    encoders: Arc<dyn EncoderFactory>,
    outlets: Arc<dyn OutletFactory>,
    sessions: RwLock<Vec<CameraSession>>,
    notice_tx: broadcast::Sender<SessionNotice>,
}

impl SessionManager {
    pub fn new(
        options: SessionOptions,
        cameras: Arc<dyn CameraSource>,
        encoders: Arc<dyn EncoderFactory>,
        outlets: Arc<dyn OutletFactory>,
    ) -> Self {
        let (notice_tx, _) = broadcast::channel(NOTICE_BUFFER);
        Self {
            options,
            cameras,
            encoders,
            outlets,
            sessions: RwLock::new(Vec::new()),
            notice_tx,
        }
    }

    /// Subscribe to start, stop and auto-stop notices from every session
    pub fn subscribe_notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notice_tx.subscribe()
    }

    pub fn sessions(&self) -> Vec<CameraSession> {
        self.sessions.read().clone()
    }

    pub fn statuses(&self) -> Vec<SessionStatus> {
        self.sessions.read().iter().map(|s| s.status()).collect()
    }

    /// Build one session per selection, in order. Selections must use distinct
    /// file paths and stream names.
    ///
    /// Refused while any session of the previous batch is still live.
    pub async fn create_all(&self, selections: Vec<CameraSelection>) -> SessionResult<BatchReport> {
        if self
            .sessions
            .read()
            .iter()
            .any(|s| s.state() != SessionState::Stopped)
        {
            return Err(SessionError::BatchActive);
        }

        let mut created = Vec::with_capacity(selections.len());
        let mut report = BatchReport::default();

        for (slot, selection) in selections.into_iter().enumerate() {
            let info = StreamInfo::markers(selection.stream_name.clone());
            let outlet = match self.outlets.create(info, slot).await {
                Ok(outlet) => outlet,
                Err(e) => {
                    tracing::error!(
                        "Failed to create marker stream '{}': {}",
                        selection.stream_name,
                        e
                    );
                    report.fail(selection.device_index, &selection.stream_name, e);
                    continue;
                }
            };

            let device_index = selection.device_index;
            let session = CameraSession::open(
                selection,
                self.cameras.clone(),
                self.encoders.as_ref(),
                outlet,
                self.options.clone(),
                self.notice_tx.clone(),
            )
            .await;
            report.succeeded.push(device_index);
            created.push(session);
        }

        tracing::info!(
            "Created {} sessions ({} failed)",
            created.len(),
            report.failures.len()
        );
        *self.sessions.write() = created;
        Ok(report)
    }

    /// Start every session concurrently, so consumer-gated sessions wait in
    /// parallel.
    pub async fn start_all(&self, wait_for_consumers: bool) -> BatchReport {
        let mut tasks = JoinSet::new();
        for session in self.sessions() {
            tasks.spawn(async move {
                let result = session.start(wait_for_consumers).await;
                (session.device_index(), session.stream_name().to_string(), result)
            });
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((device_index, _, Ok(()))) => report.succeeded.push(device_index),
                Ok((device_index, stream_name, Err(e))) => {
                    tracing::warn!("Camera {} did not start: {}", device_index, e);
                    report.fail(device_index, &stream_name, e);
                }
                Err(e) => tracing::error!("Start task failed: {}", e),
            }
        }

        report.succeeded.sort_unstable();
        report.failures.sort_by_key(|f| f.device_index);
        report
    }

    /// Stop every session. Each stop runs on the blocking pool because it
    /// finalises a video file.
    pub async fn stop_all(&self) -> Vec<StopReport> {
        let mut tasks = JoinSet::new();
        for session in self.sessions() {
            tasks.spawn_blocking(move || session.stop());
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    for diagnostic in &report.diagnostics {
                        tracing::warn!("Camera {}: {}", report.device_index, diagnostic);
                    }
                    reports.push(report);
                }
                Err(e) => tracing::error!("Stop task failed: {}", e),
            }
        }

        reports.sort_by_key(|r| r.device_index);
        reports
    }

    /// True while any session records
    pub fn any_recording(&self) -> bool {
        self.sessions.read().iter().any(|s| s.is_recording())
    }

    /// True once every session has stopped, or when there are none
    pub fn all_stopped(&self) -> bool {
        self.sessions
            .read()
            .iter()
            .all(|s| s.state() == SessionState::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{eventually, CountingEncoderFactory, FakeCameraSource, MemoryOutletFactory};
    use std::path::Path;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const PATIENCE: Duration = Duration::from_secs(5);

    fn options() -> SessionOptions {
        SessionOptions {
            consumer_wait: Duration::from_millis(100),
            liveness_interval: Duration::from_millis(50),
            empty_frame_backoff: Duration::from_millis(2),
            loop_yield: Duration::from_millis(1),
            camera_open_timeout: Duration::from_secs(2),
            fallback_fps: 30.0,
            overlay: false,
        }
    }

    fn manager(cameras: u32, outlets: Arc<MemoryOutletFactory>) -> (SessionManager, CountingEncoderFactory) {
        let encoders = CountingEncoderFactory::new();
        let manager = SessionManager::new(
            options(),
            Arc::new(FakeCameraSource::new(cameras)),
            Arc::new(encoders.clone()),
            outlets,
        );
        (manager, encoders)
    }

    fn selections(indices: &[u32]) -> Vec<CameraSelection> {
        indices
            .iter()
            .map(|&i| CameraSelection::with_defaults(i, Path::new("/tmp/timeshot-test")))
            .collect()
    }

    #[tokio::test]
    async fn test_batch_lifecycle() {
        let (manager, encoders) = manager(2, Arc::new(MemoryOutletFactory::default()));
        assert!(!manager.any_recording());

        let created = manager.create_all(selections(&[0, 1])).await.unwrap();
        assert_eq!(created.succeeded, vec![0, 1]);
        assert_eq!(manager.sessions().len(), 2);

        let started = manager.start_all(false).await;
        assert!(started.all_succeeded());
        assert_eq!(started.succeeded, vec![0, 1]);
        assert!(manager.any_recording());

        assert!(
            eventually(PATIENCE, || manager.sessions().iter().all(|s| s.frame_index() >= 3)).await
        );

        let reports = manager.stop_all().await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| !r.already_stopped && r.is_clean()));
        assert!(!manager.any_recording());
        assert!(manager.all_stopped());

        let total: u64 = reports.iter().map(|r| r.frames_recorded).sum();
        assert_eq!(encoders.frames(), total);
    }

    #[tokio::test]
    async fn test_create_refused_while_batch_live() {
        let (manager, _) = manager(1, Arc::new(MemoryOutletFactory::default()));
        manager.create_all(selections(&[0])).await.unwrap();

        assert!(matches!(
            manager.create_all(selections(&[0])).await,
            Err(SessionError::BatchActive)
        ));

        manager.stop_all().await;
        assert!(manager.create_all(selections(&[0])).await.is_ok());
        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_start_all_collects_failures() {
        // Only camera 0 exists
        let (manager, _) = manager(1, Arc::new(MemoryOutletFactory::default()));
        manager.create_all(selections(&[0, 5])).await.unwrap();

        let report = manager.start_all(false).await;
        assert_eq!(report.succeeded, vec![0]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].device_index, 5);
        assert_eq!(report.failures[0].stream_name, "Cam5_Stream");
        assert!(manager.any_recording());

        manager.stop_all().await;
        assert!(!manager.any_recording());
    }

    #[tokio::test]
    async fn test_stop_all_twice() {
        let (manager, _) = manager(1, Arc::new(MemoryOutletFactory::default()));
        manager.create_all(selections(&[0])).await.unwrap();
        manager.start_all(false).await;

        let first = manager.stop_all().await;
        let second = manager.stop_all().await;
        assert!(!first[0].already_stopped);
        assert!(second[0].already_stopped);
    }

    #[tokio::test]
    async fn test_gated_batch_auto_stops_when_consumers_leave() {
        let outlets = Arc::new(MemoryOutletFactory::with_consumers(1));
        let (manager, _) = manager(2, outlets.clone());
        let mut notices = manager.subscribe_notices();

        manager.create_all(selections(&[0, 1])).await.unwrap();
        let report = manager.start_all(true).await;
        assert!(report.all_succeeded());
        assert!(manager.any_recording());

        outlets.outlet("Cam0_Stream").unwrap().set_consumers(0);
        assert!(eventually(PATIENCE, || manager.sessions()[0].state() == SessionState::Stopped).await);
        assert!(manager.any_recording());

        outlets.outlet("Cam1_Stream").unwrap().set_consumers(0);
        assert!(eventually(PATIENCE, || !manager.any_recording()).await);
        assert!(manager.all_stopped());

        let mut auto_stopped = Vec::new();
        while let Ok(notice) = notices.try_recv() {
            if let SessionNotice::AutoStopped { device_index, .. } = notice {
                auto_stopped.push(device_index);
            }
        }
        auto_stopped.sort_unstable();
        assert_eq!(auto_stopped, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_gated_start_without_consumers_fails() {
        let (manager, _) = manager(1, Arc::new(MemoryOutletFactory::default()));
        manager.create_all(selections(&[0])).await.unwrap();

        let report = manager.start_all(true).await;
        assert!(report.succeeded.is_empty());
        assert!(report.failures[0].error.contains("No consumer"));
        assert!(!manager.any_recording());
        assert_eq!(manager.sessions()[0].state(), SessionState::Idle);
        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_dropping_manager_finishes_sessions() {
        let cameras = FakeCameraSource::new(2);
        let releases = cameras.releases();
        let encoders = CountingEncoderFactory::new();
        let manager = SessionManager::new(
            options(),
            Arc::new(cameras),
            Arc::new(encoders.clone()),
            Arc::new(MemoryOutletFactory::default()),
        );
        manager.create_all(selections(&[0, 1])).await.unwrap();
        assert!(manager.start_all(false).await.all_succeeded());
        assert!(
            eventually(PATIENCE, || manager.sessions().iter().all(|s| s.frame_index() >= 2)).await
        );

        drop(manager);
        assert!(
            eventually(PATIENCE, || {
                releases.load(Ordering::SeqCst) == 2 && encoders.finishes() == 2
            })
            .await
        );
    }
}
