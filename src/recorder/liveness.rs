//! Consumer liveness monitor
//!
//! While a gated session records, check its marker stream on a fixed interval
//! and stop the session once nobody is listening.

use super::events::SessionNotice;
use super::session::{CameraSession, SessionCore};
use super::state::SessionState;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(super) fn spawn(
    weak: Weak<SessionCore>,
    cancel: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let Some(core) = weak.upgrade() else {
                return;
            };
            if *core.state.read() != SessionState::Recording {
                return;
            }
            if core.publisher.has_consumers() {
                continue;
            }

            let reason = format!("marker stream lost all consumers (checked every {:?})", interval);
            tracing::warn!(
                "Auto-stopping camera {} ('{}'): {}",
                core.device_index,
                core.stream_name,
                reason
            );
            let _ = core.notices.send(SessionNotice::AutoStopped {
                device_index: core.device_index,
                stream_name: core.stream_name.clone(),
                reason,
            });

            // Stop finalises the video file, which blocks; it also aborts this task.
            let session = CameraSession::from_core(core);
            tokio::task::spawn_blocking(move || session.stop());
            return;
        }
    })
}
