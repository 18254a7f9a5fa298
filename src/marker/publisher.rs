//! Per-session marker publisher
//!
//! Wraps one outlet. Pushes are fire-and-forget: a sample the transport cannot
//! take is dropped, never retried. After `close` every push is a silent no-op.

use super::info::MarkerSample;
use super::outlet::MarkerOutlet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct MarkerPublisher {
    outlet: Arc<dyn MarkerOutlet>,
    closed: AtomicBool,
    pushed: AtomicU64,
}

impl MarkerPublisher {
    pub fn new(outlet: Arc<dyn MarkerOutlet>) -> Self {
        Self {
            outlet,
            closed: AtomicBool::new(false),
            pushed: AtomicU64::new(0),
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.outlet.info().name
    }

    /// Unique id of this stream instance
    pub fn stream_id(&self) -> &str {
        &self.outlet.info().source_id
    }

    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.outlet.endpoint()
    }

    pub fn consumer_count(&self) -> usize {
        if self.is_closed() {
            0
        } else {
            self.outlet.consumer_count()
        }
    }

    pub fn has_consumers(&self) -> bool {
        self.consumer_count() > 0
    }

    /// Wait up to `timeout` for a consumer to attach
    pub async fn wait_for_consumers(&self, timeout: Duration) -> bool {
        if self.is_closed() {
            return false;
        }
        self.outlet.wait_for_consumers(timeout).await
    }

    /// Publish one frame index
    pub fn push(&self, frame_index: u64) {
        if self.is_closed() {
            return;
        }

        let value = i64::try_from(frame_index).unwrap_or(i64::MAX);
        match self.outlet.push_sample(MarkerSample::now(value)) {
            Ok(()) => {
                self.pushed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::debug!(
                    "Dropped marker {} on stream '{}': {}",
                    frame_index,
                    self.stream_name(),
                    e
                );
            }
        }
    }

    /// Samples handed to the transport so far
    pub fn samples_pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the outlet. Only the first call reaches the transport.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.outlet.close();
        }
    }
}
