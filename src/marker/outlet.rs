//! Marker outlet abstraction
//!
//! An outlet is the transport end of one marker stream. `MarkerPublisher` owns
//! one outlet per session and adds the close/no-op semantics on top.

use super::info::{MarkerSample, StreamInfo};
use super::MarkerResult;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait MarkerOutlet: Send + Sync {
    fn info(&self) -> &StreamInfo;

    /// Address consumers connect to, if the transport is network-visible
    fn endpoint(&self) -> Option<SocketAddr>;

    /// Consumers currently attached
    fn consumer_count(&self) -> usize;

    /// Resolve `true` once at least one consumer is attached, `false` on timeout
    /// or when the outlet closes first.
    async fn wait_for_consumers(&self, timeout: Duration) -> bool;

    /// Hand one sample to every attached consumer. Delivery is best-effort.
    fn push_sample(&self, sample: MarkerSample) -> MarkerResult<()>;

    /// Stop accepting consumers and disconnect the attached ones
    fn close(&self);
}

/// Creates one outlet per session
#[async_trait]
pub trait OutletFactory: Send + Sync {
    /// `slot` is the session's position in its batch
    async fn create(&self, info: StreamInfo, slot: usize) -> MarkerResult<Arc<dyn MarkerOutlet>>;
}
