//! In-process fakes for the camera, encoder and marker seams

use crate::capture::{
    CameraDevice, CameraInfo, CameraSource, CaptureError, CaptureResult, DeviceFormat, Frame,
    Resolution, TestPatternSource,
};
use crate::encoder::{EncodeSummary, EncoderError, EncoderFactory, EncoderResult, EncoderSpec, FrameEncoder};
use crate::marker::{MarkerError, MarkerOutlet, MarkerResult, MarkerSample, OutletFactory, StreamInfo};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// How a fake camera behaves when opened
#[derive(Debug, Clone, Copy)]
pub enum OpenBehavior {
    Succeed,
    Fail,
    Hang(Duration),
}

/// Test pattern camera with failure modes and a release counter
pub struct FakeCameraSource {
    inner: TestPatternSource,
    behavior: OpenBehavior,
    empty_every: Option<u64>,
    reported: Option<Resolution>,
    fail_release: bool,
    releases: Arc<AtomicUsize>,
}

impl FakeCameraSource {
    /// Small, fast cameras so tests accumulate frames quickly
    pub fn new(cameras: u32) -> Self {
        Self {
            inner: TestPatternSource::new(cameras, Resolution::new(32, 24), 200.0),
            behavior: OpenBehavior::Succeed,
            empty_every: None,
            reported: None,
            fail_release: false,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Report this resolution from `format()` while still delivering 32x24
    /// frames
    pub fn with_reported_resolution(mut self, resolution: Resolution) -> Self {
        self.reported = Some(resolution);
        self
    }

    /// `release` is counted but returns an error
    pub fn with_failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    pub fn with_behavior(mut self, behavior: OpenBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Every `n`th read yields no frame
    pub fn with_empty_every(mut self, n: u64) -> Self {
        self.empty_every = Some(n);
        self
    }

    pub fn releases(&self) -> Arc<AtomicUsize> {
        self.releases.clone()
    }
}

impl CameraSource for FakeCameraSource {
    fn list_cameras(&self) -> Vec<CameraInfo> {
        self.inner.list_cameras()
    }

    fn open(&self, index: u32) -> CaptureResult<Box<dyn CameraDevice>> {
        match self.behavior {
            OpenBehavior::Succeed => {}
            OpenBehavior::Fail => {
                return Err(CaptureError::OpenFailed {
                    index,
                    reason: "device busy".to_string(),
                })
            }
            OpenBehavior::Hang(delay) => std::thread::sleep(delay),
        }

        Ok(Box::new(FakeCamera {
            inner: self.inner.open(index)?,
            empty_every: self.empty_every,
            reported: self.reported,
            fail_release: self.fail_release,
            reads: 0,
            releases: self.releases.clone(),
        }))
    }
}

struct FakeCamera {
    inner: Box<dyn CameraDevice>,
    empty_every: Option<u64>,
    reported: Option<Resolution>,
    fail_release: bool,
    reads: u64,
    releases: Arc<AtomicUsize>,
}

impl CameraDevice for FakeCamera {
    fn format(&self) -> DeviceFormat {
        let format = self.inner.format();
        DeviceFormat {
            resolution: self.reported.unwrap_or(format.resolution),
            ..format
        }
    }

    fn read_frame(&mut self) -> CaptureResult<Option<Frame>> {
        self.reads += 1;
        if let Some(n) = self.empty_every {
            if self.reads % n == 0 {
                return Ok(None);
            }
        }
        self.inner.read_frame()
    }

    fn release(&mut self) -> CaptureResult<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.inner.release()?;
        if self.fail_release {
            return Err(CaptureError::ReadFailed("device stuck".to_string()));
        }
        Ok(())
    }
}

/// What the fake encoders have seen
#[derive(Debug, Default)]
pub struct EncoderLog {
    pub opened: Vec<EncoderSpec>,
    pub frames: u64,
    pub finishes: usize,
}

/// Encoder factory that counts frames instead of encoding them
#[derive(Clone, Default)]
pub struct CountingEncoderFactory {
    log: Arc<Mutex<EncoderLog>>,
    fail_open: Arc<AtomicBool>,
}

impl CountingEncoderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let factory = Self::default();
        factory.fail_open.store(true, Ordering::SeqCst);
        factory
    }

    pub fn opened(&self) -> usize {
        self.log.lock().opened.len()
    }

    pub fn frames(&self) -> u64 {
        self.log.lock().frames
    }

    pub fn finishes(&self) -> usize {
        self.log.lock().finishes
    }

    pub fn last_spec(&self) -> Option<EncoderSpec> {
        self.log.lock().opened.last().cloned()
    }
}

impl EncoderFactory for CountingEncoderFactory {
    fn open(&self, spec: &EncoderSpec) -> EncoderResult<Box<dyn FrameEncoder>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(EncoderError::FfmpegNotFound("ffmpeg".to_string()));
        }
        self.log.lock().opened.push(spec.clone());
        Ok(Box::new(CountingEncoder {
            spec: spec.clone(),
            written: 0,
            log: self.log.clone(),
        }))
    }
}

struct CountingEncoder {
    spec: EncoderSpec,
    written: u64,
    log: Arc<Mutex<EncoderLog>>,
}

impl FrameEncoder for CountingEncoder {
    fn write_frame(&mut self, frame: &Frame) -> EncoderResult<()> {
        if frame.resolution() != self.spec.resolution {
            return Err(EncoderError::FrameMismatch {
                expected: self.spec.resolution,
                actual: frame.resolution(),
            });
        }
        self.written += 1;
        self.log.lock().frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> EncoderResult<EncodeSummary> {
        self.log.lock().finishes += 1;
        Ok(EncodeSummary {
            output_path: self.spec.output_path.clone(),
            frames_written: self.written,
        })
    }
}

/// Outlet that records pushed values and lets tests set the consumer count
pub struct MemoryOutlet {
    info: StreamInfo,
    consumers: watch::Sender<usize>,
    values: Mutex<Vec<i64>>,
    fail_pushes: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl MemoryOutlet {
    pub fn new(name: &str) -> Arc<Self> {
        let (consumers, _) = watch::channel(0usize);
        Arc::new(Self {
            info: StreamInfo::markers(name),
            consumers,
            values: Mutex::new(Vec::new()),
            fail_pushes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_consumers(&self, count: usize) {
        self.consumers.send_replace(count);
    }

    pub fn fail_pushes(&self, fail: bool) {
        self.fail_pushes.store(fail, Ordering::SeqCst);
    }

    pub fn values(&self) -> Vec<i64> {
        self.values.lock().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarkerOutlet for MemoryOutlet {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn endpoint(&self) -> Option<SocketAddr> {
        None
    }

    fn consumer_count(&self) -> usize {
        *self.consumers.borrow()
    }

    async fn wait_for_consumers(&self, timeout: Duration) -> bool {
        let mut rx = self.consumers.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|count| *count > 0))
            .await
            .map(|seen| seen.is_ok())
            .unwrap_or(false)
    }

    fn push_sample(&self, sample: MarkerSample) -> MarkerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MarkerError::Closed);
        }
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(MarkerError::Io("transport unavailable".to_string()));
        }
        self.values.lock().push(sample.value);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out `MemoryOutlet`s and keeps them reachable by stream name
#[derive(Default)]
pub struct MemoryOutletFactory {
    outlets: Mutex<Vec<Arc<MemoryOutlet>>>,
    initial_consumers: usize,
}

impl MemoryOutletFactory {
    pub fn with_consumers(initial_consumers: usize) -> Self {
        Self {
            outlets: Mutex::new(Vec::new()),
            initial_consumers,
        }
    }

    pub fn outlet(&self, name: &str) -> Option<Arc<MemoryOutlet>> {
        self.outlets
            .lock()
            .iter()
            .find(|o| o.info.name == name)
            .cloned()
    }
}

#[async_trait]
impl OutletFactory for MemoryOutletFactory {
    async fn create(&self, info: StreamInfo, _slot: usize) -> MarkerResult<Arc<dyn MarkerOutlet>> {
        let outlet = MemoryOutlet::new(&info.name);
        outlet.set_consumers(self.initial_consumers);
        self.outlets.lock().push(outlet.clone());
        Ok(outlet)
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
