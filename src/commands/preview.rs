//! Preview snapshots
//!
//! The command-line preview boundary: keeps `<dir>/Cam{i}_preview.png` up to
//! date with the latest frame of each session, at a bounded rate.

use crate::capture::Frame;
use crate::recorder::{CameraSession, PreviewEvent};
use crate::utils::error::{AppError, AppResult};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Encode an RGB frame as PNG
pub fn write_png(frame: &Frame, path: &Path) -> AppResult<()> {
    let file = std::fs::File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), frame.width, frame.height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);

    let mut writer = encoder
        .write_header()
        .map_err(|e| AppError::Image(format!("PNG header error: {}", e)))?;
    writer
        .write_image_data(&frame.data)
        .map_err(|e| AppError::Image(format!("PNG write error: {}", e)))?;
    Ok(())
}

/// Rate-limited snapshot writer for one camera
pub struct SnapshotWriter {
    path: PathBuf,
    min_interval: Duration,
    last_written: Option<Instant>,
}

impl SnapshotWriter {
    pub fn new(dir: &Path, device_index: u32, min_interval: Duration) -> Self {
        Self {
            path: dir.join(format!("Cam{}_preview.png", device_index)),
            min_interval,
            last_written: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a frame arriving `now` should be written
    pub fn due(&self, now: Instant) -> bool {
        match self.last_written {
            Some(last) => now.duration_since(last) >= self.min_interval,
            None => true,
        }
    }

    pub fn mark_written(&mut self, now: Instant) {
        self.last_written = Some(now);
    }
}

/// Follow one session's preview until it closes
pub fn spawn_snapshots(session: &CameraSession, dir: PathBuf, min_interval: Duration) -> JoinHandle<()> {
    let mut events = session.subscribe_preview();
    let device_index = session.device_index();

    tokio::spawn(async move {
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!("Cannot create preview directory {:?}: {}", dir, e);
            return;
        }
        let mut writer = SnapshotWriter::new(&dir, device_index, min_interval);

        loop {
            let frame: Arc<Frame> = match events.recv().await {
                Ok(PreviewEvent::Frame { frame, .. }) => frame,
                Ok(PreviewEvent::Closed { .. }) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => continue,
            };

            let now = Instant::now();
            if !writer.due(now) {
                continue;
            }
            writer.mark_written(now);

            let path = writer.path().to_path_buf();
            let written = tokio::task::spawn_blocking(move || write_png(&frame, &path)).await;
            match written {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!("Preview snapshot for camera {} failed: {}", device_index, e),
                Err(e) => tracing::debug!("Preview snapshot task failed: {}", e),
            }
        }

        tracing::debug!("Preview for camera {} closed", device_index);
    })
}
