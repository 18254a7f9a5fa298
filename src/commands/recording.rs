//! `timeshot record`

use super::preview;
use crate::capture::CameraSource;
use crate::encoder::FfmpegEncoderFactory;
use crate::marker::TcpOutletFactory;
use crate::recorder::{
    BatchReport, CameraSelection, RecorderConfig, SessionManager, SessionNotice, StopReport,
};
use anyhow::{bail, Context};
use clap::Args;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// How often the record loop re-checks whether anything is still recording
const IDLE_CHECK: Duration = Duration::from_secs(1);

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Args, Debug, Clone)]
pub struct RecordArgs {
    /// Camera index to record; repeat for several. Defaults to every camera found.
    #[arg(long = "camera", short = 'c')]
    pub cameras: Vec<u32>,

    /// Directory for the video files
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// Wait for a marker consumer on every stream before recording, and stop a
    /// session when its consumers go away
    #[arg(long)]
    pub wait_for_consumers: bool,

    /// Seconds to wait for consumers
    #[arg(long)]
    pub consumer_wait_secs: Option<u64>,

    /// Seconds between consumer liveness checks
    #[arg(long)]
    pub liveness_interval_secs: Option<u64>,

    /// First marker port; each further camera uses the next one. 0 picks free ports.
    #[arg(long)]
    pub marker_port: Option<u16>,

    /// Write the latest frame of each camera as PNG into this directory
    #[arg(long)]
    pub preview_dir: Option<PathBuf>,

    /// Do not burn FPS and frame index into the video
    #[arg(long)]
    pub no_overlay: bool,

    /// Print the stop summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl RecordArgs {
    /// Fold command-line overrides into the loaded config
    pub fn apply(&self, config: &mut RecorderConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(secs) = self.consumer_wait_secs {
            config.consumer_wait_secs = secs;
        }
        if let Some(secs) = self.liveness_interval_secs {
            config.liveness_interval_secs = secs;
        }
        if let Some(port) = self.marker_port {
            config.marker_base_port = port;
        }
        if self.no_overlay {
            config.overlay = false;
        }
    }
}

pub async fn record(
    mut config: RecorderConfig,
    args: RecordArgs,
    cameras: Arc<dyn CameraSource>,
) -> anyhow::Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let indices: Vec<u32> = if args.cameras.is_empty() {
        cameras.list_cameras().iter().map(|c| c.index).collect()
    } else {
        args.cameras.clone()
    };
    if indices.is_empty() {
        bail!("no cameras found");
    }

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("cannot create output directory {:?}", config.output_dir))?;

    let selections: Vec<CameraSelection> = indices
        .iter()
        .map(|&i| CameraSelection::with_defaults(i, &config.output_dir))
        .collect();

    let manager = SessionManager::new(
        config.session_options(),
        cameras,
        Arc::new(FfmpegEncoderFactory::new(config.encoder.clone())),
        Arc::new(TcpOutletFactory::new(
            config.marker_bind_addr,
            config.marker_base_port,
        )),
    );
    let mut notices = manager.subscribe_notices();

    let created = manager.create_all(selections).await?;
    for failure in &created.failures {
        eprintln!("Camera {} skipped: {}", failure.device_index, failure.error);
    }
    for status in manager.statuses() {
        let endpoint = status
            .marker_endpoint
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "Camera {}: {:?} -> '{}' on {}",
            status.device_index, status.file_path, status.stream_name, endpoint
        );
    }

    if let Some(dir) = &args.preview_dir {
        for session in manager.sessions() {
            preview::spawn_snapshots(&session, dir.clone(), SNAPSHOT_INTERVAL);
        }
    }

    if args.wait_for_consumers {
        println!(
            "Waiting up to {}s for marker consumers...",
            config.consumer_wait_secs
        );
    }
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let interrupt = async {
        let _ = (&mut ctrl_c).await;
    };
    let Some(started) = start_or_interrupt(&manager, args.wait_for_consumers, interrupt).await
    else {
        println!("\nInterrupted before recording started, stopping...");
        let reports = manager.stop_all().await;
        print_summary(&reports, args.json)?;
        return Ok(());
    };
    for failure in &started.failures {
        eprintln!("Camera {} did not start: {}", failure.device_index, failure.error);
    }
    if started.succeeded.is_empty() {
        manager.stop_all().await;
        bail!("no camera started recording");
    }

    println!("Recording... (Press Ctrl+C to stop)");

    let mut idle_check = tokio::time::interval(IDLE_CHECK);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!("\nStopping...");
                break;
            }
            notice = notices.recv() => match notice {
                Ok(SessionNotice::AutoStopped { device_index, stream_name, reason }) => {
                    println!("Camera {} ('{}') stopped automatically: {}", device_index, stream_name, reason);
                }
                Ok(SessionNotice::Stopped { device_index, frames_recorded, .. }) => {
                    println!("Camera {} stopped after {} frames", device_index, frames_recorded);
                }
                Ok(SessionNotice::Fault { device_index, message, .. }) => {
                    eprintln!("Camera {}: {}", device_index, message);
                }
                Ok(SessionNotice::Started { .. }) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = idle_check.tick() => {}
        }

        if !manager.any_recording() {
            println!("No session is recording any more");
            break;
        }
    }

    let reports = manager.stop_all().await;
    print_summary(&reports, args.json)?;
    Ok(())
}

/// Start every session unless `interrupt` resolves first.
///
/// `None` means interrupted. The pending starts are dropped, which puts any
/// session still waiting for consumers back to idle so it can be stopped.
pub async fn start_or_interrupt(
    manager: &SessionManager,
    wait_for_consumers: bool,
    interrupt: impl Future,
) -> Option<BatchReport> {
    tokio::select! {
        started = manager.start_all(wait_for_consumers) => Some(started),
        _ = interrupt => None,
    }
}

fn print_summary(reports: &[StopReport], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reports)?);
        return Ok(());
    }

    for report in reports {
        let file = report
            .encode_summary
            .as_ref()
            .map(|s| s.output_path.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "Camera {} '{}': {} frames, {}",
            report.device_index, report.stream_name, report.frames_recorded, file
        );
        for diagnostic in &report.diagnostics {
            println!("  warning: {}", diagnostic);
        }
    }
    Ok(())
}
