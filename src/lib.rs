//! TimeShot - multi-camera recording with per-frame synchronization markers.
//!
//! Every camera gets its own video file and its own marker stream. Each frame
//! written to a file has its index published on that camera's stream, so data
//! recorded elsewhere can be aligned to exact video frames.

pub mod capture;
pub mod commands;
pub mod encoder;
pub mod marker;
pub mod recorder;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

use clap::Parser;
use commands::Cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Parse the command line and run the selected command
pub fn run() -> anyhow::Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timeshot_lib=debug,timeshot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    tracing::info!("Starting TimeShot v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(commands::dispatch(cli))
}
