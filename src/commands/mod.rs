//! Command-line handlers
//!
//! The presentation layer: each subcommand drives the recording engine and
//! prints what happened.

pub mod listen;
pub mod preview;
pub mod recording;
pub mod system;

use crate::capture;
use crate::recorder::RecorderConfig;
use crate::utils::error::AppResult;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Recorder config file (JSON)
    #[arg(long, global = true, env = "TIMESHOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use synthetic test-pattern cameras instead of real devices
    #[arg(long, global = true)]
    pub test_pattern: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List cameras and the file and stream names a recording would use
    Cameras {
        #[arg(long)]
        json: bool,
    },
    /// Record every selected camera with a marker stream per camera
    Record(recording::RecordArgs),
    /// Print the markers of a running stream
    Listen(listen::ListenArgs),
}

/// Defaults when no file is given
pub fn load_config(path: Option<&Path>) -> AppResult<RecorderConfig> {
    match path {
        Some(path) => RecorderConfig::load(path),
        None => Ok(RecorderConfig::default()),
    }
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Cameras { json } => {
            let source = capture::default_source(cli.test_pattern)?;
            system::print_cameras(source.as_ref(), &config.output_dir, json)
        }
        Command::Record(args) => {
            let source = capture::default_source(cli.test_pattern)?;
            recording::record(config, args, source).await
        }
        Command::Listen(args) => listen::listen(args).await,
    }
}
