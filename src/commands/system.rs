//! Host and camera information

use crate::capture::{CameraInfo, CameraSource};
use crate::recorder::CameraSelection;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Host information, printed alongside the camera list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub hostname: String,
}

pub fn get_system_info() -> SystemInfo {
    SystemInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        hostname: hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string()),
    }
}

/// A camera plus the names a recording would use for it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraListing {
    #[serde(flatten)]
    pub camera: CameraInfo,
    pub default_file: String,
    pub default_stream: String,
}

pub fn list_cameras(source: &dyn CameraSource, output_dir: &Path) -> Vec<CameraListing> {
    source
        .list_cameras()
        .into_iter()
        .map(|camera| {
            let defaults = CameraSelection::with_defaults(camera.index, output_dir);
            CameraListing {
                default_file: defaults.file_path.display().to_string(),
                default_stream: defaults.stream_name,
                camera,
            }
        })
        .collect()
}

/// `timeshot cameras`
pub fn print_cameras(source: &dyn CameraSource, output_dir: &Path, json: bool) -> anyhow::Result<()> {
    let cameras = list_cameras(source, output_dir);

    if json {
        let report = serde_json::json!({
            "system": get_system_info(),
            "cameras": cameras,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let system = get_system_info();
    println!("{} ({} {})", system.hostname, system.os, system.arch);
    if cameras.is_empty() {
        println!("No cameras found");
        return Ok(());
    }

    for listing in &cameras {
        let resolutions: Vec<String> = listing
            .camera
            .supported_resolutions
            .iter()
            .map(|r| r.to_string())
            .collect();
        println!(
            "[{}] {}  {}  -> {} / {}",
            listing.camera.index,
            listing.camera.name,
            resolutions.join(", "),
            listing.default_file,
            listing.default_stream
        );
    }
    Ok(())
}
