//! Optical drive discovery
//!
//! Candidates are the well-known device paths plus every `sr*` block device. Each is
//! resolved through symlinks and de-duplicated by real path, so `/dev/cdrom` and
//! `/dev/sr0` pointing at the same drive appear once.

use crate::tools::{args, run_tool};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use webcd_common::config::ToolsConfig;

const UNKNOWN_MODEL: &str = "Unknown CD/DVD Drive";

/// A discovered drive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub device: String,
    pub real_path: String,
    pub model: String,
    pub has_media: bool,
}

/// Probes the filesystem and tools for drives and media
#[derive(Debug, Clone)]
pub struct DeviceProber {
    candidates: Vec<String>,
    sysfs_block: PathBuf,
    cdparanoia: String,
    blockdev: String,
    media_timeout: Duration,
}

impl DeviceProber {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            candidates: tools.device_candidates.clone(),
            sysfs_block: tools.sysfs_block.clone(),
            cdparanoia: tools.cdparanoia.clone(),
            blockdev: tools.blockdev.clone(),
            media_timeout: Duration::from_secs(tools.media_check_timeout_secs),
        }
    }

    /// All drives currently present
    pub async fn discover(&self) -> Vec<DeviceInfo> {
        let mut paths: Vec<String> = self.candidates.clone();

        if let Ok(mut entries) = tokio::fs::read_dir(&self.sysfs_block).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with("sr") {
                    let path = format!("/dev/{}", name);
                    if !paths.contains(&path) {
                        paths.push(path);
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        let mut devices = Vec::new();
        for path in paths {
            if !Path::new(&path).exists() {
                continue;
            }
            let info = self.device_info(&path).await;
            if seen.insert(info.real_path.clone()) {
                devices.push(info);
            }
        }

        debug!(count = devices.len(), "Device discovery complete");
        devices
    }

    /// Describe one existing device path
    pub async fn device_info(&self, path: &str) -> DeviceInfo {
        let real_path = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| PathBuf::from(path));

        let model = match real_path.file_name() {
            Some(name) => {
                let model_file = self.sysfs_block.join(name).join("device").join("model");
                tokio::fs::read_to_string(&model_file)
                    .await
                    .map(|m| m.trim().to_string())
                    .ok()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| UNKNOWN_MODEL.to_string())
            }
            None => UNKNOWN_MODEL.to_string(),
        };

        DeviceInfo {
            device: path.to_string(),
            real_path: real_path.to_string_lossy().into_owned(),
            model,
            has_media: self.has_media(path).await,
        }
    }

    /// Whether a disc is loaded
    ///
    /// A TOC probe that runs counts as media unless it reports it cannot open the
    /// disc. If the probe cannot run at all, a non-zero block device size counts.
    pub async fn has_media(&self, path: &str) -> bool {
        match run_tool(&self.cdparanoia, &args(["-Q", "-d", path]), self.media_timeout).await {
            Ok(output) => !output.stderr.contains("Unable to open disc"),
            Err(_) => {
                match run_tool(&self.blockdev, &args(["--getsize64", path]), self.media_timeout).await {
                    Ok(output) => {
                        output.success()
                            && output.stdout.trim().parse::<u64>().map(|s| s > 0).unwrap_or(false)
                    }
                    Err(_) => false,
                }
            }
        }
    }
}
