//! Tray eject

use crate::tools::{args, run_tool, ToolError};
use std::time::Duration;
use tracing::info;
use webcd_common::config::ToolsConfig;
use webcd_common::{Error, Result};

/// Open the drive tray
pub async fn eject(tools: &ToolsConfig, device: &str) -> Result<()> {
    let timeout = Duration::from_secs(tools.eject_timeout_secs);
    let output = run_tool(&tools.eject, &args([device]), timeout)
        .await
        .map_err(|e| match e {
            ToolError::TimedOut { .. } => Error::EjectFailed("Eject command timed out".to_string()),
            other => Error::EjectFailed(other.to_string()),
        })?;

    if !output.success() {
        return Err(Error::EjectFailed(output.stderr.trim().to_string()));
    }

    info!(device = %device, "Disc ejected");
    Ok(())
}
