//! Device, disc information and eject endpoints

use crate::disc::{eject, DeviceInfo, DiscIdRecord};
use crate::error::{ApiError, ApiResult};
use crate::inspect::DiscReport;
use crate::tools::{args, run_tool, ToolOutput};
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use webcd_common::api::Ack;
use webcd_common::Error;

#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub success: bool,
    pub devices: Vec<DeviceInfo>,
    pub current_device: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetDeviceRequest {
    #[serde(default)]
    pub device: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SetDeviceResponse {
    pub success: bool,
    pub device: String,
}

#[derive(Debug, Serialize)]
pub struct CdInfoResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: DiscReport,
}

/// Raw output of one diagnostic tool run
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ToolReport {
    Ran {
        stdout: String,
        stderr: String,
        returncode: Option<i32>,
    },
    Failed {
        error: String,
    },
}

impl From<ToolOutput> for ToolReport {
    fn from(output: ToolOutput) -> Self {
        ToolReport::Ran {
            returncode: output.exit_code(),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ParsedDiscId {
    pub disc_id: String,
    pub track_count: u32,
    pub offsets: Vec<u64>,
    pub disc_length_seconds: u64,
}

impl From<DiscIdRecord> for ParsedDiscId {
    fn from(record: DiscIdRecord) -> Self {
        Self {
            disc_id: record.disc_id,
            track_count: record.track_count,
            offsets: record.offsets,
            disc_length_seconds: record.total_seconds,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DebugCdResponse {
    pub device: String,
    #[serde(rename = "cd-discid")]
    pub cd_discid: ToolReport,
    pub parsed: Option<ParsedDiscId>,
    pub cdparanoia: ToolReport,
}

/// GET /api/devices
///
/// Re-runs discovery and returns the drive list with the current selection.
pub async fn list_devices(State(state): State<AppState>) -> Json<DevicesResponse> {
    let devices = state.prober.discover().await;
    state.devices.replace(devices.clone()).await;

    Json(DevicesResponse {
        success: true,
        devices,
        current_device: state.disc.current_device().await,
    })
}

/// POST /api/set-device
///
/// **Request:** `{"device": "/dev/sr0"}`
///
/// Stops playback and any stream on the old drive and clears the snapshot.
pub async fn set_device(
    State(state): State<AppState>,
    Json(payload): Json<SetDeviceRequest>,
) -> ApiResult<Json<SetDeviceResponse>> {
    let device = payload
        .device
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("No device specified".to_string()))?;

    if !Path::new(&device).exists() {
        return Err(Error::DeviceNotFound(device).into());
    }

    if let Some(previous) = state.disc.current_device().await {
        state.sessions.cancel_device(&previous);
    }
    state.playback.reset().await;
    state.disc.select_device(&device).await;

    Ok(Json(SetDeviceResponse {
        success: true,
        device,
    }))
}

/// GET /api/cd-info
///
/// Reads the disc fresh on every call and replaces the snapshot.
pub async fn cd_info(State(state): State<AppState>) -> ApiResult<Json<CdInfoResponse>> {
    let report = state.inspector.inspect(&state.disc).await?;
    Ok(Json(CdInfoResponse {
        success: true,
        report,
    }))
}

/// POST /api/eject
pub async fn eject_disc(State(state): State<AppState>) -> ApiResult<Json<Ack>> {
    let device = state.disc.require_device().await?;

    // A drive being read refuses to open
    state.playback.stop().await;
    state.sessions.cancel_device(&device);

    eject::eject(&state.tools, &device).await?;

    state.playback.reset().await;
    state.disc.clear().await;
    let devices = state.prober.discover().await;
    state.devices.replace(devices).await;

    info!(device = %device, "Disc state cleared after eject");
    Ok(Json(Ack::ok_with("CD ejected successfully")))
}

/// GET /api/debug-cd
///
/// Raw tool output for troubleshooting; tool failures are reported inline.
pub async fn debug_cd(State(state): State<AppState>) -> ApiResult<Json<DebugCdResponse>> {
    let device = state.disc.require_device().await?;
    let tools = &state.tools;

    let discid = run_tool(
        &tools.cd_discid,
        &args([device.as_str()]),
        Duration::from_secs(tools.discid_timeout_secs),
    )
    .await;
    let parsed = discid
        .as_ref()
        .ok()
        .and_then(|output| DiscIdRecord::parse(output.stdout.trim()))
        .map(ParsedDiscId::from);

    let paranoia = run_tool(
        &tools.cdparanoia,
        &args(["-Q", "-d", device.as_str()]),
        Duration::from_secs(tools.probe_timeout_secs),
    )
    .await;

    Ok(Json(DebugCdResponse {
        device,
        cd_discid: tool_report(discid),
        parsed,
        cdparanoia: tool_report(paranoia),
    }))
}

fn tool_report(result: Result<ToolOutput, crate::tools::ToolError>) -> ToolReport {
    match result {
        Ok(output) => output.into(),
        Err(e) => ToolReport::Failed {
            error: e.to_string(),
        },
    }
}

/// Build device and disc routes
pub fn disc_routes() -> Router<AppState> {
    Router::new()
        .route("/api/devices", get(list_devices))
        .route("/api/set-device", post(set_device))
        .route("/api/cd-info", get(cd_info))
        .route("/api/eject", post(eject_disc))
        .route("/api/debug-cd", get(debug_cd))
}
