//! Common error types for webcd

use thiserror::Error;

/// Common result type for webcd operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the reader, resolver, pipeline and settings paths
///
/// Every external tool or network failure is converted into one of these at the
/// component that observed it. Most are recoverable: the caller falls back to the
/// next strategy and only reports the error if every strategy failed.
#[derive(Error, Debug)]
pub enum Error {
    /// No drive has been selected (none discovered and none configured)
    #[error("No CD device selected")]
    NoDeviceSelected,

    /// A device path was requested that does not exist
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Neither TOC reader produced at least one track
    #[error("No CD detected")]
    NoMediaDetected,

    /// An external reader tool failed (missing binary, timeout, unparsable output)
    #[error("Reader tool failure: {0}")]
    ReaderToolFailure(String),

    /// A metadata lookup over the network failed
    #[error("Network lookup failure: {0}")]
    NetworkLookupFailure(String),

    /// A streaming stage could not be launched
    #[error("Failed to launch {stage} stage: {reason}")]
    StreamStageLaunchFailure { stage: String, reason: String },

    /// Requested track outside `[1, track_count]`
    #[error("Invalid track number {requested} (disc has {track_count} tracks)")]
    InvalidTrackNumber { requested: i64, track_count: usize },

    /// The device was switched or the disc ejected while a request was in flight
    #[error("Disc changed while the request was running")]
    DiscChanged,

    /// A settings field was dropped from an update
    #[error("Rejected value for {field}: {value}")]
    ConfigValueRejected { field: String, value: String },

    /// The eject tool failed or timed out
    #[error("Failed to eject CD: {0}")]
    EjectFailed(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code for API envelopes
    pub fn code(&self) -> &'static str {
        match self {
            Error::NoDeviceSelected => "NO_DEVICE_SELECTED",
            Error::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Error::NoMediaDetected => "NO_MEDIA_DETECTED",
            Error::ReaderToolFailure(_) => "READER_TOOL_FAILURE",
            Error::NetworkLookupFailure(_) => "NETWORK_LOOKUP_FAILURE",
            Error::StreamStageLaunchFailure { .. } => "STREAM_STAGE_LAUNCH_FAILURE",
            Error::InvalidTrackNumber { .. } => "INVALID_TRACK_NUMBER",
            Error::DiscChanged => "DISC_CHANGED",
            Error::ConfigValueRejected { .. } => "CONFIG_VALUE_REJECTED",
            Error::EjectFailed(_) => "EJECT_FAILED",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Name of the stage that failed, reported to clients
    pub fn stage(&self) -> &'static str {
        match self {
            Error::NoDeviceSelected | Error::DeviceNotFound(_) => "device",
            Error::NoMediaDetected | Error::ReaderToolFailure(_) => "reader",
            Error::NetworkLookupFailure(_) | Error::DiscChanged => "metadata",
            Error::StreamStageLaunchFailure { .. } | Error::InvalidTrackNumber { .. } => "stream",
            Error::ConfigValueRejected { .. } => "settings",
            Error::EjectFailed(_) => "eject",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}
