//! Per-request audio streaming

pub mod commands;
pub mod pipeline;
pub mod sessions;

pub use pipeline::{StreamPath, StreamingPipeline, TrackStream};
pub use sessions::{PendingSession, SessionHandle, SessionRegistry};
