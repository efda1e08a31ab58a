//! # WebCD Common Library
//!
//! Shared code for the webcd service:
//! - Disc data model (tracks, album attribution, disc snapshot)
//! - Stream profile and its validated update rules
//! - Error taxonomy shared by every component
//! - Bootstrap configuration loading
//! - API response envelope types

pub mod api;
pub mod config;
pub mod disc;
pub mod error;
pub mod profile;

pub use disc::{AlbumInfo, DiscSnapshot, MetadataSource, Track};
pub use error::{Error, Result};
pub use profile::{Bitrate, BufferSize, RobustnessMode, StreamProfile};
