//! # webcd server library
//!
//! Serves an optical drive over HTTP: table-of-contents reading, disc
//! fingerprinting, album metadata from GNUDB and MusicBrainz, and per-track MP3
//! streams produced by an extraction/encoding process pipeline.

pub mod api;
pub mod disc;
pub mod error;
pub mod inspect;
pub mod logging;
pub mod metadata;
pub mod playback;
pub mod state;
pub mod stream;
pub mod tools;

pub use error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use disc::{DeviceProber, DiscReader, Fingerprinter};
use inspect::DiscInspector;
use metadata::{CddbLookup, GnudbClient, MetadataResolver, MusicBrainzClient, ReleaseLookup};
use playback::PlaybackController;
use state::{DeviceList, DiscStore, ProfileStore};
use std::sync::Arc;
use stream::{SessionRegistry, StreamingPipeline};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use webcd_common::config::{ToolsConfig, TomlConfig};
use webcd_common::Result;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Selected device and disc snapshot
    pub disc: Arc<DiscStore>,
    /// Active stream profile
    pub profile: Arc<ProfileStore>,
    /// Last device discovery result
    pub devices: Arc<DeviceList>,
    pub prober: Arc<DeviceProber>,
    pub inspector: Arc<DiscInspector>,
    /// Manual search and release fetch
    pub releases: Arc<dyn ReleaseLookup>,
    pub pipeline: Arc<StreamingPipeline>,
    /// One live stream per device
    pub sessions: SessionRegistry,
    pub playback: Arc<PlaybackController>,
    pub tools: Arc<ToolsConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Build state with network clients from configuration
    pub fn from_config(config: &TomlConfig, device: Option<String>) -> Result<Self> {
        let cddb: Arc<dyn CddbLookup> = Arc::new(GnudbClient::new(&config.gnudb));
        let releases: Arc<dyn ReleaseLookup> = Arc::new(MusicBrainzClient::new(&config.musicbrainz)?);
        Ok(Self::with_lookups(config, device, cddb, releases))
    }

    /// Build state around existing lookup implementations
    pub fn with_lookups(
        config: &TomlConfig,
        device: Option<String>,
        cddb: Arc<dyn CddbLookup>,
        releases: Arc<dyn ReleaseLookup>,
    ) -> Self {
        let tools = &config.tools;
        let resolver = MetadataResolver::new(cddb, releases.clone());
        let inspector = DiscInspector::new(DiscReader::new(tools), Fingerprinter::new(tools), resolver);
        let pipeline = StreamingPipeline::new(tools);
        let sessions = SessionRegistry::new();
        let playback = PlaybackController::new(pipeline.clone(), sessions.clone(), tools.player.clone());

        Self {
            disc: Arc::new(DiscStore::new(device)),
            profile: Arc::new(ProfileStore::new(config.initial_profile())),
            devices: Arc::new(DeviceList::default()),
            prober: Arc::new(DeviceProber::new(tools)),
            inspector: Arc::new(inspector),
            releases,
            pipeline: Arc::new(pipeline),
            sessions,
            playback: Arc::new(playback),
            tools: Arc::new(tools.clone()),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::disc_routes())
        .merge(api::playback_routes())
        .merge(api::album_routes())
        .merge(api::settings_routes())
        .merge(api::stream_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
