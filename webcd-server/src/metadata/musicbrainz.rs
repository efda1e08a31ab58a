//! MusicBrainz web service client
//!
//! Disc-ID lookup, track-count search, free-text release search and release
//! fetch. Requests are paced `rate_limit_ms` apart. MusicBrainz answers 503 to
//! clients that exceed one request per second; each 503 doubles the spacing (up
//! to [`MAX_SPACING`]) until a request succeeds again.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use webcd_common::config::MusicBrainzConfig;
use webcd_common::disc::{year_from_date, UNKNOWN_ALBUM, UNKNOWN_ARTIST};
use webcd_common::{AlbumInfo, MetadataSource, Track};

/// MusicBrainz client errors
#[derive(Debug, Error)]
pub enum MbError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<MbError> for webcd_common::Error {
    fn from(err: MbError) -> Self {
        webcd_common::Error::NetworkLookupFailure(err.to_string())
    }
}

/// Release as returned by discid, search and release endpoints
///
/// Every field is optional on the wire; search results carry no media track lists.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MbRelease {
    pub id: String,
    pub title: Option<String>,
    /// `YYYY[-MM[-DD]]`
    pub date: Option<String>,
    #[serde(rename = "text-representation")]
    pub text_representation: Option<MbTextRepresentation>,
    #[serde(rename = "artist-credit")]
    pub artist_credit: Vec<MbArtistCredit>,
    pub media: Vec<MbMedium>,
    /// Total across media; present on search results
    #[serde(rename = "track-count")]
    pub track_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MbTextRepresentation {
    pub language: Option<String>,
    pub script: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MbArtistCredit {
    pub name: Option<String>,
    pub artist: Option<MbArtist>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MbArtist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MbMedium {
    pub position: Option<u32>,
    pub discs: Vec<MbDisc>,
    pub tracks: Vec<MbTrack>,
    #[serde(rename = "track-count")]
    pub track_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MbDisc {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MbTrack {
    pub position: Option<u32>,
    pub title: String,
}

#[derive(Debug, Deserialize)]
struct DiscIdResponse {
    #[serde(default)]
    releases: Vec<MbRelease>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    releases: Vec<MbRelease>,
}

impl MbRelease {
    pub fn language(&self) -> Option<&str> {
        self.text_representation
            .as_ref()
            .and_then(|t| t.language.as_deref())
    }

    pub fn has_date(&self) -> bool {
        self.date.as_deref().is_some_and(|d| !d.trim().is_empty())
    }

    /// First credited artist
    pub fn artist_name(&self) -> String {
        self.artist_credit
            .first()
            .and_then(|credit| {
                credit
                    .artist
                    .as_ref()
                    .map(|a| a.name.clone())
                    .or_else(|| credit.name.clone())
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string())
    }

    pub fn album_title(&self) -> String {
        self.title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNKNOWN_ALBUM.to_string())
    }

    pub fn year(&self) -> Option<String> {
        self.date.as_deref().and_then(year_from_date)
    }

    pub fn album_info(&self, source: MetadataSource) -> AlbumInfo {
        AlbumInfo::new(self.artist_name(), self.album_title(), self.year(), source)
    }

    /// Medium carrying the given disc id
    pub fn medium_for_disc(&self, disc_id: &str) -> Option<&MbMedium> {
        self.media
            .iter()
            .find(|medium| medium.discs.iter().any(|disc| disc.id == disc_id))
    }

    pub fn total_tracks(&self) -> u32 {
        self.track_count.unwrap_or_else(|| {
            self.media
                .iter()
                .map(|m| m.track_count.unwrap_or(m.tracks.len() as u32))
                .sum()
        })
    }
}

impl MbMedium {
    /// Apply this medium's titles in order, bounded by the local track list
    pub fn apply_titles(&self, tracks: &mut [Track]) -> usize {
        webcd_common::disc::apply_titles(
            tracks,
            self.tracks.iter().enumerate().map(|(i, t)| (i, t.title.clone())),
        )
    }
}

/// Pick the best of several releases sharing a disc id
///
/// An `eng` release wins outright; otherwise the first release with a date;
/// otherwise the first release.
pub fn select_release(releases: &[MbRelease]) -> Option<&MbRelease> {
    if let Some(english) = releases.iter().find(|r| r.language() == Some("eng")) {
        return Some(english);
    }
    releases
        .iter()
        .find(|r| r.has_date())
        .or_else(|| releases.first())
}

/// One row of a manual album search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumCandidate {
    pub id: String,
    pub album: String,
    pub artist: String,
    /// Empty when the release carries no date
    pub year: String,
    pub track_count: u32,
}

impl From<&MbRelease> for AlbumCandidate {
    fn from(release: &MbRelease) -> Self {
        Self {
            id: release.id.clone(),
            album: release.album_title(),
            artist: release.artist_name(),
            year: release.year().unwrap_or_default(),
            track_count: release.total_tracks(),
        }
    }
}

/// Release lookups the resolver and album endpoints depend on
#[async_trait]
pub trait ReleaseLookup: Send + Sync {
    /// Releases containing a disc; empty when the id is unknown
    async fn releases_by_disc_id(&self, disc_id: &str) -> Result<Vec<MbRelease>, MbError>;

    /// Releases with the given total track count
    async fn search_by_track_count(&self, track_count: usize) -> Result<Vec<MbRelease>, MbError>;

    /// Free-text release search
    async fn search_releases(&self, query: &str) -> Result<Vec<MbRelease>, MbError>;

    /// One release with its media and track lists
    async fn release(&self, release_id: &str) -> Result<MbRelease, MbError>;
}

/// Spacing ceiling while MusicBrainz keeps answering 503
pub const MAX_SPACING: Duration = Duration::from_secs(8);

/// Spacing used after a 503 when none is configured
const MIN_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct Pace {
    next_slot: Option<Instant>,
    spacing: Duration,
}

/// Hands out request slots `spacing` apart
///
/// Concurrent callers each reserve their own slot, so the lock is never held
/// while waiting.
#[derive(Debug)]
struct RequestPacer {
    configured: Duration,
    pace: Mutex<Pace>,
}

impl RequestPacer {
    fn new(configured: Duration) -> Self {
        Self {
            configured,
            pace: Mutex::new(Pace {
                next_slot: None,
                spacing: configured,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pace> {
        self.pace.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spacing(&self) -> Duration {
        self.lock().spacing
    }

    /// Reserve the next slot and sleep until it arrives
    async fn acquire(&self) {
        let slot = {
            let mut pace = self.lock();
            let now = Instant::now();
            let slot = pace.next_slot.map_or(now, |next| next.max(now));
            pace.next_slot = Some(slot + pace.spacing);
            slot
        };
        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tracing::debug!("MusicBrainz pacing: waiting {:?}", wait);
            tokio::time::sleep_until(slot).await;
        }
    }

    fn throttled(&self) {
        let mut pace = self.lock();
        pace.spacing = (pace.spacing * 2).clamp(MIN_BACKOFF, MAX_SPACING);
        tracing::warn!(spacing_ms = pace.spacing.as_millis() as u64, "MusicBrainz throttling, widening request spacing");
    }

    fn recovered(&self) {
        let mut pace = self.lock();
        if pace.spacing != self.configured {
            pace.spacing = self.configured;
            tracing::debug!(spacing_ms = pace.spacing.as_millis() as u64, "MusicBrainz spacing restored");
        }
    }
}

/// MusicBrainz API client
pub struct MusicBrainzClient {
    http_client: reqwest::Client,
    base_url: String,
    heuristic_limit: u32,
    search_limit: u32,
    pacer: RequestPacer,
}

impl MusicBrainzClient {
    pub fn new(config: &MusicBrainzConfig) -> Result<Self, MbError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .build()
            .map_err(|e| MbError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            heuristic_limit: config.heuristic_limit,
            search_limit: config.search_limit,
            pacer: RequestPacer::new(Duration::from_millis(config.rate_limit_ms)),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<T, MbError> {
        self.pacer.acquire().await;

        tracing::debug!(url = %url, query = ?query, "Querying MusicBrainz API");

        let response = self
            .http_client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| MbError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(MbError::NotFound(what.to_string()));
        }

        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            self.pacer.throttled();
            return Err(MbError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MbError::Api(status.as_u16(), error_text));
        }
        self.pacer.recovered();

        response
            .json()
            .await
            .map_err(|e| MbError::Parse(e.to_string()))
    }

    async fn search(&self, query: String, limit: u32) -> Result<Vec<MbRelease>, MbError> {
        let url = format!("{}/release", self.base_url);
        let response: SearchResponse = self
            .get_json(
                &url,
                &[
                    ("query", query.clone()),
                    ("limit", limit.to_string()),
                    ("fmt", "json".to_string()),
                ],
                &query,
            )
            .await?;

        tracing::info!(query = %query, results = response.releases.len(), "MusicBrainz search");
        Ok(response.releases)
    }
}

#[async_trait]
impl ReleaseLookup for MusicBrainzClient {
    async fn releases_by_disc_id(&self, disc_id: &str) -> Result<Vec<MbRelease>, MbError> {
        let url = format!(
            "{}/discid/{}?inc=artists+recordings+release-groups&fmt=json",
            self.base_url, disc_id
        );
        match self.get_json::<DiscIdResponse>(&url, &[], disc_id).await {
            Ok(response) => {
                tracing::info!(disc_id = %disc_id, releases = response.releases.len(), "MusicBrainz disc-id lookup");
                Ok(response.releases)
            }
            Err(MbError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn search_by_track_count(&self, track_count: usize) -> Result<Vec<MbRelease>, MbError> {
        self.search(format!("tracks:{}", track_count), self.heuristic_limit)
            .await
    }

    async fn search_releases(&self, query: &str) -> Result<Vec<MbRelease>, MbError> {
        self.search(query.to_string(), self.search_limit).await
    }

    async fn release(&self, release_id: &str) -> Result<MbRelease, MbError> {
        let url = format!(
            "{}/release/{}?inc=artists+recordings&fmt=json",
            self.base_url, release_id
        );
        let release: MbRelease = self.get_json(&url, &[], release_id).await?;

        tracing::info!(
            release_id = %release_id,
            title = %release.album_title(),
            artist = %release.artist_name(),
            "Retrieved release from MusicBrainz"
        );

        Ok(release)
    }
}
