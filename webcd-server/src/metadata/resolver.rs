//! Metadata resolution chain
//!
//! Strategies run in a fixed order and the first success wins:
//!
//! 1. GNUDB query (trusted fingerprint only)
//! 2. MusicBrainz disc-id lookup (trusted fingerprint only)
//! 3. MusicBrainz search by track count, accepted blindly
//!
//! A failing strategy is logged and skipped. The resolver never touches shared
//! state; callers install a [`Resolution`] only when one is returned.

use super::gnudb::CddbLookup;
use super::musicbrainz::{select_release, MbError, ReleaseLookup};
use crate::disc::Fingerprint;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use webcd_common::{AlbumInfo, MetadataSource, Track};

/// Which strategy produced a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    Gnudb,
    DiscId,
    TrackCountSearch,
}

impl ResolvedBy {
    /// Resolution order
    pub const ORDER: [ResolvedBy; 3] = [
        ResolvedBy::Gnudb,
        ResolvedBy::DiscId,
        ResolvedBy::TrackCountSearch,
    ];

    /// Whether the strategy may send the fingerprint over the network
    fn needs_trusted_fingerprint(self) -> bool {
        matches!(self, ResolvedBy::Gnudb | ResolvedBy::DiscId)
    }
}

impl fmt::Display for ResolvedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolvedBy::Gnudb => "gnudb",
            ResolvedBy::DiscId => "disc-id",
            ResolvedBy::TrackCountSearch => "track-count search",
        };
        f.write_str(name)
    }
}

/// Album attribution plus the titled track list it implies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub resolved_by: ResolvedBy,
    pub album: AlbumInfo,
    pub tracks: Vec<Track>,
}

/// Runs the strategy chain against a GNUDB client and a release lookup
#[derive(Clone)]
pub struct MetadataResolver {
    cddb: Arc<dyn CddbLookup>,
    releases: Arc<dyn ReleaseLookup>,
}

impl MetadataResolver {
    pub fn new(cddb: Arc<dyn CddbLookup>, releases: Arc<dyn ReleaseLookup>) -> Self {
        Self { cddb, releases }
    }

    /// Resolve album metadata for a disc
    ///
    /// `tracks` is the freshly read track list; the returned resolution carries
    /// a copy with any titles the winning strategy supplied.
    pub async fn resolve(&self, fingerprint: &Fingerprint, tracks: &[Track]) -> Option<Resolution> {
        for strategy in ResolvedBy::ORDER {
            if strategy.needs_trusted_fingerprint() && !fingerprint.is_trusted() {
                debug!(strategy = %strategy, fingerprint = %fingerprint.id(), "Skipping network lookup for local fingerprint");
                continue;
            }

            match self.attempt(strategy, fingerprint, tracks).await {
                Ok(Some(resolution)) => {
                    info!(
                        strategy = %strategy,
                        artist = %resolution.album.artist,
                        album = %resolution.album.album,
                        "Metadata resolved"
                    );
                    return Some(resolution);
                }
                Ok(None) => debug!(strategy = %strategy, "No match"),
                Err(e) => warn!(strategy = %strategy, "Lookup failed: {}", e),
            }
        }

        info!(fingerprint = %fingerprint.id(), "No metadata found");
        None
    }

    async fn attempt(
        &self,
        strategy: ResolvedBy,
        fingerprint: &Fingerprint,
        tracks: &[Track],
    ) -> Result<Option<Resolution>, MbError> {
        match strategy {
            ResolvedBy::Gnudb => Ok(self.by_gnudb(fingerprint, tracks).await),
            ResolvedBy::DiscId => self.by_disc_id(fingerprint, tracks).await,
            ResolvedBy::TrackCountSearch => self.by_track_count(tracks).await,
        }
    }

    async fn by_gnudb(&self, fingerprint: &Fingerprint, tracks: &[Track]) -> Option<Resolution> {
        let record = fingerprint.record()?;
        let data = self.cddb.lookup(record).await?;

        let mut titled = tracks.to_vec();
        data.apply_titles(&mut titled);
        Some(Resolution {
            resolved_by: ResolvedBy::Gnudb,
            album: data.album_info(&record.disc_id),
            tracks: titled,
        })
    }

    async fn by_disc_id(
        &self,
        fingerprint: &Fingerprint,
        tracks: &[Track],
    ) -> Result<Option<Resolution>, MbError> {
        let disc_id = fingerprint.id();
        let releases = self.releases.releases_by_disc_id(disc_id).await?;
        let Some(release) = select_release(&releases) else {
            return Ok(None);
        };

        let mut titled = tracks.to_vec();
        if let Some(medium) = release.medium_for_disc(disc_id) {
            medium.apply_titles(&mut titled);
        }

        Ok(Some(Resolution {
            resolved_by: ResolvedBy::DiscId,
            album: release
                .album_info(MetadataSource::Musicbrainz)
                .with_disc_id(disc_id),
            tracks: titled,
        }))
    }

    async fn by_track_count(&self, tracks: &[Track]) -> Result<Option<Resolution>, MbError> {
        if tracks.is_empty() {
            return Ok(None);
        }

        let releases = self.releases.search_by_track_count(tracks.len()).await?;
        Ok(releases.first().map(|release| Resolution {
            resolved_by: ResolvedBy::TrackCountSearch,
            album: release.album_info(MetadataSource::Musicbrainz),
            tracks: tracks.to_vec(),
        }))
    }
}
