//! Disc data model
//!
//! A `DiscSnapshot` is the in-memory record of the disc currently in the selected
//! drive. It is replaced wholesale on every metadata read and cleared on device
//! switch or eject; track titles are the only thing edited in place.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Artist used when a source gives an album title without an artist
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Album title used when a source gives no title at all
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// One audio track, numbered from 1 in physical disc order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub number: u32,
    pub title: String,
    /// `mm:ss`
    pub duration: String,
}

impl Track {
    /// Track with the synthesized default title (`"Track N"`)
    pub fn new(number: u32, duration: impl Into<String>) -> Self {
        Self {
            number,
            title: format!("Track {}", number),
            duration: duration.into(),
        }
    }

    /// Track whose duration is unknown
    pub fn placeholder(number: u32) -> Self {
        Self::new(number, "00:00")
    }
}

/// Where an album attribution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataSource {
    Gnudb,
    Musicbrainz,
    Manual,
}

/// Album attribution produced by exactly one successful lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumInfo {
    pub artist: String,
    pub album: String,
    pub year: Option<String>,
    pub source: MetadataSource,
    /// Identifier the attribution was looked up by, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disc_id: Option<String>,
}

impl AlbumInfo {
    pub fn new(
        artist: impl Into<String>,
        album: impl Into<String>,
        year: Option<String>,
        source: MetadataSource,
    ) -> Self {
        Self {
            artist: artist.into(),
            album: album.into(),
            year: year.filter(|y| !y.trim().is_empty()),
            source,
            disc_id: None,
        }
    }

    pub fn with_disc_id(mut self, disc_id: impl Into<String>) -> Self {
        self.disc_id = Some(disc_id.into());
        self
    }
}

/// The currently inspected disc
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscSnapshot {
    pub device: String,
    pub tracks: Vec<Track>,
    pub fingerprint: Option<String>,
    pub album: Option<AlbumInfo>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DiscSnapshot {
    /// Empty snapshot bound to a device
    pub fn empty(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Look up a requested track, rejecting anything outside `[1, len]`
    pub fn track(&self, requested: i64) -> Result<&Track> {
        let invalid = || Error::InvalidTrackNumber {
            requested,
            track_count: self.tracks.len(),
        };
        if requested < 1 {
            return Err(invalid());
        }
        self.tracks
            .get((requested - 1) as usize)
            .ok_or_else(invalid)
    }

    /// Drop everything learned about the disc, keeping the device binding
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.fingerprint = None;
        self.album = None;
        self.resolved_at = None;
    }
}

/// Apply zero-indexed titles to a track list
///
/// Titles whose index falls outside the track list are dropped. Returns how many
/// titles were applied.
pub fn apply_titles<I, S>(tracks: &mut [Track], titles: I) -> usize
where
    I: IntoIterator<Item = (usize, S)>,
    S: Into<String>,
{
    let mut applied = 0;
    for (index, title) in titles {
        if let Some(track) = tracks.get_mut(index) {
            track.title = title.into();
            applied += 1;
        }
    }
    applied
}

/// Year portion of a `YYYY[-MM[-DD]]` release date
pub fn year_from_date(date: &str) -> Option<String> {
    let year = date.split('-').next().unwrap_or("").trim();
    if year.is_empty() {
        None
    } else {
        Some(year.to_string())
    }
}
