//! Shared disc and profile state
//!
//! The disc snapshot and the stream profile each sit behind a single `RwLock`.
//! Device switches and ejects bump a generation counter so that a metadata read
//! which started before the switch cannot install its result afterwards.

use crate::disc::DeviceInfo;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use webcd_common::{AlbumInfo, DiscSnapshot, Error, Result, StreamProfile, Track};

#[derive(Debug, Default)]
struct DiscState {
    device: Option<String>,
    snapshot: DiscSnapshot,
    generation: u64,
}

/// Device and generation a metadata read started against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadTicket {
    pub device: String,
    pub generation: u64,
}

/// Selected device plus the snapshot of the disc in it
#[derive(Debug, Default)]
pub struct DiscStore {
    state: RwLock<DiscState>,
}

impl DiscStore {
    pub fn new(device: Option<String>) -> Self {
        let snapshot = DiscSnapshot::empty(device.clone().unwrap_or_default());
        Self {
            state: RwLock::new(DiscState {
                device,
                snapshot,
                generation: 0,
            }),
        }
    }

    pub async fn current_device(&self) -> Option<String> {
        self.state.read().await.device.clone()
    }

    /// Selected device, or `NoDeviceSelected`
    pub async fn require_device(&self) -> Result<String> {
        self.current_device().await.ok_or(Error::NoDeviceSelected)
    }

    pub async fn snapshot(&self) -> DiscSnapshot {
        self.state.read().await.snapshot.clone()
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    pub async fn track_count(&self) -> usize {
        self.state.read().await.snapshot.track_count()
    }

    /// Validate a requested track number against the snapshot
    pub async fn track(&self, requested: i64) -> Result<Track> {
        self.state.read().await.snapshot.track(requested).cloned()
    }

    /// Capture the device and generation before a metadata read
    pub async fn begin_read(&self) -> Result<ReadTicket> {
        let state = self.state.read().await;
        let device = state.device.clone().ok_or(Error::NoDeviceSelected)?;
        Ok(ReadTicket {
            device,
            generation: state.generation,
        })
    }

    /// Replace the snapshot with a read's result if nothing changed meanwhile
    ///
    /// Returns false, leaving the store untouched, when the device was switched or
    /// the disc ejected after `ticket` was taken.
    pub async fn install(
        &self,
        ticket: &ReadTicket,
        tracks: Vec<Track>,
        fingerprint: Option<String>,
        album: Option<AlbumInfo>,
    ) -> bool {
        let mut state = self.state.write().await;
        if state.generation != ticket.generation || state.device.as_deref() != Some(ticket.device.as_str()) {
            warn!(
                device = %ticket.device,
                started = ticket.generation,
                current = state.generation,
                "Discarding stale metadata read"
            );
            return false;
        }

        state.snapshot = DiscSnapshot {
            device: ticket.device.clone(),
            tracks,
            fingerprint,
            resolved_at: album.as_ref().map(|_| Utc::now()),
            album,
        };
        debug!(device = %ticket.device, tracks = state.snapshot.track_count(), "Disc snapshot installed");
        true
    }

    /// Switch drives, dropping everything known about the old disc
    pub async fn select_device(&self, device: &str) {
        let mut state = self.state.write().await;
        state.device = Some(device.to_string());
        state.snapshot = DiscSnapshot::empty(device);
        state.generation += 1;
        info!(device = %device, generation = state.generation, "Device selected");
    }

    /// Forget the current disc (eject), keeping the device
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.snapshot.clear();
        state.generation += 1;
        debug!(generation = state.generation, "Disc snapshot cleared");
    }

    /// Attach a manually chosen album, retitling tracks with `titles`
    ///
    /// Fails with `DiscChanged` if the device was switched or the disc ejected
    /// after `ticket` was taken.
    pub async fn set_album<I>(&self, ticket: &ReadTicket, album: AlbumInfo, titles: I) -> Result<DiscSnapshot>
    where
        I: IntoIterator<Item = (usize, String)>,
    {
        let mut state = self.state.write().await;
        if state.generation != ticket.generation || state.device.as_deref() != Some(ticket.device.as_str()) {
            warn!(
                device = %ticket.device,
                started = ticket.generation,
                current = state.generation,
                album = %album.album,
                "Discarding manual album for a disc that is gone"
            );
            return Err(Error::DiscChanged);
        }

        let applied = webcd_common::disc::apply_titles(&mut state.snapshot.tracks, titles);
        info!(album = %album.album, artist = %album.artist, titles = applied, "Album set manually");
        state.snapshot.album = Some(album);
        state.snapshot.resolved_at = Some(Utc::now());
        Ok(state.snapshot.clone())
    }
}

/// Active stream profile
#[derive(Debug, Default)]
pub struct ProfileStore {
    profile: RwLock<StreamProfile>,
}

impl ProfileStore {
    pub fn new(profile: StreamProfile) -> Self {
        Self {
            profile: RwLock::new(profile),
        }
    }

    pub async fn get(&self) -> StreamProfile {
        *self.profile.read().await
    }

    /// Apply a partial update; returns the resulting profile and the dropped fields
    pub async fn update(&self, update: &Map<String, Value>) -> (StreamProfile, Vec<Error>) {
        let mut profile = self.profile.write().await;
        let rejected = profile.apply_update(update);
        info!(
            bitrate = %profile.bitrate,
            buffer_size = %profile.buffer_size,
            robustness_mode = %profile.robustness_mode,
            preload_seconds = profile.preload_seconds,
            rejected = rejected.len(),
            "Stream profile updated"
        );
        (*profile, rejected)
    }
}

/// Last discovered drive list
#[derive(Debug, Default)]
pub struct DeviceList {
    devices: RwLock<Vec<DeviceInfo>>,
}

impl DeviceList {
    pub async fn get(&self) -> Vec<DeviceInfo> {
        self.devices.read().await.clone()
    }

    pub async fn replace(&self, devices: Vec<DeviceInfo>) {
        *self.devices.write().await = devices;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use webcd_common::{Bitrate, MetadataSource};

    fn tracks(n: u32) -> Vec<Track> {
        (1..=n).map(|i| Track::new(i, "03:00")).collect()
    }

    fn album() -> AlbumInfo {
        AlbumInfo::new("A", "B", Some("1999".to_string()), MetadataSource::Gnudb)
    }

    #[tokio::test]
    async fn test_no_device_selected() {
        let store = DiscStore::new(None);
        assert!(matches!(store.begin_read().await, Err(Error::NoDeviceSelected)));
        assert!(matches!(store.require_device().await, Err(Error::NoDeviceSelected)));
    }

    #[tokio::test]
    async fn test_install_replaces_wholesale() {
        let store = DiscStore::new(Some("/dev/sr0".to_string()));

        let ticket = store.begin_read().await.unwrap();
        assert!(store.install(&ticket, tracks(3), Some("a1b2c3d4".to_string()), Some(album())).await);
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.track_count(), 3);
        assert!(snapshot.album.is_some());
        assert!(snapshot.resolved_at.is_some());

        let ticket = store.begin_read().await.unwrap();
        assert!(store.install(&ticket, tracks(2), None, None).await);
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.track_count(), 2);
        assert!(snapshot.album.is_none());
        assert!(snapshot.fingerprint.is_none());
    }

    #[tokio::test]
    async fn test_stale_read_discarded_after_device_switch() {
        let store = DiscStore::new(Some("/dev/sr0".to_string()));
        let ticket = store.begin_read().await.unwrap();

        store.select_device("/dev/sr1").await;
        assert!(!store.install(&ticket, tracks(5), None, Some(album())).await);

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.device, "/dev/sr1");
        assert!(snapshot.tracks.is_empty());
        assert!(snapshot.album.is_none());
    }

    #[tokio::test]
    async fn test_stale_read_discarded_after_eject() {
        let store = DiscStore::new(Some("/dev/sr0".to_string()));
        let ticket = store.begin_read().await.unwrap();
        store.clear().await;
        assert!(!store.install(&ticket, tracks(5), None, None).await);
        assert_eq!(store.current_device().await.as_deref(), Some("/dev/sr0"));
    }

    #[tokio::test]
    async fn test_track_validation() {
        let store = DiscStore::new(Some("/dev/sr0".to_string()));
        let ticket = store.begin_read().await.unwrap();
        store.install(&ticket, tracks(4), None, None).await;

        assert_eq!(store.track(4).await.unwrap().number, 4);
        assert!(matches!(store.track(0).await, Err(Error::InvalidTrackNumber { .. })));
        assert!(matches!(store.track(5).await, Err(Error::InvalidTrackNumber { track_count: 4, .. })));
    }

    #[tokio::test]
    async fn test_set_album_bounded_titles() {
        let store = DiscStore::new(Some("/dev/sr0".to_string()));
        let ticket = store.begin_read().await.unwrap();
        store.install(&ticket, tracks(2), None, None).await;

        let manual = AlbumInfo::new("X", "Y", None, MetadataSource::Manual);
        let snapshot = store
            .set_album(
                &ticket,
                manual,
                vec![(0, "One".to_string()), (1, "Two".to_string()), (2, "Three".to_string())],
            )
            .await
            .unwrap();
        assert_eq!(snapshot.tracks.len(), 2);
        assert_eq!(snapshot.tracks[1].title, "Two");
        assert_eq!(snapshot.album.unwrap().source, MetadataSource::Manual);
    }

    #[tokio::test]
    async fn test_set_album_after_device_switch_is_refused() {
        let store = DiscStore::new(Some("/dev/sr0".to_string()));
        let ticket = store.begin_read().await.unwrap();
        store.install(&ticket, tracks(2), None, None).await;

        store.select_device("/dev/sr1").await;
        let manual = AlbumInfo::new("X", "Y", None, MetadataSource::Manual);
        let result = store.set_album(&ticket, manual, vec![(0, "One".to_string())]).await;

        assert!(matches!(result, Err(Error::DiscChanged)));
        let snapshot = store.snapshot().await;
        assert!(snapshot.album.is_none());
        assert_eq!(snapshot.device, "/dev/sr1");
    }

    #[tokio::test]
    async fn test_profile_update_keeps_previous_on_reject() {
        let store = ProfileStore::default();
        let update = json!({"bitrate": "200k", "preload_seconds": 3});
        let (profile, rejected) = store.update(update.as_object().unwrap()).await;

        assert_eq!(profile.bitrate, Bitrate::K192);
        assert_eq!(profile.preload_seconds, 3);
        assert_eq!(rejected.len(), 1);
        assert_eq!(store.get().await, profile);
    }
}
