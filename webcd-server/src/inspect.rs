//! Disc inspection: read, fingerprint, resolve, install

use crate::disc::{DiscReader, Fingerprinter, TocSource};
use crate::metadata::{MetadataResolver, ResolvedBy};
use crate::state::DiscStore;
use serde::Serialize;
use tracing::info;
use webcd_common::{AlbumInfo, Error, Result, Track};

/// Outcome of one metadata read
#[derive(Debug, Clone, Serialize)]
pub struct DiscReport {
    pub device: String,
    pub tracks: Vec<Track>,
    pub album: Option<AlbumInfo>,
    pub fingerprint: String,
    /// Whether the fingerprint came from the disc-id tool
    pub fingerprint_trusted: bool,
    pub toc_source: TocSource,
    pub resolved_by: Option<ResolvedBy>,
    /// False when the device changed or the disc was ejected mid-read
    pub installed: bool,
}

/// Runs the full read chain for the selected device
#[derive(Clone)]
pub struct DiscInspector {
    reader: DiscReader,
    fingerprinter: Fingerprinter,
    resolver: MetadataResolver,
}

impl DiscInspector {
    pub fn new(reader: DiscReader, fingerprinter: Fingerprinter, resolver: MetadataResolver) -> Self {
        Self {
            reader,
            fingerprinter,
            resolver,
        }
    }

    /// Read the disc in the selected drive and replace the snapshot
    ///
    /// With no disc the snapshot is emptied and `NoMediaDetected` returned.
    pub async fn inspect(&self, store: &DiscStore) -> Result<DiscReport> {
        let ticket = store.begin_read().await?;
        let device = ticket.device.clone();

        let toc = match self.reader.read_table_of_contents(&device).await {
            Ok(toc) => toc,
            Err(Error::NoMediaDetected) => {
                store.install(&ticket, Vec::new(), None, None).await;
                return Err(Error::NoMediaDetected);
            }
            Err(e) => return Err(e),
        };

        let fingerprint = self.fingerprinter.fingerprint(&device, &toc.tracks).await;
        let resolution = self.resolver.resolve(&fingerprint, &toc.tracks).await;

        let (tracks, album, resolved_by) = match resolution {
            Some(resolution) => (resolution.tracks, Some(resolution.album), Some(resolution.resolved_by)),
            None => (toc.tracks, None, None),
        };

        let installed = store
            .install(
                &ticket,
                tracks.clone(),
                Some(fingerprint.id().to_string()),
                album.clone(),
            )
            .await;

        info!(
            device = %device,
            tracks = tracks.len(),
            resolved_by = ?resolved_by,
            installed,
            "Disc inspected"
        );

        Ok(DiscReport {
            device,
            tracks,
            album,
            fingerprint: fingerprint.id().to_string(),
            fingerprint_trusted: fingerprint.is_trusted(),
            toc_source: toc.source,
            resolved_by,
            installed,
        })
    }
}
