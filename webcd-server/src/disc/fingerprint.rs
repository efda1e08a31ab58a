//! Disc fingerprinting
//!
//! The trusted identifier comes from `cd-discid`, whose output line
//! `"<id> <count> <offset1> .. <offsetN> <total_seconds>"` also carries everything
//! the CDDB query needs. When the tool is unavailable a local digest over the track
//! list is used instead. That digest lives in a different identifier space and is
//! never sent to a network lookup.

use crate::tools::{args, run_tool};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, warn};
use webcd_common::config::ToolsConfig;
use webcd_common::Track;

/// Parsed `cd-discid` output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscIdRecord {
    pub disc_id: String,
    pub track_count: u32,
    /// Frame offset of each track
    pub offsets: Vec<u64>,
    /// Total disc length in seconds
    pub total_seconds: u64,
}

impl DiscIdRecord {
    /// Parse one `cd-discid` line; `None` if it is not well formed
    pub fn parse(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            return None;
        }

        let disc_id = parts[0].to_string();
        let track_count = parts[1].parse::<u32>().ok()?;
        let numbers = parts[2..]
            .iter()
            .map(|p| p.parse::<u64>().ok())
            .collect::<Option<Vec<u64>>>()?;
        let (total_seconds, offsets) = numbers.split_last()?;

        Some(Self {
            disc_id,
            track_count,
            offsets: offsets.to_vec(),
            total_seconds: *total_seconds,
        })
    }

    /// Space-separated argument tail of a `cddb query` command
    pub fn query_args(&self) -> String {
        let mut parts = vec![self.disc_id.clone(), self.track_count.to_string()];
        parts.extend(self.offsets.iter().map(|o| o.to_string()));
        parts.push(self.total_seconds.to_string());
        parts.join(" ")
    }
}

/// Disc identifier tagged with its provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    /// From the external disc-id tool; usable for network lookups
    Trusted(DiscIdRecord),
    /// Local digest; only for local disambiguation
    LocalDigest(String),
}

impl Fingerprint {
    pub fn id(&self) -> &str {
        match self {
            Fingerprint::Trusted(record) => &record.disc_id,
            Fingerprint::LocalDigest(digest) => digest,
        }
    }

    pub fn is_trusted(&self) -> bool {
        matches!(self, Fingerprint::Trusted(_))
    }

    /// The disc-id record, only for trusted fingerprints
    pub fn record(&self) -> Option<&DiscIdRecord> {
        match self {
            Fingerprint::Trusted(record) => Some(record),
            Fingerprint::LocalDigest(_) => None,
        }
    }
}

/// Deterministic 8-hex-character digest over track count and durations
pub fn local_digest(tracks: &[Track]) -> String {
    let mut input = tracks.len().to_string();
    for track in tracks {
        input.push_str(&track.duration);
    }

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..8].to_string()
}

/// Computes fingerprints via the disc-id tool with a local fallback
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    cd_discid: String,
    timeout: Duration,
}

impl Fingerprinter {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            cd_discid: tools.cd_discid.clone(),
            timeout: Duration::from_secs(tools.discid_timeout_secs),
        }
    }

    /// Run the disc-id tool and parse its record
    pub async fn disc_id_record(&self, device: &str) -> Option<DiscIdRecord> {
        let output = match run_tool(&self.cd_discid, &args([device]), self.timeout).await {
            Ok(output) => output,
            Err(e) => {
                warn!(device = %device, "Disc-id tool unavailable: {}", e);
                return None;
            }
        };

        if !output.success() {
            warn!(
                device = %device,
                code = ?output.exit_code(),
                stderr = %output.stderr.trim(),
                "Disc-id tool failed"
            );
            return None;
        }

        let record = DiscIdRecord::parse(output.stdout.trim());
        if record.is_none() {
            warn!(output = %output.stdout.trim(), "Unparsable disc-id output");
        }
        record
    }

    /// Fingerprint the disc, preferring the trusted tool
    pub async fn fingerprint(&self, device: &str, tracks: &[Track]) -> Fingerprint {
        if let Some(record) = self.disc_id_record(device).await {
            debug!(disc_id = %record.disc_id, "Trusted fingerprint");
            return Fingerprint::Trusted(record);
        }

        let digest = local_digest(tracks);
        debug!(digest = %digest, "Using local fallback fingerprint");
        Fingerprint::LocalDigest(digest)
    }
}
