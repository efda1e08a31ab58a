//! Table-of-contents reader
//!
//! Primary path: `cdparanoia -Q` prints one line per track with its sector count
//! and `[mm:ss.ff]` length. Fallback path: an `ffmpeg` libcdio probe, which only
//! reveals the number of tracks, so durations are synthesized as `00:00`.

use crate::tools::{args, run_tool, ToolError};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use webcd_common::config::ToolsConfig;
use webcd_common::{Error, Result, Track};

/// Which tool produced a track list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TocSource {
    Paranoia,
    Ffmpeg,
}

/// Track layout read from the disc
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOfContents {
    pub tracks: Vec<Track>,
    /// Per-track sector counts when the primary reader supplied them
    pub sectors: Vec<u64>,
    pub source: TocSource,
}

fn toc_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s+(\d+)\.\s+(\d+)\s+\[(\d+):(\d+)\.(\d+)\]").expect("valid TOC pattern")
    })
}

fn track_count_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)(\d+)\s+tracks?").expect("valid track count pattern"))
}

/// Parse `cdparanoia -Q` output
///
/// Lines look like `  1.    33027 [07:20.27]        0 [00:00.00]    no   no  2`.
/// Everything else (banner, header, TOTAL line) is ignored.
pub fn parse_paranoia_toc(output: &str) -> TableOfContents {
    let mut tracks = Vec::new();
    let mut sectors = Vec::new();

    for line in output.lines() {
        let Some(caps) = toc_line_pattern().captures(line) else {
            continue;
        };
        let (Ok(number), Ok(sector_count), Ok(minutes), Ok(seconds)) = (
            caps[1].parse::<u32>(),
            caps[2].parse::<u64>(),
            caps[3].parse::<u32>(),
            caps[4].parse::<u32>(),
        ) else {
            continue;
        };

        tracks.push(Track::new(number, format!("{:02}:{:02}", minutes, seconds)));
        sectors.push(sector_count);
    }

    TableOfContents {
        tracks,
        sectors,
        source: TocSource::Paranoia,
    }
}

/// Parse the ffmpeg libcdio probe's stderr
///
/// A `N tracks` mention yields N placeholder tracks. A recognized input without a
/// count yields a single placeholder track. Otherwise there is no disc.
pub fn parse_ffmpeg_probe(stderr: &str) -> Option<TableOfContents> {
    let count = stderr
        .lines()
        .find_map(|line| track_count_pattern().captures(line))
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .unwrap_or(0);

    let tracks: Vec<Track> = if count > 0 {
        (1..=count).map(Track::placeholder).collect()
    } else if stderr.contains("Input #0") {
        vec![Track::placeholder(1)]
    } else {
        return None;
    };

    Some(TableOfContents {
        tracks,
        sectors: Vec::new(),
        source: TocSource::Ffmpeg,
    })
}

/// Reads the TOC through the primary tool, then the fallback tool
#[derive(Debug, Clone)]
pub struct DiscReader {
    cdparanoia: String,
    ffmpeg: String,
    probe_timeout: Duration,
    fallback_timeout: Duration,
}

impl DiscReader {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            cdparanoia: tools.cdparanoia.clone(),
            ffmpeg: tools.ffmpeg.clone(),
            probe_timeout: Duration::from_secs(tools.probe_timeout_secs),
            fallback_timeout: Duration::from_secs(tools.fallback_probe_timeout_secs),
        }
    }

    /// Read the disc's track list
    ///
    /// Does not touch shared state; the caller installs the result.
    pub async fn read_table_of_contents(&self, device: &str) -> Result<TableOfContents> {
        match self.read_with_paranoia(device).await {
            Ok(toc) => {
                info!(device = %device, tracks = toc.tracks.len(), "Read TOC with cdparanoia");
                return Ok(toc);
            }
            Err(e) => warn!(device = %device, "Primary TOC read failed, trying ffmpeg: {}", e),
        }

        match self.read_with_ffmpeg(device).await {
            Ok(toc) => {
                info!(device = %device, tracks = toc.tracks.len(), "Read track count with ffmpeg");
                Ok(toc)
            }
            Err(e) => {
                warn!(device = %device, "Fallback TOC read failed: {}", e);
                Err(Error::NoMediaDetected)
            }
        }
    }

    async fn read_with_paranoia(&self, device: &str) -> Result<TableOfContents> {
        let output = run_tool(
            &self.cdparanoia,
            &args(["-Q", "-d", device]),
            self.probe_timeout,
        )
        .await
        .map_err(reader_failure)?;

        // cdparanoia reports the TOC on stderr
        let toc = parse_paranoia_toc(&output.stderr);
        if toc.tracks.is_empty() {
            debug!(stderr = %output.stderr, "No track lines in cdparanoia output");
            return Err(Error::ReaderToolFailure(
                "cdparanoia output contained no tracks".to_string(),
            ));
        }
        Ok(toc)
    }

    async fn read_with_ffmpeg(&self, device: &str) -> Result<TableOfContents> {
        let stderr = match run_tool(
            &self.ffmpeg,
            &args(["-f", "libcdio", "-i", device, "-t", "0.1", "-f", "null", "-"]),
            self.fallback_timeout,
        )
        .await
        {
            Ok(output) => output.stderr,
            // The track count is printed before ffmpeg starts reading audio
            Err(ToolError::TimedOut { stderr, .. }) => {
                debug!(device = %device, "ffmpeg timed out, parsing what it printed");
                stderr
            }
            Err(e) => return Err(reader_failure(e)),
        };

        parse_ffmpeg_probe(&stderr).ok_or(Error::NoMediaDetected)
    }
}

fn reader_failure(err: ToolError) -> Error {
    Error::ReaderToolFailure(err.to_string())
}
