//! GNUDB (CDDB protocol) client
//!
//! One lookup is one short TCP session:
//!
//! ```text
//! Connected -> HelloSent -> QuerySent -> {ExactMatch | MultipleMatches | NoMatch}
//!           -> (ReadSent -> DiscDataReceived)? -> Closed
//! ```
//!
//! Responses are status-coded lines; multi-line bodies end with a line holding a
//! single `.`. Every failure (socket error, timeout, unexpected status, malformed
//! body) ends the lookup as "no match". Only the first candidate is ever read.

use crate::disc::DiscIdRecord;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use webcd_common::config::GnudbConfig;
use webcd_common::disc::UNKNOWN_ARTIST;
use webcd_common::{AlbumInfo, MetadataSource, Track};

/// Session phase, used to report where a lookup stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Greeting,
    HelloSent,
    QuerySent,
    ReadSent,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Connect => "connect",
            Phase::Greeting => "greeting",
            Phase::HelloSent => "hello",
            Phase::QuerySent => "query",
            Phase::ReadSent => "read",
        };
        f.write_str(name)
    }
}

/// Reasons a lookup ended without disc data
#[derive(Debug, Error)]
pub enum GnudbError {
    #[error("timed out during {0}")]
    Timeout(Phase),

    #[error("socket error during {phase}: {source}")]
    Io {
        phase: Phase,
        #[source]
        source: std::io::Error,
    },

    #[error("connection closed during {0}")]
    Closed(Phase),

    #[error("server refused {phase} with status {code}")]
    Refused { phase: Phase, code: u16 },

    #[error("malformed response during {phase}: {line}")]
    Malformed { phase: Phase, line: String },

    #[error("no match")]
    NoMatch,

    #[error("disc data incomplete")]
    Incomplete,
}

/// A `genre discid title` candidate from a query response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub genre: String,
    pub disc_id: String,
    pub title: String,
}

impl Candidate {
    /// Parse `"<genre> <discid> <title>"`
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().splitn(3, ' ');
        let genre = parts.next().filter(|s| !s.is_empty())?;
        let disc_id = parts.next().filter(|s| !s.is_empty())?;
        let title = parts.next().unwrap_or("").trim();
        Some(Self {
            genre: genre.to_string(),
            disc_id: disc_id.to_string(),
            title: title.to_string(),
        })
    }
}

/// Meaning of a `cddb query` status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// 200: single exact match on the status line
    ExactMatch,
    /// 210: exact matches listed on following lines
    ExactMatches,
    /// 211: inexact matches listed on following lines
    InexactMatches,
    /// 202 and every other code
    NoMatch(u16),
}

impl QueryStatus {
    pub fn from_code(code: u16) -> Self {
        match code {
            200 => QueryStatus::ExactMatch,
            210 => QueryStatus::ExactMatches,
            211 => QueryStatus::InexactMatches,
            other => QueryStatus::NoMatch(other),
        }
    }

    pub fn has_list(self) -> bool {
        matches!(self, QueryStatus::ExactMatches | QueryStatus::InexactMatches)
    }
}

/// Parsed `cddb query` response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResponse {
    Exact(Candidate),
    Multiple(Vec<Candidate>),
    NoMatch(u16),
}

impl QueryResponse {
    /// Build from the status line and, for list statuses, the body lines
    pub fn parse(status_line: &str, body: &[String]) -> Option<Self> {
        let (code, rest) = parse_status(status_line)?;
        match QueryStatus::from_code(code) {
            QueryStatus::ExactMatch => Candidate::parse(rest).map(QueryResponse::Exact),
            QueryStatus::ExactMatches | QueryStatus::InexactMatches => Some(QueryResponse::Multiple(
                body.iter().filter_map(|line| Candidate::parse(line)).collect(),
            )),
            QueryStatus::NoMatch(code) => Some(QueryResponse::NoMatch(code)),
        }
    }

    /// The candidate that will be read: exact, or first listed
    pub fn first_candidate(&self) -> Option<&Candidate> {
        match self {
            QueryResponse::Exact(candidate) => Some(candidate),
            QueryResponse::Multiple(candidates) => candidates.first(),
            QueryResponse::NoMatch(_) => None,
        }
    }
}

/// Split a status line into its three-digit code and the remaining text
pub fn parse_status(line: &str) -> Option<(u16, &str)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let code_text = line.get(..3)?;
    if !code_text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let rest = line.get(3..).unwrap_or("");
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some((code_text.parse().ok()?, rest.trim_start()))
}

/// Whether a line terminates a multi-line body (`.` bare or CRLF-terminated)
pub fn is_terminator(line: &str) -> bool {
    line.trim_end_matches(['\r', '\n']) == "."
}

/// Whether a line ends a query candidate list; any leading `.` counts
pub fn ends_candidate_list(line: &str) -> bool {
    line.starts_with('.')
}

/// Album data from a `cddb read` body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscData {
    pub artist: String,
    pub album: String,
    pub year: Option<String>,
    /// Zero-indexed track titles
    pub track_titles: BTreeMap<usize, String>,
}

impl DiscData {
    /// Parse a disc-data body
    ///
    /// Repeated `DTITLE`/`TTITLEn` keys are concatenated, as long values are split
    /// across lines. Succeeds only with a non-empty album title and at least one
    /// track title.
    pub fn parse(block: &str) -> Option<Self> {
        let mut dtitle: Option<String> = None;
        let mut year: Option<String> = None;
        let mut titles: BTreeMap<usize, String> = BTreeMap::new();

        for raw in block.lines() {
            let line = raw.trim_end_matches('\r');
            if let Some(value) = line.strip_prefix("DTITLE=") {
                dtitle.get_or_insert_with(String::new).push_str(value);
            } else if let Some(value) = line.strip_prefix("DYEAR=") {
                let value = value.trim();
                if !value.is_empty() {
                    year = Some(value.to_string());
                }
            } else if let Some(rest) = line.strip_prefix("TTITLE") {
                let Some((index, value)) = rest.split_once('=') else {
                    continue;
                };
                let Ok(index) = index.parse::<usize>() else {
                    continue;
                };
                titles.entry(index).or_default().push_str(value);
            }
        }

        let dtitle = dtitle?;
        let dtitle = dtitle.trim();
        let (artist, album) = match dtitle.split_once(" / ") {
            Some((artist, album)) => (artist.trim().to_string(), album.trim().to_string()),
            None => (UNKNOWN_ARTIST.to_string(), dtitle.to_string()),
        };

        if album.is_empty() || titles.is_empty() {
            return None;
        }

        Some(Self {
            artist,
            album,
            year,
            track_titles: titles
                .into_iter()
                .map(|(index, title)| (index, title.trim().to_string()))
                .collect(),
        })
    }

    /// Write titles onto the local track list; out-of-range indices are dropped
    pub fn apply_titles(&self, tracks: &mut [Track]) -> usize {
        webcd_common::disc::apply_titles(
            tracks,
            self.track_titles.iter().map(|(i, t)| (*i, t.clone())),
        )
    }

    pub fn album_info(&self, disc_id: &str) -> AlbumInfo {
        AlbumInfo::new(
            self.artist.clone(),
            self.album.clone(),
            self.year.clone(),
            MetadataSource::Gnudb,
        )
        .with_disc_id(disc_id)
    }
}

/// Anything that can resolve a trusted disc-id record to disc data
#[async_trait]
pub trait CddbLookup: Send + Sync {
    /// `None` means no usable match, for whatever reason
    async fn lookup(&self, record: &DiscIdRecord) -> Option<DiscData>;
}

/// Line-based TCP client for a GNUDB server
#[derive(Debug, Clone)]
pub struct GnudbClient {
    host: String,
    port: u16,
    timeout: Duration,
    hello: String,
}

impl GnudbClient {
    pub fn new(config: &GnudbConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            timeout: config.timeout(),
            hello: format!(
                "cddb hello {} {} {} {}",
                config.client_user, config.client_host, config.client_name, config.client_version
            ),
        }
    }

    /// Run one full session
    pub async fn query(&self, record: &DiscIdRecord) -> Result<DiscData, GnudbError> {
        let stream = tokio::time::timeout(
            self.timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| GnudbError::Timeout(Phase::Connect))?
        .map_err(|e| GnudbError::Io {
            phase: Phase::Connect,
            source: e,
        })?;

        let (read_half, write_half) = stream.into_split();
        let mut session = Session {
            reader: BufReader::new(read_half),
            writer: write_half,
            timeout: self.timeout,
        };

        let result = session.run(&self.hello, record).await;
        session.quit().await;
        result
    }
}

#[async_trait]
impl CddbLookup for GnudbClient {
    async fn lookup(&self, record: &DiscIdRecord) -> Option<DiscData> {
        info!(disc_id = %record.disc_id, host = %self.host, "Querying GNUDB");
        match self.query(record).await {
            Ok(data) => {
                info!(artist = %data.artist, album = %data.album, "GNUDB match");
                Some(data)
            }
            Err(e) => {
                warn!(disc_id = %record.disc_id, "GNUDB lookup found nothing: {}", e);
                None
            }
        }
    }
}

struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
}

impl Session {
    async fn run(&mut self, hello: &str, record: &DiscIdRecord) -> Result<DiscData, GnudbError> {
        // Banner status varies between servers and is not checked
        let greeting = self.read_line(Phase::Greeting).await?;
        debug!(greeting = %greeting.trim_end(), "GNUDB greeting");

        self.send(Phase::HelloSent, hello).await?;
        let hello_response = self.read_line(Phase::HelloSent).await?;
        debug!(response = %hello_response.trim_end(), "GNUDB hello response");

        let query = format!("cddb query {}", record.query_args());
        debug!(query = %query, "GNUDB query");
        self.send(Phase::QuerySent, &query).await?;

        let status_line = self.read_line(Phase::QuerySent).await?;
        let (code, _) = parse_status(&status_line).ok_or_else(|| GnudbError::Malformed {
            phase: Phase::QuerySent,
            line: status_line.trim_end().to_string(),
        })?;
        let body = if QueryStatus::from_code(code).has_list() {
            self.read_candidate_list().await?
        } else {
            Vec::new()
        };

        let response = QueryResponse::parse(&status_line, &body).ok_or_else(|| GnudbError::Malformed {
            phase: Phase::QuerySent,
            line: status_line.trim_end().to_string(),
        })?;
        let candidate = response.first_candidate().ok_or(GnudbError::NoMatch)?.clone();
        debug!(genre = %candidate.genre, disc_id = %candidate.disc_id, title = %candidate.title, "GNUDB candidate");

        self.send(
            Phase::ReadSent,
            &format!("cddb read {} {}", candidate.genre, candidate.disc_id),
        )
        .await?;

        let first = self.read_line(Phase::ReadSent).await?;
        if let Some((code, _)) = parse_status(&first) {
            if code >= 400 {
                return Err(GnudbError::Refused {
                    phase: Phase::ReadSent,
                    code,
                });
            }
        }

        let mut block = first;
        if !is_terminator(&block) {
            for line in self.read_body_lenient(Phase::ReadSent).await? {
                block.push_str(&line);
                block.push('\n');
            }
        }

        DiscData::parse(&block).ok_or(GnudbError::Incomplete)
    }

    async fn send(&mut self, phase: Phase, line: &str) -> Result<(), GnudbError> {
        let payload = format!("{}\r\n", line);
        tokio::time::timeout(self.timeout, self.writer.write_all(payload.as_bytes()))
            .await
            .map_err(|_| GnudbError::Timeout(phase))?
            .map_err(|e| GnudbError::Io { phase, source: e })
    }

    /// One line; `Ok(None)` at end of stream
    async fn next_line(&mut self, phase: Phase) -> Result<Option<String>, GnudbError> {
        let mut buf = Vec::new();
        let n = tokio::time::timeout(self.timeout, self.reader.read_until(b'\n', &mut buf))
            .await
            .map_err(|_| GnudbError::Timeout(phase))?
            .map_err(|e| GnudbError::Io { phase, source: e })?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    async fn read_line(&mut self, phase: Phase) -> Result<String, GnudbError> {
        self.next_line(phase).await?.ok_or(GnudbError::Closed(phase))
    }

    /// Candidate lines up to the first line starting with `.`, which must arrive
    async fn read_candidate_list(&mut self) -> Result<Vec<String>, GnudbError> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line(Phase::QuerySent).await?;
            if ends_candidate_list(&line) {
                return Ok(lines);
            }
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
    }

    /// Lines up to the `.` terminator or end of stream
    async fn read_body_lenient(&mut self, phase: Phase) -> Result<Vec<String>, GnudbError> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line(phase).await? {
            if is_terminator(&line) {
                break;
            }
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        Ok(lines)
    }

    async fn quit(&mut self) {
        let _ = tokio::time::timeout(Duration::from_millis(500), self.writer.write_all(b"quit\r\n")).await;
    }
}
