//! Shared fakes for integration tests: tool scripts, a GNUDB server and a
//! MusicBrainz fixture server
#![allow(dead_code)]

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use webcd_common::config::{GnudbConfig, MusicBrainzConfig, TomlConfig, ToolsConfig};

/// `cdparanoia -Q` output for a three-track disc (03:00, 04:15, 02:50)
pub const THREE_TRACK_TOC: &str = "\
cdparanoia III release 10.2 (September 11, 2008)

Table of contents (audio tracks only):
track        length               begin        copy pre ch
===========================================================
  1.    13500 [03:00.00]        0 [00:00.00]    no   no  2
  2.    19125 [04:15.00]    13500 [03:00.00]    no   no  2
  3.    12750 [02:50.00]    32625 [07:15.00]    no   no  2
TOTAL   45375 [10:05.00]    (audio only)
";

/// Write an executable `#!/bin/sh` script and return its path
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

/// A path that will never resolve to a binary
pub fn missing_tool(dir: &Path, name: &str) -> String {
    dir.join("missing").join(name).to_string_lossy().into_owned()
}

/// Tools config with every tool pointing at a missing binary
pub fn missing_tools(dir: &Path) -> ToolsConfig {
    ToolsConfig {
        cdparanoia: missing_tool(dir, "cdparanoia"),
        ffmpeg: missing_tool(dir, "ffmpeg"),
        cd_discid: missing_tool(dir, "cd-discid"),
        eject: missing_tool(dir, "eject"),
        blockdev: missing_tool(dir, "blockdev"),
        player: vec![missing_tool(dir, "player")],
        device_candidates: Vec::new(),
        sysfs_block: dir.join("no-sysfs"),
        probe_timeout_secs: 2,
        fallback_probe_timeout_secs: 2,
        discid_timeout_secs: 2,
        eject_timeout_secs: 2,
        media_check_timeout_secs: 1,
    }
}

/// Config whose network endpoints are unreachable and tools missing
pub fn offline_config(dir: &Path) -> TomlConfig {
    TomlConfig {
        tools: missing_tools(dir),
        gnudb: GnudbConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            timeout_secs: 1,
            ..Default::default()
        },
        musicbrainz: MusicBrainzConfig {
            base_url: "http://127.0.0.1:1/ws/2".to_string(),
            timeout_secs: 1,
            rate_limit_ms: 0,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn gnudb_config(port: u16) -> GnudbConfig {
    GnudbConfig {
        host: "127.0.0.1".to_string(),
        port,
        timeout_secs: 2,
        ..Default::default()
    }
}

/// Scripted replies for a one-connection GNUDB server
#[derive(Debug, Clone)]
pub struct GnudbScript {
    pub greeting: String,
    pub query_reply: String,
    pub read_reply: String,
    /// Drop the connection right after the read reply
    pub close_after_read: bool,
}

impl GnudbScript {
    pub fn new(query_reply: &str, read_reply: &str) -> Self {
        Self {
            greeting: "201 fake.gnudb.org CDDBP server v1.5.2PL0 ready at Sat Jan 01 00:00:00 2022\r\n".to_string(),
            query_reply: query_reply.to_string(),
            read_reply: read_reply.to_string(),
            close_after_read: false,
        }
    }
}

/// Serve one GNUDB session; the handle yields every command line received
pub async fn fake_gnudb(script: GnudbScript) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let mut received = Vec::new();

        let _ = write_half.write_all(script.greeting.as_bytes()).await;

        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim_end().to_string();
            received.push(line.clone());

            if line.starts_with("cddb hello") {
                let _ = write_half.write_all(b"200 Hello and welcome webcd@localhost running WebCD 1.0.\r\n").await;
            } else if line.starts_with("cddb query") {
                let _ = write_half.write_all(script.query_reply.as_bytes()).await;
            } else if line.starts_with("cddb read") {
                let _ = write_half.write_all(script.read_reply.as_bytes()).await;
                if script.close_after_read {
                    break;
                }
            } else if line == "quit" {
                let _ = write_half.write_all(b"230 fake.gnudb.org Closing connection.  Goodbye.\r\n").await;
                break;
            } else {
                let _ = write_half.write_all(b"500 Unrecognized command.\r\n").await;
            }
        }
        received
    });

    (port, handle)
}

/// Accept connections and never answer
pub async fn silent_server() -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    (port, handle)
}

/// JSON bodies served by the MusicBrainz fixture; `None` answers 404
#[derive(Debug, Clone, Default)]
pub struct MbFixtures {
    pub discid: Option<Value>,
    pub search: Option<Value>,
    pub release: Option<Value>,
}

#[derive(Clone)]
struct FixtureState {
    fixtures: MbFixtures,
    requests: Arc<Mutex<Vec<String>>>,
}

pub struct MbFixtureServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MbFixtureServer {
    /// Request URIs seen so far (path and query)
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn config(&self) -> MusicBrainzConfig {
        MusicBrainzConfig {
            base_url: self.base_url.clone(),
            timeout_secs: 2,
            rate_limit_ms: 0,
            ..Default::default()
        }
    }
}

fn fixture_reply(state: &FixtureState, uri: &Uri, body: &Option<Value>) -> Response {
    state.requests.lock().unwrap().push(uri.to_string());
    match body {
        Some(value) => Json(value.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "Not Found"}))).into_response(),
    }
}

async fn discid_handler(State(state): State<FixtureState>, uri: Uri) -> Response {
    fixture_reply(&state, &uri, &state.fixtures.discid)
}

async fn search_handler(State(state): State<FixtureState>, uri: Uri) -> Response {
    fixture_reply(&state, &uri, &state.fixtures.search)
}

async fn release_handler(State(state): State<FixtureState>, uri: Uri) -> Response {
    fixture_reply(&state, &uri, &state.fixtures.release)
}

/// Serve MusicBrainz-shaped JSON on an ephemeral port
pub async fn musicbrainz_fixture(fixtures: MbFixtures) -> MbFixtureServer {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = FixtureState {
        fixtures,
        requests: requests.clone(),
    };

    let app = Router::new()
        .route("/ws/2/discid/:id", get(discid_handler))
        .route("/ws/2/release", get(search_handler))
        .route("/ws/2/release/:id", get(release_handler))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MbFixtureServer {
        base_url: format!("http://{}/ws/2", addr),
        requests,
    }
}
