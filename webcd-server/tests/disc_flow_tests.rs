//! End-to-end disc flows through the router, with shell scripts as the disc tools
#![cfg(unix)]

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{
    fake_gnudb, gnudb_config, missing_tool, musicbrainz_fixture, offline_config, write_script,
    GnudbScript, MbFixtures, THREE_TRACK_TOC,
};
use serde_json::{json, Value};
use tempfile::{NamedTempFile, TempDir};
use tower::util::ServiceExt; // for `oneshot` method
use webcd_common::config::TomlConfig;
use webcd_common::Track;
use webcd_server::{build_router, AppState};

const DISCID_LINE: &str = "a1b2c3d4 3 150 13650 32400 612";

/// Scripted drive: TOC on stderr, disc-id record on stdout, eject that succeeds
fn drive_config(dir: &TempDir) -> TomlConfig {
    let mut config = offline_config(dir.path());
    config.tools.cdparanoia = write_script(
        dir.path(),
        "cdparanoia",
        &format!("cat >&2 <<'TOC'\n{}TOC", THREE_TRACK_TOC),
    );
    config.tools.cd_discid = write_script(dir.path(), "cd-discid", &format!("echo '{}'", DISCID_LINE));
    config.tools.eject = write_script(dir.path(), "eject", "exit 0");
    config
}

fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

fn device_path(file: &NamedTempFile) -> String {
    file.path().to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_cd_info_resolves_through_gnudb() {
    let dir = TempDir::new().unwrap();
    let device = NamedTempFile::new().unwrap();
    let (port, server) = fake_gnudb(GnudbScript::new(
        "200 rock a1b2c3d4 Artist X / Album Y\r\n",
        "210 rock a1b2c3d4\r\nDTITLE=Artist X / Album Y\r\nDYEAR=1999\r\nTTITLE0=Intro\r\nTTITLE1=Main\r\nTTITLE2=Outro\r\n.\r\n",
    ))
    .await;

    let mut config = drive_config(&dir);
    config.gnudb = gnudb_config(port);
    let state = AppState::from_config(&config, Some(device_path(&device))).unwrap();

    let response = build_router(state.clone())
        .oneshot(test_request("GET", "/api/cd-info"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["fingerprint"], "a1b2c3d4");
    assert_eq!(body["fingerprint_trusted"], true);
    assert_eq!(body["toc_source"], "paranoia");
    assert_eq!(body["resolved_by"], "gnudb");
    assert_eq!(body["installed"], true);
    assert_eq!(
        body["album"],
        json!({
            "artist": "Artist X",
            "album": "Album Y",
            "year": "1999",
            "source": "GNUDB",
            "disc_id": "a1b2c3d4"
        })
    );
    assert_eq!(
        body["tracks"],
        json!([
            {"number": 1, "title": "Intro", "duration": "03:00"},
            {"number": 2, "title": "Main", "duration": "04:15"},
            {"number": 3, "title": "Outro", "duration": "02:50"}
        ])
    );

    let snapshot = state.disc.snapshot().await;
    assert_eq!(snapshot.track_count(), 3);
    assert_eq!(snapshot.fingerprint.as_deref(), Some("a1b2c3d4"));
    assert!(snapshot.resolved_at.is_some());

    let received = server.await.unwrap();
    assert_eq!(received[1], "cddb query a1b2c3d4 3 150 13650 32400 612");
}

#[tokio::test]
async fn test_cd_info_without_any_match_keeps_default_titles() {
    let dir = TempDir::new().unwrap();
    let device = NamedTempFile::new().unwrap();
    let mut config = drive_config(&dir);
    config.tools.cd_discid = missing_tool(dir.path(), "cd-discid");
    let state = AppState::from_config(&config, Some(device_path(&device))).unwrap();

    let response = build_router(state.clone())
        .oneshot(test_request("GET", "/api/cd-info"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["fingerprint_trusted"], false);
    assert_eq!(body["fingerprint"].as_str().map(str::len), Some(8));
    assert_eq!(body["album"], Value::Null);
    assert_eq!(body["resolved_by"], Value::Null);
    assert_eq!(body["tracks"][1]["title"], "Track 2");
    assert!(state.disc.snapshot().await.resolved_at.is_none());
}

#[tokio::test]
async fn test_set_album_retitles_current_disc() {
    let dir = TempDir::new().unwrap();
    let device = NamedTempFile::new().unwrap();
    let mb = musicbrainz_fixture(MbFixtures {
        release: Some(json!({
            "id": "rel-1",
            "title": "Picked By Hand",
            "date": "2010-02-03",
            "artist-credit": [{"name": "Someone", "artist": {"id": "s", "name": "Someone"}}],
            "media": [{"position": 1, "tracks": [
                {"position": 1, "title": "One"},
                {"position": 2, "title": "Two"},
                {"position": 3, "title": "Three"},
                {"position": 4, "title": "Bonus"}
            ]}]
        })),
        ..Default::default()
    })
    .await;

    let mut config = drive_config(&dir);
    config.musicbrainz = mb.config();
    let state = AppState::from_config(&config, Some(device_path(&device))).unwrap();

    let ticket = state.disc.begin_read().await.unwrap();
    let tracks = vec![Track::new(1, "03:00"), Track::new(2, "04:15"), Track::new(3, "02:50")];
    state.disc.install(&ticket, tracks, Some("0badc0de".to_string()), None).await;

    let response = build_router(state.clone())
        .oneshot(json_request("POST", "/api/set-album", json!({"release_id": "rel-1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["album"]["source"], "MANUAL");
    assert_eq!(body["album"]["year"], "2010");
    assert_eq!(body["tracks"].as_array().map(Vec::len), Some(3));
    assert_eq!(body["tracks"][2]["title"], "Three");

    let snapshot = state.disc.snapshot().await;
    assert_eq!(snapshot.album.map(|a| a.album), Some("Picked By Hand".to_string()));
}

#[tokio::test]
async fn test_debug_cd_reports_raw_tool_output() {
    let dir = TempDir::new().unwrap();
    let state = AppState::from_config(&drive_config(&dir), Some("/dev/fake-cd".to_string())).unwrap();

    let response = build_router(state)
        .oneshot(test_request("GET", "/api/debug-cd"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["cd-discid"]["returncode"], 0);
    assert_eq!(body["cd-discid"]["stdout"].as_str().map(str::trim), Some(DISCID_LINE));
    assert_eq!(
        body["parsed"],
        json!({
            "disc_id": "a1b2c3d4",
            "track_count": 3,
            "offsets": [150, 13650, 32400],
            "disc_length_seconds": 612
        })
    );
    assert!(body["cdparanoia"]["stderr"]
        .as_str()
        .unwrap()
        .contains("Table of contents"));
}

#[tokio::test]
async fn test_eject_clears_disc() {
    let dir = TempDir::new().unwrap();
    let device = NamedTempFile::new().unwrap();
    let state = AppState::from_config(&drive_config(&dir), Some(device_path(&device))).unwrap();

    let response = build_router(state.clone())
        .oneshot(test_request("GET", "/api/cd-info"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.disc.track_count().await, 3);

    let response = build_router(state.clone())
        .oneshot(test_request("POST", "/api/eject"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body, json!({"success": true, "message": "CD ejected successfully"}));

    let snapshot = state.disc.snapshot().await;
    assert!(snapshot.tracks.is_empty());
    assert!(snapshot.album.is_none());
    assert_eq!(state.disc.current_device().await, Some(device_path(&device)));
}

#[tokio::test]
async fn test_eject_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let mut config = drive_config(&dir);
    config.tools.eject = write_script(dir.path(), "eject", "echo 'tray locked' >&2\nexit 1");
    let state = AppState::from_config(&config, Some("/dev/fake-cd".to_string())).unwrap();

    let response = build_router(state)
        .oneshot(test_request("POST", "/api/eject"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "EJECT_FAILED");
    assert_eq!(body["error"]["message"], "Failed to eject CD: tray locked");
}

#[tokio::test]
async fn test_paranoid_stream_without_extractor_uses_fallback() {
    let dir = TempDir::new().unwrap();
    let mut config = drive_config(&dir);
    config.tools.cdparanoia = missing_tool(dir.path(), "cdparanoia");
    config.tools.ffmpeg = write_script(
        dir.path(),
        "ffmpeg",
        "dd if=/dev/zero bs=1024 count=40 2>/dev/null",
    );
    let state = AppState::from_config(&config, Some("/dev/fake-cd".to_string())).unwrap();

    let ticket = state.disc.begin_read().await.unwrap();
    let tracks = vec![Track::new(1, "03:00"), Track::new(2, "04:15"), Track::new(3, "02:50")];
    state.disc.install(&ticket, tracks, None, None).await;

    let response = build_router(state.clone())
        .oneshot(json_request("POST", "/api/settings", json!({"robustness_mode": "paranoid"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = build_router(state.clone())
        .oneshot(test_request("GET", "/api/stream/2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "none");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(bytes.len(), 40 * 1024);
    assert_eq!(state.sessions.active_count(), 0);
}
