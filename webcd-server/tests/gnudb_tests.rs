//! GNUDB client sessions against a scripted line server

mod common;

use common::{fake_gnudb, gnudb_config, silent_server, GnudbScript};
use std::time::{Duration, Instant};
use webcd_server::disc::DiscIdRecord;
use webcd_server::metadata::gnudb::{GnudbError, Phase};
use webcd_server::metadata::{CddbLookup, GnudbClient};

const RECORD_LINE: &str = "a1b2c3d4 3 150 13650 32400 612";

const READ_BLOCK: &str = "210 rock a1b2c3d4 CD database entry follows (until terminating `.')\r\n\
# xmcd\r\n\
DISCID=a1b2c3d4\r\n\
DTITLE=Artist X / Album Y\r\n\
DYEAR=1999\r\n\
DGENRE=Rock\r\n\
TTITLE0=Intro\r\n\
TTITLE1=Main\r\n\
TTITLE2=Outro\r\n\
EXTD=\r\n\
.\r\n";

fn record() -> DiscIdRecord {
    DiscIdRecord::parse(RECORD_LINE).unwrap()
}

#[tokio::test]
async fn test_exact_match_session() {
    let script = GnudbScript::new("200 rock a1b2c3d4 Artist X / Album Y\r\n", READ_BLOCK);
    let (port, server) = fake_gnudb(script).await;

    let client = GnudbClient::new(&gnudb_config(port));
    let data = client.query(&record()).await.unwrap();

    assert_eq!(data.artist, "Artist X");
    assert_eq!(data.album, "Album Y");
    assert_eq!(data.year.as_deref(), Some("1999"));
    let titles: Vec<&str> = data.track_titles.values().map(|t| t.as_str()).collect();
    assert_eq!(titles, vec!["Intro", "Main", "Outro"]);

    let received = server.await.unwrap();
    assert_eq!(
        received,
        vec![
            "cddb hello webcd localhost WebCD 1.0".to_string(),
            "cddb query a1b2c3d4 3 150 13650 32400 612".to_string(),
            "cddb read rock a1b2c3d4".to_string(),
            "quit".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_inexact_list_reads_first_candidate() {
    let script = GnudbScript::new(
        "211 Found inexact matches, list follows (until terminating `.')\r\n\
misc a1b2c3d4 Artist X / Album Y\r\n\
rock a1b2c3d5 Someone Else / Other Album\r\n\
.\r\n",
        READ_BLOCK,
    );
    let (port, server) = fake_gnudb(script).await;

    let client = GnudbClient::new(&gnudb_config(port));
    let data = client.lookup(&record()).await.unwrap();
    assert_eq!(data.album, "Album Y");

    let received = server.await.unwrap();
    assert!(received.contains(&"cddb read misc a1b2c3d4".to_string()));
}

#[tokio::test]
async fn test_candidate_list_ends_at_any_dot_line() {
    let script = GnudbScript::new(
        "211 Found inexact matches, list follows (until terminating `.')\r\n\
misc a1b2c3d4 Artist X / Album Y\r\n\
. \r\n",
        READ_BLOCK,
    );
    let (port, server) = fake_gnudb(script).await;

    let client = GnudbClient::new(&gnudb_config(port));
    let data = client.lookup(&record()).await;

    assert_eq!(data.map(|d| d.album), Some("Album Y".to_string()));
    let received = server.await.unwrap();
    assert_eq!(received[2], "cddb read misc a1b2c3d4");
}

#[tokio::test]
async fn test_unusual_greeting_is_ignored() {
    let mut script = GnudbScript::new("200 rock a1b2c3d4 Artist X / Album Y\r\n", READ_BLOCK);
    script.greeting = "432 No connections allowed: permission denied\r\n".to_string();
    let (port, server) = fake_gnudb(script).await;

    let client = GnudbClient::new(&gnudb_config(port));
    let data = client.query(&record()).await.unwrap();
    assert_eq!(data.artist, "Artist X");

    let received = server.await.unwrap();
    assert_eq!(received[0], "cddb hello webcd localhost WebCD 1.0");
}

#[tokio::test]
async fn test_lf_only_line_endings() {
    let script = GnudbScript::new(
        "210 Found exact matches, list follows (until terminating `.')\n\
folk a1b2c3d4 Artist X / Album Y\n\
.\n",
        "210 folk a1b2c3d4\nDTITLE=Artist X / Album Y\nTTITLE0=Intro\n.\n",
    );
    let (port, server) = fake_gnudb(script).await;

    let client = GnudbClient::new(&gnudb_config(port));
    let data = client.query(&record()).await.unwrap();
    assert_eq!(data.artist, "Artist X");
    assert_eq!(data.track_titles.get(&0).map(String::as_str), Some("Intro"));
    assert!(data.year.is_none());

    let received = server.await.unwrap();
    assert_eq!(received[2], "cddb read folk a1b2c3d4");
}

#[tokio::test]
async fn test_no_match_skips_read() {
    let script = GnudbScript::new("202 No match found.\r\n", READ_BLOCK);
    let (port, server) = fake_gnudb(script).await;

    let client = GnudbClient::new(&gnudb_config(port));
    let err = client.query(&record()).await.unwrap_err();
    assert!(matches!(err, GnudbError::NoMatch));

    let received = server.await.unwrap();
    assert!(!received.iter().any(|line| line.starts_with("cddb read")));
    assert_eq!(received.last().map(String::as_str), Some("quit"));
}

#[tokio::test]
async fn test_read_error_status_is_refused() {
    let script = GnudbScript::new(
        "200 rock a1b2c3d4 Artist X / Album Y\r\n",
        "401 rock a1b2c3d4 No such CD entry in database.\r\n",
    );
    let (port, _server) = fake_gnudb(script).await;

    let client = GnudbClient::new(&gnudb_config(port));
    let err = client.query(&record()).await.unwrap_err();
    assert!(matches!(
        err,
        GnudbError::Refused {
            phase: Phase::ReadSent,
            code: 401
        }
    ));
}

#[tokio::test]
async fn test_close_without_terminator_still_parses() {
    let mut script = GnudbScript::new(
        "200 rock a1b2c3d4 Artist X / Album Y\r\n",
        "210 rock a1b2c3d4\r\nDTITLE=Artist X / Album Y\r\nTTITLE0=Intro\r\nTTITLE1=Main\r\n",
    );
    script.close_after_read = true;
    let (port, _server) = fake_gnudb(script).await;

    let client = GnudbClient::new(&gnudb_config(port));
    let data = client.query(&record()).await.unwrap();
    assert_eq!(data.album, "Album Y");
    assert_eq!(data.track_titles.len(), 2);
}

#[tokio::test]
async fn test_block_without_titles_is_incomplete() {
    let script = GnudbScript::new(
        "200 rock a1b2c3d4 Artist X / Album Y\r\n",
        "210 rock a1b2c3d4\r\nDTITLE=Artist X / Album Y\r\nDYEAR=1999\r\n.\r\n",
    );
    let (port, _server) = fake_gnudb(script).await;

    let client = GnudbClient::new(&gnudb_config(port));
    let err = client.query(&record()).await.unwrap_err();
    assert!(matches!(err, GnudbError::Incomplete));
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let (port, _server) = silent_server().await;
    let mut config = gnudb_config(port);
    config.timeout_secs = 1;

    let client = GnudbClient::new(&config);
    let started = Instant::now();
    let err = client.query(&record()).await.unwrap_err();

    assert!(matches!(err, GnudbError::Timeout(Phase::Greeting)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_refused_connection_is_no_match() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = GnudbClient::new(&gnudb_config(port));
    let err = client.query(&record()).await.unwrap_err();
    assert!(matches!(
        err,
        GnudbError::Io {
            phase: Phase::Connect,
            ..
        }
    ));
    assert!(client.lookup(&record()).await.is_none());
}
