//! Server-side playback through a local player
//!
//! `play` launches the same pipeline the HTTP stream uses and feeds its output to
//! the configured player command. Only one controlled playback runs at a time;
//! it also holds the device's stream session, so an HTTP stream on the same
//! drive preempts it and vice versa.

use crate::state::DiscStore;
use crate::stream::{SessionRegistry, StreamingPipeline, TrackStream};
use futures::StreamExt;
use serde::Serialize;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webcd_common::{Error, Result, StreamProfile};

#[derive(Debug)]
struct PlayerState {
    current_track: u32,
    is_playing: bool,
    play_id: u64,
    stop: Option<CancellationToken>,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            current_track: 1,
            is_playing: false,
            play_id: 0,
            stop: None,
        }
    }
}

/// Reported by `GET /api/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackStatus {
    pub is_playing: bool,
    pub current_track: u32,
    pub track_count: usize,
}

/// Result of a next/previous request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipOutcome {
    Playing(u32),
    /// Already at the first or last track
    AtBoundary(&'static str),
}

pub struct PlaybackController {
    pipeline: StreamingPipeline,
    sessions: SessionRegistry,
    player: Vec<String>,
    state: Arc<Mutex<PlayerState>>,
}

impl PlaybackController {
    pub fn new(pipeline: StreamingPipeline, sessions: SessionRegistry, player: Vec<String>) -> Self {
        Self {
            pipeline,
            sessions,
            player,
            state: Arc::new(Mutex::new(PlayerState::default())),
        }
    }

    /// Play `requested`, or the current track when `None`
    pub async fn play(
        &self,
        store: &DiscStore,
        profile: &StreamProfile,
        requested: Option<i64>,
    ) -> Result<u32> {
        let device = store.require_device().await?;

        let mut state = self.state.lock().await;
        let track = store
            .track(requested.unwrap_or(state.current_track as i64))
            .await?
            .number;

        stop_locked(&mut state);
        state.current_track = track;

        let session = self.sessions.prepare(&device);
        let stream = self.pipeline.stream_track(&device, track, profile, session)?;
        let (player, stdin) = self.spawn_player()?;

        state.play_id += 1;
        let stop = CancellationToken::new();
        state.stop = Some(stop.clone());
        state.is_playing = true;

        tokio::spawn(feed_player(
            stream,
            player,
            stdin,
            stop,
            self.state.clone(),
            state.play_id,
        ));

        info!(device = %device, track, "Playback started");
        Ok(track)
    }

    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if state.is_playing {
            info!(track = state.current_track, "Playback stopped");
        }
        stop_locked(&mut state);
    }

    pub async fn next(&self, store: &DiscStore, profile: &StreamProfile) -> Result<SkipOutcome> {
        let current = self.state.lock().await.current_track as usize;
        if current >= store.track_count().await {
            return Ok(SkipOutcome::AtBoundary("Last track"));
        }
        let track = self.play(store, profile, Some(current as i64 + 1)).await?;
        Ok(SkipOutcome::Playing(track))
    }

    pub async fn previous(&self, store: &DiscStore, profile: &StreamProfile) -> Result<SkipOutcome> {
        let current = self.state.lock().await.current_track;
        if current <= 1 {
            return Ok(SkipOutcome::AtBoundary("First track"));
        }
        let track = self.play(store, profile, Some(current as i64 - 1)).await?;
        Ok(SkipOutcome::Playing(track))
    }

    pub async fn status(&self, store: &DiscStore) -> PlaybackStatus {
        let state = self.state.lock().await;
        PlaybackStatus {
            is_playing: state.is_playing,
            current_track: state.current_track,
            track_count: store.track_count().await,
        }
    }

    /// Forget the track position after a device switch or eject
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        stop_locked(&mut state);
        state.current_track = 1;
    }

    fn spawn_player(&self) -> Result<(Child, ChildStdin)> {
        let launch_failure = |reason: String| Error::StreamStageLaunchFailure {
            stage: "player".to_string(),
            reason,
        };

        let (program, args) = self
            .player
            .split_first()
            .ok_or_else(|| launch_failure("no player command configured".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| launch_failure(format!("{}: {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| launch_failure("player stdin not captured".to_string()))?;
        Ok((child, stdin))
    }
}

fn stop_locked(state: &mut PlayerState) {
    if let Some(stop) = state.stop.take() {
        stop.cancel();
    }
    state.is_playing = false;
}

async fn feed_player(
    mut stream: TrackStream,
    mut player: Child,
    mut stdin: ChildStdin,
    stop: CancellationToken,
    state: Arc<Mutex<PlayerState>>,
    play_id: u64,
) {
    loop {
        let chunk = tokio::select! {
            _ = stop.cancelled() => break,
            chunk = stream.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                if let Err(e) = stdin.write_all(&bytes).await {
                    warn!("Player input closed: {}", e);
                    break;
                }
            }
            Some(Err(e)) => {
                warn!("Playback stream failed: {}", e);
                break;
            }
            None => break,
        }
    }

    // Ends the pipeline and lets the player drain what it has
    drop(stream);
    drop(stdin);

    if !stop.is_cancelled() {
        tokio::select! {
            _ = stop.cancelled() => {}
            status = player.wait() => debug!(status = ?status, "Player exited"),
        }
    }
    drop(player);

    let mut state = state.lock().await;
    if state.play_id == play_id {
        state.is_playing = false;
        state.stop = None;
        debug!(track = state.current_track, "Playback finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webcd_common::config::ToolsConfig;
    use webcd_common::Track;

    async fn store_with(n: u32) -> DiscStore {
        let store = DiscStore::new(Some("/dev/null".to_string()));
        let ticket = store.begin_read().await.unwrap();
        store
            .install(&ticket, (1..=n).map(|i| Track::new(i, "01:00")).collect(), None, None)
            .await;
        store
    }

    fn controller() -> PlaybackController {
        let tools = ToolsConfig {
            cdparanoia: "/nonexistent/cdparanoia".to_string(),
            ffmpeg: "/nonexistent/ffmpeg".to_string(),
            ..Default::default()
        };
        PlaybackController::new(
            StreamingPipeline::new(&tools),
            SessionRegistry::new(),
            vec!["/nonexistent/player".to_string()],
        )
    }

    #[tokio::test]
    async fn test_status_defaults() {
        let store = store_with(3).await;
        let status = controller().status(&store).await;
        assert_eq!(
            status,
            PlaybackStatus {
                is_playing: false,
                current_track: 1,
                track_count: 3,
            }
        );
    }

    #[tokio::test]
    async fn test_previous_at_first_track() {
        let store = store_with(3).await;
        let outcome = controller()
            .previous(&store, &StreamProfile::default())
            .await
            .unwrap();
        assert_eq!(outcome, SkipOutcome::AtBoundary("First track"));
    }

    #[tokio::test]
    async fn test_next_at_last_track() {
        let store = store_with(1).await;
        let outcome = controller().next(&store, &StreamProfile::default()).await.unwrap();
        assert_eq!(outcome, SkipOutcome::AtBoundary("Last track"));
    }

    #[tokio::test]
    async fn test_play_rejects_out_of_range() {
        let store = store_with(2).await;
        let result = controller()
            .play(&store, &StreamProfile::default(), Some(3))
            .await;
        assert!(matches!(result, Err(Error::InvalidTrackNumber { requested: 3, .. })));
    }

    #[tokio::test]
    async fn test_play_without_tools_reports_launch_failure() {
        let store = store_with(2).await;
        let controller = controller();
        let result = controller.play(&store, &StreamProfile::default(), Some(2)).await;
        assert!(matches!(result, Err(Error::StreamStageLaunchFailure { .. })));
        assert!(!controller.status(&store).await.is_playing);
    }
}
