//! Two-stage extraction/encoding pipeline
//!
//! Primary path: the extractor writes raw PCM to stdout, a pair of conduit tasks
//! moves it through a bounded channel into the encoder's stdin, and the encoder's
//! stdout becomes the response body. If either stage fails to launch, a single
//! transcoder reads the track from the device directly.
//!
//! All children are spawned with `kill_on_drop` and owned by the body stream. The
//! stream ends when the encoder finishes, when it hits a read error, or when its
//! session is cancelled. Dropping the stream kills every stage.

use super::commands::{encoder_command, extraction_command, fallback_command, StageCommand, CHUNK_SIZE};
use super::sessions::{PendingSession, SessionHandle};
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webcd_common::config::ToolsConfig;
use webcd_common::{Error, Result, StreamProfile};

/// Chunks buffered between extractor and encoder
const CONDUIT_DEPTH: usize = 16;

/// Which path is producing a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPath {
    Primary,
    Fallback,
}

/// Launches per-request pipelines
#[derive(Debug, Clone)]
pub struct StreamingPipeline {
    extractor: String,
    transcoder: String,
}

impl StreamingPipeline {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            extractor: tools.cdparanoia.clone(),
            transcoder: tools.ffmpeg.clone(),
        }
    }

    /// Start streaming one track
    ///
    /// Must be called inside a tokio runtime. `session` is activated once a stage
    /// is running and is then held by the returned stream; cancelling it ends the
    /// stream. If nothing launches, the device's current session is untouched.
    pub fn stream_track(
        &self,
        device: &str,
        track: u32,
        profile: &StreamProfile,
        session: PendingSession,
    ) -> Result<TrackStream> {
        let preload = profile.preload_bytes();

        let (path, stages) = match self.launch_primary(device, track, profile, session.token()) {
            Ok(stages) => (StreamPath::Primary, stages),
            Err(e) => {
                warn!(device = %device, track, "Primary pipeline unavailable, using single-stage fallback: {}", e);
                (StreamPath::Fallback, self.launch_fallback(device, track)?)
            }
        };

        // Only a launched pipeline displaces the device's current session
        let session = session.activate();
        info!(device = %device, track, path = ?path, bitrate = %profile.bitrate, "Stream started");
        Ok(TrackStream {
            path,
            inner: Box::pin(body(stages, preload, session)),
        })
    }

    fn launch_primary(
        &self,
        device: &str,
        track: u32,
        profile: &StreamProfile,
        cancel: CancellationToken,
    ) -> Result<Stages> {
        let extract = extraction_command(&self.extractor, device, track, profile.robustness_mode);
        let mut extractor = spawn_stage("extraction", &extract, Stdio::null())?;

        let encode = encoder_command(&self.transcoder, profile);
        // On failure the extractor is dropped here, which kills it
        let mut encoder = spawn_stage("encoding", &encode, Stdio::piped())?;

        let pcm = take_pipe("extraction", extractor.stdout.take())?;
        let sink = take_pipe("encoding", encoder.stdin.take())?;
        let output = take_pipe("encoding", encoder.stdout.take())?;

        spawn_conduit(pcm, sink, cancel);

        Ok(Stages {
            children: vec![extractor, encoder],
            output,
        })
    }

    fn launch_fallback(&self, device: &str, track: u32) -> Result<Stages> {
        let command = fallback_command(&self.transcoder, device, track);
        let mut transcoder = spawn_stage("fallback", &command, Stdio::null())?;
        let output = take_pipe("fallback", transcoder.stdout.take())?;

        Ok(Stages {
            children: vec![transcoder],
            output,
        })
    }
}

/// Encoded audio for one track
pub struct TrackStream {
    path: StreamPath,
    inner: Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>,
}

impl TrackStream {
    pub fn path(&self) -> StreamPath {
        self.path
    }
}

impl Stream for TrackStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

struct Stages {
    children: Vec<Child>,
    output: ChildStdout,
}

/// Owns the running stages and the session for the life of the body
struct StageGuard {
    children: Vec<Child>,
    session: SessionHandle,
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        self.session.token().cancel();
        for child in &mut self.children {
            if let Err(e) = child.start_kill() {
                debug!("Stage already exited: {}", e);
            }
        }
        debug!(device = %self.session.device(), "Stream stages torn down");
    }
}

fn spawn_stage(stage: &str, command: &StageCommand, stdin: Stdio) -> Result<Child> {
    debug!(stage = %stage, command = %command, "Launching stream stage");
    Command::new(&command.program)
        .args(&command.args)
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::StreamStageLaunchFailure {
            stage: stage.to_string(),
            reason: format!("{}: {}", command.program, e),
        })
}

fn take_pipe<T>(stage: &str, pipe: Option<T>) -> Result<T> {
    pipe.ok_or_else(|| Error::StreamStageLaunchFailure {
        stage: stage.to_string(),
        reason: "pipe not captured".to_string(),
    })
}

/// Move extractor output into encoder input through a bounded channel
///
/// Closing the encoder's stdin at extractor EOF lets it flush and exit.
fn spawn_conduit(mut pcm: ChildStdout, mut sink: ChildStdin, cancel: CancellationToken) {
    let (tx, mut rx) = mpsc::channel::<Bytes>(CONDUIT_DEPTH);

    let read_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let read = tokio::select! {
                _ = read_cancel.cancelled() => break,
                read = pcm.read(&mut buf) => read,
            };
            match read {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Extraction read failed: {}", e);
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => break,
                chunk = rx.recv() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            if let Err(e) = sink.write_all(&chunk).await {
                debug!("Encoder input closed: {}", e);
                break;
            }
        }
    });
}

/// Encoder output as a chunked byte stream, held back until the prebuffer fills
fn body(
    stages: Stages,
    preload: usize,
    session: SessionHandle,
) -> impl Stream<Item = io::Result<Bytes>> + Send {
    async_stream::stream! {
        let Stages { children, mut output } = stages;
        let cancel = session.token();
        let _guard = StageGuard { children, session };

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut held: Vec<u8> = Vec::new();
        let mut released = preload == 0;
        let mut total = 0usize;

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Stream session cancelled");
                    break;
                }
                read = output.read(&mut buf) => read,
            };

            let n = match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("Stream read failed, ending stream: {}", e);
                    break;
                }
            };
            total += n;

            if released {
                yield Ok(Bytes::copy_from_slice(&buf[..n]));
                continue;
            }

            held.extend_from_slice(&buf[..n]);
            if held.len() >= preload {
                released = true;
                debug!(bytes = held.len(), "Prebuffer filled");
                for chunk in held.chunks(CHUNK_SIZE) {
                    yield Ok(Bytes::copy_from_slice(chunk));
                }
                held.clear();
            }
        }

        for chunk in held.chunks(CHUNK_SIZE) {
            yield Ok(Bytes::copy_from_slice(chunk));
        }

        info!(bytes = total, "Stream finished");
    }
}
