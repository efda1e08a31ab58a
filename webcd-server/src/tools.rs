//! Bounded invocation of external command-line tools
//!
//! Every probe-style tool (TOC reader, disc-id calculator, eject, blockdev) runs
//! through [`run_tool`], which enforces a timeout and kills the child when the
//! timeout fires. Output written before the kill is kept on the error, since some
//! tools report what they found and then hang on the drive.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::debug;

/// How long to keep collecting output after a timed-out tool is killed
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Tool invocation errors
#[derive(Debug, Error)]
pub enum ToolError {
    /// Binary not found in PATH
    #[error("{0} not found")]
    NotFound(String),

    /// Tool did not finish in time and was killed
    #[error("{program} timed out after {timeout:?}")]
    TimedOut {
        program: String,
        timeout: Duration,
        /// stdout written before the kill
        stdout: String,
        /// stderr written before the kill
        stderr: String,
    },

    /// Any other spawn or wait failure
    #[error("Failed to run {program}: {source}")]
    Failed {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Captured output of a finished tool
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Run a tool to completion with a time limit
///
/// Output is decoded lossily; stdin is closed.
pub async fn run_tool(program: &str, args: &[String], timeout: Duration) -> Result<ToolOutput, ToolError> {
    debug!(program = %program, args = ?args, "Running external tool");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let stdout = Capture::start(child.stdout.take());
    let stderr = Capture::start(child.stderr.take());

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            let status = status.map_err(|e| ToolError::Failed {
                program: program.to_string(),
                source: e,
            })?;
            Ok(ToolOutput {
                status,
                stdout: stdout.finish(None).await,
                stderr: stderr.finish(None).await,
            })
        }
        Err(_) => {
            if let Err(e) = child.kill().await {
                debug!(program = %program, "Failed to kill timed-out tool: {}", e);
            }
            // A grandchild may still hold the pipes open
            Err(ToolError::TimedOut {
                program: program.to_string(),
                timeout,
                stdout: stdout.finish(Some(DRAIN_GRACE)).await,
                stderr: stderr.finish(Some(DRAIN_GRACE)).await,
            })
        }
    }
}

/// Background reader accumulating one output pipe
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl Capture {
    fn start<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = buf.clone();
        let task = tokio::spawn(async move {
            let Some(mut pipe) = pipe else { return };
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .extend_from_slice(&chunk[..n]),
                }
            }
        });
        Self { buf, task }
    }

    /// Wait for end of stream (at most `grace`, if given) and return what was read
    async fn finish(self, grace: Option<Duration>) -> String {
        let Capture { buf, mut task } = self;
        match grace {
            None => {
                let _ = (&mut task).await;
            }
            Some(grace) => {
                if tokio::time::timeout(grace, &mut task).await.is_err() {
                    task.abort();
                }
            }
        }
        let bytes = buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let text = String::from_utf8_lossy(&bytes).into_owned();
        text
    }
}

/// Map a spawn failure, distinguishing a missing binary
pub fn spawn_error(program: &str, err: io::Error) -> ToolError {
    if err.kind() == io::ErrorKind::NotFound {
        ToolError::NotFound(program.to_string())
    } else {
        ToolError::Failed {
            program: program.to_string(),
            source: err,
        }
    }
}

/// Convenience for building owned argument lists
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
