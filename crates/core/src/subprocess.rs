//! Shared child-process plumbing for the capture engine and the encoder.
//!
//! [`run_streaming`] spawns a prepared [`Command`], hands every stdout line
//! to a callback as it arrives, keeps the tail of stderr for error reports
//! and optionally enforces a wall-clock limit.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;

/// Bytes of stderr kept for error messages.
const STDERR_TAIL_BYTES: usize = 8 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SubprocessError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a process that ran to exit.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    /// Last few KiB of stderr, lossily decoded.
    pub stderr_tail: String,
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Run `cmd` to completion, feeding stdout lines to `on_line`.
///
/// Lines are split on both `\n` and `\r` since progress-reporting tools
/// often redraw a single line. The child is killed if the timeout fires.
pub async fn run_streaming<F>(
    cmd: &mut Command,
    timeout: Option<Duration>,
    mut on_line: F,
) -> Result<ProcessOutput, SubprocessError>
where
    F: FnMut(&str) + Send,
{
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|source| SubprocessError::Spawn { program, source })?;

    let stdout = child.stdout.take();
    let stderr_task = tokio::spawn(read_tail(child.stderr.take()));

    let run = async {
        if let Some(stdout) = stdout {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf).await? == 0 {
                    break;
                }
                for line in String::from_utf8_lossy(&buf).split('\r') {
                    let line = line.trim();
                    if !line.is_empty() {
                        on_line(line);
                    }
                }
            }
        }
        child.wait().await
    };

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(status) => status?,
            Err(_elapsed) => {
                // Dropping `child` kills the process (`kill_on_drop`).
                return Err(SubprocessError::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }
        },
        None => run.await?,
    };

    let stderr_tail = stderr_task.await.unwrap_or_default();
    Ok(ProcessOutput {
        status,
        stderr_tail: String::from_utf8_lossy(&stderr_tail).into_owned(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Drain a stream, keeping only the last [`STDERR_TAIL_BYTES`].
async fn read_tail<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut tail = Vec::new();
    let Some(mut handle) = handle else {
        return tail;
    };
    let mut chunk = [0u8; 4096];
    loop {
        match handle.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > 2 * STDERR_TAIL_BYTES {
                    tail.drain(..tail.len() - STDERR_TAIL_BYTES);
                }
            }
        }
    }
    if tail.len() > STDERR_TAIL_BYTES {
        tail.drain(..tail.len() - STDERR_TAIL_BYTES);
    }
    tail
}
