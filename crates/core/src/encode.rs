//! GIF encoder: ffmpeg with a two-pass palette filter graph.
//!
//! Pass one builds a 256-color palette from the captured frames
//! (`palettegen`), pass two remaps every frame onto it with dithering
//! (`paletteuse`). The output loops forever.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::frames::FramePattern;
use crate::subprocess::{self, SubprocessError};

/// Content-derived palette, applied with error-diffusion dithering.
pub const PALETTE_FILTER_GRAPH: &str = "split[s0][s1];\
[s0]palettegen=max_colors=256:stats_mode=full[p];\
[s1][p]paletteuse=dither=sierra2_4a";

/// Wall-clock limit for the `-version` check.
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("encoder unavailable: {0}")]
    Unavailable(String),

    #[error("encoder timed out after {elapsed_ms}ms")]
    TimedOut { elapsed_ms: u64 },

    #[error("encoder exited with code {exit_code:?}: {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("encoder produced no output at {0}")]
    MissingOutput(String),

    #[error("encoder I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SubprocessError> for EncodeError {
    fn from(err: SubprocessError) -> Self {
        match err {
            SubprocessError::Spawn { .. } => Self::Unavailable(err.to_string()),
            SubprocessError::Timeout { elapsed_ms } => Self::TimedOut { elapsed_ms },
            SubprocessError::Io(e) => Self::Io(e),
        }
    }
}

/// A black-box frame-sequence-to-GIF encoder.
#[async_trait]
pub trait FrameEncoder: Send + Sync {
    /// Pre-flight check. Returns a version string when the tool can run.
    async fn check_available(&self) -> Result<String, EncodeError>;

    /// Encode `frames` at `fps` into `output`.
    ///
    /// `on_frame` receives the number of frames encoded so far.
    async fn encode(
        &self,
        frames: &FramePattern,
        fps: u32,
        output: &Path,
        on_frame: &(dyn Fn(u32) + Send + Sync),
    ) -> Result<(), EncodeError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegGifEncoder {
    program: String,
    timeout: Option<Duration>,
}

impl FfmpegGifEncoder {
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl FrameEncoder for FfmpegGifEncoder {
    async fn check_available(&self) -> Result<String, EncodeError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-hide_banner", "-version"]);

        let mut first_line = None;
        let output = subprocess::run_streaming(&mut cmd, Some(VERSION_CHECK_TIMEOUT), |line| {
            first_line.get_or_insert_with(|| line.to_string());
        })
        .await?;

        if !output.success() {
            return Err(EncodeError::Unavailable(format!(
                "'{} -version' exited with code {:?}",
                self.program,
                output.exit_code()
            )));
        }
        Ok(first_line.unwrap_or_else(|| self.program.clone()))
    }

    async fn encode(
        &self,
        frames: &FramePattern,
        fps: u32,
        output: &Path,
        on_frame: &(dyn Fn(u32) + Send + Sync),
    ) -> Result<(), EncodeError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(encode_args(frames, fps, output));

        let result = subprocess::run_streaming(&mut cmd, self.timeout, |line| {
            if let Some(frame) = parse_progress_line(line) {
                on_frame(frame);
            }
        })
        .await?;

        if !result.success() {
            return Err(EncodeError::Failed {
                exit_code: result.exit_code(),
                stderr: result.stderr_tail,
            });
        }

        ensure_output(output).await?;
        tracing::debug!(
            output = %output.display(),
            duration_ms = result.duration_ms,
            "GIF encoded",
        );
        Ok(())
    }
}

/// ffmpeg arguments for one encode.
///
/// The input frame rate equals the capture fps so the animation plays back
/// at the intended speed.
pub fn encode_args(frames: &FramePattern, fps: u32, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-nostats",
        "-progress",
        "pipe:1",
        "-y",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();

    args.extend([
        "-framerate".into(),
        fps.to_string().into(),
        "-start_number".into(),
        frames.start_number.to_string().into(),
        "-i".into(),
        frames.path_template().into_os_string(),
        "-filter_complex".into(),
        PALETTE_FILTER_GRAPH.into(),
        "-loop".into(),
        "0".into(),
        output.as_os_str().to_owned(),
    ]);
    args
}

/// Parse a `frame=N` line from ffmpeg's `-progress` output.
pub fn parse_progress_line(line: &str) -> Option<u32> {
    line.strip_prefix("frame=")?.trim().parse().ok()
}

/// An encoder that exits cleanly without writing anything still failed.
pub async fn ensure_output(output: &Path) -> Result<(), EncodeError> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(EncodeError::MissingOutput(output.display().to_string())),
    }
}
