//! Capture driver: runs the headless capture engine against a job's
//! composed document and turns its log output into frame progress.
//!
//! The engine is treated as untrusted with respect to file naming and frame
//! counts. We ask for [`FRAME_NAME_PATTERN`] but only the frame-set resolver
//! decides what was actually written.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use crate::subprocess::{self, SubprocessError};

/// File naming requested from the engine (printf style, 1-based).
pub const FRAME_NAME_PATTERN: &str = "image-%09d.png";

/// Browser flags required in containers without a display or privileges.
pub const BROWSER_LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
];

/// Matches "Capturing frame 12", "Captured Frame 12 at 400ms", "frame 12 captured".
static FRAME_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)captur\w*\s+frame\s*#?\s*(\d+)|frame\s*#?\s*(\d+)\s+captur")
        .expect("frame log regex is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture engine failed to start: {0}")]
    NotStarted(String),

    #[error("capture engine timed out after {elapsed_ms}ms")]
    TimedOut { elapsed_ms: u64 },

    #[error("capture engine exited with code {exit_code:?}: {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SubprocessError> for CaptureError {
    fn from(err: SubprocessError) -> Self {
        match err {
            SubprocessError::Spawn { .. } => Self::NotStarted(err.to_string()),
            SubprocessError::Timeout { elapsed_ms } => Self::TimedOut { elapsed_ms },
            SubprocessError::Io(e) => Self::Io(e),
        }
    }
}

/// Everything the engine needs for one capture.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// `file://` URL of the composed document.
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub duration_secs: u32,
    pub fps: u32,
    /// Directory the frames must land in.
    pub output_dir: PathBuf,
    pub transparent: bool,
}

impl CaptureRequest {
    pub fn total_frames(&self) -> u32 {
        self.duration_secs * self.fps
    }
}

/// A black-box frame producer.
///
/// `on_frame` is called with the 1-based index of each frame the engine
/// reports as captured. Returns the highest index reported.
#[async_trait]
pub trait CaptureEngine: Send + Sync {
    async fn capture(
        &self,
        request: &CaptureRequest,
        on_frame: &(dyn Fn(u32) + Send + Sync),
    ) -> Result<u32, CaptureError>;
}

/// Drives the `timesnap` CLI (or anything accepting the same flags).
#[derive(Debug, Clone)]
pub struct TimesnapEngine {
    program: String,
    timeout: Option<Duration>,
}

impl TimesnapEngine {
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CaptureEngine for TimesnapEngine {
    async fn capture(
        &self,
        request: &CaptureRequest,
        on_frame: &(dyn Fn(u32) + Send + Sync),
    ) -> Result<u32, CaptureError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(capture_args(request));

        let mut highest = 0u32;
        let output = subprocess::run_streaming(&mut cmd, self.timeout, |line| {
            if let Some(frame) = parse_frame_line(line) {
                highest = highest.max(frame);
                on_frame(frame);
            } else {
                tracing::trace!(line, "capture engine output");
            }
        })
        .await?;

        if !output.success() {
            return Err(CaptureError::Failed {
                exit_code: output.exit_code(),
                stderr: output.stderr_tail,
            });
        }

        tracing::debug!(
            frames = highest,
            duration_ms = output.duration_ms,
            "Capture engine finished",
        );
        Ok(highest)
    }
}

/// Command-line arguments for one capture.
pub fn capture_args(request: &CaptureRequest) -> Vec<String> {
    let mut args = vec![
        request.url.clone(),
        format!("--viewport={},{}", request.width, request.height),
        format!("--fps={}", request.fps),
        format!("--duration={}", request.duration_secs),
        format!("--output-directory={}", request.output_dir.display()),
        format!("--output-pattern={FRAME_NAME_PATTERN}"),
        format!("--launch-arguments={}", BROWSER_LAUNCH_ARGS.join(" ")),
    ];
    if request.transparent {
        args.push("--transparent-background".to_string());
    }
    args
}

/// Extract the frame index from a "frame N captured" style log line.
pub fn parse_frame_line(line: &str) -> Option<u32> {
    let caps = FRAME_LINE.captures(line)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;

    use super::*;

    fn request() -> CaptureRequest {
        CaptureRequest {
            url: "file:///tmp/job-x/index.html".into(),
            width: 100,
            height: 50,
            duration_secs: 2,
            fps: 30,
            output_dir: PathBuf::from("/tmp/job-x/frames"),
            transparent: false,
        }
    }

    #[test]
    fn parses_common_progress_lines() {
        assert_eq!(parse_frame_line("Capturing Frame 1 at 0ms..."), Some(1));
        assert_eq!(parse_frame_line("Captured frame 42 at 1366.67ms"), Some(42));
        assert_eq!(parse_frame_line("frame #7 captured"), Some(7));
        assert_eq!(parse_frame_line("Launching browser..."), None);
        assert_eq!(parse_frame_line("frame rate: 30"), None);
    }

    #[test]
    fn args_request_known_pattern_and_sandbox_flags() {
        let args = capture_args(&request());
        assert_eq!(args[0], "file:///tmp/job-x/index.html");
        assert!(args.contains(&"--viewport=100,50".to_string()));
        assert!(args.contains(&"--fps=30".to_string()));
        assert!(args.contains(&"--duration=2".to_string()));
        assert!(args.contains(&"--output-directory=/tmp/job-x/frames".to_string()));
        assert!(args.contains(&"--output-pattern=image-%09d.png".to_string()));
        let launch = args
            .iter()
            .find(|a| a.starts_with("--launch-arguments="))
            .expect("launch args");
        assert!(launch.contains("--no-sandbox"));
        assert!(launch.contains("--disable-gpu"));
        assert!(!args.contains(&"--transparent-background".to_string()));
    }

    #[test]
    fn transparent_background_is_requested() {
        let mut req = request();
        req.transparent = true;
        assert!(capture_args(&req).contains(&"--transparent-background".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_engine_is_not_started() {
        let engine = TimesnapEngine::new("no-such-capture-engine-xyz", None);
        let result = engine.capture(&request(), &|_| {}).await;
        assert_matches!(result, Err(CaptureError::NotStarted(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn engine_output_drives_frame_callback() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("fake-engine.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nfor i in 1 2 3; do echo \"Capturing Frame $i at 0ms...\"; done\n",
        )
        .expect("write script");

        let engine = TimesnapEngine::new("sh", None);
        let mut req = request();
        // `sh <script> <args...>`: the script ignores its arguments.
        req.url = script.display().to_string();

        let seen = AtomicU32::new(0);
        let frames = engine
            .capture(&req, &|n| {
                seen.fetch_max(n, Ordering::SeqCst);
            })
            .await
            .expect("capture");
        assert_eq!(frames, 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn engine_crash_is_a_capture_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("crash.sh");
        std::fs::write(&script, "#!/bin/sh\necho 'browser crashed' >&2\nexit 1\n")
            .expect("write script");

        let engine = TimesnapEngine::new("sh", None);
        let mut req = request();
        req.url = script.display().to_string();

        let result = engine.capture(&req, &|_| {}).await;
        assert_matches!(
            result,
            Err(CaptureError::Failed { exit_code: Some(1), stderr }) if stderr.contains("crashed")
        );
    }
}
