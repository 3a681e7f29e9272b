use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins; `*` allows any origin.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Event streams are
    /// not cut off by it once their headers are sent.
    pub request_timeout_secs: u64,
    /// Maximum accepted request body size (default: 10 MiB).
    pub max_body_bytes: usize,
    /// Parent directory of all job workspaces (default: OS temp dir).
    pub work_root: PathBuf,
    /// Capture engine executable (default: `timesnap`).
    pub capture_bin: String,
    /// Encoder executable (default: `ffmpeg`).
    pub ffmpeg_bin: String,
    /// Optional wall-clock limit for each capture/encode subprocess.
    pub stage_timeout: Option<Duration>,
    /// Keep failed workspaces on disk for inspection (default: `false`).
    pub preserve_failed_workspaces: bool,
    /// Age after which an unclaimed workspace is swept (default: `3600`).
    pub workspace_ttl_secs: u64,
    /// How often the sweeper runs (default: `300`).
    pub sweep_interval_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default          |
    /// |------------------------------|------------------|
    /// | `HOST`                       | `0.0.0.0`        |
    /// | `PORT`                       | `3000`           |
    /// | `CORS_ORIGINS`               | `*`              |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`             |
    /// | `MAX_BODY_BYTES`             | `10485760`       |
    /// | `WORK_ROOT`                  | OS temp dir      |
    /// | `CAPTURE_BIN`                | `timesnap`       |
    /// | `FFMPEG_BIN`                 | `ffmpeg`         |
    /// | `STAGE_TIMEOUT_SECS`         | unset (no limit) |
    /// | `PRESERVE_FAILED_WORKSPACES` | `false`          |
    /// | `WORKSPACE_TTL_SECS`         | `3600`           |
    /// | `SWEEP_INTERVAL_SECS`        | `300`            |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let max_body_bytes: usize = std::env::var("MAX_BODY_BYTES")
            .unwrap_or_else(|_| (10 * 1024 * 1024).to_string())
            .parse()
            .expect("MAX_BODY_BYTES must be a valid usize");

        let work_root = std::env::var("WORK_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());
        let work_root = std::path::absolute(&work_root).expect("WORK_ROOT must be resolvable");

        let capture_bin = std::env::var("CAPTURE_BIN").unwrap_or_else(|_| "timesnap".into());
        let ffmpeg_bin = std::env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".into());

        let stage_timeout = std::env::var("STAGE_TIMEOUT_SECS").ok().map(|v| {
            Duration::from_secs(v.parse().expect("STAGE_TIMEOUT_SECS must be a valid u64"))
        });

        let preserve_failed_workspaces = std::env::var("PRESERVE_FAILED_WORKSPACES")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let workspace_ttl_secs: u64 = std::env::var("WORKSPACE_TTL_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("WORKSPACE_TTL_SECS must be a valid u64");

        let sweep_interval_secs: u64 = std::env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("SWEEP_INTERVAL_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_body_bytes,
            work_root,
            capture_bin,
            ffmpeg_bin,
            stage_timeout,
            preserve_failed_workspaces,
            workspace_ttl_secs,
            sweep_interval_secs,
        }
    }
}
