//! Periodic removal of abandoned job workspaces.
//!
//! A workspace normally disappears when its GIF is downloaded or its job
//! fails. Jobs whose artifact is never fetched (or whose download was
//! interrupted) would otherwise leak disk space, so this task deletes any
//! `job-*` directory older than the configured TTL.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use framecast_core::workspace;
use framecast_events::JobTracker;

/// Shortest sweep period accepted.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Run the sweeper loop until `cancel` is triggered.
///
/// Finished job records older than `ttl` are forgotten on the same schedule.
pub async fn run(
    work_root: PathBuf,
    tracker: Arc<JobTracker>,
    ttl: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    let interval = interval.max(MIN_INTERVAL);
    tracing::info!(
        work_root = %work_root.display(),
        ttl_secs = ttl.as_secs(),
        interval_secs = interval.as_secs(),
        "Workspace sweeper started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Workspace sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                match workspace::sweep_expired(&work_root, ttl).await {
                    Ok(removed) if removed > 0 => {
                        tracing::info!(removed, "Workspace sweeper: removed abandoned workspaces");
                    }
                    Ok(_) => tracing::debug!("Workspace sweeper: nothing to remove"),
                    Err(e) => {
                        tracing::error!(error = %e, "Workspace sweeper: sweep failed");
                    }
                }
                let forgotten = tracker.prune_finished(ttl);
                if forgotten > 0 {
                    tracing::debug!(forgotten, "Workspace sweeper: pruned finished job records");
                }
            }
        }
    }
}
