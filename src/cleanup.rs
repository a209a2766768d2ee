//! Scheduled cleanup of expired sessions, device codes and counters.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use crate::db::Database;
use crate::device_flow::DeviceFlow;
use crate::error::now_secs;
use crate::kv::MemoryKvStore;

/// What one cleanup pass removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub sessions: u64,
    pub device_codes: usize,
    pub kv_entries: usize,
}

/// Delete session rows that expired or were revoked more than `retention`
/// ago. Active sessions are never touched.
pub async fn cleanup_sessions(db: &Database, retention: Duration) -> u64 {
    let cutoff = match now_secs() {
        Ok(now) => now - retention.as_secs() as i64,
        Err(e) => {
            error!(error = %e, "Skipping session cleanup");
            return 0;
        }
    };

    match db.sessions().delete_stale(cutoff).await {
        Ok(count) => {
            if count > 0 {
                info!(count, "Cleaned up stale sessions");
            }
            count
        }
        Err(e) => {
            error!(error = %e, "Failed to clean up stale sessions");
            0
        }
    }
}

/// Drop expired device codes and revoke sessions their devices never
/// collected.
pub async fn sweep_device_codes(flow: &DeviceFlow) -> usize {
    let count = flow.sweep_expired().await;
    if count > 0 {
        info!(count, "Swept expired device codes");
    }
    count
}

pub fn purge_kv(kv: &MemoryKvStore) -> usize {
    let count = kv.purge_expired();
    if count > 0 {
        info!(count, "Purged expired cache entries");
    }
    count
}

/// Run every cleanup task once. Stores that are not in use are skipped.
pub async fn run_cleanup(
    db: &Database,
    retention: Duration,
    device_flow: Option<&DeviceFlow>,
    kv: Option<&MemoryKvStore>,
) -> CleanupReport {
    let device_codes = match device_flow {
        Some(flow) => sweep_device_codes(flow).await,
        None => 0,
    };

    CleanupReport {
        sessions: cleanup_sessions(db, retention).await,
        device_codes,
        kv_entries: kv.map(purge_kv).unwrap_or(0),
    }
}

/// Spawn a background task that cleans up sessions and counters periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    db: Database,
    kv: Option<Arc<MemoryKvStore>>,
    retention: Duration,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;
            run_cleanup(&db, retention, None, kv.as_deref()).await;
        }
    })
}

/// Spawn a background task that sweeps expired device codes.
pub fn spawn_device_sweeper(flow: DeviceFlow, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;
            sweep_device_codes(&flow).await;
        }
    })
}
