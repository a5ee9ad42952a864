//! Periodic eviction of finished jobs from the progress store.
//!
//! Completed and failed jobs stay queryable for the retention period, then
//! a sweep on a fixed `tokio::time::interval` drops them. Jobs that are
//! still pending or running are never evicted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use emoti_worker::ProgressStore;
use tokio_util::sync::CancellationToken;

/// Remove terminal entries that finished more than `retention` ago.
///
/// Returns the number of evicted jobs.
pub fn sweep(store: &ProgressStore, retention: Duration) -> usize {
    let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    let cutoff = Utc::now()
        .checked_sub_signed(retention)
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
    store.evict_finished(cutoff)
}

/// Run the progress retention loop.
///
/// Sweeps every `interval` until `cancel` is triggered.
pub async fn run(
    store: Arc<ProgressStore>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = interval.as_secs(),
        "Progress retention job started"
    );

    let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Progress retention job stopping");
                break;
            }
            _ = ticker.tick() => {
                let evicted = sweep(&store, retention);
                if evicted > 0 {
                    tracing::info!(evicted, remaining = store.len(), "Progress retention: evicted finished jobs");
                } else {
                    tracing::debug!("Progress retention: nothing to evict");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
