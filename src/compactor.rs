use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

/// Returns whether a compaction ran and succeeded.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL, "outcome" => "ok").increment(1);
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL, "outcome" => "error").increment(1);
            tracing::error!("WAL compaction failed: {e}");
            false
        }
    }
}
