use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::observability;
use crate::service::AvailabilityService;
use crate::store::BlockLedger;

/// Background task that periodically deletes expired holds.
///
/// Checks never depend on it: expired holds are already ignored at read time.
/// It only keeps them from piling up in the store.
pub async fn run_hold_sweeper(service: Arc<AvailabilityService>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(e) = service.cleanup_expired_holds().await {
            warn!("hold sweep failed: {e}");
        }
    }
}

/// Background task that compacts the ledger WAL once `threshold` appends
/// have accumulated since the last compaction.
pub async fn run_compactor(ledger: Arc<BlockLedger>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        compact_if_due(&ledger, threshold).await;
    }
}

/// One compactor step. Returns whether a compaction ran.
async fn compact_if_due(ledger: &BlockLedger, threshold: u64) -> bool {
    if !ledger.is_durable() {
        return false;
    }
    let appends = ledger.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match ledger.compact_wal().await {
        Ok(()) => {
            metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
            info!("compacted WAL after {appends} appends ({} live blocks)", ledger.block_count());
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}
