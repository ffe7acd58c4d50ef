//! Background maintenance loop: RFQ deadline expiry, expired-token pruning,
//! and old-message pruning. Every sweep uses the same CAS discipline as the
//! foreground workflow, so a sweep racing a live accept simply loses.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::AppContext;

const SWEEP_INTERVAL_SECS: u64 = 60;

/// Spawn the janitor task. Runs until the daemon exits.
pub fn spawn(ctx: Arc<AppContext>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
        interval.tick().await; // skip immediate tick
        loop {
            interval.tick().await;
            sweep(&ctx).await;
        }
    })
}

async fn sweep(ctx: &AppContext) {
    match ctx.rfq.expire_overdue().await {
        Ok(0) => {}
        Ok(n) => debug!(count = n, "expired overdue RFQs"),
        Err(e) => warn!(err = %e, "RFQ expiry sweep failed"),
    }

    let now = chrono::Utc::now().to_rfc3339();
    match ctx.storage.prune_expired_tokens(&now).await {
        Ok(0) => {}
        Ok(n) => debug!(count = n, "pruned expired auth tokens"),
        Err(e) => warn!(err = %e, "token prune failed"),
    }

    match ctx.storage.prune_old_messages(ctx.config.prune_days).await {
        Ok(0) => {}
        Ok(n) => debug!(count = n, "pruned old messages"),
        Err(e) => warn!(err = %e, "message prune failed"),
    }
}
