//! Background eviction of expired codes
//!
//! Redemption already rejects expired codes lazily; the reaper keeps codes
//! that are never redeemed from accumulating in memory.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::session::SessionStore;

/// Spawn a task that purges expired sessions every `interval`.
pub fn spawn_reaper(store: Arc<SessionStore>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick fires immediately and the store is empty at startup
        ticker.tick().await;

        loop {
            ticker.tick().await;
            reap_cycle(&store).await;
        }
    })
}

async fn reap_cycle(store: &SessionStore) -> usize {
    let evicted = store.purge_expired().await;
    if evicted > 0 {
        info!(evicted, "evicted expired authorization codes");
    } else {
        debug!("no expired authorization codes");
    }
    evicted
}
