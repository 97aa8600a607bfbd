//! Periodic removal of expired idempotency entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::idempotency::store::IdempotencyStore;

pub struct IdempotencySweeper {
    store: Arc<IdempotencyStore>,
    interval: Duration,
}

impl IdempotencySweeper {
    pub fn new(store: Arc<IdempotencyStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Idempotency sweeper starting");

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.store.sweep_expired();
                    if removed > 0 {
                        tracing::info!(removed, remaining = self.store.len(), "Swept expired idempotency entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Idempotency sweeper received shutdown signal");
                    break;
                }
            }
        }
    }
}
