// Sync scheduler - background loop driving due sync jobs
//
// One logical worker: each tick takes the engine lock, runs a single pass
// over due jobs, and releases. Delivery attempts for a given job are never
// concurrent because the pass holds the lock for its duration.

use crate::engine::SharingEngine;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a spawned scheduler loop
pub struct SyncScheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SyncScheduler {
    /// Spawn the scheduler loop on the current tokio runtime
    pub fn spawn(engine: Arc<Mutex<SharingEngine>>, poll_interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let attempted = engine.lock().await.sync_due(Utc::now()).await;
                        if attempted > 0 {
                            debug!(attempted, "Scheduler pass complete");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Stop the loop and wait for it to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}
