// Sync Supervisor - drives OverlaySync jobs to synced or failed
//
// State machine per job:
//   pending -> synced                      (broadcast succeeded, terminal)
//   pending -> pending, retry_count += 1   (transient failure, backoff)
//   pending -> failed                      (retry ceiling exceeded, or the
//                                           payload was rejected outright)
//
// Errors never propagate back to whoever triggered the job; outcomes are
// observable only on the OverlaySync row.

use crate::overlay::model::{OverlaySync, SyncIntent, SyncStatus, SyncType};
use crate::overlay::transport::{OverlayTransport, TransportError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from supervisor bookkeeping (never from the transport itself)
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync job not found: {0}")]
    SyncNotFound(u64),

    #[error("Sync job {id} is not pending (status {status:?})")]
    NotPending { id: u64, status: SyncStatus },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State export/import error: {0}")]
    StateError(String),
}

/// Configuration for the supervisor
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Retries allowed after the initial attempt
    pub max_retries: u32,
    /// First backoff step; doubles per retry
    pub base_delay_secs: u64,
    /// Backoff ceiling
    pub max_delay_secs: u64,
    /// Per-attempt transport timeout
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_secs: 5,
            max_delay_secs: 3600,
            timeout_secs: 30,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_base_delay_secs(mut self, secs: u64) -> Self {
        self.base_delay_secs = secs;
        self
    }

    pub fn with_max_delay_secs(mut self, secs: u64) -> Self {
        self.max_delay_secs = secs;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.timeout_secs == 0 {
            return Err(SyncError::InvalidConfig("timeout_secs must be > 0".to_string()));
        }
        if self.base_delay_secs == 0 {
            return Err(SyncError::InvalidConfig("base_delay_secs must be > 0".to_string()));
        }
        if self.max_delay_secs < self.base_delay_secs {
            return Err(SyncError::InvalidConfig(
                "max_delay_secs must be >= base_delay_secs".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of one delivery attempt
#[derive(Clone, Debug)]
pub enum DeliveryOutcome {
    /// Broadcast succeeded; the job is synced
    Synced { tx_hash: String },
    /// Transient failure; another attempt is scheduled
    Retrying {
        retry_count: u32,
        next_attempt_at: DateTime<Utc>,
    },
    /// Terminal failure (ceiling exceeded or payload rejected)
    Failed { error: String },
}

/// Statistics about supervisor operations
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SyncStats {
    pub jobs_enqueued: u64,
    pub attempts: u64,
    pub jobs_synced: u64,
    pub jobs_failed: u64,
    pub transient_failures: u64,
    pub rejections: u64,
}

/// The sync supervisor
#[derive(Serialize, Deserialize)]
pub struct SyncSupervisor {
    config: SyncConfig,
    jobs: BTreeMap<u64, OverlaySync>,
    next_id: u64,
    stats: SyncStats,
}

impl SyncSupervisor {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            jobs: BTreeMap::new(),
            next_id: 1,
            stats: SyncStats::default(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Create a pending job from a sync intent; due immediately
    pub fn enqueue(&mut self, intent: SyncIntent, now: DateTime<Utc>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let job = OverlaySync::from_intent(id, intent, now);
        debug!(
            sync_id = id,
            sync_type = %job.sync_type(),
            topic = job.overlay_topic(),
            "Sync job enqueued"
        );
        self.jobs.insert(id, job);
        self.stats.jobs_enqueued += 1;
        id
    }

    /// Run one delivery attempt for a pending job.
    ///
    /// Attempts on non-pending jobs are rejected, which together with
    /// `&mut self` serializes delivery per job id. A transport timeout
    /// counts as a transient failure.
    pub async fn attempt_delivery(
        &mut self,
        transport: &dyn OverlayTransport,
        sync_id: u64,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome, SyncError> {
        let job = self
            .jobs
            .get(&sync_id)
            .ok_or(SyncError::SyncNotFound(sync_id))?;
        if job.sync_status() != SyncStatus::Pending {
            return Err(SyncError::NotPending {
                id: sync_id,
                status: job.sync_status(),
            });
        }

        let topic = job.overlay_topic().to_string();
        let payload = job.sync_data().to_vec();
        self.stats.attempts += 1;

        let send = transport.send(&topic, &payload);
        let result = tokio::time::timeout(Duration::from_secs(self.config.timeout_secs), send).await;

        let job = self
            .jobs
            .get_mut(&sync_id)
            .ok_or(SyncError::SyncNotFound(sync_id))?;

        match result {
            Ok(Ok(receipt)) => {
                let tx_hash = receipt.tx_hash().to_string();
                job.mark_synced(tx_hash.clone(), now);
                self.stats.jobs_synced += 1;
                info!(sync_id, tx_hash, "Sync job delivered");
                Ok(DeliveryOutcome::Synced { tx_hash })
            }
            Ok(Err(TransportError::Rejected(msg))) => {
                // Terminal: the payload itself is the problem, retrying is
                // pointless. retry_count stays where it was.
                job.mark_failed(msg.clone(), now);
                self.stats.rejections += 1;
                self.stats.jobs_failed += 1;
                warn!(sync_id, error = %msg, "Sync job rejected by overlay");
                Ok(DeliveryOutcome::Failed { error: msg })
            }
            Ok(Err(TransportError::Transient(msg))) => {
                Ok(self.handle_transient(sync_id, msg, now))
            }
            Err(_elapsed) => {
                let msg = format!(
                    "delivery attempt timed out after {}s",
                    self.config.timeout_secs
                );
                Ok(self.handle_transient(sync_id, msg, now))
            }
        }
    }

    fn handle_transient(&mut self, sync_id: u64, error: String, now: DateTime<Utc>) -> DeliveryOutcome {
        self.stats.transient_failures += 1;

        // Lookup cannot fail here; the id was checked by the caller
        let job = match self.jobs.get(&sync_id) {
            Some(job) => job,
            None => return DeliveryOutcome::Failed { error },
        };

        let retry_count = job.retry_count() + 1;
        if retry_count > self.config.max_retries {
            // The counter still records the final attempt
            if let Some(job) = self.jobs.get_mut(&sync_id) {
                job.record_transient_failure(error.clone(), now, now);
                job.mark_failed(error.clone(), now);
            }
            self.stats.jobs_failed += 1;
            warn!(sync_id, retry_count, error = %error, "Sync job failed: retry ceiling exceeded");
            return DeliveryOutcome::Failed { error };
        }

        let next_attempt_at = now + chrono::Duration::seconds(self.backoff_secs(retry_count) as i64);
        if let Some(job) = self.jobs.get_mut(&sync_id) {
            job.record_transient_failure(error, next_attempt_at, now);
        }
        debug!(
            sync_id,
            retry_count,
            next_attempt_at = %next_attempt_at,
            "Sync job retry scheduled"
        );
        DeliveryOutcome::Retrying {
            retry_count,
            next_attempt_at,
        }
    }

    /// Exponential backoff: base * 2^retry_count, capped
    fn backoff_secs(&self, retry_count: u32) -> u64 {
        let shift = retry_count.min(32);
        self.config
            .base_delay_secs
            .saturating_mul(1u64 << shift)
            .min(self.config.max_delay_secs)
    }

    /// Pending jobs whose backoff window has elapsed
    pub fn list_pending_due(&self, now: DateTime<Utc>) -> Vec<&OverlaySync> {
        self.jobs.values().filter(|j| j.is_due(now)).collect()
    }

    /// Attempt delivery for every due job once; returns attempts made
    pub async fn run_due(
        &mut self,
        transport: &dyn OverlayTransport,
        now: DateTime<Utc>,
    ) -> usize {
        let due: Vec<u64> = self.list_pending_due(now).iter().map(|j| j.id()).collect();
        let mut attempted = 0;
        for id in due {
            // NotPending is unreachable for ids collected above; keep going
            // on bookkeeping errors rather than abandoning the batch.
            if self.attempt_delivery(transport, id, now).await.is_ok() {
                attempted += 1;
            }
        }
        attempted
    }

    pub fn get(&self, sync_id: u64) -> Option<&OverlaySync> {
        self.jobs.get(&sync_id)
    }

    /// Jobs propagating a given reference, in id order
    pub fn jobs_for_reference(&self, sync_type: SyncType, reference_id: &str) -> Vec<&OverlaySync> {
        self.jobs
            .values()
            .filter(|j| j.sync_type() == sync_type && j.reference_id() == reference_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.jobs
            .values()
            .filter(|j| j.sync_status() == SyncStatus::Pending)
            .count()
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        postcard::to_allocvec(self).unwrap_or_default()
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        postcard::from_bytes(bytes).map_err(|e| SyncError::StateError(e.to_string()))
    }
}
