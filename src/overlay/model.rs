// OverlaySync - one propagation job for one change
//
// Rows are created by sync intents, mutated only by the supervisor, and
// retained forever for audit/debug. The payload is snapshotted at enqueue
// time; later changes to the source record produce new jobs.

use crate::identity::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// What kind of change a sync job propagates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncType {
    /// DID document timestamping
    Did,
    /// Verifiable credential timestamping
    Vc,
    /// Sharing configuration change
    Resource,
    /// Confirmed micropayment
    Payment,
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncType::Did => "did",
            SyncType::Vc => "vc",
            SyncType::Resource => "resource",
            SyncType::Payment => "payment",
        };
        write!(f, "{}", s)
    }
}

/// Job state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

/// Typed payload snapshot carried by a sync job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SyncPayload {
    Resource {
        shared_resource_id: u64,
        resource_type: String,
        resource_id: String,
        owner: String,
        is_active: bool,
        requires_payment: bool,
        price_satoshis: u64,
        shared_with_public: bool,
    },
    Payment {
        micropayment_id: u64,
        shared_resource_id: u64,
        amount_satoshis: u64,
        settlement_tx_hash: String,
    },
    Did {
        did: String,
        document_digest: String,
    },
    Vc {
        credential_id: String,
        credential_digest: String,
    },
}

/// An internal event meaning "this change should eventually reach the
/// overlay network". Produced by the registry and the ledger, consumed by
/// the supervisor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncIntent {
    pub sync_type: SyncType,
    pub reference_id: String,
    pub overlay_topic: String,
    pub payload: SyncPayload,
    pub user_id: UserId,
}

impl SyncIntent {
    pub fn new(
        sync_type: SyncType,
        reference_id: &str,
        overlay_topic: &str,
        payload: SyncPayload,
        user_id: UserId,
    ) -> Self {
        Self {
            sync_type,
            reference_id: reference_id.to_string(),
            overlay_topic: overlay_topic.to_string(),
            payload,
            user_id,
        }
    }

    /// Intent for timestamping a DID document
    pub fn did(did: &str, document_digest: &str, topic: &str, user_id: UserId) -> Self {
        Self::new(
            SyncType::Did,
            did,
            topic,
            SyncPayload::Did {
                did: did.to_string(),
                document_digest: document_digest.to_string(),
            },
            user_id,
        )
    }

    /// Intent for timestamping a verifiable credential
    pub fn vc(credential_id: &str, credential_digest: &str, topic: &str, user_id: UserId) -> Self {
        Self::new(
            SyncType::Vc,
            credential_id,
            topic,
            SyncPayload::Vc {
                credential_id: credential_id.to_string(),
                credential_digest: credential_digest.to_string(),
            },
            user_id,
        )
    }
}

/// One propagation job. Never deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OverlaySync {
    id: u64,
    sync_type: SyncType,
    reference_id: String,
    overlay_topic: String,
    /// Broadcast transaction hash, present once synced
    tx_hash: Option<String>,
    sync_status: SyncStatus,
    /// Payload snapshot (postcard-encoded SyncPayload)
    sync_data: Vec<u8>,
    /// Hex SHA-256 of sync_data
    payload_digest: String,
    last_sync_at: Option<DateTime<Utc>>,
    /// Earliest time the next delivery attempt may run
    next_attempt_at: DateTime<Utc>,
    retry_count: u32,
    last_error: Option<String>,
    user_id: UserId,
    created_at: DateTime<Utc>,
}

impl OverlaySync {
    pub(crate) fn from_intent(id: u64, intent: SyncIntent, now: DateTime<Utc>) -> Self {
        let sync_data = postcard::to_allocvec(&intent.payload).unwrap_or_default();
        let payload_digest = hex::encode(Sha256::digest(&sync_data));

        Self {
            id,
            sync_type: intent.sync_type,
            reference_id: intent.reference_id,
            overlay_topic: intent.overlay_topic,
            tx_hash: None,
            sync_status: SyncStatus::Pending,
            sync_data,
            payload_digest,
            last_sync_at: None,
            next_attempt_at: now,
            retry_count: 0,
            last_error: None,
            user_id: intent.user_id,
            created_at: now,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sync_type(&self) -> SyncType {
        self.sync_type
    }

    pub fn reference_id(&self) -> &str {
        &self.reference_id
    }

    pub fn overlay_topic(&self) -> &str {
        &self.overlay_topic
    }

    pub fn tx_hash(&self) -> Option<&str> {
        self.tx_hash.as_deref()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    pub fn sync_data(&self) -> &[u8] {
        &self.sync_data
    }

    pub fn payload_digest(&self) -> &str {
        &self.payload_digest
    }

    /// Decode the payload snapshot
    pub fn payload(&self) -> Option<SyncPayload> {
        postcard::from_bytes(&self.sync_data).ok()
    }

    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.last_sync_at
    }

    pub fn next_attempt_at(&self) -> DateTime<Utc> {
        self.next_attempt_at
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether this job is due for a delivery attempt
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.sync_status == SyncStatus::Pending && self.next_attempt_at <= now
    }

    pub(crate) fn mark_synced(&mut self, tx_hash: String, now: DateTime<Utc>) {
        self.sync_status = SyncStatus::Synced;
        self.tx_hash = Some(tx_hash);
        self.last_sync_at = Some(now);
        self.last_error = None;
    }

    pub(crate) fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.sync_status = SyncStatus::Failed;
        self.last_error = Some(error);
        self.last_sync_at = Some(now);
    }

    pub(crate) fn record_transient_failure(
        &mut self,
        error: String,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.retry_count += 1;
        self.last_error = Some(error);
        self.last_sync_at = Some(now);
        self.next_attempt_at = next_attempt_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_from_intent() {
        let now = Utc::now();
        let intent = SyncIntent::did("did:example:alice", "abc123", "tm_did", UserId::from("alice"));
        let job = OverlaySync::from_intent(7, intent, now);

        assert_eq!(job.id(), 7);
        assert_eq!(job.sync_type(), SyncType::Did);
        assert_eq!(job.sync_status(), SyncStatus::Pending);
        assert_eq!(job.retry_count(), 0);
        assert!(job.tx_hash().is_none());
        assert!(job.is_due(now));
        assert_eq!(job.payload_digest().len(), 64);
    }

    #[test]
    fn test_payload_snapshot_roundtrip() {
        let now = Utc::now();
        let intent = SyncIntent::vc("vc-1", "deadbeef", "tm_attest", UserId::from("alice"));
        let job = OverlaySync::from_intent(1, intent, now);

        match job.payload() {
            Some(SyncPayload::Vc { credential_id, .. }) => assert_eq!(credential_id, "vc-1"),
            other => panic!("Unexpected payload: {:?}", other),
        }
    }
}
