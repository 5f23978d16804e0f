// Micropayment - one settlement attempt against one SharedResource

use crate::identity::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Settlement state of a micropayment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One settlement attempt. Records are never deleted; failed and confirmed
/// rows both stay for the audit trail.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Micropayment {
    id: u64,
    shared_resource_id: u64,
    buyer_user_id: UserId,
    /// Owner of the resource at the time of creation, copied for audit
    /// stability even if the sharing row later changes hands
    seller_user_id: UserId,
    amount_satoshis: u64,
    /// External settlement reference; globally unique
    tx_hash: String,
    payment_status: PaymentStatus,
    access_granted: bool,
    access_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
}

impl Micropayment {
    pub(crate) fn new(
        id: u64,
        shared_resource_id: u64,
        buyer_user_id: UserId,
        seller_user_id: UserId,
        amount_satoshis: u64,
        tx_hash: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            shared_resource_id,
            buyer_user_id,
            seller_user_id,
            amount_satoshis,
            tx_hash,
            payment_status: PaymentStatus::Pending,
            access_granted: false,
            access_expires_at: None,
            created_at: now,
            confirmed_at: None,
            failed_at: None,
            failure_reason: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn shared_resource_id(&self) -> u64 {
        self.shared_resource_id
    }

    pub fn buyer_user_id(&self) -> &UserId {
        &self.buyer_user_id
    }

    pub fn seller_user_id(&self) -> &UserId {
        &self.seller_user_id
    }

    pub fn amount_satoshis(&self) -> u64 {
        self.amount_satoshis
    }

    pub fn tx_hash(&self) -> &str {
        &self.tx_hash
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn access_granted(&self) -> bool {
        self.access_granted
    }

    pub fn access_expires_at(&self) -> Option<DateTime<Utc>> {
        self.access_expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn failed_at(&self) -> Option<DateTime<Utc>> {
        self.failed_at
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Whether this payment grants `buyer` access at time `now`
    pub fn grants_access_at(&self, buyer: &UserId, now: DateTime<Utc>) -> bool {
        self.access_granted
            && &self.buyer_user_id == buyer
            && match self.access_expires_at {
                Some(expiry) => expiry > now,
                None => true,
            }
    }

    /// Flip to confirmed and grant access. Called exactly once per payment,
    /// inside the same critical section that bumps the parent counters.
    pub(crate) fn mark_confirmed(
        &mut self,
        access_expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        self.payment_status = PaymentStatus::Confirmed;
        self.confirmed_at = Some(now);
        self.access_granted = true;
        self.access_expires_at = access_expires_at;
    }

    /// Terminal failure; never grants access, never bumps counters.
    pub(crate) fn mark_failed(&mut self, reason: String, now: DateTime<Utc>) {
        self.payment_status = PaymentStatus::Failed;
        self.failed_at = Some(now);
        self.failure_reason = Some(reason);
    }
}
