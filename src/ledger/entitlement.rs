// Entitlement Ledger - owns Micropayment records and the derived counters
// on SharedResource
//
// Invariants enforced here:
// - tx_hash settles at most one micropayment
// - access_granted flips false -> true exactly once, only on confirmation,
//   with exactly one counter increment on the parent
// - the access limit is re-checked inside the same critical section that
//   performs the increment; the initiate-time check is only a soft gate

use crate::identity::UserId;
use crate::ledger::model::{Micropayment, PaymentStatus};
use crate::overlay::{SyncIntent, SyncPayload, SyncType};
use crate::sharing::{RegistryError, SharingRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Shared resource not found: {0}")]
    ResourceNotFound(u64),

    #[error("Sharing is no longer active")]
    ResourceInactive,

    #[error("Sharing configuration has expired")]
    ResourceExpired,

    #[error("Access limit reached")]
    AccessLimitReached,

    #[error("Amount too low: required {required} satoshis, got {provided}")]
    AmountTooLow { required: u64, provided: u64 },

    #[error("Duplicate transaction hash: {0}")]
    DuplicateTxHash(String),

    #[error("No micropayment with transaction hash: {0}")]
    PaymentNotFound(String),

    #[error("Micropayment already failed; confirmation rejected")]
    PaymentAlreadyFailed,

    #[error("Micropayment already confirmed; cannot fail it")]
    PaymentAlreadyConfirmed,

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("State export/import error: {0}")]
    StateError(String),
}

/// Counters over ledger operations
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LedgerStats {
    pub payments_initiated: u64,
    pub payments_confirmed: u64,
    pub payments_failed: u64,
    pub total_settled_satoshis: u64,
}

/// The entitlement ledger
#[derive(Serialize, Deserialize)]
pub struct EntitlementLedger {
    payments: BTreeMap<u64, Micropayment>,
    /// tx_hash -> payment id
    #[serde(skip)]
    tx_index: HashMap<String, u64>,
    next_id: u64,
    /// Sync intents awaiting pickup by the supervisor
    intents: Vec<SyncIntent>,
    stats: LedgerStats,
}

impl Default for EntitlementLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl EntitlementLedger {
    pub fn new() -> Self {
        Self {
            payments: BTreeMap::new(),
            tx_index: HashMap::new(),
            next_id: 1,
            intents: Vec::new(),
            stats: LedgerStats::default(),
        }
    }

    /// Record a buyer's payment attempt as a pending micropayment.
    ///
    /// The access-limit check here is a soft gate: two buyers can both pass
    /// it before either confirms. The hard check happens in
    /// `confirm_payment`.
    pub fn initiate_payment(
        &mut self,
        registry: &SharingRegistry,
        buyer: &UserId,
        shared_resource_id: u64,
        amount_satoshis: u64,
        tx_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Micropayment, LedgerError> {
        let resource = registry
            .get(shared_resource_id)
            .ok_or(LedgerError::ResourceNotFound(shared_resource_id))?;

        if !resource.is_active() {
            return Err(LedgerError::ResourceInactive);
        }
        if resource.is_expired(now) {
            return Err(LedgerError::ResourceExpired);
        }
        if let Some(limit) = resource.access_limit() {
            if self.granted_count(shared_resource_id) >= limit as usize {
                return Err(LedgerError::AccessLimitReached);
            }
        }
        if amount_satoshis < resource.price_satoshis() {
            return Err(LedgerError::AmountTooLow {
                required: resource.price_satoshis(),
                provided: amount_satoshis,
            });
        }
        if self.tx_index.contains_key(tx_hash) {
            return Err(LedgerError::DuplicateTxHash(tx_hash.to_string()));
        }

        let id = self.next_id;
        self.next_id += 1;

        let payment = Micropayment::new(
            id,
            shared_resource_id,
            buyer.clone(),
            resource.user_id().clone(),
            amount_satoshis,
            tx_hash.to_string(),
            now,
        );
        self.payments.insert(id, payment.clone());
        self.tx_index.insert(tx_hash.to_string(), id);
        self.stats.payments_initiated += 1;

        debug!(
            micropayment_id = id,
            shared_resource_id, amount_satoshis, tx_hash, "Payment initiated"
        );
        Ok(payment)
    }

    /// Apply an external settlement confirmation.
    ///
    /// Idempotent: confirming an already-confirmed tx_hash returns the
    /// record unchanged with no second counter increment. The grant, the
    /// access-limit re-check, and the counter bump all happen inside this
    /// one `&mut self` critical section.
    pub fn confirm_payment(
        &mut self,
        registry: &mut SharingRegistry,
        tx_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Micropayment, LedgerError> {
        let id = *self
            .tx_index
            .get(tx_hash)
            .ok_or_else(|| LedgerError::PaymentNotFound(tx_hash.to_string()))?;

        let (shared_resource_id, status) = {
            let payment = self
                .payments
                .get(&id)
                .ok_or_else(|| LedgerError::PaymentNotFound(tx_hash.to_string()))?;
            (payment.shared_resource_id(), payment.payment_status())
        };

        match status {
            PaymentStatus::Confirmed => {
                // Duplicate confirmation collapses to a no-op
                let payment = self.payments[&id].clone();
                debug!(tx_hash, "Duplicate confirmation ignored");
                return Ok(payment);
            }
            PaymentStatus::Failed => return Err(LedgerError::PaymentAlreadyFailed),
            PaymentStatus::Pending => {}
        }

        let resource = registry
            .get(shared_resource_id)
            .ok_or(LedgerError::ResourceNotFound(shared_resource_id))?;

        // Hard limit enforcement: if the slots filled up while this payment
        // was in flight, the confirmation is rejected and the payment fails.
        if let Some(limit) = resource.access_limit() {
            if self.granted_count(shared_resource_id) >= limit as usize {
                if let Some(payment) = self.payments.get_mut(&id) {
                    payment.mark_failed("access limit reached".to_string(), now);
                }
                self.stats.payments_failed += 1;
                warn!(tx_hash, shared_resource_id, "Confirmation rejected: access limit reached");
                return Err(LedgerError::AccessLimitReached);
            }
        }

        let access_expires_at = resource.access_policy().grant_expiry(now);
        let overlay_topic = resource.overlay_topic().map(|t| t.to_string());
        let amount_satoshis = self.payments[&id].amount_satoshis();

        // Status flip and counter increment form one atomic unit; a counter
        // failure leaves the payment pending.
        registry.record_access(shared_resource_id, amount_satoshis)?;

        let payment = self
            .payments
            .get_mut(&id)
            .ok_or_else(|| LedgerError::PaymentNotFound(tx_hash.to_string()))?;
        payment.mark_confirmed(access_expires_at, now);
        let payment = payment.clone();

        self.stats.payments_confirmed += 1;
        self.stats.total_settled_satoshis = self
            .stats
            .total_settled_satoshis
            .saturating_add(amount_satoshis);

        if let Some(topic) = overlay_topic {
            self.intents.push(SyncIntent::new(
                SyncType::Payment,
                &payment.id().to_string(),
                &topic,
                SyncPayload::Payment {
                    micropayment_id: payment.id(),
                    shared_resource_id,
                    amount_satoshis,
                    settlement_tx_hash: tx_hash.to_string(),
                },
                payment.buyer_user_id().clone(),
            ));
        }

        info!(
            micropayment_id = payment.id(),
            shared_resource_id, amount_satoshis, tx_hash, "Payment confirmed, access granted"
        );
        Ok(payment)
    }

    /// Record an external settlement failure. Terminal; no counter effects.
    /// Idempotent on already-failed payments.
    pub fn fail_payment(
        &mut self,
        tx_hash: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Micropayment, LedgerError> {
        let id = *self
            .tx_index
            .get(tx_hash)
            .ok_or_else(|| LedgerError::PaymentNotFound(tx_hash.to_string()))?;

        let payment = self
            .payments
            .get_mut(&id)
            .ok_or_else(|| LedgerError::PaymentNotFound(tx_hash.to_string()))?;

        match payment.payment_status() {
            PaymentStatus::Confirmed => return Err(LedgerError::PaymentAlreadyConfirmed),
            PaymentStatus::Failed => return Ok(payment.clone()),
            PaymentStatus::Pending => {}
        }

        payment.mark_failed(reason.to_string(), now);
        let payment = payment.clone();
        self.stats.payments_failed += 1;

        info!(tx_hash, reason, "Payment failed");
        Ok(payment)
    }

    /// Whether `buyer` currently holds an entitlement to the resource
    pub fn has_active_access(
        &self,
        buyer: &UserId,
        shared_resource_id: u64,
        now: DateTime<Utc>,
    ) -> bool {
        self.payments
            .values()
            .filter(|p| p.shared_resource_id() == shared_resource_id)
            .any(|p| p.grants_access_at(buyer, now))
    }

    /// Number of granted entitlements for a resource (drives the limit check)
    pub fn granted_count(&self, shared_resource_id: u64) -> usize {
        self.payments
            .values()
            .filter(|p| p.shared_resource_id() == shared_resource_id && p.access_granted())
            .count()
    }

    pub fn get(&self, micropayment_id: u64) -> Option<&Micropayment> {
        self.payments.get(&micropayment_id)
    }

    pub fn get_by_tx_hash(&self, tx_hash: &str) -> Option<&Micropayment> {
        self.tx_index.get(tx_hash).and_then(|id| self.payments.get(id))
    }

    /// All payments against one resource, in creation order
    pub fn payments_for_resource(&self, shared_resource_id: u64) -> Vec<&Micropayment> {
        self.payments
            .values()
            .filter(|p| p.shared_resource_id() == shared_resource_id)
            .collect()
    }

    /// All payments made by one buyer, in creation order
    pub fn payments_by_buyer(&self, buyer: &UserId) -> Vec<&Micropayment> {
        self.payments
            .values()
            .filter(|p| p.buyer_user_id() == buyer)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }

    pub fn stats(&self) -> &LedgerStats {
        &self.stats
    }

    /// Take all queued sync intents
    pub fn drain_intents(&mut self) -> Vec<SyncIntent> {
        std::mem::take(&mut self.intents)
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        postcard::to_allocvec(self).unwrap_or_default()
    }

    /// Deserialize from bytes, rebuilding the tx_hash index
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LedgerError> {
        let mut ledger: EntitlementLedger =
            postcard::from_bytes(bytes).map_err(|e| LedgerError::StateError(e.to_string()))?;
        ledger.rebuild_index();
        Ok(ledger)
    }

    fn rebuild_index(&mut self) {
        self.tx_index.clear();
        for (id, payment) in &self.payments {
            self.tx_index.insert(payment.tx_hash().to_string(), *id);
        }
    }
}
