// SharingEngine - wires the registry, ledger, and supervisor together
//
// Routing rule: every successful configure/deactivate/confirm drains the
// producing component's sync intents into the supervisor queue. Sync is
// best-effort relative to the triggering action; a failed broadcast never
// rolls back a sharing configuration or a payment.

use crate::identity::UserId;
use crate::ledger::{EntitlementLedger, LedgerError, Micropayment};
use crate::overlay::{OverlaySync, OverlayTransport, SyncConfig, SyncIntent, SyncSupervisor};
use crate::pricing::ExchangeRateSource;
use crate::sharing::{
    RegistryError, ResourceOwnershipLookup, ShareRequest, SharedResource, SharingRegistry,
};
use crate::storage::{ShareStore, StoreError};
use chrono::{DateTime, Utc};

/// The assembled engine. Single-owner: callers that share it across tasks
/// wrap it in a `tokio::sync::Mutex`.
pub struct SharingEngine {
    registry: SharingRegistry,
    ledger: EntitlementLedger,
    supervisor: SyncSupervisor,
    lookup: Box<dyn ResourceOwnershipLookup>,
    rates: Box<dyn ExchangeRateSource>,
    transport: Box<dyn OverlayTransport>,
}

impl SharingEngine {
    pub fn new(
        sync_config: SyncConfig,
        lookup: Box<dyn ResourceOwnershipLookup>,
        rates: Box<dyn ExchangeRateSource>,
        transport: Box<dyn OverlayTransport>,
    ) -> Self {
        Self {
            registry: SharingRegistry::new(),
            ledger: EntitlementLedger::new(),
            supervisor: SyncSupervisor::new(sync_config),
            lookup,
            rates,
            transport,
        }
    }

    // ========================================================================
    // SHARING
    // ========================================================================

    /// Create or update a sharing configuration
    pub fn configure_sharing(
        &mut self,
        owner: &UserId,
        request: ShareRequest,
        now: DateTime<Utc>,
    ) -> Result<SharedResource, RegistryError> {
        let record = self
            .registry
            .configure(&*self.lookup, &*self.rates, owner, request, now)?;
        self.route_intents(now);
        Ok(record)
    }

    /// Disable a sharing configuration (idempotent)
    pub fn disable_sharing(
        &mut self,
        owner: &UserId,
        shared_resource_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        self.registry.deactivate(owner, shared_resource_id, now)?;
        self.route_intents(now);
        Ok(())
    }

    pub fn shared_resource(&self, shared_resource_id: u64) -> Option<&SharedResource> {
        self.registry.get(shared_resource_id)
    }

    /// Discovery listing for a caller (None = anonymous)
    pub fn discover(&self, caller: Option<&UserId>) -> Vec<&SharedResource> {
        self.registry.list_visible(caller)
    }

    // ========================================================================
    // PAYMENTS
    // ========================================================================

    /// Record a buyer's payment attempt
    pub fn initiate_payment(
        &mut self,
        buyer: &UserId,
        shared_resource_id: u64,
        amount_satoshis: u64,
        tx_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Micropayment, LedgerError> {
        self.ledger
            .initiate_payment(&self.registry, buyer, shared_resource_id, amount_satoshis, tx_hash, now)
    }

    /// Apply an external settlement confirmation (idempotent per tx_hash)
    pub fn confirm_payment(
        &mut self,
        tx_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Micropayment, LedgerError> {
        let result = self.ledger.confirm_payment(&mut self.registry, tx_hash, now);
        self.route_intents(now);
        result
    }

    /// Record an external settlement failure (terminal)
    pub fn fail_payment(
        &mut self,
        tx_hash: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Micropayment, LedgerError> {
        self.ledger.fail_payment(tx_hash, reason, now)
    }

    pub fn payment_by_tx_hash(&self, tx_hash: &str) -> Option<&Micropayment> {
        self.ledger.get_by_tx_hash(tx_hash)
    }

    /// Whether `buyer` currently holds an entitlement to the resource
    pub fn has_active_access(
        &self,
        buyer: &UserId,
        shared_resource_id: u64,
        now: DateTime<Utc>,
    ) -> bool {
        self.ledger.has_active_access(buyer, shared_resource_id, now)
    }

    // ========================================================================
    // OVERLAY SYNC
    // ========================================================================

    /// Enqueue an attestation (DID/VC) sync intent from the host application
    pub fn enqueue_sync(&mut self, intent: SyncIntent, now: DateTime<Utc>) -> u64 {
        self.supervisor.enqueue(intent, now)
    }

    /// One scheduler pass: attempt delivery for every due sync job
    pub async fn sync_due(&mut self, now: DateTime<Utc>) -> usize {
        self.supervisor.run_due(&*self.transport, now).await
    }

    /// Inspect a sync job (clients poll this instead of a progress protocol)
    pub fn sync_status(&self, sync_id: u64) -> Option<&OverlaySync> {
        self.supervisor.get(sync_id)
    }

    pub fn pending_sync_count(&self) -> usize {
        self.supervisor.pending_count()
    }

    // Read-only component access for the notification/UI layer
    pub fn registry(&self) -> &SharingRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &EntitlementLedger {
        &self.ledger
    }

    pub fn supervisor(&self) -> &SyncSupervisor {
        &self.supervisor
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    /// Snapshot all component state into a store
    pub fn save_to(&self, store: &ShareStore) -> Result<(), StoreError> {
        store.save_registry(&self.registry)?;
        store.save_ledger(&self.ledger)?;
        store.save_supervisor(&self.supervisor)?;
        store.flush()
    }

    /// Restore component state from a store; missing snapshots keep the
    /// current (usually empty) state
    pub fn load_from(&mut self, store: &ShareStore) -> Result<(), StoreError> {
        if let Some(registry) = store.load_registry()? {
            self.registry = registry;
        }
        if let Some(ledger) = store.load_ledger()? {
            self.ledger = ledger;
        }
        if let Some(supervisor) = store.load_supervisor()? {
            self.supervisor = supervisor;
        }
        Ok(())
    }

    fn route_intents(&mut self, now: DateTime<Utc>) {
        for intent in self.registry.drain_intents() {
            self.supervisor.enqueue(intent, now);
        }
        for intent in self.ledger.drain_intents() {
            self.supervisor.enqueue(intent, now);
        }
    }
}
