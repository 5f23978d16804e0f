// Sharing Registry - owns SharedResource records
//
// Source of truth for sharing configurations. Ownership checks and exchange
// rates come from injected collaborators so the registry itself is pure
// data and snapshots cleanly.

use crate::identity::UserId;
use crate::overlay::{SyncIntent, SyncPayload, SyncType};
use crate::pricing::{
    to_satoshis, Currency, CurrencyPair, ExchangeRateSource, PricingError,
};
use crate::sharing::lookup::ResourceOwnershipLookup;
use crate::sharing::model::{ResourceType, SharedResource};
use crate::sharing::policy::{PolicyError, ShareRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Resource not found or not owned by caller: {resource_type} {resource_id}")]
    ResourceNotFound {
        resource_type: ResourceType,
        resource_id: String,
    },

    #[error("Sharing configuration not found: {0}")]
    SharingNotFound(u64),

    #[error("Not the owner of this sharing configuration")]
    NotOwner,

    #[error("Invalid policy: {0}")]
    InvalidPolicy(#[from] PolicyError),

    #[error("Price conversion failed: {0}")]
    Pricing(#[from] PricingError),

    #[error("Counter overflow on shared resource {0}")]
    CounterOverflow(u64),

    #[error("State export/import error: {0}")]
    StateError(String),
}

/// Counters over registry operations
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegistryStats {
    pub shares_created: u64,
    pub shares_updated: u64,
    pub shares_deactivated: u64,
}

/// Registry of sharing configurations
#[derive(Serialize, Deserialize)]
pub struct SharingRegistry {
    records: BTreeMap<u64, SharedResource>,
    /// (type, resource id, owner) -> active record id
    #[serde(skip)]
    active_index: HashMap<(ResourceType, String, UserId), u64>,
    next_id: u64,
    /// Sync intents awaiting pickup by the supervisor
    intents: Vec<SyncIntent>,
    stats: RegistryStats,
}

impl Default for SharingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SharingRegistry {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            active_index: HashMap::new(),
            next_id: 1,
            intents: Vec::new(),
            stats: RegistryStats::default(),
        }
    }

    /// Create or update the sharing configuration for one resource.
    ///
    /// Reconfiguring an already-active (type, id, owner) tuple updates that
    /// record in place, preserving its identity and counters; there is never
    /// more than one active configuration per tuple.
    pub fn configure(
        &mut self,
        lookup: &dyn ResourceOwnershipLookup,
        rates: &dyn ExchangeRateSource,
        owner: &UserId,
        request: ShareRequest,
        now: DateTime<Utc>,
    ) -> Result<SharedResource, RegistryError> {
        request.validate(now)?;

        if !lookup.exists(request.resource_type, &request.resource_id, owner) {
            return Err(RegistryError::ResourceNotFound {
                resource_type: request.resource_type,
                resource_id: request.resource_id,
            });
        }

        let (price_per_access, price_currency, price_satoshis) = if request.requires_payment {
            let (amount, currency) = request.price.ok_or(PolicyError::MissingPrice)?;
            let rate = match currency {
                Currency::Usd => rates.current_rate(CurrencyPair::BsvUsd)?,
                Currency::Bsv | Currency::Sat => 0.0,
            };
            let satoshis = to_satoshis(amount, currency, rate)?;
            if satoshis == 0 {
                return Err(PolicyError::ZeroPrice.into());
            }
            (amount, currency, satoshis)
        } else {
            (0.0, Currency::Sat, 0)
        };

        // Public sharing always clears the specific recipient
        let shared_with_user_id = if request.shared_with_public {
            None
        } else {
            request.shared_with_user_id
        };

        let key = (request.resource_type, request.resource_id.clone(), owner.clone());
        let id = match self.active_index.get(&key) {
            Some(&id) => {
                let record = self
                    .records
                    .get_mut(&id)
                    .ok_or(RegistryError::SharingNotFound(id))?;
                record.reconfigure(
                    shared_with_user_id,
                    request.shared_with_public,
                    request.requires_payment,
                    price_per_access,
                    price_currency,
                    price_satoshis,
                    request.access_limit,
                    request.expiry_date,
                    request.overlay_topic,
                    request.policy,
                    now,
                );
                self.stats.shares_updated += 1;
                id
            }
            None => {
                let id = self.next_id;
                self.next_id += 1;

                let mut record = SharedResource::new(
                    id,
                    request.resource_type,
                    request.resource_id,
                    owner.clone(),
                    now,
                );
                record.reconfigure(
                    shared_with_user_id,
                    request.shared_with_public,
                    request.requires_payment,
                    price_per_access,
                    price_currency,
                    price_satoshis,
                    request.access_limit,
                    request.expiry_date,
                    request.overlay_topic,
                    request.policy,
                    now,
                );
                self.records.insert(id, record);
                self.active_index.insert(key, id);
                self.stats.shares_created += 1;
                id
            }
        };

        let record = self
            .records
            .get(&id)
            .ok_or(RegistryError::SharingNotFound(id))?
            .clone();

        self.emit_resource_intent(&record);
        info!(
            shared_resource_id = record.id(),
            resource_id = record.resource_id(),
            price_satoshis = record.price_satoshis(),
            "Sharing configured"
        );

        Ok(record)
    }

    /// Disable a sharing configuration. Idempotent; the row is kept.
    pub fn deactivate(
        &mut self,
        owner: &UserId,
        shared_resource_id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let record = self
            .records
            .get_mut(&shared_resource_id)
            .ok_or(RegistryError::SharingNotFound(shared_resource_id))?;

        if record.user_id() != owner {
            return Err(RegistryError::NotOwner);
        }

        if !record.is_active() {
            return Ok(());
        }

        record.set_inactive(now);
        let key = (
            record.resource_type(),
            record.resource_id().to_string(),
            record.user_id().clone(),
        );
        let record = record.clone();
        self.active_index.remove(&key);
        self.stats.shares_deactivated += 1;

        self.emit_resource_intent(&record);
        info!(shared_resource_id, "Sharing deactivated");

        Ok(())
    }

    /// Look up a sharing configuration by id
    pub fn get(&self, shared_resource_id: u64) -> Option<&SharedResource> {
        self.records.get(&shared_resource_id)
    }

    /// The active configuration for a (type, resource, owner) tuple, if any
    pub fn get_active(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        owner: &UserId,
    ) -> Option<&SharedResource> {
        let key = (resource_type, resource_id.to_string(), owner.clone());
        self.active_index.get(&key).and_then(|id| self.records.get(id))
    }

    /// Discovery listing: active rows visible to `caller`
    pub fn list_visible(&self, caller: Option<&UserId>) -> Vec<&SharedResource> {
        self.records
            .values()
            .filter(|r| r.visible_to(caller))
            .collect()
    }

    /// Number of sharing configurations (active and inactive)
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    /// Take all queued sync intents
    pub fn drain_intents(&mut self) -> Vec<SyncIntent> {
        std::mem::take(&mut self.intents)
    }

    /// Number of intents awaiting pickup
    pub fn pending_intents(&self) -> usize {
        self.intents.len()
    }

    /// Counter bump on behalf of the entitlement ledger: one access,
    /// `amount_satoshis` earned. Only the ledger calls this.
    pub(crate) fn record_access(
        &mut self,
        shared_resource_id: u64,
        amount_satoshis: u64,
    ) -> Result<(), RegistryError> {
        let record = self
            .records
            .get_mut(&shared_resource_id)
            .ok_or(RegistryError::SharingNotFound(shared_resource_id))?;

        record
            .apply_access(amount_satoshis)
            .ok_or(RegistryError::CounterOverflow(shared_resource_id))?;

        debug!(
            shared_resource_id,
            amount_satoshis,
            total_access_count = record.total_access_count(),
            "Access recorded"
        );
        Ok(())
    }

    fn emit_resource_intent(&mut self, record: &SharedResource) {
        let topic = match record.overlay_topic() {
            Some(t) => t.to_string(),
            None => return,
        };

        self.intents.push(SyncIntent::new(
            SyncType::Resource,
            &record.id().to_string(),
            &topic,
            SyncPayload::Resource {
                shared_resource_id: record.id(),
                resource_type: record.resource_type().to_string(),
                resource_id: record.resource_id().to_string(),
                owner: record.user_id().to_string(),
                is_active: record.is_active(),
                requires_payment: record.requires_payment(),
                price_satoshis: record.price_satoshis(),
                shared_with_public: record.shared_with_public(),
            },
            record.user_id().clone(),
        ));
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        postcard::to_allocvec(self).unwrap_or_default()
    }

    /// Deserialize from bytes, rebuilding the active index
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RegistryError> {
        let mut registry: SharingRegistry = postcard::from_bytes(bytes)
            .map_err(|e| RegistryError::StateError(e.to_string()))?;
        registry.rebuild_index();
        Ok(registry)
    }

    fn rebuild_index(&mut self) {
        self.active_index.clear();
        for (id, record) in &self.records {
            if record.is_active() {
                self.active_index.insert(
                    (
                        record.resource_type(),
                        record.resource_id().to_string(),
                        record.user_id().clone(),
                    ),
                    *id,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::FixedRateSource;
    use crate::sharing::lookup::StaticOwnershipLookup;

    fn setup() -> (SharingRegistry, StaticOwnershipLookup, FixedRateSource, UserId) {
        let alice = UserId::from("alice");
        let lookup =
            StaticOwnershipLookup::new().with_entry(ResourceType::PodResource, "pod/a", &alice);
        (SharingRegistry::new(), lookup, FixedRateSource::new(50.0), alice)
    }

    #[test]
    fn test_configure_upsert_preserves_counters() {
        let (mut registry, lookup, rates, alice) = setup();
        let now = Utc::now();

        let first = registry
            .configure(
                &lookup,
                &rates,
                &alice,
                ShareRequest::new(ResourceType::PodResource, "pod/a")
                    .with_public()
                    .with_price(1000.0, Currency::Sat),
                now,
            )
            .unwrap();

        registry.record_access(first.id(), 1000).unwrap();

        let second = registry
            .configure(
                &lookup,
                &rates,
                &alice,
                ShareRequest::new(ResourceType::PodResource, "pod/a")
                    .with_public()
                    .with_price(2000.0, Currency::Sat),
                now,
            )
            .unwrap();

        assert_eq!(second.id(), first.id());
        assert_eq!(second.price_satoshis(), 2000);
        assert_eq!(second.total_access_count(), 1);
        assert_eq!(second.total_earnings_satoshis(), 1000);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_state_roundtrip_rebuilds_index() {
        let (mut registry, lookup, rates, alice) = setup();
        let now = Utc::now();

        registry
            .configure(
                &lookup,
                &rates,
                &alice,
                ShareRequest::new(ResourceType::PodResource, "pod/a").with_public(),
                now,
            )
            .unwrap();

        let restored = SharingRegistry::from_bytes(&registry.to_bytes()).unwrap();
        assert!(restored
            .get_active(ResourceType::PodResource, "pod/a", &alice)
            .is_some());
    }
}
