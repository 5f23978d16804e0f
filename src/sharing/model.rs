// SharedResource - one sharing configuration for one underlying resource

use crate::identity::UserId;
use crate::pricing::Currency;
use crate::sharing::policy::AccessPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of underlying resource a sharing configuration points at
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    /// A file or container in a SOLID pod
    PodResource,
    /// A knowledge/context entry
    ContextEntry,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceType::PodResource => "pod_resource",
            ResourceType::ContextEntry => "context_entry",
        };
        write!(f, "{}", s)
    }
}

/// A sharing configuration for exactly one underlying resource.
///
/// Counters are owned by the entitlement ledger; everything else reads them.
/// Rows are deactivated, never deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SharedResource {
    id: u64,
    resource_type: ResourceType,
    /// Foreign reference into the pod / context store; not owned here
    resource_id: String,
    /// Owner of the sharing configuration
    user_id: UserId,
    shared_with_user_id: Option<UserId>,
    shared_with_public: bool,
    requires_payment: bool,
    /// Display price as quoted by the owner
    price_per_access: f64,
    price_currency: Currency,
    /// Settlement price, derived from the display price at write time
    price_satoshis: u64,
    access_limit: Option<u32>,
    expiry_date: Option<DateTime<Utc>>,
    total_access_count: u64,
    total_earnings_satoshis: u64,
    is_active: bool,
    overlay_topic: Option<String>,
    access_policy: AccessPolicy,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SharedResource {
    pub(crate) fn new(
        id: u64,
        resource_type: ResourceType,
        resource_id: String,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            resource_type,
            resource_id,
            user_id,
            shared_with_user_id: None,
            shared_with_public: false,
            requires_payment: false,
            price_per_access: 0.0,
            price_currency: Currency::Sat,
            price_satoshis: 0,
            access_limit: None,
            expiry_date: None,
            total_access_count: 0,
            total_earnings_satoshis: 0,
            is_active: true,
            overlay_topic: None,
            access_policy: AccessPolicy::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn shared_with_user_id(&self) -> Option<&UserId> {
        self.shared_with_user_id.as_ref()
    }

    pub fn shared_with_public(&self) -> bool {
        self.shared_with_public
    }

    pub fn requires_payment(&self) -> bool {
        self.requires_payment
    }

    pub fn price_per_access(&self) -> f64 {
        self.price_per_access
    }

    pub fn price_currency(&self) -> Currency {
        self.price_currency
    }

    pub fn price_satoshis(&self) -> u64 {
        self.price_satoshis
    }

    pub fn access_limit(&self) -> Option<u32> {
        self.access_limit
    }

    pub fn expiry_date(&self) -> Option<DateTime<Utc>> {
        self.expiry_date
    }

    pub fn total_access_count(&self) -> u64 {
        self.total_access_count
    }

    pub fn total_earnings_satoshis(&self) -> u64 {
        self.total_earnings_satoshis
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn overlay_topic(&self) -> Option<&str> {
        self.overlay_topic.as_deref()
    }

    pub fn access_policy(&self) -> &AccessPolicy {
        &self.access_policy
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the configuration has passed its expiry date
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiry_date, Some(expiry) if expiry <= now)
    }

    /// Whether `caller` may see this row in discovery listings
    pub fn visible_to(&self, caller: Option<&UserId>) -> bool {
        if !self.is_active {
            return false;
        }
        if self.shared_with_public {
            return true;
        }
        match caller {
            Some(c) => Some(c) == self.shared_with_user_id.as_ref() || c == &self.user_id,
            None => false,
        }
    }

    /// Apply a reconfiguration, preserving identity and counters
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn reconfigure(
        &mut self,
        shared_with_user_id: Option<UserId>,
        shared_with_public: bool,
        requires_payment: bool,
        price_per_access: f64,
        price_currency: Currency,
        price_satoshis: u64,
        access_limit: Option<u32>,
        expiry_date: Option<DateTime<Utc>>,
        overlay_topic: Option<String>,
        access_policy: AccessPolicy,
        now: DateTime<Utc>,
    ) {
        self.shared_with_user_id = shared_with_user_id;
        self.shared_with_public = shared_with_public;
        self.requires_payment = requires_payment;
        self.price_per_access = price_per_access;
        self.price_currency = price_currency;
        self.price_satoshis = price_satoshis;
        self.access_limit = access_limit;
        self.expiry_date = expiry_date;
        self.overlay_topic = overlay_topic;
        self.access_policy = access_policy;
        self.updated_at = now;
    }

    pub(crate) fn set_inactive(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }

    /// Checked counter bump: one access, `amount_satoshis` earned.
    /// Counters only ever move forward.
    pub(crate) fn apply_access(&mut self, amount_satoshis: u64) -> Option<()> {
        let count = self.total_access_count.checked_add(1)?;
        let earnings = self.total_earnings_satoshis.checked_add(amount_satoshis)?;
        self.total_access_count = count;
        self.total_earnings_satoshis = earnings;
        Some(())
    }
}
