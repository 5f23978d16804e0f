// Access policy and share requests
//
// The access policy is a typed, schema-validated document. Downstream logic
// never branches on free-form JSON shapes; anything the engine needs to act
// on is a named field here.

use crate::identity::UserId;
use crate::pricing::Currency;
use crate::sharing::model::ResourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from validating a policy or share request
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Access duration must be greater than zero")]
    ZeroAccessDuration,

    #[error("Access limit must be greater than zero")]
    ZeroAccessLimit,

    #[error("Expiry date is in the past")]
    ExpiryInPast,

    #[error("Payment required but no price was given")]
    MissingPrice,

    #[error("Payment required but the price is zero")]
    ZeroPrice,
}

/// How long a granted entitlement lasts and anything else an owner attaches
/// to a share. `access_duration_secs = None` means grants never expire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub access_duration_secs: Option<u64>,
    pub description: Option<String>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants expire `secs` seconds after confirmation
    pub fn with_access_duration_secs(mut self, secs: u64) -> Self {
        self.access_duration_secs = Some(secs);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.access_duration_secs == Some(0) {
            return Err(PolicyError::ZeroAccessDuration);
        }
        Ok(())
    }

    /// Expiry of a grant confirmed at `confirmed_at`; None = unlimited
    pub fn grant_expiry(&self, confirmed_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.access_duration_secs
            .map(|secs| confirmed_at + chrono::Duration::seconds(secs as i64))
    }
}

/// A request to expose (or re-expose) one resource
#[derive(Clone, Debug)]
pub struct ShareRequest {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub shared_with_public: bool,
    pub shared_with_user_id: Option<UserId>,
    pub requires_payment: bool,
    /// Display price; converted to satoshis at write time
    pub price: Option<(f64, Currency)>,
    pub access_limit: Option<u32>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub overlay_topic: Option<String>,
    pub policy: AccessPolicy,
}

impl ShareRequest {
    pub fn new(resource_type: ResourceType, resource_id: &str) -> Self {
        Self {
            resource_type,
            resource_id: resource_id.to_string(),
            shared_with_public: false,
            shared_with_user_id: None,
            requires_payment: false,
            price: None,
            access_limit: None,
            expiry_date: None,
            overlay_topic: None,
            policy: AccessPolicy::default(),
        }
    }

    /// Share with everyone. Public sharing always clears any specific
    /// recipient at configure time.
    pub fn with_public(mut self) -> Self {
        self.shared_with_public = true;
        self
    }

    /// Share with one specific user
    pub fn shared_with(mut self, user: UserId) -> Self {
        self.shared_with_user_id = Some(user);
        self
    }

    /// Require payment at the given display price
    pub fn with_price(mut self, amount: f64, currency: Currency) -> Self {
        self.requires_payment = true;
        self.price = Some((amount, currency));
        self
    }

    pub fn with_access_limit(mut self, limit: u32) -> Self {
        self.access_limit = Some(limit);
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry_date = Some(expiry);
        self
    }

    pub fn with_topic(mut self, topic: &str) -> Self {
        self.overlay_topic = Some(topic.to_string());
        self
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validate request shape (everything that needs no collaborator)
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), PolicyError> {
        self.policy.validate()?;

        if self.access_limit == Some(0) {
            return Err(PolicyError::ZeroAccessLimit);
        }

        if let Some(expiry) = self.expiry_date {
            if expiry <= now {
                return Err(PolicyError::ExpiryInPast);
            }
        }

        if self.requires_payment && self.price.is_none() {
            return Err(PolicyError::MissingPrice);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_grant_expiry() {
        let now = Utc::now();

        let unlimited = AccessPolicy::new();
        assert_eq!(unlimited.grant_expiry(now), None);

        let timed = AccessPolicy::new().with_access_duration_secs(3600);
        assert_eq!(timed.grant_expiry(now), Some(now + chrono::Duration::hours(1)));
    }

    #[test]
    fn test_policy_zero_duration_invalid() {
        let policy = AccessPolicy::new().with_access_duration_secs(0);
        assert!(matches!(policy.validate(), Err(PolicyError::ZeroAccessDuration)));
    }

    #[test]
    fn test_request_requires_payment_needs_price() {
        let now = Utc::now();
        let mut request = ShareRequest::new(ResourceType::PodResource, "pod/a");
        request.requires_payment = true;

        assert!(matches!(request.validate(now), Err(PolicyError::MissingPrice)));
    }

    #[test]
    fn test_request_expiry_in_past() {
        let now = Utc::now();
        let request = ShareRequest::new(ResourceType::PodResource, "pod/a")
            .with_expiry(now - chrono::Duration::seconds(1));

        assert!(matches!(request.validate(now), Err(PolicyError::ExpiryInPast)));
    }

    #[test]
    fn test_request_zero_access_limit() {
        let now = Utc::now();
        let request = ShareRequest::new(ResourceType::PodResource, "pod/a").with_access_limit(0);

        assert!(matches!(request.validate(now), Err(PolicyError::ZeroAccessLimit)));
    }
}
