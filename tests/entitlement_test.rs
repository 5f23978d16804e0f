// Entitlement Ledger Tests
// Payment lifecycle, grant idempotency, counter consistency, access limits

use chrono::{Duration, Utc};
use podshare::identity::UserId;
use podshare::ledger::{EntitlementLedger, LedgerError, PaymentStatus};
use podshare::pricing::{Currency, FixedRateSource};
use podshare::sharing::{
    AccessPolicy, ResourceType, ShareRequest, SharingRegistry, StaticOwnershipLookup,
};

// ============================================================================
// HELPERS
// ============================================================================

fn alice() -> UserId {
    UserId::from("alice")
}

fn bob() -> UserId {
    UserId::from("bob")
}

struct Fixture {
    registry: SharingRegistry,
    ledger: EntitlementLedger,
    resource_id: u64,
}

fn fixture(request: ShareRequest) -> Fixture {
    let lookup = StaticOwnershipLookup::new()
        .with_entry(ResourceType::PodResource, "pod/notes.ttl", &alice())
        .with_entry(ResourceType::ContextEntry, "entry-42", &alice());
    let rates = FixedRateSource::new(50.0);
    let mut registry = SharingRegistry::new();
    let record = registry
        .configure(&lookup, &rates, &alice(), request, Utc::now())
        .unwrap();
    registry.drain_intents();

    Fixture {
        registry,
        ledger: EntitlementLedger::new(),
        resource_id: record.id(),
    }
}

fn paid_share() -> ShareRequest {
    ShareRequest::new(ResourceType::PodResource, "pod/notes.ttl")
        .with_public()
        .with_price(20_000.0, Currency::Sat)
}

// ============================================================================
// INITIATE
// ============================================================================

#[test]
fn test_initiate_creates_pending() {
    let mut f = fixture(paid_share());
    let now = Utc::now();

    let payment = f
        .ledger
        .initiate_payment(&f.registry, &bob(), f.resource_id, 20_000, "tx-1", now)
        .unwrap();

    assert_eq!(payment.payment_status(), PaymentStatus::Pending);
    assert!(!payment.access_granted());
    assert_eq!(payment.seller_user_id(), &alice());
    assert_eq!(payment.amount_satoshis(), 20_000);
}

#[test]
fn test_initiate_rejects_underpayment() {
    let mut f = fixture(paid_share());

    let err = f
        .ledger
        .initiate_payment(&f.registry, &bob(), f.resource_id, 19_999, "tx-1", Utc::now())
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::AmountTooLow { required: 20_000, provided: 19_999 }
    ));
}

#[test]
fn test_initiate_rejects_inactive_resource() {
    let mut f = fixture(paid_share());
    let now = Utc::now();
    f.registry.deactivate(&alice(), f.resource_id, now).unwrap();

    let err = f
        .ledger
        .initiate_payment(&f.registry, &bob(), f.resource_id, 20_000, "tx-1", now)
        .unwrap_err();
    assert!(matches!(err, LedgerError::ResourceInactive));
}

#[test]
fn test_initiate_rejects_expired_resource() {
    let now = Utc::now();
    let mut f = fixture(paid_share().with_expiry(now + Duration::hours(1)));

    let err = f
        .ledger
        .initiate_payment(
            &f.registry,
            &bob(),
            f.resource_id,
            20_000,
            "tx-1",
            now + Duration::hours(2),
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::ResourceExpired));
}

#[test]
fn test_initiate_rejects_unknown_resource() {
    let mut f = fixture(paid_share());

    let err = f
        .ledger
        .initiate_payment(&f.registry, &bob(), 999, 20_000, "tx-1", Utc::now())
        .unwrap_err();
    assert!(matches!(err, LedgerError::ResourceNotFound(999)));
}

#[test]
fn test_initiate_rejects_duplicate_tx_hash() {
    let mut f = fixture(paid_share());
    let now = Utc::now();

    f.ledger
        .initiate_payment(&f.registry, &bob(), f.resource_id, 20_000, "tx-1", now)
        .unwrap();
    let err = f
        .ledger
        .initiate_payment(&f.registry, &UserId::from("carol"), f.resource_id, 20_000, "tx-1", now)
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateTxHash(_)));
}

// ============================================================================
// CONFIRM
// ============================================================================

#[test]
fn test_confirm_grants_access_and_bumps_counters() {
    let mut f = fixture(paid_share());
    let now = Utc::now();

    f.ledger
        .initiate_payment(&f.registry, &bob(), f.resource_id, 20_000, "tx-1", now)
        .unwrap();
    let payment = f
        .ledger
        .confirm_payment(&mut f.registry, "tx-1", now)
        .unwrap();

    assert_eq!(payment.payment_status(), PaymentStatus::Confirmed);
    assert!(payment.access_granted());
    assert_eq!(payment.confirmed_at(), Some(now));

    let resource = f.registry.get(f.resource_id).unwrap();
    assert_eq!(resource.total_access_count(), 1);
    assert_eq!(resource.total_earnings_satoshis(), 20_000);
}

#[test]
fn test_confirm_twice_increments_once() {
    let mut f = fixture(paid_share());
    let now = Utc::now();

    f.ledger
        .initiate_payment(&f.registry, &bob(), f.resource_id, 20_000, "tx-1", now)
        .unwrap();
    let first = f.ledger.confirm_payment(&mut f.registry, "tx-1", now).unwrap();
    let second = f
        .ledger
        .confirm_payment(&mut f.registry, "tx-1", now + Duration::seconds(30))
        .unwrap();

    // Same record state, single counter increment
    assert_eq!(first.confirmed_at(), second.confirmed_at());
    assert_eq!(first.access_expires_at(), second.access_expires_at());
    assert_eq!(f.registry.get(f.resource_id).unwrap().total_access_count(), 1);
    assert_eq!(f.ledger.stats().payments_confirmed, 1);
}

#[test]
fn test_confirm_unknown_tx_hash() {
    let mut f = fixture(paid_share());

    let err = f
        .ledger
        .confirm_payment(&mut f.registry, "tx-nope", Utc::now())
        .unwrap_err();
    assert!(matches!(err, LedgerError::PaymentNotFound(_)));
}

#[test]
fn test_confirm_applies_policy_expiry() {
    let mut f = fixture(
        paid_share().with_policy(AccessPolicy::new().with_access_duration_secs(3600)),
    );
    let now = Utc::now();

    f.ledger
        .initiate_payment(&f.registry, &bob(), f.resource_id, 20_000, "tx-1", now)
        .unwrap();
    let payment = f.ledger.confirm_payment(&mut f.registry, "tx-1", now).unwrap();

    assert_eq!(payment.access_expires_at(), Some(now + Duration::hours(1)));
}

// ============================================================================
// ACCESS LIMIT
// ============================================================================

#[test]
fn test_access_limit_soft_check_at_initiate() {
    let mut f = fixture(paid_share().with_access_limit(1));
    let now = Utc::now();

    // Two buyers can both pass the soft gate while nothing is confirmed
    f.ledger
        .initiate_payment(&f.registry, &bob(), f.resource_id, 20_000, "tx-1", now)
        .unwrap();
    f.ledger
        .initiate_payment(&f.registry, &UserId::from("carol"), f.resource_id, 20_000, "tx-2", now)
        .unwrap();

    // Once one is granted, further initiations are rejected
    f.ledger.confirm_payment(&mut f.registry, "tx-1", now).unwrap();
    let err = f
        .ledger
        .initiate_payment(&f.registry, &UserId::from("dave"), f.resource_id, 20_000, "tx-3", now)
        .unwrap_err();
    assert!(matches!(err, LedgerError::AccessLimitReached));
}

#[test]
fn test_access_limit_hard_check_at_confirm() {
    let mut f = fixture(paid_share().with_access_limit(1));
    let now = Utc::now();

    f.ledger
        .initiate_payment(&f.registry, &bob(), f.resource_id, 20_000, "tx-1", now)
        .unwrap();
    f.ledger
        .initiate_payment(&f.registry, &UserId::from("carol"), f.resource_id, 20_000, "tx-2", now)
        .unwrap();

    // Both passed the soft gate; exactly one confirmation wins
    f.ledger.confirm_payment(&mut f.registry, "tx-1", now).unwrap();
    let err = f
        .ledger
        .confirm_payment(&mut f.registry, "tx-2", now)
        .unwrap_err();
    assert!(matches!(err, LedgerError::AccessLimitReached));

    let loser = f.ledger.get_by_tx_hash("tx-2").unwrap();
    assert_eq!(loser.payment_status(), PaymentStatus::Failed);
    assert!(!loser.access_granted());
    assert_eq!(loser.failure_reason(), Some("access limit reached"));
    assert_eq!(loser.failed_at(), Some(now));

    // Exactly one grant, exactly one counter increment
    assert_eq!(f.registry.get(f.resource_id).unwrap().total_access_count(), 1);
    assert_eq!(f.ledger.granted_count(f.resource_id), 1);
}

// ============================================================================
// FAIL
// ============================================================================

#[test]
fn test_fail_payment_is_terminal() {
    let mut f = fixture(paid_share());
    let now = Utc::now();

    f.ledger
        .initiate_payment(&f.registry, &bob(), f.resource_id, 20_000, "tx-1", now)
        .unwrap();
    let failed = f.ledger.fail_payment("tx-1", "broadcast rejected", now).unwrap();

    assert_eq!(failed.payment_status(), PaymentStatus::Failed);
    assert_eq!(failed.failure_reason(), Some("broadcast rejected"));
    assert_eq!(failed.failed_at(), Some(now));
    assert_eq!(f.registry.get(f.resource_id).unwrap().total_access_count(), 0);

    // Confirming a failed payment is a conflict
    let err = f
        .ledger
        .confirm_payment(&mut f.registry, "tx-1", now)
        .unwrap_err();
    assert!(matches!(err, LedgerError::PaymentAlreadyFailed));
}

#[test]
fn test_fail_confirmed_payment_rejected() {
    let mut f = fixture(paid_share());
    let now = Utc::now();

    f.ledger
        .initiate_payment(&f.registry, &bob(), f.resource_id, 20_000, "tx-1", now)
        .unwrap();
    f.ledger.confirm_payment(&mut f.registry, "tx-1", now).unwrap();

    let err = f.ledger.fail_payment("tx-1", "too late", now).unwrap_err();
    assert!(matches!(err, LedgerError::PaymentAlreadyConfirmed));
}

// ============================================================================
// ENTITLEMENT QUERIES
// ============================================================================

#[test]
fn test_has_active_access() {
    let mut f = fixture(
        paid_share().with_policy(AccessPolicy::new().with_access_duration_secs(3600)),
    );
    let now = Utc::now();

    assert!(!f.ledger.has_active_access(&bob(), f.resource_id, now));

    f.ledger
        .initiate_payment(&f.registry, &bob(), f.resource_id, 20_000, "tx-1", now)
        .unwrap();
    assert!(!f.ledger.has_active_access(&bob(), f.resource_id, now));

    f.ledger.confirm_payment(&mut f.registry, "tx-1", now).unwrap();
    assert!(f.ledger.has_active_access(&bob(), f.resource_id, now));
    assert!(!f.ledger.has_active_access(&UserId::from("carol"), f.resource_id, now));

    // Entitlement lapses with the policy duration
    assert!(!f
        .ledger
        .has_active_access(&bob(), f.resource_id, now + Duration::hours(2)));
}

#[test]
fn test_counter_equals_granted_rows() {
    let mut f = fixture(paid_share());
    let now = Utc::now();

    for i in 0..4 {
        let buyer = UserId::new(format!("buyer-{}", i));
        let tx = format!("tx-{}", i);
        f.ledger
            .initiate_payment(&f.registry, &buyer, f.resource_id, 20_000, &tx, now)
            .unwrap();
        f.ledger.confirm_payment(&mut f.registry, &tx, now).unwrap();
    }
    // One failed payment must not show up anywhere
    f.ledger
        .initiate_payment(&f.registry, &bob(), f.resource_id, 20_000, "tx-bad", now)
        .unwrap();
    f.ledger.fail_payment("tx-bad", "declined", now).unwrap();

    let resource = f.registry.get(f.resource_id).unwrap();
    assert_eq!(resource.total_access_count() as usize, f.ledger.granted_count(f.resource_id));
    assert_eq!(resource.total_access_count(), 4);
    assert_eq!(resource.total_earnings_satoshis(), 80_000);
}

#[test]
fn test_payment_queries() {
    let mut f = fixture(paid_share());
    let now = Utc::now();

    f.ledger
        .initiate_payment(&f.registry, &bob(), f.resource_id, 20_000, "tx-1", now)
        .unwrap();
    f.ledger
        .initiate_payment(&f.registry, &UserId::from("carol"), f.resource_id, 20_000, "tx-2", now)
        .unwrap();

    assert_eq!(f.ledger.payments_for_resource(f.resource_id).len(), 2);
    assert_eq!(f.ledger.payments_by_buyer(&bob()).len(), 1);
    assert_eq!(f.ledger.get_by_tx_hash("tx-2").unwrap().buyer_user_id(), &UserId::from("carol"));
}

// ============================================================================
// STATE SNAPSHOT
// ============================================================================

#[test]
fn test_ledger_state_roundtrip() {
    let mut f = fixture(paid_share());
    let now = Utc::now();

    f.ledger
        .initiate_payment(&f.registry, &bob(), f.resource_id, 20_000, "tx-1", now)
        .unwrap();
    f.ledger.confirm_payment(&mut f.registry, "tx-1", now).unwrap();

    let restored = EntitlementLedger::from_bytes(&f.ledger.to_bytes()).unwrap();

    // tx_hash index survives the round trip
    let payment = restored.get_by_tx_hash("tx-1").unwrap();
    assert_eq!(payment.payment_status(), PaymentStatus::Confirmed);
    assert_eq!(restored.granted_count(f.resource_id), 1);
}
