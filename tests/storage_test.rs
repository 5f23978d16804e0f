// Store Tests
// Tests for the sled key-value store wrapper and state snapshots

use chrono::Utc;
use podshare::identity::UserId;
use podshare::overlay::{SyncConfig, SyncIntent, SyncSupervisor};
use podshare::pricing::{Currency, FixedRateSource};
use podshare::sharing::{ResourceType, ShareRequest, SharingRegistry, StaticOwnershipLookup};
use podshare::storage::{ShareStore, StoreError};
use tempfile::TempDir;

// ============================================================================
// STORE CREATION AND BASIC OPERATIONS
// ============================================================================

#[test]
fn test_store_open_new() {
    let temp_dir = TempDir::new().unwrap();
    let store = ShareStore::open(temp_dir.path()).unwrap();

    assert!(store.is_empty().unwrap());
}

#[test]
fn test_store_put_get_raw() {
    let temp_dir = TempDir::new().unwrap();
    let store = ShareStore::open(temp_dir.path()).unwrap();

    store.put_raw(b"key1", b"value1").unwrap();
    store.put_raw(b"key2", b"value2").unwrap();

    assert_eq!(store.get_raw(b"key1").unwrap(), Some(b"value1".to_vec()));
    assert_eq!(store.get_raw(b"key2").unwrap(), Some(b"value2".to_vec()));
    assert_eq!(store.get_raw(b"nonexistent").unwrap(), None);
    assert!(!store.is_empty().unwrap());
}

#[test]
fn test_store_delete() {
    let temp_dir = TempDir::new().unwrap();
    let store = ShareStore::open(temp_dir.path()).unwrap();

    store.put_raw(b"key", b"value").unwrap();
    assert!(store.get_raw(b"key").unwrap().is_some());

    store.delete(b"key").unwrap();
    assert!(store.get_raw(b"key").unwrap().is_none());
}

#[test]
fn test_flush_persists_across_reopens() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = ShareStore::open(temp_dir.path()).unwrap();
        store.put_raw(b"key", b"value").unwrap();
        store.flush().unwrap();
    }

    {
        let store = ShareStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.get_raw(b"key").unwrap(), Some(b"value".to_vec()));
    }
}

// ============================================================================
// COMPONENT SNAPSHOTS
// ============================================================================

fn registry_with_share() -> SharingRegistry {
    let alice = UserId::from("alice");
    let lookup =
        StaticOwnershipLookup::new().with_entry(ResourceType::PodResource, "pod/notes.ttl", &alice);
    let rates = FixedRateSource::new(50.0);
    let mut registry = SharingRegistry::new();
    registry
        .configure(
            &lookup,
            &rates,
            &alice,
            ShareRequest::new(ResourceType::PodResource, "pod/notes.ttl")
                .with_public()
                .with_price(1000.0, Currency::Sat),
            Utc::now(),
        )
        .unwrap();
    registry
}

#[test]
fn test_registry_snapshot_across_reopens() {
    let temp_dir = TempDir::new().unwrap();
    let alice = UserId::from("alice");

    {
        let store = ShareStore::open(temp_dir.path()).unwrap();
        store.save_registry(&registry_with_share()).unwrap();
        store.flush().unwrap();
    }

    {
        let store = ShareStore::open(temp_dir.path()).unwrap();
        let loaded = store.load_registry().unwrap().unwrap();

        // Active index works after deserialization
        let record = loaded
            .get_active(ResourceType::PodResource, "pod/notes.ttl", &alice)
            .unwrap();
        assert_eq!(record.price_satoshis(), 1000);
    }
}

#[test]
fn test_supervisor_snapshot_across_reopens() {
    let temp_dir = TempDir::new().unwrap();
    let now = Utc::now();

    let id;
    {
        let mut supervisor = SyncSupervisor::new(SyncConfig::default());
        id = supervisor.enqueue(
            SyncIntent::did("did:example:alice", "0a1b", "tm_did", UserId::from("alice")),
            now,
        );
        let store = ShareStore::open(temp_dir.path()).unwrap();
        store.save_supervisor(&supervisor).unwrap();
        store.flush().unwrap();
    }

    {
        let store = ShareStore::open(temp_dir.path()).unwrap();
        let loaded = store.load_supervisor().unwrap().unwrap();
        assert!(loaded.get(id).unwrap().is_due(now));
        assert_eq!(loaded.pending_count(), 1);
    }
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[test]
fn test_corrupted_snapshot_returns_error() {
    let temp_dir = TempDir::new().unwrap();
    let store = ShareStore::open(temp_dir.path()).unwrap();

    // Write garbage where a registry snapshot should be
    store.put_raw(b"sharing:state", b"not_a_registry_snapshot").unwrap();

    let result = store.load_registry();
    assert!(matches!(result, Err(StoreError::DeserializationFailed(_))));
}

// ============================================================================
// STORAGE STATS
// ============================================================================

#[test]
fn test_storage_stats() {
    let temp_dir = TempDir::new().unwrap();
    let store = ShareStore::open(temp_dir.path()).unwrap();

    store.save_registry(&registry_with_share()).unwrap();
    store.flush().unwrap();

    let stats = store.stats().unwrap();
    assert!(stats.key_count > 0);
    assert!(stats.disk_size_bytes > 0);
}
