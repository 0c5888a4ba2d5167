//! Integration tests for cache instances sharing a remote backend
//!
//! Every test connects its own `memory://` keyspace, so tests can run in parallel.

use keystash::remote::MemoryRemote;
use keystash::{BackendRegistry, Cache, CacheError, StorageKind, StorageOptions};
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// A cache on its own registry, connected to the keyspace `keyspace`.
fn remote_cache(key: &str, keyspace: &str) -> Cache {
    let registry = BackendRegistry::new();
    registry.configure_remote(Arc::new(MemoryRemote::connect(keyspace)));
    Cache::with_registry(key, Arc::new(registry))
}

#[test]
fn test_same_key_shares_every_kind() {
    let a = remote_cache("fleet", "remote-share-kinds");
    let b = remote_cache("fleet", "remote-share-kinds");
    for kind in StorageKind::ALL {
        a.init(kind.as_str(), kind).unwrap();
        b.init(kind.as_str(), kind).unwrap();
    }

    a.sequence("sequence").unwrap().unwrap().push(json!({"n": 1})).unwrap();
    a.mapping("mapping").unwrap().unwrap().insert("f", json!("x")).unwrap();
    a.value("value").unwrap().unwrap().set(Some(json!([1, 2]))).unwrap();

    assert_eq!(
        b.sequence("sequence").unwrap().unwrap().to_vec().unwrap(),
        vec![json!({"n": 1})]
    );
    assert_eq!(
        b.mapping("mapping").unwrap().unwrap().get("f").unwrap(),
        Some(json!("x"))
    );
    assert_eq!(
        b.value("value").unwrap().unwrap().get().unwrap(),
        Some(json!([1, 2]))
    );
}

#[test]
fn test_different_keys_do_not_collide() {
    let a = remote_cache("tenant-a", "remote-isolation");
    let b = remote_cache("tenant-b", "remote-isolation");
    a.init("items", StorageKind::Sequence).unwrap();
    b.init("items", StorageKind::Sequence).unwrap();

    a.sequence("items").unwrap().unwrap().push(json!(1)).unwrap();
    assert!(b.sequence("items").unwrap().unwrap().is_empty().unwrap());
}

#[test]
fn test_mapping_is_not_marshaled() {
    let cache = remote_cache("hash", "remote-hash-text");
    cache.init("fields", StorageKind::Mapping).unwrap();
    let fields = cache.mapping("fields").unwrap().unwrap();

    fields.insert("count", json!(3)).unwrap();
    fields.insert("name", json!("web")).unwrap();

    assert_eq!(fields.get("count").unwrap(), Some(Value::String("3".to_string())));
    assert_eq!(fields.get("name").unwrap(), Some(json!("web")));
}

#[test]
fn test_unmarshaled_sequence_stores_text() {
    let cache = remote_cache("raw", "remote-raw-list");
    cache
        .init_with(
            "lines",
            StorageKind::Sequence,
            StorageOptions::new().marshal(false),
        )
        .unwrap();
    let lines = cache.sequence("lines").unwrap().unwrap();

    lines.push(json!("plain")).unwrap();
    lines.push(json!(5)).unwrap();
    assert_eq!(
        lines.to_vec().unwrap(),
        vec![json!("plain"), Value::String("5".to_string())]
    );
}

#[test]
fn test_clear_is_visible_to_other_instances() {
    let a = remote_cache("reports", "remote-clear");
    let b = remote_cache("reports", "remote-clear");
    a.init("rows", StorageKind::Sequence).unwrap();
    b.init("rows", StorageKind::Sequence).unwrap();
    a.sequence("rows").unwrap().unwrap().push(json!(1)).unwrap();

    b.clear(&[]).unwrap();
    assert!(a.sequence("rows").unwrap().unwrap().is_empty().unwrap());
}

#[test]
fn test_lock_handle_excludes_other_instance() {
    let a = remote_cache("jobs", "remote-lock-exclusive");
    let b = remote_cache("jobs", "remote-lock-exclusive");
    let options = StorageOptions::new()
        .expiration(Duration::from_secs(5))
        .timeout(Duration::from_millis(50));
    a.init_with("guard", StorageKind::Lock, options.clone()).unwrap();
    b.init_with("guard", StorageKind::Lock, options).unwrap();

    let a_lock = a.lock("guard").unwrap().unwrap();
    let b_lock = b.lock("guard").unwrap().unwrap();

    let held = a_lock.guard().unwrap();
    let err = b_lock.guard().err().unwrap();
    assert!(matches!(err, CacheError::LockTimeout { .. }));

    held.release().unwrap();
    assert!(b_lock.guard().is_ok());
}

#[test]
fn test_lock_handle_expires() {
    let a = remote_cache("expiring", "remote-lock-expiry");
    let b = remote_cache("expiring", "remote-lock-expiry");
    let short = StorageOptions::new().expiration(Duration::from_millis(100));
    let patient = StorageOptions::new()
        .expiration(Duration::from_secs(5))
        .timeout(Duration::from_secs(2));
    a.init_with("guard", StorageKind::Lock, short).unwrap();
    b.init_with("guard", StorageKind::Lock, patient).unwrap();

    let a_lock = a.lock("guard").unwrap().unwrap();
    let b_lock = b.lock("guard").unwrap().unwrap();

    let abandoned = a_lock.acquire().unwrap();
    let start = Instant::now();
    let taken = b_lock.acquire().unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));

    // The expired holder must not free the new owner.
    a_lock.release(abandoned).unwrap();
    let c = remote_cache("expiring", "remote-lock-expiry");
    c.init_with(
        "guard",
        StorageKind::Lock,
        StorageOptions::new().timeout(Duration::from_millis(20)),
    )
    .unwrap();
    assert!(c.lock("guard").unwrap().unwrap().guard().is_err());

    b_lock.release(taken).unwrap();
}

#[test]
fn test_clear_leaves_held_lock_alone() {
    let cache = remote_cache("held", "remote-clear-lock");
    cache
        .init_with(
            "guard",
            StorageKind::Lock,
            StorageOptions::new().timeout(Duration::from_millis(20)),
        )
        .unwrap();
    let lock = cache.lock("guard").unwrap().unwrap();
    let held = lock.guard().unwrap();

    cache.clear(&[]).unwrap();
    assert!(lock.guard().is_err());
    held.release().unwrap();
}

#[test]
fn test_clear_with_excludes_other_instance() {
    let writer = Arc::new(remote_cache("recompute", "remote-clear-with"));
    let reader = remote_cache("recompute", "remote-clear-with");
    writer.init("rows", StorageKind::Sequence).unwrap();
    reader.init("rows", StorageKind::Sequence).unwrap();
    writer.sequence("rows").unwrap().unwrap().push(json!("old")).unwrap();

    let (started_tx, started_rx) = std::sync::mpsc::channel();
    let worker = {
        let writer = Arc::clone(&writer);
        thread::spawn(move || {
            writer
                .clear_with(&["rows"], || {
                    started_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(200));
                    let rows = writer.sequence("rows").unwrap().unwrap();
                    rows.push(json!("new")).unwrap();
                })
                .unwrap();
        })
    };

    started_rx.recv().unwrap();
    // `get` waits for the internal lock, so it only returns after the recompute.
    let rows = reader.sequence("rows").unwrap().unwrap();
    assert_eq!(rows.to_vec().unwrap(), vec![json!("new")]);

    worker.join().unwrap();
}

#[test]
fn test_internal_lock_is_released_after_each_call() {
    let client = MemoryRemote::connect("remote-internal-release");
    let registry = BackendRegistry::new();
    registry.configure_remote(Arc::new(client.clone()));
    let cache = Cache::with_registry("released", Arc::new(registry));

    cache.init("items", StorageKind::Sequence).unwrap();
    cache.get("items").unwrap();
    cache.clear(&[]).unwrap();

    let internal = cache.key().qualify(keystash::INTERNAL_LOCK_NAME);
    assert!(!client.exists(&internal));
}
