//! # Remote backend
//!
//! Storage on a shared store that every process can reach. The store itself sits
//! behind [`RemoteClient`], which hands out the four storage shapes for a given
//! full name. This module adds the adapter defaults on top (marshaling, lock
//! expiration and timeout) and picks a client from connection options.
//!
//! Two clients ship with the crate:
//!
//! - [`MemoryRemote`] (`memory://<name>`): an in-process keyspace shared by every
//!   client connected to the same name. Locks behave like the server ones (one
//!   holder, expiration, bounded wait).
//! - `RedisRemote` (`redis://...`, `redis` feature).

mod memory;
#[cfg(feature = "redis")]
mod redis_client;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::{CacheError, Result};
use crate::kind::StorageKind;
use crate::options::{BackendOptions, StorageOptions};
use crate::storage::{LockStore, MappingStore, SequenceStore, Storage, ValueStore};

pub use memory::MemoryRemote;
#[cfg(feature = "redis")]
pub use redis_client::RedisRemote;

/// How long a remote lock lives before expiring on its own.
pub const DEFAULT_LOCK_EXPIRATION: Duration = Duration::from_secs(3);

/// How long acquiring a remote lock waits before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// A shared store that can produce the four storage shapes.
///
/// Handles created for the same `name` must address the same remote data, no
/// matter which client or process created them.
pub trait RemoteClient: Send + Sync {
    fn make_list(
        &self,
        name: &str,
        marshal: bool,
        options: &StorageOptions,
    ) -> Result<Arc<dyn SequenceStore>>;

    fn make_map(&self, name: &str) -> Result<Arc<dyn MappingStore>>;

    fn make_value(
        &self,
        name: &str,
        marshal: bool,
        options: &StorageOptions,
    ) -> Result<Arc<dyn ValueStore>>;

    /// A lock that expires `expiration` after being taken and whose `acquire`
    /// gives up after `timeout`.
    fn make_lock(
        &self,
        name: &str,
        expiration: Duration,
        timeout: Duration,
        options: &StorageOptions,
    ) -> Result<Arc<dyn LockStore>>;
}

/// Builds a remote-backed handle, applying the adapter defaults under `options`.
pub fn remote_storage(
    client: &dyn RemoteClient,
    kind: StorageKind,
    full_name: &str,
    options: &StorageOptions,
) -> Result<Storage> {
    match kind {
        StorageKind::Sequence => {
            let options = options.merged_over(&StorageOptions::new().marshal(true));
            let marshal = options.marshal.unwrap_or(true);
            Ok(Storage::Sequence(
                client.make_list(full_name, marshal, &options)?,
            ))
        }
        StorageKind::Mapping => Ok(Storage::Mapping(client.make_map(full_name)?)),
        StorageKind::Value => {
            let options = options.merged_over(&StorageOptions::new().marshal(true));
            let marshal = options.marshal.unwrap_or(true);
            Ok(Storage::Value(
                client.make_value(full_name, marshal, &options)?,
            ))
        }
        StorageKind::Lock => Ok(Storage::Lock(remote_lock(client, full_name, options)?)),
    }
}

/// Builds a remote lock; `expiration` defaults to 3s and `timeout` to 100ms.
pub fn remote_lock(
    client: &dyn RemoteClient,
    full_name: &str,
    options: &StorageOptions,
) -> Result<Arc<dyn LockStore>> {
    let defaults = StorageOptions::new()
        .expiration(DEFAULT_LOCK_EXPIRATION)
        .timeout(DEFAULT_LOCK_TIMEOUT);
    let options = options.merged_over(&defaults);
    let expiration = options.expiration.unwrap_or(DEFAULT_LOCK_EXPIRATION);
    let timeout = options.timeout.unwrap_or(DEFAULT_LOCK_TIMEOUT);
    client.make_lock(full_name, expiration, timeout, &options)
}

/// Creates a client from flat connection options.
///
/// The `url` option picks the client by scheme. Without it, a `redis://` URL is
/// assembled from `host` (default `127.0.0.1`), `port` (default `6379`), `db`
/// (default `0`) and `password`.
///
/// # Errors
///
/// [`CacheError::Connection`] for unknown schemes, for `redis://` without the
/// `redis` feature, and when the store cannot be reached.
pub fn connect(options: &BackendOptions) -> Result<Arc<dyn RemoteClient>> {
    let url = connection_url(options);
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| CacheError::Connection(format!("malformed url `{}`", url)))?;

    match scheme {
        "memory" => Ok(Arc::new(MemoryRemote::connect(rest))),
        "redis" | "rediss" => connect_redis(&url),
        other => Err(CacheError::Connection(format!(
            "unsupported remote scheme `{}`",
            other
        ))),
    }
}

fn connection_url(options: &BackendOptions) -> String {
    if let Some(url) = options.get("url") {
        return url.to_string();
    }
    let host = options.get("host").unwrap_or("127.0.0.1");
    let port = options.get("port").unwrap_or("6379");
    let db = options.get("db").unwrap_or("0");
    match options.get("password") {
        Some(password) => format!("redis://:{}@{}:{}/{}", password, host, port, db),
        None => format!("redis://{}:{}/{}", host, port, db),
    }
}

#[cfg(feature = "redis")]
fn connect_redis(url: &str) -> Result<Arc<dyn RemoteClient>> {
    Ok(Arc::new(RedisRemote::connect(url)?))
}

#[cfg(not(feature = "redis"))]
fn connect_redis(_url: &str) -> Result<Arc<dyn RemoteClient>> {
    Err(CacheError::Connection(
        "redis support requires the `redis` feature".to_string(),
    ))
}

/// Encodes a payload into its stored text form.
///
/// Marshaled payloads are JSON text. Unmarshaled strings are stored raw and other
/// payloads fall back to JSON text.
pub(crate) fn encode(value: &Value, marshal: bool) -> Result<String> {
    match value {
        Value::String(text) if !marshal => Ok(text.clone()),
        other => Ok(serde_json::to_string(other)?),
    }
}

/// Decodes stored text. Unmarshaled text always comes back as a string payload.
pub(crate) fn decode(raw: String, marshal: bool) -> Result<Value> {
    if marshal {
        Ok(serde_json::from_str(&raw)?)
    } else {
        Ok(Value::String(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_marshaled_payloads_keep_their_type() {
        let payload = json!({"stacks": [1, 2]});
        let raw = encode(&payload, true).unwrap();
        assert_eq!(decode(raw, true).unwrap(), payload);

        let raw = encode(&json!("plain"), true).unwrap();
        assert_eq!(raw, "\"plain\"");
    }

    #[test]
    fn test_unmarshaled_payloads_come_back_as_text() {
        assert_eq!(encode(&json!("plain"), false).unwrap(), "plain");
        assert_eq!(encode(&json!(5), false).unwrap(), "5");
        assert_eq!(decode("5".to_string(), false).unwrap(), json!("5"));
    }

    #[test]
    fn test_corrupt_marshaled_text_is_an_error() {
        assert!(matches!(
            decode("{not json".to_string(), true),
            Err(CacheError::Marshal(_))
        ));
    }

    #[test]
    fn test_connection_url_from_parts() {
        let options = BackendOptions::new()
            .with("host", "cache.internal")
            .with("port", "6380")
            .with("password", "s3cret");
        assert_eq!(
            connection_url(&options),
            "redis://:s3cret@cache.internal:6380/0"
        );
        assert_eq!(
            connection_url(&BackendOptions::new()),
            "redis://127.0.0.1:6379/0"
        );
    }

    #[test]
    fn test_unknown_scheme_is_rejected() {
        let options = BackendOptions::new().with("url", "ftp://cache");
        assert!(matches!(
            connect(&options),
            Err(CacheError::Connection(message)) if message.contains("ftp")
        ));

        let options = BackendOptions::new().with("url", "no-scheme");
        assert!(matches!(connect(&options), Err(CacheError::Connection(_))));
    }

    #[cfg(not(feature = "redis"))]
    #[test]
    fn test_redis_needs_feature() {
        let options = BackendOptions::new().with("url", "redis://127.0.0.1:6379");
        assert!(matches!(connect(&options), Err(CacheError::Connection(_))));
    }

    /// Remembers the arguments of the last `make_*` call.
    struct RecordingClient {
        inner: MemoryRemote,
        calls: parking_lot::Mutex<Vec<String>>,
    }

    impl RecordingClient {
        fn new(keyspace: &str) -> Self {
            Self {
                inner: MemoryRemote::connect(keyspace),
                calls: parking_lot::Mutex::new(Vec::new()),
            }
        }
    }

    impl RemoteClient for RecordingClient {
        fn make_list(
            &self,
            name: &str,
            marshal: bool,
            options: &StorageOptions,
        ) -> Result<Arc<dyn SequenceStore>> {
            self.calls.lock().push(format!("list {} {}", name, marshal));
            self.inner.make_list(name, marshal, options)
        }

        fn make_map(&self, name: &str) -> Result<Arc<dyn MappingStore>> {
            self.calls.lock().push(format!("map {}", name));
            self.inner.make_map(name)
        }

        fn make_value(
            &self,
            name: &str,
            marshal: bool,
            options: &StorageOptions,
        ) -> Result<Arc<dyn ValueStore>> {
            self.calls.lock().push(format!("value {} {}", name, marshal));
            self.inner.make_value(name, marshal, options)
        }

        fn make_lock(
            &self,
            name: &str,
            expiration: Duration,
            timeout: Duration,
            options: &StorageOptions,
        ) -> Result<Arc<dyn LockStore>> {
            self.calls
                .lock()
                .push(format!("lock {} {:?} {:?}", name, expiration, timeout));
            self.inner.make_lock(name, expiration, timeout, options)
        }
    }

    #[test]
    fn test_adapter_defaults() {
        let client = RecordingClient::new("remote-defaults-test");
        for kind in StorageKind::ALL {
            let storage = remote_storage(&client, kind, "abc_slot", &StorageOptions::new())
                .unwrap();
            assert_eq!(storage.kind(), kind);
        }

        assert_eq!(
            *client.calls.lock(),
            vec![
                "list abc_slot true".to_string(),
                "map abc_slot".to_string(),
                "value abc_slot true".to_string(),
                "lock abc_slot 3s 100ms".to_string(),
            ]
        );
    }

    #[test]
    fn test_adapter_overrides() {
        let client = RecordingClient::new("remote-overrides-test");
        remote_storage(
            &client,
            StorageKind::Lock,
            "override_lock",
            &StorageOptions::new().timeout(Duration::from_secs(20)),
        )
        .unwrap();
        remote_storage(
            &client,
            StorageKind::Value,
            "raw_value",
            &StorageOptions::new().marshal(false),
        )
        .unwrap();

        assert_eq!(
            *client.calls.lock(),
            vec![
                "lock override_lock 3s 20s".to_string(),
                "value raw_value false".to_string(),
            ]
        );
    }

    #[test]
    fn test_sequence_marshal_override() {
        let client = MemoryRemote::connect("remote-marshal-test");
        let raw = remote_storage(
            &client,
            StorageKind::Sequence,
            "raw_list",
            &StorageOptions::new().marshal(false),
        )
        .unwrap();
        raw.as_sequence().unwrap().push(json!(3)).unwrap();
        assert_eq!(raw.as_sequence().unwrap().get(0).unwrap(), Some(json!("3")));

        let marshaled = remote_storage(
            &client,
            StorageKind::Sequence,
            "json_list",
            &StorageOptions::new(),
        )
        .unwrap();
        marshaled.as_sequence().unwrap().push(json!(3)).unwrap();
        assert_eq!(
            marshaled.as_sequence().unwrap().get(0).unwrap(),
            Some(json!(3))
        );
    }
}
