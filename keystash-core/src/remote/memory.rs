use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde_json::Value;

use super::{decode, encode, RemoteClient};
use crate::error::{CacheError, Result};
use crate::options::StorageOptions;
use crate::storage::{LockStore, LockToken, MappingStore, SequenceStore, ValueStore};

/// Named keyspaces shared by every `MemoryRemote` in the process.
static KEYSPACES: Lazy<DashMap<String, Arc<Keyspace>>> = Lazy::new(DashMap::new);

enum Entry {
    List(Vec<String>),
    Hash(HashMap<String, String>),
    Text(String),
    Lock { token: u64, expires_at: Instant },
}

struct Keyspace {
    entries: Mutex<HashMap<String, Entry>>,
    released: Condvar,
}

impl Keyspace {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            released: Condvar::new(),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock()
    }
}

fn wrong_type(name: &str) -> CacheError {
    CacheError::Backend(format!(
        "WRONGTYPE key `{}` holds a different kind of value",
        name
    ))
}

/// A remote client backed by a named in-process keyspace.
///
/// Every `MemoryRemote` connected to the same name sees the same keys, the way
/// separate processes see the same server. Payloads are kept in their stored text
/// form, so marshaling behaves as it would over the wire.
///
/// # Examples
///
/// ```
/// use keystash_core::remote::{MemoryRemote, RemoteClient};
/// use keystash_core::StorageOptions;
/// use serde_json::json;
///
/// let writer = MemoryRemote::connect("docs-shared");
/// let reader = MemoryRemote::connect("docs-shared");
///
/// writer
///     .make_value("abc_status", true, &StorageOptions::new())
///     .unwrap()
///     .set(Some(json!({"state": "ready"})))
///     .unwrap();
///
/// let seen = reader
///     .make_value("abc_status", true, &StorageOptions::new())
///     .unwrap()
///     .get()
///     .unwrap();
/// assert_eq!(seen, Some(json!({"state": "ready"})));
/// ```
#[derive(Clone)]
pub struct MemoryRemote {
    name: String,
    keyspace: Arc<Keyspace>,
}

impl MemoryRemote {
    /// Connects to the keyspace called `name`, creating it on first use.
    pub fn connect(name: &str) -> Self {
        let keyspace = KEYSPACES
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Keyspace::new()))
            .value()
            .clone();
        Self {
            name: name.to_string(),
            keyspace,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `key` currently exists. Expired locks do not.
    pub fn exists(&self, key: &str) -> bool {
        match self.keyspace.entries().get(key) {
            Some(Entry::Lock { expires_at, .. }) => *expires_at > Instant::now(),
            Some(_) => true,
            None => false,
        }
    }

    /// Drops every key in the keyspace.
    pub fn flush(&self) {
        self.keyspace.entries().clear();
        self.keyspace.released.notify_all();
    }
}

impl RemoteClient for MemoryRemote {
    fn make_list(
        &self,
        name: &str,
        marshal: bool,
        _options: &StorageOptions,
    ) -> Result<Arc<dyn SequenceStore>> {
        Ok(Arc::new(MemoryList {
            keyspace: Arc::clone(&self.keyspace),
            name: name.to_string(),
            marshal,
        }))
    }

    fn make_map(&self, name: &str) -> Result<Arc<dyn MappingStore>> {
        Ok(Arc::new(MemoryMap {
            keyspace: Arc::clone(&self.keyspace),
            name: name.to_string(),
        }))
    }

    fn make_value(
        &self,
        name: &str,
        marshal: bool,
        _options: &StorageOptions,
    ) -> Result<Arc<dyn ValueStore>> {
        Ok(Arc::new(MemoryValue {
            keyspace: Arc::clone(&self.keyspace),
            name: name.to_string(),
            marshal,
        }))
    }

    fn make_lock(
        &self,
        name: &str,
        expiration: Duration,
        timeout: Duration,
        _options: &StorageOptions,
    ) -> Result<Arc<dyn LockStore>> {
        Ok(Arc::new(MemoryLock {
            keyspace: Arc::clone(&self.keyspace),
            name: name.to_string(),
            expiration,
            timeout,
        }))
    }
}

struct MemoryList {
    keyspace: Arc<Keyspace>,
    name: String,
    marshal: bool,
}

impl MemoryList {
    /// Runs `f` over the stored list, if the key exists.
    fn read<R>(&self, f: impl FnOnce(&Vec<String>) -> R) -> Result<Option<R>> {
        match self.keyspace.entries().get(&self.name) {
            Some(Entry::List(items)) => Ok(Some(f(items))),
            Some(_) => Err(wrong_type(&self.name)),
            None => Ok(None),
        }
    }
}

impl SequenceStore for MemoryList {
    fn push(&self, value: Value) -> Result<()> {
        let raw = encode(&value, self.marshal)?;
        let mut entries = self.keyspace.entries();
        match entries
            .entry(self.name.clone())
            .or_insert_with(|| Entry::List(Vec::new()))
        {
            Entry::List(items) => {
                items.push(raw);
                Ok(())
            }
            _ => Err(wrong_type(&self.name)),
        }
    }

    fn get(&self, index: usize) -> Result<Option<Value>> {
        self.read(|items| items.get(index).cloned())?
            .flatten()
            .map(|raw| decode(raw, self.marshal))
            .transpose()
    }

    fn len(&self) -> Result<usize> {
        Ok(self.read(Vec::len)?.unwrap_or(0))
    }

    fn to_vec(&self) -> Result<Vec<Value>> {
        self.read(Vec::clone)?
            .unwrap_or_default()
            .into_iter()
            .map(|raw| decode(raw, self.marshal))
            .collect()
    }

    fn clear(&self) -> Result<()> {
        self.keyspace.entries().remove(&self.name);
        Ok(())
    }
}

/// Fields are stored without marshaling; reads return string payloads.
struct MemoryMap {
    keyspace: Arc<Keyspace>,
    name: String,
}

impl MemoryMap {
    fn read<R>(&self, f: impl FnOnce(&HashMap<String, String>) -> R) -> Result<Option<R>> {
        match self.keyspace.entries().get(&self.name) {
            Some(Entry::Hash(fields)) => Ok(Some(f(fields))),
            Some(_) => Err(wrong_type(&self.name)),
            None => Ok(None),
        }
    }
}

impl MappingStore for MemoryMap {
    fn insert(&self, field: &str, value: Value) -> Result<()> {
        let raw = encode(&value, false)?;
        let mut entries = self.keyspace.entries();
        match entries
            .entry(self.name.clone())
            .or_insert_with(|| Entry::Hash(HashMap::new()))
        {
            Entry::Hash(fields) => {
                fields.insert(field.to_string(), raw);
                Ok(())
            }
            _ => Err(wrong_type(&self.name)),
        }
    }

    fn get(&self, field: &str) -> Result<Option<Value>> {
        self.read(|fields| fields.get(field).cloned())?
            .flatten()
            .map(|raw| decode(raw, false))
            .transpose()
    }

    fn remove(&self, field: &str) -> Result<bool> {
        let mut entries = self.keyspace.entries();
        let removed = match entries.get_mut(&self.name) {
            Some(Entry::Hash(fields)) => fields.remove(field).is_some(),
            Some(_) => return Err(wrong_type(&self.name)),
            None => false,
        };
        // An emptied hash disappears, as on the server.
        if matches!(entries.get(&self.name), Some(Entry::Hash(fields)) if fields.is_empty()) {
            entries.remove(&self.name);
        }
        Ok(removed)
    }

    fn contains(&self, field: &str) -> Result<bool> {
        Ok(self
            .read(|fields| fields.contains_key(field))?
            .unwrap_or(false))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .read(|fields| fields.keys().cloned().collect())?
            .unwrap_or_default())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.read(HashMap::len)?.unwrap_or(0))
    }

    fn clear(&self) -> Result<()> {
        self.keyspace.entries().remove(&self.name);
        Ok(())
    }
}

struct MemoryValue {
    keyspace: Arc<Keyspace>,
    name: String,
    marshal: bool,
}

impl ValueStore for MemoryValue {
    fn get(&self) -> Result<Option<Value>> {
        let raw = match self.keyspace.entries().get(&self.name) {
            Some(Entry::Text(raw)) => Some(raw.clone()),
            Some(_) => return Err(wrong_type(&self.name)),
            None => None,
        };
        raw.map(|raw| decode(raw, self.marshal)).transpose()
    }

    fn set(&self, value: Option<Value>) -> Result<()> {
        match value {
            Some(value) => {
                let raw = encode(&value, self.marshal)?;
                self.keyspace
                    .entries()
                    .insert(self.name.clone(), Entry::Text(raw));
            }
            None => {
                self.keyspace.entries().remove(&self.name);
            }
        }
        Ok(())
    }
}

/// An expiring lock. Waiters sleep on the keyspace condvar until the holder
/// releases, the lock expires, or their acquire timeout passes.
struct MemoryLock {
    keyspace: Arc<Keyspace>,
    name: String,
    expiration: Duration,
    timeout: Duration,
}

impl LockStore for MemoryLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&self) -> Result<LockToken> {
        let token = LockToken::random();
        let deadline = Instant::now() + self.timeout;
        let mut entries = self.keyspace.entries();

        loop {
            let now = Instant::now();
            let held_until = match entries.get(&self.name) {
                Some(Entry::Lock { expires_at, .. }) if *expires_at > now => Some(*expires_at),
                Some(Entry::Lock { .. }) | None => None,
                Some(_) => return Err(wrong_type(&self.name)),
            };

            match held_until {
                None => {
                    entries.insert(
                        self.name.clone(),
                        Entry::Lock {
                            token: token.id(),
                            expires_at: now + self.expiration,
                        },
                    );
                    return Ok(token);
                }
                Some(_) if now >= deadline => {
                    return Err(CacheError::LockTimeout {
                        name: self.name.clone(),
                        timeout: self.timeout,
                    });
                }
                Some(expires_at) => {
                    self.keyspace
                        .released
                        .wait_until(&mut entries, expires_at.min(deadline));
                }
            }
        }
    }

    fn release(&self, token: LockToken) -> Result<()> {
        let mut entries = self.keyspace.entries();
        // Only the current holder may delete the key; a holder whose lock expired
        // and was taken over must not free the new owner.
        if matches!(entries.get(&self.name), Some(Entry::Lock { token: held, .. }) if *held == token.id())
        {
            entries.remove(&self.name);
            self.keyspace.released.notify_all();
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut entries = self.keyspace.entries();
        if matches!(entries.get(&self.name), Some(Entry::Lock { .. })) {
            entries.remove(&self.name);
            self.keyspace.released.notify_all();
        }
        Ok(())
    }
}
