use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{ReentrantMutex, RwLock};
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::keys::{CacheKey, KeySource};
use crate::kind::{ClearBehavior, StorageKind};
use crate::options::StorageOptions;
use crate::registry::BackendRegistry;
use crate::storage::{
    LockStore, MappingStore, NamedStorageHandle, SequenceStore, Storage, ValueStore,
};

#[cfg(feature = "stats")]
use crate::CacheStats;

/// Logical name of the lock that serializes registry access.
pub const INTERNAL_LOCK_NAME: &str = "internal_access";

/// Acquire timeout of the internal lock.
pub const INTERNAL_LOCK_TIMEOUT: Duration = Duration::from_secs(20);

/// A namespaced set of storage handles derived from one key.
///
/// The key input is digested into a [`CacheKey`]; each handle requested through
/// [`init`](Cache::init) lives under the full name `<key>_<name>` on whichever
/// backend the registry has active. Two instances built from equal key input use
/// the same full names, so on the remote backend they share data across
/// processes.
///
/// # Registry access
///
/// `init`, `get` and `clear` run under the internal lock: a per-instance
/// reentrant mutex plus the backend lock `<key>_internal_access` (20s acquire
/// timeout). The mutex serializes threads of this process even on the local
/// backend, whose locks do not exclude anyone; the backend lock serializes
/// processes sharing the key on the remote backend. A thread that already holds
/// the internal lock (inside a `clear_with` callback, for example) can call back
/// into the instance without deadlocking.
///
/// # Examples
///
/// ```
/// use keystash_core::{BackendRegistry, Cache, StorageKind};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let cache = Cache::with_registry(&vec!["us-east-1", "prod"], Arc::new(BackendRegistry::new()));
///
/// assert!(cache.init("stacks", StorageKind::Sequence).unwrap());
/// assert!(cache.init("stacks", StorageKind::Sequence).unwrap());
///
/// let stacks = cache.sequence("stacks").unwrap().unwrap();
/// stacks.push(json!("web")).unwrap();
///
/// cache.clear(&[]).unwrap();
/// assert!(stacks.is_empty().unwrap());
/// ```
pub struct Cache {
    key: CacheKey,
    registry: Arc<BackendRegistry>,
    handles: RwLock<HashMap<String, NamedStorageHandle>>,
    /// Holder depth of the internal lock on the owning thread.
    access: ReentrantMutex<Cell<usize>>,
    #[cfg(feature = "stats")]
    stats: CacheStats,
}

/// Decrements the internal lock depth when dropped, unwinding included.
struct Entered<'a> {
    depth: &'a Cell<usize>,
}

impl<'a> Entered<'a> {
    fn new(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth }
    }

    fn is_nested(&self) -> bool {
        self.depth.get() > 1
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

impl Cache {
    /// Creates an instance on the process-wide [`BackendRegistry::global`].
    pub fn new<K: KeySource + ?Sized>(key_input: &K) -> Self {
        Self::with_registry(key_input, BackendRegistry::global())
    }

    /// Creates an instance that reads its backend from `registry`.
    pub fn with_registry<K: KeySource + ?Sized>(
        key_input: &K,
        registry: Arc<BackendRegistry>,
    ) -> Self {
        Self {
            key: CacheKey::derive(key_input),
            registry,
            handles: RwLock::new(HashMap::new()),
            access: ReentrantMutex::new(Cell::new(0)),
            #[cfg(feature = "stats")]
            stats: CacheStats::new(),
        }
    }

    /// The digest every full name of this instance starts with.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Ensures a handle of `kind` exists under `name`.
    ///
    /// Creates it on the active backend the first time; later calls with the same
    /// name reuse the existing handle, whatever `kind` they pass. Always returns
    /// `Ok(true)` unless creation or the internal lock fails.
    ///
    /// # Errors
    ///
    /// * [`CacheError::NotPermitted`] for the reserved name `internal_access`
    /// * [`CacheError::LockTimeout`] if the internal lock is not acquired in time
    /// * [`CacheError::BackendNotInitialized`] when `remote` is enabled without a client
    pub fn init(&self, name: &str, kind: StorageKind) -> Result<bool> {
        self.init_with(name, kind, StorageOptions::new())
    }

    /// Same as [`init`](Cache::init), passing `options` to the storage factory
    /// when the handle is created.
    pub fn init_with(&self, name: &str, kind: StorageKind, options: StorageOptions) -> Result<bool> {
        if name == INTERNAL_LOCK_NAME {
            return Err(CacheError::NotPermitted(format!(
                "`{}` is reserved for the internal lock",
                INTERNAL_LOCK_NAME
            )));
        }

        self.internal_lock(|| {
            let mut handles = self.handles.write();
            if handles.contains_key(name) {
                #[cfg(feature = "stats")]
                self.stats.record_reused();
                return Ok(true);
            }

            let full_name = self.key.qualify(name);
            let storage = self.registry.storage(kind, &full_name, &options)?;
            debug!(name = %full_name, kind = %kind, "storage handle created");
            handles.insert(name.to_string(), NamedStorageHandle::new(full_name, storage));
            #[cfg(feature = "stats")]
            self.stats.record_created();
            Ok(true)
        })?
    }

    /// Returns the handle registered under `name`, if any.
    pub fn get(&self, name: &str) -> Result<Option<NamedStorageHandle>> {
        self.internal_lock(|| {
            let found = self.handles.read().get(name).cloned();
            #[cfg(feature = "stats")]
            match found {
                Some(_) => self.stats.record_hit(),
                None => self.stats.record_miss(),
            }
            found
        })
    }

    /// Writing into the handle registry is never allowed; handles only come from
    /// [`init`](Cache::init). Always fails with [`CacheError::NotPermitted`].
    pub fn set(&self, name: &str, _storage: Storage) -> Result<()> {
        Err(CacheError::NotPermitted(format!(
            "setting backend data is not allowed (`{}`)",
            name
        )))
    }

    /// The sequence registered under `name`, if there is one of that kind.
    pub fn sequence(&self, name: &str) -> Result<Option<Arc<dyn SequenceStore>>> {
        Ok(self
            .get(name)?
            .and_then(|handle| handle.storage().as_sequence().cloned()))
    }

    /// The mapping registered under `name`, if there is one of that kind.
    pub fn mapping(&self, name: &str) -> Result<Option<Arc<dyn MappingStore>>> {
        Ok(self
            .get(name)?
            .and_then(|handle| handle.storage().as_mapping().cloned()))
    }

    /// The value cell registered under `name`, if there is one of that kind.
    pub fn value(&self, name: &str) -> Result<Option<Arc<dyn ValueStore>>> {
        Ok(self
            .get(name)?
            .and_then(|handle| handle.storage().as_value().cloned()))
    }

    /// The lock registered under `name`, if there is one of that kind.
    pub fn lock(&self, name: &str) -> Result<Option<Arc<dyn LockStore>>> {
        Ok(self
            .get(name)?
            .and_then(|handle| handle.storage().as_lock().cloned()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handles.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Resets the payload of the named handles, or of every handle when `names`
    /// is empty.
    ///
    /// Sequences and mappings are emptied, value cells set to nothing, locks left
    /// alone. Handles stay registered and keep their identity. Names that were
    /// never initialized are skipped. Returns `Ok(true)`.
    pub fn clear(&self, names: &[&str]) -> Result<bool> {
        self.clear_with(names, || {})
    }

    /// Like [`clear`](Cache::clear), then runs `callback` once while still holding
    /// the internal lock, so a clear-and-recompute looks atomic to other callers.
    ///
    /// ```
    /// use keystash_core::{BackendRegistry, Cache, StorageKind};
    /// use serde_json::json;
    /// use std::sync::Arc;
    ///
    /// let cache = Cache::with_registry("events", Arc::new(BackendRegistry::new()));
    /// cache.init("latest", StorageKind::Value).unwrap();
    ///
    /// cache
    ///     .clear_with(&["latest"], || {
    ///         let latest = cache.value("latest").unwrap().unwrap();
    ///         latest.set(Some(json!("recomputed"))).unwrap();
    ///     })
    ///     .unwrap();
    ///
    /// let latest = cache.value("latest").unwrap().unwrap();
    /// assert_eq!(latest.get().unwrap(), Some(json!("recomputed")));
    /// ```
    pub fn clear_with<F>(&self, names: &[&str], callback: F) -> Result<bool>
    where
        F: FnOnce(),
    {
        self.internal_lock(|| -> Result<()> {
            let targets: Vec<NamedStorageHandle> = {
                let handles = self.handles.read();
                if names.is_empty() {
                    handles.values().cloned().collect()
                } else {
                    names
                        .iter()
                        .filter_map(|name| handles.get(*name).cloned())
                        .collect()
                }
            };

            for handle in &targets {
                match handle.clear_behavior() {
                    ClearBehavior::Bulk | ClearBehavior::Cell => handle.storage().reset()?,
                    ClearBehavior::Opaque => {}
                }
            }
            debug!(cache = %self.key, handles = targets.len(), "handles cleared");
            #[cfg(feature = "stats")]
            self.stats.record_clear();

            callback();
            Ok(())
        })??;
        Ok(true)
    }

    /// Runs `critical_section` under the internal lock.
    ///
    /// The backend lock is created fresh on the currently active backend for
    /// every outermost call and released on every exit path.
    ///
    /// # Errors
    ///
    /// [`CacheError::LockTimeout`] when both locks are not held within
    /// [`INTERNAL_LOCK_TIMEOUT`] of the call; the section does not run.
    pub fn internal_lock<R, F>(&self, critical_section: F) -> Result<R>
    where
        F: FnOnce() -> R,
    {
        let full_name = self.key.qualify(INTERNAL_LOCK_NAME);
        let deadline = Instant::now() + INTERNAL_LOCK_TIMEOUT;
        let depth = self
            .access
            .try_lock_until(deadline)
            .ok_or_else(|| CacheError::LockTimeout {
                name: full_name.clone(),
                timeout: INTERNAL_LOCK_TIMEOUT,
            })?;
        let entered = Entered::new(&depth);
        if entered.is_nested() {
            return Ok(critical_section());
        }

        // Both waits share one deadline.
        let remaining = deadline.saturating_duration_since(Instant::now());
        let options = StorageOptions::new().timeout(remaining);
        let lock = self.registry.lock(&full_name, &options)?;
        lock.lock(critical_section)
    }

    /// Registry activity counters of this instance.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("key", &self.key)
            .field("names", &self.names())
            .finish()
    }
}
