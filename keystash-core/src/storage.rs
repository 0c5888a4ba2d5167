//! # Storage handles
//!
//! The four storage shapes a cache instance can hand out, as object-safe traits
//! over `serde_json::Value` payloads. Local and remote backends both implement
//! them; callers never learn which one they got.
//!
//! [`Storage`] is the closed set of handles, and [`NamedStorageHandle`] binds one to
//! its fully-qualified name together with the clearing behavior chosen when it
//! was created.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::error::Result;
use crate::kind::{ClearBehavior, StorageKind};

/// An ordered sequence of payloads.
pub trait SequenceStore: Send + Sync {
    /// Appends a payload at the end.
    fn push(&self, value: Value) -> Result<()>;

    /// Returns the payload at `index`, if any.
    fn get(&self, index: usize) -> Result<Option<Value>>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns every payload in order.
    fn to_vec(&self) -> Result<Vec<Value>>;

    /// Removes every payload.
    fn clear(&self) -> Result<()>;
}

/// A mapping from field names to payloads.
pub trait MappingStore: Send + Sync {
    fn insert(&self, field: &str, value: Value) -> Result<()>;

    fn get(&self, field: &str) -> Result<Option<Value>>;

    /// Removes `field`, returning whether it was present.
    fn remove(&self, field: &str) -> Result<bool>;

    fn contains(&self, field: &str) -> Result<bool> {
        Ok(self.get(field)?.is_some())
    }

    fn keys(&self) -> Result<Vec<String>>;

    fn len(&self) -> Result<usize>;

    /// Removes every field.
    fn clear(&self) -> Result<()>;
}

/// A single optional payload.
pub trait ValueStore: Send + Sync {
    fn get(&self) -> Result<Option<Value>>;

    /// Replaces the payload; `None` empties the cell.
    fn set(&self, value: Option<Value>) -> Result<()>;

    fn clear(&self) -> Result<()> {
        self.set(None)
    }
}

/// Proof of holding a lock, handed back to [`LockStore::release`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockToken(u64);

impl LockToken {
    /// Wraps a token id, for clients that mint their own.
    pub fn new(id: u64) -> Self {
        LockToken(id)
    }

    /// A fresh random token, unique enough to tell holders apart.
    pub fn random() -> Self {
        LockToken(fastrand::u64(..))
    }

    /// The id stored as the lock's owner.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A mutual-exclusion primitive.
///
/// Use the scoped helpers on `dyn LockStore` rather than pairing
/// `acquire`/`release` by hand:
///
/// ```
/// use keystash_core::local::LocalLock;
/// use keystash_core::LockStore;
/// use std::sync::Arc;
///
/// let lock: Arc<dyn LockStore> = Arc::new(LocalLock::new("jobs_lock"));
/// let total = lock.lock(|| 40 + 2).unwrap();
/// assert_eq!(total, 42);
/// ```
pub trait LockStore: Send + Sync {
    /// Full name of the lock.
    fn name(&self) -> &str;

    /// Blocks until the lock is held or the acquire timeout passes.
    ///
    /// A timeout is reported as [`CacheError::LockTimeout`](crate::CacheError::LockTimeout).
    fn acquire(&self) -> Result<LockToken>;

    /// Releases a lock previously returned by `acquire`.
    fn release(&self, token: LockToken) -> Result<()>;

    /// Forcibly drops whatever holder the lock has.
    fn clear(&self) -> Result<()>;
}

impl dyn LockStore {
    /// Acquires the lock and returns a guard that releases it when dropped.
    pub fn guard(&self) -> Result<LockGuard<'_>> {
        let token = self.acquire()?;
        trace!(lock = self.name(), "lock acquired");
        Ok(LockGuard {
            lock: self,
            token: Some(token),
        })
    }

    /// Runs `critical_section` while holding the lock.
    ///
    /// The lock is released on every exit path, panics included. Release errors on
    /// the normal path are returned.
    pub fn lock<R, F>(&self, critical_section: F) -> Result<R>
    where
        F: FnOnce() -> R,
    {
        let guard = self.guard()?;
        let result = critical_section();
        guard.release()?;
        Ok(result)
    }
}

/// Scoped ownership of a lock. Dropping it releases the lock.
pub struct LockGuard<'a> {
    lock: &'a dyn LockStore,
    token: Option<LockToken>,
}

impl LockGuard<'_> {
    /// Releases the lock now, reporting any release failure.
    pub fn release(mut self) -> Result<()> {
        match self.token.take() {
            Some(token) => {
                trace!(lock = self.lock.name(), "lock released");
                self.lock.release(token)
            }
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            trace!(lock = self.lock.name(), "lock released on drop");
            // Nowhere to report the error from here; an expiring remote lock
            // frees itself anyway.
            let _ = self.lock.release(token);
        }
    }
}

/// A storage handle of one of the four kinds.
#[derive(Clone)]
pub enum Storage {
    Sequence(Arc<dyn SequenceStore>),
    Mapping(Arc<dyn MappingStore>),
    Value(Arc<dyn ValueStore>),
    Lock(Arc<dyn LockStore>),
}

impl Storage {
    /// The kind of the wrapped handle.
    pub fn kind(&self) -> StorageKind {
        match self {
            Storage::Sequence(_) => StorageKind::Sequence,
            Storage::Mapping(_) => StorageKind::Mapping,
            Storage::Value(_) => StorageKind::Value,
            Storage::Lock(_) => StorageKind::Lock,
        }
    }

    /// The sequence, if this is one.
    pub fn as_sequence(&self) -> Option<&Arc<dyn SequenceStore>> {
        match self {
            Storage::Sequence(sequence) => Some(sequence),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Arc<dyn MappingStore>> {
        match self {
            Storage::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Arc<dyn ValueStore>> {
        match self {
            Storage::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_lock(&self) -> Option<&Arc<dyn LockStore>> {
        match self {
            Storage::Lock(lock) => Some(lock),
            _ => None,
        }
    }

    /// Empties the payload: sequences and mappings lose their contents, value
    /// cells are set to nothing, locks are left alone.
    pub fn reset(&self) -> Result<()> {
        match self {
            Storage::Sequence(sequence) => sequence.clear(),
            Storage::Mapping(mapping) => mapping.clear(),
            Storage::Value(value) => value.clear(),
            Storage::Lock(_) => Ok(()),
        }
    }

    /// Whether both handles point at the same underlying object.
    pub fn same_object(&self, other: &Storage) -> bool {
        self.object_ptr() == other.object_ptr()
    }

    fn object_ptr(&self) -> *const () {
        match self {
            Storage::Sequence(sequence) => Arc::as_ptr(sequence) as *const (),
            Storage::Mapping(mapping) => Arc::as_ptr(mapping) as *const (),
            Storage::Value(value) => Arc::as_ptr(value) as *const (),
            Storage::Lock(lock) => Arc::as_ptr(lock) as *const (),
        }
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Storage").field(&self.kind()).finish()
    }
}

/// A storage handle bound to its fully-qualified name (`<cache key>_<name>`).
#[derive(Clone, Debug)]
pub struct NamedStorageHandle {
    full_name: String,
    clear_behavior: ClearBehavior,
    storage: Storage,
}

impl NamedStorageHandle {
    pub fn new(full_name: impl Into<String>, storage: Storage) -> Self {
        let clear_behavior = storage.kind().clear_behavior();
        Self {
            full_name: full_name.into(),
            clear_behavior,
            storage,
        }
    }

    /// `<cache key>_<name>`, the name the backend stores it under.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn kind(&self) -> StorageKind {
        self.storage.kind()
    }

    /// What `Cache::clear` does to this handle.
    pub fn clear_behavior(&self) -> ClearBehavior {
        self.clear_behavior
    }

    /// The wrapped handle.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Whether both wrap the same underlying object.
    pub fn same_object(&self, other: &NamedStorageHandle) -> bool {
        self.storage.same_object(&other.storage)
    }
}
