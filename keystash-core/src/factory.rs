//! The single place where local and remote storage diverge.

use std::sync::Arc;

use crate::error::Result;
use crate::kind::{BackendKind, StorageKind};
use crate::local::{LocalLock, LocalMapping, LocalSequence, LocalValue};
use crate::options::StorageOptions;
use crate::remote::{remote_lock, remote_storage, RemoteClient};
use crate::storage::{LockStore, Storage};

/// A resolved backend: the kind plus whatever it needs to build handles.
#[derive(Clone)]
pub enum Backend {
    Local,
    Remote(Arc<dyn RemoteClient>),
}

impl Backend {
    /// The kind this backend was resolved from.
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Local => BackendKind::Local,
            Backend::Remote(_) => BackendKind::Remote,
        }
    }
}

/// Creates a storage handle of `kind` named `full_name` on `backend`.
///
/// The local backend ignores `options`; the remote one merges them over its
/// defaults (see [`remote_storage`]).
///
/// # Examples
///
/// ```
/// use keystash_core::factory::{get_storage, Backend};
/// use keystash_core::{StorageKind, StorageOptions};
///
/// let storage = get_storage(
///     &Backend::Local,
///     StorageKind::Value,
///     "abc_status",
///     &StorageOptions::new(),
/// )
/// .unwrap();
/// assert_eq!(storage.as_value().unwrap().get().unwrap(), None);
/// ```
pub fn get_storage(
    backend: &Backend,
    kind: StorageKind,
    full_name: &str,
    options: &StorageOptions,
) -> Result<Storage> {
    match backend {
        Backend::Local => Ok(local_storage(kind, full_name)),
        Backend::Remote(client) => remote_storage(client.as_ref(), kind, full_name, options),
    }
}

/// Creates a lock named `full_name` on `backend`.
///
/// Same as `get_storage` with [`StorageKind::Lock`], without the enum around it.
pub fn get_lock(
    backend: &Backend,
    full_name: &str,
    options: &StorageOptions,
) -> Result<Arc<dyn LockStore>> {
    match backend {
        Backend::Local => Ok(Arc::new(LocalLock::new(full_name))),
        Backend::Remote(client) => remote_lock(client.as_ref(), full_name, options),
    }
}

/// Fresh, empty in-process storage. Local handles do not need the name except
/// for locks, which report it.
pub fn local_storage(kind: StorageKind, full_name: &str) -> Storage {
    match kind {
        StorageKind::Sequence => Storage::Sequence(Arc::new(LocalSequence::new())),
        StorageKind::Mapping => Storage::Mapping(Arc::new(LocalMapping::new())),
        StorageKind::Value => Storage::Value(Arc::new(LocalValue::new())),
        StorageKind::Lock => Storage::Lock(Arc::new(LocalLock::new(full_name))),
    }
}
