use std::fmt;
use std::str::FromStr;

use crate::error::CacheError;

/// The backend that storage handles are created on.
///
/// # Variants
///
/// * `Local` - In-process storage (default)
///   - Plain collections owned by the cache instance
///   - No visibility across processes
///   - Locks are no-ops
///
/// * `Remote` - Shared storage on a remote store
///   - Handles with the same full name see the same data in every process
///   - Locks give real mutual exclusion with expiration and acquire timeout
///
/// # Examples
///
/// ```
/// use keystash_core::BackendKind;
///
/// assert_eq!(BackendKind::default(), BackendKind::Local);
///
/// let remote: BackendKind = "redis".parse().unwrap();
/// assert_eq!(remote, BackendKind::Remote);
///
/// assert!("memcached".parse::<BackendKind>().is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BackendKind {
    #[default]
    Local,
    Remote,
}

impl BackendKind {
    /// Canonical lowercase name, as accepted by `FromStr`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Remote => "remote",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a backend kind, case-insensitively.
///
/// `"redis"` is accepted as an alias for [`BackendKind::Remote`]. Anything else
/// fails with [`CacheError::UnsupportedBackend`] naming the input.
impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "remote" | "redis" => Ok(BackendKind::Remote),
            _ => Err(CacheError::UnsupportedBackend(s.to_string())),
        }
    }
}

/// The shape of a storage handle.
///
/// | Kind       | Local                   | Remote                          | On clear        |
/// |------------|-------------------------|---------------------------------|-----------------|
/// | `Sequence` | `Vec` of payloads       | list, marshaled elements        | emptied         |
/// | `Mapping`  | `HashMap` of payloads   | hash keyed by field name        | emptied         |
/// | `Value`    | single optional payload | single key, marshaled           | set to nothing  |
/// | `Lock`     | no-op lock              | expiring lock with timeout      | left untouched  |
///
/// # Examples
///
/// ```
/// use keystash_core::{ClearBehavior, StorageKind};
///
/// let kind: StorageKind = "array".parse().unwrap();
/// assert_eq!(kind, StorageKind::Sequence);
/// assert_eq!(kind.clear_behavior(), ClearBehavior::Bulk);
/// assert_eq!(StorageKind::Lock.clear_behavior(), ClearBehavior::Opaque);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Sequence,
    Mapping,
    Value,
    Lock,
}

impl StorageKind {
    pub const ALL: [StorageKind; 4] = [
        StorageKind::Sequence,
        StorageKind::Mapping,
        StorageKind::Value,
        StorageKind::Lock,
    ];

    /// Canonical lowercase name, as accepted by `FromStr`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Sequence => "sequence",
            StorageKind::Mapping => "mapping",
            StorageKind::Value => "value",
            StorageKind::Lock => "lock",
        }
    }

    /// How a handle of this kind is reset by `Cache::clear`.
    pub const fn clear_behavior(&self) -> ClearBehavior {
        match self {
            StorageKind::Sequence | StorageKind::Mapping => ClearBehavior::Bulk,
            StorageKind::Value => ClearBehavior::Cell,
            StorageKind::Lock => ClearBehavior::Opaque,
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequence" | "array" | "list" => Ok(StorageKind::Sequence),
            "mapping" | "hash" | "map" => Ok(StorageKind::Mapping),
            "value" => Ok(StorageKind::Value),
            "lock" => Ok(StorageKind::Lock),
            _ => Err(CacheError::UnsupportedStorage(s.to_string())),
        }
    }
}

/// What clearing does to a handle, fixed when the handle is created.
///
/// * `Bulk` - contents are removed in place (sequences, mappings)
/// * `Cell` - the single stored payload is set to nothing (value cells)
/// * `Opaque` - clearing leaves the handle alone (locks)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClearBehavior {
    Bulk,
    Cell,
    Opaque,
}
