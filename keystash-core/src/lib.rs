//! # Keystash Core
//!
//! Core types for the Keystash cache-handle library.
//!
//! A [`Cache`] turns arbitrary key input into a stable SHA-256 [`CacheKey`] and
//! hands out named storage handles (sequence, mapping, value cell, lock) that live
//! under that key on a pluggable backend.
//!
//! ## Features
//!
//! - **Stable Keys**: Collections are sorted before digesting, so `[b, a]` and `[a, b]` agree
//! - **Two Backends**: In-process storage, or a shared remote store (`memory://`, `redis://`)
//! - **Process Registry**: One switch selects the backend for every cache instance
//! - **Guarded Registry Access**: `init`, `get` and `clear` run under an internal lock
//! - **Atomic Clear-and-Recompute**: `clear_with` runs a callback before releasing the lock
//! - **Statistics**: Per-instance counters behind the `stats` feature
//!
//! ## Module Organization
//!
//! - [`keys`](crate::CacheKey) - Key derivation from strings, scalars and collections
//! - [`kind`](crate::StorageKind) - Backend and storage kinds
//! - [`storage`](crate::Storage) - Storage traits, lock guards and named handles
//! - [`local`] - In-process storage
//! - [`remote`] - Remote adapter and clients
//! - [`factory`] - Storage creation for a resolved backend
//! - [`registry`](crate::BackendRegistry) - Process-wide backend selection
//! - [`cache`](crate::Cache) - Cache instances
//!
mod cache;
mod error;
mod keys;
mod kind;
mod options;
mod registry;
mod storage;

pub mod factory;
pub mod local;
pub mod remote;

#[cfg(feature = "stats")]
mod stats;

pub use cache::{Cache, INTERNAL_LOCK_NAME, INTERNAL_LOCK_TIMEOUT};
pub use error::{CacheError, Result};
pub use keys::{CacheKey, KeySource};
pub use kind::{BackendKind, ClearBehavior, StorageKind};
pub use options::{BackendOptions, StorageOptions};
pub use registry::{BackendRegistry, ENV_PREFIX};
pub use remote::{RemoteClient, DEFAULT_LOCK_EXPIRATION, DEFAULT_LOCK_TIMEOUT};
pub use storage::{
    LockGuard, LockStore, LockToken, MappingStore, NamedStorageHandle, SequenceStore, Storage,
    ValueStore,
};

#[cfg(feature = "stats")]
pub use stats::CacheStats;
