//! # Keystash
//!
//! Namespaced cache handles over a pluggable backend.
//!
//! ## Features
//!
//! - **Derived keys**: Any string, scalar or collection becomes a stable SHA-256 key
//! - **Named handles**: Sequences, mappings, value cells and locks under `<key>_<name>`
//! - **Backend switch**: In-process storage, or a remote store shared between processes
//! - **Atomic clears**: Reset handles and recompute them before anyone else looks
//!
//! ## Quick Start
//!
//! ```rust
//! use keystash::{Cache, StorageKind};
//! use serde_json::json;
//!
//! let cache = Cache::new("inventory");
//! cache.init("hosts", StorageKind::Sequence).unwrap();
//!
//! let hosts = cache.sequence("hosts").unwrap().unwrap();
//! hosts.push(json!("web-1")).unwrap();
//! assert_eq!(hosts.len().unwrap(), 1);
//! ```
//!
//! ## Composite Keys
//!
//! Collection input is sorted before digesting, so element order does not matter:
//!
//! ```rust
//! use keystash::{Cache, CacheKey};
//!
//! let a = Cache::new(&vec!["prod", "eu-west-1"]);
//! let b = Cache::new(&vec!["eu-west-1", "prod"]);
//! assert_eq!(a.key(), b.key());
//! assert_eq!(a.key(), &CacheKey::derive(&["eu-west-1", "prod"]));
//! ```
//!
//! ## Remote Backend
//!
//! Configure once at startup; every cache built afterwards uses it. Instances
//! created from the same key input then share their handles:
//!
//! ```rust
//! use keystash::{BackendKind, BackendOptions, Cache, StorageKind};
//! use serde_json::json;
//!
//! keystash::configure(
//!     BackendKind::Remote,
//!     &BackendOptions::new().with("url", "memory://docs-quick-start"),
//! )
//! .unwrap();
//!
//! let writer = Cache::new("jobs");
//! let reader = Cache::new("jobs");
//! writer.init("last", StorageKind::Value).unwrap();
//! reader.init("last", StorageKind::Value).unwrap();
//!
//! writer.value("last").unwrap().unwrap().set(Some(json!(42))).unwrap();
//! assert_eq!(reader.value("last").unwrap().unwrap().get().unwrap(), Some(json!(42)));
//!
//! keystash::enable(BackendKind::Local);
//! ```
//!
//! ## Clear and Recompute
//!
//! ```rust
//! use keystash::{Cache, StorageKind};
//! use serde_json::json;
//!
//! let cache = Cache::new("report");
//! cache.init("rows", StorageKind::Sequence).unwrap();
//!
//! cache
//!     .clear_with(&["rows"], || {
//!         let rows = cache.sequence("rows").unwrap().unwrap();
//!         rows.push(json!({"total": 3})).unwrap();
//!     })
//!     .unwrap();
//! ```

use std::sync::Arc;

pub use keystash_core::*;

/// Initializes `kind` on the process-wide registry and makes it active.
///
/// # Arguments
///
/// * `kind` - The backend to activate
/// * `options` - Connection options for `remote` (`url`, or `host`/`port`/`db`/`password`)
///
/// # Errors
///
/// A failed remote connection returns [`CacheError::Connection`] and leaves the
/// active backend unchanged.
pub fn configure(kind: BackendKind, options: &BackendOptions) -> Result<()> {
    BackendRegistry::global().configure(kind, options)
}

/// Installs a ready-made remote client on the process-wide registry and activates
/// the remote backend.
pub fn configure_remote(client: Arc<dyn RemoteClient>) {
    BackendRegistry::global().configure_remote(client)
}

/// Selects the active backend without initializing it.
pub fn enable(kind: BackendKind) {
    BackendRegistry::global().enable(kind)
}

/// The active backend of the process-wide registry.
pub fn backend_type() -> BackendKind {
    BackendRegistry::global().backend_type()
}

/// Configures the process-wide registry from `KEYSTASH_*` environment variables.
///
/// Returns the backend that was activated.
pub fn configure_from_env() -> Result<BackendKind> {
    BackendRegistry::global().configure_from_env()
}
