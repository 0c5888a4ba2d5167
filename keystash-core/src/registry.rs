//! # Backend registry
//!
//! Which backend cache instances create their storage on. A process normally
//! configures it once at startup through [`BackendRegistry::global`], and every
//! [`Cache`](crate::Cache) built with `Cache::new` reads it from there. Tests and
//! embedders that want isolation build their own registry and hand it to
//! `Cache::with_registry`.
//!
//! # Examples
//!
//! ```
//! use keystash_core::{BackendKind, BackendOptions, BackendRegistry};
//!
//! let registry = BackendRegistry::new();
//! assert_eq!(registry.backend_type(), BackendKind::Local);
//!
//! let options = BackendOptions::new().with("url", "memory://docs-registry");
//! registry.configure(BackendKind::Remote, &options).unwrap();
//! assert_eq!(registry.backend_type(), BackendKind::Remote);
//! ```

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::factory::{get_lock, get_storage, Backend};
use crate::kind::{BackendKind, StorageKind};
use crate::options::{BackendOptions, StorageOptions};
use crate::remote::{self, RemoteClient};
use crate::storage::{LockStore, Storage};

/// Prefix of the environment variables read by `configure_from_env`.
pub const ENV_PREFIX: &str = "KEYSTASH_";

static GLOBAL_REGISTRY: Lazy<Arc<BackendRegistry>> =
    Lazy::new(|| Arc::new(BackendRegistry::new()));

#[derive(Default)]
struct RegistryState {
    active: Option<BackendKind>,
    remote: Option<Arc<dyn RemoteClient>>,
}

/// Holds the active backend kind and the remote client, if one was configured.
///
/// # Thread Safety
///
/// State sits behind a `parking_lot::RwLock`: reads (every storage creation) are
/// concurrent, writes (configuration) are rare and exclusive.
#[derive(Default)]
pub struct BackendRegistry {
    state: RwLock<RegistryState>,
}

impl BackendRegistry {
    /// A registry with nothing configured; it reports `local`.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<BackendRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Initializes `kind` and makes it the active backend.
    ///
    /// `Remote` connects a client from `options` first (see
    /// [`remote::connect`]); a failed connection leaves the registry unchanged.
    /// `Local` needs no initialization and ignores `options`.
    pub fn configure(&self, kind: BackendKind, options: &BackendOptions) -> Result<()> {
        match kind {
            BackendKind::Remote => {
                let client = remote::connect(options)?;
                let mut state = self.state.write();
                state.remote = Some(client);
                state.active = Some(kind);
            }
            BackendKind::Local => {
                self.state.write().active = Some(kind);
            }
        }
        debug!(backend = %kind, "backend configured");
        Ok(())
    }

    /// Installs an already-built remote client and activates the remote backend.
    pub fn configure_remote(&self, client: Arc<dyn RemoteClient>) {
        let mut state = self.state.write();
        state.remote = Some(client);
        state.active = Some(BackendKind::Remote);
        debug!("remote backend configured with external client");
    }

    /// Selects `kind` without initializing anything.
    ///
    /// Enabling `Remote` before any client was configured is allowed, but storage
    /// creation then fails with [`CacheError::BackendNotInitialized`].
    pub fn enable(&self, kind: BackendKind) {
        self.state.write().active = Some(kind);
        debug!(backend = %kind, "backend enabled");
    }

    /// The active backend kind, `local` if never set.
    pub fn backend_type(&self) -> BackendKind {
        self.state.read().active.unwrap_or_default()
    }

    /// Resolves the active backend for storage creation.
    pub fn backend(&self) -> Result<Backend> {
        let state = self.state.read();
        match state.active.unwrap_or_default() {
            BackendKind::Local => Ok(Backend::Local),
            BackendKind::Remote => state
                .remote
                .clone()
                .map(Backend::Remote)
                .ok_or(CacheError::BackendNotInitialized),
        }
    }

    /// Creates a storage handle on whatever backend is active right now.
    pub fn storage(
        &self,
        kind: StorageKind,
        full_name: &str,
        options: &StorageOptions,
    ) -> Result<Storage> {
        get_storage(&self.backend()?, kind, full_name, options)
    }

    /// Creates a lock handle on whatever backend is active right now.
    pub fn lock(&self, full_name: &str, options: &StorageOptions) -> Result<Arc<dyn LockStore>> {
        get_lock(&self.backend()?, full_name, options)
    }

    /// Configures from `KEYSTASH_*` environment variables.
    ///
    /// See [`configure_from_vars`](Self::configure_from_vars).
    pub fn configure_from_env(&self) -> Result<BackendKind> {
        self.configure_from_vars(std::env::vars())
    }

    /// Configures from `(name, value)` pairs shaped like environment variables.
    ///
    /// `KEYSTASH_BACKEND` picks the kind (default `local`); every other
    /// `KEYSTASH_<OPTION>` becomes the lowercased option `<option>`. Other names
    /// are ignored.
    ///
    /// ```
    /// use keystash_core::{BackendKind, BackendRegistry};
    ///
    /// let registry = BackendRegistry::new();
    /// let kind = registry
    ///     .configure_from_vars([
    ///         ("KEYSTASH_BACKEND".to_string(), "remote".to_string()),
    ///         ("KEYSTASH_URL".to_string(), "memory://docs-env".to_string()),
    ///         ("HOME".to_string(), "/root".to_string()),
    ///     ])
    ///     .unwrap();
    /// assert_eq!(kind, BackendKind::Remote);
    /// ```
    pub fn configure_from_vars<I>(&self, vars: I) -> Result<BackendKind>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut kind = BackendKind::Local;
        let mut options = BackendOptions::new();
        for (name, value) in vars {
            let Some(option) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if option == "BACKEND" {
                kind = value.parse()?;
            } else {
                options.insert(option.to_lowercase(), value);
            }
        }
        self.configure(kind, &options)?;
        Ok(kind)
    }
}
