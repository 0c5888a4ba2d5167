use std::time::Duration;

use thiserror::Error;

/// Errors produced by key derivation, backend selection and storage handles.
///
/// Every failure is returned to the immediate caller. Nothing in this crate
/// retries an operation or falls back to another backend on its own.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A backend kind that this crate does not know how to build.
    #[error("unsupported caching type: {0}")]
    UnsupportedBackend(String),

    /// A storage kind that the selected backend cannot produce.
    #[error("unsupported caching data type encountered: {0}")]
    UnsupportedStorage(String),

    /// An operation that is never allowed, such as writing into the handle registry.
    #[error("operation not permitted: {0}")]
    NotPermitted(String),

    /// A lock could not be acquired within its acquire timeout.
    #[error("timed out after {timeout:?} waiting for lock `{name}`")]
    LockTimeout { name: String, timeout: Duration },

    /// The remote backend was enabled but no client has been configured.
    #[error("remote backend enabled without a configured client")]
    BackendNotInitialized,

    /// The remote client could not be created from the given options.
    #[error("failed to connect remote backend: {0}")]
    Connection(String),

    /// The remote store rejected an operation.
    #[error("remote backend error: {0}")]
    Backend(String),

    /// A payload could not be marshaled to or from its stored form.
    #[error("failed to marshal payload: {0}")]
    Marshal(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, CacheError>;
