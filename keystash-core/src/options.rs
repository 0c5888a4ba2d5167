use std::collections::BTreeMap;
use std::time::Duration;

/// Per-handle options passed from `Cache::init_with` down to the storage factory.
///
/// Every field is optional. Unset fields take the factory's default for the
/// requested kind; set fields override it. The local backend ignores them.
///
/// # Examples
///
/// ```
/// use keystash_core::StorageOptions;
/// use std::time::Duration;
///
/// let options = StorageOptions::new()
///     .timeout(Duration::from_secs(2))
///     .expiration(Duration::from_secs(30));
///
/// assert_eq!(options.timeout, Some(Duration::from_secs(2)));
/// assert_eq!(options.marshal, None);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageOptions {
    /// Store payloads as JSON text (sequences and value cells).
    pub marshal: Option<bool>,
    /// How long a remote lock is held before it expires on its own.
    pub expiration: Option<Duration>,
    /// How long to wait when acquiring a remote lock.
    pub timeout: Option<Duration>,
}

impl StorageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marshal(mut self, marshal: bool) -> Self {
        self.marshal = Some(marshal);
        self
    }

    pub fn expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fills every unset field from `defaults`.
    pub fn merged_over(&self, defaults: &StorageOptions) -> StorageOptions {
        StorageOptions {
            marshal: self.marshal.or(defaults.marshal),
            expiration: self.expiration.or(defaults.expiration),
            timeout: self.timeout.or(defaults.timeout),
        }
    }
}

/// Flat connection options for the remote backend.
///
/// The core treats them as opaque strings; the remote connector interprets them
/// (`url`, or `host`/`port`/`db`/`password`).
///
/// # Examples
///
/// ```
/// use keystash_core::BackendOptions;
///
/// let options = BackendOptions::new()
///     .with("host", "cache.internal")
///     .with("port", "6380");
///
/// assert_eq!(options.get("host"), Some("cache.internal"));
/// assert_eq!(options.get("password"), None);
///
/// let collected: BackendOptions = [("url", "memory://shared")].into_iter().collect();
/// assert_eq!(collected.get("url"), Some("memory://shared"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendOptions {
    values: BTreeMap<String, String>,
}

impl BackendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BackendOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = BackendOptions::new();
        for (key, value) in iter {
            options.insert(key, value);
        }
        options
    }
}
