use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one cache instance's registry activity.
///
/// Tracks how handles are created and looked up using atomic operations, so
/// recording never takes a lock.
///
/// # Thread Safety
///
/// All operations use `Relaxed` ordering. Counters are independent of each other;
/// a snapshot read while other threads record may mix old and new values.
///
/// # Examples
///
/// ```
/// use keystash_core::CacheStats;
///
/// let stats = CacheStats::new();
///
/// stats.record_created();
/// stats.record_reused();
/// stats.record_hit();
/// stats.record_miss();
///
/// assert_eq!(stats.created(), 1);
/// assert_eq!(stats.lookups(), 2);
/// assert!((stats.hit_rate() - 0.5).abs() < 0.001);
/// ```
#[derive(Debug)]
pub struct CacheStats {
    created: AtomicU64,
    reused: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    clears: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self {
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            clears: AtomicU64::new(0),
        }
    }

    /// Records an `init` call that created a new handle.
    #[inline]
    pub fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an `init` call that found the handle already registered.
    #[inline]
    pub fn record_reused(&self) {
        self.reused.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lookup that found a handle.
    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lookup for a name that was never initialized.
    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn clears(&self) -> u64 {
        self.clears.load(Ordering::Relaxed)
    }

    /// Total lookups (hits + misses).
    #[inline]
    pub fn lookups(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Fraction of lookups that found a handle, 0.0 when there were none.
    ///
    /// ```
    /// use keystash_core::CacheStats;
    ///
    /// let stats = CacheStats::new();
    /// assert_eq!(stats.hit_rate(), 0.0);
    ///
    /// stats.record_hit();
    /// stats.record_hit();
    /// stats.record_miss();
    /// assert!((stats.hit_rate() - 0.6666).abs() < 0.001);
    /// ```
    #[inline]
    pub fn hit_rate(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        self.created.store(0, Ordering::Relaxed);
        self.reused.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.clears.store(0, Ordering::Relaxed);
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CacheStats {
    fn clone(&self) -> Self {
        Self {
            created: AtomicU64::new(self.created()),
            reused: AtomicU64::new(self.reused()),
            hits: AtomicU64::new(self.hits()),
            misses: AtomicU64::new(self.misses()),
            clears: AtomicU64::new(self.clears()),
        }
    }
}
