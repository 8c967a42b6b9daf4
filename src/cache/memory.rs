//! Memory Cache Module
//!
//! The thread-safe cache: one lock around the store, deferred release of
//! everything removed, an owned background trimmer, and platform signal
//! handlers.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cache::builder::CacheBuilder;
use crate::cache::store::{Detached, LruStore};
use crate::cache::CacheStats;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::release::DeferredRelease;
use crate::tasks::{Trim, TrimReport, TrimTask};

/// Callback run by a signal handler before it decides whether to clear.
pub type SignalHook = Box<dyn Fn() + Send + Sync>;

/// Sentinel stored in `max_age_nanos` for "no age limit".
const NO_AGE_LIMIT: u64 = u64::MAX;

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(NO_AGE_LIMIT - 1)
}

// == Cache Core ==
/// State shared between the cache handle and its trimmer.
pub(crate) struct CacheCore<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    name: String,
    store: Mutex<LruStore<K, V>>,
    max_count: AtomicUsize,
    max_cost: AtomicU64,
    max_age_nanos: AtomicU64,
    trim_interval_nanos: AtomicU64,
    clear_on_memory_warning: AtomicBool,
    clear_on_background: AtomicBool,
    release: DeferredRelease,
}

impl<K, V> CacheCore<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    fn max_age(&self) -> Option<Duration> {
        match self.max_age_nanos.load(Ordering::Relaxed) {
            NO_AGE_LIMIT => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }
}

impl<K, V> CacheCore<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Send + 'static,
{
    pub(crate) fn new(config: &CacheConfig, release: DeferredRelease) -> Self {
        Self {
            name: config.name.clone(),
            store: Mutex::new(LruStore::new()),
            max_count: AtomicUsize::new(config.max_count),
            max_cost: AtomicU64::new(config.max_cost),
            max_age_nanos: AtomicU64::new(config.max_age.map_or(NO_AGE_LIMIT, duration_to_nanos)),
            trim_interval_nanos: AtomicU64::new(duration_to_nanos(config.trim_interval)),
            clear_on_memory_warning: AtomicBool::new(config.clear_on_memory_warning),
            clear_on_background: AtomicBool::new(config.clear_on_background),
            release,
        }
    }

    /// Runs `op` under the lock, then releases whatever it detached with the
    /// lock dropped. Returns the number of entries detached.
    fn evict<F>(&self, op: F) -> usize
    where
        F: FnOnce(&mut LruStore<K, V>, Instant) -> Detached<K, V>,
    {
        let detached = {
            let mut store = self.store.lock();
            op(&mut *store, Instant::now())
        };
        let evicted = detached.len();
        if !detached.is_empty() {
            self.release.release(detached);
        }
        evicted
    }
}

impl<K, V> Drop for CacheCore<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    fn drop(&mut self) {
        // Entries still cached at teardown follow the release policy too.
        let remaining = self.store.get_mut().take_all();
        if !remaining.is_empty() {
            debug!(
                cache = %self.name,
                entries = remaining.len(),
                "releasing entries on teardown"
            );
            self.release.release(remaining);
        }
    }
}

impl<K, V> Trim for CacheCore<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn trim_interval(&self) -> Duration {
        Duration::from_nanos(self.trim_interval_nanos.load(Ordering::Relaxed))
    }

    fn trim(&self) -> TrimReport {
        let max_cost = self.max_cost.load(Ordering::Relaxed);
        let max_count = self.max_count.load(Ordering::Relaxed);

        let by_cost = self.evict(|store, _| store.trim_to_cost(max_cost));
        let by_count = self.evict(|store, _| store.trim_to_count(max_count));
        let by_age = match self.max_age() {
            Some(max_age) => self.evict(|store, now| store.trim_to_age(max_age, now)),
            None => 0,
        };

        TrimReport {
            by_cost,
            by_count,
            by_age,
        }
    }
}

// == Memory Cache ==
/// A bounded, thread-safe, in-process LRU cache.
///
/// Every operation takes a single lock for O(1) work, or O(k) for a trim
/// evicting k entries. Removed entries are destroyed after the lock is
/// released, on the context picked by the release policy.
///
/// `set` never evicts. Limits are enforced by the background trimmer (when
/// a tokio runtime is available) or by explicit `trim*` calls.
///
/// # Example
/// ```
/// use memory_cache::{CacheBuilder, MemoryCache};
///
/// let cache: MemoryCache<String, u32> = CacheBuilder::new()
///     .auto_trim(false)
///     .release_asynchronously(false)
///     .build()
///     .unwrap();
///
/// cache.set("a".to_string(), 1, 3).unwrap();
/// cache.set("b".to_string(), 2, 5).unwrap();
/// assert_eq!(cache.trim_to_cost(6), 1);
/// assert!(!cache.contains("a"));
/// assert_eq!(cache.get("b"), Some(2));
/// ```
///
/// Keys are stored in both the index and their entry, so `K` must be
/// `Clone` in addition to `Hash + Eq`. Values are returned by clone.
pub struct MemoryCache<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    core: Arc<CacheCore<K, V>>,
    trimmer: Option<TrimTask>,
    memory_pressure_hook: Option<SignalHook>,
    background_hook: Option<SignalHook>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    // == Constructors ==
    /// Creates a cache with the default configuration.
    pub fn new() -> Result<Self> {
        CacheBuilder::new().build()
    }

    /// Creates a cache from an existing configuration.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        CacheBuilder::from_config(config.clone()).build()
    }

    pub(crate) fn from_parts(
        core: Arc<CacheCore<K, V>>,
        trimmer: Option<TrimTask>,
        memory_pressure_hook: Option<SignalHook>,
        background_hook: Option<SignalHook>,
    ) -> Self {
        Self {
            core,
            trimmer,
            memory_pressure_hook,
            background_hook,
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    // == Contains ==
    /// Checks for a key without affecting recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.core.store.lock().contains(key)
    }

    // == Get ==
    /// Returns a clone of the cached value and marks it most recently used.
    ///
    /// Use a cheaply clonable `V` (such as `Arc<T>`) for large payloads.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut store = self.core.store.lock();
        let now = Instant::now();
        store.get(key, now)
    }

    // == Set ==
    /// Inserts or replaces a value with the given cost.
    ///
    /// Never trims. A replaced value is released like an evicted entry.
    /// Fails only if the aggregate cost would overflow `u64`, in which case
    /// nothing changes.
    pub fn set(&self, key: K, value: V, cost: u64) -> Result<()> {
        let detached = {
            let mut store = self.core.store.lock();
            let now = Instant::now();
            store.insert(key, value, cost, now)?
        };
        if !detached.is_empty() {
            self.core.release.release(detached);
        }
        Ok(())
    }

    // == Remove ==
    /// Removes a key if present.
    pub fn remove<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.core.evict(|store, _| store.remove(key));
    }

    // == Clear ==
    /// Empties the cache. The lock is held only for a container swap; the
    /// previous contents are destroyed afterwards.
    pub fn clear(&self) {
        let cleared = self.core.evict(|store, _| store.take_all());
        if cleared > 0 {
            debug!(cache = %self.core.name, cleared, "cache cleared");
        }
    }

    // == Trims ==
    /// Evicts least recently used entries until at most `limit` remain.
    /// Returns the number evicted.
    pub fn trim_to_count(&self, limit: usize) -> usize {
        let evicted = self.core.evict(|store, _| store.trim_to_count(limit));
        self.log_trim("count", evicted)
    }

    /// Evicts least recently used entries until the total cost is at most
    /// `limit`. Returns the number evicted.
    pub fn trim_to_cost(&self, limit: u64) -> usize {
        let evicted = self.core.evict(|store, _| store.trim_to_cost(limit));
        self.log_trim("cost", evicted)
    }

    /// Evicts entries idle for longer than `max_age`. A zero age empties the
    /// cache. Returns the number evicted.
    pub fn trim_to_age(&self, max_age: Duration) -> usize {
        let evicted = self.core.evict(|store, now| store.trim_to_age(max_age, now));
        self.log_trim("age", evicted)
    }

    fn log_trim(&self, limit: &'static str, evicted: usize) -> usize {
        if evicted > 0 {
            debug!(cache = %self.core.name, limit, evicted, "trim evicted entries");
        }
        evicted
    }

    /// Runs one cost, count and age pass against the configured limits on
    /// the calling thread.
    pub fn trim(&self) -> TrimReport {
        self.core.trim()
    }

    // == Observation ==
    pub fn count(&self) -> usize {
        self.core.store.lock().len()
    }

    pub fn total_cost(&self) -> u64 {
        self.core.store.lock().total_cost()
    }

    pub fn stats(&self) -> CacheStats {
        self.core.store.lock().stats()
    }

    /// Walks the whole cache checking its structural invariants. O(n) under
    /// the lock; meant for diagnostics and tests.
    pub fn validate(&self) -> Result<()> {
        self.core.store.lock().validate()
    }

    /// True while a background trimmer is attached and running.
    pub fn is_auto_trimming(&self) -> bool {
        self.trimmer.as_ref().is_some_and(|task| !task.is_finished())
    }

    // == Signal Handlers ==
    /// Entry point for the platform's memory-pressure signal.
    pub fn on_memory_pressure(&self) {
        info!(cache = %self.core.name, "memory pressure signalled");
        if let Some(hook) = &self.memory_pressure_hook {
            hook();
        }
        if self.clear_on_memory_warning() {
            self.clear();
        }
    }

    /// Entry point for the platform's background-transition signal.
    pub fn on_background_transition(&self) {
        info!(cache = %self.core.name, "background transition signalled");
        if let Some(hook) = &self.background_hook {
            hook();
        }
        if self.clear_on_background() {
            self.clear();
        }
    }
}

// == Configuration Accessors ==
impl<K, V> MemoryCache<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    pub fn max_count(&self) -> usize {
        self.core.max_count.load(Ordering::Relaxed)
    }

    pub fn set_max_count(&self, limit: usize) {
        self.core.max_count.store(limit, Ordering::Relaxed);
    }

    pub fn max_cost(&self) -> u64 {
        self.core.max_cost.load(Ordering::Relaxed)
    }

    pub fn set_max_cost(&self, limit: u64) {
        self.core.max_cost.store(limit, Ordering::Relaxed);
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.core.max_age()
    }

    pub fn set_max_age(&self, max_age: Option<Duration>) {
        let nanos = max_age.map_or(NO_AGE_LIMIT, duration_to_nanos);
        self.core.max_age_nanos.store(nanos, Ordering::Relaxed);
    }

    pub fn trim_interval(&self) -> Duration {
        Duration::from_nanos(self.core.trim_interval_nanos.load(Ordering::Relaxed))
    }

    /// Changes the trimmer's interval, effective after its current sleep.
    /// A zero interval is ignored.
    pub fn set_trim_interval(&self, interval: Duration) {
        if interval.is_zero() {
            return;
        }
        self.core
            .trim_interval_nanos
            .store(duration_to_nanos(interval), Ordering::Relaxed);
    }

    pub fn release_on_main(&self) -> bool {
        self.core.release.release_on_main()
    }

    pub fn set_release_on_main(&self, value: bool) {
        self.core.release.set_release_on_main(value);
    }

    pub fn release_asynchronously(&self) -> bool {
        self.core.release.release_asynchronously()
    }

    pub fn set_release_asynchronously(&self, value: bool) {
        self.core.release.set_release_asynchronously(value);
    }

    pub fn clear_on_memory_warning(&self) -> bool {
        self.core.clear_on_memory_warning.load(Ordering::Relaxed)
    }

    pub fn set_clear_on_memory_warning(&self, value: bool) {
        self.core
            .clear_on_memory_warning
            .store(value, Ordering::Relaxed);
    }

    pub fn clear_on_background(&self) -> bool {
        self.core.clear_on_background.load(Ordering::Relaxed)
    }

    pub fn set_clear_on_background(&self, value: bool) {
        self.core.clear_on_background.store(value, Ordering::Relaxed);
    }
}

impl<K, V> Drop for MemoryCache<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    fn drop(&mut self) {
        if let Some(trimmer) = self.trimmer.take() {
            trimmer.abort();
            debug!(cache = %self.core.name, "trim task cancelled");
        }
    }
}

impl<K, V> fmt::Debug for MemoryCache<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("name", &self.core.name)
            .field("max_count", &self.max_count())
            .field("max_cost", &self.max_cost())
            .field("max_age", &self.max_age())
            .field("trim_interval", &self.trim_interval())
            .field("release", &self.core.release)
            .field("auto_trim", &self.trimmer.is_some())
            .finish()
    }
}
