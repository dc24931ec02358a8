use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::metrics;

/// Lower bound for the sweep interval derived from the default TTL.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct Inner<K, V> {
    entries: DashMap<K, Entry<V>>,
    /// Per-key gates serializing `get_or_compute` callers racing on a miss.
    inflight: DashMap<K, Arc<Mutex<()>>>,
    default_ttl: Duration,
    sweep_interval: Duration,
    sweeper_started: AtomicBool,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash,
{
    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

/// Concurrent key/value cache where every entry carries an absolute expiry.
///
/// Expired entries are invisible to readers immediately and removed either on
/// access or by a sweep task. The sweep task is spawned on the first write, so
/// a cache that is never written to never owns a task. Clones share storage.
pub struct TtlCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Eq + Hash, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.inner.entries.len())
            .field("default_ttl", &self.inner.default_ttl)
            .field("sweep_interval", &self.inner.sweep_interval)
            .finish()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache whose sweep interval is `max(default_ttl / 10, 1 minute)`.
    pub fn new(default_ttl: Duration) -> Self {
        let sweep_interval = (default_ttl / 10).max(MIN_SWEEP_INTERVAL);
        Self::with_sweep_interval(default_ttl, sweep_interval)
    }

    /// Create a cache with an explicit sweep interval.
    pub fn with_sweep_interval(default_ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                inflight: DashMap::new(),
                default_ttl,
                sweep_interval,
                sweeper_started: AtomicBool::new(false),
            }),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    pub fn sweep_interval(&self) -> Duration {
        self.inner.sweep_interval
    }

    /// Insert with the default TTL.
    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.inner.default_ttl);
    }

    /// Insert with an explicit TTL.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.inner.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        self.ensure_sweeper();
    }

    /// Look up a live entry. Expired entries are deleted on access.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let expired = match self.inner.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                metrics::CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.inner
                .entries
                .remove_if(key, |_, entry| entry.is_expired(now));
        }
        metrics::CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
        None
    }

    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        self.inner
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Return the cached value or populate it with `compute`.
    ///
    /// Concurrent callers missing on the same key wait for the first one, so
    /// `compute` runs at most once per miss. Errors are not cached.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let gate = self
            .inner
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = gate.lock().await;
            match self.get(&key) {
                Some(value) => Ok(value),
                None => {
                    let computed = compute().await;
                    if let Ok(value) = &computed {
                        self.set(key.clone(), value.clone());
                    }
                    computed
                }
            }
        };

        // The map and this task hold the last two references once every
        // waiter is gone.
        self.inner
            .inflight
            .remove_if(&key, |_, g| Arc::ptr_eq(g, &gate) && Arc::strong_count(g) <= 2);

        result
    }

    pub fn delete(&self, key: &K) -> Option<V> {
        self.inner.entries.remove(key).map(|(_, entry)| entry.value)
    }

    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    /// Remove and return an arbitrary live entry.
    pub fn pop(&self) -> Option<(K, V)> {
        loop {
            let key = self.inner.entries.iter().next().map(|e| e.key().clone())?;
            if let Some((key, entry)) = self.inner.entries.remove(&key) {
                if !entry.is_expired(Instant::now()) {
                    return Some((key, entry.value));
                }
            }
        }
    }

    /// Visit a snapshot of live entries until `visit` returns `false`.
    ///
    /// The snapshot is taken before the first call, so `visit` may use the
    /// cache freely.
    pub fn range<F>(&self, mut visit: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let now = Instant::now();
        let snapshot: Vec<(K, V)> = self
            .inner
            .entries
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .map(|e| (e.key().clone(), e.value().value.clone()))
            .collect();

        for (key, value) in &snapshot {
            if !visit(key, value) {
                break;
            }
        }
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Drop every expired entry now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    fn ensure_sweeper(&self) {
        if self.inner.sweeper_started.load(Ordering::Acquire) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            // Outside a runtime: rely on lazy deletion until a later write
            // happens inside one.
            return;
        };
        if self
            .inner
            .sweeper_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.sweep_interval;
        handle.spawn(sweep_loop(weak, interval));
    }
}

async fn sweep_loop<K, V>(cache: Weak<Inner<K, V>>, interval: Duration)
where
    K: Eq + Hash,
{
    loop {
        tokio::time::sleep(interval).await;
        let Some(inner) = cache.upgrade() else {
            break;
        };
        let removed = inner.purge_expired();
        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_sweep_interval_has_floor() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(30));
        assert_eq!(cache.sweep_interval(), MIN_SWEEP_INTERVAL);

        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(3600));
        assert_eq!(cache.sweep_interval(), Duration::from_secs(360));
    }

    #[test]
    fn test_set_and_get_without_runtime() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
        assert!(!cache.inner.sweeper_started.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_found_before_sweep() {
        let cache = TtlCache::with_sweep_interval(Duration::from_secs(60), Duration::from_secs(3600));
        cache.set_with_ttl("k", "v", Duration::from_millis(10));
        assert_eq!(cache.get(&"k"), Some("v"));

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!cache.contains(&"k"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"k"), None);
        // Deleted on access.
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_only_starts_after_write() {
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get(&"missing"), None);
        assert!(!cache.inner.sweeper_started.load(Ordering::Acquire));

        cache.set("x", 1);
        assert!(cache.inner.sweeper_started.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_background_sweep_removes_expired_entries() {
        let cache =
            TtlCache::with_sweep_interval(Duration::from_millis(10), Duration::from_millis(20));
        cache.set(1, "one");
        cache.set(2, "two");
        cache.set_with_ttl(3, "three", Duration::from_secs(60));

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&3), Some("three"));
    }

    #[tokio::test]
    async fn test_get_or_compute_is_single_flight() {
        let cache: TtlCache<String, u64> = TtlCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("key".to_string(), || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, String>(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.inner.inflight.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_compute_does_not_cache_errors() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));

        let first: Result<u32, &str> = cache.get_or_compute("k", || async { Err("boom") }).await;
        assert_eq!(first, Err("boom"));
        assert!(!cache.contains(&"k"));

        let second: Result<u32, &str> = cache.get_or_compute("k", || async { Ok(7) }).await;
        assert_eq!(second, Ok(7));
        assert_eq!(cache.get(&"k"), Some(7));
    }

    #[tokio::test]
    async fn test_delete_clear_and_pop() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("a", 1);
        cache.set("b", 2);

        assert_eq!(cache.delete(&"a"), Some(1));
        assert_eq!(cache.delete(&"a"), None);

        let popped = cache.pop();
        assert_eq!(popped, Some(("b", 2)));
        assert_eq!(cache.pop(), None);

        cache.set("c", 3);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_pop_skips_expired_entries() {
        let cache = TtlCache::with_sweep_interval(Duration::from_secs(60), Duration::from_secs(3600));
        cache.set_with_ttl("old", 1, Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.pop(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_range_visits_live_entries_and_stops_early() {
        let cache = TtlCache::with_sweep_interval(Duration::from_secs(60), Duration::from_secs(3600));
        for i in 0..5 {
            cache.set(i, i * 10);
        }
        cache.set_with_ttl(99, 990, Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut seen = Vec::new();
        cache.range(|k, v| {
            seen.push((*k, *v));
            true
        });
        seen.sort();
        assert_eq!(seen, vec![(0, 0), (1, 10), (2, 20), (3, 30), (4, 40)]);

        let mut visited = 0;
        cache.range(|_, _| {
            visited += 1;
            visited < 2
        });
        assert_eq!(visited, 2);
    }
}
