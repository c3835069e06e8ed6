use crate::cache::CacheError;
use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_accessed: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration, now: Instant) -> Self {
        Self {
            value,
            inserted_at: now,
            last_accessed: now,
            ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// Capacity-bounded LRU map whose entries expire after a TTL.
///
/// Expired entries are never returned: `get` drops them on the spot, inserts
/// into a full cache purge them before touching live entries, and
/// [`spawn_sweeper`] removes the rest in the background.
///
/// Every operation takes one short-lived lock; nothing awaits while holding it.
/// Reads update recency, so concurrent reads are serialized under that lock too.
#[derive(Debug)]
pub struct ExpiringLruCache<K: Hash + Eq, V> {
    name: &'static str,
    entries: Mutex<LruCache<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K, V> ExpiringLruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Result<Self, CacheError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(CacheError::InvalidCapacity)?;
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }

        Ok(Self {
            name: "cache",
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        })
    }

    /// Name used in log records.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired = entries.peek(key)?.is_expired(now);
        if expired {
            entries.pop(key);
            debug!(cache = self.name, "Expired entry dropped on read");
            return None;
        }

        let entry = entries.get_mut(key)?;
        entry.last_accessed = now;
        Some(entry.value.clone())
    }

    pub fn put(&self, key: K, value: V) {
        self.insert(key, value, self.ttl)
    }

    /// Inserts with a TTL that overrides the cache-wide one for this entry.
    pub fn put_with_ttl(&self, key: K, value: V, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }
        self.insert(key, value, ttl);
        Ok(())
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Self::purge_expired_locked(&mut entries, now)
    }

    fn insert(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let replacing = entries.contains(&key);
        if !replacing && entries.len() >= entries.cap().get() {
            let purged = Self::purge_expired_locked(&mut entries, now);
            if purged > 0 {
                debug!(cache = self.name, purged, "Purged expired entries to make room");
            }
        }

        let evicted = entries.push(key, CacheEntry::new(value, ttl, now));
        if let (false, Some((_, entry))) = (replacing, evicted) {
            debug!(
                cache = self.name,
                idle_ms = now.duration_since(entry.last_accessed).as_millis() as u64,
                "Evicted least recently used entry"
            );
        }
    }

    fn purge_expired_locked(entries: &mut LruCache<K, CacheEntry<V>>, now: Instant) -> usize {
        let expired = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();

        for key in &expired {
            entries.pop(key);
        }

        expired.len()
    }
}

/// A cache whose expired entries can be dropped in bulk.
pub trait Expiring: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn purge_expired(&self) -> usize;
}

impl<K, V> Expiring for ExpiringLruCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn purge_expired(&self) -> usize {
        ExpiringLruCache::purge_expired(self)
    }
}

/// Periodically purges expired entries of `cache` until `cancellation_token` fires.
pub fn spawn_sweeper<C: Expiring>(
    cache: Arc<C>,
    interval: Duration,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::task::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(MIN_SWEEP_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                _ = ticker.tick() => {
                    let purged = cache.purge_expired();
                    trace!(cache = cache.name(), purged, "Sweep finished");
                }
                _ = cancellation_token.cancelled() => {
                    debug!(cache = cache.name(), "Sweeper stopped");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize, ttl_ms: u64) -> ExpiringLruCache<&'static str, u32> {
        ExpiringLruCache::new(capacity, Duration::from_millis(ttl_ms)).unwrap()
    }

    #[test]
    fn rejects_invalid_configuration() {
        let zero_capacity = ExpiringLruCache::<String, u32>::new(0, Duration::from_secs(1));
        assert_eq!(zero_capacity.unwrap_err(), CacheError::InvalidCapacity);

        let zero_ttl = ExpiringLruCache::<String, u32>::new(1, Duration::ZERO);
        assert_eq!(zero_ttl.unwrap_err(), CacheError::InvalidTtl);
    }

    #[test]
    fn evicts_oldest_entry_when_full() {
        let cache = cache(2, 1000);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("c", 3);

        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn read_refreshes_recency() {
        let cache = cache(2, 1000);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.put("c", 3);

        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn get_after_put_b_keeps_b_and_evicts_a() {
        let cache = cache(2, 1000);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.get(&"b"), Some(2));
        cache.put("c", 3);

        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let cache = cache(2, 1000);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("a", 10);

        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let cache = ExpiringLruCache::new(3, Duration::from_secs(60)).unwrap();
        for i in 0..100u32 {
            cache.put(i % 17, i);
            if i % 3 == 0 {
                cache.get(&(i % 5));
            }
            assert!(cache.size() <= 3);
        }
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = cache(2, 1000);
        cache.put("a", 1);

        assert!(cache.invalidate(&"a"));
        assert!(!cache.invalidate(&"a"));
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_a_miss_and_is_removed() {
        let cache = cache(4, 1000);
        cache.put("a", 1);
        cache.put("b", 2);

        tokio::time::advance(Duration::from_millis(1001)).await;

        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_do_not_extend_lifetime() {
        let cache = cache(4, 1000);
        cache.put("a", 1);

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(cache.get(&"a"), Some(1));
        tokio::time::advance(Duration::from_millis(600)).await;

        assert_eq!(cache.get(&"a"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn full_insert_drops_expired_entries_before_live_ones() {
        let cache = cache(2, 1000);
        cache.put("live", 2);
        cache.put_with_ttl("short", 1, Duration::from_millis(100)).unwrap();

        // "live" is the least recently used entry, "short" is already dead.
        tokio::time::advance(Duration::from_millis(200)).await;
        cache.put("new", 3);

        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get(&"live"), Some(2));
        assert_eq!(cache.get(&"new"), Some(3));
        assert_eq!(cache.get(&"short"), None);
    }

    #[test]
    fn per_entry_ttl_must_be_positive() {
        let cache = cache(2, 1000);
        assert_eq!(
            cache.put_with_ttl("a", 1, Duration::ZERO),
            Err(CacheError::InvalidTtl)
        );
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_in_background() {
        let cache = Arc::new(cache(4, 1000));
        cache.put("a", 1);
        cache.put("b", 2);

        let token = CancellationToken::new();
        let handle = spawn_sweeper(cache.clone(), Duration::from_millis(250), token.clone());

        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert_eq!(cache.size(), 0);

        token.cancel();
        handle.await.unwrap();
    }
}
