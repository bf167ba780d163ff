//! Bounded TTL/LRU cache with single-flight compute.
//!
//! Used by the bundle loader and the detection engine for read-mostly
//! entries (signature → detection result, provider → compiled extractor).
//! The map lock is held only around lookup/insert/evict; producers run
//! outside it, serialized per key through a [`OnceLock`] cell so that at
//! most one concurrent caller computes a given key.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

struct Slot<V> {
    cell: Arc<OnceLock<V>>,
    expires_at: Instant,
    stamp: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Slot<V>>,
    /// Recency queue of (key, stamp); entries whose stamp no longer matches
    /// the live slot are stale and skipped during eviction.
    recency: VecDeque<(K, u64)>,
    tick: u64,
}

/// Per-instance bounded cache. Values are cloned out; keep them cheap
/// (`Arc` payloads for anything non-trivial).
pub struct TtlCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    max_entries: usize,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: VecDeque::new(),
                tick: 0,
            }),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    /// Look up a completed entry. Expired entries are removed on contact.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        let expired = match inner.entries.get(key) {
            Some(slot) => slot.expires_at <= now,
            None => return None,
        };
        if expired {
            inner.entries.remove(key);
            return None;
        }

        let value = inner.entries.get(key).and_then(|s| s.cell.get().cloned());
        if value.is_some() {
            Self::touch(&mut inner, key);
        }
        value
    }

    /// Fetch the value for `key`, computing it with `producer` on a miss.
    ///
    /// At most one concurrent caller runs the producer for a given key;
    /// the others block on the same cell and clone its result.
    pub fn get_or_compute(&self, key: K, producer: impl FnOnce() -> V) -> V {
        let cell = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();

            let stale = inner
                .entries
                .get(&key)
                .is_some_and(|slot| slot.expires_at <= now);
            if stale {
                inner.entries.remove(&key);
            }

            if let Some(slot) = inner.entries.get(&key) {
                let cell = slot.cell.clone();
                Self::touch(&mut inner, &key);
                cell
            } else {
                if inner.entries.len() >= self.max_entries {
                    Self::evict_one(&mut inner);
                }
                let cell: Arc<OnceLock<V>> = Arc::new(OnceLock::new());
                inner.tick += 1;
                let stamp = inner.tick;
                inner.entries.insert(
                    key.clone(),
                    Slot {
                        cell: cell.clone(),
                        expires_at: now + self.ttl,
                        stamp,
                    },
                );
                inner.recency.push_back((key.clone(), stamp));
                cell
            }
        };

        cell.get_or_init(producer).clone()
    }

    pub fn invalidate(&self, key: &K) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.remove(key);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
        inner.recency.clear();
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn touch(inner: &mut Inner<K, V>, key: &K) {
        inner.tick += 1;
        let stamp = inner.tick;
        if let Some(slot) = inner.entries.get_mut(key) {
            slot.stamp = stamp;
            inner.recency.push_back((key.clone(), stamp));
        }
    }

    /// Remove the least-recently-used live entry. Stale recency records
    /// (superseded stamps, removed keys) are discarded along the way.
    fn evict_one(inner: &mut Inner<K, V>) {
        while let Some((key, stamp)) = inner.recency.pop_front() {
            let live = inner
                .entries
                .get(&key)
                .is_some_and(|slot| slot.stamp == stamp);
            if live {
                inner.entries.remove(&key);
                return;
            }
        }
        // Recency queue exhausted without a live record; drop an arbitrary
        // entry to honor the bound.
        if let Some(key) = inner.entries.keys().next().cloned() {
            inner.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_get_or_compute_caches() {
        let cache: TtlCache<String, u32> = TtlCache::new(8, Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        let first = cache.get_or_compute("k".to_string(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            7
        });
        let second = cache.get_or_compute("k".to_string(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            8
        });

        assert_eq!(first, 7);
        assert_eq!(second, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache: TtlCache<&str, u32> = TtlCache::new(8, Duration::from_millis(10));
        cache.get_or_compute("k", || 1);
        assert_eq!(cache.get(&"k"), Some(1));

        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.get(&"k"), None);

        let recomputed = cache.get_or_compute("k", || 2);
        assert_eq!(recomputed, 2);
    }

    #[test]
    fn test_lru_eviction_respects_recency() {
        let cache: TtlCache<&str, u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.get_or_compute("a", || 1);
        cache.get_or_compute("b", || 2);
        // Touch "a" so "b" is the eviction candidate.
        assert_eq!(cache.get(&"a"), Some(1));
        cache.get_or_compute("c", || 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_single_flight_under_contention() {
        let cache: Arc<TtlCache<&'static str, u64>> =
            Arc::new(TtlCache::new(8, Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                std::thread::spawn(move || {
                    cache.get_or_compute("key", move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Widen the race window.
                        std::thread::sleep(Duration::from_millis(20));
                        42
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache: TtlCache<&str, u32> = TtlCache::new(8, Duration::from_secs(60));
        cache.get_or_compute("a", || 1);
        cache.get_or_compute("b", || 2);

        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));

        cache.clear();
        assert!(cache.is_empty());
    }
}
