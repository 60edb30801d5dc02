use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Small in-process TTL cache with `load_or_compute` semantics.
///
/// Values are immutable snapshots; stale reads within the TTL are
/// acceptable by contract. Per-process only, no cross-instance
/// invalidation.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((at, value)) if at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock();
        // drop anything already expired while we hold the lock
        let ttl = self.ttl;
        entries.retain(|_, (at, _)| at.elapsed() < ttl);
        entries.insert(key, (Instant::now(), value));
    }

    /// Return the cached value or compute, store, and return a fresh one.
    pub fn load_or_compute<E>(
        &self,
        key: K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let value = compute()?;
        self.insert(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_or_compute_caches() {
        let cache: TtlCache<String, i32> = TtlCache::new(Duration::from_secs(60));
        let mut calls = 0;

        let a: Result<i32, ()> = cache.load_or_compute("k".to_string(), || {
            calls += 1;
            Ok(7)
        });
        assert_eq!(a, Ok(7));

        let b: Result<i32, ()> = cache.load_or_compute("k".to_string(), || {
            calls += 1;
            Ok(8)
        });
        assert_eq!(b, Ok(7));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_expiry() {
        let cache: TtlCache<&'static str, i32> = TtlCache::new(Duration::from_millis(0));
        cache.insert("k", 1);
        assert_eq!(cache.get(&"k"), None);
    }

    #[test]
    fn test_compute_errors_are_not_cached() {
        let cache: TtlCache<&'static str, i32> = TtlCache::new(Duration::from_secs(60));

        let err: Result<i32, &str> = cache.load_or_compute("k", || Err("boom"));
        assert!(err.is_err());

        let ok: Result<i32, &str> = cache.load_or_compute("k", || Ok(3));
        assert_eq!(ok, Ok(3));
    }
}
