//! TTL cache for gateway results
//!
//! Values are held behind `Arc`, so eviction or a sweep never invalidates a
//! value a concurrent reader is already returning.

use super::DataSource;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Arc<Value>,
    pub source: DataSource,
    stored_at: Instant,
}

pub struct TtlCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl TtlCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: Mutex::new(HashMap::with_capacity(capacity)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &str, now: Instant) -> Option<CacheEntry> {
        let mut entries = self.entries.lock();
        let fresh = entries
            .get(key)
            .map(|e| now.saturating_duration_since(e.stored_at) < self.ttl)?;
        if fresh {
            entries.get(key).cloned()
        } else {
            entries.remove(key);
            None
        }
    }

    pub fn put(&self, key: &str, data: Arc<Value>, source: DataSource) {
        self.put_at(key, data, source, Instant::now())
    }

    pub(crate) fn put_at(&self, key: &str, data: Arc<Value>, source: DataSource, now: Instant) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if !entries.contains_key(key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.stored_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                source,
                stored_at: now,
            },
        );
    }

    /// Drop expired entries; returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub(crate) fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.stored_at) < self.ttl);
        before - entries.len()
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let n = entries.len();
        entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(300), 10);
        let t0 = Instant::now();
        cache.put_at("stats", Arc::new(json!({"total": 3})), DataSource::Primary, t0);

        let hit = cache.get_at("stats", t0 + Duration::from_secs(299)).unwrap();
        assert_eq!(*hit.data, json!({"total": 3}));
        assert_eq!(hit.source, DataSource::Primary);

        assert!(cache.get_at("stats", t0 + Duration::from_secs(300)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn overflow_evicts_oldest() {
        let cache = TtlCache::new(Duration::from_secs(300), 2);
        let t0 = Instant::now();
        cache.put_at("a", Arc::new(json!(1)), DataSource::Primary, t0);
        cache.put_at("b", Arc::new(json!(2)), DataSource::Primary, t0 + Duration::from_secs(1));
        let held = cache.get_at("a", t0 + Duration::from_secs(1)).unwrap();

        cache.put_at("c", Arc::new(json!(3)), DataSource::Legacy, t0 + Duration::from_secs(2));
        assert_eq!(cache.len(), 2);
        assert!(cache.get_at("a", t0 + Duration::from_secs(2)).is_none());
        assert!(cache.get_at("c", t0 + Duration::from_secs(2)).is_some());
        // evicted value is still intact for the reader holding it
        assert_eq!(*held.data, json!(1));

        // overwriting an existing key never evicts
        cache.put_at("b", Arc::new(json!(20)), DataSource::Primary, t0 + Duration::from_secs(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let cache = TtlCache::new(Duration::from_secs(60), 10);
        let t0 = Instant::now();
        cache.put_at("old", Arc::new(json!(1)), DataSource::Primary, t0);
        cache.put_at("new", Arc::new(json!(2)), DataSource::Primary, t0 + Duration::from_secs(50));

        assert_eq!(cache.sweep_at(t0 + Duration::from_secs(70)), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.clear(), 1);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let cache = TtlCache::new(Duration::from_secs(60), 0);
        cache.put("k", Arc::new(json!(1)), DataSource::Primary);
        assert!(cache.get("k").is_none());
    }
}
