//! Tile response cache
//!
//! Process-wide, TTL-bounded, capacity-bounded cache keyed by
//! `(server url, layer, bbox quantised to 10 m)`. Nearby requests for
//! the same neighbourhood land on the same key, so repeated designs in
//! one area skip the tile server entirely. Safe under concurrent
//! request handling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use grid_geometry::Bbox;
use grid_topology::RawFeature;
use serde::Serialize;
use tracing::debug;

/// Quantisation step for cache keys, in metres.
const KEY_QUANTISATION_M: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub server_url: String,
    pub layer: &'static str,
    pub bbox: [i64; 4],
}

impl TileKey {
    pub fn new(server_url: &str, layer: &'static str, bbox: Bbox) -> Self {
        Self {
            server_url: server_url.to_string(),
            layer,
            bbox: bbox.quantised(KEY_QUANTISATION_M),
        }
    }
}

struct TileEntry {
    stored_at: Instant,
    features: Arc<Vec<RawFeature>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate_percent: f64,
    pub size: usize,
}

pub struct TileCache {
    entries: DashMap<TileKey, TileEntry>,
    ttl: Duration,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TileCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &TileKey) -> Option<Arc<Vec<RawFeature>>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.stored_at.elapsed() <= self.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Tile cache hit: {} {:?}", key.layer, key.bbox);
                return Some(entry.features.clone());
            }
        }
        // Expired entries are dropped on the next lookup
        self.entries
            .remove_if(key, |_, entry| entry.stored_at.elapsed() > self.ttl);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, key: TileKey, features: Arc<Vec<RawFeature>>) {
        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            TileEntry {
                stored_at: Instant::now(),
                features,
            },
        );
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .max_by_key(|entry| entry.value().stored_at.elapsed())
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate_percent: if total > 0 {
                hits as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            size: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(n: usize) -> Arc<Vec<RawFeature>> {
        Arc::new(vec![RawFeature::default(); n])
    }

    #[test]
    fn test_nearby_bboxes_share_a_key() {
        let a = TileKey::new("http://gis", "pole", Bbox::new(101.0, 202.0, 499.0, 601.0));
        let b = TileKey::new("http://gis", "pole", Bbox::new(103.0, 198.0, 501.0, 599.0));
        assert_eq!(a, b);

        let c = TileKey::new("http://gis", "road", Bbox::new(101.0, 202.0, 499.0, 601.0));
        assert_ne!(a, c);
    }

    #[test]
    fn test_hit_miss_accounting() {
        let cache = TileCache::new(Duration::from_secs(300), 10);
        let key = TileKey::new("http://gis", "pole", Bbox::new(0.0, 0.0, 400.0, 400.0));

        assert!(cache.get(&key).is_none());
        cache.insert(key.clone(), features(3));
        assert_eq!(cache.get(&key).unwrap().len(), 3);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = TileCache::new(Duration::from_millis(1), 10);
        let key = TileKey::new("http://gis", "pole", Bbox::new(0.0, 0.0, 400.0, 400.0));
        cache.insert(key.clone(), features(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_capacity_eviction() {
        let cache = TileCache::new(Duration::from_secs(300), 2);
        for i in 0..3 {
            let key = TileKey::new(
                "http://gis",
                "pole",
                Bbox::new(i as f64 * 1000.0, 0.0, i as f64 * 1000.0 + 400.0, 400.0),
            );
            cache.insert(key, features(1));
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(cache.stats().size <= 2);
    }
}
