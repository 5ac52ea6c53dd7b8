//! Isochrone result cache keyed by request fingerprint.
//!
//! Exact-match only; a fingerprint, once written, is truth for that request
//! until a caller forces a refetch. Entries are never evicted. The whole map
//! persists under a single store key and survives across sessions.

use std::collections::HashMap;

use common::Store;
use geojson::FeatureCollection;
use tracing::warn;

const CACHE_KEY: &str = "isochrone-cache";

/// Build the cache key for one request. Coordinates keep their full `f64`
/// display precision; `|` never occurs in a float representation, so the key
/// parses back unambiguously even for negative coordinates.
pub fn fingerprint(lat: f64, lng: f64, minutes: u32) -> String {
    format!("{lat}|{lng}|{minutes}")
}

pub struct IsochroneCache {
    entries: HashMap<String, FeatureCollection>,
    store: Store,
}

impl IsochroneCache {
    /// Load the persisted cache; absent or malformed state starts empty.
    pub fn load(store: Store) -> Self {
        let entries = store.read::<HashMap<String, FeatureCollection>>(CACHE_KEY);
        Self { entries, store }
    }

    pub fn lookup(&self, fingerprint: &str) -> Option<&FeatureCollection> {
        self.entries.get(fingerprint)
    }

    /// Unconditional overwrite, then persist the whole map.
    pub fn store(&mut self, fingerprint: String, result: FeatureCollection) {
        self.entries.insert(fingerprint, result);
        if let Err(e) = self.store.write(CACHE_KEY, &self.entries) {
            warn!("Failed to persist isochrone cache: {}", e);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::{Feature, JsonObject};
    use std::sync::atomic::{AtomicU32, Ordering};

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_store() -> Store {
        let dir = std::env::temp_dir().join(format!(
            "reachmap-cache-test-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        Store::open(dir).expect("store should open")
    }

    fn collection(tag: &str) -> FeatureCollection {
        let mut members = JsonObject::new();
        members.insert("tag".into(), serde_json::Value::String(tag.into()));
        FeatureCollection {
            bbox: None,
            features: vec![Feature {
                bbox: None,
                geometry: None,
                id: None,
                properties: None,
                foreign_members: None,
            }],
            foreign_members: Some(members),
        }
    }

    #[test]
    fn test_fingerprint_distinguishes_travel_times() {
        let a = fingerprint(50.0647, 19.945, 5);
        let b = fingerprint(50.0647, 19.945, 10);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_unambiguous_for_negative_coordinates() {
        // (-1.5, 2.25) and (1.5, -2.25) must never collide, whatever the
        // delimiter does with minus signs.
        let a = fingerprint(-1.5, 2.25, 5);
        let b = fingerprint(1.5, -2.25, 5);
        assert_ne!(a, b);
        assert_eq!(a, "-1.5|2.25|5");
    }

    #[test]
    fn test_lookup_is_exact_match_only() {
        let mut cache = IsochroneCache::load(temp_store());
        cache.store(fingerprint(50.0647, 19.945, 5), collection("krakow"));

        assert!(cache.lookup(&fingerprint(50.0647, 19.945, 5)).is_some());
        // A nearby location is a different fingerprint, not a fuzzy hit.
        assert!(cache.lookup(&fingerprint(50.0648, 19.945, 5)).is_none());
    }

    #[test]
    fn test_store_overwrites() {
        let mut cache = IsochroneCache::load(temp_store());
        let key = fingerprint(50.0, 19.9, 5);
        cache.store(key.clone(), collection("old"));
        cache.store(key.clone(), collection("new"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(&key), Some(&collection("new")));
    }

    #[test]
    fn test_cache_survives_reload() {
        let store = temp_store();
        let key = fingerprint(50.0, 19.9, 5);
        {
            let mut cache = IsochroneCache::load(store.clone());
            cache.store(key.clone(), collection("persisted"));
        }
        let cache = IsochroneCache::load(store);
        assert_eq!(cache.lookup(&key), Some(&collection("persisted")));
    }
}
