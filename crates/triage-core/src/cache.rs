//! Time-bounded memoization of collaborator responses.
//!
//! One cache instance is shared by every concurrent session in the process.
//! Entries are keyed by the exact request (URL plus parameters) and expire a
//! fixed TTL after the write; a read past expiry is a miss and evicts the
//! entry. A single coarse lock guards the map; critical sections are a map
//! lookup or insert, so per-key locking is not worth its complexity here.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

/// Default entry lifetime: 5 minutes from write.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Process-local TTL cache for collaborator call results.
#[derive(Debug)]
pub struct ContextCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Value, Instant)>>,
}

impl ContextCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a live entry, or `None` on miss/expiry.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Instant::now())
    }

    /// Store a value, stamping it with the current time.
    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.put_at(key.into(), value, Instant::now());
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<Value> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, written)) if now.duration_since(*written) < self.ttl => {
                Some(value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put_at(&self, key: String, value: Value, now: Instant) {
        self.entries.lock().unwrap().insert(key, (value, now));
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hit_before_ttl_and_miss_after() {
        let cache = ContextCache::new(Duration::from_secs(300));
        let wrote = Instant::now();
        cache.put_at("k".to_string(), json!({"n": 1}), wrote);

        // Just inside the TTL window the value comes back unchanged.
        let almost = wrote + Duration::from_secs(300) - Duration::from_millis(1);
        assert_eq!(cache.get_at("k", almost), Some(json!({"n": 1})));

        // Just past the TTL it is a miss and the entry is evicted.
        let past = wrote + Duration::from_secs(300) + Duration::from_millis(1);
        assert_eq!(cache.get_at("k", past), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overwrite_restamps() {
        let cache = ContextCache::new(Duration::from_secs(10));
        let t0 = Instant::now();
        cache.put_at("k".to_string(), json!(1), t0);
        cache.put_at("k".to_string(), json!(2), t0 + Duration::from_secs(8));

        // The rewrite pushed expiry out past the original window.
        let t = t0 + Duration::from_secs(12);
        assert_eq!(cache.get_at("k", t), Some(json!(2)));
    }

    #[test]
    fn test_miss_on_unknown_key() {
        let cache = ContextCache::default();
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn test_clear() {
        let cache = ContextCache::default();
        cache.put("a", json!(1));
        cache.put("b", json!(2));
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
