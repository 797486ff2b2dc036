//! Time-bounded cache of path -> value, shared by every pipeline.
//!
//! The same map serves two roles: values are written through on ingress
//! (save/add) with the incoming TTL and on egress (read results) with the
//! outgoing TTL. Expired entries report a miss immediately; a background
//! sweep reclaims their memory on a coarse timer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;

use crate::config::Config;

/// period of the background eviction sweep
pub(crate) const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// Concurrent TTL cache. All methods take `&self`; the cache manages its own
/// locking so callers can use it from any worker thread.
pub struct Cache {
    entries: RwLock<HashMap<String, Entry>>,
    incoming_ttl: Duration,
    outgoing_ttl: Duration,
    incoming_enabled: bool,
    outgoing_enabled: bool,
}

impl Cache {
    /// Builds a cache from the TTL and enable flags in `config`.
    pub fn new(config: &Config) -> Self {
        Cache {
            entries: RwLock::new(HashMap::new()),
            incoming_ttl: config.incoming_ttl(),
            outgoing_ttl: config.outgoing_ttl(),
            incoming_enabled: config.cache_incoming_all,
            outgoing_enabled: config.cache_outgoing_all,
        }
    }

    /// Looks up `path`. Reports a miss when the entry is absent, expired, or
    /// when caching is disabled on both sides in the configuration.
    pub fn get(&self, path: &str) -> Option<Value> {
        if !self.incoming_enabled && !self.outgoing_enabled {
            return None;
        }
        let entries = self.entries.read();
        let entry = entries.get(path)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Stores a value arriving on the save/add path with the incoming TTL.
    ///
    /// A write to a dotted path also invalidates the root segment's entry:
    /// any cached object for the root is now stale relative to the subpath.
    pub fn put_incoming(&self, path: &str, value: Value) {
        if !self.incoming_enabled {
            return;
        }
        let mut entries = self.entries.write();
        entries.insert(
            path.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + self.incoming_ttl,
            },
        );
        if let Some(idx) = path.find('.') {
            entries.remove(&path[..idx]);
        }
    }

    /// Stores a resolved read result with the outgoing TTL.
    pub fn put_outgoing(&self, path: &str, value: Value) {
        if !self.outgoing_enabled {
            return;
        }
        self.entries.write().insert(
            path.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + self.outgoing_ttl,
            },
        );
    }

    /// Drops the entries for `path` and its root segment. Used by the delete
    /// pipeline so a removed value cannot be served from cache until expiry.
    pub fn invalidate(&self, path: &str) {
        let mut entries = self.entries.write();
        entries.remove(path);
        if let Some(idx) = path.find('.') {
            entries.remove(&path[..idx]);
        }
    }

    /// Evicts every expired entry. Called from the background sweeper.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, entry| entry.expires_at > now);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(incoming: bool, outgoing: bool, ttl_sec: u64) -> Config {
        Config {
            cache_incoming_all: incoming,
            cache_outgoing_all: outgoing,
            cache_incoming_time_sec: ttl_sec,
            cache_outgoing_time_sec: ttl_sec,
            ..Config::default()
        }
    }

    #[test]
    fn put_then_get() {
        let cache = Cache::new(&config(true, true, 60));
        cache.put_incoming("users.alice", json!({"age": 30}));
        assert_eq!(cache.get("users.alice"), Some(json!({"age": 30})));
        assert_eq!(cache.get("users.bob"), None);
    }

    #[test]
    fn disabled_cache_always_misses() {
        let cache = Cache::new(&config(false, false, 60));
        cache.put_outgoing("x", json!(1));
        assert_eq!(cache.get("x"), None);
    }

    #[test]
    fn zero_ttl_entries_are_expired_on_read() {
        let cache = Cache::new(&config(true, true, 0));
        cache.put_incoming("x", json!(1));
        assert_eq!(cache.get("x"), None);
    }

    #[test]
    fn dotted_put_invalidates_root() {
        let cache = Cache::new(&config(true, true, 60));
        cache.put_outgoing("users", json!({"alice": {"age": 30}}));
        cache.put_incoming("users.alice.age", json!(31));
        // the cached root object is stale relative to the subpath write
        assert_eq!(cache.get("users"), None);
        assert_eq!(cache.get("users.alice.age"), Some(json!(31)));
    }

    #[test]
    fn invalidate_removes_path_and_root() {
        let cache = Cache::new(&config(true, true, 60));
        cache.put_outgoing("users", json!({"alice": {"age": 30}}));
        cache.put_outgoing("users.alice", json!({"age": 30}));
        cache.invalidate("users.alice");
        assert_eq!(cache.get("users.alice"), None);
        assert_eq!(cache.get("users"), None);
    }

    #[test]
    fn sweep_drops_expired_entries() {
        let cache = Cache::new(&config(true, true, 0));
        cache.put_incoming("a", json!(1));
        cache.put_incoming("b", json!(2));
        assert_eq!(cache.len(), 2);
        cache.sweep();
        assert_eq!(cache.len(), 0);
    }
}
