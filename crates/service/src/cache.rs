//! Sharded TTL cache for expensive aggregate reads.
//!
//! Keys hash to one of a fixed set of shards, each behind its own `RwLock`,
//! so a write to one key only blocks readers of keys in the same shard —
//! never the whole cache. A poisoned shard degrades to a cache miss with a
//! logged diagnostic and keeps serving afterwards; caching is never
//! permanently disabled.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

const SHARD_COUNT: usize = 16;
const MAX_ENTRIES_PER_SHARD: usize = 256;

#[derive(Clone)]
struct Entry<T> {
    value: T,
    expires_at: Instant,
}

type Shard<T> = RwLock<HashMap<String, Entry<T>>>;

/// TTL-bounded memo for values of one type.
pub struct TtlCache<T: Clone> {
    shards: Vec<Shard<T>>,
    default_ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(default_ttl: Duration) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards, default_ttl }
    }

    fn shard(&self, key: &str) -> &Shard<T> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARD_COUNT]
    }

    fn read_shard<'a>(&self, shard: &'a Shard<T>) -> Option<RwLockReadGuard<'a, HashMap<String, Entry<T>>>> {
        match shard.read() {
            Ok(guard) => Some(guard),
            Err(poisoned) => {
                tracing::warn!("cache shard lock poisoned; degrading to miss");
                shard.clear_poison();
                Some(poisoned.into_inner())
            }
        }
    }

    fn write_shard<'a>(&self, shard: &'a Shard<T>) -> RwLockWriteGuard<'a, HashMap<String, Entry<T>>> {
        match shard.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("cache shard lock poisoned; recovering");
                shard.clear_poison();
                poisoned.into_inner()
            }
        }
    }

    /// Fetch a live value; expired entries count as misses.
    pub fn get(&self, key: &str) -> Option<T> {
        let shard = self.shard(key);
        let guard = self.read_shard(shard)?;
        guard
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    /// Store under the default TTL.
    pub fn set(&self, key: impl Into<String>, value: T) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let key = key.into();
        let shard = self.shard(&key);
        let mut guard = self.write_shard(shard);

        if guard.len() >= MAX_ENTRIES_PER_SHARD {
            let now = Instant::now();
            guard.retain(|_, entry| entry.expires_at > now);
        }
        if guard.len() >= MAX_ENTRIES_PER_SHARD {
            // Still full of live entries; drop an arbitrary one to stay bounded.
            if let Some(evict) = guard.keys().next().cloned() {
                guard.remove(&evict);
            }
        }

        guard.insert(key, Entry { value, expires_at: Instant::now() + ttl });
    }

    pub fn invalidate(&self, key: &str) {
        let shard = self.shard(key);
        self.write_shard(shard).remove(key);
    }

    /// Drop every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        for shard in &self.shards {
            self.write_shard(shard).retain(|key, _| !key.starts_with(prefix));
        }
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| self.read_shard(shard).map_or(0, |guard| guard.len()))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_round_trip() {
        let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(60));
        cache.set("stats:overview", "cached".to_string());

        assert_eq!(cache.get("stats:overview"), Some("cached".to_string()));
        assert_eq!(cache.get("stats:other"), None);
    }

    #[test]
    fn test_entries_expire() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_millis(20));
        cache.set("short-lived", 7);
        assert_eq!(cache.get("short-lived"), Some(7));

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("short-lived"), None);
    }

    #[test]
    fn test_per_entry_ttl_overrides_default() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_millis(10));
        cache.set_with_ttl("long-lived", 1, Duration::from_secs(60));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("long-lived"), Some(1));
    }

    #[test]
    fn test_invalidate_single_key() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        cache.set("a", 1);
        cache.set("b", 2);
        cache.invalidate("a");

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_invalidate_prefix() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        cache.set("stats:overview", 1);
        cache.set("stats:top:5", 2);
        cache.set("prompt:xyz", 3);

        cache.invalidate_prefix("stats:");

        assert_eq!(cache.get("stats:overview"), None);
        assert_eq!(cache.get("stats:top:5"), None);
        assert_eq!(cache.get("prompt:xyz"), Some(3));
    }

    #[test]
    fn test_shard_stays_bounded() {
        let cache: TtlCache<usize> = TtlCache::new(Duration::from_secs(60));
        for i in 0..SHARD_COUNT * MAX_ENTRIES_PER_SHARD * 2 {
            cache.set(format!("key:{i}"), i);
        }
        assert!(cache.len() <= SHARD_COUNT * MAX_ENTRIES_PER_SHARD);
    }

    #[test]
    fn test_poisoned_shard_recovers() {
        let cache: std::sync::Arc<TtlCache<u32>> =
            std::sync::Arc::new(TtlCache::new(Duration::from_secs(60)));
        cache.set("survivor", 9);

        // Poison one shard by panicking while holding its write lock.
        let poisoner = std::sync::Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let shard = poisoner.shard("survivor");
            let _guard = shard.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        // Degrades to a working cache, not a permanently dead one.
        assert_eq!(cache.get("survivor"), Some(9));
        cache.set("after-poison", 1);
        assert_eq!(cache.get("after-poison"), Some(1));
    }
}
