use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// In-process key-value cache with per-entry TTL.
///
/// Expiry is evaluated inside [`get`](TtlCache::get); there is no background
/// sweep. Entries are written once per TTL window, so readers either see a
/// complete value or nothing. The mutex covers the whole read-check-write
/// sequence, which is all the atomicity the engines need.
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value if present and not yet expired. An expired
    /// entry is dropped on the spot.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.entries.lock().expect("cache mutex poisoned");
        match guard.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                guard.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let mut guard = self.entries.lock().expect("cache mutex poisoned");
        guard.insert(key, entry);
    }

    /// Removes the entry unconditionally. No-op when absent.
    pub fn invalidate(&self, key: &K) {
        let mut guard = self.entries.lock().expect("cache mutex poisoned");
        guard.remove(key);
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_value_within_ttl() {
        let cache = TtlCache::new();
        cache.set(1_i64, "fresh".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get(&1), Some("fresh".to_string()));
    }

    #[test]
    fn zero_ttl_entries_expire_immediately() {
        let cache = TtlCache::new();
        cache.set(1_i64, "stale".to_string(), Duration::ZERO);
        assert_eq!(cache.get(&1), None);
        // the expired entry is also evicted
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn invalidate_is_idempotent() {
        let cache = TtlCache::new();
        cache.set(1_i64, 42_u8, Duration::from_secs(60));
        cache.invalidate(&1);
        cache.invalidate(&1);
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn entries_are_keyed_independently() {
        let cache = TtlCache::new();
        cache.set(1_i64, 10_u8, Duration::from_secs(60));
        cache.set(2_i64, 20_u8, Duration::from_secs(60));
        cache.invalidate(&1);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(20));
    }
}
