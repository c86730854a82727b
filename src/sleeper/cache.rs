use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::clock::SharedClock;

struct CacheEntry<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

/// Keyed cache whose entries expire after a fixed time-to-live
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
    clock: SharedClock,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// Fresh value for `key`, dropping it if it has expired
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        if let Some(entry) = self.entries.get(key) {
            if now - entry.stored_at < self.ttl {
                return Some(entry.value.clone());
            }
        }
        // Re-checked under the shard lock so a concurrent insert survives
        self.entries
            .remove_if(key, |_, entry| now - entry.stored_at >= self.ttl);
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: self.clock.now(),
            },
        );
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now - entry.stored_at < self.ttl);
        before - self.entries.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn setup(ttl_secs: i64) -> (Arc<ManualClock>, TtlCache<u32>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 9, 7, 17, 0, 0).unwrap(),
        ));
        let cache = TtlCache::new(Duration::seconds(ttl_secs), clock.clone());
        (clock, cache)
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let (clock, cache) = setup(30);
        cache.insert("drafts:1", 7);

        clock.advance(Duration::seconds(29));
        assert_eq!(cache.get("drafts:1"), Some(7));

        clock.advance(Duration::seconds(1));
        assert_eq!(cache.get("drafts:1"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_purge_expired_keeps_fresh_entries() {
        let (clock, cache) = setup(60);
        cache.insert("old", 1);
        clock.advance(Duration::seconds(45));
        cache.insert("new", 2);
        clock.advance(Duration::seconds(20));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.get("new"), Some(2));
        assert_eq!(cache.get("old"), None);
    }

    #[test]
    fn test_expired_read_keeps_fresh_replacement() {
        let (clock, cache) = setup(30);
        cache.insert("state:nfl", 3);
        clock.advance(Duration::seconds(31));

        // Entry replaced after the expired read observed it
        let stale_now = clock.now();
        cache.insert("state:nfl", 4);
        cache
            .entries
            .remove_if("state:nfl", |_, entry| stale_now - entry.stored_at >= cache.ttl);
        assert_eq!(cache.get("state:nfl"), Some(4));

        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.len(), 1);
    }
}
