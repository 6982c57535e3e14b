// Short-lived cache for single-quota reads.
//
// Rapid successive reads of the same quota key (several HomeKit
// characteristics backed by one value) hit the cache instead of the cloud.

use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

/// Default time-to-live of a cached quota value.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct CachedValue {
    value: Value,
    expires_at: Instant,
}

/// Quota values keyed by `(serial number, quota key)`.
#[derive(Debug)]
pub struct QuotaCache {
    entries: DashMap<(String, String), CachedValue>,
    ttl: Duration,
}

impl QuotaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// The cached value, if present and not yet expired.
    pub fn get(&self, sn: &str, key: &str) -> Option<Value> {
        let cache_key = (sn.to_owned(), key.to_owned());
        let entry = self.entries.get(&cache_key)?;
        if entry.expires_at > Instant::now() {
            return Some(entry.value.clone());
        }
        drop(entry);
        self.entries.remove(&cache_key);
        None
    }

    pub fn insert(&self, sn: &str, key: &str, value: Value) {
        self.entries.insert(
            (sn.to_owned(), key.to_owned()),
            CachedValue {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for QuotaCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = QuotaCache::default();
        cache.insert("SN1", "pd.soc", json!(80));

        assert_eq!(cache.get("SN1", "pd.soc"), Some(json!(80)));
        assert_eq!(cache.get("SN2", "pd.soc"), None);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cache.get("SN1", "pd.soc"), Some(json!(80)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("SN1", "pd.soc"), None);
    }
}
