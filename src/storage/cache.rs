//! Persistent robots.txt cache backed by the SQLite `kv_cache` table

use crate::robots::PersistentCache;
use crate::storage::{lock_storage, SharedStorage, Storage};
use async_trait::async_trait;
use std::time::Duration;

/// [`PersistentCache`] over shared SQLite storage
///
/// Storage failures are logged and reported as cache misses.
#[derive(Clone)]
pub struct SqliteCache {
    storage: SharedStorage,
}

impl SqliteCache {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl PersistentCache for SqliteCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let result = lock_storage(&self.storage).cache_get(key);
        match result {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Cache read for {} failed: {}", key, e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) {
        let result = lock_storage(&self.storage).cache_set(key, value, ttl);
        if let Err(e) = result {
            tracing::warn!("Cache write for {} failed: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_roundtrip_through_shared_storage() {
        let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let cache = SqliteCache::new(storage.clone());

        assert_eq!(cache.get("robots:https://a.example.com").await, None);

        cache
            .set("robots:https://a.example.com", b"User-agent: *", Duration::from_secs(60))
            .await;
        assert_eq!(
            cache.get("robots:https://a.example.com").await,
            Some(b"User-agent: *".to_vec())
        );

        let direct = storage.lock().unwrap().cache_get("robots:https://a.example.com").unwrap();
        assert!(direct.is_some());
    }
}
