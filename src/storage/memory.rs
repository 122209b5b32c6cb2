// src/storage/memory.rs
use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;

use crate::error::StorageError;
use crate::storage::{JobStorage, StorageResult};
use crate::utils::constants::{MEMORY_DEFAULT_CAPACITY, MEMORY_NAMESPACE};

/// Process-local store backed by an expiring cache.
///
/// Keys are enumerated straight from the cache, so `list_keys` and
/// `get_typed_jobs` see exactly the live (non-expired) entries.
#[derive(Clone)]
pub struct MemoryStorage {
    cache: Cache<String, StorageResult>,
    prefix: String,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_options(MEMORY_DEFAULT_CAPACITY, None)
    }

    /// `time_to_live` of `None` keeps entries until removed or evicted by capacity.
    pub fn with_options(max_capacity: u64, time_to_live: Option<Duration>) -> Self {
        let mut builder = Cache::builder().max_capacity(max_capacity);
        if let Some(ttl) = time_to_live {
            builder = builder.time_to_live(ttl);
        }
        Self {
            cache: builder.build(),
            prefix: format!("{}:", MEMORY_NAMESPACE),
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn namespaced_keys(&self) -> Vec<String> {
        self.cache
            .iter()
            .filter(|(k, _)| k.starts_with(&self.prefix))
            .map(|(k, _)| k.to_string())
            .collect()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStorage for MemoryStorage {
    async fn set_entry(&self, key: &str, entry: StorageResult) -> Result<(), StorageError> {
        self.cache.insert(self.namespaced(key), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StorageResult>, StorageError> {
        Ok(self.cache.get(&self.namespaced(key)))
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.cache.invalidate(&self.namespaced(key));
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), StorageError> {
        for key in self.namespaced_keys() {
            self.cache.invalidate(&key);
        }
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self
            .namespaced_keys()
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn remove_many(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            self.cache.invalidate(&self.namespaced(key));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JobStorageExt;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Cleanup {
        table: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Digest {
        recipients: u32,
    }

    #[tokio::test]
    async fn set_get_remove() {
        let storage = MemoryStorage::new();
        storage.set("k", &Cleanup { table: "events".into() }).await.unwrap();

        let entry = storage.get("k").await.unwrap().unwrap();
        assert!(entry.is::<Cleanup>());
        assert_eq!(
            storage.get_as::<Cleanup>("k").await.unwrap(),
            Some(Cleanup { table: "events".into() })
        );

        storage.remove("k").await.unwrap();
        assert!(storage.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_overwrites_silently() {
        let storage = MemoryStorage::new();
        storage.set("k", &Digest { recipients: 1 }).await.unwrap();
        storage.set("k", &Digest { recipients: 2 }).await.unwrap();
        assert_eq!(storage.get_as::<Digest>("k").await.unwrap(), Some(Digest { recipients: 2 }));
        assert_eq!(storage.list_keys().await.unwrap(), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn typed_listing_filters_by_tag() {
        let storage = MemoryStorage::new();
        storage.set("a", &Cleanup { table: "a".into() }).await.unwrap();
        storage.set("b", &Digest { recipients: 4 }).await.unwrap();
        storage.set("c", &Cleanup { table: "c".into() }).await.unwrap();

        assert_eq!(storage.list_keys().await.unwrap(), vec!["a", "b", "c"]);

        let mut cleanups = storage.get_typed_jobs::<Cleanup>().await.unwrap();
        cleanups.sort_by(|x, y| x.table.cmp(&y.table));
        assert_eq!(cleanups.len(), 2);
        assert_eq!(cleanups[1].table, "c");

        let digests = storage.get_typed_jobs::<Digest>().await.unwrap();
        assert_eq!(digests, vec![Digest { recipients: 4 }]);
    }

    #[tokio::test]
    async fn remove_many_and_remove_all() {
        let storage = MemoryStorage::new();
        for key in ["x", "y", "z"] {
            storage.set(key, &Digest { recipients: 0 }).await.unwrap();
        }

        storage.remove_many(&["x".to_string(), "y".to_string()]).await.unwrap();
        assert_eq!(storage.list_keys().await.unwrap(), vec!["z"]);

        storage.remove_all().await.unwrap();
        assert!(storage.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mismatched_read_is_an_error() {
        let storage = MemoryStorage::new();
        storage.set("k", &Digest { recipients: 9 }).await.unwrap();
        assert!(matches!(
            storage.get_as::<Cleanup>("k").await,
            Err(StorageError::TypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn entries_expire() {
        let storage = MemoryStorage::with_options(100, Some(Duration::from_millis(50)));
        storage.set("short", &Digest { recipients: 1 }).await.unwrap();
        std::thread::sleep(Duration::from_millis(120));
        assert!(storage.get("short").await.unwrap().is_none());
        assert!(storage.list_keys().await.unwrap().is_empty());
    }
}
