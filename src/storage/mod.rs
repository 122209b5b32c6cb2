// src/storage/mod.rs
//! Durable key -> tagged value store for job and failure state.
//!
//! Values are stored as `(type tag, json bytes)`. The tag is the value's
//! fully qualified Rust type name and is checked again on read, so a value
//! can only be decoded as the type it was written with.

mod memory;
mod redis_storage;

pub use memory::MemoryStorage;
pub use redis_storage::RedisStorage;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;
use crate::job::Job;

/// A stored value together with its type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageResult {
    type_tag: String,
    data: Vec<u8>,
}

impl StorageResult {
    pub fn new(type_tag: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            type_tag: type_tag.into(),
            data,
        }
    }

    /// Serialize `value` and tag it with its type name.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self, StorageError> {
        Ok(Self::new(std::any::type_name::<T>(), serde_json::to_vec(value)?))
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Whether this entry was written as a `T`.
    pub fn is<T: ?Sized>(&self) -> bool {
        self.type_tag == std::any::type_name::<T>()
    }

    /// Decode as `T`; fails with [`StorageError::TypeMismatch`] if the tag differs.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StorageError> {
        if !self.is::<T>() {
            return Err(StorageError::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                found: self.type_tag.clone(),
            });
        }
        Ok(serde_json::from_slice(&self.data)?)
    }
}

/// Backend contract shared by the in-memory and Redis stores.
///
/// Keys are given without the store's namespace prefix; each backend adds
/// and strips its own.
#[async_trait]
pub trait JobStorage: Send + Sync {
    /// Store `entry` under `key`, overwriting silently.
    async fn set_entry(&self, key: &str, entry: StorageResult) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Option<StorageResult>, StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Delete every entry in this store's namespace.
    async fn remove_all(&self) -> Result<(), StorageError>;

    /// Every key currently stored in this store's namespace.
    async fn list_keys(&self) -> Result<Vec<String>, StorageError>;

    async fn remove_many(&self, keys: &[String]) -> Result<(), StorageError>;
}

/// Typed helpers available on every [`JobStorage`], `dyn` included.
#[async_trait]
pub trait JobStorageExt: JobStorage {
    async fn set<T>(&self, key: &str, value: &T) -> Result<(), StorageError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let entry = StorageResult::encode(value)?;
        self.set_entry(key, entry).await
    }

    /// `Ok(None)` when the key is absent, `TypeMismatch` when it holds another type.
    async fn get_as<T>(&self, key: &str) -> Result<Option<T>, StorageError>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(entry) => entry.decode().map(Some),
            None => Ok(None),
        }
    }

    /// Every stored value whose tag is `T`. Entries of other types are skipped.
    async fn get_typed_jobs<T>(&self) -> Result<Vec<T>, StorageError>
    where
        T: DeserializeOwned + Send,
    {
        let mut jobs = Vec::new();
        for key in self.list_keys().await? {
            if let Some(entry) = self.get(&key).await? {
                if entry.is::<T>() {
                    jobs.push(entry.decode()?);
                }
            }
        }
        Ok(jobs)
    }

    /// Bulk removal by job identity.
    async fn remove_jobs<J>(&self, jobs: &[J]) -> Result<(), StorageError>
    where
        J: Job,
    {
        let keys: Vec<String> = jobs.iter().map(|job| job.id()).collect();
        if keys.is_empty() {
            return Ok(());
        }
        self.remove_many(&keys).await
    }
}

#[async_trait]
impl<S: JobStorage + ?Sized> JobStorageExt for S {}
