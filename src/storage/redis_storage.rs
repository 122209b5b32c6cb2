// src/storage/redis_storage.rs
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};

use crate::config::RedisStorageOptions;
use crate::error::{JobsError, StorageError};
use crate::storage::{JobStorage, StorageResult};
use crate::utils::constants::{DEL_SCRIPT, FIELD_DATA, FIELD_TYPE, HMGET_SCRIPT, SCAN_COUNT, SET_SCRIPT};
use crate::utils::rdconfig::RedisConnector;

/// Shared store backed by Redis. Each entry is a hash `{type, data}` under
/// `<instance_name>:<key>`, so several servers can share one database.
#[derive(Clone)]
pub struct RedisStorage {
    connector: Arc<RedisConnector>,
    prefix: String,
    set_script: Arc<Script>,
    hmget_script: Arc<Script>,
    del_script: Arc<Script>,
}

impl RedisStorage {
    /// Validates the options and the URL; the connection itself is opened lazily.
    pub fn new(options: RedisStorageOptions) -> Result<Self, JobsError> {
        if options.instance_name.trim().is_empty() {
            return Err(JobsError::InvalidConfiguration(
                "redis storage requires a non-empty instance name".into(),
            ));
        }
        let client = Client::open(options.configuration.as_str()).map_err(|e| {
            JobsError::InvalidConfiguration(format!("redis configuration '{}' is not valid: {}", options.configuration, e))
        })?;

        Ok(Self {
            connector: Arc::new(RedisConnector::new(client)),
            prefix: format!("{}:", options.instance_name),
            set_script: Arc::new(Script::new(SET_SCRIPT)),
            hmget_script: Arc::new(Script::new(HMGET_SCRIPT)),
            del_script: Arc::new(Script::new(DEL_SCRIPT)),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn key_pattern(&self) -> String {
        format!("{}*", escape_pattern(&self.prefix))
    }

    async fn conn(&self) -> Result<MultiplexedConnection, StorageError> {
        Ok(self.connector.get_redis_connection().await?)
    }
}

/// Escape glob metacharacters so an instance name matches literally in KEYS/SCAN.
pub(crate) fn escape_pattern(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl JobStorage for RedisStorage {
    async fn set_entry(&self, key: &str, entry: StorageResult) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        let _: i64 = self
            .set_script
            .key(self.namespaced(key))
            .arg(FIELD_TYPE)
            .arg(entry.type_tag())
            .arg(FIELD_DATA)
            .arg(entry.data())
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StorageResult>, StorageError> {
        let mut conn = self.conn().await?;
        let (type_tag, data): (Option<String>, Option<Vec<u8>>) = self
            .hmget_script
            .key(self.namespaced(key))
            .arg(FIELD_TYPE)
            .arg(FIELD_DATA)
            .invoke_async(&mut conn)
            .await?;

        Ok(match (type_tag, data) {
            (Some(type_tag), Some(data)) => Some(StorageResult::new(type_tag, data)),
            _ => None,
        })
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(self.namespaced(key)).await?;
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        let deleted: i64 = self
            .del_script
            .arg(self.key_pattern())
            .invoke_async(&mut conn)
            .await?;
        tracing::debug!(prefix = %self.prefix, deleted, "removed all stored entries");
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut conn = self.conn().await?;
        let pattern = self.key_pattern();

        // SCAN instead of KEYS so a large namespace does not block the server
        let mut cursor: u64 = 0;
        let mut keys: Vec<String> = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;
            keys.extend(
                batch
                    .into_iter()
                    .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string)),
            );
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn remove_many(&self, keys: &[String]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let namespaced: Vec<String> = keys.iter().map(|k| self.namespaced(k)).collect();
        conn.del::<_, ()>(namespaced).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(url: &str, instance: &str) -> RedisStorageOptions {
        RedisStorageOptions {
            configuration: url.to_string(),
            instance_name: instance.to_string(),
        }
    }

    #[test]
    fn glob_characters_are_escaped() {
        assert_eq!(escape_pattern("plain:"), "plain:");
        assert_eq!(escape_pattern("a*b?c:"), "a\\*b\\?c:");
        assert_eq!(escape_pattern("[x]\\"), "\\[x\\]\\\\");
    }

    #[test]
    fn instance_name_is_required() {
        let err = RedisStorage::new(options("redis://127.0.0.1:6379", "  ")).err().unwrap();
        assert!(matches!(err, JobsError::InvalidConfiguration(_)));
    }

    #[test]
    fn bad_url_is_rejected_up_front() {
        let err = RedisStorage::new(options("not-a-url", "jobs")).err().unwrap();
        assert!(matches!(err, JobsError::InvalidConfiguration(_)));
    }

    #[test]
    fn keys_are_namespaced_by_instance() {
        let storage = RedisStorage::new(options("redis://127.0.0.1:6379", "billing")).unwrap();
        assert_eq!(storage.prefix(), "billing:");
        assert_eq!(storage.namespaced("job-1"), "billing:job-1");
        assert_eq!(storage.key_pattern(), "billing:*");
    }
}
