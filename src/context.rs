// src/context.rs
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::storage::JobStorage;

/// Case-insensitive, read-only key/value bag handed to every job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    inner: HashMap<String, Value>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(&key.to_lowercase())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(&key.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub(crate) fn insert(&mut self, key: &str, value: Value) {
        self.inner.insert(key.to_lowercase(), value);
    }
}

impl<K: AsRef<str>> FromIterator<(K, Value)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut properties = Properties::new();
        for (k, v) in iter {
            properties.insert(k.as_ref(), v);
        }
        properties
    }
}

/// Execution environment shared by every task a server spawns.
#[derive(Clone)]
pub struct TaskContext {
    server_id: String,
    properties: Arc<Properties>,
    storage: Arc<dyn JobStorage>,
    cancellation: CancellationToken,
}

impl TaskContext {
    pub fn new(
        server_id: impl Into<String>,
        properties: Properties,
        storage: Arc<dyn JobStorage>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            properties: Arc::new(properties),
            storage,
            cancellation,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// The server's job store, for jobs that inspect or replay persisted failures.
    pub fn storage(&self) -> &Arc<dyn JobStorage> {
        &self.storage
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("server_id", &self.server_id)
            .field("properties", &self.properties)
            .field("shutdown_requested", &self.is_shutdown_requested())
            .finish()
    }
}

/// `<host>:<random>` when a host name is known, just the random part otherwise.
pub(crate) fn globally_unique_server_id() -> String {
    let token = nanoid::nanoid!();
    let host = std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .ok()
        .filter(|h| !h.trim().is_empty());

    match host {
        Some(host) => format!("{}:{}", host.trim().to_lowercase(), token),
        None => token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    #[test]
    fn properties_ignore_key_case() {
        let props: Properties = [("Region", json!("eu-west")), ("RETRIES", json!(3))].into_iter().collect();
        assert_eq!(props.get("region"), Some(&json!("eu-west")));
        assert_eq!(props.get("Retries"), Some(&json!(3)));
        assert!(props.contains_key("REGION"));
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn shutdown_flag_follows_token() {
        let token = CancellationToken::new();
        let ctx = TaskContext::new("srv", Properties::new(), Arc::new(MemoryStorage::new()), token.clone());
        assert!(!ctx.is_shutdown_requested());
        token.cancel();
        assert!(ctx.is_shutdown_requested());
        assert!(ctx.properties().is_empty());
    }

    #[test]
    fn server_ids_are_unique() {
        assert_ne!(globally_unique_server_id(), globally_unique_server_id());
    }
}
