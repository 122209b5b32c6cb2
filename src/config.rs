// src/config.rs
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Properties;
use crate::error::Result;
use crate::job::Job;
use crate::registry::{JobDescriptor, JobRegistry};
use crate::services::process_server::ProcessServer;
use crate::storage::{JobStorage, MemoryStorage, RedisStorage};
use crate::throttler::{EveryMinuteThrottler, Throttler};
use crate::utils::constants::{
    DEFAULT_SHUTDOWN_TIMEOUT, ENV_INSTANCE, ENV_REDIS_URL, ENV_REDIS_URL_FALLBACK, MEMORY_DEFAULT_CAPACITY,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStorageOptions {
    /// Entries older than this are evicted. `None` keeps them until removed.
    pub time_to_live: Option<Duration>,
    pub max_capacity: u64,
}

impl Default for MemoryStorageOptions {
    fn default() -> Self {
        Self {
            time_to_live: None,
            max_capacity: MEMORY_DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisStorageOptions {
    /// Connection URL, e.g. `redis://127.0.0.1:6379`.
    pub configuration: String,
    /// Key namespace; every key is stored as `<instance_name>:<key>`.
    pub instance_name: String,
}

/// Which backend stores failed jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageOptions {
    Memory(MemoryStorageOptions),
    Redis(RedisStorageOptions),
}

impl Default for StorageOptions {
    fn default() -> Self {
        StorageOptions::Memory(MemoryStorageOptions::default())
    }
}

impl StorageOptions {
    /// Redis when `QRUSH_JOBS_REDIS_URL` (or `REDIS_URL`) is set, in-memory otherwise.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let url = lookup(ENV_REDIS_URL)
            .or_else(|| lookup(ENV_REDIS_URL_FALLBACK))
            .filter(|u| !u.trim().is_empty());

        match url {
            Some(configuration) => StorageOptions::Redis(RedisStorageOptions {
                configuration,
                instance_name: lookup(ENV_INSTANCE).unwrap_or_default(),
            }),
            None => StorageOptions::default(),
        }
    }

    /// Apply command-line style overrides on top of the environment.
    /// A `redis_url` switches to Redis; an `instance_name` applies only to Redis.
    pub fn with_overrides(self, redis_url: Option<String>, instance_name: Option<String>) -> Self {
        let mut options = match (self, redis_url) {
            (StorageOptions::Redis(opts), Some(configuration)) => {
                StorageOptions::Redis(RedisStorageOptions { configuration, ..opts })
            }
            (_, Some(configuration)) => StorageOptions::Redis(RedisStorageOptions {
                configuration,
                instance_name: String::new(),
            }),
            (options, None) => options,
        };
        if let (StorageOptions::Redis(opts), Some(instance)) = (&mut options, instance_name) {
            opts.instance_name = instance;
        }
        options
    }

    /// Construct the backend. Redis options are validated here; no connection is opened.
    pub fn build(&self) -> Result<Arc<dyn JobStorage>> {
        Ok(match self {
            StorageOptions::Memory(opts) => Arc::new(MemoryStorage::with_options(opts.max_capacity, opts.time_to_live)),
            StorageOptions::Redis(opts) => Arc::new(RedisStorage::new(opts.clone())?),
        })
    }
}

/// Everything a [`ProcessServer`] is built from: job registrations, storage,
/// properties handed to jobs, pacing and the shutdown window.
pub struct JobServerOptions {
    pub(crate) registry: JobRegistry,
    pub(crate) storage: StorageOptions,
    pub(crate) properties: Properties,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) throttler: Arc<dyn Throttler>,
}

impl Default for JobServerOptions {
    fn default() -> Self {
        Self {
            registry: JobRegistry::new(),
            storage: StorageOptions::default(),
            properties: Properties::new(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            throttler: Arc::new(EveryMinuteThrottler),
        }
    }
}

impl JobServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<J>(&mut self, cron_expression: &str) -> Result<&JobDescriptor>
    where
        J: Job + Serialize + Default + 'static,
    {
        self.registry.register::<J>(cron_expression)
    }

    pub fn register_with<J, F>(&mut self, cron_expression: &str, factory: F) -> Result<&JobDescriptor>
    where
        J: Job + Serialize + 'static,
        F: Fn() -> J + Send + Sync + 'static,
    {
        self.registry.register_with(cron_expression, factory)
    }

    pub fn register_in_zone<J, F>(&mut self, cron_expression: &str, time_zone: Tz, factory: F) -> Result<&JobDescriptor>
    where
        J: Job + Serialize + 'static,
        F: Fn() -> J + Send + Sync + 'static,
    {
        self.registry.register_in_zone(cron_expression, time_zone, factory)
    }

    pub fn storage(mut self, storage: StorageOptions) -> Self {
        self.storage = storage;
        self
    }

    /// Property visible to every job through its `TaskContext`. Keys are case-insensitive.
    pub fn property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key, value.into());
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn throttler(mut self, throttler: impl Throttler + 'static) -> Self {
        self.throttler = Arc::new(throttler);
        self
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn build(self) -> Result<ProcessServer> {
        ProcessServer::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobsError;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn env_without_url_means_memory() {
        assert_eq!(StorageOptions::from_lookup(lookup(&[])), StorageOptions::default());
    }

    #[test]
    fn dedicated_url_wins_over_generic_one() {
        let opts = StorageOptions::from_lookup(lookup(&[
            (ENV_REDIS_URL, "redis://jobs:6379"),
            (ENV_REDIS_URL_FALLBACK, "redis://other:6379"),
            (ENV_INSTANCE, "billing"),
        ]));
        assert_eq!(
            opts,
            StorageOptions::Redis(RedisStorageOptions {
                configuration: "redis://jobs:6379".into(),
                instance_name: "billing".into(),
            })
        );
    }

    #[test]
    fn overrides_layer_on_top_of_env() {
        let env = StorageOptions::from_lookup(lookup(&[
            (ENV_REDIS_URL, "redis://env:6379"),
            (ENV_INSTANCE, "from-env"),
        ]));
        assert_eq!(
            env.clone().with_overrides(Some("redis://cli:6379".into()), None),
            StorageOptions::Redis(RedisStorageOptions {
                configuration: "redis://cli:6379".into(),
                instance_name: "from-env".into(),
            })
        );
        assert_eq!(
            env.with_overrides(None, Some("from-cli".into())),
            StorageOptions::Redis(RedisStorageOptions {
                configuration: "redis://env:6379".into(),
                instance_name: "from-cli".into(),
            })
        );

        let memory = StorageOptions::default();
        assert_eq!(memory.clone().with_overrides(None, Some("ignored".into())), memory);
        assert_eq!(
            memory.with_overrides(Some("redis://cli:6379".into()), Some("jobs".into())),
            StorageOptions::Redis(RedisStorageOptions {
                configuration: "redis://cli:6379".into(),
                instance_name: "jobs".into(),
            })
        );
    }

    #[test]
    fn redis_without_instance_fails_at_build() {
        let opts = StorageOptions::from_lookup(lookup(&[(ENV_REDIS_URL_FALLBACK, "redis://127.0.0.1:6379")]));
        assert!(matches!(opts.build(), Err(JobsError::InvalidConfiguration(_))));
    }

    #[test]
    fn builder_collects_settings() {
        let options = JobServerOptions::new()
            .property("Region", "eu")
            .property("retries", 3)
            .shutdown_timeout(Duration::from_secs(2));

        assert_eq!(options.properties.get("REGION"), Some(&Value::from("eu")));
        assert_eq!(options.properties.get("Retries"), Some(&Value::from(3)));
        assert_eq!(options.shutdown_timeout, Duration::from_secs(2));
        assert!(options.registry().is_empty());
    }
}
