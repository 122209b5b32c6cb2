// src/registry.rs

use std::fmt;
use std::sync::Arc;

use chrono_tz::Tz;
use serde::Serialize;

use crate::cron::CronSchedule;
use crate::error::{JobsError, Result};
use crate::job::{ErasedJob, Job};

/// Builds a fresh job instance for one invocation.
pub(crate) type JobFactory = Arc<dyn Fn() -> Box<dyn ErasedJob> + Send + Sync>;

/// The concrete job implementation behind a descriptor.
#[derive(Clone)]
pub struct JobType {
    name: &'static str,
    factory: JobFactory,
}

impl JobType {
    fn of<J, F>(factory: F) -> Self
    where
        J: Job + Serialize + 'static,
        F: Fn() -> J + Send + Sync + 'static,
    {
        Self {
            name: std::any::type_name::<J>(),
            factory: Arc::new(move || Box::new(factory()) as Box<dyn ErasedJob>),
        }
    }

    /// Fully qualified type name of the job.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn instantiate(&self) -> Box<dyn ErasedJob> {
        (self.factory)()
    }
}

impl fmt::Debug for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JobType").field(&self.name).finish()
    }
}

/// Identity + cron binding of one registered job. Immutable once created.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    id: String,
    schedule: Arc<CronSchedule>,
    time_zone: Tz,
    job_type: JobType,
}

impl JobDescriptor {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schedule(&self) -> Arc<CronSchedule> {
        Arc::clone(&self.schedule)
    }

    pub fn cron_expression(&self) -> &str {
        self.schedule.expression()
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    pub fn job_type(&self) -> &JobType {
        &self.job_type
    }
}

impl PartialEq for JobDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for JobDescriptor {}

impl fmt::Display for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.job_type.name.rsplit("::").next().unwrap_or(self.job_type.name);
        write!(f, "Job: {}", short)
    }
}

/// Write-once-at-startup list of job descriptors.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    descriptors: Vec<JobDescriptor>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job type built with `Default` for every run.
    pub fn register<J>(&mut self, cron_expression: &str) -> Result<&JobDescriptor>
    where
        J: Job + Serialize + Default + 'static,
    {
        self.register_with(cron_expression, J::default)
    }

    /// Register a job type whose instances come from `factory`.
    pub fn register_with<J, F>(&mut self, cron_expression: &str, factory: F) -> Result<&JobDescriptor>
    where
        J: Job + Serialize + 'static,
        F: Fn() -> J + Send + Sync + 'static,
    {
        self.register_in_zone(cron_expression, chrono_tz::UTC, factory)
    }

    /// Register a job whose cron expression is read in `time_zone` wall-clock time.
    pub fn register_in_zone<J, F>(&mut self, cron_expression: &str, time_zone: Tz, factory: F) -> Result<&JobDescriptor>
    where
        J: Job + Serialize + 'static,
        F: Fn() -> J + Send + Sync + 'static,
    {
        let schedule = CronSchedule::parse(cron_expression).map_err(|e| {
            JobsError::InvalidConfiguration(format!("cron expression '{}' is not valid: {:#}", cron_expression, e))
        })?;

        let descriptor = JobDescriptor {
            id: nanoid::nanoid!(),
            schedule: Arc::new(schedule),
            time_zone,
            job_type: JobType::of(factory),
        };
        tracing::debug!(id = %descriptor.id, cron = cron_expression, "{} registered", descriptor);

        self.descriptors.push(descriptor);
        Ok(&self.descriptors[self.descriptors.len() - 1])
    }

    pub fn descriptors(&self) -> &[JobDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, id: &str) -> Option<&JobDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TaskContext;
    use async_trait::async_trait;

    #[derive(Default, Serialize)]
    struct Ping;

    #[async_trait]
    impl Job for Ping {
        fn id(&self) -> String {
            "ping".into()
        }

        async fn invoke(&self, _ctx: &TaskContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn registrations_accumulate_with_unique_ids() {
        let mut registry = JobRegistry::new();
        let a = registry.register::<Ping>("* * * * *").unwrap().id().to_string();
        let b = registry.register::<Ping>("*/5 * * * *").unwrap().id().to_string();

        assert_eq!(registry.len(), 2);
        assert_ne!(a, b);
        assert_eq!(registry.get(&b).unwrap().cron_expression(), "*/5 * * * *");
    }

    #[test]
    fn invalid_cron_fails_fast() {
        let mut registry = JobRegistry::new();
        let err = registry.register::<Ping>("not a cron").unwrap_err();
        assert!(matches!(err, JobsError::InvalidConfiguration(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn factory_builds_fresh_instances() {
        let mut registry = JobRegistry::new();
        let descriptor = registry.register::<Ping>("@hourly").unwrap();
        let job = descriptor.job_type().instantiate();
        assert_eq!(job.id(), "ping");
        assert_eq!(descriptor.to_string(), "Job: Ping");
    }

    #[test]
    fn zone_is_kept_on_descriptor() {
        let mut registry = JobRegistry::new();
        let descriptor = registry
            .register_in_zone("0 9 * * *", chrono_tz::Europe::Istanbul, || Ping)
            .unwrap();
        assert_eq!(descriptor.time_zone(), chrono_tz::Europe::Istanbul);
    }

    #[test]
    fn ids_compare_exactly() {
        let mut registry = JobRegistry::new();
        let mut lower = registry.register::<Ping>("* * * * *").unwrap().clone();
        lower.id = "job-abc".into();
        let mut upper = lower.clone();
        upper.id = "JOB-ABC".into();

        assert_ne!(lower, upper);
        assert_eq!(lower, lower.clone());

        registry.descriptors = vec![lower];
        assert!(registry.get("job-abc").is_some());
        assert!(registry.get("JOB-ABC").is_none());
    }
}
