// src/cron/cron_scheduler.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::context::TaskContext;
use crate::cron::cron_job::{JobStatus, ScheduledJobState};
use crate::cron::schedule_instant::ScheduleInstant;
use crate::error::{JobsError, Result, StorageError};
use crate::registry::{JobRegistry, JobType};
use crate::storage::{JobStorage, StorageResult};
use crate::throttler::Throttler;

/// Shared job-state map, keyed by descriptor id.
pub type JobStates = Arc<DashMap<String, ScheduledJobState>>;

/// What one tick did. All entries are descriptor ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub evaluated: Vec<String>,
    pub dispatched: Vec<String>,
    pub failed: Vec<String>,
}

struct Dispatch {
    descriptor_id: String,
    job_type: JobType,
    now_instant: DateTime<Utc>,
    next: Option<DateTime<Utc>>,
}

enum Outcome {
    Succeeded,
    Failed {
        job_id: String,
        snapshot: std::result::Result<StorageResult, StorageError>,
        error: JobsError,
    },
}

/// The per-minute due-check-and-dispatch loop body.
pub struct CronJobScheduler {
    registry: Arc<JobRegistry>,
    states: JobStates,
    storage: Arc<dyn JobStorage>,
    throttler: Arc<dyn Throttler>,
}

impl CronJobScheduler {
    pub fn new(
        registry: Arc<JobRegistry>,
        states: JobStates,
        storage: Arc<dyn JobStorage>,
        throttler: Arc<dyn Throttler>,
    ) -> Self {
        Self {
            registry,
            states,
            storage,
            throttler,
        }
    }

    /// One paced iteration: wait for the minute boundary, tick, pause.
    pub async fn invoke(&self, ctx: &TaskContext) -> Result<()> {
        let token = ctx.cancellation_token();
        self.throttler.throttle(token).await?;
        self.tick(Utc::now(), ctx).await?;
        self.throttler.delay(token).await
    }

    /// Evaluate every registered job at `now` and run the due ones concurrently.
    /// Returns once every dispatched job has finished.
    pub async fn tick(&self, now: DateTime<Utc>, ctx: &TaskContext) -> Result<TickReport> {
        let mut report = TickReport::default();
        let mut due = Vec::new();

        for descriptor in self.registry.descriptors() {
            let state = self
                .states
                .entry(descriptor.id().to_string())
                .or_insert_with(|| ScheduledJobState::new(descriptor))
                .value()
                .clone();

            let instant = ScheduleInstant::compute(&state.schedule, state.time_zone, &now)?;
            let last_instant = state.last_instant(&instant);
            report.evaluated.push(state.descriptor_id.clone());

            if instant.is_due(&last_instant)? {
                due.push(Dispatch {
                    descriptor_id: state.descriptor_id.clone(),
                    job_type: state.job_type.clone(),
                    now_instant: instant.now_instant(),
                    next: instant.next_instant(),
                });
            } else {
                let next = instant.next_instant();
                self.update(&state.descriptor_id, |s| s.next = next);
            }
        }

        if due.is_empty() {
            return Ok(report);
        }

        let mut handles = Vec::with_capacity(due.len());
        for dispatch in &due {
            self.update(&dispatch.descriptor_id, |s| s.created_at = Some(dispatch.now_instant));
            report.dispatched.push(dispatch.descriptor_id.clone());

            let job = dispatch.job_type.instantiate();
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                let started = Instant::now();
                let job_id = job.id();
                let outcome = match job.invoke(&ctx).await {
                    Ok(()) => Outcome::Succeeded,
                    Err(err) => {
                        job.on_error(&err).await;
                        Outcome::Failed {
                            job_id: job_id.clone(),
                            snapshot: job.snapshot(),
                            error: JobsError::JobExecution {
                                job: job_id.clone(),
                                message: format!("{:#}", err),
                            },
                        }
                    }
                };
                debug!(job = %job_id, elapsed_ms = started.elapsed().as_millis() as u64, "job executed");
                outcome
            }));
        }
        let results = join_all(handles).await;

        for (dispatch, result) in due.iter().zip(results) {
            match result {
                Ok(Outcome::Succeeded) => {
                    self.update(&dispatch.descriptor_id, |s| s.last_run = Some(dispatch.now_instant));
                }
                Ok(Outcome::Failed { job_id, snapshot, error }) => {
                    error!(descriptor = %dispatch.descriptor_id, "{}", error);
                    report.failed.push(dispatch.descriptor_id.clone());
                    self.record_failure(&job_id, snapshot).await;
                }
                Err(join_err) => {
                    error!(
                        descriptor = %dispatch.descriptor_id,
                        job_type = dispatch.job_type.name(),
                        "job task aborted: {}",
                        join_err
                    );
                    report.failed.push(dispatch.descriptor_id.clone());
                }
            }
            let next = dispatch.next;
            self.update(&dispatch.descriptor_id, |s| s.next = next);
        }

        Ok(report)
    }

    /// Snapshot of one job's run state.
    pub fn job_state(&self, descriptor_id: &str) -> Option<ScheduledJobState> {
        self.states.get(descriptor_id).map(|s| s.value().clone())
    }

    /// Status of every registered job, in registration order. Jobs the loop
    /// has not seen yet report empty watermarks.
    pub fn job_states(&self) -> Vec<JobStatus> {
        self.registry
            .descriptors()
            .iter()
            .map(|d| match self.states.get(d.id()) {
                Some(state) => state.status(),
                None => ScheduledJobState::new(d).status(),
            })
            .collect()
    }

    async fn record_failure(&self, job_id: &str, snapshot: std::result::Result<StorageResult, StorageError>) {
        let stored = match snapshot {
            Ok(entry) => self.storage.set_entry(job_id, entry).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            warn!(job = %job_id, "failure was not durably recorded: {}", e);
        }
    }

    fn update(&self, descriptor_id: &str, apply: impl FnOnce(&mut ScheduledJobState)) {
        if let Some(mut state) = self.states.get_mut(descriptor_id) {
            apply(state.value_mut());
        }
    }
}
