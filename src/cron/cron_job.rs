// src/cron/cron_job.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::cron::cron_parser::CronSchedule;
use crate::cron::schedule_instant::ScheduleInstant;
use crate::registry::{JobDescriptor, JobType};

/// Mutable run state of one registered descriptor. Created the first time
/// the scheduling loop sees the descriptor, touched only by that loop.
#[derive(Clone)]
pub struct ScheduledJobState {
    pub descriptor_id: String,
    pub schedule: Arc<CronSchedule>,
    pub time_zone: Tz,
    pub job_type: JobType,
    pub created_at: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub next: Option<DateTime<Utc>>,
}

impl ScheduledJobState {
    pub fn new(descriptor: &JobDescriptor) -> Self {
        Self {
            descriptor_id: descriptor.id().to_string(),
            schedule: descriptor.schedule(),
            time_zone: descriptor.time_zone(),
            job_type: descriptor.job_type().clone(),
            created_at: None,
            last_run: None,
            next: None,
        }
    }

    /// Watermark the missed-occurrence window starts from:
    /// last run, else creation, else one second before the known next fire,
    /// else one second before now (a never-seen job is due immediately).
    pub fn last_instant(&self, instant: &ScheduleInstant<'_>) -> DateTime<Utc> {
        self.last_run
            .or(self.created_at)
            .or_else(|| self.next.map(|next| next - Duration::seconds(1)))
            .unwrap_or_else(|| instant.now_instant() - Duration::seconds(1))
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            id: self.descriptor_id.clone(),
            job_type: self.job_type.name().to_string(),
            cron_expression: self.schedule.expression().to_string(),
            time_zone: self.time_zone.name().to_string(),
            created_at: self.created_at,
            last_run: self.last_run,
            next: self.next,
        }
    }
}

impl std::fmt::Debug for ScheduledJobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledJobState")
            .field("descriptor_id", &self.descriptor_id)
            .field("job_type", &self.job_type.name())
            .field("schedule", &self.schedule.expression())
            .field("created_at", &self.created_at)
            .field("last_run", &self.last_run)
            .field("next", &self.next)
            .finish()
    }
}

/// Read-only view of a job's run state, for listings and diagnostics.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JobStatus {
    pub id: String,
    pub job_type: String,
    pub cron_expression: String,
    pub time_zone: String,
    pub created_at: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub next: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use crate::registry::JobRegistry;
    use async_trait::async_trait;
    use chrono::TimeZone;

    #[derive(Default, Serialize)]
    struct Noop;

    #[async_trait]
    impl Job for Noop {
        fn id(&self) -> String {
            "noop".into()
        }

        async fn invoke(&self, _ctx: &crate::TaskContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn state() -> ScheduledJobState {
        let mut registry = JobRegistry::new();
        let descriptor = registry.register::<Noop>("* * * * *").unwrap();
        ScheduledJobState::new(descriptor)
    }

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    #[test]
    fn watermark_fallback_order() {
        let mut state = state();
        let schedule = state.schedule.clone();
        let instant = ScheduleInstant::compute(&schedule, chrono_tz::UTC, &utc(0, 10, 0)).unwrap();

        assert_eq!(state.last_instant(&instant), utc(0, 9, 59));

        state.next = Some(utc(0, 5, 0));
        assert_eq!(state.last_instant(&instant), utc(0, 4, 59));

        state.created_at = Some(utc(0, 3, 0));
        assert_eq!(state.last_instant(&instant), utc(0, 3, 0));

        state.last_run = Some(utc(0, 8, 0));
        assert_eq!(state.last_instant(&instant), utc(0, 8, 0));
    }

    #[test]
    fn fresh_state_is_due_on_first_tick() {
        let state = state();
        let schedule = state.schedule.clone();
        let instant = ScheduleInstant::compute(&schedule, chrono_tz::UTC, &utc(0, 0, 30)).unwrap();
        let last = state.last_instant(&instant);
        assert!(instant.is_due(&last).unwrap());
    }

    #[test]
    fn status_reflects_descriptor() {
        let status = state().status();
        assert_eq!(status.cron_expression, "* * * * *");
        assert_eq!(status.time_zone, "UTC");
        assert!(status.job_type.ends_with("Noop"));
        assert!(status.last_run.is_none());
    }
}
