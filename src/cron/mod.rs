// src/cron/mod.rs
pub mod cron_job;
pub mod cron_parser;
pub mod cron_scheduler;
pub mod schedule_instant;

pub use cron_job::{JobStatus, ScheduledJobState};
pub use cron_parser::CronSchedule;
pub use cron_scheduler::{CronJobScheduler, JobStates, TickReport};
pub use schedule_instant::{floor_to_minute, ScheduleInstant};
