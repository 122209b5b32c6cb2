// src/lib.rs
//! In-process cron job server.
//!
//! Jobs are registered against cron expressions on a [`JobServerOptions`],
//! which builds a [`ProcessServer`]. Once started, the server wakes at every
//! minute boundary, runs each job that has an occurrence between its last run
//! and now (missed minutes included), and stores failed job instances in the
//! configured [`JobStorage`] for later inspection or retry.

pub mod config;
pub mod context;
pub mod cron;
pub mod error;
pub mod job;
pub mod recovery;
pub mod registry;
pub mod services;
pub mod storage;
pub mod throttler;
pub mod utils;

pub use config::{JobServerOptions, MemoryStorageOptions, RedisStorageOptions, StorageOptions};
pub use context::{Properties, TaskContext};
pub use cron::{CronSchedule, JobStatus, ScheduleInstant, TickReport};
pub use error::{JobsError, Result, StorageError};
pub use job::Job;
pub use recovery::FailedJobRetrier;
pub use registry::{JobDescriptor, JobRegistry};
pub use services::process_server::ProcessServer;
pub use storage::{JobStorage, JobStorageExt, MemoryStorage, RedisStorage, StorageResult};
pub use throttler::{EveryMinuteThrottler, Throttler};
