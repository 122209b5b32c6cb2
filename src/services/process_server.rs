// src/services/process_server.rs
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::JobServerOptions;
use crate::context::{globally_unique_server_id, TaskContext};
use crate::cron::{CronJobScheduler, JobStatus, JobStates};
use crate::error::{JobsError, Result};
use crate::services::runner_service::InfiniteLoop;
use crate::storage::JobStorage;

/// Owns the cancellation source, the job-state map and the supervised
/// scheduling loop.
///
/// Lifecycle: [`start`](Self::start) once after registrations are final,
/// [`request_stop`](Self::request_stop) when the host begins shutting down,
/// [`shutdown`](Self::shutdown) to wait (bounded) for the loop to exit.
pub struct ProcessServer {
    context: TaskContext,
    cancellation: CancellationToken,
    scheduler: Arc<CronJobScheduler>,
    shutdown_timeout: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessServer {
    pub fn new(options: JobServerOptions) -> Result<Self> {
        let storage = options.storage.build()?;
        let cancellation = CancellationToken::new();
        let states: JobStates = Arc::new(DashMap::new());
        let server_id = globally_unique_server_id();

        let scheduler = Arc::new(CronJobScheduler::new(
            Arc::new(options.registry),
            states,
            Arc::clone(&storage),
            options.throttler,
        ));
        let context = TaskContext::new(server_id, options.properties, storage, cancellation.clone());

        Ok(Self {
            context,
            cancellation,
            scheduler,
            shutdown_timeout: options.shutdown_timeout,
            handle: Mutex::new(None),
        })
    }

    pub fn server_id(&self) -> &str {
        self.context.server_id()
    }

    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    pub fn storage(&self) -> &Arc<dyn JobStorage> {
        self.context.storage()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Launch the scheduling loop on its own task. A second call is ignored.
    pub fn start(&self) {
        let mut handle = self.lock_handle();
        if handle.is_some() {
            warn!(server = %self.server_id(), "process server already started");
            return;
        }

        let scheduler = Arc::clone(&self.scheduler);
        let process = InfiniteLoop::new("cron scheduler", move |ctx| {
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.invoke(&ctx).await }
        });

        let ctx = self.context.clone();
        // Long-lived task on the ambient runtime, not a dedicated thread. Every
        // wait inside the loop is async, so it never pins a worker.
        *handle = Some(tokio::spawn(async move { process.run(ctx).await }));
        info!(server = %self.server_id(), "process server started");
    }

    /// Signal cancellation without waiting.
    pub fn request_stop(&self) {
        if !self.cancellation.is_cancelled() {
            info!(server = %self.server_id(), "stop requested");
        }
        self.cancellation.cancel();
    }

    /// Cancel (if not already) and wait up to the shutdown timeout for the loop
    /// to exit. On timeout the loop is left running and `ShutdownTimeout` is returned.
    pub async fn shutdown(&self) -> Result<()> {
        self.request_stop();

        let handle = self.lock_handle().take();
        let Some(handle) = handle else {
            return Ok(());
        };

        match tokio::time::timeout(self.shutdown_timeout, handle).await {
            Ok(Ok(())) => {
                info!(server = %self.server_id(), "process server stopped");
                Ok(())
            }
            Ok(Err(join_err)) => {
                warn!(server = %self.server_id(), "process server task ended abnormally: {}", join_err);
                Ok(())
            }
            Err(_) => {
                warn!(
                    server = %self.server_id(),
                    timeout = ?self.shutdown_timeout,
                    "process server did not stop in time"
                );
                Err(JobsError::ShutdownTimeout(self.shutdown_timeout))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_handle().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Run state of every registered job.
    pub fn job_states(&self) -> Vec<JobStatus> {
        self.scheduler.job_states()
    }

    pub fn scheduler(&self) -> &Arc<CronJobScheduler> {
        &self.scheduler
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ProcessServer {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}
