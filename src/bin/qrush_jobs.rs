// src/bin/qrush_jobs.rs
//
// qrush-jobs: standalone host for the cron job server.
//
// Boots a ProcessServer with a heartbeat job and a retrier for failed
// heartbeats, then waits for SIGINT/SIGTERM and shuts down within the
// configured window.
//
// Example:
//   qrush-jobs --heartbeat-cron "*/5 * * * *" --redis redis://127.0.0.1:6379 --instance jobs

use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use qrush_jobs::{FailedJobRetrier, Job, JobServerOptions, StorageOptions, TaskContext};

#[derive(Parser, Debug)]
#[command(name = "qrush-jobs", version, about = "Cron job server host")]
struct Args {
    /// Redis connection URL; overrides QRUSH_JOBS_REDIS_URL / REDIS_URL.
    /// In-memory storage when neither is set.
    #[arg(long)]
    redis: Option<String>,

    /// Key namespace for Redis storage; overrides QRUSH_JOBS_INSTANCE
    #[arg(long)]
    instance: Option<String>,

    /// Schedule of the heartbeat job
    #[arg(long, default_value = "* * * * *")]
    heartbeat_cron: String,

    /// Schedule of the failed-heartbeat retrier
    #[arg(long, default_value = "*/5 * * * *")]
    retry_cron: String,

    /// Time zone the cron expressions are read in
    #[arg(long, default_value = "UTC")]
    time_zone: String,

    /// Upper bound on waiting for the scheduler to stop
    #[arg(long, default_value_t = 15)]
    shutdown_timeout_secs: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Heartbeat;

#[async_trait]
impl Job for Heartbeat {
    fn id(&self) -> String {
        "heartbeat".to_string()
    }

    async fn invoke(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        let region = ctx
            .properties()
            .get("region")
            .and_then(|v| v.as_str())
            .unwrap_or("local");
        info!(server = %ctx.server_id(), region, "heartbeat");
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    if let Err(e) = dotenvy::dotenv() {
        eprintln!(".env not loaded: {e}");
    }

    // Tracing (respects RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let time_zone: chrono_tz::Tz = args
        .time_zone
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid time zone '{}': {}", args.time_zone, e))?;

    let storage = StorageOptions::from_env().with_overrides(args.redis.clone(), args.instance.clone());

    let mut options = JobServerOptions::new()
        .storage(storage)
        .property("region", std::env::var("QRUSH_JOBS_REGION").unwrap_or_else(|_| "local".into()))
        .shutdown_timeout(Duration::from_secs(args.shutdown_timeout_secs));
    options.register_in_zone(&args.heartbeat_cron, time_zone, Heartbeat::default)?;
    options.register_in_zone(&args.retry_cron, time_zone, FailedJobRetrier::<Heartbeat>::new)?;

    let server = options.build()?;
    info!(server = %server.server_id(), jobs = server.job_states().len(), "Starting qrush-jobs");
    server.start();

    info!("qrush-jobs running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    return;
                }
            }
            std::future::pending::<()>().await
        } => {
            info!("Received SIGTERM");
        }
    }

    server.request_stop();
    if let Err(e) = server.shutdown().await {
        warn!("{}", e);
    }

    info!("qrush-jobs exited");
    Ok(())
}
