// src/throttler.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{JobsError, Result};
use crate::utils::constants::TICK_DELAY;

/// Paces the scheduling loop.
#[async_trait]
pub trait Throttler: Send + Sync {
    /// Wait until the loop may evaluate schedules again.
    async fn throttle(&self, token: &CancellationToken) -> Result<()>;

    /// Pause after a tick.
    async fn delay(&self, token: &CancellationToken) -> Result<()>;
}

/// Releases the loop at second zero of each minute, then holds it for one second
/// so the same minute is not evaluated twice.
#[derive(Debug, Clone, Copy, Default)]
pub struct EveryMinuteThrottler;

#[async_trait]
impl Throttler for EveryMinuteThrottler {
    async fn throttle(&self, token: &CancellationToken) -> Result<()> {
        align_to_minute(Utc::now, token).await
    }

    async fn delay(&self, token: &CancellationToken) -> Result<()> {
        sleep_or_cancel(TICK_DELAY, token).await
    }
}

/// Sleep second by second until `clock` reads second zero.
async fn align_to_minute<C>(clock: C, token: &CancellationToken) -> Result<()>
where
    C: Fn() -> DateTime<Utc>,
{
    loop {
        let now = clock();
        if now.second() == 0 {
            return Ok(());
        }
        let to_next_second = Duration::from_nanos(1_000_000_000 - u64::from(now.nanosecond() % 1_000_000_000));
        sleep_or_cancel(to_next_second, token).await?;
    }
}

/// Sleep for `duration`, or fail with [`JobsError::Cancelled`] as soon as `token` fires.
pub async fn sleep_or_cancel(duration: Duration, token: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = token.cancelled() => Err(JobsError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
