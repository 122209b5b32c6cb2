// src/job.rs
use async_trait::async_trait;
use serde::Serialize;

use crate::context::TaskContext;
use crate::error::StorageError;
use crate::storage::StorageResult;

/// A recurring unit of work. A fresh instance is built for every invocation,
/// so per-run state is never shared between ticks or between jobs.
#[async_trait]
pub trait Job: Send + Sync {
    /// Stable identity. Also the storage key a failed instance is saved under.
    fn id(&self) -> String;

    async fn invoke(&self, ctx: &TaskContext) -> anyhow::Result<()>;

    /// Called after a failed invocation, before the instance is persisted.
    async fn on_error(&self, _err: &anyhow::Error) {}
}

/// Type-erased job as seen by the scheduling loop: the job itself plus the
/// ability to snapshot it for storage.
#[async_trait]
pub(crate) trait ErasedJob: Send + Sync {
    fn id(&self) -> String;

    async fn invoke(&self, ctx: &TaskContext) -> anyhow::Result<()>;

    async fn on_error(&self, err: &anyhow::Error);

    fn snapshot(&self) -> Result<StorageResult, StorageError>;
}

#[async_trait]
impl<J> ErasedJob for J
where
    J: Job + Serialize + 'static,
{
    fn id(&self) -> String {
        Job::id(self)
    }

    async fn invoke(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        Job::invoke(self, ctx).await
    }

    async fn on_error(&self, err: &anyhow::Error) {
        Job::on_error(self, err).await
    }

    fn snapshot(&self) -> Result<StorageResult, StorageError> {
        StorageResult::encode(self)
    }
}
