// src/recovery.rs
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use tracing::{info, warn};

use crate::context::TaskContext;
use crate::job::Job;
use crate::storage::JobStorageExt;

/// Re-runs failed `J` instances persisted by the scheduling loop.
///
/// Register it like any other job; on every run it loads each stored `J`,
/// invokes it again and removes it from storage once it succeeds. Instances
/// that fail again stay stored for the next pass.
pub struct FailedJobRetrier<J> {
    _job: PhantomData<fn() -> J>,
}

impl<J> FailedJobRetrier<J> {
    pub fn new() -> Self {
        Self { _job: PhantomData }
    }
}

impl<J> Default for FailedJobRetrier<J> {
    fn default() -> Self {
        Self::new()
    }
}

impl<J> Clone for FailedJobRetrier<J> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<J> fmt::Debug for FailedJobRetrier<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FailedJobRetrier<{}>", type_name::<J>())
    }
}

impl<J> Serialize for FailedJobRetrier<J> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_unit_struct("FailedJobRetrier")
    }
}

#[async_trait]
impl<J> Job for FailedJobRetrier<J>
where
    J: Job + DeserializeOwned + 'static,
{
    fn id(&self) -> String {
        format!("retry:{}", type_name::<J>())
    }

    async fn invoke(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        let storage = ctx.storage();
        let failed = storage.get_typed_jobs::<J>().await?;
        if failed.is_empty() {
            return Ok(());
        }

        let total = failed.len();
        let mut recovered = Vec::new();
        for job in failed {
            if ctx.is_shutdown_requested() {
                break;
            }
            match job.invoke(ctx).await {
                Ok(()) => recovered.push(job),
                Err(err) => {
                    job.on_error(&err).await;
                    warn!(job = %job.id(), "retry failed: {:#}", err);
                }
            }
        }

        storage.remove_jobs(&recovered).await?;
        info!(job_type = type_name::<J>(), recovered = recovered.len(), total, "failed jobs retried");
        Ok(())
    }
}
