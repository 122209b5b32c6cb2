use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use qrush_jobs::{
    FailedJobRetrier, Job, JobStorage, JobStorageExt, MemoryStorage, Properties, TaskContext,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SyncInvoice {
    invoice: u32,
    healthy: bool,
}

#[async_trait]
impl Job for SyncInvoice {
    fn id(&self) -> String {
        format!("sync-invoice-{}", self.invoice)
    }

    async fn invoke(&self, _ctx: &TaskContext) -> anyhow::Result<()> {
        anyhow::ensure!(self.healthy, "invoice {} still rejected", self.invoice);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Unrelated {
    note: String,
}

fn context(storage: Arc<dyn JobStorage>) -> TaskContext {
    TaskContext::new("recovery-test", Properties::new(), storage, CancellationToken::new())
}

#[tokio::test]
async fn retrier_removes_only_recovered_jobs() {
    let storage: Arc<dyn JobStorage> = Arc::new(MemoryStorage::new());
    for job in [
        SyncInvoice { invoice: 1, healthy: true },
        SyncInvoice { invoice: 2, healthy: false },
        SyncInvoice { invoice: 3, healthy: true },
    ] {
        storage.set(&job.id(), &job).await.unwrap();
    }
    storage.set("note", &Unrelated { note: "keep me".into() }).await.unwrap();

    let retrier = FailedJobRetrier::<SyncInvoice>::new();
    retrier.invoke(&context(storage.clone())).await.unwrap();

    assert_eq!(storage.list_keys().await.unwrap(), vec!["note", "sync-invoice-2"]);
    let remaining = storage.get_typed_jobs::<SyncInvoice>().await.unwrap();
    assert_eq!(remaining, vec![SyncInvoice { invoice: 2, healthy: false }]);
}

#[tokio::test]
async fn retrier_with_nothing_stored_is_a_no_op() {
    let storage: Arc<dyn JobStorage> = Arc::new(MemoryStorage::new());
    let retrier = FailedJobRetrier::<SyncInvoice>::default();
    retrier.invoke(&context(storage.clone())).await.unwrap();
    assert!(storage.list_keys().await.unwrap().is_empty());
    assert!(retrier.id().ends_with("SyncInvoice"));
}

#[tokio::test]
async fn remove_jobs_goes_by_identity() {
    let storage: Arc<dyn JobStorage> = Arc::new(MemoryStorage::new());
    let a = SyncInvoice { invoice: 10, healthy: true };
    let b = SyncInvoice { invoice: 11, healthy: true };
    storage.set(&a.id(), &a).await.unwrap();
    storage.set(&b.id(), &b).await.unwrap();

    storage.remove_jobs(&[a]).await.unwrap();
    assert_eq!(storage.list_keys().await.unwrap(), vec!["sync-invoice-11"]);
    assert_eq!(storage.get_as::<SyncInvoice>("sync-invoice-11").await.unwrap(), Some(b));
}
