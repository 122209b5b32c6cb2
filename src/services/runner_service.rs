// src/services/runner_service.rs
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error, trace};

use crate::context::TaskContext;
use crate::error::Result;

type LoopBody = Arc<dyn Fn(TaskContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Runs a body over and over until the context's cancellation fires.
///
/// Cancellation surfacing from the body while shutdown is requested ends the
/// loop quietly. Any other error, or a panic, is logged and the next
/// iteration starts.
#[derive(Clone)]
pub struct InfiniteLoop {
    name: String,
    body: LoopBody,
}

impl InfiniteLoop {
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(move |ctx| body(ctx).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(&self, ctx: TaskContext) {
        debug!(process = %self.name, server = %ctx.server_id(), "process started");

        while !ctx.is_shutdown_requested() {
            match AssertUnwindSafe((self.body)(ctx.clone())).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() && ctx.is_shutdown_requested() => {
                    trace!(process = %self.name, "cancellation requested, leaving loop");
                }
                Ok(Err(e)) => {
                    error!(process = %self.name, "unexpected error in process loop: {}", e);
                }
                Err(panic) => {
                    error!(process = %self.name, "process loop panicked: {}", panic_message(&*panic));
                }
            }
        }

        debug!(process = %self.name, "process stopped");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Properties;
    use crate::error::JobsError;
    use crate::storage::MemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    fn ctx(token: &CancellationToken) -> TaskContext {
        TaskContext::new("loop-test", Properties::new(), Arc::new(MemoryStorage::new()), token.clone())
    }

    #[tokio::test]
    async fn keeps_going_after_errors_and_panics() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let stopper = token.clone();
        let process = InfiniteLoop::new("flaky", move |_ctx| {
            let counter = Arc::clone(&counter);
            let stopper = stopper.clone();
            async move {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(JobsError::InvalidInput("boom".into())),
                    1 => panic!("tick exploded"),
                    _ => {
                        stopper.cancel();
                        Err(JobsError::Cancelled)
                    }
                }
            }
        });

        process.run(ctx(&token)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_run_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let process = InfiniteLoop::new("idle", move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });

        process.run(ctx(&token)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(&*payload), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
    }
}
