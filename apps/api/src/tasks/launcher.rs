//! Task launcher and execution-unit supervision.
//!
//! `launch` allocates a task id, writes the initial snapshot, and spawns the
//! operation as an independent tokio task — the caller gets the id back
//! before the work is meaningfully underway. A semaphore bounds how many
//! execution units run at once; launches beyond the bound queue on it.
//!
//! The supervisor is the fault boundary: an operation that returns an error,
//! panics, or exits without reporting a terminal state is converted into a
//! `fail` write so a task is never stranded non-terminal by a fault. A
//! process crash mid-operation is not covered — the task stays non-terminal
//! in the durable tier with no automatic resolution.

use anyhow::Result;
use chrono::Utc;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::task::TaskSnapshot;
use crate::store::ProgressStore;
use crate::tasks::reporter::ProgressReporter;

#[derive(Clone)]
pub struct TaskLauncher {
    store: ProgressStore,
    limiter: Arc<Semaphore>,
}

impl TaskLauncher {
    pub fn new(store: ProgressStore, max_concurrent_tasks: usize) -> Self {
        TaskLauncher {
            store,
            limiter: Arc::new(Semaphore::new(max_concurrent_tasks)),
        }
    }

    /// Starts `op` in the background and returns its freshly allocated task
    /// id. The reporter passed to `op` is its only mutation surface.
    pub async fn launch<F, Fut>(&self, kind: &'static str, op: F) -> Result<Uuid>
    where
        F: FnOnce(ProgressReporter) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let task_id = Uuid::new_v4();
        let now = Utc::now();
        let reporter = ProgressReporter::new(self.store.clone(), task_id, now);

        // The entry exists before launch returns, so an immediate read sees
        // progress 0 rather than NotFound.
        self.store.write(&TaskSnapshot::initial(task_id, now)).await?;

        let limiter = self.limiter.clone();
        tokio::spawn(async move {
            let _permit = match limiter.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return, // semaphore closed: shutting down
            };
            info!(%task_id, kind, "task started");

            let outcome = tokio::spawn(op(reporter.clone())).await;
            match outcome {
                Ok(Ok(())) => {
                    if reporter.is_terminal().await {
                        info!(%task_id, kind, "task finished");
                    } else {
                        record_failure(&reporter, "task ended without reporting a result").await;
                    }
                }
                Ok(Err(e)) => record_failure(&reporter, &format!("{e:#}")).await,
                Err(join_err) if join_err.is_panic() => {
                    record_failure(&reporter, &panic_message(join_err.into_panic())).await;
                }
                Err(_) => record_failure(&reporter, "task was aborted").await,
            }
        });

        Ok(task_id)
    }
}

async fn record_failure(reporter: &ProgressReporter, message: &str) {
    error!(task_id = %reporter.task_id(), "task failed: {message}");
    if let Err(e) = reporter.fail(message).await {
        error!(task_id = %reporter.task_id(), "could not record task failure: {e:#}");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panic: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panic: {msg}")
    } else {
        "panic in background task".to_string()
    }
}
