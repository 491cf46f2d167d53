//! Progress reporting handle for background operations.
//!
//! One `ProgressReporter` is handed to each execution unit; `update`,
//! `complete`, and `fail` are the only mutation surface an operation body
//! has. The reporter enforces the snapshot invariants locally: progress never
//! decreases while non-terminal, and the first terminal write freezes the
//! record (later calls are no-ops).

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::models::task::{validate_result_payload, ResultPayload, TaskSnapshot};
use crate::store::ProgressStore;

struct WriterState {
    progress: u8,
    stage: String,
    terminal: bool,
}

#[derive(Clone)]
pub struct ProgressReporter {
    store: ProgressStore,
    task_id: Uuid,
    created_at: DateTime<Utc>,
    state: Arc<Mutex<WriterState>>,
}

impl ProgressReporter {
    pub fn new(store: ProgressStore, task_id: Uuid, created_at: DateTime<Utc>) -> Self {
        ProgressReporter {
            store,
            task_id,
            created_at,
            state: Arc::new(Mutex::new(WriterState {
                progress: 0,
                stage: "0/0".to_string(),
                terminal: false,
            })),
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn is_terminal(&self) -> bool {
        self.state.lock().await.terminal
    }

    /// Non-terminal progress report at a stage boundary. Progress is clamped
    /// to 0–100 and never moves backwards.
    pub async fn update(&self, progress: u8, status: &str, stage: &str) -> Result<()> {
        let snapshot = {
            let mut state = self.state.lock().await;
            if state.terminal {
                debug!(task_id = %self.task_id, "update after terminal write ignored");
                return Ok(());
            }
            state.progress = state.progress.max(progress.min(100));
            state.stage = stage.to_string();
            self.snapshot(&state, status.to_string(), None, ResultPayload::new())
        };
        self.store.write(&snapshot).await
    }

    /// Terminal success. The result payload is validated here: primitive
    /// values only (enforced by `ResultValue`) and no reserved-field keys.
    pub async fn complete(&self, status: &str, result: ResultPayload) -> Result<()> {
        validate_result_payload(&result)?;
        let snapshot = {
            let mut state = self.state.lock().await;
            if state.terminal {
                debug!(task_id = %self.task_id, "complete after terminal write ignored");
                return Ok(());
            }
            state.terminal = true;
            state.progress = 100;
            let mut snapshot = self.snapshot(&state, status.to_string(), None, result);
            snapshot.completed = true;
            snapshot
        };
        self.store.write(&snapshot).await
    }

    /// Terminal failure. `completed` stays false; `error` carries the message.
    pub async fn fail(&self, error: &str) -> Result<()> {
        let snapshot = {
            let mut state = self.state.lock().await;
            if state.terminal {
                debug!(task_id = %self.task_id, "fail after terminal write ignored");
                return Ok(());
            }
            state.terminal = true;
            self.snapshot(
                &state,
                format!("Error: {error}"),
                Some(error.to_string()),
                ResultPayload::new(),
            )
        };
        self.store.write(&snapshot).await
    }

    /// Whether the client has asked for this task to stop. Operations check
    /// this between stages; nothing interrupts them otherwise.
    pub async fn cancel_requested(&self) -> Result<bool> {
        self.store.cancel_requested(self.task_id).await
    }

    fn snapshot(
        &self,
        state: &WriterState,
        status: String,
        error: Option<String>,
        result: ResultPayload,
    ) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.task_id,
            progress: state.progress,
            status,
            stage: state.stage.clone(),
            completed: false,
            error,
            created_at: self.created_at,
            updated_at: Utc::now(),
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::ResultValue;
    use crate::store::memory::MemoryTier;

    fn reporter() -> (ProgressReporter, ProgressStore) {
        let store = ProgressStore::new(
            Arc::new(MemoryTier::new()),
            Arc::new(MemoryTier::new()),
        );
        let id = Uuid::new_v4();
        (ProgressReporter::new(store.clone(), id, Utc::now()), store)
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let (reporter, store) = reporter();
        reporter.update(30, "Parsing...", "2/6").await.unwrap();
        reporter.update(10, "Parsing...", "2/6").await.unwrap();

        let snap = store.read(reporter.task_id()).await.unwrap().unwrap();
        assert_eq!(snap.progress, 30);
    }

    #[tokio::test]
    async fn test_update_clamps_to_hundred() {
        let (reporter, store) = reporter();
        reporter.update(250, "Overflow", "1/1").await.unwrap();
        let snap = store.read(reporter.task_id()).await.unwrap().unwrap();
        assert_eq!(snap.progress, 100);
        assert!(!snap.is_terminal());
    }

    #[tokio::test]
    async fn test_terminal_snapshot_is_frozen() {
        let (reporter, store) = reporter();
        let mut payload = ResultPayload::new();
        payload.insert("job_id".to_string(), ResultValue::Text("j-3".to_string()));
        reporter.complete("Complete!", payload).await.unwrap();

        let first = store.read(reporter.task_id()).await.unwrap().unwrap();
        assert!(first.completed);
        assert_eq!(first.progress, 100);

        // later calls are no-ops
        reporter.update(10, "late", "9/9").await.unwrap();
        reporter.fail("late failure").await.unwrap();

        let second = store.read(reporter.task_id()).await.unwrap().unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_fail_sets_error_not_completed() {
        let (reporter, store) = reporter();
        reporter.update(40, "Fetching...", "2/6").await.unwrap();
        reporter.fail("connection reset").await.unwrap();

        let snap = store.read(reporter.task_id()).await.unwrap().unwrap();
        assert!(!snap.completed);
        assert_eq!(snap.error.as_deref(), Some("connection reset"));
        assert_eq!(snap.status, "Error: connection reset");
        assert_eq!(snap.progress, 40);
        assert!(snap.is_terminal());
    }

    #[tokio::test]
    async fn test_complete_rejects_reserved_payload_keys() {
        let (reporter, store) = reporter();
        let mut payload = ResultPayload::new();
        payload.insert("timestamp".to_string(), ResultValue::Int(0));
        assert!(reporter.complete("Complete!", payload).await.is_err());

        // the rejected write must not have terminated the task
        assert!(!reporter.is_terminal().await);
        assert!(store.read(reporter.task_id()).await.unwrap().is_none());
    }
}
