//! Progress-task data model.
//!
//! `TaskSnapshot` is the authoritative stored record for one background task.
//! `ProgressView` is the wire shape returned by the reporter API: elapsed time
//! and the remaining-time estimate are derived at read time (never stored),
//! and the result payload is flattened into the top-level response object.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A single primitive value in a task's result payload.
///
/// Untagged, so payloads serialize as plain JSON scalars. Nested objects and
/// arrays fail deserialization, which is what validates payload typing at the
/// write boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Structured extra data attached to a terminal snapshot, e.g. identifiers of
/// resources the operation created. Populated only by `complete`.
pub type ResultPayload = BTreeMap<String, ResultValue>;

/// Response field names the result payload may not shadow, since payload keys
/// are merged into the read response at the top level.
const RESERVED_FIELDS: [&str; 9] = [
    "task_id",
    "progress",
    "status",
    "stage",
    "error",
    "completed",
    "elapsed_time",
    "estimated_remaining",
    "timestamp",
];

/// Rejects payload keys that would collide with reserved response fields.
pub fn validate_result_payload(payload: &ResultPayload) -> Result<()> {
    for key in payload.keys() {
        if RESERVED_FIELDS.contains(&key.as_str()) {
            bail!("result payload key '{key}' shadows a reserved response field");
        }
    }
    Ok(())
}

/// The complete progress record for one task at one point in time.
///
/// Written only by the task's owning execution unit. `completed` and `error`
/// are mutually exclusive; once either is set the snapshot is terminal and
/// further writes are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: Uuid,
    /// 0–100, monotonically non-decreasing while non-terminal.
    pub progress: u8,
    pub status: String,
    /// Free-text stage label, e.g. "3/6".
    pub stage: String,
    pub completed: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub result: ResultPayload,
}

impl TaskSnapshot {
    /// The snapshot written at launch, before the operation has done any work.
    pub fn initial(task_id: Uuid, now: DateTime<Utc>) -> Self {
        TaskSnapshot {
            task_id,
            progress: 0,
            status: "Initializing...".to_string(),
            stage: "0/0".to_string(),
            completed: false,
            error: None,
            created_at: now,
            updated_at: now,
            result: ResultPayload::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.completed || self.error.is_some()
    }
}

/// Wire shape of a progress read. Result-payload keys are flattened into the
/// top-level object so clients can pick up produced-resource identifiers
/// without a second lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressView {
    pub task_id: Uuid,
    pub progress: u8,
    pub status: String,
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed: bool,
    /// Seconds since the task was created, derived at read time.
    pub elapsed_time: i64,
    /// `elapsed × (100 − progress) / progress`, withheld while progress is 0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_remaining: Option<i64>,
    /// Epoch seconds of the last snapshot write.
    pub timestamp: i64,
    #[serde(flatten)]
    pub result: ResultPayload,
}

impl ProgressView {
    pub fn from_snapshot(snap: &TaskSnapshot, now: DateTime<Utc>) -> Self {
        let elapsed = (now - snap.created_at).num_seconds().max(0);
        let estimated_remaining = if snap.progress == 0 {
            None
        } else {
            Some(elapsed * i64::from(100 - snap.progress) / i64::from(snap.progress))
        };
        ProgressView {
            task_id: snap.task_id,
            progress: snap.progress,
            status: snap.status.clone(),
            stage: snap.stage.clone(),
            error: snap.error.clone(),
            completed: snap.completed,
            elapsed_time: elapsed,
            estimated_remaining,
            timestamp: snap.updated_at.timestamp(),
            result: snap.result.clone(),
        }
    }
}

/// Discriminator for the recovery endpoint: `found` means the fast tier had
/// the entry after all (rare race), `recovered` means it was repopulated from
/// the durable tier, `not_found` means neither tier knows the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoverStatus {
    Found,
    Recovered,
    NotFound,
}

/// Envelope returned by `GET /api/v1/progress/:task_id/recover`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverResponse {
    pub status: RecoverStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressView>,
}

/// Row shape of the `progress_tasks` durable-tier table.
#[derive(Debug, Clone, FromRow)]
pub struct ProgressTaskRow {
    pub task_id: Uuid,
    pub progress: i32,
    pub status: String,
    pub stage: String,
    pub completed: bool,
    pub error: Option<String>,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressTaskRow {
    pub fn into_snapshot(self) -> Result<TaskSnapshot> {
        let result: ResultPayload = serde_json::from_value(self.result)?;
        Ok(TaskSnapshot {
            task_id: self.task_id,
            progress: self.progress.clamp(0, 100) as u8,
            status: self.status,
            stage: self.stage,
            completed: self.completed,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
            result,
        })
    }
}
