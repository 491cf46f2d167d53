//! Progress reporter API: read, recover, cancel.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::task::{ProgressView, RecoverResponse, RecoverStatus};
use crate::state::AppState;
use crate::store::Recovery;

/// GET /api/v1/progress/:task_id
///
/// Fast-tier read. A 404 here is the client's cue to try the recovery
/// endpoint before treating the task as lost.
pub async fn handle_get_progress(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<ProgressView>, AppError> {
    let snapshot = state
        .store
        .read(task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("task {task_id}")))?;
    Ok(Json(ProgressView::from_snapshot(&snapshot, Utc::now())))
}

/// GET /api/v1/progress/:task_id/recover
///
/// Durable-tier fallback after fast-tier eviction. `found` means the fast
/// tier had the entry after all; `recovered` means it was repopulated from
/// the durable tier; `not_found` means the id is unknown or past retention.
pub async fn handle_recover_progress(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<RecoverResponse>, AppError> {
    let now = Utc::now();
    let response = match state.store.recover(task_id).await? {
        Recovery::Found(snapshot) => RecoverResponse {
            status: RecoverStatus::Found,
            progress: Some(ProgressView::from_snapshot(&snapshot, now)),
        },
        Recovery::Recovered(snapshot) => RecoverResponse {
            status: RecoverStatus::Recovered,
            progress: Some(ProgressView::from_snapshot(&snapshot, now)),
        },
        Recovery::Missing => RecoverResponse {
            status: RecoverStatus::NotFound,
            progress: None,
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub task_id: Uuid,
    pub cancel_requested: bool,
}

/// POST /api/v1/progress/:task_id/cancel
///
/// Records client intent only. The execution unit keeps running unless it
/// checks the flag between stages; nothing here force-stops it.
pub async fn handle_cancel_progress(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, AppError> {
    let snapshot = match state.store.recover(task_id).await? {
        Recovery::Found(snapshot) | Recovery::Recovered(snapshot) => snapshot,
        Recovery::Missing => return Err(AppError::NotFound(format!("task {task_id}"))),
    };
    // intent is meaningless once the task is terminal
    if snapshot.is_terminal() {
        return Ok(Json(CancelResponse {
            task_id,
            cancel_requested: false,
        }));
    }
    state.store.request_cancel(task_id).await?;
    Ok(Json(CancelResponse {
        task_id,
        cancel_requested: true,
    }))
}
