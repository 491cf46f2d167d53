use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::task::{ResultPayload, ResultValue};
use crate::state::AppState;
use crate::tasks::stages::{
    run_staged, Stage, GENERATION_STAGES, JOB_SCRAPE_STAGES, RESUME_PARSE_STAGES,
};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    JobScrape,
    ResumeParse,
    Generation,
}

impl TaskKind {
    fn stages(self) -> &'static [Stage] {
        match self {
            TaskKind::JobScrape => JOB_SCRAPE_STAGES,
            TaskKind::ResumeParse => RESUME_PARSE_STAGES,
            TaskKind::Generation => GENERATION_STAGES,
        }
    }

    fn name(self) -> &'static str {
        match self {
            TaskKind::JobScrape => "job_scrape",
            TaskKind::ResumeParse => "resume_parse",
            TaskKind::Generation => "generation",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TestTaskRequest {
    pub kind: TaskKind,
    /// Per-stage delay in milliseconds.
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,
}

fn default_step_ms() -> u64 {
    500
}

#[derive(Debug, Serialize)]
pub struct LaunchResponse {
    pub task_id: Uuid,
}

/// POST /api/v1/tasks/test
///
/// Launches a staged test task that walks one of the predefined stage tables,
/// so the polling pipeline can be exercised end to end without a real
/// scraper or generator behind it.
pub async fn handle_launch_test_task(
    State(state): State<AppState>,
    Json(req): Json<TestTaskRequest>,
) -> Result<Json<LaunchResponse>, AppError> {
    let stages = req.kind.stages();
    let delay = Duration::from_millis(req.step_ms);
    let kind = req.kind.name();

    let task_id = state
        .launcher
        .launch(kind, move |reporter| async move {
            let mut payload = ResultPayload::new();
            payload.insert("task_type".to_string(), ResultValue::Text(kind.to_string()));
            run_staged(&reporter, stages, delay, payload).await
        })
        .await?;

    Ok(Json(LaunchResponse { task_id }))
}
