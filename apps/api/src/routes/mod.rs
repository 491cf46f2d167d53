pub mod health;
pub mod progress;

use axum::{
    routing::{get, post},
    Router,
};

use crate::errors::AppError;
use crate::state::AppState;
use crate::tasks::handlers;

async fn not_implemented() -> Result<(), AppError> {
    Err(AppError::NotImplemented)
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Progress reporter API
        .route(
            "/api/v1/progress/:task_id",
            get(progress::handle_get_progress),
        )
        .route(
            "/api/v1/progress/:task_id/recover",
            get(progress::handle_recover_progress),
        )
        .route(
            "/api/v1/progress/:task_id/cancel",
            post(progress::handle_cancel_progress),
        )
        // Task submission
        .route("/api/v1/tasks/test", post(handlers::handle_launch_test_task))
        // Real operation bodies live in their own services and report through
        // the same update/complete/fail contract
        .route("/api/v1/jobs/scrape", post(not_implemented))
        .route("/api/v1/resumes/parse", post(not_implemented))
        .route("/api/v1/documents/generate", post(not_implemented))
        .with_state(state)
}
