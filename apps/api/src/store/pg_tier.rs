//! Postgres durable tier.
//!
//! One row per task in `progress_tasks`, upserted on every snapshot write.
//! The `ON CONFLICT` update is guarded so a terminal row (completed or
//! errored) is immutable at the SQL level — late or duplicate writes from a
//! finished execution unit are no-ops. Rows are pruned by external retention
//! housekeeping, not by this service.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::task::{ProgressTaskRow, TaskSnapshot};
use crate::store::DurableTier;

pub struct PgTier {
    pool: PgPool,
}

impl PgTier {
    pub fn new(pool: PgPool) -> Self {
        PgTier { pool }
    }
}

/// Creates the durable-tier table if it does not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS progress_tasks (
            task_id          UUID PRIMARY KEY,
            progress         INTEGER NOT NULL DEFAULT 0,
            status           TEXT NOT NULL DEFAULT '',
            stage            TEXT NOT NULL DEFAULT '',
            completed        BOOLEAN NOT NULL DEFAULT FALSE,
            error            TEXT,
            cancel_requested BOOLEAN NOT NULL DEFAULT FALSE,
            result           JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at       TIMESTAMPTZ NOT NULL,
            updated_at       TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    info!("progress_tasks schema ensured");
    Ok(())
}

#[async_trait]
impl DurableTier for PgTier {
    async fn write(&self, snapshot: &TaskSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO progress_tasks
                (task_id, progress, status, stage, completed, error, result,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (task_id) DO UPDATE SET
                progress = EXCLUDED.progress,
                status = EXCLUDED.status,
                stage = EXCLUDED.stage,
                completed = EXCLUDED.completed,
                error = EXCLUDED.error,
                result = EXCLUDED.result,
                updated_at = EXCLUDED.updated_at
            WHERE progress_tasks.completed = FALSE
              AND progress_tasks.error IS NULL
            "#,
        )
        .bind(snapshot.task_id)
        .bind(i32::from(snapshot.progress))
        .bind(&snapshot.status)
        .bind(&snapshot.stage)
        .bind(snapshot.completed)
        .bind(&snapshot.error)
        .bind(serde_json::to_value(&snapshot.result)?)
        .bind(snapshot.created_at)
        .bind(snapshot.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read(&self, task_id: Uuid) -> Result<Option<TaskSnapshot>> {
        let row = sqlx::query_as::<_, ProgressTaskRow>(
            r#"
            SELECT task_id, progress, status, stage, completed, error, result,
                   created_at, updated_at
            FROM progress_tasks
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProgressTaskRow::into_snapshot).transpose()
    }

    async fn request_cancel(&self, task_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE progress_tasks SET cancel_requested = TRUE WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cancel_requested(&self, task_id: Uuid) -> Result<bool> {
        let flagged: Option<bool> = sqlx::query_scalar(
            "SELECT cancel_requested FROM progress_tasks WHERE task_id = $1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(flagged.unwrap_or(false))
    }
}
