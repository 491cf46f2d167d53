//! Dual-tier progress store.
//!
//! Every write goes to both tiers: the fast tier (Redis, TTL'd) serves plain
//! reads; the durable tier (Postgres) survives fast-tier eviction and backs
//! the recovery path. The store is constructed once at startup and injected —
//! tiers are trait objects, so in-memory, networked-cache, or durable-table
//! implementations are interchangeable without touching callers.

pub mod memory;
pub mod pg_tier;
pub mod redis_tier;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::models::task::TaskSnapshot;

/// Low-latency, time-limited tier. Entries may be evicted at any time.
#[async_trait]
pub trait FastTier: Send + Sync {
    async fn write(&self, snapshot: &TaskSnapshot) -> Result<()>;
    async fn read(&self, task_id: Uuid) -> Result<Option<TaskSnapshot>>;
    /// Records client cancel intent. Kept outside the snapshot so the
    /// execution unit stays the snapshot's only writer.
    async fn request_cancel(&self, task_id: Uuid) -> Result<()>;
    async fn cancel_requested(&self, task_id: Uuid) -> Result<bool>;
}

/// Persisted tier surviving fast-tier eviction; pruned only by external
/// retention housekeeping.
#[async_trait]
pub trait DurableTier: Send + Sync {
    async fn write(&self, snapshot: &TaskSnapshot) -> Result<()>;
    async fn read(&self, task_id: Uuid) -> Result<Option<TaskSnapshot>>;
    async fn request_cancel(&self, task_id: Uuid) -> Result<()>;
    async fn cancel_requested(&self, task_id: Uuid) -> Result<bool>;
}

/// Outcome of a recovery lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery {
    /// The fast tier had the entry after all (read/recover race).
    Found(TaskSnapshot),
    /// The durable tier had it; the fast tier has been repopulated.
    Recovered(TaskSnapshot),
    /// Neither tier knows the id: never submitted, or past retention.
    Missing,
}

/// Authoritative progress state, keyed by task id.
#[derive(Clone)]
pub struct ProgressStore {
    fast: Arc<dyn FastTier>,
    durable: Arc<dyn DurableTier>,
}

impl ProgressStore {
    pub fn new(fast: Arc<dyn FastTier>, durable: Arc<dyn DurableTier>) -> Self {
        ProgressStore { fast, durable }
    }

    /// Writes both tiers. The durable write is best-effort: a failure there
    /// degrades recovery but must not fail the running operation, so it is
    /// logged and swallowed. A fast-tier failure propagates.
    pub async fn write(&self, snapshot: &TaskSnapshot) -> Result<()> {
        self.fast.write(snapshot).await?;
        if let Err(e) = self.durable.write(snapshot).await {
            warn!(task_id = %snapshot.task_id, "durable progress write failed: {e:#}");
        }
        Ok(())
    }

    /// Plain read: fast tier only. A miss is the client's cue to recover.
    pub async fn read(&self, task_id: Uuid) -> Result<Option<TaskSnapshot>> {
        self.fast.read(task_id).await
    }

    /// Recovery read: fast tier first, then the durable tier with a
    /// write-back so subsequent plain reads hit again.
    pub async fn recover(&self, task_id: Uuid) -> Result<Recovery> {
        if let Some(snapshot) = self.fast.read(task_id).await? {
            return Ok(Recovery::Found(snapshot));
        }
        match self.durable.read(task_id).await? {
            Some(snapshot) => {
                self.fast.write(&snapshot).await?;
                Ok(Recovery::Recovered(snapshot))
            }
            None => Ok(Recovery::Missing),
        }
    }

    /// Records cancel intent in both tiers (durable best-effort).
    pub async fn request_cancel(&self, task_id: Uuid) -> Result<()> {
        self.fast.request_cancel(task_id).await?;
        if let Err(e) = self.durable.request_cancel(task_id).await {
            warn!(task_id = %task_id, "durable cancel flag write failed: {e:#}");
        }
        Ok(())
    }

    /// Checked cooperatively by operations between stages.
    pub async fn cancel_requested(&self, task_id: Uuid) -> Result<bool> {
        if self.fast.cancel_requested(task_id).await? {
            return Ok(true);
        }
        self.durable.cancel_requested(task_id).await
    }
}
