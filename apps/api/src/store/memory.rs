//! In-memory tier for tests and single-process development runs.
//!
//! Implements both tier traits; `clear()` stands in for fast-tier eviction.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::task::TaskSnapshot;
use crate::store::{DurableTier, FastTier};

#[derive(Default)]
pub struct MemoryTier {
    entries: Mutex<HashMap<Uuid, TaskSnapshot>>,
    cancels: Mutex<HashSet<Uuid>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        MemoryTier::default()
    }

    /// Drops all entries, simulating TTL eviction of the fast tier.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    fn put(&self, snapshot: &TaskSnapshot) {
        self.entries
            .lock()
            .unwrap()
            .insert(snapshot.task_id, snapshot.clone());
    }

    /// Direct lookup, bypassing the tier traits (test assertions).
    pub fn get(&self, task_id: Uuid) -> Option<TaskSnapshot> {
        self.entries.lock().unwrap().get(&task_id).cloned()
    }

    fn set_cancel(&self, task_id: Uuid) {
        self.cancels.lock().unwrap().insert(task_id);
    }

    fn cancelled(&self, task_id: Uuid) -> bool {
        self.cancels.lock().unwrap().contains(&task_id)
    }
}

#[async_trait]
impl FastTier for MemoryTier {
    async fn write(&self, snapshot: &TaskSnapshot) -> Result<()> {
        self.put(snapshot);
        Ok(())
    }

    async fn read(&self, task_id: Uuid) -> Result<Option<TaskSnapshot>> {
        Ok(self.get(task_id))
    }

    async fn request_cancel(&self, task_id: Uuid) -> Result<()> {
        self.set_cancel(task_id);
        Ok(())
    }

    async fn cancel_requested(&self, task_id: Uuid) -> Result<bool> {
        Ok(self.cancelled(task_id))
    }
}

#[async_trait]
impl DurableTier for MemoryTier {
    async fn write(&self, snapshot: &TaskSnapshot) -> Result<()> {
        // Mirror the durable tier's terminal guard: the first terminal write
        // freezes the row.
        if let Some(existing) = self.get(snapshot.task_id) {
            if existing.is_terminal() {
                return Ok(());
            }
        }
        self.put(snapshot);
        Ok(())
    }

    async fn read(&self, task_id: Uuid) -> Result<Option<TaskSnapshot>> {
        Ok(self.get(task_id))
    }

    async fn request_cancel(&self, task_id: Uuid) -> Result<()> {
        self.set_cancel(task_id);
        Ok(())
    }

    async fn cancel_requested(&self, task_id: Uuid) -> Result<bool> {
        Ok(self.cancelled(task_id))
    }
}
