//! Redis fast tier.
//!
//! Snapshots are stored as JSON blobs under `progress:{task_id}` with the
//! configured TTL (default 30 minutes), matching the polling window of a
//! long-running operation. Eviction here is expected; the durable tier backs
//! the recovery path.

use anyhow::Result;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::models::task::TaskSnapshot;
use crate::store::FastTier;

pub struct RedisTier {
    conn: MultiplexedConnection,
    ttl_secs: u64,
}

impl RedisTier {
    pub fn new(conn: MultiplexedConnection, ttl_secs: u64) -> Self {
        RedisTier { conn, ttl_secs }
    }

    fn key(task_id: Uuid) -> String {
        format!("progress:{task_id}")
    }

    fn cancel_key(task_id: Uuid) -> String {
        format!("progress:cancel:{task_id}")
    }
}

#[async_trait]
impl FastTier for RedisTier {
    async fn write(&self, snapshot: &TaskSnapshot) -> Result<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(snapshot)?;
        let _: () = conn
            .set_ex(Self::key(snapshot.task_id), payload, self.ttl_secs)
            .await?;
        Ok(())
    }

    async fn read(&self, task_id: Uuid) -> Result<Option<TaskSnapshot>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(Self::key(task_id)).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn request_cancel(&self, task_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(Self::cancel_key(task_id), 1, self.ttl_secs)
            .await?;
        Ok(())
    }

    async fn cancel_requested(&self, task_id: Uuid) -> Result<bool> {
        let mut conn = self.conn.clone();
        let flagged: bool = conn.exists(Self::cancel_key(task_id)).await?;
        Ok(flagged)
    }
}
