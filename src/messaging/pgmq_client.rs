//! PostgreSQL message queue (pgmq) client.
//!
//! SQS-like queue operations over Postgres via sqlx: the input event topic
//! and the downstream destination both ride on pgmq when enabled. The
//! visibility timeout gives at-least-once redelivery; deleting a message is
//! the commit.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone)]
pub struct PgmqClient {
    pool: PgPool,
}

/// Message read from a queue, with delivery metadata.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub msg_id: i64,
    pub queue_name: String,
    pub message: serde_json::Value,
    pub headers: Option<serde_json::Value>,
    /// When the message becomes visible again if not deleted.
    pub vt: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
    pub read_ct: i32,
}

impl PgmqClient {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn queue_err(err: sqlx::Error) -> PipelineError {
        PipelineError::Queue(err.to_string())
    }

    /// Create a queue; succeeds if it already exists.
    pub async fn create_queue(&self, queue_name: &str) -> PipelineResult<()> {
        debug!(queue = queue_name, "creating queue");
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await
            .map_err(Self::queue_err)?;
        info!(queue = queue_name, "queue ready");
        Ok(())
    }

    /// Send one message, with optional JSON headers.
    pub async fn send(
        &self,
        queue_name: &str,
        message: &serde_json::Value,
        headers: Option<&serde_json::Value>,
    ) -> PipelineResult<i64> {
        let row = match headers {
            Some(headers) => {
                sqlx::query("SELECT pgmq.send($1, $2::jsonb, $3::jsonb) AS msg_id")
                    .bind(queue_name)
                    .bind(message)
                    .bind(headers)
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT pgmq.send($1, $2::jsonb) AS msg_id")
                    .bind(queue_name)
                    .bind(message)
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(Self::queue_err)?;

        let msg_id: i64 = row.try_get("msg_id").map_err(Self::queue_err)?;
        debug!(queue = queue_name, msg_id, "message sent");
        Ok(msg_id)
    }

    /// Read up to `qty` messages, making them invisible for `vt_seconds`.
    pub async fn read(
        &self,
        queue_name: &str,
        vt_seconds: i32,
        qty: i32,
    ) -> PipelineResult<Vec<QueueMessage>> {
        let rows = sqlx::query(
            "SELECT msg_id, read_ct, enqueued_at, vt, message, headers \
             FROM pgmq.read($1, $2, $3)",
        )
        .bind(queue_name)
        .bind(vt_seconds)
        .bind(qty)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::queue_err)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(QueueMessage {
                msg_id: row.try_get("msg_id").map_err(Self::queue_err)?,
                queue_name: queue_name.to_string(),
                message: row.try_get("message").map_err(Self::queue_err)?,
                headers: row.try_get("headers").map_err(Self::queue_err)?,
                vt: row.try_get("vt").map_err(Self::queue_err)?,
                enqueued_at: row.try_get("enqueued_at").map_err(Self::queue_err)?,
                read_ct: row.try_get("read_ct").map_err(Self::queue_err)?,
            });
        }
        debug!(
            queue = queue_name,
            count = messages.len(),
            "messages read"
        );
        Ok(messages)
    }

    /// Permanently remove a message (the offset-commit analogue).
    pub async fn delete(&self, queue_name: &str, msg_id: i64) -> PipelineResult<bool> {
        let row = sqlx::query("SELECT pgmq.delete($1, $2) AS deleted")
            .bind(queue_name)
            .bind(msg_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Self::queue_err)?;
        let deleted: bool = row.try_get("deleted").map_err(Self::queue_err)?;
        debug!(queue = queue_name, msg_id, deleted, "message deleted");
        Ok(deleted)
    }

    /// Move a message to the archive table instead of deleting it.
    pub async fn archive(&self, queue_name: &str, msg_id: i64) -> PipelineResult<bool> {
        let row = sqlx::query("SELECT pgmq.archive($1, $2) AS archived")
            .bind(queue_name)
            .bind(msg_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Self::queue_err)?;
        let archived: bool = row.try_get("archived").map_err(Self::queue_err)?;
        debug!(queue = queue_name, msg_id, archived, "message archived");
        Ok(archived)
    }
}
