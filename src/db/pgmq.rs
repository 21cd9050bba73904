//! pgmq queue operations via direct SQLx.
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.read,
//! pgmq.archive, pgmq.delete.

use async_trait::async_trait;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::scheduler::RunQueue;
use crate::error::Result;
use crate::telemetry::metrics;

fn count(queue: &str, op: &'static str) {
    metrics::queue_messages().add(
        1,
        &[KeyValue::new("queue", queue.to_string()), KeyValue::new("op", op)],
    );
}

/// A message read from a pgmq queue.
#[derive(Debug, Clone)]
pub struct PgmqMessage {
    pub msg_id: i64,
    pub read_ct: i32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub vt: chrono::DateTime<chrono::Utc>,
    pub message: serde_json::Value,
}

/// Body of a pipeline queue message: one requested runner invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Schedule that fired, or `None` for a manual trigger.
    pub schedule_id: Option<Uuid>,
}

impl RunRequest {
    pub fn origin(&self) -> &'static str {
        if self.schedule_id.is_some() { "schedule" } else { "manual" }
    }
}

impl super::Db {
    /// Create a pgmq queue (idempotent).
    pub async fn create_queue(&self, queue_name: &str) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await?;
        tracing::debug!(queue = queue_name, "queue ready");
        Ok(())
    }

    /// Send a message to a pgmq queue. Returns the message ID.
    /// delay_seconds: 0 for immediate, >0 for delayed delivery.
    pub async fn send_to_queue(
        &self,
        queue_name: &str,
        payload: &serde_json::Value,
        delay_seconds: i32,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, $3)")
            .bind(queue_name)
            .bind(payload)
            .bind(delay_seconds)
            .fetch_one(&self.pool)
            .await?;
        count(queue_name, "sent");
        tracing::debug!(queue = queue_name, msg_id = row.0, "message sent");
        Ok(row.0)
    }

    /// Enqueue one runner invocation on the pipeline queue and wake the
    /// control plane.
    pub async fn enqueue_run(&self, request: &RunRequest) -> Result<i64> {
        let payload = serde_json::to_value(request)?;
        let mut tx = self.pool.begin().await?;
        let msg_id: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, 0)")
            .bind(super::PIPELINE_QUEUE)
            .bind(&payload)
            .fetch_one(&mut *tx)
            .await?;
        // NOTIFY is transactional: only fires on commit
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(super::PIPELINE_READY_CHANNEL)
            .bind(msg_id.0.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        metrics::queue_messages().add(
            1,
            &[
                KeyValue::new("queue", super::PIPELINE_QUEUE),
                KeyValue::new("op", "sent"),
                KeyValue::new("origin", request.origin()),
            ],
        );
        tracing::debug!(msg_id = msg_id.0, origin = request.origin(), schedule_id = ?request.schedule_id, "run enqueued");
        Ok(msg_id.0)
    }

    /// Read the next message from a queue (visibility timeout in seconds).
    /// Returns None if queue is empty.
    pub async fn read_from_queue(
        &self,
        queue_name: &str,
        vt_seconds: i32,
    ) -> Result<Option<PgmqMessage>> {
        let row = sqlx::query_as::<
            _,
            (
                i64,
                i32,
                chrono::DateTime<chrono::Utc>,
                chrono::DateTime<chrono::Utc>,
                serde_json::Value,
            ),
        >("SELECT msg_id, read_ct, enqueued_at, vt, message FROM pgmq.read($1, $2, 1)")
        .bind(queue_name)
        .bind(vt_seconds)
        .fetch_optional(&self.pool)
        .await?;
        if row.is_some() {
            count(queue_name, "read");
        }

        Ok(row.map(|(msg_id, read_ct, enqueued_at, vt, message)| PgmqMessage {
            msg_id,
            read_ct,
            enqueued_at,
            vt,
            message,
        }))
    }

    /// Archive a message (moves to archive table, preserves for audit).
    pub async fn archive_message(&self, queue_name: &str, msg_id: i64) -> Result<()> {
        sqlx::query("SELECT pgmq.archive($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .execute(&self.pool)
            .await?;
        count(queue_name, "archived");
        Ok(())
    }

    /// Delete a message permanently.
    pub async fn delete_message(&self, queue_name: &str, msg_id: i64) -> Result<()> {
        sqlx::query("SELECT pgmq.delete($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .execute(&self.pool)
            .await?;
        count(queue_name, "deleted");
        Ok(())
    }
}

#[async_trait]
impl RunQueue for super::Db {
    async fn enqueue(&self, request: RunRequest) -> Result<i64> {
        self.enqueue_run(&request).await
    }
}
