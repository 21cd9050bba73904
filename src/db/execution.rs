//! Execution log persistence. Entries live in a JSONB array appended in place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::execution::{ExecutionEntry, ExecutionFinish, ExecutionLog, ExecutionStatus};
use crate::model::work::WorkId;
use crate::store::ExecutionStore;

const COLUMNS: &str = "id, schedule_id, work_item_id, status, entries, started_at, finished_at,
     duration_ms, content_id, published_url, error, failed_stage";

#[async_trait]
impl ExecutionStore for super::Db {
    async fn create_execution(
        &self,
        schedule_id: Option<Uuid>,
        work_item_id: WorkId,
    ) -> Result<ExecutionLog> {
        let sql = format!(
            "INSERT INTO execution_logs (id, schedule_id, work_item_id, status, entries, started_at)
             VALUES ($1, $2, $3, 'RUNNING', '[]'::jsonb, now())
             RETURNING {COLUMNS}"
        );
        let row: ExecutionRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(schedule_id)
            .bind(work_item_id.0)
            .fetch_one(&self.pool)
            .await?;
        row.try_into_log()
    }

    async fn append_execution_entry(&self, id: Uuid, entry: ExecutionEntry) -> Result<()> {
        let entry = serde_json::to_value(&entry)?;
        let rows_affected = sqlx::query(
            "UPDATE execution_logs SET entries = entries || jsonb_build_array($1::jsonb)
             WHERE id = $2 AND status = 'RUNNING'",
        )
        .bind(entry)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(self.terminal_or_missing(id, "RUNNING").await);
        }
        Ok(())
    }

    async fn finish_execution(&self, id: Uuid, finish: ExecutionFinish) -> Result<ExecutionLog> {
        let sql = format!(
            "UPDATE execution_logs
             SET status = $1, finished_at = now(), duration_ms = $2, content_id = $3,
                 published_url = $4, error = $5, failed_stage = $6
             WHERE id = $7 AND status = 'RUNNING'
             RETURNING {COLUMNS}"
        );
        let row: Option<ExecutionRow> = sqlx::query_as(&sql)
            .bind(finish.status.as_str())
            .bind(finish.duration_ms as i64)
            .bind(finish.content_id)
            .bind(&finish.published_url)
            .bind(&finish.error)
            .bind(finish.failed_stage.map(|s| s.as_str()))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.try_into_log(),
            None => Err(self.terminal_or_missing(id, finish.status.as_str()).await),
        }
    }

    async fn get_execution(&self, id: Uuid) -> Result<ExecutionLog> {
        let sql = format!("SELECT {COLUMNS} FROM execution_logs WHERE id = $1");
        let row: Option<ExecutionRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| Error::NotFound(format!("execution log {id}")))?
            .try_into_log()
    }
}

impl super::Db {
    /// Execution logs for one work item, newest first.
    pub async fn list_executions(&self, work_item_id: WorkId) -> Result<Vec<ExecutionLog>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM execution_logs WHERE work_item_id = $1 ORDER BY started_at DESC"
        );
        let rows: Vec<ExecutionRow> = sqlx::query_as(&sql)
            .bind(work_item_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ExecutionRow::try_into_log).collect()
    }

    /// Explain why a guarded write touched no row.
    async fn terminal_or_missing(&self, id: Uuid, to: &str) -> Error {
        match self.get_execution(id).await {
            Ok(log) => Error::InvalidTransition {
                from: log.status.to_string(),
                to: to.to_string(),
            },
            Err(e) => e,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: Uuid,
    schedule_id: Option<Uuid>,
    work_item_id: Uuid,
    status: String,
    entries: serde_json::Value,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    content_id: Option<Uuid>,
    published_url: Option<String>,
    error: Option<String>,
    failed_stage: Option<String>,
}

impl ExecutionRow {
    fn try_into_log(self) -> Result<ExecutionLog> {
        let status: ExecutionStatus = self.status.parse()?;
        Ok(ExecutionLog {
            id: self.id,
            schedule_id: self.schedule_id,
            work_item_id: WorkId(self.work_item_id),
            status,
            entries: serde_json::from_value(self.entries)?,
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_ms: self.duration_ms.map(|ms| ms.max(0) as u64),
            content_id: self.content_id,
            published_url: self.published_url,
            error: self.error,
            failed_stage: self.failed_stage.map(|s| s.parse()).transpose()?,
        })
    }
}
