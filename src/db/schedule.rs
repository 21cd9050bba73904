//! Schedule persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::model::schedule::{NewSchedule, Schedule};
use crate::store::ScheduleStore;

const COLUMNS: &str = "id, name, cron_expression, enabled, last_run, run_count, created_at";

#[async_trait]
impl ScheduleStore for super::Db {
    async fn create_schedule(&self, new: NewSchedule) -> Result<Schedule> {
        let sql = format!(
            "INSERT INTO schedules (id, name, cron_expression, enabled, run_count, created_at)
             VALUES ($1, $2, $3, TRUE, 0, now())
             RETURNING {COLUMNS}"
        );
        let row: ScheduleRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.name)
            .bind(&new.cron_expression)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn record_schedule_run(&self, id: Uuid) -> Result<Option<Schedule>> {
        let sql = format!(
            "UPDATE schedules SET last_run = now(), run_count = run_count + 1
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        let row: Option<ScheduleRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Schedule::from))
    }

    async fn list_enabled_schedules(&self) -> Result<Vec<Schedule>> {
        let sql = format!("SELECT {COLUMNS} FROM schedules WHERE enabled ORDER BY created_at");
        let rows: Vec<ScheduleRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Schedule::from).collect())
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    name: String,
    cron_expression: String,
    enabled: bool,
    last_run: Option<DateTime<Utc>>,
    run_count: i64,
    created_at: DateTime<Utc>,
}

impl From<ScheduleRow> for Schedule {
    fn from(row: ScheduleRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            cron_expression: row.cron_expression,
            enabled: row.enabled,
            last_run: row.last_run,
            run_count: row.run_count,
            created_at: row.created_at,
        }
    }
}
