//! Work item persistence: create, atomic patch, runner and operator queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::work::*;
use crate::store::{FailureUpdate, WorkItemPatch, WorkStore};

const COLUMNS: &str = "id, source_url, title, description, reference_image_url, priority, status, checkpoint,
     seo_keyword, seo_title, seo_description, seo_category,
     image_url_1, image_url_2, image_url_3, image_url_4, image_task_id,
     category_id, author_id, content_id, published_url,
     failed_step, failed_at, generation_error, generation_attempts, can_retry,
     created_at, updated_at";

const IMAGE_COLUMNS: [&str; 4] = ["image_url_1", "image_url_2", "image_url_3", "image_url_4"];

#[async_trait]
impl WorkStore for super::Db {
    async fn create_work_item(&self, new: NewWorkItem) -> Result<WorkItem> {
        let item = new.into_work_item(Utc::now());
        let sql = format!(
            "INSERT INTO work_items (id, source_url, title, description, reference_image_url, priority, status, checkpoint, generation_attempts, can_retry, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, TRUE, $9, $9)
             RETURNING {COLUMNS}"
        );
        let row: WorkItemRow = sqlx::query_as(&sql)
            .bind(item.id.0)
            .bind(&item.lead.source_url)
            .bind(&item.lead.title)
            .bind(&item.lead.description)
            .bind(&item.lead.image_url)
            .bind(item.priority)
            .bind(item.status.as_str())
            .bind(item.checkpoint.as_str())
            .bind(item.created_at)
            .fetch_one(&self.pool)
            .await?;
        row.try_into_work_item()
    }

    async fn get_work_item(&self, id: WorkId) -> Result<WorkItem> {
        let sql = format!("SELECT {COLUMNS} FROM work_items WHERE id = $1");
        let row: Option<WorkItemRow> = sqlx::query_as(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| Error::NotFound(format!("work item {id}")))?
            .try_into_work_item()
    }

    async fn update_work_item(&self, id: WorkId, patch: WorkItemPatch) -> Result<WorkItem> {
        let mut qb = patch_query(id, &patch);
        let row: Option<WorkItemRow> = qb.build_query_as().fetch_optional(&self.pool).await?;
        row.ok_or_else(|| Error::NotFound(format!("work item {id}")))?
            .try_into_work_item()
    }

    async fn find_eligible(&self, statuses: &[Status], limit: i64) -> Result<Vec<WorkItem>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let sql = format!(
            "SELECT {COLUMNS} FROM work_items
             WHERE status = ANY($1) AND content_id IS NULL
             ORDER BY priority DESC, created_at ASC
             LIMIT $2"
        );
        let rows: Vec<WorkItemRow> = sqlx::query_as(&sql)
            .bind(&statuses)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(WorkItemRow::try_into_work_item).collect()
    }

    async fn find_retriable(&self) -> Result<Vec<WorkItem>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM work_items
             WHERE status = 'FAILED' AND can_retry
             ORDER BY failed_at DESC NULLS LAST"
        );
        let rows: Vec<WorkItemRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(WorkItemRow::try_into_work_item).collect()
    }

    async fn find_by_image_task(&self, task_id: &str) -> Result<Option<WorkItem>> {
        let sql = format!("SELECT {COLUMNS} FROM work_items WHERE image_task_id = $1 LIMIT 1");
        let row: Option<WorkItemRow> = sqlx::query_as(&sql)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(WorkItemRow::try_into_work_item).transpose()
    }
}

impl super::Db {
    /// Most recently created items, optionally filtered by status.
    pub async fn list_work_items(&self, status: Option<Status>, limit: i64) -> Result<Vec<WorkItem>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM work_items
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY created_at DESC
             LIMIT $2"
        );
        let rows: Vec<WorkItemRow> = sqlx::query_as(&sql)
            .bind(status.map(Status::as_str))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(WorkItemRow::try_into_work_item).collect()
    }
}

/// One `UPDATE ... RETURNING` for the whole patch.
///
/// A column is assigned at most once: explicit values win over
/// `clear_artifacts`, and the last image written for a slot wins.
fn patch_query(id: WorkId, patch: &WorkItemPatch) -> QueryBuilder<'static, Postgres> {
    let clear = patch.clear_artifacts;
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE work_items SET updated_at = now()");

    if let Some(status) = patch.status {
        qb.push(", status = ").push_bind(status.as_str());
    }
    if let Some(checkpoint) = patch.checkpoint {
        qb.push(", checkpoint = ").push_bind(checkpoint.as_str());
    }

    match &patch.seo {
        Some(seo) => {
            qb.push(", seo_keyword = ").push_bind(seo.keyword.clone());
            qb.push(", seo_title = ").push_bind(seo.title.clone());
            qb.push(", seo_description = ").push_bind(seo.description.clone());
            qb.push(", seo_category = ").push_bind(seo.category.clone());
        }
        None if clear => {
            qb.push(", seo_keyword = NULL, seo_title = NULL, seo_description = NULL, seo_category = NULL");
        }
        None => {}
    }

    let mut images: [Option<String>; 4] = Default::default();
    for (slot, url) in &patch.images {
        images[slot.index()] = Some(url.clone());
    }
    for (column, url) in IMAGE_COLUMNS.iter().zip(images) {
        match url {
            Some(url) => {
                qb.push(format!(", {column} = ")).push_bind(url);
            }
            None if clear => {
                qb.push(format!(", {column} = NULL"));
            }
            None => {}
        }
    }

    match &patch.image_task_id {
        Some(task) => {
            qb.push(", image_task_id = ").push_bind(task.clone());
        }
        None if clear => {
            qb.push(", image_task_id = NULL");
        }
        None => {}
    }

    push_optional_uuid(&mut qb, "category_id", patch.category_id, clear);
    push_optional_uuid(&mut qb, "author_id", patch.author_id, clear);
    push_optional_uuid(&mut qb, "content_id", patch.content_id, clear);

    match &patch.published_url {
        Some(url) => {
            qb.push(", published_url = ").push_bind(url.clone());
        }
        None if clear => {
            qb.push(", published_url = NULL");
        }
        None => {}
    }

    match &patch.failure {
        Some(FailureUpdate::Clear) => {
            qb.push(", failed_step = NULL, failed_at = NULL, generation_error = NULL");
        }
        Some(FailureUpdate::Record { step, error, at }) => {
            qb.push(", failed_step = ").push_bind(step.as_str());
            qb.push(", failed_at = ").push_bind(*at);
            qb.push(", generation_error = ").push_bind(error.clone());
            qb.push(", generation_attempts = generation_attempts + 1, can_retry = TRUE");
        }
        Some(FailureUpdate::DisableRetry) => {
            qb.push(", can_retry = FALSE");
        }
        None => {}
    }

    qb.push(" WHERE id = ").push_bind(id.0);
    qb.push(format!(" RETURNING {COLUMNS}"));
    qb
}

fn push_optional_uuid(
    qb: &mut QueryBuilder<'static, Postgres>,
    column: &str,
    value: Option<Uuid>,
    clear: bool,
) {
    match value {
        Some(id) => {
            qb.push(format!(", {column} = ")).push_bind(id);
        }
        None if clear => {
            qb.push(format!(", {column} = NULL"));
        }
        None => {}
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct WorkItemRow {
    id: Uuid,
    source_url: String,
    title: String,
    description: Option<String>,
    reference_image_url: Option<String>,
    priority: i32,
    status: String,
    checkpoint: String,
    seo_keyword: Option<String>,
    seo_title: Option<String>,
    seo_description: Option<String>,
    seo_category: Option<String>,
    image_url_1: Option<String>,
    image_url_2: Option<String>,
    image_url_3: Option<String>,
    image_url_4: Option<String>,
    image_task_id: Option<String>,
    category_id: Option<Uuid>,
    author_id: Option<Uuid>,
    content_id: Option<Uuid>,
    published_url: Option<String>,
    failed_step: Option<String>,
    failed_at: Option<DateTime<Utc>>,
    generation_error: Option<String>,
    generation_attempts: i32,
    can_retry: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkItemRow {
    fn try_into_work_item(self) -> Result<WorkItem> {
        let seo = match (self.seo_keyword, self.seo_title, self.seo_description) {
            (Some(keyword), Some(title), Some(description)) => Some(SeoFields {
                keyword,
                title,
                description,
                category: self.seo_category,
            }),
            _ => None,
        };

        Ok(WorkItem {
            id: WorkId(self.id),
            lead: Lead {
                source_url: self.source_url,
                title: self.title,
                description: self.description,
                image_url: self.reference_image_url,
            },
            priority: self.priority,
            status: self.status.parse()?,
            checkpoint: self.checkpoint.parse()?,
            seo,
            images: ImageSet::from_urls([
                self.image_url_1,
                self.image_url_2,
                self.image_url_3,
                self.image_url_4,
            ]),
            image_task_id: self.image_task_id,
            category_id: self.category_id,
            author_id: self.author_id,
            content_id: self.content_id,
            published_url: self.published_url,
            retry: RetryInfo {
                failed_step: self.failed_step.map(|s| s.parse()).transpose()?,
                failed_at: self.failed_at,
                generation_error: self.generation_error,
                generation_attempts: self.generation_attempts.max(0) as u32,
                can_retry: self.can_retry,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
