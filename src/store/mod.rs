//! Storage contracts for work items, execution logs and schedules.
//!
//! The pipeline only talks to these traits. [`crate::db::Db`] implements them
//! on Postgres; [`memory::MemoryStore`] implements them in-process for tests
//! and dry runs.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::model::execution::{ExecutionEntry, ExecutionFinish, ExecutionLog};
use crate::model::schedule::{NewSchedule, Schedule};
use crate::model::work::{
    Checkpoint, FailureStage, ImageSlot, NewWorkItem, SeoFields, Status, WorkId, WorkItem,
};

pub use memory::MemoryStore;

#[async_trait]
pub trait WorkStore: Send + Sync {
    async fn create_work_item(&self, new: NewWorkItem) -> Result<WorkItem>;

    async fn get_work_item(&self, id: WorkId) -> Result<WorkItem>;

    /// Apply a field-level patch as one atomic write. Returns the updated item.
    async fn update_work_item(&self, id: WorkId, patch: WorkItemPatch) -> Result<WorkItem>;

    /// Items in one of `statuses` without a content ID, highest priority
    /// first, then oldest first.
    async fn find_eligible(&self, statuses: &[Status], limit: i64) -> Result<Vec<WorkItem>>;

    /// FAILED items with `can_retry`, most recent failure first.
    async fn find_retriable(&self) -> Result<Vec<WorkItem>>;

    async fn find_by_image_task(&self, task_id: &str) -> Result<Option<WorkItem>>;
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create_execution(
        &self,
        schedule_id: Option<Uuid>,
        work_item_id: WorkId,
    ) -> Result<ExecutionLog>;

    /// Append one entry. Fails once the log is terminal.
    async fn append_execution_entry(&self, id: Uuid, entry: ExecutionEntry) -> Result<()>;

    /// Write the terminal status. Fails if already terminal.
    async fn finish_execution(&self, id: Uuid, finish: ExecutionFinish) -> Result<ExecutionLog>;

    async fn get_execution(&self, id: Uuid) -> Result<ExecutionLog>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn create_schedule(&self, new: NewSchedule) -> Result<Schedule>;

    /// Bump `last_run` and `run_count`. `None` if the schedule no longer exists.
    async fn record_schedule_run(&self, id: Uuid) -> Result<Option<Schedule>>;

    async fn list_enabled_schedules(&self) -> Result<Vec<Schedule>>;
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Field-level update of a work item. Unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct WorkItemPatch {
    pub status: Option<Status>,
    pub checkpoint: Option<Checkpoint>,
    pub seo: Option<SeoFields>,
    pub images: Vec<(ImageSlot, String)>,
    /// `Some(None)` clears the stored handle.
    pub image_task_id: Option<Option<String>>,
    pub category_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub content_id: Option<Uuid>,
    pub published_url: Option<String>,
    pub failure: Option<FailureUpdate>,
    /// Drop every generated artifact. Applied before the other fields.
    pub clear_artifacts: bool,
}

/// Changes to the retry bookkeeping.
#[derive(Debug, Clone)]
pub enum FailureUpdate {
    /// Clear failed step, timestamp and error.
    Clear,
    /// Record a failure, bump the attempt counter and allow retry.
    Record {
        step: FailureStage,
        error: String,
        at: DateTime<Utc>,
    },
    /// Block further retries.
    DisableRetry,
}

impl WorkItemPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_seo(mut self, seo: SeoFields) -> Self {
        self.seo = Some(seo);
        self
    }

    pub fn with_image(mut self, slot: ImageSlot, url: impl Into<String>) -> Self {
        self.images.push((slot, url.into()));
        self
    }

    pub fn with_image_task(mut self, task_id: Option<String>) -> Self {
        self.image_task_id = Some(task_id);
        self
    }

    /// Apply to an in-memory item the same way the SQL update does.
    pub(crate) fn apply_to(&self, item: &mut WorkItem, now: DateTime<Utc>) {
        if self.clear_artifacts {
            item.seo = None;
            item.images.clear();
            item.image_task_id = None;
            item.category_id = None;
            item.author_id = None;
            item.content_id = None;
            item.published_url = None;
        }
        if let Some(status) = self.status {
            item.status = status;
        }
        if let Some(checkpoint) = self.checkpoint {
            item.checkpoint = checkpoint;
        }
        if let Some(seo) = &self.seo {
            item.seo = Some(seo.clone());
        }
        for (slot, url) in &self.images {
            item.images.set(*slot, url.clone());
        }
        if let Some(task) = &self.image_task_id {
            item.image_task_id = task.clone();
        }
        if let Some(id) = self.category_id {
            item.category_id = Some(id);
        }
        if let Some(id) = self.author_id {
            item.author_id = Some(id);
        }
        if let Some(id) = self.content_id {
            item.content_id = Some(id);
        }
        if let Some(url) = &self.published_url {
            item.published_url = Some(url.clone());
        }
        match &self.failure {
            Some(FailureUpdate::Clear) => {
                item.retry.failed_step = None;
                item.retry.failed_at = None;
                item.retry.generation_error = None;
            }
            Some(FailureUpdate::Record { step, error, at }) => {
                item.retry.failed_step = Some(*step);
                item.retry.failed_at = Some(*at);
                item.retry.generation_error = Some(error.clone());
                item.retry.generation_attempts += 1;
                item.retry.can_retry = true;
            }
            Some(FailureUpdate::DisableRetry) => {
                item.retry.can_retry = false;
            }
            None => {}
        }
        item.updated_at = now;
    }
}
