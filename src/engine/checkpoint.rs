//! Checkpoint manager: the record of what has already been paid for.
//!
//! Every pipeline write to a work item goes through here except the
//! orchestrator's initial status transition. Checkpoints only move forward;
//! failures never touch them, so a failed item resumes from its last
//! confirmed stage.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::scheduler::RunQueue;
use crate::db::pgmq::RunRequest;
use crate::error::{Error, Result};
use crate::model::work::{Checkpoint, FailureStage, ImageSlot, Status, WorkId, WorkItem};
use crate::store::{FailureUpdate, WorkItemPatch, WorkStore};
use crate::telemetry::metrics;

/// Completeness of a work item, derived from its stored artifacts.
///
/// The `has_*` flags look at the artifacts themselves, not the checkpoint
/// marker, so a marker that disagrees with storage cannot skip work that
/// was never done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointStatus {
    pub last_step: Checkpoint,
    pub can_resume: bool,
    pub has_images: bool,
    pub has_seo: bool,
    pub has_recipe: bool,
    pub images_present: usize,
    pub failed_step: Option<FailureStage>,
    pub generation_error: Option<String>,
}

impl CheckpointStatus {
    pub fn of(item: &WorkItem) -> Self {
        Self {
            last_step: item.checkpoint,
            can_resume: !(item.status == Status::Failed && !item.retry.can_retry),
            has_images: item.has_images(),
            has_seo: item.has_seo(),
            has_recipe: item.has_recipe(),
            images_present: item.images.present_count(),
            failed_step: item.retry.failed_step,
            generation_error: item.retry.generation_error.clone(),
        }
    }

    /// Where a resumed run re-enters the pipeline. First matching rule wins.
    pub fn resume_step(&self, id: WorkId) -> Result<Checkpoint> {
        if !self.can_resume {
            return Err(Error::NotRetriable(id));
        }
        Ok(if self.has_recipe {
            Checkpoint::RecipeComplete
        } else if self.has_images && self.has_seo {
            Checkpoint::ImagesComplete
        } else if self.has_seo {
            Checkpoint::SeoComplete
        } else {
            Checkpoint::Init
        })
    }
}

/// A failed item an operator could retry, with what it already has.
#[derive(Debug, Clone, Serialize)]
pub struct RetriableEntry {
    pub item_id: WorkId,
    pub title: String,
    pub checkpoint: Checkpoint,
    pub failed_step: Option<FailureStage>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub attempts: u32,
    pub has_seo: bool,
    pub has_images: bool,
    pub images_present: usize,
}

impl From<&WorkItem> for RetriableEntry {
    fn from(item: &WorkItem) -> Self {
        Self {
            item_id: item.id,
            title: item.lead.title.clone(),
            checkpoint: item.checkpoint,
            failed_step: item.retry.failed_step,
            failed_at: item.retry.failed_at,
            error: item.retry.generation_error.clone(),
            attempts: item.retry.generation_attempts,
            has_seo: item.has_seo(),
            has_images: item.has_images(),
            images_present: item.images.present_count(),
        }
    }
}

#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn WorkStore>,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn WorkStore>) -> Self {
        Self { store }
    }

    /// Advance the checkpoint and merge `extra` in one write, clearing
    /// failure markers.
    ///
    /// Call only after the stage's artifact is verified: the artifact must be
    /// present on the item (or in `extra`) or the write is refused. A
    /// checkpoint lower than the stored one is not written; `extra` still is.
    pub async fn save_checkpoint(
        &self,
        id: WorkId,
        checkpoint: Checkpoint,
        extra: WorkItemPatch,
    ) -> Result<WorkItem> {
        let current = self.store.get_work_item(id).await?;

        let mut patch = extra;
        patch.failure = Some(FailureUpdate::Clear);

        let mut preview = current.clone();
        patch.apply_to(&mut preview, Utc::now());
        ensure_artifact(&preview, checkpoint)?;

        if checkpoint >= current.checkpoint {
            patch.checkpoint = Some(checkpoint);
        } else {
            warn!(
                id = %id,
                stored = %current.checkpoint,
                requested = %checkpoint,
                "refusing to lower checkpoint"
            );
        }

        let item = self.store.update_work_item(id, patch).await?;
        metrics::checkpoints_saved().add(1, &[KeyValue::new("checkpoint", checkpoint.as_str())]);
        info!(id = %id, checkpoint = %item.checkpoint, status = %item.status, "checkpoint saved");
        Ok(item)
    }

    /// Record one verified image ahead of IMAGES_COMPLETE, so a later failure
    /// in another slot does not lose it.
    pub async fn record_image(&self, id: WorkId, slot: ImageSlot, url: &str) -> Result<WorkItem> {
        let item = self
            .store
            .update_work_item(id, WorkItemPatch::default().with_image(slot, url))
            .await?;
        debug!(id = %id, %slot, url, "image recorded");
        Ok(item)
    }

    /// Persist the handle of a submitted async image task. The item waits in
    /// GENERATING until the callback arrives.
    pub async fn record_image_task(&self, id: WorkId, task_id: &str) -> Result<WorkItem> {
        let patch = WorkItemPatch::status(Status::Generating).with_image_task(Some(task_id.to_string()));
        let item = self.store.update_work_item(id, patch).await?;
        info!(id = %id, task_id, "image task recorded");
        Ok(item)
    }

    /// Record a failure. The checkpoint is left alone: it is the recovery anchor.
    pub async fn mark_failed(&self, id: WorkId, step: FailureStage, error: &str) -> Result<WorkItem> {
        let patch = WorkItemPatch {
            status: Some(Status::Failed),
            failure: Some(FailureUpdate::Record {
                step,
                error: error.to_string(),
                at: Utc::now(),
            }),
            ..WorkItemPatch::default()
        };
        let item = self.store.update_work_item(id, patch).await?;
        metrics::stage_failures().add(1, &[KeyValue::new("stage", step.as_str())]);
        warn!(
            id = %id,
            stage = %step,
            attempts = item.retry.generation_attempts,
            checkpoint = %item.checkpoint,
            error,
            "work item failed"
        );
        Ok(item)
    }

    pub async fn get_last_checkpoint(&self, id: WorkId) -> Result<CheckpointStatus> {
        let item = self.store.get_work_item(id).await?;
        Ok(CheckpointStatus::of(&item))
    }

    pub async fn determine_resume_step(&self, id: WorkId) -> Result<Checkpoint> {
        self.get_last_checkpoint(id).await?.resume_step(id)
    }

    /// Put a failed item back in the queue, keeping every paid-for artifact.
    ///
    /// An outstanding async image task handle is dropped, so the next run
    /// submits a fresh task.
    pub async fn reset_for_retry(&self, id: WorkId) -> Result<WorkItem> {
        let current = self.store.get_work_item(id).await?;
        if current.has_recipe() {
            return Err(Error::PreconditionFailed(format!(
                "work item {id} already has generated content"
            )));
        }

        let patch = WorkItemPatch {
            status: Some(Status::Pending),
            failure: Some(FailureUpdate::Clear),
            image_task_id: Some(None),
            ..WorkItemPatch::default()
        };
        let item = self.store.update_work_item(id, patch).await?;
        info!(
            id = %id,
            checkpoint = %item.checkpoint,
            has_seo = item.has_seo(),
            images_present = item.images.present_count(),
            "work item reset for retry"
        );
        Ok(item)
    }

    /// Reset a failed item and queue a runner invocation for it.
    ///
    /// The pipeline itself only ever runs under the job runner's turn, so a
    /// restart never races a serving runner on the same item.
    pub async fn restart(&self, id: WorkId, queue: &dyn RunQueue) -> Result<(WorkItem, i64)> {
        let item = self.reset_for_retry(id).await?;
        let msg_id = queue.enqueue(RunRequest::default()).await?;
        info!(id = %id, msg_id, "retry queued");
        Ok((item, msg_id))
    }

    /// Failed items that may be retried, most recent failure first.
    pub async fn get_retriable_entries(&self) -> Result<Vec<RetriableEntry>> {
        let items = self.store.find_retriable().await?;
        Ok(items.iter().map(RetriableEntry::from).collect())
    }

    /// Explicit reset: drop all artifacts and start over from INIT.
    ///
    /// Refused once content exists, since regenerating would publish a
    /// duplicate.
    pub async fn reset_checkpoint(&self, id: WorkId) -> Result<WorkItem> {
        let current = self.store.get_work_item(id).await?;
        if current.has_recipe() {
            return Err(Error::PreconditionFailed(format!(
                "work item {id} already has generated content"
            )));
        }

        let patch = WorkItemPatch {
            status: Some(Status::Pending),
            checkpoint: Some(Checkpoint::Init),
            failure: Some(FailureUpdate::Clear),
            clear_artifacts: true,
            ..WorkItemPatch::default()
        };
        let item = self.store.update_work_item(id, patch).await?;
        warn!(id = %id, previous = %current.checkpoint, "checkpoint reset to INIT");
        Ok(item)
    }

    /// Block further retries of a failed item.
    pub async fn disable_retry(&self, id: WorkId) -> Result<WorkItem> {
        let patch = WorkItemPatch {
            failure: Some(FailureUpdate::DisableRetry),
            ..WorkItemPatch::default()
        };
        let item = self.store.update_work_item(id, patch).await?;
        info!(id = %id, "retries disabled");
        Ok(item)
    }
}

/// A checkpoint may only be recorded once its artifact exists.
fn ensure_artifact(item: &WorkItem, checkpoint: Checkpoint) -> Result<()> {
    let missing = match checkpoint {
        Checkpoint::Init => None,
        Checkpoint::SeoComplete if !item.has_seo() => Some("SEO fields"),
        Checkpoint::ImagesComplete if !item.has_images() => Some("all four images"),
        Checkpoint::RecipeComplete | Checkpoint::GoogleIndexed | Checkpoint::PinterestSent
            if !item.has_recipe() =>
        {
            Some("generated content")
        }
        _ => None,
    };
    match missing {
        Some(what) => Err(Error::Verification(format!(
            "cannot record {checkpoint} for {}: {what} not stored",
            item.id
        ))),
        None => Ok(()),
    }
}
