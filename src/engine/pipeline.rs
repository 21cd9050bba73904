//! Pipeline orchestrator: the seven-stage run over one work item.
//!
//! ```text
//! FETCH → SEO → IMAGES → MATCH_CATEGORY → GENERATE_CONTENT (+PUBLISH) → INDEX → DISTRIBUTE
//! ```
//!
//! Stages whose checkpoint (or artifact) is already in place are skipped, and
//! every completed stage is checkpointed before the next one starts. INDEX and
//! DISTRIBUTE are best-effort. [`Orchestrator::execute_pipeline`] never returns
//! an error: every outcome is a [`PipelineResult`].

use async_trait::async_trait;
use opentelemetry::KeyValue;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, Span, error, info, warn};
use uuid::Uuid;

use super::checkpoint::{CheckpointManager, CheckpointStatus};
use crate::config::PipelineSettings;
use crate::config::settings::TimeoutSettings;
use crate::error::{Error, Result};
use crate::model::content::QualityThresholds;
use crate::model::execution::Progress;
use crate::model::work::{
    Checkpoint, FailureStage, ImageSlot, SeoFields, Status, WorkId, WorkItem,
};
use crate::stage::images::{batch_prompt, image_key, image_prompt, verify_artifact};
use crate::stage::matching::pick_author;
use crate::stage::{
    ArtifactStore, AuthorDirectory, CategoryMatcher, CategoryQuery, ContentGenerator,
    ContentPublisher, ContentRequest, DistributionPayload, Distributor, ImageProvider,
    ImageRequest, ImageTaskRequest, IndexSubmitter, RetryPolicy, SeoExtractor,
};
use crate::store::{WorkItemPatch, WorkStore};
use crate::telemetry::metrics;
use crate::telemetry::pipeline::{record_stage, start_pipeline_span};

/// Number of progress steps in one run.
pub const TOTAL_STEPS: u32 = 7;

/// Pipeline steps in execution order. PUBLISH runs inside `Generate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fetch,
    Seo,
    Images,
    Match,
    Generate,
    Index,
    Distribute,
}

impl Step {
    pub fn number(self) -> u32 {
        match self {
            Step::Fetch => 1,
            Step::Seo => 2,
            Step::Images => 3,
            Step::Match => 4,
            Step::Generate => 5,
            Step::Index => 6,
            Step::Distribute => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Step::Fetch => "FETCH",
            Step::Seo => "SEO",
            Step::Images => "IMAGES",
            Step::Match => "MATCH_CATEGORY",
            Step::Generate => "GENERATE_CONTENT",
            Step::Index => "INDEX",
            Step::Distribute => "DISTRIBUTE",
        }
    }

    fn message(self) -> &'static str {
        match self {
            Step::Fetch => "Loading work item",
            Step::Seo => "Extracting SEO metadata",
            Step::Images => "Generating images",
            Step::Match => "Matching category and author",
            Step::Generate => "Generating and publishing content",
            Step::Index => "Submitting for indexing",
            Step::Distribute => "Sending to distribution",
        }
    }
}

/// Receives a progress report at the start of every step.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, progress: Progress);
}

/// Discards progress.
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&self, _progress: Progress) {}
}

/// Outcome of one orchestrator call, with the lines logged along the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PipelineResult {
    Completed {
        content_id: Uuid,
        url: String,
        logs: Vec<String>,
    },
    /// Images were handed to the async provider; a callback finishes them.
    ImagesPending { task_id: String, logs: Vec<String> },
    Failed {
        stage: FailureStage,
        error: String,
        logs: Vec<String>,
    },
}

impl PipelineResult {
    /// Completed and images-pending are both non-error exits.
    pub fn is_success(&self) -> bool {
        !matches!(self, PipelineResult::Failed { .. })
    }

    pub fn logs(&self) -> &[String] {
        match self {
            PipelineResult::Completed { logs, .. }
            | PipelineResult::ImagesPending { logs, .. }
            | PipelineResult::Failed { logs, .. } => logs,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            PipelineResult::Completed { .. } => "completed",
            PipelineResult::ImagesPending { .. } => "images_pending",
            PipelineResult::Failed { .. } => "failed",
        }
    }
}

/// The external collaborators one run calls into.
#[derive(Clone)]
pub struct Stages {
    pub seo: Arc<dyn SeoExtractor>,
    pub images: ImageProvider,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub categories: Arc<dyn CategoryMatcher>,
    pub authors: Arc<dyn AuthorDirectory>,
    pub generator: Arc<dyn ContentGenerator>,
    pub publisher: Arc<dyn ContentPublisher>,
    /// Unset: INDEX is skipped.
    pub indexer: Option<Arc<dyn IndexSubmitter>>,
    /// Unset: DISTRIBUTE is skipped.
    pub distributor: Option<Arc<dyn Distributor>>,
}

/// Retry budget, timeouts and thresholds for a run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub image_retry: RetryPolicy,
    pub timeouts: TimeoutSettings,
    pub quality: QualityThresholds,
    /// Board the distribution webhook posts to.
    pub board_id: Option<String>,
}

impl PipelineOptions {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            image_retry: RetryPolicy::from(&settings.images),
            timeouts: settings.timeouts.clone(),
            quality: settings.quality.clone(),
            board_id: None,
        }
    }

    pub fn with_board_id(mut self, board_id: Option<String>) -> Self {
        self.board_id = board_id;
        self
    }
}

/// How a run left the stage sequence early or at the end.
enum Flow {
    Published { content_id: Uuid, url: String },
    ImagesPending(String),
}

pub struct Orchestrator {
    store: Arc<dyn WorkStore>,
    checkpoints: CheckpointManager,
    stages: Stages,
    options: PipelineOptions,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn WorkStore>, stages: Stages, options: PipelineOptions) -> Self {
        Self {
            checkpoints: CheckpointManager::new(Arc::clone(&store)),
            store,
            stages,
            options,
        }
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Run the pipeline for one item, resuming after whatever is already done.
    pub async fn execute_pipeline(&self, id: WorkId, progress: &dyn ProgressSink) -> PipelineResult {
        let span = start_pipeline_span(&id.0);
        let started = Instant::now();

        let result = async {
            let mut run = RunLog::new(progress, Span::current());
            match self.stages_for(id, &mut run).await {
                Ok(Flow::Published { content_id, url }) => {
                    run.note(format!("completed: {url}"));
                    PipelineResult::Completed {
                        content_id,
                        url,
                        logs: run.lines,
                    }
                }
                Ok(Flow::ImagesPending(task_id)) => {
                    run.note(format!("waiting for image task {task_id}"));
                    PipelineResult::ImagesPending {
                        task_id,
                        logs: run.lines,
                    }
                }
                Err(e) => self.fail(id, e, run).await,
            }
        }
        .instrument(span)
        .await;

        metrics::pipeline_runs().add(1, &[KeyValue::new("result", result.label())]);
        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "pipeline.execute")],
        );
        result
    }

    /// Callback entry for the async image provider: download, store, verify
    /// and record the four images, then save IMAGES_COMPLETE exactly as the
    /// synchronous path does.
    ///
    /// Calling it again for a completed task is a no-op.
    pub async fn complete_image_task(&self, task_id: &str, urls: &[String; 4]) -> Result<WorkItem> {
        let item = self
            .store
            .find_by_image_task(task_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("image task {task_id}")))?;
        let id = item.id;

        if item.has_images() && item.checkpoint >= Checkpoint::ImagesComplete {
            info!(id = %id, task_id, "image task already complete");
            return Ok(item);
        }

        let ImageProvider::Async(provider) = &self.stages.images else {
            return Err(Error::PreconditionFailed(
                "image callbacks require the async image provider".to_string(),
            ));
        };

        let accepted = async {
            for (slot, url) in ImageSlot::ALL.into_iter().zip(urls.iter()) {
                if self.reuse_slot(&item, slot).await {
                    continue;
                }
                let bytes = bounded(
                    "image download",
                    self.options.timeouts.image,
                    provider.download(url),
                )
                .await?;
                self.accept_image(id, slot, &bytes).await?;
            }
            self.finish_images(id).await
        }
        .await
        .map_err(|e| e.at_stage(FailureStage::ImageGeneration));

        match accepted {
            Ok(item) => {
                info!(id = %id, task_id, "image task completed");
                Ok(item)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(mark_err) = self
                    .checkpoints
                    .mark_failed(id, FailureStage::ImageGeneration, &message)
                    .await
                {
                    error!(id = %id, "failed to record image callback failure: {mark_err}");
                }
                Err(e)
            }
        }
    }

    /// Re-run only INDEX and DISTRIBUTE for an item that already has content.
    pub async fn replay_distribution(&self, id: WorkId, progress: &dyn ProgressSink) -> PipelineResult {
        let span = start_pipeline_span(&id.0);
        async {
            let mut run = RunLog::new(progress, Span::current());
            let replayed = async {
                let item = self.store.get_work_item(id).await?;
                if CheckpointStatus::of(&item).resume_step(id)? != Checkpoint::RecipeComplete {
                    return Err(Error::PreconditionFailed(format!(
                        "work item {id} has no generated content to distribute"
                    )));
                }
                let (Some(content_id), Some(url)) = (item.content_id, item.published_url.clone())
                else {
                    return Err(Error::PreconditionFailed(format!(
                        "work item {id} has no published URL"
                    )));
                };
                self.run_tail(&item, &url, true, &mut run).await;
                Ok((content_id, url))
            }
            .await;

            match replayed {
                Ok((content_id, url)) => PipelineResult::Completed {
                    content_id,
                    url,
                    logs: run.lines,
                },
                Err(e) => {
                    run.note(format!("replay rejected: {e}"));
                    PipelineResult::Failed {
                        stage: e.failure_stage(),
                        error: e.to_string(),
                        logs: run.lines,
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    // -----------------------------------------------------------------------
    // Stage sequence
    // -----------------------------------------------------------------------

    async fn stages_for(&self, id: WorkId, run: &mut RunLog<'_>) -> std::result::Result<Flow, RunError> {
        let item = self.fetch(id, run).await.map_err(RunError::Rejected)?;
        self.produce(item, run).await.map_err(RunError::Failed)
    }

    /// FETCH: the item must exist, must not already have content, and must
    /// be allowed to resume. Nothing is written when these checks fail.
    async fn fetch(&self, id: WorkId, run: &mut RunLog<'_>) -> Result<WorkItem> {
        run.stage(Step::Fetch).await;
        let item = self.store.get_work_item(id).await?;
        if let Some(content_id) = item.content_id {
            return Err(Error::PreconditionFailed(format!(
                "work item {id} already produced content {content_id}"
            )));
        }
        let resume = CheckpointStatus::of(&item).resume_step(id)?;
        run.note(format!("resuming at {resume} (stored checkpoint {})", item.checkpoint));

        self.store
            .update_work_item(id, WorkItemPatch::status(Status::Generating))
            .await
    }

    async fn produce(&self, item: WorkItem, run: &mut RunLog<'_>) -> Result<Flow> {
        let id = item.id;

        run.stage(Step::Seo).await;
        let item = if item.has_seo() {
            skipped(run, Step::Seo);
            item
        } else {
            let seo = bounded("seo extraction", self.options.timeouts.seo, self.stages.seo.extract(&item))
                .await
                .and_then(|seo| {
                    if seo.is_complete() {
                        Ok(seo)
                    } else {
                        Err(Error::Other("seo extraction returned incomplete fields".to_string()))
                    }
                })
                .map_err(|e| e.at_stage(FailureStage::SeoGeneration))?;
            run.note(format!("seo keyword: {}", seo.keyword));
            self.checkpoints
                .save_checkpoint(
                    id,
                    Checkpoint::SeoComplete,
                    WorkItemPatch::status(Status::SeoProcessed).with_seo(seo),
                )
                .await?
        };
        let seo = item
            .seo
            .clone()
            .ok_or_else(|| Error::Verification(format!("seo fields missing on {id}")))?;

        run.stage(Step::Images).await;
        let item = if item.has_images() && item.checkpoint >= Checkpoint::ImagesComplete {
            skipped(run, Step::Images);
            item
        } else if item.has_images() && self.recorded_images_verify(&item).await {
            // Paid for by an earlier run that stopped before the marker.
            run.note("images already verified, recording IMAGES_COMPLETE");
            self.finish_images(id)
                .await
                .map_err(|e| e.at_stage(FailureStage::ImageGeneration))?
        } else {
            match &self.stages.images {
                ImageProvider::Sync(_) => self
                    .generate_images(&item, &seo, run)
                    .await
                    .map_err(|e| e.at_stage(FailureStage::ImageGeneration))?,
                ImageProvider::Async(provider) => {
                    if let Some(task_id) = &item.image_task_id {
                        run.note(format!("image task {task_id} already submitted"));
                        return Ok(Flow::ImagesPending(task_id.clone()));
                    }
                    let request = ImageTaskRequest {
                        prompt: batch_prompt(&seo),
                        reference_image: item.lead.image_url.clone(),
                    };
                    let task_id =
                        bounded("image task submit", self.options.timeouts.image, provider.submit(&request))
                            .await
                            .map_err(|e| e.at_stage(FailureStage::ImageGeneration))?;
                    self.checkpoints.record_image_task(id, &task_id).await?;
                    return Ok(Flow::ImagesPending(task_id));
                }
            }
        };

        run.stage(Step::Match).await;
        let category = match item.category_id {
            Some(category_id) => Some((category_id, None)),
            None => self.match_category(&item, &seo, run).await,
        };
        let authors = bounded(
            "author lookup",
            self.options.timeouts.matching,
            self.stages.authors.list_authors(),
        )
        .await?;
        let author = pick_author(&authors, category.as_ref().map(|(id, _)| *id))
            .ok_or_else(|| {
                Error::PreconditionFailed("no author available for attribution".to_string())
                    .at_stage(FailureStage::RecipeGeneration)
            })?
            .clone();
        run.note(format!("author: {}", author.name));

        run.stage(Step::Generate).await;
        let images = item
            .images
            .complete_urls()
            .ok_or_else(|| Error::Verification(format!("images missing on {id}")))?;
        let request = ContentRequest {
            title: seo.title.clone(),
            description: seo.description.clone(),
            keyword: seo.keyword.clone(),
            category: category
                .as_ref()
                .and_then(|(_, name)| name.clone())
                .or_else(|| seo.category.clone()),
            images,
            author_id: author.id,
            author_name: author.name.clone(),
        };
        let published = async {
            let content = bounded(
                "content generation",
                self.options.timeouts.content,
                self.stages.generator.generate(&request),
            )
            .await?;
            content.validate(&self.options.quality)?;
            bounded(
                "content publish",
                self.options.timeouts.content,
                self.stages.publisher.publish(&item, &request, &content),
            )
            .await
        }
        .await
        .map_err(|e| e.at_stage(FailureStage::RecipeGeneration))?;

        let patch = WorkItemPatch {
            status: Some(Status::Completed),
            content_id: Some(published.content_id),
            published_url: Some(published.url.clone()),
            category_id: category.map(|(id, _)| id),
            author_id: Some(author.id),
            ..WorkItemPatch::default()
        };
        let item = self
            .checkpoints
            .save_checkpoint(id, Checkpoint::RecipeComplete, patch)
            .await?;
        run.note(format!("published content {}", published.content_id));

        self.run_tail(&item, &published.url, false, run).await;

        Ok(Flow::Published {
            content_id: published.content_id,
            url: published.url,
        })
    }

    // -----------------------------------------------------------------------
    // Images
    // -----------------------------------------------------------------------

    /// Sync provider: one slot at a time, each with its own retry budget.
    async fn generate_images(
        &self,
        item: &WorkItem,
        seo: &SeoFields,
        run: &mut RunLog<'_>,
    ) -> Result<WorkItem> {
        let ImageProvider::Sync(provider) = &self.stages.images else {
            return Err(Error::Other("sync image generation without a sync provider".to_string()));
        };
        let policy = self.options.image_retry;

        for slot in ImageSlot::ALL {
            if self.reuse_slot(item, slot).await {
                run.note(format!("image {} ({slot}) already verified", slot.number()));
                continue;
            }

            let request = ImageRequest {
                prompt: image_prompt(seo, slot),
                reference_image: item.lead.image_url.clone(),
                slot,
            };
            let mut attempt = 1;
            loop {
                let outcome = async {
                    let bytes = bounded(
                        "image generation",
                        self.options.timeouts.image,
                        provider.generate(&request),
                    )
                    .await?;
                    self.accept_image(item.id, slot, &bytes).await
                }
                .await;

                match outcome {
                    Ok(url) => {
                        metrics::image_attempts().add(1, &[KeyValue::new("result", "verified")]);
                        run.note(format!("image {} ({slot}) verified: {url}", slot.number()));
                        break;
                    }
                    Err(e) => {
                        metrics::image_attempts().add(1, &[KeyValue::new("result", "failed")]);
                        warn!(id = %item.id, %slot, attempt, "image attempt failed: {e}");
                        if attempt >= policy.max_attempts {
                            return Err(Error::Other(format!(
                                "image {} ({slot}) failed after {attempt} attempts: {e}",
                                slot.number()
                            )));
                        }
                        tokio::time::sleep(policy.backoff(attempt)).await;
                        attempt += 1;
                    }
                }
            }
        }

        self.finish_images(item.id).await
    }

    /// A slot recorded by an earlier run is kept only if it still verifies.
    async fn reuse_slot(&self, item: &WorkItem, slot: ImageSlot) -> bool {
        let Some(url) = item.images.get(slot) else {
            return false;
        };
        match verify_artifact(self.stages.artifacts.as_ref(), url).await {
            Ok(_) => true,
            Err(e) => {
                warn!(id = %item.id, %slot, "recorded image no longer verifies, regenerating: {e}");
                false
            }
        }
    }

    async fn recorded_images_verify(&self, item: &WorkItem) -> bool {
        for slot in ImageSlot::ALL {
            if !self.reuse_slot(item, slot).await {
                return false;
            }
        }
        true
    }

    /// Write, read back, record. A zero-byte or unreadable file is an error.
    async fn accept_image(&self, id: WorkId, slot: ImageSlot, bytes: &[u8]) -> Result<String> {
        let key = image_key(id, slot, bytes);
        let url = self.stages.artifacts.put(&key, bytes).await?;
        let size = verify_artifact(self.stages.artifacts.as_ref(), &url).await?;
        self.checkpoints.record_image(id, slot, &url).await?;
        tracing::debug!(id = %id, %slot, size, "image accepted");
        Ok(url)
    }

    /// The one "images ready" transition, shared by both provider modes.
    async fn finish_images(&self, id: WorkId) -> Result<WorkItem> {
        self.checkpoints
            .save_checkpoint(
                id,
                Checkpoint::ImagesComplete,
                WorkItemPatch::status(Status::ReadyForGeneration),
            )
            .await
    }

    // -----------------------------------------------------------------------
    // Matching
    // -----------------------------------------------------------------------

    /// Best-effort: a matcher error or weak match means no category.
    async fn match_category(
        &self,
        item: &WorkItem,
        seo: &SeoFields,
        run: &mut RunLog<'_>,
    ) -> Option<(Uuid, Option<String>)> {
        let query = CategoryQuery {
            title: seo.title.clone(),
            description: seo.description.clone(),
            keyword: seo.keyword.clone(),
            category: seo.category.clone(),
        };
        match bounded(
            "category matching",
            self.options.timeouts.matching,
            self.stages.categories.match_category(&query),
        )
        .await
        {
            Ok(Some(m)) => {
                run.note(format!(
                    "category: {} (confidence {:.2})",
                    m.category_name, m.confidence
                ));
                Some((m.category_id, Some(m.category_name)))
            }
            Ok(None) => {
                run.note("no category matched");
                None
            }
            Err(e) => {
                warn!(id = %item.id, "category matching failed, continuing without: {e}");
                run.note("category matching unavailable");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Tail stages
    // -----------------------------------------------------------------------

    /// INDEX then DISTRIBUTE. Failures are logged and swallowed. Without
    /// `force`, a stage whose checkpoint is already recorded is skipped.
    async fn run_tail(&self, item: &WorkItem, url: &str, force: bool, run: &mut RunLog<'_>) {
        run.stage(Step::Index).await;
        match &self.stages.indexer {
            None => run.note("indexing not configured"),
            Some(_) if !force && item.checkpoint >= Checkpoint::GoogleIndexed => {
                skipped(run, Step::Index)
            }
            Some(indexer) => {
                let submitted =
                    bounded("indexing", self.options.timeouts.indexing, indexer.submit(url)).await;
                match submitted {
                    Ok(response) if response.success => {
                        run.note("indexing accepted");
                        self.tail_checkpoint(item.id, Checkpoint::GoogleIndexed).await;
                    }
                    Ok(response) => tail_failed(
                        run,
                        item.id,
                        FailureStage::GoogleIndexing,
                        response.message.as_deref().unwrap_or("rejected without message"),
                    ),
                    Err(e) => tail_failed(run, item.id, FailureStage::GoogleIndexing, &e.to_string()),
                }
            }
        }

        run.stage(Step::Distribute).await;
        match &self.stages.distributor {
            None => run.note("distribution not configured"),
            Some(_) if !force && item.checkpoint >= Checkpoint::PinterestSent => {
                skipped(run, Step::Distribute)
            }
            Some(distributor) => {
                let payload = self.distribution_payload(item, url);
                let sent = bounded(
                    "distribution",
                    self.options.timeouts.distribution,
                    distributor.distribute(&payload),
                )
                .await;
                match sent {
                    Ok(()) => {
                        run.note("distribution sent");
                        self.tail_checkpoint(item.id, Checkpoint::PinterestSent).await;
                    }
                    Err(e) => tail_failed(
                        run,
                        item.id,
                        FailureStage::PinterestIntegration,
                        &e.to_string(),
                    ),
                }
            }
        }
    }

    async fn tail_checkpoint(&self, id: WorkId, checkpoint: Checkpoint) {
        if let Err(e) = self
            .checkpoints
            .save_checkpoint(id, checkpoint, WorkItemPatch::default())
            .await
        {
            warn!(id = %id, %checkpoint, "could not record tail checkpoint: {e}");
        }
    }

    fn distribution_payload(&self, item: &WorkItem, url: &str) -> DistributionPayload {
        let (title, description, keyword, category) = match &item.seo {
            Some(seo) => (
                seo.title.clone(),
                seo.description.clone(),
                Some(seo.keyword.clone()),
                seo.category.clone(),
            ),
            None => (
                item.lead.title.clone(),
                item.lead.description.clone().unwrap_or_default(),
                None,
                None,
            ),
        };
        DistributionPayload {
            title,
            description,
            image_url: item
                .images
                .get(ImageSlot::Featured)
                .unwrap_or_default()
                .to_string(),
            link: url.to_string(),
            board_id: self.options.board_id.clone(),
            tags: keyword.into_iter().chain(category).collect(),
        }
    }

    // -----------------------------------------------------------------------
    // Failure
    // -----------------------------------------------------------------------

    async fn fail(&self, id: WorkId, err: RunError, mut run: RunLog<'_>) -> PipelineResult {
        let (e, record) = match err {
            RunError::Rejected(e) => (e, false),
            RunError::Failed(e) => (e, true),
        };
        let stage = e.failure_stage();
        let message = e.to_string();
        run.note(format!("failed at {stage}: {message}"));

        if record {
            if let Err(mark_err) = self.checkpoints.mark_failed(id, stage, &message).await {
                error!(id = %id, "failed to record failure: {mark_err}");
            }
        } else {
            warn!(id = %id, %stage, "run rejected: {message}");
        }

        PipelineResult::Failed {
            stage,
            error: message,
            logs: run.lines,
        }
    }
}

/// Rejected runs are refused before any write; failed runs are recorded.
enum RunError {
    Rejected(Error),
    Failed(Error),
}

/// Progress reporting plus the human-readable lines returned to the caller.
struct RunLog<'a> {
    sink: &'a dyn ProgressSink,
    span: Span,
    lines: Vec<String>,
}

impl<'a> RunLog<'a> {
    fn new(sink: &'a dyn ProgressSink, span: Span) -> Self {
        Self {
            sink,
            span,
            lines: Vec::new(),
        }
    }

    async fn stage(&mut self, step: Step) {
        record_stage(&self.span, step.name(), step.number(), TOTAL_STEPS);
        self.lines
            .push(format!("[{}/{TOTAL_STEPS}] {}", step.number(), step.message()));
        self.sink
            .report(Progress {
                step: step.number(),
                total: TOTAL_STEPS,
                message: step.message().to_string(),
            })
            .await;
    }

    fn note(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!("{line}");
        self.lines.push(line);
    }
}

fn skipped(run: &mut RunLog<'_>, step: Step) {
    metrics::stages_skipped().add(1, &[KeyValue::new("stage", step.name())]);
    run.note(format!("{} already complete, skipped", step.name()));
}

fn tail_failed(run: &mut RunLog<'_>, id: WorkId, stage: FailureStage, message: &str) {
    metrics::tail_failures().add(1, &[KeyValue::new("stage", stage.as_str())]);
    warn!(id = %id, %stage, "non-fatal stage failed: {message}");
    run.note(format!("{stage} failed (ignored): {message}"));
}

/// Await an external call under its stage timeout.
async fn bounded<T>(
    operation: &'static str,
    seconds: u64,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(Duration::from_secs(seconds), call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { operation, seconds }),
    }
}
