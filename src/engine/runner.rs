//! Job runner: one queue trigger, at most one pipeline execution.
//!
//! Invocations are serialized by an async mutex and paced by a `governor`
//! limiter, so a queue backlog cannot fan out into parallel or bursty
//! external spend.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use opentelemetry::KeyValue;
use serde::Serialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{Instrument, info, warn};
use uuid::Uuid;

use super::pipeline::{Orchestrator, PipelineResult, ProgressSink};
use crate::config::settings::RunnerSettings;
use crate::error::{Error, Result};
use crate::model::execution::{ExecutionEntry, ExecutionFinish, ExecutionStatus, Progress};
use crate::model::work::{FailureStage, Status, WorkId};
use crate::store::{ExecutionStore, ScheduleStore, WorkStore};
use crate::telemetry::metrics;
use crate::telemetry::pipeline::start_runner_span;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// What happened to the item a run picked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub item_id: WorkId,
    pub title: String,
    pub execution_id: Uuid,
    pub content_id: Option<Uuid>,
    pub url: Option<String>,
    /// Set when images were handed to the async provider.
    pub image_task_id: Option<String>,
    pub error: Option<String>,
    pub stage: Option<FailureStage>,
}

/// Result of one invocation. Empty when nothing was eligible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub processed: u32,
    pub failed: u32,
    pub recipes: Vec<RunRecord>,
}

pub struct JobRunner {
    work: Arc<dyn WorkStore>,
    executions: Arc<dyn ExecutionStore>,
    schedules: Arc<dyn ScheduleStore>,
    orchestrator: Arc<Orchestrator>,
    turn: Mutex<()>,
    limiter: DirectRateLimiter,
}

impl JobRunner {
    pub fn new(
        work: Arc<dyn WorkStore>,
        executions: Arc<dyn ExecutionStore>,
        schedules: Arc<dyn ScheduleStore>,
        orchestrator: Arc<Orchestrator>,
        settings: &RunnerSettings,
    ) -> Result<Self> {
        Ok(Self {
            work,
            executions,
            schedules,
            orchestrator,
            turn: Mutex::new(()),
            limiter: RateLimiter::direct(run_quota(settings)?),
        })
    }

    /// Process the single next eligible work item.
    ///
    /// Store errors before the pipeline starts are returned; everything the
    /// pipeline does is reported in the summary.
    pub async fn invoke(&self, schedule_id: Option<Uuid>) -> Result<RunSummary> {
        let _turn = self.turn.lock().await;
        self.limiter.until_ready().await;

        let span = start_runner_span(schedule_id.as_ref());
        async {
            if let Some(schedule_id) = schedule_id {
                self.touch_schedule(schedule_id).await;
            }

            let Some(item) = self
                .work
                .find_eligible(&Status::ELIGIBLE, 1)
                .await?
                .into_iter()
                .next()
            else {
                info!("no eligible work items");
                metrics::runner_invocations().add(1, &[KeyValue::new("outcome", "empty")]);
                return Ok(RunSummary::default());
            };

            info!(id = %item.id, priority = item.priority, title = %item.lead.title, "work item selected");
            let log = self.executions.create_execution(schedule_id, item.id).await?;
            let sink = ExecutionLogSink {
                executions: Arc::clone(&self.executions),
                execution_id: log.id,
            };

            let started = Instant::now();
            let result = self.orchestrator.execute_pipeline(item.id, &sink).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            if let Err(e) = self
                .executions
                .finish_execution(log.id, finish_for(&result, duration_ms))
                .await
            {
                warn!(execution_id = %log.id, "could not finalize execution log: {e}");
            }

            let mut record = RunRecord {
                item_id: item.id,
                title: item.lead.title.clone(),
                execution_id: log.id,
                content_id: None,
                url: None,
                image_task_id: None,
                error: None,
                stage: None,
            };
            let mut summary = RunSummary::default();
            match result {
                PipelineResult::Completed { content_id, url, .. } => {
                    record.content_id = Some(content_id);
                    record.url = Some(url);
                    summary.processed = 1;
                }
                PipelineResult::ImagesPending { task_id, .. } => {
                    record.image_task_id = Some(task_id);
                    summary.processed = 1;
                }
                PipelineResult::Failed { stage, error, .. } => {
                    record.error = Some(error);
                    record.stage = Some(stage);
                    summary.failed = 1;
                }
            }
            summary.recipes.push(record);

            let outcome = if summary.failed > 0 { "failed" } else { "processed" };
            metrics::runner_invocations().add(1, &[KeyValue::new("outcome", outcome)]);
            info!(
                processed = summary.processed,
                failed = summary.failed,
                duration_ms,
                "runner invocation finished"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    /// Bump run statistics. A schedule deleted mid-flight does not stop the run.
    async fn touch_schedule(&self, schedule_id: Uuid) {
        match self.schedules.record_schedule_run(schedule_id).await {
            Ok(Some(schedule)) => {
                info!(schedule = %schedule.name, run_count = schedule.run_count, "schedule run recorded")
            }
            Ok(None) => warn!(%schedule_id, "schedule no longer exists, running anyway"),
            Err(e) => warn!(%schedule_id, "could not record schedule run: {e}"),
        }
    }
}

/// `max_runs_per_window` evenly spaced over the window, no burst.
fn run_quota(settings: &RunnerSettings) -> Result<Quota> {
    let runs = NonZeroU32::new(settings.max_runs_per_window)
        .ok_or_else(|| Error::Config("runner.max_runs_per_window must be at least 1".to_string()))?;
    let period = settings.window() / runs.get();
    Quota::with_period(period)
        .ok_or_else(|| Error::Config("runner.window_secs must be at least 1".to_string()))
}

fn finish_for(result: &PipelineResult, duration_ms: u64) -> ExecutionFinish {
    match result {
        PipelineResult::Completed { content_id, url, .. } => ExecutionFinish {
            status: ExecutionStatus::Success,
            duration_ms,
            content_id: Some(*content_id),
            published_url: Some(url.clone()),
            error: None,
            failed_stage: None,
        },
        PipelineResult::ImagesPending { .. } => ExecutionFinish {
            status: ExecutionStatus::Success,
            duration_ms,
            content_id: None,
            published_url: None,
            error: None,
            failed_stage: None,
        },
        PipelineResult::Failed { stage, error, .. } => ExecutionFinish {
            status: ExecutionStatus::Failed,
            duration_ms,
            content_id: None,
            published_url: None,
            error: Some(error.clone()),
            failed_stage: Some(*stage),
        },
    }
}

/// Appends each progress report to the run's execution log as it happens.
pub struct ExecutionLogSink {
    executions: Arc<dyn ExecutionStore>,
    execution_id: Uuid,
}

impl ExecutionLogSink {
    pub fn new(executions: Arc<dyn ExecutionStore>, execution_id: Uuid) -> Self {
        Self {
            executions,
            execution_id,
        }
    }
}

#[async_trait]
impl ProgressSink for ExecutionLogSink {
    async fn report(&self, progress: Progress) {
        if let Err(e) = self
            .executions
            .append_execution_entry(self.execution_id, ExecutionEntry::from(progress))
            .await
        {
            warn!(execution_id = %self.execution_id, "could not append progress: {e}");
        }
    }
}
