//! Span helpers for pipeline runs and job runner invocations.

use tracing::Span;
use uuid::Uuid;

/// Span for one orchestrator run over one work item.
///
/// `pipeline.stage` starts empty and is updated by [`record_stage`].
pub fn start_pipeline_span(work_id: &Uuid) -> Span {
    tracing::info_span!(
        "pipeline.execute",
        "work.id" = %work_id,
        "pipeline.stage" = tracing::field::Empty,
    )
}

/// Mark entry into a stage, as a field update plus an event.
pub fn record_stage(span: &Span, stage: &str, step: u32, total: u32) {
    span.record("pipeline.stage", stage);
    span.in_scope(|| {
        tracing::info!(stage, step, total, "stage_started");
    });
}

/// Span for one job runner invocation.
pub fn start_runner_span(schedule_id: Option<&Uuid>) -> Span {
    match schedule_id {
        Some(id) => tracing::info_span!("runner.invoke", "schedule.id" = %id),
        None => tracing::info_span!("runner.invoke", "schedule.id" = "manual"),
    }
}
