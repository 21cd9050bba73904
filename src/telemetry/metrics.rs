//! Metric instrument factories.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"leadpress"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("leadpress")
}

/// Counter: orchestrator runs.
/// Labels: `result` ("completed" | "images_pending" | "failed").
pub fn pipeline_runs() -> Counter<u64> {
    meter()
        .u64_counter("leadpress.pipeline.runs")
        .with_description("Number of pipeline executions by result")
        .build()
}

/// Counter: failures recorded against a work item.
/// Labels: `stage` (failure stage tag).
pub fn stage_failures() -> Counter<u64> {
    meter()
        .u64_counter("leadpress.pipeline.stage_failures")
        .with_description("Number of pipeline failures by stage")
        .build()
}

/// Counter: non-fatal tail stage failures that were swallowed.
/// Labels: `stage`.
pub fn tail_failures() -> Counter<u64> {
    meter()
        .u64_counter("leadpress.pipeline.tail_failures")
        .with_description("Number of swallowed indexing/distribution failures")
        .build()
}

/// Counter: checkpoints persisted.
/// Labels: `checkpoint`.
pub fn checkpoints_saved() -> Counter<u64> {
    meter()
        .u64_counter("leadpress.checkpoint.saved")
        .with_description("Number of checkpoints persisted")
        .build()
}

/// Counter: stages skipped because their checkpoint was already satisfied.
/// Labels: `stage`.
pub fn stages_skipped() -> Counter<u64> {
    meter()
        .u64_counter("leadpress.pipeline.stages_skipped")
        .with_description("Number of stages skipped on resume")
        .build()
}

/// Counter: individual image generation attempts.
/// Labels: `result` ("verified" | "failed").
pub fn image_attempts() -> Counter<u64> {
    meter()
        .u64_counter("leadpress.images.attempts")
        .with_description("Number of image generation attempts")
        .build()
}

/// Counter: job runner invocations.
/// Labels: `outcome` ("processed" | "failed" | "empty").
pub fn runner_invocations() -> Counter<u64> {
    meter()
        .u64_counter("leadpress.runner.invocations")
        .with_description("Number of job runner invocations")
        .build()
}

/// Counter: pgmq operations.
/// Labels: `queue`, `op` ("sent" | "read" | "archived" | "deleted"),
/// and `origin` ("schedule" | "manual") on pipeline run requests.
pub fn queue_messages() -> Counter<u64> {
    meter()
        .u64_counter("leadpress.queue.messages")
        .with_description("Number of queue operations by queue and kind")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("leadpress.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
