//! Pipeline engine: checkpoints, the orchestrator, and the runner that
//! drives it from the queue.

pub mod checkpoint;
pub mod control;
pub mod pipeline;
pub mod runner;
pub mod scheduler;

pub use checkpoint::{CheckpointManager, CheckpointStatus, RetriableEntry};
pub use control::{ControlConfig, ControlPlane};
pub use pipeline::{
    NoProgress, Orchestrator, PipelineOptions, PipelineResult, ProgressSink, Stages, Step,
    TOTAL_STEPS,
};
pub use runner::{ExecutionLogSink, JobRunner, RunRecord, RunSummary};
pub use scheduler::{CronScheduler, RunQueue};
