//! Error types for leadpress.

use thiserror::Error;

use crate::model::work::{FailureStage, WorkId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("work item not found: {0}")]
    NotFound(String),

    #[error("work item {0} is not retriable")]
    NotRetriable(WorkId),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("{stage} failed: {cause}")]
    Stage {
        stage: FailureStage,
        #[source]
        cause: Box<Error>,
    },

    #[error("content quality check failed: {0}")]
    ContentQuality(String),

    #[error("artifact verification failed: {0}")]
    Verification(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Tag an error with the pipeline stage it came from.
    ///
    /// Already-tagged errors keep their original stage.
    pub fn at_stage(self, stage: FailureStage) -> Self {
        match self {
            tagged @ Error::Stage { .. } => tagged,
            cause => Error::Stage {
                stage,
                cause: Box::new(cause),
            },
        }
    }

    /// The stage this failure belongs to.
    ///
    /// Typed stage tags win; untagged errors fall back to message
    /// classification.
    pub fn failure_stage(&self) -> FailureStage {
        match self {
            Error::Stage { stage, .. } => *stage,
            Error::ContentQuality(_) => FailureStage::RecipeGeneration,
            Error::Verification(_) => FailureStage::ImageGeneration,
            other => FailureStage::classify(&other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
