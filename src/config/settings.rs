//! Pipeline tuning loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is valid.
//!
//! ```toml
//! [images]
//! max_attempts = 3
//! initial_backoff_secs = 5
//! max_backoff_secs = 30
//!
//! [timeouts]
//! content = 240
//!
//! [runner]
//! max_runs_per_window = 10
//! window_secs = 60
//! ```

use crate::error::{Error, Result};
use crate::model::content::QualityThresholds;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub images: ImageSettings,
    pub timeouts: TimeoutSettings,
    pub quality: QualityThresholds,
    pub runner: RunnerSettings,
}

impl PipelineSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read pipeline config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("bad pipeline config {}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Per-image retry budget.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub max_attempts: u32,
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_secs: 5,
            max_backoff_secs: 30,
        }
    }
}

/// Timeout for each external call, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub seo: u64,
    pub image: u64,
    pub matching: u64,
    pub content: u64,
    pub indexing: u64,
    pub distribution: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            seo: 60,
            image: 120,
            matching: 30,
            content: 180,
            indexing: 30,
            distribution: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub max_runs_per_window: u32,
    pub window_secs: u64,
    /// pgmq visibility timeout for a claimed trigger message.
    pub visibility_timeout_secs: i32,
    pub poll_interval_secs: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            max_runs_per_window: 10,
            window_secs: 60,
            visibility_timeout_secs: 300,
            poll_interval_secs: 5,
        }
    }
}

impl RunnerSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
