//! Typed configuration.
//!
//! Connection details and credentials come from environment variables and
//! load once at startup, failing fast if required vars are missing.
//! Sensitive values are wrapped in secrecy::SecretString to prevent log leaks.
//! Pipeline tuning (retry budgets, timeouts, quality thresholds, rate limits)
//! lives in an optional TOML file, see [`settings`].

pub mod secrets;
pub mod settings;

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::path::PathBuf;

pub use settings::PipelineSettings;

/// How images are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageProviderMode {
    /// Call, receive bytes, persist and verify inside the IMAGES stage.
    Sync,
    /// Submit a task; a later callback delivers the images.
    Async,
}

impl std::str::FromStr for ImageProviderMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sync" => Ok(ImageProviderMode::Sync),
            "async" => Ok(ImageProviderMode::Async),
            other => Err(Error::Config(format!(
                "IMAGE_PROVIDER must be 'sync' or 'async', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub anthropic_api_key: SecretString,
    pub llm_model: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,

    /// Where verified artifacts are written, and the URL prefix they are served under.
    pub artifact_dir: PathBuf,
    pub artifact_base_url: String,
    /// Prefix for published article URLs.
    pub site_base_url: String,

    pub image_provider: ImageProviderMode,
    pub image_provider_url: Option<String>,
    pub image_provider_key: Option<SecretString>,
    pub image_callback_url: Option<String>,

    pub indexing_endpoint: Option<String>,
    pub indexing_token: Option<SecretString>,

    pub distribution_webhook_url: Option<String>,
    pub distribution_board_id: Option<String>,

    pub pipeline_config: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        let image_provider = match optional_var("IMAGE_PROVIDER") {
            Some(mode) => mode.parse()?,
            None => ImageProviderMode::Sync,
        };

        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            anthropic_api_key: SecretString::from(required_var("ANTHROPIC_API_KEY")?),
            llm_model: optional_var("LLM_MODEL")
                .unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            artifact_dir: optional_var("ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("artifacts")),
            artifact_base_url: optional_var("ARTIFACT_BASE_URL")
                .unwrap_or_else(|| "/artifacts".to_string()),
            site_base_url: optional_var("SITE_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            image_provider,
            image_provider_url: optional_var("IMAGE_PROVIDER_URL"),
            image_provider_key: optional_var("IMAGE_PROVIDER_KEY").map(SecretString::from),
            image_callback_url: optional_var("IMAGE_CALLBACK_URL"),
            indexing_endpoint: optional_var("INDEXING_ENDPOINT"),
            indexing_token: optional_var("INDEXING_TOKEN").map(SecretString::from),
            distribution_webhook_url: optional_var("DISTRIBUTION_WEBHOOK_URL"),
            distribution_board_id: optional_var("DISTRIBUTION_BOARD_ID"),
            pipeline_config: optional_var("PIPELINE_CONFIG").map(PathBuf::from),
        })
    }

    /// Load pipeline settings from `PIPELINE_CONFIG`, or defaults when unset.
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        match &self.pipeline_config {
            Some(path) => PipelineSettings::load(path),
            None => Ok(PipelineSettings::default()),
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

/// Unset and empty are treated the same.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
