//! HTTP adapters for image generation, indexing and distribution.

pub mod distribution;
pub mod images;
pub mod indexing;

use crate::error::{Error, Result};

pub use distribution::WebhookDistributor;
pub use images::{HttpImageProvider, HttpTaskImageProvider};
pub use indexing::IndexingClient;

/// Shared client. Per-call timeouts are applied by the orchestrator.
pub fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("leadpress/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Config(format!("cannot build http client: {e}")))
}

/// Turn a non-2xx response into an error carrying the body text.
pub(crate) async fn ensure_success(
    what: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Other(format!(
        "{what} returned {status}: {}",
        body.chars().take(300).collect::<String>()
    )))
}
