//! Search indexing submission (Google Indexing API request shape).

use async_trait::async_trait;
use secrecy::SecretString;

use crate::config::secrets::with_bearer;
use crate::error::Result;
use crate::stage::{IndexResponse, IndexSubmitter};

pub struct IndexingClient {
    http: reqwest::Client,
    endpoint: String,
    token: Option<SecretString>,
}

impl IndexingClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, token: Option<SecretString>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            token,
        }
    }
}

#[async_trait]
impl IndexSubmitter for IndexingClient {
    async fn submit(&self, url: &str) -> Result<IndexResponse> {
        let body = serde_json::json!({ "url": url, "type": "URL_UPDATED" });
        let response = with_bearer(self.http.post(&self.endpoint), self.token.as_ref())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        // A rejected submission is an answer, not a transport failure.
        Ok(IndexResponse {
            success: status.is_success(),
            message: if status.is_success() {
                None
            } else {
                Some(format!("indexing returned {status}: {text}"))
            },
        })
    }
}
