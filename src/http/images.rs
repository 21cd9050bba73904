//! Image generation over HTTP, in both provider flavours.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;

use super::ensure_success;
use crate::config::secrets::with_bearer;
use crate::error::{Error, Result};
use crate::stage::{AsyncImageProvider, ImageRequest, ImageTaskRequest, SyncImageProvider};

/// Synchronous provider: one POST per image, bytes in the response body.
pub struct HttpImageProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl HttpImageProvider {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl SyncImageProvider for HttpImageProvider {
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>> {
        let body = serde_json::json!({
            "prompt": request.prompt,
            "reference_image": request.reference_image,
            "slot": request.slot.number(),
        });
        let response = with_bearer(self.http.post(&self.endpoint), self.api_key.as_ref())
            .json(&body)
            .send()
            .await?;
        let response = ensure_success("image provider", response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Asynchronous provider: submit a task, images arrive through a callback.
pub struct HttpTaskImageProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    callback_url: Option<String>,
}

impl HttpTaskImageProvider {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        callback_url: Option<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            api_key,
            callback_url,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskReply {
    #[serde(alias = "task_id")]
    task_id: String,
}

#[async_trait]
impl AsyncImageProvider for HttpTaskImageProvider {
    async fn submit(&self, request: &ImageTaskRequest) -> Result<String> {
        let body = serde_json::json!({
            "prompt": request.prompt,
            "reference_image": request.reference_image,
            "count": 4,
            "callback_url": self.callback_url,
        });
        let response = with_bearer(self.http.post(&self.endpoint), self.api_key.as_ref())
            .json(&body)
            .send()
            .await?;
        let reply: TaskReply = ensure_success("image task submit", response)
            .await?
            .json()
            .await?;
        if reply.task_id.trim().is_empty() {
            return Err(Error::Other("image task submit returned an empty task id".to_string()));
        }
        Ok(reply.task_id)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        let response = ensure_success("image download", response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
