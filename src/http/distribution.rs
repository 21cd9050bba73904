//! Distribution webhook (e.g. a Pinterest pin relay).

use async_trait::async_trait;

use super::ensure_success;
use crate::error::Result;
use crate::stage::{DistributionPayload, Distributor};

pub struct WebhookDistributor {
    http: reqwest::Client,
    webhook_url: String,
}

impl WebhookDistributor {
    pub fn new(http: reqwest::Client, webhook_url: impl Into<String>) -> Self {
        Self {
            http,
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl Distributor for WebhookDistributor {
    async fn distribute(&self, payload: &DistributionPayload) -> Result<()> {
        let response = self.http.post(&self.webhook_url).json(payload).send().await?;
        ensure_success("distribution webhook", response).await?;
        Ok(())
    }
}
