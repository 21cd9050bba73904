//! Stage executor contracts.
//!
//! Each trait wraps one external service. The orchestrator owns retry,
//! timeout and checkpoint handling; adapters only make the call and report
//! what came back.

pub mod images;
pub mod matching;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::model::content::GeneratedContent;
use crate::model::work::{SeoFields, WorkItem};

pub use images::{
    ArtifactStore, AsyncImageProvider, ImageProvider, ImageRequest, ImageTaskRequest,
    LocalArtifactStore, RetryPolicy, SyncImageProvider,
};
pub use matching::{Author, AuthorDirectory, CategoryMatch, CategoryMatcher, CategoryQuery};

/// Extracts keyword, title, description and category from a lead.
#[async_trait]
pub trait SeoExtractor: Send + Sync {
    async fn extract(&self, item: &WorkItem) -> Result<SeoFields>;
}

/// Everything the content generator is told about an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRequest {
    pub title: String,
    pub description: String,
    pub keyword: String,
    pub category: Option<String>,
    pub images: [String; 4],
    pub author_id: Uuid,
    pub author_name: String,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &ContentRequest) -> Result<GeneratedContent>;
}

/// Where generated content ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedContent {
    pub content_id: Uuid,
    pub url: String,
}

/// Persists validated content and makes it reachable.
#[async_trait]
pub trait ContentPublisher: Send + Sync {
    async fn publish(
        &self,
        item: &WorkItem,
        request: &ContentRequest,
        content: &GeneratedContent,
    ) -> Result<PublishedContent>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResponse {
    pub success: bool,
    pub message: Option<String>,
}

/// Search-engine indexing submission. Failures never fail a run.
#[async_trait]
pub trait IndexSubmitter: Send + Sync {
    async fn submit(&self, url: &str) -> Result<IndexResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionPayload {
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub link: String,
    pub board_id: Option<String>,
    pub tags: Vec<String>,
}

/// Social distribution webhook. Failures never fail a run.
#[async_trait]
pub trait Distributor: Send + Sync {
    async fn distribute(&self, payload: &DistributionPayload) -> Result<()>;
}
