//! Work items: one ingested lead plus everything generated for it so far.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A lead progressing through the pipeline toward a published article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkId,

    /// What was scraped. Never changed by the pipeline.
    pub lead: Lead,

    /// Higher = picked first by the job runner.
    pub priority: i32,

    pub status: Status,

    /// Highest stage whose artifacts are durably confirmed.
    pub checkpoint: Checkpoint,

    /// Present only when keyword, title and description are all stored.
    pub seo: Option<SeoFields>,

    pub images: ImageSet,

    /// Handle of an outstanding asynchronous image task.
    pub image_task_id: Option<String>,

    pub category_id: Option<Uuid>,
    pub author_id: Option<Uuid>,

    /// Final generated content. Its presence means generation is done.
    pub content_id: Option<Uuid>,
    pub published_url: Option<String>,

    pub retry: RetryInfo,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn has_seo(&self) -> bool {
        self.seo.as_ref().is_some_and(SeoFields::is_complete)
    }

    pub fn has_images(&self) -> bool {
        self.images.is_complete()
    }

    pub fn has_recipe(&self) -> bool {
        self.content_id.is_some()
    }
}

/// Newtype for work item IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkId(pub Uuid);

impl WorkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

/// The scraped source a work item was created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub source_url: String,
    pub title: String,
    pub description: Option<String>,
    /// Reference image handed to the image provider.
    pub image_url: Option<String>,
}

/// Search-facing metadata extracted in the SEO stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoFields {
    pub keyword: String,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
}

impl SeoFields {
    pub fn is_complete(&self) -> bool {
        !self.keyword.trim().is_empty()
            && !self.title.trim().is_empty()
            && !self.description.trim().is_empty()
    }
}

/// Failure bookkeeping kept alongside the checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryInfo {
    pub failed_step: Option<FailureStage>,
    pub failed_at: Option<DateTime<Utc>>,
    pub generation_error: Option<String>,
    pub generation_attempts: u32,
    pub can_retry: bool,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    SeoProcessed,
    /// SEO applied by the alternate ingestion path. Treated like `SeoProcessed`.
    SeoProcessedVariant,
    ReadyForGeneration,
    Generating,
    Completed,
    Failed,
}

impl Status {
    /// Statuses the job runner may pick up.
    pub const ELIGIBLE: [Status; 4] = [
        Status::Pending,
        Status::SeoProcessed,
        Status::SeoProcessedVariant,
        Status::ReadyForGeneration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::SeoProcessed => "SEO_PROCESSED",
            Status::SeoProcessedVariant => "SEO_PROCESSED_VARIANT",
            Status::ReadyForGeneration => "READY_FOR_GENERATION",
            Status::Generating => "GENERATING",
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
        }
    }

    pub fn is_eligible(self) -> bool {
        Self::ELIGIBLE.contains(&self)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Status::Pending),
            "SEO_PROCESSED" => Ok(Status::SeoProcessed),
            "SEO_PROCESSED_VARIANT" => Ok(Status::SeoProcessedVariant),
            "READY_FOR_GENERATION" => Ok(Status::ReadyForGeneration),
            "GENERATING" => Ok(Status::Generating),
            "COMPLETED" => Ok(Status::Completed),
            "FAILED" => Ok(Status::Failed),
            other => Err(Error::Other(format!("unknown status: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Highest pipeline stage whose artifacts are durably confirmed.
///
/// Ordered: a later variant always means more paid-for work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Checkpoint {
    Init,
    SeoComplete,
    ImagesComplete,
    RecipeComplete,
    GoogleIndexed,
    PinterestSent,
}

impl Checkpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Checkpoint::Init => "INIT",
            Checkpoint::SeoComplete => "SEO_COMPLETE",
            Checkpoint::ImagesComplete => "IMAGES_COMPLETE",
            Checkpoint::RecipeComplete => "RECIPE_COMPLETE",
            Checkpoint::GoogleIndexed => "GOOGLE_INDEXED",
            Checkpoint::PinterestSent => "PINTEREST_SENT",
        }
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Checkpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(Checkpoint::Init),
            "SEO_COMPLETE" => Ok(Checkpoint::SeoComplete),
            "IMAGES_COMPLETE" => Ok(Checkpoint::ImagesComplete),
            "RECIPE_COMPLETE" => Ok(Checkpoint::RecipeComplete),
            "GOOGLE_INDEXED" => Ok(Checkpoint::GoogleIndexed),
            "PINTEREST_SENT" => Ok(Checkpoint::PinterestSent),
            other => Err(Error::Other(format!("unknown checkpoint: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure stage
// ---------------------------------------------------------------------------

/// Stage tag recorded with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureStage {
    SeoGeneration,
    ImageGeneration,
    RecipeGeneration,
    GoogleIndexing,
    PinterestIntegration,
    Unknown,
}

/// Substring rules for untagged errors. Order matters: first match wins.
const CLASSIFICATION_RULES: &[(&[&str], FailureStage)] = &[
    (&["seo"], FailureStage::SeoGeneration),
    (&["image"], FailureStage::ImageGeneration),
    (&["recipe", "content"], FailureStage::RecipeGeneration),
    (&["index", "google"], FailureStage::GoogleIndexing),
    (&["pinterest", "distribut"], FailureStage::PinterestIntegration),
];

impl FailureStage {
    /// Guess the stage from an error message.
    pub fn classify(message: &str) -> FailureStage {
        let message = message.to_lowercase();
        CLASSIFICATION_RULES
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| message.contains(n)))
            .map(|(_, stage)| *stage)
            .unwrap_or(FailureStage::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureStage::SeoGeneration => "SEO_GENERATION",
            FailureStage::ImageGeneration => "IMAGE_GENERATION",
            FailureStage::RecipeGeneration => "RECIPE_GENERATION",
            FailureStage::GoogleIndexing => "GOOGLE_INDEXING",
            FailureStage::PinterestIntegration => "PINTEREST_INTEGRATION",
            FailureStage::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureStage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SEO_GENERATION" => Ok(FailureStage::SeoGeneration),
            "IMAGE_GENERATION" => Ok(FailureStage::ImageGeneration),
            "RECIPE_GENERATION" => Ok(FailureStage::RecipeGeneration),
            "GOOGLE_INDEXING" => Ok(FailureStage::GoogleIndexing),
            "PINTEREST_INTEGRATION" => Ok(FailureStage::PinterestIntegration),
            "UNKNOWN" => Ok(FailureStage::Unknown),
            other => Err(Error::Other(format!("unknown failure stage: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// The four images every article carries, generated in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSlot {
    Featured,
    Ingredients,
    Process,
    Serving,
}

impl ImageSlot {
    pub const ALL: [ImageSlot; 4] = [
        ImageSlot::Featured,
        ImageSlot::Ingredients,
        ImageSlot::Process,
        ImageSlot::Serving,
    ];

    /// 1-based slot number.
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn index(self) -> usize {
        match self {
            ImageSlot::Featured => 0,
            ImageSlot::Ingredients => 1,
            ImageSlot::Process => 2,
            ImageSlot::Serving => 3,
        }
    }

    /// What the image should show, appended to the prompt.
    pub fn subject(self) -> &'static str {
        match self {
            ImageSlot::Featured => "hero shot of the finished dish, styled for a recipe header",
            ImageSlot::Ingredients => "all raw ingredients laid out on a kitchen counter",
            ImageSlot::Process => "the dish mid-preparation, hands and cookware in frame",
            ImageSlot::Serving => "a single plated serving at the table, close up",
        }
    }
}

impl std::fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ImageSlot::Featured => "featured",
            ImageSlot::Ingredients => "ingredients",
            ImageSlot::Process => "process",
            ImageSlot::Serving => "serving",
        };
        write!(f, "{s}")
    }
}

/// Verified image URLs, one per slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSet {
    urls: [Option<String>; 4],
}

impl ImageSet {
    pub fn from_urls(urls: [Option<String>; 4]) -> Self {
        Self { urls }
    }

    pub fn get(&self, slot: ImageSlot) -> Option<&str> {
        self.urls[slot.index()].as_deref()
    }

    pub fn set(&mut self, slot: ImageSlot, url: impl Into<String>) {
        self.urls[slot.index()] = Some(url.into());
    }

    pub fn clear(&mut self) {
        self.urls = Default::default();
    }

    pub fn present_count(&self) -> usize {
        self.urls.iter().filter(|u| u.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.present_count() == ImageSlot::ALL.len()
    }

    /// All four URLs in slot order, or `None` while any is missing.
    pub fn complete_urls(&self) -> Option<[String; 4]> {
        let [a, b, c, d] = self.urls.clone();
        Some([a?, b?, c?, d?])
    }

    pub fn as_slice(&self) -> &[Option<String>; 4] {
        &self.urls
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a freshly ingested lead. Starts in PENDING / INIT.
#[derive(Debug, Clone)]
pub struct NewWorkItem {
    pub(crate) lead: Lead,
    pub(crate) priority: i32,
}

impl NewWorkItem {
    pub fn new(source_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            lead: Lead {
                source_url: source_url.into(),
                title: title.into(),
                description: None,
                image_url: None,
            },
            priority: 0,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.lead.description = Some(description.into());
        self
    }

    pub fn image_url(mut self, url: impl Into<String>) -> Self {
        self.lead.image_url = Some(url.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Materialize the item as the store will first record it.
    pub(crate) fn into_work_item(self, now: DateTime<Utc>) -> WorkItem {
        WorkItem {
            id: WorkId::new(),
            lead: self.lead,
            priority: self.priority,
            status: Status::Pending,
            checkpoint: Checkpoint::Init,
            seo: None,
            images: ImageSet::default(),
            image_task_id: None,
            category_id: None,
            author_id: None,
            content_id: None,
            published_url: None,
            retry: RetryInfo {
                can_retry: true,
                ..RetryInfo::default()
            },
            created_at: now,
            updated_at: now,
        }
    }
}
