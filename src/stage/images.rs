//! Image providers, retry policy and verified artifact storage.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::settings::ImageSettings;
use crate::error::{Error, Result};
use crate::model::work::{ImageSlot, SeoFields, WorkId};

/// One image for one slot, generated inline.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub reference_image: Option<String>,
    pub slot: ImageSlot,
}

/// A batch task producing all four images, delivered later by callback.
#[derive(Debug, Clone)]
pub struct ImageTaskRequest {
    pub prompt: String,
    pub reference_image: Option<String>,
}

#[async_trait]
pub trait SyncImageProvider: Send + Sync {
    /// Raw image bytes for one slot.
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait AsyncImageProvider: Send + Sync {
    /// Submit a task; returns the provider's task handle.
    async fn submit(&self, request: &ImageTaskRequest) -> Result<String>;

    /// Fetch an image the provider reported through its callback.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// The two provider flavours behind one handle.
#[derive(Clone)]
pub enum ImageProvider {
    Sync(Arc<dyn SyncImageProvider>),
    Async(Arc<dyn AsyncImageProvider>),
}

/// Prompt for one slot, built from the extracted SEO fields.
pub fn image_prompt(seo: &SeoFields, slot: ImageSlot) -> String {
    format!(
        "Food photography for \"{}\" ({}): {}. Natural light, no text, no watermark.",
        seo.title, seo.keyword, slot.subject()
    )
}

/// Prompt for a batch task covering all four slots.
pub fn batch_prompt(seo: &SeoFields) -> String {
    let shots: Vec<String> = ImageSlot::ALL
        .iter()
        .map(|slot| format!("{}. {}", slot.number(), slot.subject()))
        .collect();
    format!(
        "Four food photographs for \"{}\" ({}), in this order: {}. Natural light, no text, no watermark.",
        seo.title,
        seo.keyword,
        shots.join("; ")
    )
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Per-image retry budget with capped exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ImageSettings::default())
    }
}

impl From<&ImageSettings> for RetryPolicy {
    fn from(s: &ImageSettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            initial_backoff: Duration::from_secs(s.initial_backoff_secs),
            max_backoff: Duration::from_secs(s.max_backoff_secs),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

// ---------------------------------------------------------------------------
// Artifact storage
// ---------------------------------------------------------------------------

/// Durable storage for generated artifacts, addressed by public URL.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write bytes under `key`; returns the artifact's URL.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String>;

    /// Size of a stored artifact as read back from storage. `None` if absent.
    async fn size(&self, url: &str) -> Result<Option<u64>>;
}

/// Confirm an artifact exists and is non-empty. Returns its size.
pub async fn verify_artifact(store: &dyn ArtifactStore, url: &str) -> Result<u64> {
    match store.size(url).await? {
        None => Err(Error::Verification(format!("{url} is missing from storage"))),
        Some(0) => Err(Error::Verification(format!("{url} is zero bytes"))),
        Some(size) => Ok(size),
    }
}

/// Storage key for a slot's image. The extension follows the image format.
pub fn image_key(item: WorkId, slot: ImageSlot, bytes: &[u8]) -> String {
    format!(
        "images/{}/{}-{}.{}",
        item.0,
        slot.number(),
        slot,
        image_extension(bytes)
    )
}

fn image_extension(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "png",
        [0xFF, 0xD8, 0xFF, ..] => "jpg",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "webp",
        _ => "bin",
    }
}

/// Artifacts on the local filesystem, served under `base_url`.
pub struct LocalArtifactStore {
    root: PathBuf,
    base_url: String,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a URL we issued back to its file. Foreign URLs map to nothing.
    fn path_for(&self, url: &str) -> Option<PathBuf> {
        let key = url.strip_prefix(&self.base_url)?.strip_prefix('/')?;
        if key.split('/').any(|part| part == ".." || part.is_empty()) {
            return None;
        }
        Some(self.root.join(key))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(format!("{}/{}", self.base_url, key))
    }

    async fn size(&self, url: &str) -> Result<Option<u64>> {
        let Some(path) = self.path_for(url) else {
            return Ok(None);
        };
        // Re-open rather than trust the write: the file must be readable now.
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Some(file.metadata().await?.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
