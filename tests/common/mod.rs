//! Fakes and fixtures shared by the pipeline, checkpoint and runner tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use leadpress::engine::{Orchestrator, PipelineOptions, ProgressSink, Stages};
use leadpress::error::{Error, Result};
use leadpress::model::content::{FaqEntry, GeneratedContent};
use leadpress::model::execution::Progress;
use leadpress::model::work::{
    Checkpoint, ImageSlot, NewWorkItem, SeoFields, Status, WorkItem,
};
use leadpress::stage::{
    ArtifactStore, AsyncImageProvider, Author, AuthorDirectory, CategoryMatch, CategoryMatcher,
    CategoryQuery, ContentGenerator, ContentPublisher, ContentRequest, DistributionPayload,
    Distributor, ImageProvider, ImageRequest, ImageTaskRequest, IndexResponse, IndexSubmitter,
    LocalArtifactStore, PublishedContent, RetryPolicy, SeoExtractor, SyncImageProvider,
};
use leadpress::store::{MemoryStore, WorkItemPatch, WorkStore};

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3, 4];

pub fn seo_fields() -> SeoFields {
    SeoFields {
        keyword: "lemon tart".to_string(),
        title: "Classic French Lemon Tart".to_string(),
        description: "A crisp butter crust filled with silky lemon curd.".to_string(),
        category: Some("Desserts".to_string()),
    }
}

// ---------------------------------------------------------------------------
// SEO
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeSeo {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    /// Sleep this long before answering.
    pub delay: Option<Duration>,
}

impl FakeSeo {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SeoExtractor for FakeSeo {
    async fn extract(&self, _item: &WorkItem) -> Result<SeoFields> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Other("llm returned 529 overloaded".to_string()));
        }
        Ok(seo_fields())
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Sync provider. `broken_slot` returns zero bytes for that slot.
#[derive(Default)]
pub struct FakeImages {
    pub calls: AtomicUsize,
    pub broken_slot: Mutex<Option<ImageSlot>>,
    pub requested: Mutex<Vec<ImageSlot>>,
}

impl FakeImages {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn break_slot(&self, slot: Option<ImageSlot>) {
        *self.broken_slot.lock().unwrap() = slot;
    }

    pub fn requested(&self) -> Vec<ImageSlot> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncImageProvider for FakeImages {
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(request.slot);
        if *self.broken_slot.lock().unwrap() == Some(request.slot) {
            return Ok(Vec::new());
        }
        Ok(PNG.to_vec())
    }
}

#[derive(Default)]
pub struct FakeImageTasks {
    pub submits: AtomicUsize,
    pub downloads: AtomicUsize,
}

impl FakeImageTasks {
    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AsyncImageProvider for FakeImageTasks {
    async fn submit(&self, _request: &ImageTaskRequest) -> Result<String> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("task-{n}"))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if url.contains("empty") {
            return Ok(Vec::new());
        }
        Ok(PNG.to_vec())
    }
}

pub fn task_urls() -> [String; 4] {
    [1, 2, 3, 4].map(|n| format!("https://images.test/out/{n}.png"))
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

pub struct FakeCategories {
    pub result: Mutex<Option<CategoryMatch>>,
    pub fail: AtomicBool,
}

impl FakeCategories {
    pub fn matching(id: Uuid, name: &str) -> Self {
        Self {
            result: Mutex::new(Some(CategoryMatch {
                category_id: id,
                category_name: name.to_string(),
                confidence: 0.9,
            })),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CategoryMatcher for FakeCategories {
    async fn match_category(&self, _query: &CategoryQuery) -> Result<Option<CategoryMatch>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Other("category table unavailable".to_string()));
        }
        Ok(self.result.lock().unwrap().clone())
    }
}

pub struct FakeAuthors {
    pub authors: Mutex<Vec<Author>>,
}

#[async_trait]
impl AuthorDirectory for FakeAuthors {
    async fn list_authors(&self) -> Result<Vec<Author>> {
        Ok(self.authors.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Generation and publishing
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeGenerator {
    pub calls: AtomicUsize,
    /// Return a document that fails the quality gate.
    pub thin: AtomicBool,
    pub requests: Mutex<Vec<ContentRequest>>,
}

impl FakeGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_thin(&self, thin: bool) {
        self.thin.store(thin, Ordering::SeqCst);
    }
}

pub fn rich_content() -> GeneratedContent {
    GeneratedContent {
        title: "Classic French Lemon Tart".to_string(),
        intro: "This lemon tart balances a sharp, glossy curd against a crumbly butter crust. \
                It keeps for days and slices cleanly straight from the fridge."
            .to_string(),
        story: "My grandmother made this tart every spring when the first good lemons reached \
                the market. She never measured the zest, and she always blind baked the shell \
                twice. I have written her method down properly here, with the one shortcut I \
                allow myself: a food processor for the pastry."
            .to_string(),
        ingredients: vec![
            "200g plain flour".to_string(),
            "100g cold butter".to_string(),
            "4 lemons".to_string(),
            "4 eggs".to_string(),
        ],
        instructions: vec![
            "Rub the butter into the flour.".to_string(),
            "Blind bake the shell for 15 minutes.".to_string(),
            "Whisk the curd and bake until just set.".to_string(),
        ],
        tips: vec!["Chill the tart overnight for clean slices.".to_string()],
        faq: vec![
            FaqEntry {
                question: "Can I freeze it?".to_string(),
                answer: "Yes, for up to a month.".to_string(),
            },
            FaqEntry {
                question: "Can I use bottled juice?".to_string(),
                answer: "Fresh juice tastes far brighter.".to_string(),
            },
        ],
        prep_time: Some("30 minutes".to_string()),
        cook_time: Some("45 minutes".to_string()),
        servings: Some("8".to_string()),
        finish_reason: Some("end_turn".to_string()),
    }
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn generate(&self, request: &ContentRequest) -> Result<GeneratedContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let mut content = rich_content();
        if self.thin.load(Ordering::SeqCst) {
            content.faq.clear();
            content.story = "Short.".to_string();
        }
        Ok(content)
    }
}

#[derive(Default)]
pub struct FakePublisher {
    pub calls: AtomicUsize,
}

impl FakePublisher {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentPublisher for FakePublisher {
    async fn publish(
        &self,
        item: &WorkItem,
        _request: &ContentRequest,
        _content: &GeneratedContent,
    ) -> Result<PublishedContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PublishedContent {
            content_id: Uuid::new_v4(),
            url: format!("https://site.test/recipes/{}", item.id.0),
        })
    }
}

// ---------------------------------------------------------------------------
// Tail stages
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeIndexer {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl IndexSubmitter for FakeIndexer {
    async fn submit(&self, _url: &str) -> Result<IndexResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Other("indexing api returned 500".to_string()));
        }
        Ok(IndexResponse {
            success: true,
            message: None,
        })
    }
}

#[derive(Default)]
pub struct FakeDistributor {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub payloads: Mutex<Vec<DistributionPayload>>,
}

#[async_trait]
impl Distributor for FakeDistributor {
    async fn distribute(&self, payload: &DistributionPayload) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Other("webhook returned 502".to_string()));
        }
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingProgress {
    pub reports: Mutex<Vec<Progress>>,
}

impl RecordingProgress {
    pub fn steps(&self) -> Vec<u32> {
        self.reports.lock().unwrap().iter().map(|p| p.step).collect()
    }
}

#[async_trait]
impl ProgressSink for RecordingProgress {
    async fn report(&self, progress: Progress) {
        self.reports.lock().unwrap().push(progress);
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Everything one pipeline needs, with handles kept for assertions.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub artifacts: Arc<LocalArtifactStore>,
    pub seo: Arc<FakeSeo>,
    pub images: Arc<FakeImages>,
    pub image_tasks: Arc<FakeImageTasks>,
    pub categories: Arc<FakeCategories>,
    pub authors: Arc<FakeAuthors>,
    pub generator: Arc<FakeGenerator>,
    pub publisher: Arc<FakePublisher>,
    pub indexer: Arc<FakeIndexer>,
    pub distributor: Arc<FakeDistributor>,
    pub category_id: Uuid,
    pub author: Author,
}

impl Harness {
    pub fn new() -> Self {
        let category_id = Uuid::new_v4();
        let author = Author {
            id: Uuid::new_v4(),
            name: "Margot Laurent".to_string(),
            specializations: vec![category_id],
        };
        let root = std::env::temp_dir().join(format!("leadpress-test-{}", Uuid::new_v4()));
        Self {
            store: Arc::new(MemoryStore::new()),
            artifacts: Arc::new(LocalArtifactStore::new(root, "https://cdn.test/artifacts")),
            seo: Arc::new(FakeSeo::default()),
            images: Arc::new(FakeImages::default()),
            image_tasks: Arc::new(FakeImageTasks::default()),
            categories: Arc::new(FakeCategories::matching(category_id, "Desserts")),
            authors: Arc::new(FakeAuthors {
                authors: Mutex::new(vec![author.clone()]),
            }),
            generator: Arc::new(FakeGenerator::default()),
            publisher: Arc::new(FakePublisher::default()),
            indexer: Arc::new(FakeIndexer::default()),
            distributor: Arc::new(FakeDistributor::default()),
            category_id,
            author,
        }
    }

    pub fn with_seo(mut self, seo: FakeSeo) -> Self {
        self.seo = Arc::new(seo);
        self
    }

    pub fn stages(&self, images: ImageProvider) -> Stages {
        Stages {
            seo: self.seo.clone(),
            images,
            artifacts: self.artifacts.clone(),
            categories: self.categories.clone(),
            authors: self.authors.clone(),
            generator: self.generator.clone(),
            publisher: self.publisher.clone(),
            indexer: Some(self.indexer.clone()),
            distributor: Some(self.distributor.clone()),
        }
    }

    pub fn options() -> PipelineOptions {
        PipelineOptions {
            image_retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
            },
            ..PipelineOptions::default()
        }
    }

    /// Orchestrator with the synchronous image provider.
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.store.clone(),
            self.stages(ImageProvider::Sync(self.images.clone())),
            Self::options(),
        )
    }

    /// Orchestrator with the task-based image provider.
    pub fn async_orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.store.clone(),
            self.stages(ImageProvider::Async(self.image_tasks.clone())),
            Self::options(),
        )
    }

    pub fn orchestrator_with(&self, stages: Stages) -> Orchestrator {
        Orchestrator::new(self.store.clone(), stages, Self::options())
    }

    pub async fn lead(&self, title: &str) -> WorkItem {
        self.store
            .create_work_item(
                NewWorkItem::new(format!("https://source.test/{title}"), title)
                    .description("Scraped from a food blog")
                    .image_url("https://source.test/reference.jpg"),
            )
            .await
            .unwrap()
    }

    /// A lead that already paid for SEO and all four images.
    pub async fn lead_with_images(&self, title: &str) -> WorkItem {
        let item = self.lead(title).await;
        let mut patch = WorkItemPatch::status(Status::ReadyForGeneration).with_seo(seo_fields());
        patch.checkpoint = Some(Checkpoint::ImagesComplete);
        for slot in ImageSlot::ALL {
            let key = format!("images/{}/{}-{slot}.png", item.id.0, slot.number());
            let url = self.artifacts.put(&key, PNG).await.unwrap();
            patch = patch.with_image(slot, url);
        }
        self.store.update_work_item(item.id, patch).await.unwrap()
    }

    pub async fn item(&self, item: &WorkItem) -> WorkItem {
        self.store.get_work_item(item.id).await.unwrap()
    }
}
