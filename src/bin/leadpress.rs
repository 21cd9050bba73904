//! leadpress CLI: operator interface to the content pipeline.

use anyhow::Context;
use clap::{Parser, Subcommand};
use leadpress::config::{Config, ImageProviderMode, PipelineSettings};
use leadpress::db::{Db, PIPELINE_QUEUE};
use leadpress::engine::{
    CheckpointManager, CheckpointStatus, ControlConfig, ControlPlane, CronScheduler, JobRunner, NoProgress,
    Orchestrator, PipelineOptions, PipelineResult, RunQueue, Stages,
};
use leadpress::http::{self, HttpImageProvider, HttpTaskImageProvider, IndexingClient, WebhookDistributor};
use leadpress::llm::{LlmContentGenerator, LlmSeoExtractor, anthropic_client};
use leadpress::model::schedule::NewSchedule;
use leadpress::model::work::{NewWorkItem, WorkId};
use leadpress::stage::{Distributor, ImageProvider, IndexSubmitter, LocalArtifactStore};
use leadpress::store::{ScheduleStore, WorkStore};
use leadpress::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "leadpress", about = "Resumable lead-to-article pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume the pipeline queue and fire cron schedules
    Serve {
        /// Do not start the cron scheduler
        #[arg(long)]
        no_scheduler: bool,
    },
    /// Process the next eligible work item once, in-process
    RunOnce {
        /// Schedule to attribute the run to
        #[arg(long)]
        schedule: Option<uuid::Uuid>,
    },
    /// Work item operations
    Lead {
        #[command(subcommand)]
        action: LeadAction,
    },
    /// Failed item inspection and recovery
    Retry {
        #[command(subcommand)]
        action: RetryAction,
    },
    /// Async image provider callbacks
    Images {
        #[command(subcommand)]
        action: ImagesAction,
    },
    /// Re-run indexing and distribution for a completed item
    ReplayDistribution {
        /// Work item ID (full UUID or prefix)
        id: String,
    },
    /// Cron schedules
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
}

#[derive(Subcommand)]
enum LeadAction {
    /// Ingest a new lead
    Add {
        source_url: String,
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Reference image for the image provider
        #[arg(long)]
        image_url: Option<String>,
        /// Priority (higher = picked first)
        #[arg(long, default_value_t = 0)]
        priority: i32,
    },
    /// Show a work item and its checkpoint state
    Show {
        /// Work item ID (full UUID or prefix)
        id: String,
    },
}

#[derive(Subcommand)]
enum RetryAction {
    /// List failed items that can be retried
    List,
    /// Return a failed item to PENDING, keeping its artifacts
    Reset {
        id: String,
        /// Drop all artifacts and start over from INIT
        #[arg(long)]
        from_scratch: bool,
    },
    /// Block further retries of an item
    Disable { id: String },
    /// Reset an item and queue a run for it
    Restart { id: String },
}

#[derive(Subcommand)]
enum ImagesAction {
    /// Deliver the four image URLs of a finished provider task
    Complete {
        task_id: String,
        #[arg(num_args = 4, required = true)]
        urls: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// Add a schedule (six-field cron, seconds first)
    Add { name: String, cron: String },
    /// List enabled schedules
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let settings = config.pipeline_settings()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "leadpress".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Arc::new(
        Db::connect(config.database_url.expose_secret())
            .await?
            .with_site_base_url(&config.site_base_url),
    );
    db.migrate().await?;
    db.create_queue(PIPELINE_QUEUE).await?;

    match cli.command {
        Command::Serve { no_scheduler } => cmd_serve(&config, &settings, db, no_scheduler).await,
        Command::RunOnce { schedule } => {
            let runner = build_runner(&config, &settings, &db)?;
            let summary = runner.invoke(schedule).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Lead { action } => match action {
            LeadAction::Add {
                source_url,
                title,
                description,
                image_url,
                priority,
            } => {
                let mut new = NewWorkItem::new(source_url, title).priority(priority);
                if let Some(description) = description {
                    new = new.description(description);
                }
                if let Some(url) = image_url {
                    new = new.image_url(url);
                }
                let item = db.create_work_item(new).await?;
                println!("Created: {} (status: {})", item.id.0, item.status);
                Ok(())
            }
            LeadAction::Show { id } => cmd_lead_show(&db, &id).await,
        },
        Command::Retry { action } => {
            let checkpoints = CheckpointManager::new(db.clone());
            match action {
                RetryAction::List => {
                    let entries = checkpoints.get_retriable_entries().await?;
                    if entries.is_empty() {
                        println!("No retriable items.");
                        return Ok(());
                    }
                    println!(
                        "{:<8}  {:<22}  {:<16}  {:<4}  {:<6}  {:<4}  ERROR",
                        "ID", "FAILED STEP", "CHECKPOINT", "TRY", "IMAGES", "SEO"
                    );
                    println!("{}", "-".repeat(100));
                    for e in &entries {
                        println!(
                            "{:<8}  {:<22}  {:<16}  {:<4}  {:<6}  {:<4}  {}",
                            e.item_id,
                            e.failed_step.map(|s| s.as_str()).unwrap_or("-"),
                            e.checkpoint.as_str(),
                            e.attempts,
                            format!("{}/4", e.images_present),
                            if e.has_seo { "yes" } else { "no" },
                            e.error.as_deref().unwrap_or("-")
                        );
                    }
                    println!("\n{} item(s)", entries.len());
                    Ok(())
                }
                RetryAction::Reset { id, from_scratch } => {
                    let id = resolve_id(&db, &id).await?;
                    let item = if from_scratch {
                        checkpoints.reset_checkpoint(id).await?
                    } else {
                        checkpoints.reset_for_retry(id).await?
                    };
                    println!("Reset: {} (status: {}, checkpoint: {})", item.id, item.status, item.checkpoint);
                    Ok(())
                }
                RetryAction::Disable { id } => {
                    let id = resolve_id(&db, &id).await?;
                    checkpoints.disable_retry(id).await?;
                    println!("Retries disabled for {id}");
                    Ok(())
                }
                RetryAction::Restart { id } => {
                    let id = resolve_id(&db, &id).await?;
                    let (item, msg_id) = checkpoints.restart(id, db.as_ref()).await?;
                    println!(
                        "Queued retry: {} (checkpoint: {}, message: {msg_id})",
                        item.id, item.checkpoint
                    );
                    Ok(())
                }
            }
        }
        Command::Images {
            action: ImagesAction::Complete { task_id, urls },
        } => {
            let orchestrator = build_orchestrator(&config, &settings, &db)?;
            let urls: [String; 4] = urls
                .try_into()
                .map_err(|_| anyhow::anyhow!("exactly four image URLs are required"))?;
            let item = orchestrator.complete_image_task(&task_id, &urls).await?;
            println!("Images complete: {} (checkpoint: {})", item.id, item.checkpoint);
            Ok(())
        }
        Command::ReplayDistribution { id } => {
            let orchestrator = build_orchestrator(&config, &settings, &db)?;
            let id = resolve_id(&db, &id).await?;
            let result = orchestrator.replay_distribution(id, &NoProgress).await;
            print_result(&result)
        }
        Command::Schedule { action } => match action {
            ScheduleAction::Add { name, cron } => {
                let schedule = db
                    .create_schedule(NewSchedule {
                        name,
                        cron_expression: cron,
                    })
                    .await?;
                println!("Created schedule {} ({})", schedule.id, schedule.cron_expression);
                Ok(())
            }
            ScheduleAction::List => {
                let schedules = db.list_enabled_schedules().await?;
                if schedules.is_empty() {
                    println!("No schedules.");
                    return Ok(());
                }
                println!("{:<36}  {:<20}  {:<18}  {:<5}  LAST RUN", "ID", "NAME", "CRON", "RUNS");
                for s in &schedules {
                    println!(
                        "{:<36}  {:<20}  {:<18}  {:<5}  {}",
                        s.id,
                        s.name,
                        s.cron_expression,
                        s.run_count,
                        s.last_run
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_else(|| "-".to_string())
                    );
                }
                Ok(())
            }
        },
    }
}

async fn cmd_serve(
    config: &Config,
    settings: &PipelineSettings,
    db: Arc<Db>,
    no_scheduler: bool,
) -> anyhow::Result<()> {
    let runner = Arc::new(build_runner(config, settings, &db)?);

    let scheduler = if no_scheduler {
        None
    } else {
        let schedules = db.list_enabled_schedules().await?;
        let queue: Arc<dyn RunQueue> = db.clone();
        Some(CronScheduler::start(&schedules, queue).await?)
    };

    let control = ControlPlane::new(
        Arc::clone(&db),
        runner,
        ControlConfig::from(&settings.runner),
    );

    let ctrl = control.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl.shutdown();
    });

    control.run().await?;
    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await?;
    }
    Ok(())
}

fn build_runner(config: &Config, settings: &PipelineSettings, db: &Arc<Db>) -> anyhow::Result<JobRunner> {
    let orchestrator = Arc::new(build_orchestrator(config, settings, db)?);
    Ok(JobRunner::new(
        db.clone(),
        db.clone(),
        db.clone(),
        orchestrator,
        &settings.runner,
    )?)
}

fn build_orchestrator(
    config: &Config,
    settings: &PipelineSettings,
    db: &Arc<Db>,
) -> anyhow::Result<Orchestrator> {
    let http = http::client()?;
    let llm = anthropic_client(&config.anthropic_api_key)
        .map_err(|e| anyhow::anyhow!("cannot create Anthropic client: {e}"))?;

    let image_url = config
        .image_provider_url
        .clone()
        .context("IMAGE_PROVIDER_URL is required to run the pipeline")?;
    let images = match config.image_provider {
        ImageProviderMode::Sync => ImageProvider::Sync(Arc::new(HttpImageProvider::new(
            http.clone(),
            image_url,
            config.image_provider_key.clone(),
        ))),
        ImageProviderMode::Async => ImageProvider::Async(Arc::new(HttpTaskImageProvider::new(
            http.clone(),
            image_url,
            config.image_provider_key.clone(),
            config.image_callback_url.clone(),
        ))),
    };

    let indexer = config.indexing_endpoint.clone().map(|endpoint| {
        Arc::new(IndexingClient::new(
            http.clone(),
            endpoint,
            config.indexing_token.clone(),
        )) as Arc<dyn IndexSubmitter>
    });
    let distributor = config.distribution_webhook_url.clone().map(|url| {
        Arc::new(WebhookDistributor::new(http.clone(), url)) as Arc<dyn Distributor>
    });

    let stages = Stages {
        seo: Arc::new(LlmSeoExtractor::new(llm.clone(), &config.llm_model)),
        images,
        artifacts: Arc::new(LocalArtifactStore::new(
            &config.artifact_dir,
            &config.artifact_base_url,
        )),
        categories: db.clone(),
        authors: db.clone(),
        generator: Arc::new(LlmContentGenerator::new(llm, &config.llm_model)),
        publisher: db.clone(),
        indexer,
        distributor,
    };
    let options = PipelineOptions::from_settings(settings)
        .with_board_id(config.distribution_board_id.clone());

    Ok(Orchestrator::new(db.clone(), stages, options))
}

async fn cmd_lead_show(db: &Db, id: &str) -> anyhow::Result<()> {
    let id = resolve_id(db, id).await?;
    let item = db.get_work_item(id).await?;
    let status = CheckpointStatus::of(&item);

    println!("ID:          {}", item.id.0);
    println!("Title:       {}", item.lead.title);
    println!("Source:      {}", item.lead.source_url);
    println!("Status:      {}", item.status);
    println!("Checkpoint:  {}", item.checkpoint);
    println!("Priority:    {}", item.priority);
    println!("Can resume:  {}", status.can_resume);
    match status.resume_step(id) {
        Ok(step) => println!("Resumes at:  {step}"),
        Err(e) => println!("Resumes at:  - ({e})"),
    }
    if let Some(seo) = &item.seo {
        println!("Keyword:     {}", seo.keyword);
        println!("SEO title:   {}", seo.title);
    }
    println!("Images:      {}/4", status.images_present);
    for (n, url) in item.images.as_slice().iter().enumerate() {
        if let Some(url) = url {
            println!("  {}: {url}", n + 1);
        }
    }
    if let Some(task) = &item.image_task_id {
        println!("Image task:  {task}");
    }
    if let Some(content_id) = item.content_id {
        println!("Content:     {content_id}");
    }
    if let Some(url) = &item.published_url {
        println!("URL:         {url}");
    }
    if let Some(step) = item.retry.failed_step {
        println!("---");
        println!("Failed step: {step}");
        println!(
            "Failed at:   {}",
            item.retry.failed_at.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())
        );
        println!("Error:       {}", item.retry.generation_error.as_deref().unwrap_or("-"));
    }
    println!("Attempts:    {}", item.retry.generation_attempts);
    println!("Can retry:   {}", item.retry.can_retry);
    println!("Created:     {}", item.created_at);
    println!("Updated:     {}", item.updated_at);

    let executions = db.list_executions(id).await?;
    if let Some(last) = executions.first() {
        println!("---");
        println!("Last run:    {} ({})", last.status, last.started_at.format("%Y-%m-%d %H:%M"));
        for entry in &last.entries {
            println!("  [{}/{}] {}", entry.step, entry.total, entry.message);
        }
    }
    Ok(())
}

/// Full UUID, or a unique prefix among recent items.
async fn resolve_id(db: &Db, id: &str) -> anyhow::Result<WorkId> {
    if let Ok(uuid) = uuid::Uuid::parse_str(id) {
        return Ok(WorkId(uuid));
    }
    let items = db.list_work_items(None, 500).await?;
    let matches: Vec<_> = items
        .iter()
        .filter(|item| item.id.0.to_string().starts_with(id))
        .collect();
    match matches.len() {
        0 => anyhow::bail!("no work item matching prefix '{id}'"),
        1 => Ok(matches[0].id),
        n => anyhow::bail!("{n} work items match prefix '{id}', be more specific"),
    }
}

fn print_result(result: &PipelineResult) -> anyhow::Result<()> {
    for line in result.logs() {
        println!("  {line}");
    }
    match result {
        PipelineResult::Completed { content_id, url, .. } => {
            println!("Completed: {content_id} at {url}");
            Ok(())
        }
        PipelineResult::ImagesPending { task_id, .. } => {
            println!("Waiting for image task {task_id}");
            Ok(())
        }
        PipelineResult::Failed { stage, error, .. } => {
            anyhow::bail!("failed at {stage}: {error}")
        }
    }
}
