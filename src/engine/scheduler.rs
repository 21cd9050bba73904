//! Cron triggers: each enabled schedule enqueues one run request per firing.
//!
//! The scheduler never runs pipelines itself. It only feeds the queue the
//! control plane consumes, so rate limiting and concurrency stay in one place.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::db::pgmq::RunRequest;
use crate::error::{Error, Result};
use crate::model::schedule::Schedule;

/// Where run requests go.
#[async_trait]
pub trait RunQueue: Send + Sync {
    /// Enqueue a request; returns the queue's message ID.
    async fn enqueue(&self, request: RunRequest) -> Result<i64>;
}

/// Owns the running cron scheduler.
pub struct CronScheduler {
    scheduler: JobScheduler,
    jobs: usize,
}

impl CronScheduler {
    /// Register one job per schedule and start firing.
    ///
    /// Expressions use six fields, seconds first (`"0 */15 * * * *"`).
    /// Disabled schedules are ignored.
    pub async fn start(schedules: &[Schedule], queue: Arc<dyn RunQueue>) -> Result<Self> {
        let scheduler = JobScheduler::new().await.map_err(scheduler_err)?;
        let mut jobs = 0;

        for schedule in schedules.iter().filter(|s| s.enabled) {
            let queue = Arc::clone(&queue);
            let schedule_id = schedule.id;
            let name = schedule.name.clone();
            let job = Job::new_async(schedule.cron_expression.as_str(), move |_uuid, _lock| {
                let queue = Arc::clone(&queue);
                let name = name.clone();
                Box::pin(async move {
                    let request = RunRequest {
                        schedule_id: Some(schedule_id),
                    };
                    match queue.enqueue(request).await {
                        Ok(msg_id) => info!(schedule = %name, msg_id, "schedule fired"),
                        Err(e) => error!(schedule = %name, "could not enqueue scheduled run: {e}"),
                    }
                })
            })
            .map_err(|e| {
                Error::Config(format!(
                    "schedule '{}' has invalid cron expression '{}': {e}",
                    schedule.name, schedule.cron_expression
                ))
            })?;
            scheduler.add(job).await.map_err(scheduler_err)?;
            jobs += 1;
        }

        scheduler.start().await.map_err(scheduler_err)?;
        info!(jobs, "cron scheduler started");
        Ok(Self { scheduler, jobs })
    }

    pub fn job_count(&self) -> usize {
        self.jobs
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.scheduler.shutdown().await.map_err(scheduler_err)
    }
}

fn scheduler_err(e: impl std::fmt::Display) -> Error {
    Error::Other(format!("cron scheduler error: {e}"))
}
