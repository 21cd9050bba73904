//! Control plane: consume the pipeline queue, one message at a time.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use super::runner::JobRunner;
use crate::config::settings::RunnerSettings;
use crate::db::pgmq::RunRequest;
use crate::db::{Db, PIPELINE_QUEUE, PIPELINE_READY_CHANNEL};
use crate::error::Result;

/// Configuration for the control plane.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Visibility timeout (seconds) for pgmq reads.
    pub visibility_timeout: i32,
    /// Poll interval fallback when no NOTIFY arrives.
    pub poll_interval: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self::from(&RunnerSettings::default())
    }
}

impl From<&RunnerSettings> for ControlConfig {
    fn from(settings: &RunnerSettings) -> Self {
        Self {
            visibility_timeout: settings.visibility_timeout_secs,
            poll_interval: settings.poll_interval(),
        }
    }
}

/// The control plane loop: listen for run requests, invoke the runner.
#[derive(Clone)]
pub struct ControlPlane {
    db: Arc<Db>,
    runner: Arc<JobRunner>,
    config: ControlConfig,
    shutdown: Arc<Notify>,
}

impl ControlPlane {
    pub fn new(db: Arc<Db>, runner: Arc<JobRunner>, config: ControlConfig) -> Self {
        Self {
            db,
            runner,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the control plane to shut down.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run the control plane loop until shutdown.
    pub async fn run(&self) -> Result<()> {
        let mut listener = sqlx::postgres::PgListener::connect_with(self.db.pool()).await?;
        listener.listen(PIPELINE_READY_CHANNEL).await?;

        info!(queue = PIPELINE_QUEUE, "control plane started, listening for runs");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("control plane shutting down");
                    return Ok(());
                }
                notif = listener.recv() => {
                    match notif {
                        Ok(n) => info!(msg_id = n.payload(), "notified of run request"),
                        Err(e) => warn!("PgListener error: {e}, falling back to poll"),
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            // Drain: the runner serializes and paces invocations itself.
            loop {
                match self.process_next().await {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(e) => {
                        error!("process_next error: {e}");
                        break;
                    }
                }
            }
        }
    }

    /// Claim and handle one message. `Ok(false)` when the queue is empty.
    pub async fn process_next(&self) -> Result<bool> {
        let Some(msg) = self
            .db
            .read_from_queue(PIPELINE_QUEUE, self.config.visibility_timeout)
            .await?
        else {
            return Ok(false);
        };

        let request: RunRequest = match serde_json::from_value(msg.message.clone()) {
            Ok(request) => request,
            Err(e) => {
                warn!(msg_id = msg.msg_id, "dropping malformed run request: {e}");
                self.db.delete_message(PIPELINE_QUEUE, msg.msg_id).await?;
                return Ok(true);
            }
        };

        match self.runner.invoke(request.schedule_id).await {
            Ok(summary) => {
                info!(
                    msg_id = msg.msg_id,
                    processed = summary.processed,
                    failed = summary.failed,
                    "run request handled"
                );
                self.db.archive_message(PIPELINE_QUEUE, msg.msg_id).await?;
            }
            Err(e) => {
                // Leave the message: the visibility timeout makes it reappear.
                error!(msg_id = msg.msg_id, read_ct = msg.read_ct, "run request failed: {e}");
            }
        }
        Ok(true)
    }
}
