//! Database connection pool, migrations, and health check.
//!
//! One Postgres pool backs the work item, execution log and schedule stores,
//! the pgmq pipeline queue, and the author/category catalog.

pub mod catalog;
pub mod execution;
pub mod pgmq;
pub mod schedule;
pub mod work;

use crate::error::{Error, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Queue the control plane consumes; one message per requested run.
pub const PIPELINE_QUEUE: &str = "pipeline";

/// NOTIFY channel raised whenever a run is enqueued.
pub const PIPELINE_READY_CHANNEL: &str = "pipeline_ready";

/// Database handle. Owns the connection pool shared across all modules.
pub struct Db {
    pool: PgPool,
    site_base_url: String,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self {
            pool,
            site_base_url: "http://localhost:3000".to_string(),
        })
    }

    /// Base URL published recipes are served under.
    pub fn with_site_base_url(mut self, url: impl Into<String>) -> Self {
        self.site_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
