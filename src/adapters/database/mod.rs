pub mod job_repo;
pub mod records;

use crate::config::DatabaseConfig;
use crate::domain::job::{BulkJobRecord, BulkJobSummary, DeliveryOutcome};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use uuid::Uuid;

pub use job_repo::PgJobStore;

pub type DbPool = Pool<Postgres>;

/// Initializes the database connection pool.
///
/// # Errors
/// Returns `sqlx::Error` if the connection fails.
pub async fn init_pool(config: &DatabaseConfig) -> std::result::Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .connect(&config.url)
        .await
}

/// Durable record of finished bulk jobs. Append-only.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug {
    /// Persists a job summary together with one history entry per outcome, atomically.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the transaction fails. Nothing is persisted then.
    async fn save(&self, summary: &BulkJobSummary, outcomes: &[DeliveryOutcome]) -> Result<Uuid>;

    /// Returns up to `limit` jobs, most recent first, each with its history in recipient order.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    async fn list_recent(&self, limit: i64) -> Result<Vec<BulkJobRecord>>;

    /// Checks that the store is reachable.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the store cannot be reached.
    async fn ping(&self) -> Result<()>;
}
