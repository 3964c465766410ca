use crate::adapters::database::records::{BulkJobRow, HistoryRow};
use crate::adapters::database::{DbPool, JobStore};
use crate::domain::job::{BulkJobRecord, BulkJobSummary, DeliveryOutcome};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::PgConnection;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct JobRepository {}

impl JobRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Inserts the job summary row.
    ///
    /// # Errors
    /// Returns `sqlx::Error` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, summary), fields(job_id = %summary.id), err)]
    pub(crate) async fn insert_summary(&self, conn: &mut PgConnection, summary: &BulkJobSummary) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO bulk_jobs (id, subject, sender_address, sent_at, success_count, failed_count, plain_body, html_body)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(summary.id)
        .bind(&summary.subject)
        .bind(&summary.sender_address)
        .bind(summary.sent_at)
        .bind(summary.success_count)
        .bind(summary.failed_count)
        .bind(&summary.plain_body)
        .bind(&summary.html_body)
        .fetch_one(conn)
        .await?;

        Ok(id)
    }

    /// Inserts one history row per outcome, numbered in recipient order.
    ///
    /// # Errors
    /// Returns `sqlx::Error` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, outcomes), fields(count = outcomes.len()), err)]
    pub(crate) async fn insert_history(
        &self,
        conn: &mut PgConnection,
        job_id: Uuid,
        outcomes: &[DeliveryOutcome],
    ) -> Result<()> {
        if outcomes.is_empty() {
            return Ok(());
        }

        let positions: Vec<i32> = (0..).take(outcomes.len()).collect();
        let recipients: Vec<&str> = outcomes.iter().map(|o| o.recipient.as_str()).collect();
        let statuses: Vec<&str> = outcomes.iter().map(|o| o.status.label()).collect();
        let errors: Vec<Option<&str>> = outcomes.iter().map(DeliveryOutcome::error_detail).collect();

        sqlx::query(
            r#"
            INSERT INTO bulk_job_history (job_id, position, recipient, status, error_detail)
            SELECT $1, h.position, h.recipient, h.status, h.error_detail
            FROM UNNEST($2::INT4[], $3::TEXT[], $4::TEXT[], $5::TEXT[])
                AS h(position, recipient, status, error_detail)
            "#,
        )
        .bind(job_id)
        .bind(positions)
        .bind(recipients)
        .bind(statuses)
        .bind(errors)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Fetches the most recent job summaries.
    ///
    /// # Errors
    /// Returns `sqlx::Error` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn fetch_recent(&self, conn: &mut PgConnection, limit: i64) -> Result<Vec<BulkJobSummary>> {
        let rows = sqlx::query_as::<_, BulkJobRow>(
            r#"
            SELECT id, subject, sender_address, sent_at, success_count, failed_count, plain_body, html_body
            FROM bulk_jobs
            ORDER BY sent_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(conn)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Fetches the history of the given jobs, grouped per job in recipient order.
    ///
    /// # Errors
    /// Returns `sqlx::Error` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn, job_ids), err)]
    pub(crate) async fn fetch_history(
        &self,
        conn: &mut PgConnection,
        job_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<DeliveryOutcome>>> {
        if job_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT job_id, recipient, status, error_detail
            FROM bulk_job_history
            WHERE job_id = ANY($1)
            ORDER BY job_id, position ASC
            "#,
        )
        .bind(job_ids)
        .fetch_all(conn)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<DeliveryOutcome>> = HashMap::with_capacity(job_ids.len());
        for row in rows {
            grouped.entry(row.job_id).or_default().push(row.into());
        }
        Ok(grouped)
    }
}

/// PostgreSQL-backed `JobStore`.
#[derive(Clone, Debug)]
pub struct PgJobStore {
    pool: DbPool,
    repo: JobRepository,
}

impl PgJobStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool, repo: JobRepository::new() }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[tracing::instrument(skip(self, summary, outcomes), fields(job_id = %summary.id), err(level = "warn"))]
    async fn save(&self, summary: &BulkJobSummary, outcomes: &[DeliveryOutcome]) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;
        let id = self.repo.insert_summary(&mut tx, summary).await?;
        self.repo.insert_history(&mut tx, id, outcomes).await?;
        tx.commit().await?;

        tracing::debug!(recipients = outcomes.len(), "Bulk job persisted");
        Ok(id)
    }

    #[tracing::instrument(skip(self), err(level = "warn"))]
    async fn list_recent(&self, limit: i64) -> Result<Vec<BulkJobRecord>> {
        let mut conn = self.pool.acquire().await?;
        let summaries = self.repo.fetch_recent(&mut conn, limit).await?;
        let ids: Vec<Uuid> = summaries.iter().map(|s| s.id).collect();
        let mut history = self.repo.fetch_history(&mut conn, &ids).await?;

        Ok(summaries
            .into_iter()
            .map(|summary| {
                let outcomes = history.remove(&summary.id).unwrap_or_default();
                BulkJobRecord { summary, outcomes }
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
