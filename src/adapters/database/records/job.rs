use crate::domain::job::{BulkJobSummary, DeliveryOutcome, DeliveryStatus};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct BulkJobRow {
    pub(crate) id: Uuid,
    pub(crate) subject: String,
    pub(crate) sender_address: String,
    pub(crate) sent_at: OffsetDateTime,
    pub(crate) success_count: i64,
    pub(crate) failed_count: i64,
    pub(crate) plain_body: String,
    pub(crate) html_body: Option<String>,
}

impl From<BulkJobRow> for BulkJobSummary {
    fn from(row: BulkJobRow) -> Self {
        Self {
            id: row.id,
            subject: row.subject,
            sender_address: row.sender_address,
            sent_at: row.sent_at,
            success_count: row.success_count,
            failed_count: row.failed_count,
            plain_body: row.plain_body,
            html_body: row.html_body,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct HistoryRow {
    pub(crate) job_id: Uuid,
    pub(crate) recipient: String,
    pub(crate) status: String,
    pub(crate) error_detail: Option<String>,
}

impl From<HistoryRow> for DeliveryOutcome {
    fn from(row: HistoryRow) -> Self {
        let status = if row.status == DeliveryStatus::SENT {
            DeliveryStatus::Sent
        } else {
            DeliveryStatus::Failed { error: row.error_detail.unwrap_or_default() }
        };
        Self { recipient: row.recipient, status }
    }
}
