use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

/// An uploaded attachment. The buffer is immutable and shared by every recipient's message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct BulkJobRequest {
    pub subject: String,
    pub plain_body: String,
    pub html_body: Option<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub attachments: Vec<AttachmentFile>,
    pub recipients: Vec<String>,
}

impl BulkJobRequest {
    /// Checks the invariants a job needs before it may start.
    ///
    /// # Errors
    /// Returns a human readable reason for the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        if self.subject.trim().is_empty() {
            return Err("Please enter email subject".into());
        }
        if self.plain_body.trim().is_empty() {
            return Err("Please write email content".into());
        }
        if self.recipients.is_empty() {
            return Err("No recipients provided".into());
        }
        Ok(())
    }

    /// The HTML alternative, if one was supplied with actual content.
    #[must_use]
    pub fn html_body(&self) -> Option<&str> {
        self.html_body.as_deref().filter(|html| !html.trim().is_empty())
    }
}

/// A bulk job in flight. The id and start time are fixed for the whole job.
#[derive(Debug, Clone)]
pub struct BulkJob {
    pub id: Uuid,
    pub started_at: OffsetDateTime,
    pub request: BulkJobRequest,
}

impl BulkJob {
    #[must_use]
    pub fn start(request: BulkJobRequest) -> Self {
        Self { id: Uuid::now_v7(), started_at: OffsetDateTime::now_utc(), request }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    Failed { error: String },
}

impl DeliveryStatus {
    pub(crate) const SENT: &'static str = "SENT";
    pub(crate) const FAILED: &'static str = "FAILED";

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Sent => Self::SENT,
            Self::Failed { .. } => Self::FAILED,
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// The result of one delivery attempt. Exactly one exists per recipient per job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub recipient: String,
    pub status: DeliveryStatus,
}

impl DeliveryOutcome {
    #[must_use]
    pub fn sent(recipient: impl Into<String>) -> Self {
        Self { recipient: recipient.into(), status: DeliveryStatus::Sent }
    }

    #[must_use]
    pub fn failed(recipient: impl Into<String>, error: impl Into<String>) -> Self {
        Self { recipient: recipient.into(), status: DeliveryStatus::Failed { error: error.into() } }
    }

    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self.status, DeliveryStatus::Sent)
    }

    #[must_use]
    pub fn error_detail(&self) -> Option<&str> {
        match &self.status {
            DeliveryStatus::Sent => None,
            DeliveryStatus::Failed { error } => Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkJobSummary {
    pub id: Uuid,
    pub subject: String,
    pub sender_address: String,
    pub sent_at: OffsetDateTime,
    pub success_count: i64,
    pub failed_count: i64,
    pub plain_body: String,
    pub html_body: Option<String>,
}

impl BulkJobSummary {
    /// Summarizes a finished job from its outcomes.
    #[must_use]
    pub fn from_outcomes(job: &BulkJob, sender_address: &str, outcomes: &[DeliveryOutcome]) -> Self {
        let sent = outcomes.iter().filter(|o| o.is_sent()).count();
        let failed = outcomes.len() - sent;
        Self {
            id: job.id,
            subject: job.request.subject.clone(),
            sender_address: sender_address.to_string(),
            sent_at: job.started_at,
            success_count: i64::try_from(sent).unwrap_or(i64::MAX),
            failed_count: i64::try_from(failed).unwrap_or(i64::MAX),
            plain_body: job.request.plain_body.clone(),
            html_body: job.request.html_body().map(ToString::to_string),
        }
    }
}

/// A persisted job summary together with its per-recipient history, in recipient order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkJobRecord {
    pub summary: BulkJobSummary,
    pub outcomes: Vec<DeliveryOutcome>,
}

impl BulkJobRecord {
    pub fn sent_emails(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().filter(|o| o.is_sent()).map(|o| o.recipient.as_str())
    }

    pub fn failed_emails(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|o| o.error_detail().map(|e| (o.recipient.as_str(), e)))
    }
}

/// What a bulk send returns to its caller.
#[derive(Debug, Clone)]
pub struct BulkSendReport {
    pub job_id: Uuid,
    pub outcomes: Vec<DeliveryOutcome>,
    pub success_count: usize,
    pub failed_count: usize,
    /// Set when the summary and history were committed to the store.
    pub persisted: bool,
    pub store_warning: Option<String>,
    pub cancelled: bool,
}
