use crate::domain::job::{BulkJobRecord, BulkSendReport, DeliveryOutcome};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub success: bool,
    pub emails: Vec<String>,
    pub count: usize,
    pub message: String,
}

impl From<Vec<String>> for ExtractResponse {
    fn from(emails: Vec<String>) -> Self {
        let count = emails.len();
        Self { success: true, emails, count, message: format!("Successfully extracted {count} email addresses") }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FailedEmail {
    pub email: String,
    pub error: String,
}

/// Recipient to status text, serialized as a JSON object in recipient order.
#[derive(Debug, Default)]
pub struct RecipientResults(Vec<(String, String)>);

impl Serialize for RecipientResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (recipient, status) in &self.0 {
            map.serialize_entry(recipient, status)?;
        }
        map.end()
    }
}

impl From<&[DeliveryOutcome]> for RecipientResults {
    fn from(outcomes: &[DeliveryOutcome]) -> Self {
        Self(outcomes.iter().map(|o| (o.recipient.clone(), o.status.to_string())).collect())
    }
}

fn failed_emails(outcomes: &[DeliveryOutcome]) -> Vec<FailedEmail> {
    outcomes
        .iter()
        .filter_map(|o| o.error_detail().map(|e| FailedEmail { email: o.recipient.clone(), error: e.to_string() }))
        .collect()
}

#[derive(Debug, Serialize)]
pub struct SendBulkResponse {
    pub success: bool,
    pub message: String,
    /// Only present once the job has been recorded.
    pub job_id: Option<Uuid>,
    pub success_count: usize,
    pub failed_count: usize,
    pub results: RecipientResults,
    pub failed_emails: Vec<FailedEmail>,
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_warning: Option<String>,
    pub cancelled: bool,
}

impl From<BulkSendReport> for SendBulkResponse {
    fn from(report: BulkSendReport) -> Self {
        let message = if report.cancelled {
            "Bulk email process interrupted by server shutdown".to_string()
        } else {
            "Bulk email process completed".to_string()
        };
        Self {
            success: true,
            message,
            job_id: report.persisted.then_some(report.job_id),
            success_count: report.success_count,
            failed_count: report.failed_count,
            results: RecipientResults::from(report.outcomes.as_slice()),
            failed_emails: failed_emails(&report.outcomes),
            persisted: report.persisted,
            store_warning: report.store_warning,
            cancelled: report.cancelled,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BulkJobView {
    pub id: Uuid,
    pub subject: String,
    pub sender_email: String,
    pub sent_time: String,
    pub success_count: i64,
    pub failed_count: i64,
    pub sent_emails: Vec<String>,
    pub failed_emails: Vec<FailedEmail>,
    pub content: String,
    pub content_html: Option<String>,
}

impl From<BulkJobRecord> for BulkJobView {
    fn from(record: BulkJobRecord) -> Self {
        let sent_emails = record.sent_emails().map(ToString::to_string).collect();
        let failed = failed_emails(&record.outcomes);
        let summary = record.summary;
        Self {
            id: summary.id,
            subject: summary.subject,
            sender_email: summary.sender_address,
            sent_time: summary.sent_at.format(&Rfc3339).unwrap_or_default(),
            success_count: summary.success_count,
            failed_count: summary.failed_count,
            sent_emails,
            failed_emails: failed,
            content: summary.plain_body,
            content_html: summary.html_body,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecentBulkResponse {
    pub success: bool,
    pub data: Vec<BulkJobView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::{BulkJob, BulkJobRequest, BulkJobSummary};
    use serde_json::Value;

    fn outcomes() -> Vec<DeliveryOutcome> {
        vec![
            DeliveryOutcome::sent("zed@x.com"),
            DeliveryOutcome::failed("amy@x.com", "550 no such user"),
            DeliveryOutcome::sent("mia@x.com"),
        ]
    }

    fn report(persisted: bool) -> BulkSendReport {
        BulkSendReport {
            job_id: Uuid::now_v7(),
            outcomes: outcomes(),
            success_count: 2,
            failed_count: 1,
            persisted,
            store_warning: (!persisted).then(|| "not saved".to_string()),
            cancelled: false,
        }
    }

    #[test]
    fn test_results_keep_recipient_order() {
        let json = serde_json::to_string(&SendBulkResponse::from(report(true))).unwrap();
        let zed = json.find("zed@x.com").unwrap();
        let amy = json.find("amy@x.com").unwrap();
        let mia = json.find("mia@x.com").unwrap();
        assert!(zed < amy && amy < mia);

        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["results"]["zed@x.com"], "sent");
        assert_eq!(value["results"]["amy@x.com"], "failed: 550 no such user");
        assert_eq!(value["failed_emails"][0]["email"], "amy@x.com");
        assert!(value.get("store_warning").is_none());
    }

    #[test]
    fn test_unpersisted_job_has_no_id() {
        let value = serde_json::to_value(SendBulkResponse::from(report(false))).unwrap();
        assert_eq!(value["job_id"], Value::Null);
        assert_eq!(value["persisted"], false);
        assert_eq!(value["store_warning"], "not saved");
        assert_eq!(value["success_count"], 2);
    }

    #[test]
    fn test_job_view_partitions_history() {
        let job = BulkJob::start(BulkJobRequest {
            subject: "Hi".into(),
            plain_body: "Body".into(),
            html_body: Some("<p>Body</p>".into()),
            recipients: vec!["zed@x.com".into()],
            ..BulkJobRequest::default()
        });
        let summary = BulkJobSummary::from_outcomes(&job, "s@x.com", &outcomes());
        let view = BulkJobView::from(BulkJobRecord { summary, outcomes: outcomes() });

        assert_eq!(view.sent_emails, vec!["zed@x.com", "mia@x.com"]);
        assert_eq!(view.failed_emails, vec![FailedEmail { email: "amy@x.com".into(), error: "550 no such user".into() }]);
        assert_eq!(view.content_html.as_deref(), Some("<p>Body</p>"));
        assert!(time::OffsetDateTime::parse(&view.sent_time, &Rfc3339).is_ok());
    }
}
