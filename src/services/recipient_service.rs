use crate::adapters::spreadsheet::{self, ExtractError};
use crate::error::{AppError, Result};
use bytes::Bytes;
use opentelemetry::{KeyValue, global, metrics::Counter};

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) extractions_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter(crate::telemetry::SERVICE);
        Self {
            extractions_total: meter
                .u64_counter("bulkmail_recipient_extractions_total")
                .with_description("Spreadsheet uploads processed by result")
                .build(),
        }
    }
}

/// Turns uploaded spreadsheets into recipient lists off the async runtime.
#[derive(Clone, Debug)]
pub struct RecipientService {
    metrics: Metrics,
}

impl Default for RecipientService {
    fn default() -> Self {
        Self::new()
    }
}

impl RecipientService {
    #[must_use]
    pub fn new() -> Self {
        Self { metrics: Metrics::new() }
    }

    /// Extracts the recipient list from an uploaded file.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` for unsupported file types,
    /// `AppError::InvalidSpreadsheet` if the file cannot be parsed and
    /// `AppError::NoRecipients` if it holds no usable address.
    #[tracing::instrument(err(level = "debug"), skip(self, content), fields(bytes = content.len()))]
    pub async fn extract(&self, filename: &str, content: Bytes) -> Result<Vec<String>> {
        let name = filename.to_string();
        let result = tokio::task::spawn_blocking(move || spreadsheet::extract_recipients(&name, &content))
            .await
            .map_err(|_| AppError::Internal)?;

        let status = if result.is_ok() { "ok" } else { "rejected" };
        self.metrics.extractions_total.add(1, &[KeyValue::new("status", status)]);

        result.map_err(|e| match e {
            ExtractError::UnsupportedFormat => AppError::BadRequest(e.to_string()),
            ExtractError::Parse(reason) => AppError::InvalidSpreadsheet(reason),
            ExtractError::NoRecipients => AppError::NoRecipients,
        })
    }
}
