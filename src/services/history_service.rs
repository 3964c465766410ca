use crate::adapters::database::JobStore;
use crate::domain::job::BulkJobRecord;
use crate::error::Result;
use std::sync::Arc;

const MAX_LIMIT: i64 = 50;

#[derive(Clone, Debug)]
pub struct HistoryService {
    store: Arc<dyn JobStore>,
    default_limit: i64,
}

impl HistoryService {
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, default_limit: i64) -> Self {
        Self { store, default_limit: default_limit.clamp(1, MAX_LIMIT) }
    }

    /// Lists the most recent bulk jobs with their per-recipient history.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the store cannot be read.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn recent(&self, limit: Option<i64>) -> Result<Vec<BulkJobRecord>> {
        let limit = limit.map_or(self.default_limit, |l| l.clamp(1, MAX_LIMIT));
        self.store.list_recent(limit).await
    }
}
