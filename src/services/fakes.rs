//! In-memory stand-ins for the relay, the credential store and the job store.

use crate::adapters::credentials::CredentialStore;
use crate::adapters::database::JobStore;
use crate::adapters::smtp::{DeliveryError, MailSession, MailTransport, OutboundMessage, SessionError};
use crate::domain::credential::Credential;
use crate::domain::job::{BulkJobRecord, BulkJobSummary, DeliveryOutcome};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Default)]
pub(crate) struct MemoryCredentialStore {
    inner: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub(crate) fn with(credential: Credential) -> Self {
        Self { inner: Mutex::new(Some(credential)) }
    }

    pub(crate) fn stored(&self) -> Option<Credential> {
        self.inner.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credential>> {
        Ok(self.stored())
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        *self.inner.lock().unwrap() = Some(credential.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeTransport {
    open_error: Option<SessionError>,
    rejected: HashSet<String>,
    hanging: HashSet<String>,
    cancel_after: Option<(usize, Arc<watch::Sender<bool>>)>,
    delivered: Arc<Mutex<Vec<OutboundMessage>>>,
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub(crate) fn failing_open(error: SessionError) -> Self {
        Self { open_error: Some(error), ..Self::default() }
    }

    /// Deliveries addressed to `recipient` are refused with a 550 reply.
    pub(crate) fn rejecting(mut self, recipient: &str) -> Self {
        self.rejected.insert(recipient.to_string());
        self
    }

    /// Deliveries addressed to `recipient` never complete.
    pub(crate) fn hanging(mut self, recipient: &str) -> Self {
        self.hanging.insert(recipient.to_string());
        self
    }

    /// Raises the shutdown signal once `count` messages have been accepted.
    pub(crate) fn signalling_after(mut self, count: usize, shutdown: watch::Sender<bool>) -> Self {
        self.cancel_after = Some((count, Arc::new(shutdown)));
        self
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn delivered(&self) -> Vec<OutboundMessage> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn open(&self, _credential: &Credential) -> std::result::Result<Box<dyn MailSession>, SessionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }
        Ok(Box::new(FakeSession {
            rejected: self.rejected.clone(),
            hanging: self.hanging.clone(),
            cancel_after: self.cancel_after.clone(),
            delivered: Arc::clone(&self.delivered),
            closes: Arc::clone(&self.closes),
        }))
    }
}

struct FakeSession {
    rejected: HashSet<String>,
    hanging: HashSet<String>,
    cancel_after: Option<(usize, Arc<watch::Sender<bool>>)>,
    delivered: Arc<Mutex<Vec<OutboundMessage>>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl MailSession for FakeSession {
    async fn deliver(&mut self, message: &OutboundMessage) -> std::result::Result<(), DeliveryError> {
        let recipient = message.envelope_recipients().into_iter().next().unwrap_or_default();
        if self.hanging.contains(&recipient) {
            std::future::pending::<()>().await;
        }
        if self.rejected.contains(&recipient) {
            return Err(DeliveryError::Rejected("550 5.1.1 mailbox unavailable".into()));
        }

        let accepted = {
            let mut delivered = self.delivered.lock().unwrap();
            delivered.push(message.clone());
            delivered.len()
        };
        if let Some((count, shutdown)) = &self.cancel_after
            && accepted == *count
        {
            let _ = shutdown.send(true);
        }
        Ok(())
    }

    async fn close(self: Box<Self>) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub(crate) struct MemoryJobStore {
    jobs: Mutex<Vec<BulkJobRecord>>,
    failing: bool,
}

impl MemoryJobStore {
    pub(crate) fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    pub(crate) fn saved(&self) -> Vec<BulkJobRecord> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn save(&self, summary: &BulkJobSummary, outcomes: &[DeliveryOutcome]) -> Result<Uuid> {
        if self.failing {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        self.jobs.lock().unwrap().push(BulkJobRecord { summary: summary.clone(), outcomes: outcomes.to_vec() });
        Ok(summary.id)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<BulkJobRecord>> {
        let mut jobs = self.saved();
        jobs.sort_by(|a, b| b.summary.sent_at.cmp(&a.summary.sent_at));
        jobs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(jobs)
    }

    async fn ping(&self) -> Result<()> {
        if self.failing {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}
