use crate::adapters::database::JobStore;
use crate::adapters::smtp::{MailSession, MailTransport, SessionError};
use crate::config::DeliveryConfig;
use crate::domain::job::{BulkJob, BulkJobRequest, BulkJobSummary, BulkSendReport, DeliveryOutcome};
use crate::error::{AppError, Result};
use crate::services::credential_service::CredentialService;
use crate::services::message_builder::{build_message, parse_mailbox};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

pub(crate) const CANCELLED: &str = "delivery cancelled: server shutting down";
const STORE_WARNING: &str = "Emails were processed but the job could not be saved to history";

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) deliveries_total: Counter<u64>,
    pub(crate) jobs_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter(crate::telemetry::SERVICE);
        Self {
            deliveries_total: meter
                .u64_counter("bulkmail_deliveries_total")
                .with_description("Per-recipient delivery attempts by outcome")
                .build(),
            jobs_total: meter.u64_counter("bulkmail_jobs_total").with_description("Bulk jobs by result").build(),
        }
    }

    fn job(&self, result: &'static str) {
        self.jobs_total.add(1, &[KeyValue::new("result", result)]);
    }
}

/// Runs bulk jobs: one relay session per job, recipients in order, one outcome each.
#[derive(Clone, Debug)]
pub struct BulkSendService {
    credentials: CredentialService,
    transport: Arc<dyn MailTransport>,
    store: Arc<dyn JobStore>,
    config: DeliveryConfig,
    shutdown_rx: watch::Receiver<bool>,
    jobs: TaskTracker,
    metrics: Metrics,
}

impl BulkSendService {
    #[must_use]
    pub fn new(
        credentials: CredentialService,
        transport: Arc<dyn MailTransport>,
        store: Arc<dyn JobStore>,
        config: DeliveryConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self { credentials, transport, store, config, shutdown_rx, jobs: TaskTracker::new(), metrics: Metrics::new() }
    }

    /// Sends `request` to every recipient and records the outcomes.
    ///
    /// Individual delivery failures never abort the job; they are reported per recipient.
    /// A failure to record the job is reported through `store_warning`.
    /// The job runs on its own task: dropping the returned future only loses the report.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the request is incomplete,
    /// `AppError::NotConfigured` if no sender credential exists,
    /// `AppError::RelayAuth` if the relay rejects the credential and
    /// `AppError::RelayUnavailable` if no session can be opened.
    /// In each of these cases no recipient has been attempted.
    /// Returns `AppError::Internal` if the job task panicked.
    pub async fn send(&self, request: BulkJobRequest) -> Result<BulkSendReport> {
        let service = self.clone();
        let job = self.jobs.spawn(async move { service.run(request).await }.in_current_span());
        job.await.map_err(|e| {
            tracing::error!(error = %e, "Bulk job task failed");
            AppError::Internal
        })?
    }

    /// Waits until every job started so far has finished.
    pub async fn drain(&self) {
        let _ = self.jobs.close();
        self.jobs.wait().await;
    }

    #[tracing::instrument(
        err(level = "warn"),
        skip(self, request),
        fields(recipients = request.recipients.len(), job_id = tracing::field::Empty)
    )]
    async fn run(&self, request: BulkJobRequest) -> Result<BulkSendReport> {
        if let Err(e) = self.validate(&request) {
            self.metrics.job("invalid");
            return Err(e);
        }

        let credential = match self.credentials.load().await {
            Ok(credential) => credential,
            Err(e) => {
                self.metrics.job("not_configured");
                return Err(e);
            }
        };

        let job = BulkJob::start(request);
        tracing::Span::current().record("job_id", tracing::field::display(job.id));

        let open = timeout(Duration::from_secs(self.config.open_timeout_secs), self.transport.open(&credential));
        let mut session = match open.await {
            Ok(Ok(session)) => session,
            Ok(Err(SessionError::Auth(reason))) => {
                self.metrics.job("auth_failed");
                return Err(AppError::RelayAuth(reason));
            }
            Ok(Err(SessionError::Connect(reason))) => {
                self.metrics.job("relay_unavailable");
                return Err(AppError::RelayUnavailable(reason));
            }
            Err(_) => {
                self.metrics.job("relay_unavailable");
                return Err(AppError::RelayUnavailable("timed out opening relay session".into()));
            }
        };

        let (outcomes, cancelled) = self.deliver_all(session.as_mut(), &job, credential.address()).await;
        session.close().await;

        let summary = BulkJobSummary::from_outcomes(&job, credential.address(), &outcomes);
        let success_count = outcomes.iter().filter(|o| o.is_sent()).count();
        let failed_count = outcomes.len() - success_count;

        let (persisted, store_warning) = match self.store.save(&summary, &outcomes).await {
            Ok(_) => (true, None),
            Err(e) => {
                tracing::error!(error = %e, "Failed to record bulk job");
                (false, Some(STORE_WARNING.to_string()))
            }
        };

        self.metrics.job(if cancelled { "cancelled" } else { "completed" });
        tracing::info!(success_count, failed_count, persisted, cancelled, "Bulk job finished");

        Ok(BulkSendReport { job_id: job.id, outcomes, success_count, failed_count, persisted, store_warning, cancelled })
    }

    fn validate(&self, request: &BulkJobRequest) -> Result<()> {
        request.validate().map_err(AppError::BadRequest)?;
        if request.attachments.len() > self.config.max_attachments {
            return Err(AppError::BadRequest(format!(
                "At most {} attachments are allowed",
                self.config.max_attachments
            )));
        }
        for address in &request.cc {
            parse_mailbox("cc", address).map_err(|e| AppError::BadRequest(e.to_string()))?;
        }
        for address in &request.bcc {
            parse_mailbox("bcc", address).map_err(|e| AppError::BadRequest(e.to_string()))?;
        }
        Ok(())
    }

    async fn deliver_all(
        &self,
        session: &mut dyn MailSession,
        job: &BulkJob,
        sender: &str,
    ) -> (Vec<DeliveryOutcome>, bool) {
        let mut shutdown = self.shutdown_rx.clone();
        let recipients = &job.request.recipients;
        let mut outcomes = Vec::with_capacity(recipients.len());
        let mut cancelled = false;

        for (index, recipient) in recipients.iter().enumerate() {
            if !cancelled {
                cancelled = if index == 0 { *shutdown.borrow() } else { !self.pace(&mut shutdown).await };
                if cancelled {
                    tracing::warn!(remaining = recipients.len() - index, "Shutdown requested, abandoning bulk job");
                }
            }

            let outcome = if cancelled {
                DeliveryOutcome::failed(recipient, CANCELLED)
            } else {
                self.deliver_one(session, job, sender, recipient).await
            };

            let status = match (&outcome, cancelled) {
                (_, true) => "cancelled",
                (o, false) if o.is_sent() => "sent",
                _ => "failed",
            };
            self.metrics.deliveries_total.add(1, &[KeyValue::new("status", status)]);
            outcomes.push(outcome);
        }

        (outcomes, cancelled)
    }

    #[tracing::instrument(level = "debug", skip(self, session, job, sender))]
    async fn deliver_one(
        &self,
        session: &mut dyn MailSession,
        job: &BulkJob,
        sender: &str,
        recipient: &str,
    ) -> DeliveryOutcome {
        let message = match build_message(sender, job, recipient) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "Message could not be built");
                return DeliveryOutcome::failed(recipient, e.to_string());
            }
        };

        match timeout(Duration::from_secs(self.config.deliver_timeout_secs), session.deliver(&message)).await {
            Ok(Ok(())) => DeliveryOutcome::sent(recipient),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Delivery failed");
                DeliveryOutcome::failed(recipient, e.to_string())
            }
            Err(_) => DeliveryOutcome::failed(recipient, "delivery timed out"),
        }
    }

    /// Waits out the pacing delay. Returns `false` if shutdown was requested.
    async fn pace(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return false;
        }
        if self.config.pacing_ms == 0 {
            return true;
        }

        let sleep = tokio::time::sleep(Duration::from_millis(self.config.pacing_ms));
        tokio::pin!(sleep);
        let signalled = tokio::select! {
            () = &mut sleep => return true,
            changed = shutdown.wait_for(|&stop| stop) => changed.is_ok(),
        };
        if signalled {
            return false;
        }
        // Sender gone: nobody can request shutdown any more.
        sleep.await;
        true
    }
}
