#![allow(dead_code)]

use async_trait::async_trait;
use bulkmail_server::adapters::credentials::CredentialStore;
use bulkmail_server::adapters::database::JobStore;
use bulkmail_server::adapters::smtp::{DeliveryError, MailSession, MailTransport, OutboundMessage, SessionError};
use bulkmail_server::api::MgmtState;
use bulkmail_server::config::Config;
use bulkmail_server::domain::credential::Credential;
use bulkmail_server::domain::job::{BulkJobRecord, BulkJobSummary, DeliveryOutcome};
use bulkmail_server::error::{AppError, Result};
use bulkmail_server::{AppBuilder, telemetry};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::watch;
use uuid::Uuid;

pub const SENDER: &str = "sender@example.com";

#[derive(Debug, Default)]
pub struct MemoryCredentials {
    inner: Mutex<Option<Credential>>,
}

impl MemoryCredentials {
    pub fn configured() -> Self {
        Self { inner: Mutex::new(Some(Credential::new(SENDER, "app-password").unwrap())) }
    }

    pub fn stored(&self) -> Option<Credential> {
        self.inner.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentials {
    async fn load(&self) -> Result<Option<Credential>> {
        Ok(self.stored())
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        *self.inner.lock().unwrap() = Some(credential.clone());
        Ok(())
    }
}

/// Relay double that accepts every message except those addressed to `rejected`.
#[derive(Debug, Default)]
pub struct RecordingRelay {
    pub rejected: HashSet<String>,
    pub refuse_login: bool,
    pub delivered: Arc<Mutex<Vec<OutboundMessage>>>,
    pub opens: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
}

impl RecordingRelay {
    pub fn rejecting(recipients: &[&str]) -> Self {
        Self { rejected: recipients.iter().map(ToString::to_string).collect(), ..Self::default() }
    }

    pub fn refusing_login() -> Self {
        Self { refuse_login: true, ..Self::default() }
    }

    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingRelay {
    async fn open(&self, _credential: &Credential) -> std::result::Result<Box<dyn MailSession>, SessionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.refuse_login {
            return Err(SessionError::Auth("535 5.7.8 Username and Password not accepted".into()));
        }
        Ok(Box::new(RecordingSession {
            rejected: self.rejected.clone(),
            delivered: Arc::clone(&self.delivered),
            closes: Arc::clone(&self.closes),
        }))
    }
}

struct RecordingSession {
    rejected: HashSet<String>,
    delivered: Arc<Mutex<Vec<OutboundMessage>>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl MailSession for RecordingSession {
    async fn deliver(&mut self, message: &OutboundMessage) -> std::result::Result<(), DeliveryError> {
        let to = message.envelope_recipients().into_iter().next().unwrap_or_default();
        if self.rejected.contains(&to) {
            return Err(DeliveryError::Rejected("550 5.1.1 user unknown".into()));
        }
        self.delivered.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn close(self: Box<Self>) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct MemoryJobs {
    jobs: Mutex<Vec<BulkJobRecord>>,
    pub broken: AtomicBool,
}

impl MemoryJobs {
    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

#[async_trait]
impl JobStore for MemoryJobs {
    async fn save(&self, summary: &BulkJobSummary, outcomes: &[DeliveryOutcome]) -> Result<Uuid> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        self.jobs.lock().unwrap().push(BulkJobRecord { summary: summary.clone(), outcomes: outcomes.to_vec() });
        Ok(summary.id)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<BulkJobRecord>> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut jobs = self.jobs.lock().unwrap().clone();
        jobs.reverse();
        jobs.truncate(usize::try_from(limit).unwrap());
        Ok(jobs)
    }

    async fn ping(&self) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

pub fn get_test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.mgmt_port = 0;
    config.delivery.pacing_ms = 0;
    config.delivery.deliver_timeout_secs = 5;
    config
}

pub struct TestApp {
    pub server_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub relay: Arc<RecordingRelay>,
    pub credentials: Arc<MemoryCredentials>,
    pub jobs: Arc<MemoryJobs>,
    pub shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(RecordingRelay::default(), MemoryCredentials::configured(), get_test_config()).await
    }

    pub async fn spawn_with(relay: RecordingRelay, credentials: MemoryCredentials, config: Config) -> Self {
        telemetry::init_test_telemetry();

        let relay = Arc::new(relay);
        let credentials = Arc::new(credentials);
        let jobs = Arc::new(MemoryJobs::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let app = AppBuilder::new(config.clone())
            .with_job_store(Arc::clone(&jobs) as Arc<dyn JobStore>)
            .with_credential_store(Arc::clone(&credentials) as Arc<dyn CredentialStore>)
            .with_transport(Arc::clone(&relay) as Arc<dyn MailTransport>)
            .with_shutdown_rx(shutdown_rx.clone())
            .build()
            .unwrap();

        let app_router = bulkmail_server::api::app_router(config, app.services);
        let mgmt_router = bulkmail_server::api::mgmt_router(MgmtState { health_service: app.health_service });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_url = format!("http://{}", listener.local_addr().unwrap());
        let mgmt_url = format!("http://{}", mgmt_listener.local_addr().unwrap());

        let mut api_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(listener, app_router)
                .with_graceful_shutdown(async move {
                    let _ = api_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });
        let mut mgmt_rx = shutdown_rx;
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt_router)
                .with_graceful_shutdown(async move {
                    let _ = mgmt_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        Self { server_url, mgmt_url, client: reqwest::Client::new(), relay, credentials, jobs, shutdown_tx }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }
}

pub fn spreadsheet(rows: &[&str]) -> reqwest::multipart::Part {
    let mut body = String::from("Email\n");
    for row in rows {
        body.push_str(row);
        body.push('\n');
    }
    reqwest::multipart::Part::bytes(body.into_bytes()).file_name("recipients.csv").mime_str("text/csv").unwrap()
}

pub fn bulk_form(rows: &[&str]) -> reqwest::multipart::Form {
    reqwest::multipart::Form::new()
        .part("file", spreadsheet(rows))
        .text("subject", "Quarterly update")
        .text("content", "Hello from the team")
}
