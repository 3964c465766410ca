#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;

use crate::adapters::credentials::{CredentialStore, FileCredentialStore};
use crate::adapters::database::{DbPool, JobStore, PgJobStore};
use crate::adapters::smtp::{MailTransport, SmtpRelay};
use crate::api::ServiceContainer;
use crate::config::Config;
use crate::services::bulk_send_service::BulkSendService;
use crate::services::credential_service::CredentialService;
use crate::services::health_service::HealthService;
use crate::services::history_service::HistoryService;
use crate::services::recipient_service::RecipientService;
use std::sync::Arc;
use tokio::sync::watch;

/// Fully wired services, ready to be mounted on routers.
#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
}

/// Wires adapters into services. The job store is required; the credential store and the
/// relay transport default to the file store and the SMTP relay from `Config`.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    job_store: Option<Arc<dyn JobStore>>,
    credential_store: Option<Arc<dyn CredentialStore>>,
    transport: Option<Arc<dyn MailTransport>>,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, job_store: None, credential_store: None, transport: None, shutdown_rx: None }
    }

    #[must_use]
    pub fn with_database(self, pool: DbPool) -> Self {
        self.with_job_store(Arc::new(PgJobStore::new(pool)))
    }

    #[must_use]
    pub fn with_job_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.job_store = Some(store);
        self
    }

    #[must_use]
    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_shutdown_rx(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Builds every service.
    ///
    /// # Errors
    /// Returns an error if no job store was provided.
    pub fn build(self) -> anyhow::Result<App> {
        let config = self.config;
        let job_store = self.job_store.ok_or_else(|| anyhow::anyhow!("a job store is required"))?;
        let credential_store = self
            .credential_store
            .unwrap_or_else(|| Arc::new(FileCredentialStore::new(config.credentials.path.clone())) as Arc<dyn CredentialStore>);
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(SmtpRelay::new(config.relay.clone())) as Arc<dyn MailTransport>);
        let shutdown_rx = self.shutdown_rx.unwrap_or_else(|| watch::channel(false).1);

        let credential_service = CredentialService::new(
            credential_store,
            Arc::clone(&transport),
            &config.credentials,
            &config.delivery,
        );
        let bulk_send_service = BulkSendService::new(
            credential_service.clone(),
            transport,
            Arc::clone(&job_store),
            config.delivery.clone(),
            shutdown_rx,
        );
        let history_service = HistoryService::new(Arc::clone(&job_store), config.delivery.recent_jobs_limit);
        let health_service = HealthService::new(job_store, config.health.clone());

        Ok(App {
            services: ServiceContainer {
                credential_service,
                bulk_send_service,
                history_service,
                recipient_service: RecipientService::new(),
            },
            health_service,
        })
    }
}

/// Applies the embedded schema migrations.
///
/// # Errors
/// Returns `sqlx::migrate::MigrateError` if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!().run(pool).await
}

/// Flips the shutdown channel on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Routes panics through `tracing` before the default hook runs.
pub fn setup_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "Unhandled panic");
        default_hook(info);
    }));
}
