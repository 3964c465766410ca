use crate::adapters::credentials::CredentialStore;
use crate::adapters::smtp::{MailTransport, SessionError};
use crate::config::{CredentialConfig, DeliveryConfig};
use crate::domain::credential::Credential;
use crate::error::{AppError, Result};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) verifications_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter(crate::telemetry::SERVICE);
        Self {
            verifications_total: meter
                .u64_counter("bulkmail_credential_verifications_total")
                .with_description("Sender credential verification attempts")
                .build(),
        }
    }
}

/// Result of a `/verify` call, reported to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub verified: bool,
    pub message: String,
}

impl VerifyOutcome {
    fn success(message: impl Into<String>) -> Self {
        Self { verified: true, message: message.into() }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self { verified: false, message: message.into() }
    }
}

/// Supplies the sender identity for bulk jobs and admits new identities after a relay login.
#[derive(Clone, Debug)]
pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn MailTransport>,
    fallback: Option<Credential>,
    open_timeout: Duration,
    metrics: Metrics,
}

impl CredentialService {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn MailTransport>,
        config: &CredentialConfig,
        delivery: &DeliveryConfig,
    ) -> Self {
        let fallback = match (&config.smtp_user, &config.smtp_password) {
            (Some(user), Some(password)) => Credential::new(user.as_str(), password.as_str()).ok(),
            _ => None,
        };
        Self {
            store,
            transport,
            fallback,
            open_timeout: Duration::from_secs(delivery.open_timeout_secs),
            metrics: Metrics::new(),
        }
    }

    async fn current(&self) -> Result<Option<Credential>> {
        if let Some(credential) = self.store.load().await? {
            return Ok(Some(credential));
        }
        Ok(self.fallback.clone())
    }

    /// Returns the credential bulk jobs authenticate with.
    ///
    /// # Errors
    /// Returns `AppError::NotConfigured` if no credential has been verified or configured.
    pub async fn load(&self) -> Result<Credential> {
        self.current().await?.ok_or(AppError::NotConfigured)
    }

    /// The configured sender address, if any. The secret never leaves this service.
    ///
    /// # Errors
    /// Returns `AppError::InternalMsg` if the credential store cannot be read.
    pub async fn status(&self) -> Result<Option<String>> {
        Ok(self.current().await?.map(|c| c.address().to_string()))
    }

    /// Logs into the relay with the given identity and stores it on success.
    ///
    /// An already configured sender short-circuits without contacting the relay.
    ///
    /// # Errors
    /// Returns `AppError::InternalMsg` if the credential store fails. Login failures are
    /// reported through the outcome.
    #[tracing::instrument(err(level = "warn"), skip(self, secret))]
    pub async fn verify(&self, address: &str, secret: &str) -> Result<VerifyOutcome> {
        if self.current().await?.is_some() {
            self.metrics.verifications_total.add(1, &[KeyValue::new("status", "already_configured")]);
            return Ok(VerifyOutcome::success("Email already configured"));
        }

        let credential = match Credential::new(address, secret) {
            Ok(credential) => credential,
            Err(reason) => {
                self.metrics.verifications_total.add(1, &[KeyValue::new("status", "invalid")]);
                return Ok(VerifyOutcome::failure(reason));
            }
        };

        let session = match timeout(self.open_timeout, self.transport.open(&credential)).await {
            Ok(Ok(session)) => session,
            Ok(Err(SessionError::Auth(reason))) => {
                tracing::info!(reason = %reason, "Relay rejected sender credential");
                self.metrics.verifications_total.add(1, &[KeyValue::new("status", "rejected")]);
                return Ok(VerifyOutcome::failure("Authentication failed: Invalid email or app password"));
            }
            Ok(Err(SessionError::Connect(reason))) => {
                self.metrics.verifications_total.add(1, &[KeyValue::new("status", "error")]);
                return Ok(VerifyOutcome::failure(format!("Error: {reason}")));
            }
            Err(_) => {
                self.metrics.verifications_total.add(1, &[KeyValue::new("status", "timeout")]);
                return Ok(VerifyOutcome::failure("Error: relay login timed out"));
            }
        };
        session.close().await;

        self.store.save(&credential).await?;
        self.metrics.verifications_total.add(1, &[KeyValue::new("status", "verified")]);
        tracing::info!(sender = %credential.address(), "Sender credential verified and stored");

        Ok(VerifyOutcome::success("Login successful"))
    }
}
