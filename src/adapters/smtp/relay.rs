use crate::adapters::smtp::{DeliveryError, MailSession, MailTransport, OutboundMessage, SessionError};
use crate::config::RelayConfig;
use crate::domain::credential::Credential;
use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::Error as SmtpError;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use std::time::Duration;

const MECHANISMS: &[Mechanism] = &[Mechanism::Plain, Mechanism::Login];

/// Establishes authenticated relay connections for a session.
#[async_trait]
pub(crate) trait RelayConnector: Send + Sync + std::fmt::Debug + 'static {
    type Connection: RelayConnection;

    async fn connect(&self, credentials: &Credentials) -> Result<Self::Connection, SessionError>;
}

/// One live relay connection.
#[async_trait]
pub(crate) trait RelayConnection: Send + 'static {
    fn has_broken(&self) -> bool;

    async fn send(&mut self, envelope: &Envelope, email: &[u8]) -> Result<(), DeliveryError>;

    async fn quit(&mut self) -> Result<(), String>;
}

/// SMTP submission relay reached over STARTTLS.
#[derive(Clone, Debug)]
pub struct SmtpRelay {
    config: RelayConfig,
}

impl SmtpRelay {
    #[must_use]
    pub const fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    fn hello_name(&self) -> ClientId {
        self.config.hello_name.as_ref().map_or_else(ClientId::default, |name| ClientId::Domain(name.clone()))
    }
}

#[async_trait]
impl RelayConnector for SmtpRelay {
    type Connection = AsyncSmtpConnection;

    #[tracing::instrument(
        level = "debug",
        skip(self, credentials),
        fields(relay.host = %self.config.host, relay.port = self.config.port),
        err(level = "warn")
    )]
    async fn connect(&self, credentials: &Credentials) -> Result<AsyncSmtpConnection, SessionError> {
        let hello_name = self.hello_name();
        let tls =
            TlsParameters::new(self.config.host.clone()).map_err(|e| SessionError::Connect(e.to_string()))?;

        let mut conn = AsyncSmtpConnection::connect_tokio1(
            (self.config.host.as_str(), self.config.port),
            Some(Duration::from_secs(self.config.command_timeout_secs)),
            &hello_name,
            None,
            None,
        )
        .await
        .map_err(|e| SessionError::Connect(e.to_string()))?;

        if !conn.can_starttls() {
            let _ = conn.quit().await;
            return Err(SessionError::Connect("relay does not offer STARTTLS".into()));
        }
        conn.starttls(tls, &hello_name).await.map_err(|e| SessionError::Connect(e.to_string()))?;

        if let Err(e) = conn.auth(MECHANISMS, credentials).await {
            let _ = conn.quit().await;
            return Err(classify_auth_error(&e));
        }

        tracing::debug!("Relay session authenticated");
        Ok(conn)
    }
}

#[async_trait]
impl RelayConnection for AsyncSmtpConnection {
    fn has_broken(&self) -> bool {
        Self::has_broken(self)
    }

    async fn send(&mut self, envelope: &Envelope, email: &[u8]) -> Result<(), DeliveryError> {
        match Self::send(self, envelope, email).await {
            Ok(response) => {
                tracing::debug!(code = %response.code(), "Relay accepted message");
                Ok(())
            }
            Err(e) => Err(classify_send_error(&e)),
        }
    }

    async fn quit(&mut self) -> Result<(), String> {
        Self::quit(self).await.map(|_| ()).map_err(|e| e.to_string())
    }
}

fn classify_auth_error(e: &SmtpError) -> SessionError {
    if e.is_permanent() || e.is_client() {
        SessionError::Auth(e.to_string())
    } else {
        SessionError::Connect(e.to_string())
    }
}

fn classify_send_error(e: &SmtpError) -> DeliveryError {
    if e.is_permanent() || e.is_transient() {
        DeliveryError::Rejected(e.to_string())
    } else {
        DeliveryError::Transport(e.to_string())
    }
}

#[async_trait]
impl MailTransport for SmtpRelay {
    async fn open(&self, credential: &Credential) -> Result<Box<dyn MailSession>, SessionError> {
        Ok(Box::new(SmtpSession::open(self.clone(), credential).await?))
    }
}

/// A relay session that reconnects when the previous transaction left the connection unusable.
/// lettre aborts the connection whenever a transaction fails.
pub(crate) struct SmtpSession<C: RelayConnector> {
    connector: C,
    credentials: Credentials,
    connection: Option<C::Connection>,
    // Still set when a previous `deliver` future was dropped mid-transaction.
    in_flight: bool,
}

impl<C: RelayConnector> std::fmt::Debug for SmtpSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSession")
            .field("connector", &self.connector)
            .field("connected", &self.connection.is_some())
            .finish_non_exhaustive()
    }
}

impl<C: RelayConnector> SmtpSession<C> {
    pub(crate) async fn open(connector: C, credential: &Credential) -> Result<Self, SessionError> {
        let credentials = Credentials::new(credential.address().to_string(), credential.secret().to_string());
        let connection = connector.connect(&credentials).await?;
        Ok(Self { connector, credentials, connection: Some(connection), in_flight: false })
    }

    fn is_stale(&self) -> bool {
        self.in_flight || self.connection.as_ref().is_none_or(RelayConnection::has_broken)
    }

    async fn ensure_connected(&mut self) -> Result<(), DeliveryError> {
        if self.is_stale() {
            tracing::info!("Relay connection lost, re-establishing session");
            self.connection = None;
            self.in_flight = false;
            let conn =
                self.connector.connect(&self.credentials).await.map_err(|e| DeliveryError::Transport(e.to_string()))?;
            self.connection = Some(conn);
        }
        Ok(())
    }
}

#[async_trait]
impl<C: RelayConnector> MailSession for SmtpSession<C> {
    async fn deliver(&mut self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        self.ensure_connected().await?;
        self.in_flight = true;
        let Some(conn) = self.connection.as_mut() else {
            return Err(DeliveryError::Transport("no relay connection".into()));
        };
        let result = conn.send(&message.envelope, &message.formatted).await;
        self.in_flight = false;
        result
    }

    async fn close(mut self: Box<Self>) {
        let Some(mut conn) = self.connection.take() else {
            return;
        };
        if self.in_flight || conn.has_broken() {
            return;
        }
        if let Err(e) = conn.quit().await {
            tracing::warn!(error = %e, "Relay did not acknowledge QUIT");
        }
    }
}
