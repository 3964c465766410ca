use crate::domain::credential::Credential;
use async_trait::async_trait;
use lettre::address::Envelope;
use thiserror::Error;

pub mod relay;

pub use relay::SmtpRelay;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("could not reach relay: {0}")]
    Connect(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The relay answered the transaction with an error reply.
    #[error("{0}")]
    Rejected(String),
    /// The connection failed underneath the transaction.
    #[error("transport error: {0}")]
    Transport(String),
}

/// A fully formatted message together with the addresses it is actually delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub envelope: Envelope,
    pub formatted: Vec<u8>,
}

impl OutboundMessage {
    #[must_use]
    pub fn envelope_recipients(&self) -> Vec<String> {
        self.envelope.to().iter().map(ToString::to_string).collect()
    }
}

/// Opens authenticated sessions against a relay.
#[async_trait]
pub trait MailTransport: Send + Sync + std::fmt::Debug {
    /// Connects, upgrades to TLS and authenticates with `credential`.
    ///
    /// # Errors
    /// Returns `SessionError::Auth` if the relay rejects the credential and
    /// `SessionError::Connect` if the relay cannot be reached or the TLS upgrade fails.
    async fn open(&self, credential: &Credential) -> Result<Box<dyn MailSession>, SessionError>;
}

/// One authenticated relay connection, reused for every message of a job.
#[async_trait]
pub trait MailSession: Send {
    /// Delivers one message to its envelope recipients. A failure leaves the session usable.
    ///
    /// # Errors
    /// Returns `DeliveryError` if the relay refuses the message or the connection fails.
    async fn deliver(&mut self, message: &OutboundMessage) -> Result<(), DeliveryError>;

    /// Ends the session. Errors while quitting are logged, not returned.
    async fn close(self: Box<Self>);
}
