use crate::domain::credential::Credential;
use crate::error::Result;
use async_trait::async_trait;

pub mod file;

pub use file::FileCredentialStore;

/// Persistent home of the configured sender credential.
#[async_trait]
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    /// Returns the stored credential, or `None` if none has been saved yet.
    async fn load(&self) -> Result<Option<Credential>>;

    /// Replaces the stored credential.
    async fn save(&self, credential: &Credential) -> Result<()>;
}
