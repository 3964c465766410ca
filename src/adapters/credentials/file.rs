use crate::adapters::credentials::CredentialStore;
use crate::domain::credential::Credential;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Stores the credential as JSON in a single file, readable by the owner only.
///
/// The secret is not encrypted at rest.
#[derive(Clone, Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    #[tracing::instrument(level = "debug", skip(self), fields(path = %self.path.display()), err)]
    async fn load(&self) -> Result<Option<Credential>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::InternalMsg(format!("Failed to read credential file: {e}"))),
        };

        let credential: Credential = serde_json::from_slice(&raw)
            .map_err(|e| AppError::InternalMsg(format!("Credential file is corrupt: {e}")))?;

        if !credential.is_complete() {
            tracing::warn!("Ignoring incomplete credential file");
            return Ok(None);
        }
        Ok(Some(credential))
    }

    #[tracing::instrument(level = "debug", skip(self, credential), fields(path = %self.path.display()), err)]
    async fn save(&self, credential: &Credential) -> Result<()> {
        let raw = serde_json::to_vec_pretty(credential)
            .map_err(|e| AppError::InternalMsg(format!("Failed to encode credential: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::InternalMsg(format!("Failed to create credential directory: {e}")))?;
        }

        let staging = self.staging_path();
        tokio::fs::write(&staging, raw)
            .await
            .map_err(|e| AppError::InternalMsg(format!("Failed to write credential file: {e}")))?;
        restrict_permissions(&staging).await?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| AppError::InternalMsg(format!("Failed to replace credential file: {e}")))?;

        tracing::info!(sender = %credential.address(), "Sender credential stored");
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| AppError::InternalMsg(format!("Failed to restrict credential file permissions: {e}")))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
