use serde::{Deserialize, Serialize};

/// Sender identity used to authenticate against the relay.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    address: String,
    secret: String,
}

impl Credential {
    /// Builds a credential from trimmed, non-empty parts.
    ///
    /// # Errors
    /// Returns a description of the offending field if either part is blank.
    pub fn new(address: impl Into<String>, secret: impl Into<String>) -> Result<Self, String> {
        let address = address.into().trim().to_string();
        let secret = secret.into();
        if address.is_empty() {
            return Err("Sender address cannot be empty".into());
        }
        if secret.trim().is_empty() {
            return Err("App password cannot be empty".into());
        }
        Ok(Self { address, secret })
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub(crate) fn is_complete(&self) -> bool {
        !self.address.trim().is_empty() && !self.secret.trim().is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential").field("address", &self.address).field("secret", &"<redacted>").finish()
    }
}
