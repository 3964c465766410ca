use crate::services::credential_service::VerifyOutcome;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub app_password: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub verify: bool,
    pub message: String,
}

impl From<VerifyOutcome> for VerifyResponse {
    fn from(outcome: VerifyOutcome) -> Self {
        Self { verify: outcome.verified, message: outcome.message }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub configured: bool,
    pub sender: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub status: &'static str,
}
