use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("No sender credential configured")]
    NotConfigured,
    #[error("Relay rejected the sender credential: {0}")]
    RelayAuth(String),
    #[error("Relay unavailable: {0}")]
    RelayUnavailable(String),
    #[error("Invalid spreadsheet: {0}")]
    InvalidSpreadsheet(String),
    #[error("No valid email addresses found in the file")]
    NoRecipients,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal server error")]
    Internal,
    #[error("Internal server error: {0}")]
    InternalMsg(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            Self::NotConfigured => {
                tracing::debug!("Send attempted without a configured sender");
                (StatusCode::PRECONDITION_FAILED, "Email not configured. Verify a sender account first".to_string())
            }
            Self::RelayAuth(reason) => {
                tracing::warn!(reason = %reason, "Relay authentication failed");
                (StatusCode::UNAUTHORIZED, format!("Authentication failed: {reason}"))
            }
            Self::RelayUnavailable(reason) => {
                tracing::warn!(reason = %reason, "Relay unavailable");
                (StatusCode::FAILED_DEPENDENCY, format!("Mail relay unavailable: {reason}"))
            }
            Self::InvalidSpreadsheet(reason) => {
                tracing::debug!(reason = %reason, "Spreadsheet rejected");
                (StatusCode::BAD_REQUEST, format!("Error reading file: {reason}"))
            }
            Self::NoRecipients => {
                tracing::debug!("Spreadsheet contained no usable addresses");
                (StatusCode::BAD_REQUEST, "No valid email addresses found in the file".to_string())
            }
            Self::BadRequest(msg) => {
                tracing::debug!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, msg)
            }
            Self::Internal => {
                tracing::error!("Internal server error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            Self::InternalMsg(msg) => {
                tracing::error!(message = %msg, "Internal server error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "success": false,
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_never_ran_errors_are_client_errors() {
        let cases = [
            AppError::NotConfigured,
            AppError::RelayAuth("535 bad credentials".into()),
            AppError::RelayUnavailable("connection refused".into()),
            AppError::InvalidSpreadsheet("not a workbook".into()),
            AppError::NoRecipients,
            AppError::BadRequest("missing subject".into()),
        ];

        for err in cases {
            let status = err.into_response().status();
            assert!(status.is_client_error(), "expected 4xx, got {status}");
        }
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let response = AppError::InternalMsg("pool exhausted on node 3".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
