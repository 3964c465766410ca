use crate::api::AppState;
use crate::api::schemas::verify::{RootResponse, StatusResponse, VerifyRequest, VerifyResponse};
use crate::error::Result;
use axum::{Json, extract::State, response::IntoResponse};

/// Connectivity probe used by the web client.
pub async fn root() -> impl IntoResponse {
    Json(RootResponse { status: "ok" })
}

/// Reports whether a sender is configured, exposing only its address.
///
/// # Errors
/// Returns `AppError::InternalMsg` if the credential store cannot be read.
pub async fn status(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let sender = state.credential_service.status().await?;
    Ok(Json(StatusResponse { configured: sender.is_some(), sender }))
}

/// Logs into the relay with the submitted sender and stores it on success.
///
/// # Errors
/// Returns `AppError::InternalMsg` if the credential store fails.
pub async fn verify(State(state): State<AppState>, Json(payload): Json<VerifyRequest>) -> Result<impl IntoResponse> {
    let outcome = state.credential_service.verify(&payload.email, &payload.app_password).await?;
    Ok(Json(VerifyResponse::from(outcome)))
}
