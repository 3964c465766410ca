use crate::api::MgmtState;
use crate::api::schemas::health::HealthResponse;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// Liveness probe: returns 200 OK as long as the server is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: checks that the job store is reachable.
pub async fn readyz(State(state): State<MgmtState>) -> impl IntoResponse {
    match state.health_service.check_store().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ok".into(), database: "ok".into() })),
        Err(e) => {
            tracing::warn!(error = %e, component = "database", "Readiness probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse { status: "error".into(), database: "error".into() }),
            )
        }
    }
}
