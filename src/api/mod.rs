use crate::config::Config;
use crate::services::bulk_send_service::BulkSendService;
use crate::services::credential_service::CredentialService;
use crate::services::health_service::HealthService;
use crate::services::history_service::HistoryService;
use crate::services::recipient_service::RecipientService;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, Request};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod bulk;
pub mod health;
pub mod middleware;
pub mod schemas;
pub mod verify;

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Config,
    pub credential_service: CredentialService,
    pub bulk_send_service: BulkSendService,
    pub history_service: HistoryService,
    pub recipient_service: RecipientService,
}

#[derive(Clone, Debug)]
pub struct MgmtState {
    pub health_service: HealthService,
}

#[derive(Debug)]
pub struct ServiceContainer {
    pub credential_service: CredentialService,
    pub bulk_send_service: BulkSendService,
    pub history_service: HistoryService,
    pub recipient_service: RecipientService,
}

/// Configures and returns the primary application router.
pub fn app_router(config: Config, services: ServiceContainer) -> Router {
    let body_limit = config.server.max_upload_bytes;
    let state = AppState {
        config,
        credential_service: services.credential_service,
        bulk_send_service: services.bulk_send_service,
        history_service: services.history_service,
        recipient_service: services.recipient_service,
    };

    Router::new()
        .route("/", get(verify::root))
        .route("/status", get(verify::status))
        .route("/verify", post(verify::verify))
        .route("/extract_recipients", post(bulk::extract_recipients))
        .route("/send_bulk", post(bulk::send_bulk))
        .route("/recent_bulk", get(bulk::recent_bulk))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(middleware::REQUEST_ID_HEADER)))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<tower_http::request_id::RequestId>()
                        .map(|id| id.header_value().to_str().unwrap_or_default())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        let status = response.status();
                        tracing::Span::current().record("http.response.status_code", status.as_u16());

                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %status.as_u16(),
                            "request completed"
                        );
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(middleware::REQUEST_ID_HEADER),
            middleware::MakeRequestUuid,
        ))
        .with_state(state)
}

pub fn mgmt_router(state: MgmtState) -> Router {
    Router::new().route("/livez", get(health::livez)).route("/readyz", get(health::readyz)).with_state(state)
}
