use super::handlers::{escrow, health, payments, projects};
use super::state::AppState;
use axum::Router;
use axum::http::{HeaderName, StatusCode};
use axum::routing::{get, patch, post};
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the full router with its middleware stack.
///
/// Used by `serve` and by the integration tests, so both exercise the same
/// layers: request id, tracing, timeout and panic recovery.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .route("/health", get(health::health_check))
        .route("/payments/intent", post(payments::create_intent))
        .route("/payments/webhook", post(payments::webhook))
        .route("/projects", post(projects::create))
        .route("/projects/{id}", get(projects::get_by_id))
        .route("/projects/{id}/complete", patch(projects::complete))
        .route("/projects/{id}/confirm", patch(projects::confirm))
        .route("/projects/{id}/cancel", patch(projects::cancel))
        .route("/escrow/balance", get(escrow::balance))
        .route("/escrow/withdraw", post(escrow::withdraw))
        .route("/escrow/withdrawals", get(escrow::withdrawals))
        .route("/escrow/withdrawals/{id}/review", patch(escrow::review))
        // Applied bottom-up.
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state)
}
