use axum::{http::StatusCode, response::IntoResponse, routing::get, Extension, Json, Router};
use serde_json::json;
use tokio::sync::watch;

use crate::worker::DispatcherState;

/// Health check endpoint
///
/// Reports the dispatcher loop state; 503 once the loop has stopped.
async fn health(
    Extension(state): Extension<watch::Receiver<DispatcherState>>,
) -> impl IntoResponse {
    let dispatcher = *state.borrow();
    let status = if dispatcher == DispatcherState::Stopped {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "healthy" } else { "unhealthy" },
            "service": "notification-worker",
            "dispatcher": dispatcher.to_string(),
        })),
    )
}

/// Router exposing the health check
#[must_use]
pub fn router(dispatcher_state: watch::Receiver<DispatcherState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .layer(Extension(dispatcher_state))
}
