//! HTTP surface other services call to enqueue events and fire scheduled
//! jobs

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::error;

use notification_broker::EventPublisher;
use notification_types::{
    EventEnvelope, NotificationEvent, NotificationType, PublishResult, SummaryParams,
    SummaryParamsEvent, SweepReport,
};

use crate::alerts::AlertSink;
use crate::health;
use crate::worker::{DispatcherState, ScheduledTriggers};

#[derive(Debug, Deserialize)]
struct SweepRequest {
    notification_types: Vec<NotificationType>,
}

#[derive(Debug, Deserialize)]
struct AlertRequest {
    content: String,
}

/// Builds the service router
#[must_use]
pub fn router(
    publisher: Arc<EventPublisher>,
    triggers: Arc<ScheduledTriggers>,
    alerts: Arc<dyn AlertSink>,
    dispatcher_state: watch::Receiver<DispatcherState>,
) -> Router {
    Router::new()
        .route("/v1/notifications", post(queue_notification))
        .route("/v1/summaries/weekly", post(queue_weekly_summary))
        .route("/v1/batches/sweep", post(sweep_batches))
        .route("/v1/alerts", post(system_alert))
        .merge(health::router(dispatcher_state))
        .layer(Extension(publisher))
        .layer(Extension(triggers))
        .layer(Extension(alerts))
}

/// Validates and publishes one event
///
/// Summary kinds are validated against their window-params schema, every
/// other kind against its payload schema. Validation and broker failures
/// are reported in the result body, not as HTTP errors.
async fn queue_notification(
    Extension(publisher): Extension<Arc<EventPublisher>>,
    Json(envelope): Json<EventEnvelope>,
) -> Json<PublishResult> {
    let result = if envelope.kind.is_summary() {
        match SummaryParams::from_value(envelope.kind, envelope.data) {
            Ok(params) => {
                let event = SummaryParamsEvent {
                    user_id: envelope.user_id,
                    kind: envelope.kind,
                    data: params,
                    created_at: envelope.created_at,
                };
                publisher.publish_summary_params(&event).await
            }
            Err(e) => PublishResult::error(e.to_string()),
        }
    } else {
        match NotificationEvent::from_envelope(envelope) {
            Ok(event) => publisher.publish_event(&event).await,
            Err(e) => PublishResult::error(e.to_string()),
        }
    };

    Json(result)
}

/// Fire-and-forget weekly summary fan-out
async fn queue_weekly_summary(
    Extension(triggers): Extension<Arc<ScheduledTriggers>>,
) -> StatusCode {
    triggers.spawn_weekly_summary();
    StatusCode::ACCEPTED
}

/// Sweeps aged batches for the requested kinds and returns the audit record
async fn sweep_batches(
    Extension(triggers): Extension<Arc<ScheduledTriggers>>,
    Json(request): Json<SweepRequest>,
) -> Json<SweepReport> {
    Json(
        triggers
            .process_existing_batches(request.notification_types)
            .await,
    )
}

/// Forwards an operator alert to the out-of-band sink
async fn system_alert(
    Extension(alerts): Extension<Arc<dyn AlertSink>>,
    Json(request): Json<AlertRequest>,
) -> StatusCode {
    match alerts.send_alert(&request.content).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            error!("Failed to deliver system alert: {e}");
            StatusCode::BAD_GATEWAY
        }
    }
}

/// Starts the server on the given port
///
/// `PORT` overrides the port when set.
///
/// # Errors
///
/// Returns an error if the server fails to bind or serve
pub async fn start(
    port: u16,
    router: Router,
    shutdown_token: CancellationToken,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        [0, 0, 0, 0],
        std::env::var("PORT").map_or(Ok(port), |p| p.parse::<u16>())?,
    ));

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Notification dispatch service started on http://{addr}");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
        })
        .await
        .map_err(anyhow::Error::from)
}
