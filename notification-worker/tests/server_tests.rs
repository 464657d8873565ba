//! Service surface routing and payload validation

mod utils;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use notification_broker::WorkQueue;
use notification_types::{PublishResult, SweepReport};
use notification_worker::alerts::mock::RecordingAlertSink;
use notification_worker::alerts::AlertSink;
use notification_worker::server;
use pretty_assertions::assert_eq;
use tower::ServiceExt;
use utils::TestContext;

struct ServerContext {
    ctx: TestContext,
    alerts: Arc<RecordingAlertSink>,
    router: Router,
}

fn server_context() -> ServerContext {
    let ctx = TestContext::new();
    let alerts = Arc::new(RecordingAlertSink::new());
    let router = server::router(
        ctx.publisher.clone(),
        ctx.triggers.clone(),
        alerts.clone() as Arc<dyn AlertSink>,
        ctx.dispatcher.state(),
    );
    ServerContext {
        ctx,
        alerts,
        router,
    }
}

fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_dispatcher_state() {
    let server = server_context();

    let response = server
        .router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "notification-worker");
    assert_eq!(body["dispatcher"], "starting");
}

#[tokio::test]
async fn queue_notification_stamps_and_publishes_the_event() {
    let server = server_context();

    // Callers do not set created_at; it is stamped at publish time.
    let response = server
        .router
        .oneshot(json_post(
            "/v1/notifications",
            serde_json::json!({
                "user_id": "u1",
                "type": "AGENT_RUN",
                "data": {
                    "agent_name": "Scraper",
                    "credits_used": 1.0,
                    "execution_time": 2.0,
                    "node_count": 3,
                    "graph_id": "g-1"
                }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let result: PublishResult = body_json(response).await;
    assert!(result.success, "publish failed: {}", result.message);
    assert_eq!(server.ctx.broker.queue_depth(WorkQueue::Immediate), 1);
}

#[tokio::test]
async fn queue_notification_reports_schema_mismatches_in_the_result() {
    let server = server_context();

    let response = server
        .router
        .oneshot(json_post(
            "/v1/notifications",
            serde_json::json!({
                "user_id": "u1",
                "type": "AGENT_RUN",
                "data": { "bogus": true }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let result: PublishResult = body_json(response).await;
    assert!(!result.success);
    assert_eq!(server.ctx.broker.queue_depth(WorkQueue::Immediate), 0);
}

#[tokio::test]
async fn weekly_summary_trigger_is_accepted() {
    let server = server_context();

    let response = server
        .router
        .oneshot(json_post("/v1/summaries/weekly", serde_json::json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn sweep_returns_the_audit_record() {
    let server = server_context();

    let response = server
        .router
        .oneshot(json_post(
            "/v1/batches/sweep",
            serde_json::json!({ "notification_types": ["LOW_BALANCE"] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let report: SweepReport = body_json(response).await;
    assert!(report.success);
    assert_eq!(report.processed_count, 0);
}

#[tokio::test]
async fn alerts_are_forwarded_to_the_sink() {
    let server = server_context();

    let response = server
        .router
        .oneshot(json_post(
            "/v1/alerts",
            serde_json::json!({ "content": "queue depth is growing" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        server.alerts.alerts(),
        vec!["queue depth is growing".to_string()]
    );
}
