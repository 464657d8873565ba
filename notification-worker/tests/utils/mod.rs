#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use notification_broker::memory::InMemoryBroker;
use notification_broker::{EventPublisher, MessageBroker};
use notification_types::{
    AgentRunData, LowBalanceData, NotificationData, NotificationEvent, NotificationType,
    RefundRequestData, SummaryParams, SummaryParamsEvent, WeeklySummaryParams,
};
use notification_worker::email::mock::RecordingEmailSender;
use notification_worker::email::FrontendUnsubscribeLinks;
use notification_worker::store::mock::InMemoryStore;
use notification_worker::store::{NotificationStore, StoredNotification};
use notification_worker::worker::{DispatchConfig, Dispatcher, EventProcessor, ScheduledTriggers};

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const FRONTEND_URL: &str = "http://localhost:3000";

/// Dispatch pipeline wired over in-memory collaborators
pub struct TestContext {
    pub broker: Arc<InMemoryBroker>,
    pub store: Arc<InMemoryStore>,
    pub email: Arc<RecordingEmailSender>,
    pub publisher: Arc<EventPublisher>,
    pub processor: Arc<EventProcessor>,
    pub triggers: Arc<ScheduledTriggers>,
    pub dispatcher: Dispatcher,
    pub shutdown: CancellationToken,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: DispatchConfig) -> Self {
        // Initialize tracing for tests
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .try_init()
            .ok();

        let broker = Arc::new(InMemoryBroker::new());
        let store = Arc::new(InMemoryStore::new());
        let email = Arc::new(RecordingEmailSender::new());

        let processor = Arc::new(EventProcessor::new(
            store.clone() as Arc<dyn NotificationStore>,
            email.clone(),
            Arc::new(FrontendUnsubscribeLinks::new(FRONTEND_URL.to_string())),
            config.clone(),
        ));
        let publisher = Arc::new(EventPublisher::new(
            broker.clone() as Arc<dyn MessageBroker>,
        ));
        let triggers = Arc::new(ScheduledTriggers::new(
            store.clone() as Arc<dyn NotificationStore>,
            publisher.clone(),
            processor.clone(),
        ));

        let shutdown = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            broker.clone() as Arc<dyn MessageBroker>,
            processor.clone(),
            &config,
            shutdown.clone(),
        );

        Self {
            broker,
            store,
            email,
            publisher,
            processor,
            triggers,
            dispatcher,
            shutdown,
        }
    }

    /// Runs one dispatcher fairness round over all four queues
    pub async fn run_round(&self) {
        self.dispatcher.run_round().await;
    }

    /// Appends already-aged events straight into the store, the way a batch
    /// looks after its messages were rejected in an earlier round
    pub async fn seed_batch(&self, events: &[NotificationEvent]) {
        for event in events {
            let stored = StoredNotification {
                kind: event.kind,
                data: serde_json::to_value(&event.data).expect("payload serializes"),
                created_at: event.created_at,
            };
            self.store
                .append_to_batch(&event.user_id, event.kind, &stored)
                .await
                .expect("append to batch");
        }
    }
}

pub fn test_config() -> DispatchConfig {
    DispatchConfig {
        admin_email: ADMIN_EMAIL.to_string(),
        poll_timeout: std::time::Duration::from_secs(1),
        idle_sleep: std::time::Duration::from_millis(10),
        batch_delay_overrides: std::collections::HashMap::new(),
    }
}

pub fn unsub_link(user_id: &str) -> String {
    format!("{FRONTEND_URL}/unsubscribe?user_id={user_id}")
}

pub fn agent_run_event(user_id: &str, created_at: DateTime<Utc>) -> NotificationEvent {
    NotificationEvent {
        user_id: user_id.to_string(),
        kind: NotificationType::AgentRun,
        data: NotificationData::AgentRun(AgentRunData {
            agent_name: "Scraper".to_string(),
            credits_used: 1.5,
            execution_time: 12.0,
            node_count: 4,
            graph_id: "g-1".to_string(),
            outputs: vec![],
        }),
        created_at,
    }
}

pub fn low_balance_event(user_id: &str, created_at: DateTime<Utc>) -> NotificationEvent {
    NotificationEvent {
        user_id: user_id.to_string(),
        kind: NotificationType::LowBalance,
        data: NotificationData::LowBalance(LowBalanceData {
            current_balance: 3.0,
            shortfall: 7.0,
            billing_page_link: "https://platform.example.com/billing".to_string(),
        }),
        created_at,
    }
}

pub fn refund_request_event(user_id: &str) -> NotificationEvent {
    NotificationEvent {
        user_id: user_id.to_string(),
        kind: NotificationType::RefundRequest,
        data: NotificationData::Refund(RefundRequestData {
            user_id: user_id.to_string(),
            user_name: "Test User".to_string(),
            user_email: format!("{user_id}@x"),
            transaction_id: "tx-1".to_string(),
            refund_request_id: "rr-1".to_string(),
            reason: "unused credits".to_string(),
            amount: 10.0,
            balance: 2.5,
        }),
        created_at: Utc::now(),
    }
}

pub fn weekly_params_event(
    user_id: &str,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> SummaryParamsEvent {
    SummaryParamsEvent {
        user_id: user_id.to_string(),
        kind: NotificationType::WeeklySummary,
        data: SummaryParams::Weekly(WeeklySummaryParams {
            start_date,
            end_date,
        }),
        created_at: end_date,
    }
}
