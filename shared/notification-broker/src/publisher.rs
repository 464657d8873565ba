//! Event producer
//!
//! Classifies events onto routing keys and publishes them to the
//! notifications exchange. Broker failures are captured into the returned
//! [`PublishResult`] rather than propagated; callers decide whether to
//! surface them.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use notification_types::{
    DeliveryStrategy, NotificationEvent, NotificationType, PublishResult, SummaryParamsEvent,
};

use crate::client::MessageBroker;
use crate::topology::routing_key;

/// Publishes notification events onto the broker
///
/// Safe for concurrent use from arbitrary tasks; the broker client
/// serializes channel access internally.
pub struct EventPublisher {
    broker: Arc<dyn MessageBroker>,
}

impl EventPublisher {
    /// Creates a publisher on top of the given broker
    #[must_use]
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self { broker }
    }

    /// Publishes a notification event under its kind's routing key
    pub async fn publish_event(&self, event: &NotificationEvent) -> PublishResult {
        debug!("Received request to queue {} for {}", event.kind, event.user_id);
        self.publish_payload(event.kind, event).await
    }

    /// Publishes a summary params event under its kind's routing key
    pub async fn publish_summary_params(&self, event: &SummaryParamsEvent) -> PublishResult {
        debug!(
            "Received request to queue scheduled {} for {}",
            event.kind, event.user_id
        );
        self.publish_payload(event.kind, event).await
    }

    async fn publish_payload<T: Serialize + Sync>(
        &self,
        kind: NotificationType,
        event: &T,
    ) -> PublishResult {
        // No queue binds the backoff pattern; publishing would silently
        // drop the message, so refuse it here instead.
        if kind.strategy() == DeliveryStrategy::Backoff {
            warn!("Refusing to queue {kind}: backoff strategy has no bound queue");
            return PublishResult::error(format!(
                "{kind} uses the backoff delivery strategy, which has no bound queue"
            ));
        }

        let routing_key = routing_key(kind);
        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to serialize {kind} event: {e}");
                return PublishResult::error(format!("failed to serialize event: {e}"));
            }
        };

        match self.broker.publish(&routing_key, &body).await {
            Ok(()) => PublishResult::ok(format!(
                "notification queued with routing key: {routing_key}"
            )),
            Err(e) => {
                error!("Error queueing notification: {e}");
                PublishResult::error(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBroker;
    use crate::topology::WorkQueue;
    use notification_types::{
        AgentRunData, NotificationData, SummaryParams, WeeklySummaryParams, ZeroBalanceData,
    };
    use pretty_assertions::assert_eq;

    fn agent_run_event() -> NotificationEvent {
        NotificationEvent::new(
            "u1",
            NotificationType::AgentRun,
            NotificationData::AgentRun(AgentRunData {
                agent_name: "Scraper".to_string(),
                credits_used: 2.0,
                execution_time: 3.5,
                node_count: 7,
                graph_id: "g-1".to_string(),
                outputs: vec![],
            }),
        )
    }

    #[tokio::test]
    async fn events_land_on_the_queue_their_strategy_binds() {
        let broker = Arc::new(InMemoryBroker::new());
        let publisher = EventPublisher::new(broker.clone());

        let result = publisher.publish_event(&agent_run_event()).await;
        assert!(result.success, "unexpected failure: {}", result.message);
        assert!(result
            .message
            .contains("notification.immediate.AGENT_RUN"));
        assert_eq!(broker.queue_depth(WorkQueue::Immediate), 1);
        assert_eq!(broker.queue_depth(WorkQueue::Batch), 0);
    }

    #[tokio::test]
    async fn summary_params_events_land_on_the_summary_queue() {
        let broker = Arc::new(InMemoryBroker::new());
        let publisher = EventPublisher::new(broker.clone());

        let event = SummaryParamsEvent::new(
            "u2",
            SummaryParams::Weekly(WeeklySummaryParams {
                start_date: "2025-02-01T00:00:00Z".parse().unwrap(),
                end_date: "2025-02-08T00:00:00Z".parse().unwrap(),
            }),
        );
        let result = publisher.publish_summary_params(&event).await;
        assert!(result.success);
        assert_eq!(broker.queue_depth(WorkQueue::Summary), 1);
    }

    #[tokio::test]
    async fn backoff_kinds_are_refused_at_publish_time() {
        let broker = Arc::new(InMemoryBroker::new());
        let publisher = EventPublisher::new(broker.clone());

        let event = NotificationEvent::new(
            "u3",
            NotificationType::ZeroBalance,
            NotificationData::ZeroBalance(ZeroBalanceData {
                last_transaction: 1.0,
                last_transaction_time: chrono::Utc::now(),
                top_up_link: "https://example.com/top-up".to_string(),
            }),
        );

        let result = publisher.publish_event(&event).await;
        assert!(!result.success);
        for queue in WorkQueue::ALL {
            assert_eq!(broker.queue_depth(queue), 0);
        }
    }
}
