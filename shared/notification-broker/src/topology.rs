//! Exchange and queue topology
//!
//! All producer traffic flows through the `notifications` topic exchange.
//! Each working queue binds one delivery strategy and forwards rejected
//! messages to the `dead_letter` exchange, which the failed queue drains
//! for operator inspection.

use notification_types::{DeliveryStrategy, NotificationType};

/// Topic exchange receiving all producer traffic
pub const NOTIFICATION_EXCHANGE: &str = "notifications";

/// Topic exchange receiving messages rejected without requeue
pub const DEAD_LETTER_EXCHANGE: &str = "dead_letter";

/// Queue bound to the dead-letter exchange with `failed.#`
pub const FAILED_QUEUE: &str = "failed_notifications";

/// The four working queues, one per routable delivery strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkQueue {
    /// `notification.immediate.#`
    Immediate,
    /// `notification.admin.#`
    Admin,
    /// `notification.batch.#`
    Batch,
    /// `notification.summary.#`
    Summary,
}

impl WorkQueue {
    /// Fixed polling order of the dispatcher
    pub const ALL: [Self; 4] = [Self::Immediate, Self::Admin, Self::Batch, Self::Summary];

    /// Broker-side queue name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Immediate => "immediate_notifications",
            Self::Admin => "admin_notifications",
            Self::Batch => "batch_notifications",
            Self::Summary => "summary_notifications",
        }
    }

    /// Binding pattern on the notifications exchange
    #[must_use]
    pub const fn binding_pattern(self) -> &'static str {
        match self {
            Self::Immediate => "notification.immediate.#",
            Self::Admin => "notification.admin.#",
            Self::Batch => "notification.batch.#",
            Self::Summary => "notification.summary.#",
        }
    }

    /// Routing key applied when the broker dead-letters a rejected message
    #[must_use]
    pub const fn dead_letter_routing_key(self) -> &'static str {
        match self {
            Self::Immediate => "failed.immediate",
            Self::Admin => "failed.admin",
            Self::Batch => "failed.batch",
            Self::Summary => "failed.summary",
        }
    }

    /// The strategy this queue serves
    #[must_use]
    pub const fn strategy(self) -> DeliveryStrategy {
        match self {
            Self::Immediate => DeliveryStrategy::Immediate,
            Self::Admin => DeliveryStrategy::Admin,
            Self::Batch => DeliveryStrategy::Batch,
            Self::Summary => DeliveryStrategy::Summary,
        }
    }
}

/// Routing key an event of the given kind is published under
///
/// Shape: `notification.<strategy>.<TYPE_NAME>`. Every strategy renders a
/// token, including `backoff`, which no queue binds.
#[must_use]
pub fn routing_key(kind: NotificationType) -> String {
    format!("notification.{}.{}", kind.strategy(), kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn routing_keys_carry_strategy_token_and_type_name() {
        assert_eq!(
            routing_key(NotificationType::AgentRun),
            "notification.immediate.AGENT_RUN"
        );
        assert_eq!(
            routing_key(NotificationType::LowBalance),
            "notification.batch.LOW_BALANCE"
        );
        assert_eq!(
            routing_key(NotificationType::WeeklySummary),
            "notification.summary.WEEKLY_SUMMARY"
        );
        assert_eq!(
            routing_key(NotificationType::RefundRequest),
            "notification.admin.REFUND_REQUEST"
        );
        assert_eq!(
            routing_key(NotificationType::ZeroBalance),
            "notification.backoff.ZERO_BALANCE"
        );
    }

    #[test]
    fn every_working_queue_binds_its_own_strategy() {
        for queue in WorkQueue::ALL {
            let token = queue.strategy().to_string();
            assert_eq!(
                queue.binding_pattern(),
                format!("notification.{token}.#"),
                "binding mismatch for {}",
                queue.name()
            );
            assert_eq!(queue.dead_letter_routing_key(), format!("failed.{token}"));
        }
    }
}
