use chrono::Duration;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// How a notification kind is delivered once it reaches the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryStrategy {
    /// Rendered and sent as soon as the event is consumed
    Immediate,
    /// Sent to the configured admin address, bypassing user preferences
    Admin,
    /// Accumulated per user and flushed once the oldest event ages out
    Batch,
    /// Rendered from aggregated activity over a reporting window
    Summary,
    /// Reserved strategy with no bound queue; refused at publish time
    Backoff,
}

/// Closed set of notification event kinds
///
/// Each kind carries a fixed delivery strategy and payload schema. The wire
/// name is the SCREAMING_SNAKE_CASE variant name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// An agent execution finished
    AgentRun,
    /// A submitted agent passed review
    AgentApproved,
    /// The user's balance reached zero
    ZeroBalance,
    /// The user's balance dropped below the refill threshold
    LowBalance,
    /// A single block inside a graph execution failed
    BlockExecutionFailed,
    /// An agent keeps failing across consecutive executions
    ContinuousAgentError,
    /// Daily activity summary
    DailySummary,
    /// Weekly activity summary
    WeeklySummary,
    /// A user asked for a refund
    RefundRequest,
    /// A refund was processed
    RefundProcessed,
}

impl NotificationType {
    /// Returns the delivery strategy for this kind
    #[must_use]
    pub const fn strategy(self) -> DeliveryStrategy {
        match self {
            Self::AgentRun | Self::AgentApproved => DeliveryStrategy::Immediate,
            Self::ZeroBalance => DeliveryStrategy::Backoff,
            Self::LowBalance | Self::BlockExecutionFailed | Self::ContinuousAgentError => {
                DeliveryStrategy::Batch
            }
            Self::DailySummary | Self::WeeklySummary => DeliveryStrategy::Summary,
            Self::RefundRequest | Self::RefundProcessed => DeliveryStrategy::Admin,
        }
    }

    /// Returns how long a batch of this kind may coalesce before the oldest
    /// event forces a flush
    ///
    /// `None` for kinds that are not batched.
    #[must_use]
    pub fn batch_delay(self) -> Option<Duration> {
        match self {
            Self::LowBalance | Self::ContinuousAgentError => Some(Duration::minutes(60)),
            Self::BlockExecutionFailed => Some(Duration::minutes(30)),
            _ => None,
        }
    }

    /// Whether events of this kind carry summary window params on the wire
    #[must_use]
    pub const fn is_summary(self) -> bool {
        matches!(self.strategy(), DeliveryStrategy::Summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    #[test]
    fn wire_names_are_screaming_snake_case() {
        assert_eq!(NotificationType::AgentRun.to_string(), "AGENT_RUN");
        assert_eq!(
            NotificationType::BlockExecutionFailed.to_string(),
            "BLOCK_EXECUTION_FAILED"
        );
        assert_eq!(
            serde_json::to_string(&NotificationType::WeeklySummary).unwrap(),
            "\"WEEKLY_SUMMARY\""
        );
    }

    #[test]
    fn strategy_tokens_are_lowercase() {
        assert_eq!(DeliveryStrategy::Immediate.to_string(), "immediate");
        assert_eq!(DeliveryStrategy::Backoff.to_string(), "backoff");
    }

    #[test]
    fn only_batch_kinds_have_a_delay() {
        for kind in NotificationType::iter() {
            assert_eq!(
                kind.batch_delay().is_some(),
                kind.strategy() == DeliveryStrategy::Batch,
                "batch delay presence mismatch for {kind}"
            );
        }
    }
}
