use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kind::NotificationType;

/// Outcome of a publish attempt, returned to producer callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    /// Whether the event reached the broker
    pub success: bool,
    /// Routing confirmation or error description
    pub message: String,
}

impl PublishResult {
    /// A successful publish
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// A failed publish; the error is captured, not propagated
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Audit record of a batch sweep run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Whether the sweep ran to completion
    pub success: bool,
    /// Aged batches flushed during the run
    pub processed_count: u64,
    /// Kinds the sweep covered
    pub notification_types: Vec<NotificationType>,
    /// When the sweep evaluated batch ages
    pub timestamp: DateTime<Utc>,
    /// Failure description when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
