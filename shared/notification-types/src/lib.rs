//! Shared types for the notification dispatch pipeline
//!
//! This crate defines the notification kinds, their delivery strategies and
//! payload schemas, the wire-format event envelope, and the summary
//! aggregates shared between the producer and the dispatch worker.

#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    dead_code
)]

/// Event envelope and payload parsing
pub mod event;
/// Notification kinds and delivery strategies
pub mod kind;
/// User notification preferences
pub mod preferences;
/// Producer and sweep result records
pub mod result;
/// Summary window parameters and aggregates
pub mod summary;

pub use event::{
    AgentApprovalData, AgentRunData, BlockExecutionFailedData, ContinuousAgentErrorData,
    EventEnvelope, EventParseError, LowBalanceData, NotificationData, NotificationEvent,
    RefundRequestData, SummaryParamsEvent, TemplateData, ZeroBalanceData,
};
pub use kind::{DeliveryStrategy, NotificationType};
pub use preferences::NotificationPreferences;
pub use result::{PublishResult, SweepReport};
pub use summary::{
    DailySummaryData, DailySummaryParams, ExecutionOutcome, SummaryData, SummaryParams,
    WeeklySummaryData, WeeklySummaryParams,
};
