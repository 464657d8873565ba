use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::kind::NotificationType;
use crate::summary::{DailySummaryData, SummaryData, SummaryParams, WeeklySummaryData};

/// Errors produced while decoding a broker message into an event
#[derive(Error, Debug)]
pub enum EventParseError {
    /// The payload is not valid JSON or the envelope fields are missing
    #[error("malformed notification payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The `data` object does not match the schema selected by `type`
    #[error("payload for {kind} does not match its schema: {source}")]
    Schema {
        /// Kind named by the envelope
        kind: NotificationType,
        /// Underlying decode failure
        source: serde_json::Error,
    },

    /// A summary handler received a kind that carries no window params
    #[error("{kind} does not carry summary window params")]
    NotSummary {
        /// Offending kind
        kind: NotificationType,
    },
}

/// First parse phase: envelope fields with the payload left opaque
///
/// Splitting the parse keeps the error path uniform; the payload schema is
/// only selected once the `type` field is known.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    /// Target user
    pub user_id: String,
    /// Event kind, selecting the payload schema
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Raw payload, decoded in the second phase
    pub data: Value,
    /// Publish timestamp, RFC3339 UTC; stamped at decode time when the
    /// producer caller omitted it
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Decodes the envelope from a raw broker payload
    ///
    /// # Errors
    ///
    /// Returns [`EventParseError::Malformed`] if the payload is not valid
    /// JSON or envelope fields are absent.
    pub fn from_json(payload: &str) -> Result<Self, EventParseError> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Payload of an [`AgentRun`](NotificationType::AgentRun) event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunData {
    /// Display name of the executed agent
    pub agent_name: String,
    /// Credits consumed by the run
    pub credits_used: f64,
    /// Wall-clock execution time in seconds
    pub execution_time: f64,
    /// Number of graph nodes executed
    pub node_count: u64,
    /// Graph the run belongs to
    pub graph_id: String,
    /// Output values produced by the run
    #[serde(default)]
    pub outputs: Vec<Value>,
}

/// Payload of an [`AgentApproved`](NotificationType::AgentApproved) event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentApprovalData {
    /// Display name of the approved agent
    pub agent_name: String,
    /// Store listing identifier
    pub agent_id: String,
    /// Optional reviewer comments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// Payload of a [`ZeroBalance`](NotificationType::ZeroBalance) event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroBalanceData {
    /// Amount of the last transaction before the balance ran out
    pub last_transaction: f64,
    /// When that transaction happened
    pub last_transaction_time: DateTime<Utc>,
    /// Link the user can follow to top up
    pub top_up_link: String,
}

/// Payload of a [`LowBalance`](NotificationType::LowBalance) event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowBalanceData {
    /// Balance remaining after the triggering charge
    pub current_balance: f64,
    /// Credits short of the configured threshold
    pub shortfall: f64,
    /// Link to the billing page
    pub billing_page_link: String,
}

/// Payload of a [`BlockExecutionFailed`](NotificationType::BlockExecutionFailed) event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockExecutionFailedData {
    /// Display name of the failed block
    pub block_name: String,
    /// Block identifier
    pub block_id: String,
    /// Error surfaced by the block
    pub error_message: String,
    /// Graph the block belongs to
    pub graph_id: String,
    /// Node within the graph
    pub node_id: String,
    /// Execution in which the failure occurred
    pub execution_id: String,
}

/// Payload of a [`ContinuousAgentError`](NotificationType::ContinuousAgentError) event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuousAgentErrorData {
    /// Display name of the failing agent
    pub agent_name: String,
    /// Most recent error message
    pub error_message: String,
    /// Graph the agent runs
    pub graph_id: String,
    /// Execution that tripped the alert
    pub execution_id: String,
    /// When the failing streak started
    pub start_time: DateTime<Utc>,
    /// When the latest failure happened
    pub error_time: DateTime<Utc>,
    /// Consecutive failed attempts
    pub attempts: u32,
}

/// Payload of refund events, sent to the admin address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequestData {
    /// User the refund concerns
    pub user_id: String,
    /// Display name of that user
    pub user_name: String,
    /// Email of that user
    pub user_email: String,
    /// Transaction being refunded
    pub transaction_id: String,
    /// Refund request identifier
    pub refund_request_id: String,
    /// Reason given by the user
    pub reason: String,
    /// Refund amount
    pub amount: f64,
    /// User balance at request time
    pub balance: f64,
}

/// Event payload, tagged externally by the envelope `type` field
///
/// Serializes as the bare payload object; deserialization always goes
/// through [`NotificationData::from_value`] with the kind already known.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NotificationData {
    /// `AGENT_RUN`
    AgentRun(AgentRunData),
    /// `AGENT_APPROVED`
    AgentApproved(AgentApprovalData),
    /// `ZERO_BALANCE`
    ZeroBalance(ZeroBalanceData),
    /// `LOW_BALANCE`
    LowBalance(LowBalanceData),
    /// `BLOCK_EXECUTION_FAILED`
    BlockExecutionFailed(BlockExecutionFailedData),
    /// `CONTINUOUS_AGENT_ERROR`
    ContinuousAgentError(ContinuousAgentErrorData),
    /// Rendered `DAILY_SUMMARY`
    DailySummary(DailySummaryData),
    /// Rendered `WEEKLY_SUMMARY`
    WeeklySummary(WeeklySummaryData),
    /// `REFUND_REQUEST` and `REFUND_PROCESSED`
    Refund(RefundRequestData),
}

impl NotificationData {
    /// Second parse phase: decodes a raw payload against the schema the
    /// given kind selects
    ///
    /// Summary kinds decode into their rendered aggregate form; this is the
    /// shape stored in batches and handed to templates, not the wire params.
    ///
    /// # Errors
    ///
    /// Returns [`EventParseError::Schema`] when the value does not match the
    /// kind's schema.
    pub fn from_value(kind: NotificationType, value: Value) -> Result<Self, EventParseError> {
        let schema_err = |source| EventParseError::Schema { kind, source };
        let data = match kind {
            NotificationType::AgentRun => {
                Self::AgentRun(serde_json::from_value(value).map_err(schema_err)?)
            }
            NotificationType::AgentApproved => {
                Self::AgentApproved(serde_json::from_value(value).map_err(schema_err)?)
            }
            NotificationType::ZeroBalance => {
                Self::ZeroBalance(serde_json::from_value(value).map_err(schema_err)?)
            }
            NotificationType::LowBalance => {
                Self::LowBalance(serde_json::from_value(value).map_err(schema_err)?)
            }
            NotificationType::BlockExecutionFailed => {
                Self::BlockExecutionFailed(serde_json::from_value(value).map_err(schema_err)?)
            }
            NotificationType::ContinuousAgentError => {
                Self::ContinuousAgentError(serde_json::from_value(value).map_err(schema_err)?)
            }
            NotificationType::DailySummary => {
                Self::DailySummary(serde_json::from_value(value).map_err(schema_err)?)
            }
            NotificationType::WeeklySummary => {
                Self::WeeklySummary(serde_json::from_value(value).map_err(schema_err)?)
            }
            NotificationType::RefundRequest | NotificationType::RefundProcessed => {
                Self::Refund(serde_json::from_value(value).map_err(schema_err)?)
            }
        };
        Ok(data)
    }
}

impl From<SummaryData> for NotificationData {
    fn from(data: SummaryData) -> Self {
        match data {
            SummaryData::Daily(daily) => Self::DailySummary(daily),
            SummaryData::Weekly(weekly) => Self::WeeklySummary(weekly),
        }
    }
}

/// A fully validated notification event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEvent {
    /// Target user
    pub user_id: String,
    /// Event kind
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Payload, schema fixed by `kind`
    pub data: NotificationData,
    /// Publish timestamp, RFC3339 UTC
    pub created_at: DateTime<Utc>,
}

impl NotificationEvent {
    /// Creates an event stamped with the current time
    #[must_use]
    pub fn new(user_id: impl Into<String>, kind: NotificationType, data: NotificationData) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            data,
            created_at: Utc::now(),
        }
    }

    /// Decodes a broker payload in two phases: envelope first, then the
    /// payload schema selected by the envelope's `type`
    ///
    /// # Errors
    ///
    /// Returns [`EventParseError`] if either phase fails.
    pub fn from_json(payload: &str) -> Result<Self, EventParseError> {
        let envelope = EventEnvelope::from_json(payload)?;
        Self::from_envelope(envelope)
    }

    /// Validates an already-decoded envelope into a full event
    ///
    /// # Errors
    ///
    /// Returns [`EventParseError::Schema`] when the payload does not match
    /// the envelope kind.
    pub fn from_envelope(envelope: EventEnvelope) -> Result<Self, EventParseError> {
        let data = NotificationData::from_value(envelope.kind, envelope.data)?;
        Ok(Self {
            user_id: envelope.user_id,
            kind: envelope.kind,
            data,
            created_at: envelope.created_at,
        })
    }
}

/// A summary-strategy event whose payload is the reporting window, not the
/// rendered aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryParamsEvent {
    /// Target user
    pub user_id: String,
    /// Summary kind
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Reporting window parameters
    pub data: SummaryParams,
    /// Publish timestamp, RFC3339 UTC
    pub created_at: DateTime<Utc>,
}

impl SummaryParamsEvent {
    /// Creates a params event stamped with the current time
    #[must_use]
    pub fn new(user_id: impl Into<String>, params: SummaryParams) -> Self {
        Self {
            user_id: user_id.into(),
            kind: params.kind(),
            data: params,
            created_at: Utc::now(),
        }
    }

    /// Decodes a summary queue payload: envelope first, then the params
    /// schema selected by the kind
    ///
    /// # Errors
    ///
    /// Returns [`EventParseError::NotSummary`] for kinds without window
    /// params, or a parse error from either phase.
    pub fn from_json(payload: &str) -> Result<Self, EventParseError> {
        let envelope = EventEnvelope::from_json(payload)?;
        let params = SummaryParams::from_value(envelope.kind, envelope.data)?;
        Ok(Self {
            user_id: envelope.user_id,
            kind: envelope.kind,
            data: params,
            created_at: envelope.created_at,
        })
    }
}

/// Data handed to the template renderer of the email sender
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TemplateData {
    /// A single rendered event
    Event(NotificationEvent),
    /// All events of a flushed batch, oldest first
    Batch(Vec<NotificationEvent>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn agent_run_payload() -> String {
        json!({
            "user_id": "u1",
            "type": "AGENT_RUN",
            "data": {
                "agent_name": "Scraper",
                "credits_used": 1.5,
                "execution_time": 12.0,
                "node_count": 4,
                "graph_id": "g-1",
                "outputs": []
            },
            "created_at": "2025-01-01T00:00:00Z"
        })
        .to_string()
    }

    #[test]
    fn two_phase_parse_round_trips() {
        let event = NotificationEvent::from_json(&agent_run_payload()).unwrap();
        assert_eq!(event.user_id, "u1");
        assert_eq!(event.kind, NotificationType::AgentRun);
        match &event.data {
            NotificationData::AgentRun(data) => assert_eq!(data.agent_name, "Scraper"),
            other => panic!("unexpected payload variant: {other:?}"),
        }

        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["type"], "AGENT_RUN");
        assert_eq!(wire["data"]["graph_id"], "g-1");
        assert_eq!(wire["created_at"], "2025-01-01T00:00:00Z");
    }

    #[test]
    fn envelope_rejects_malformed_json() {
        assert!(matches!(
            NotificationEvent::from_json("{"),
            Err(EventParseError::Malformed(_))
        ));
    }

    #[test]
    fn schema_mismatch_names_the_kind() {
        let payload = json!({
            "user_id": "u1",
            "type": "AGENT_RUN",
            "data": { "bogus": true },
            "created_at": "2025-01-01T00:00:00Z"
        })
        .to_string();

        match NotificationEvent::from_json(&payload) {
            Err(EventParseError::Schema { kind, .. }) => {
                assert_eq!(kind, NotificationType::AgentRun);
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn summary_params_parse_selects_window_shape() {
        let payload = json!({
            "user_id": "u2",
            "type": "WEEKLY_SUMMARY",
            "data": {
                "start_date": "2025-02-01T00:00:00Z",
                "end_date": "2025-02-08T00:00:00Z"
            },
            "created_at": "2025-02-08T00:00:00Z"
        })
        .to_string();

        let event = SummaryParamsEvent::from_json(&payload).unwrap();
        match event.data {
            SummaryParams::Weekly(ref params) => {
                assert_eq!(params.start_date.to_rfc3339(), "2025-02-01T00:00:00+00:00");
            }
            SummaryParams::Daily(_) => panic!("expected weekly params"),
        }
    }

    #[test]
    fn non_summary_kind_has_no_params_schema() {
        let payload = json!({
            "user_id": "u2",
            "type": "AGENT_RUN",
            "data": {},
            "created_at": "2025-02-08T00:00:00Z"
        })
        .to_string();

        assert!(matches!(
            SummaryParamsEvent::from_json(&payload),
            Err(EventParseError::NotSummary {
                kind: NotificationType::AgentRun
            })
        ));
    }
}
