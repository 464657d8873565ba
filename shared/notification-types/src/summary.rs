use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::EventParseError;
use crate::kind::NotificationType;

/// Window parameters of a `DAILY_SUMMARY` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummaryParams {
    /// Day the summary covers; the window spans this instant plus one day
    pub date: DateTime<Utc>,
}

/// Window parameters of a `WEEKLY_SUMMARY` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySummaryParams {
    /// Window start, inclusive
    pub start_date: DateTime<Utc>,
    /// Window end, exclusive
    pub end_date: DateTime<Utc>,
}

/// Reporting window carried by a summary-strategy event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SummaryParams {
    /// `DAILY_SUMMARY` window
    Daily(DailySummaryParams),
    /// `WEEKLY_SUMMARY` window
    Weekly(WeeklySummaryParams),
}

impl SummaryParams {
    /// Decodes window params against the schema the given kind selects
    ///
    /// # Errors
    ///
    /// Returns [`EventParseError::NotSummary`] for kinds that carry no
    /// window params, or [`EventParseError::Schema`] on shape mismatch.
    pub fn from_value(kind: NotificationType, value: Value) -> Result<Self, EventParseError> {
        let schema_err = |source| EventParseError::Schema { kind, source };
        match kind {
            NotificationType::DailySummary => Ok(Self::Daily(
                serde_json::from_value(value).map_err(schema_err)?,
            )),
            NotificationType::WeeklySummary => Ok(Self::Weekly(
                serde_json::from_value(value).map_err(schema_err)?,
            )),
            other => Err(EventParseError::NotSummary { kind: other }),
        }
    }

    /// The kind this window shape belongs to
    #[must_use]
    pub const fn kind(&self) -> NotificationType {
        match self {
            Self::Daily(_) => NotificationType::DailySummary,
            Self::Weekly(_) => NotificationType::WeeklySummary,
        }
    }

    /// The half-open UTC interval the summary covers
    #[must_use]
    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            Self::Daily(params) => (params.date, params.date + chrono::Duration::days(1)),
            Self::Weekly(params) => (params.start_date, params.end_date),
        }
    }
}

/// Terminal status of a single agent execution, as recorded by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionOutcome {
    /// Execution finished successfully
    Completed,
    /// Execution failed
    Failed,
    /// Execution was terminated before finishing
    Terminated,
}

/// Aggregates rendered into a `DAILY_SUMMARY` email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummaryData {
    /// Credits spent inside the window
    pub total_credits_used: f64,
    /// Executions started inside the window
    pub total_executions: u64,
    /// Agent with the most executions, if any ran
    pub most_used_agent: String,
    /// Sum of execution times in seconds
    pub total_execution_time: f64,
    /// Executions that completed
    pub successful_runs: u64,
    /// Executions that did not complete
    pub failed_runs: u64,
    /// Mean execution time in seconds, 0 when nothing ran
    pub average_execution_time: f64,
    /// Credits spent per agent
    pub cost_breakdown: HashMap<String, f64>,
    /// Day the summary covers
    pub date: DateTime<Utc>,
}

/// Aggregates rendered into a `WEEKLY_SUMMARY` email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySummaryData {
    /// Credits spent inside the window
    pub total_credits_used: f64,
    /// Executions started inside the window
    pub total_executions: u64,
    /// Agent with the most executions, if any ran
    pub most_used_agent: String,
    /// Sum of execution times in seconds
    pub total_execution_time: f64,
    /// Executions that completed
    pub successful_runs: u64,
    /// Executions that did not complete
    pub failed_runs: u64,
    /// Mean execution time in seconds, 0 when nothing ran
    pub average_execution_time: f64,
    /// Credits spent per agent
    pub cost_breakdown: HashMap<String, f64>,
    /// Window start, inclusive
    pub start_date: DateTime<Utc>,
    /// Window end, exclusive
    pub end_date: DateTime<Utc>,
}

/// Rendered summary aggregate, daily or weekly
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SummaryData {
    /// Daily aggregate
    Daily(DailySummaryData),
    /// Weekly aggregate
    Weekly(WeeklySummaryData),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn daily_window_spans_one_day() {
        let date = "2025-03-01T00:00:00Z".parse().unwrap();
        let params = SummaryParams::Daily(DailySummaryParams { date });
        let (start, end) = params.window();
        assert_eq!(start, date);
        assert_eq!(end - start, chrono::Duration::days(1));
    }

    #[test]
    fn weekly_window_is_taken_verbatim() {
        let start_date = "2025-02-01T00:00:00Z".parse().unwrap();
        let end_date = "2025-02-08T00:00:00Z".parse().unwrap();
        let params = SummaryParams::Weekly(WeeklySummaryParams {
            start_date,
            end_date,
        });
        assert_eq!(params.window(), (start_date, end_date));
        assert_eq!(params.kind(), NotificationType::WeeklySummary);
    }
}
