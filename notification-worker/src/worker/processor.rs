//! Per-queue event handlers
//!
//! Each handler decodes one broker message and reports a [`Disposition`].
//! Errors bubble to the dispatcher, which logs and rejects; a rejection
//! forwards the message to the dead-letter exchange. Ineligible recipients
//! are treated as processed, not as failures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use notification_types::{
    DailySummaryData, EventParseError, NotificationData, NotificationEvent, NotificationType,
    SummaryData, SummaryParams, SummaryParamsEvent, TemplateData, WeeklySummaryData,
};

use crate::email::{EmailError, EmailSender, UnsubscribeLinkGenerator};
use crate::store::{NotificationStore, StoreError, StoredNotification};
use crate::worker::config::DispatchConfig;

/// Result type alias for handler operations
pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// Error types for message handling
///
/// Every variant settles the message onto the dead-letter exchange.
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// Malformed payload or schema mismatch
    #[error(transparent)]
    Parse(#[from] EventParseError),

    /// The target user has no email address on record
    #[error("user email not found for user {0}")]
    MissingEmail(String),

    /// A store call failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The email service failed to take the message
    #[error(transparent)]
    Email(#[from] EmailError),

    /// A batch row exists but reports no oldest message
    #[error("batch for user {user_id} and kind {kind} has no oldest message")]
    BatchWithoutOldest {
        /// Owner of the batch
        user_id: String,
        /// Kind of the batch
        kind: NotificationType,
    },

    /// A batch disappeared or holds no valid events at flush time
    #[error("batch for user {user_id} and kind {kind} is missing or empty")]
    BatchMissing {
        /// Owner of the batch
        user_id: String,
        /// Kind of the batch
        kind: NotificationType,
    },
}

/// How the dispatcher should settle a handled message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Fully processed against the store; acknowledge
    Ack,
    /// Not processed; reject without requeue so the broker dead-letters it
    DeadLetter,
}

type FlushKey = (String, NotificationType);

/// Handles events fetched from the four working queues
pub struct EventProcessor {
    store: Arc<dyn NotificationStore>,
    email_sender: Arc<dyn EmailSender>,
    unsubscribe: Arc<dyn UnsubscribeLinkGenerator>,
    config: DispatchConfig,
    flush_locks: Mutex<HashMap<FlushKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl EventProcessor {
    /// Creates a processor over the given collaborators
    #[must_use]
    pub fn new(
        store: Arc<dyn NotificationStore>,
        email_sender: Arc<dyn EmailSender>,
        unsubscribe: Arc<dyn UnsubscribeLinkGenerator>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            email_sender,
            unsubscribe,
            config,
            flush_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Handles one message from the immediate queue
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError`] on parse, lookup, store, or send failure.
    pub async fn process_immediate(&self, payload: &str) -> ProcessorResult<Disposition> {
        let event = NotificationEvent::from_json(payload)?;
        debug!(
            "Processing immediate {} notification for user {}",
            event.kind, event.user_id
        );

        let recipient_email = self.require_email(&event.user_id).await?;
        if !self.should_email_user(&event.user_id, event.kind).await? {
            debug!(
                "User {} does not want to receive {} notifications",
                event.user_id, event.kind
            );
            return Ok(Disposition::Ack);
        }

        let unsub_link = self.unsubscribe.unsubscribe_link(&event.user_id);
        let kind = event.kind;
        self.email_sender
            .send_templated(
                kind,
                &recipient_email,
                &TemplateData::Event(event),
                Some(&unsub_link),
            )
            .await?;
        Ok(Disposition::Ack)
    }

    /// Handles one message from the admin queue
    ///
    /// Sends to the configured admin address; preferences, verification,
    /// and unsubscribe links do not apply.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError`] on parse or send failure.
    pub async fn process_admin(&self, payload: &str) -> ProcessorResult<Disposition> {
        let event = NotificationEvent::from_json(payload)?;
        debug!("Processing {} notification for admin", event.kind);

        let kind = event.kind;
        self.email_sender
            .send_templated(
                kind,
                &self.config.admin_email,
                &TemplateData::Event(event),
                None,
            )
            .await?;
        Ok(Disposition::Ack)
    }

    /// Handles one message from the batch queue
    ///
    /// The store is the source of truth for coalescing: the event is
    /// appended first, then the batch is flushed only if its oldest entry
    /// has aged out. A not-yet-aged batch dead-letters the message; the
    /// stored events wait for a later event or the sweep.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError`] on parse, lookup, store, or send failure,
    /// and on the oldest-message invariant violation.
    pub async fn process_batch(&self, payload: &str) -> ProcessorResult<Disposition> {
        let event = NotificationEvent::from_json(payload)?;
        info!(
            "Processing batch {} notification for user {}",
            event.kind, event.user_id
        );

        let recipient_email = self.require_email(&event.user_id).await?;
        if !self.should_email_user(&event.user_id, event.kind).await? {
            info!(
                "User {} does not want to receive {} notifications; clearing batch",
                event.user_id, event.kind
            );
            self.store.empty_batch(&event.user_id, event.kind).await?;
            return Ok(Disposition::Ack);
        }

        let user_id = event.user_id.clone();
        let kind = event.kind;
        let stored = StoredNotification {
            kind,
            data: serde_json::to_value(&event.data).map_err(EventParseError::Malformed)?,
            created_at: event.created_at,
        };

        let _guard = self.flush_lock(&user_id, kind).await;
        self.store.append_to_batch(&user_id, kind, &stored).await?;

        let Some(oldest) = self.store.batch_oldest(&user_id, kind).await? else {
            return Err(ProcessorError::BatchWithoutOldest { user_id, kind });
        };

        if !self.batch_aged_out(&oldest, kind, Utc::now()) {
            info!("Batch for user {user_id} and kind {kind} is not old enough to send");
            return Ok(Disposition::DeadLetter);
        }

        self.flush_batch(&user_id, kind, &recipient_email).await?;
        Ok(Disposition::Ack)
    }

    /// Handles one message from the summary queue
    ///
    /// The payload carries the reporting window; the aggregates are read
    /// from the store and rendered into a fresh event.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError`] on parse, lookup, store, or send failure.
    pub async fn process_summary(&self, payload: &str) -> ProcessorResult<Disposition> {
        let event = SummaryParamsEvent::from_json(payload)?;
        info!(
            "Processing {} notification for user {}",
            event.kind, event.user_id
        );

        let recipient_email = self.require_email(&event.user_id).await?;
        if !self.should_email_user(&event.user_id, event.kind).await? {
            info!(
                "User {} does not want to receive {} notifications",
                event.user_id, event.kind
            );
            return Ok(Disposition::Ack);
        }

        let summary = self.gather_summary(&event.user_id, &event.data).await?;
        let unsub_link = self.unsubscribe.unsubscribe_link(&event.user_id);
        let rendered = NotificationEvent::new(event.user_id, event.kind, summary.into());

        self.email_sender
            .send_templated(
                event.kind,
                &recipient_email,
                &TemplateData::Event(rendered),
                Some(&unsub_link),
            )
            .await?;
        Ok(Disposition::Ack)
    }

    /// Loads the batch, validates its events, sends one templated email
    /// with the full list, and empties the batch
    ///
    /// The batch is only emptied after the send succeeded, so a transport
    /// failure leaves the events in place for the next attempt. Stored
    /// entries that no longer validate are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::BatchMissing`] when no valid events
    /// remain, or a store or send failure.
    pub(crate) async fn flush_batch(
        &self,
        user_id: &str,
        kind: NotificationType,
        recipient_email: &str,
    ) -> ProcessorResult<()> {
        let batch = self
            .store
            .get_batch(user_id, kind)
            .await?
            .ok_or_else(|| ProcessorError::BatchMissing {
                user_id: user_id.to_string(),
                kind,
            })?;

        let events: Vec<NotificationEvent> = batch
            .notifications
            .into_iter()
            .filter_map(|stored| {
                match NotificationData::from_value(stored.kind, stored.data) {
                    Ok(data) => Some(NotificationEvent {
                        user_id: user_id.to_string(),
                        kind: stored.kind,
                        data,
                        created_at: stored.created_at,
                    }),
                    Err(e) => {
                        warn!("Skipping stored notification that no longer validates: {e}");
                        None
                    }
                }
            })
            .collect();

        if events.is_empty() {
            return Err(ProcessorError::BatchMissing {
                user_id: user_id.to_string(),
                kind,
            });
        }

        let unsub_link = self.unsubscribe.unsubscribe_link(user_id);
        self.email_sender
            .send_templated(
                kind,
                recipient_email,
                &TemplateData::Batch(events),
                Some(&unsub_link),
            )
            .await?;

        // Only empty the batch once the email went out.
        self.store.empty_batch(user_id, kind).await?;
        Ok(())
    }

    /// Whether the batch deadline has passed
    ///
    /// Kinds without a coalescing delay flush immediately.
    pub(crate) fn batch_aged_out(
        &self,
        oldest: &StoredNotification,
        kind: NotificationType,
        now: DateTime<Utc>,
    ) -> bool {
        self.config
            .batch_delay(kind)
            .map_or(true, |delay| oldest.created_at + delay < now)
    }

    /// Serializes flushes of one `(user, kind)` pair across the batch
    /// handler and the sweep
    pub(crate) async fn flush_lock(
        &self,
        user_id: &str,
        kind: NotificationType,
    ) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.flush_locks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            locks
                .entry((user_id.to_string(), kind))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Eligibility: verified email and the per-kind preference both hold
    pub(crate) async fn should_email_user(
        &self,
        user_id: &str,
        kind: NotificationType,
    ) -> ProcessorResult<bool> {
        let verified = self.store.user_email_verification(user_id).await?;
        let preference = self
            .store
            .user_notification_preference(user_id)
            .await?
            .wants(kind);
        Ok(verified && preference)
    }

    async fn require_email(&self, user_id: &str) -> ProcessorResult<String> {
        self.store
            .user_email(user_id)
            .await?
            .ok_or_else(|| ProcessorError::MissingEmail(user_id.to_string()))
    }

    /// Reads the activity aggregates for the window and derives the summary
    /// fields
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub(crate) async fn gather_summary(
        &self,
        user_id: &str,
        params: &SummaryParams,
    ) -> ProcessorResult<SummaryData> {
        let (start, end) = params.window();
        info!("Gathering {} data for user {user_id}", params.kind());

        let total_credits_used = self.store.total_credits_used(user_id, start, end).await?;
        let total_executions = self.store.total_executions(user_id, start, end).await?;
        let most_used_agent = self
            .store
            .most_used_agent(user_id, start, end)
            .await?
            .unwrap_or_else(|| "none".to_string());
        let execution_times = self.store.execution_times(user_id, start, end).await?;
        let outcomes = self.store.execution_outcomes(user_id, start, end).await?;
        let cost_breakdown = self.store.cost_breakdown(user_id, start, end).await?;

        let successful_runs = outcomes
            .iter()
            .filter(|outcome| **outcome == notification_types::ExecutionOutcome::Completed)
            .count() as u64;
        let failed_runs = outcomes.len() as u64 - successful_runs;
        let total_execution_time: f64 = execution_times.iter().sum();
        let average_execution_time = if execution_times.is_empty() {
            0.0
        } else {
            total_execution_time / execution_times.len() as f64
        };

        let summary = match params {
            SummaryParams::Daily(daily) => SummaryData::Daily(DailySummaryData {
                total_credits_used,
                total_executions,
                most_used_agent,
                total_execution_time,
                successful_runs,
                failed_runs,
                average_execution_time,
                cost_breakdown,
                date: daily.date,
            }),
            SummaryParams::Weekly(weekly) => SummaryData::Weekly(WeeklySummaryData {
                total_credits_used,
                total_executions,
                most_used_agent,
                total_execution_time,
                successful_runs,
                failed_runs,
                average_execution_time,
                cost_breakdown,
                start_date: weekly.start_date,
                end_date: weekly.end_date,
            }),
        };
        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::email::mock::RecordingEmailSender;
    use crate::email::FrontendUnsubscribeLinks;
    use crate::store::mock::{ActivityFixture, InMemoryStore};
    use notification_types::{DailySummaryParams, ExecutionOutcome};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap as StdHashMap;

    fn processor_over(store: Arc<InMemoryStore>) -> EventProcessor {
        EventProcessor::new(
            store,
            Arc::new(RecordingEmailSender::new()),
            Arc::new(FrontendUnsubscribeLinks::new(
                "http://localhost:3000".to_string(),
            )),
            DispatchConfig {
                admin_email: "admin@example.com".to_string(),
                poll_timeout: std::time::Duration::from_secs(1),
                idle_sleep: std::time::Duration::from_millis(100),
                batch_delay_overrides: StdHashMap::new(),
            },
        )
    }

    #[tokio::test]
    async fn summary_math_derives_counts_and_averages() {
        let store = Arc::new(InMemoryStore::new());
        store.add_user("u1", "u1@x", true);
        store.set_activity(
            "u1",
            ActivityFixture {
                credits_used: 12.5,
                executions: 4,
                most_used_agent: Some("Scraper".to_string()),
                execution_times: vec![1.0, 2.0, 3.0],
                outcomes: vec![
                    ExecutionOutcome::Completed,
                    ExecutionOutcome::Completed,
                    ExecutionOutcome::Failed,
                    ExecutionOutcome::Terminated,
                ],
                cost_breakdown: StdHashMap::from([("Scraper".to_string(), 12.5)]),
            },
        );
        let processor = processor_over(store);

        let params = SummaryParams::Daily(DailySummaryParams {
            date: "2025-03-01T00:00:00Z".parse().unwrap(),
        });
        let summary = processor.gather_summary("u1", &params).await.unwrap();

        let SummaryData::Daily(data) = summary else {
            panic!("expected daily summary");
        };
        assert_eq!(data.total_credits_used, 12.5);
        assert_eq!(data.total_executions, 4);
        assert_eq!(data.most_used_agent, "Scraper");
        assert_eq!(data.successful_runs, 2);
        assert_eq!(data.failed_runs, 2);
        assert_eq!(data.total_execution_time, 6.0);
        assert_eq!(data.average_execution_time, 2.0);
    }

    #[tokio::test]
    async fn summary_math_handles_an_idle_window() {
        let store = Arc::new(InMemoryStore::new());
        store.add_user("u1", "u1@x", true);
        let processor = processor_over(store);

        let params = SummaryParams::Daily(DailySummaryParams {
            date: "2025-03-01T00:00:00Z".parse().unwrap(),
        });
        let summary = processor.gather_summary("u1", &params).await.unwrap();

        let SummaryData::Daily(data) = summary else {
            panic!("expected daily summary");
        };
        assert_eq!(data.total_executions, 0);
        assert_eq!(data.average_execution_time, 0.0);
        assert_eq!(data.most_used_agent, "none");
    }

    #[tokio::test]
    async fn eligibility_requires_verification_and_preference() {
        let store = Arc::new(InMemoryStore::new());
        store.add_user("verified", "v@x", true);
        store.add_user("unverified", "u@x", false);
        store.add_user("opted-out", "o@x", true);
        store.set_preference("opted-out", NotificationType::AgentRun, false);
        let processor = processor_over(store);

        assert!(processor
            .should_email_user("verified", NotificationType::AgentRun)
            .await
            .unwrap());
        assert!(!processor
            .should_email_user("unverified", NotificationType::AgentRun)
            .await
            .unwrap());
        assert!(!processor
            .should_email_user("opted-out", NotificationType::AgentRun)
            .await
            .unwrap());
    }
}
