//! Externally invoked scheduled triggers
//!
//! Both triggers run on background tasks gated by a small permit pool so a
//! large fan-out never stalls queue consumption. Flushes share the
//! processor's per-key locks with the batch handler, so a sweep and a
//! dispatcher-driven flush of the same `(user, kind)` pair cannot
//! double-send.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use notification_broker::EventPublisher;
use notification_types::{
    NotificationType, SummaryParams, SummaryParamsEvent, SweepReport, WeeklySummaryParams,
};

use crate::store::NotificationStore;
use crate::worker::processor::{EventProcessor, ProcessorError, ProcessorResult};

/// Background workers available for trigger runs
const BACKGROUND_WORKERS: usize = 2;

/// Scheduled entry points invoked by the service surface
pub struct ScheduledTriggers {
    store: Arc<dyn NotificationStore>,
    publisher: Arc<EventPublisher>,
    processor: Arc<EventProcessor>,
    permits: Arc<Semaphore>,
}

impl ScheduledTriggers {
    /// Creates the trigger entry points over the given collaborators
    #[must_use]
    pub fn new(
        store: Arc<dyn NotificationStore>,
        publisher: Arc<EventPublisher>,
        processor: Arc<EventProcessor>,
    ) -> Self {
        Self {
            store,
            publisher,
            processor,
            permits: Arc::new(Semaphore::new(BACKGROUND_WORKERS)),
        }
    }

    /// Fires the weekly summary fan-out on a background task
    pub fn spawn_weekly_summary(self: &Arc<Self>) {
        let triggers = Arc::clone(self);
        tokio::spawn(async move {
            triggers.queue_weekly_summary().await;
        });
    }

    /// Publishes a `WEEKLY_SUMMARY` params event for every user active in
    /// the trailing seven days
    pub async fn queue_weekly_summary(&self) {
        let Ok(_permit) = self.permits.acquire().await else {
            return;
        };
        info!("Processing weekly summary queuing operation");

        let end_date = Utc::now();
        let start_date = end_date - chrono::Duration::days(7);
        let users = match self
            .store
            .active_user_ids_in_timerange(start_date, end_date)
            .await
        {
            Ok(users) => users,
            Err(e) => {
                error!("Error processing weekly summary: {e}");
                return;
            }
        };

        let mut processed_count = 0_u64;
        for user_id in users {
            let event = SummaryParamsEvent::new(
                user_id,
                SummaryParams::Weekly(WeeklySummaryParams {
                    start_date,
                    end_date,
                }),
            );
            let result = self.publisher.publish_summary_params(&event).await;
            if result.success {
                processed_count += 1;
            } else {
                error!("Failed to queue weekly summary: {}", result.message);
            }
        }

        info!("Queued {processed_count} weekly summaries");
    }

    /// Sweeps every batch of the given kinds and flushes the aged ones
    ///
    /// Aged batches whose owner lost their email or opted out are cleared
    /// without sending. Returns an audit record either way; store failures
    /// fold into it rather than propagate.
    pub async fn process_existing_batches(&self, kinds: Vec<NotificationType>) -> SweepReport {
        let timestamp = Utc::now();
        let Ok(_permit) = self.permits.acquire().await else {
            return SweepReport {
                success: false,
                processed_count: 0,
                notification_types: kinds,
                timestamp,
                error: Some("background worker pool is shut down".to_string()),
            };
        };

        match self.sweep(&kinds, timestamp).await {
            Ok(processed_count) => {
                info!("Processed {processed_count} aged batches");
                SweepReport {
                    success: true,
                    processed_count,
                    notification_types: kinds,
                    timestamp,
                    error: None,
                }
            }
            Err(e) => {
                error!("Error processing batches: {e}");
                SweepReport {
                    success: false,
                    processed_count: 0,
                    notification_types: kinds,
                    timestamp,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn sweep(
        &self,
        kinds: &[NotificationType],
        now: DateTime<Utc>,
    ) -> ProcessorResult<u64> {
        let mut processed_count = 0_u64;

        for &kind in kinds {
            for batch in self.store.all_batches_by_type(kind).await? {
                let user_id = batch.user_id;
                let _guard = self.processor.flush_lock(&user_id, kind).await;

                let Some(oldest) = self.store.batch_oldest(&user_id, kind).await? else {
                    error!("Batch for user {user_id} and kind {kind} has no oldest message");
                    continue;
                };
                if !self.processor.batch_aged_out(&oldest, kind, now) {
                    continue;
                }

                let Some(recipient_email) = self.store.user_email(&user_id).await? else {
                    warn!("User email not found for user {user_id}; clearing batch");
                    self.store.empty_batch(&user_id, kind).await?;
                    continue;
                };

                if !self.processor.should_email_user(&user_id, kind).await? {
                    debug!("User {user_id} does not want to receive {kind} notifications");
                    self.store.empty_batch(&user_id, kind).await?;
                    continue;
                }

                match self
                    .processor
                    .flush_batch(&user_id, kind, &recipient_email)
                    .await
                {
                    Ok(()) => processed_count += 1,
                    Err(ProcessorError::BatchMissing { .. }) => {
                        error!("Batch data not found for user {user_id}; clearing");
                        self.store.empty_batch(&user_id, kind).await?;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(processed_count)
    }
}
