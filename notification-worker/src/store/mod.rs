//! Persistence interface consumed by the dispatch pipeline
//!
//! User lookups, the per-user batch accumulator, and the activity
//! aggregates behind summaries all live in the platform store. The worker
//! only sees this trait; the HTTP client in [`client`] is the production
//! implementation.

mod error;

/// HTTP client against the platform API
pub mod client;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use notification_types::{ExecutionOutcome, NotificationPreferences, NotificationType};

pub use client::PlatformStoreClient;
pub use error::{StoreError, StoreResult};

/// One event held inside a batch, payload kept opaque until flush
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredNotification {
    /// Event kind
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Raw payload as appended
    pub data: Value,
    /// Publish timestamp of the appended event
    pub created_at: DateTime<Utc>,
}

/// The batch accumulator row for one `(user, kind)` pair
///
/// A row only exists while it holds at least one notification; emptying a
/// batch deletes the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationBatch {
    /// Owner of the batch
    pub user_id: String,
    /// Kind the batch coalesces
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Accumulated events in insertion order, oldest first
    pub notifications: Vec<StoredNotification>,
}

/// Store operations the dispatch pipeline depends on
///
/// Every operation is individually atomic; no cross-operation transactions
/// are assumed.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Email address of a user, `None` when the user or address is absent
    async fn user_email(&self, user_id: &str) -> StoreResult<Option<String>>;

    /// Whether the user has verified their email address
    async fn user_email_verification(&self, user_id: &str) -> StoreResult<bool>;

    /// The user's per-kind notification preferences
    async fn user_notification_preference(
        &self,
        user_id: &str,
    ) -> StoreResult<NotificationPreferences>;

    /// Users with any activity inside the given window
    async fn active_user_ids_in_timerange(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<String>>;

    /// Appends an event to the user's batch, creating the row if absent
    async fn append_to_batch(
        &self,
        user_id: &str,
        kind: NotificationType,
        notification: &StoredNotification,
    ) -> StoreResult<()>;

    /// The oldest notification in the user's batch, `None` when no row exists
    async fn batch_oldest(
        &self,
        user_id: &str,
        kind: NotificationType,
    ) -> StoreResult<Option<StoredNotification>>;

    /// The full batch row, `None` when no row exists
    async fn get_batch(
        &self,
        user_id: &str,
        kind: NotificationType,
    ) -> StoreResult<Option<NotificationBatch>>;

    /// Deletes the batch row
    async fn empty_batch(&self, user_id: &str, kind: NotificationType) -> StoreResult<()>;

    /// Every batch row currently held for the given kind
    async fn all_batches_by_type(
        &self,
        kind: NotificationType,
    ) -> StoreResult<Vec<NotificationBatch>>;

    /// Credits spent by the user inside the window
    async fn total_credits_used(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<f64>;

    /// Executions started by the user inside the window
    async fn total_executions(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Agent the user executed most inside the window, if any ran
    async fn most_used_agent(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Option<String>>;

    /// Execution durations in seconds inside the window
    async fn execution_times(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<f64>>;

    /// Terminal statuses of the user's executions inside the window
    async fn execution_outcomes(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<ExecutionOutcome>>;

    /// Credits spent per agent inside the window
    async fn cost_breakdown(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<HashMap<String, f64>>;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! In-memory store for tests

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use notification_types::{ExecutionOutcome, NotificationPreferences, NotificationType};

    use super::{NotificationBatch, NotificationStore, StoreResult, StoredNotification};

    #[derive(Debug, Clone, Default)]
    struct UserRecord {
        email: Option<String>,
        verified: bool,
        preferences: NotificationPreferences,
    }

    /// Activity aggregates served for one user regardless of window
    #[derive(Debug, Clone, Default)]
    pub struct ActivityFixture {
        /// Credits spent
        pub credits_used: f64,
        /// Executions started
        pub executions: u64,
        /// Most executed agent
        pub most_used_agent: Option<String>,
        /// Execution durations in seconds
        pub execution_times: Vec<f64>,
        /// Terminal statuses
        pub outcomes: Vec<ExecutionOutcome>,
        /// Credits per agent
        pub cost_breakdown: HashMap<String, f64>,
    }

    #[derive(Default)]
    struct StoreState {
        users: HashMap<String, UserRecord>,
        activity: HashMap<String, ActivityFixture>,
        active_users: Vec<(String, DateTime<Utc>)>,
        batches: HashMap<(String, NotificationType), Vec<StoredNotification>>,
    }

    /// In-memory [`NotificationStore`] double
    #[derive(Default)]
    pub struct InMemoryStore {
        state: Mutex<StoreState>,
    }

    impl InMemoryStore {
        /// Creates an empty store
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Registers a user with an email address and verification state
        ///
        /// # Panics
        ///
        /// Panics if the internal lock is poisoned.
        pub fn add_user(&self, user_id: &str, email: &str, verified: bool) {
            let mut state = self.state.lock().unwrap();
            state.users.insert(
                user_id.to_string(),
                UserRecord {
                    email: Some(email.to_string()),
                    verified,
                    preferences: NotificationPreferences::default(),
                },
            );
        }

        /// Registers a user without any email address
        ///
        /// # Panics
        ///
        /// Panics if the internal lock is poisoned.
        pub fn add_user_without_email(&self, user_id: &str) {
            let mut state = self.state.lock().unwrap();
            state
                .users
                .insert(user_id.to_string(), UserRecord::default());
        }

        /// Sets an explicit per-kind preference for a user
        ///
        /// # Panics
        ///
        /// Panics if the user is unknown or the internal lock is poisoned.
        pub fn set_preference(&self, user_id: &str, kind: NotificationType, wants: bool) {
            let mut state = self.state.lock().unwrap();
            state
                .users
                .get_mut(user_id)
                .expect("unknown user in fixture")
                .preferences
                .preferences
                .insert(kind, wants);
        }

        /// Serves the given activity aggregates for a user
        ///
        /// # Panics
        ///
        /// Panics if the internal lock is poisoned.
        pub fn set_activity(&self, user_id: &str, activity: ActivityFixture) {
            let mut state = self.state.lock().unwrap();
            state.activity.insert(user_id.to_string(), activity);
        }

        /// Marks a user active at the given instant
        ///
        /// # Panics
        ///
        /// Panics if the internal lock is poisoned.
        pub fn add_active_user(&self, user_id: &str, at: DateTime<Utc>) {
            let mut state = self.state.lock().unwrap();
            state.active_users.push((user_id.to_string(), at));
        }

        /// Number of notifications currently batched for the pair
        ///
        /// # Panics
        ///
        /// Panics if the internal lock is poisoned.
        #[must_use]
        pub fn batch_len(&self, user_id: &str, kind: NotificationType) -> usize {
            let state = self.state.lock().unwrap();
            state
                .batches
                .get(&(user_id.to_string(), kind))
                .map_or(0, Vec::len)
        }
    }

    #[async_trait]
    impl NotificationStore for InMemoryStore {
        async fn user_email(&self, user_id: &str) -> StoreResult<Option<String>> {
            let state = self.state.lock().unwrap();
            Ok(state.users.get(user_id).and_then(|u| u.email.clone()))
        }

        async fn user_email_verification(&self, user_id: &str) -> StoreResult<bool> {
            let state = self.state.lock().unwrap();
            Ok(state.users.get(user_id).is_some_and(|u| u.verified))
        }

        async fn user_notification_preference(
            &self,
            user_id: &str,
        ) -> StoreResult<NotificationPreferences> {
            let state = self.state.lock().unwrap();
            Ok(state
                .users
                .get(user_id)
                .map(|u| u.preferences.clone())
                .unwrap_or_default())
        }

        async fn active_user_ids_in_timerange(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> StoreResult<Vec<String>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .active_users
                .iter()
                .filter(|(_, at)| *at >= start && *at <= end)
                .map(|(user_id, _)| user_id.clone())
                .collect())
        }

        async fn append_to_batch(
            &self,
            user_id: &str,
            kind: NotificationType,
            notification: &StoredNotification,
        ) -> StoreResult<()> {
            let mut state = self.state.lock().unwrap();
            state
                .batches
                .entry((user_id.to_string(), kind))
                .or_default()
                .push(notification.clone());
            Ok(())
        }

        async fn batch_oldest(
            &self,
            user_id: &str,
            kind: NotificationType,
        ) -> StoreResult<Option<StoredNotification>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .batches
                .get(&(user_id.to_string(), kind))
                .and_then(|batch| batch.first().cloned()))
        }

        async fn get_batch(
            &self,
            user_id: &str,
            kind: NotificationType,
        ) -> StoreResult<Option<NotificationBatch>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .batches
                .get(&(user_id.to_string(), kind))
                .map(|notifications| NotificationBatch {
                    user_id: user_id.to_string(),
                    kind,
                    notifications: notifications.clone(),
                }))
        }

        async fn empty_batch(&self, user_id: &str, kind: NotificationType) -> StoreResult<()> {
            let mut state = self.state.lock().unwrap();
            state.batches.remove(&(user_id.to_string(), kind));
            Ok(())
        }

        async fn all_batches_by_type(
            &self,
            kind: NotificationType,
        ) -> StoreResult<Vec<NotificationBatch>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .batches
                .iter()
                .filter(|((_, batch_kind), _)| *batch_kind == kind)
                .map(|((user_id, _), notifications)| NotificationBatch {
                    user_id: user_id.clone(),
                    kind,
                    notifications: notifications.clone(),
                })
                .collect())
        }

        async fn total_credits_used(
            &self,
            user_id: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> StoreResult<f64> {
            let state = self.state.lock().unwrap();
            Ok(state.activity.get(user_id).map_or(0.0, |a| a.credits_used))
        }

        async fn total_executions(
            &self,
            user_id: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> StoreResult<u64> {
            let state = self.state.lock().unwrap();
            Ok(state.activity.get(user_id).map_or(0, |a| a.executions))
        }

        async fn most_used_agent(
            &self,
            user_id: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> StoreResult<Option<String>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .activity
                .get(user_id)
                .and_then(|a| a.most_used_agent.clone()))
        }

        async fn execution_times(
            &self,
            user_id: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> StoreResult<Vec<f64>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .activity
                .get(user_id)
                .map(|a| a.execution_times.clone())
                .unwrap_or_default())
        }

        async fn execution_outcomes(
            &self,
            user_id: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> StoreResult<Vec<ExecutionOutcome>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .activity
                .get(user_id)
                .map(|a| a.outcomes.clone())
                .unwrap_or_default())
        }

        async fn cost_breakdown(
            &self,
            user_id: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> StoreResult<HashMap<String, f64>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .activity
                .get(user_id)
                .map(|a| a.cost_breakdown.clone())
                .unwrap_or_default())
        }
    }
}
