//! HTTP client implementation of [`NotificationStore`]
//!
//! Talks to the internal platform API, which fronts the user directory,
//! the batch accumulator, and the execution history.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use notification_types::{ExecutionOutcome, NotificationPreferences, NotificationType};

use super::{NotificationBatch, NotificationStore, StoreError, StoreResult, StoredNotification};

/// Default request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Maximum number of idle connections to maintain per host
const MAX_IDLE_CONNECTIONS_PER_HOST: usize = 10;

/// HTTP client to the platform API
pub struct PlatformStoreClient {
    base_url: String,
    http_client: Client,
}

#[derive(Deserialize)]
struct EmailResponse {
    email: Option<String>,
}

#[derive(Deserialize)]
struct VerificationResponse {
    verified: bool,
}

#[derive(Deserialize)]
struct ActiveUsersResponse {
    user_ids: Vec<String>,
}

#[derive(Deserialize)]
struct OldestResponse {
    oldest: Option<StoredNotification>,
}

#[derive(Deserialize)]
struct BatchResponse {
    batch: Option<NotificationBatch>,
}

#[derive(Deserialize)]
struct BatchListResponse {
    batches: Vec<NotificationBatch>,
}

#[derive(Deserialize)]
struct CreditsResponse {
    total: f64,
}

#[derive(Deserialize)]
struct ExecutionsResponse {
    total: u64,
}

#[derive(Deserialize)]
struct MostUsedAgentResponse {
    agent_name: Option<String>,
}

#[derive(Deserialize)]
struct ExecutionTimesResponse {
    seconds: Vec<f64>,
}

#[derive(Deserialize)]
struct OutcomesResponse {
    outcomes: Vec<ExecutionOutcome>,
}

#[derive(Deserialize)]
struct CostBreakdownResponse {
    costs: HashMap<String, f64>,
}

impl PlatformStoreClient {
    /// Creates a new platform API client
    ///
    /// # Panics
    ///
    /// If the HTTP client fails to be created
    #[must_use]
    pub fn new(base_url: String) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS_PER_HOST)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url,
            http_client,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> StoreResult<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http_client.get(&url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(StoreError::Status {
                status: response.status(),
                context: path.to_string(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    async fn send_command(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&(impl Serialize + Sync)>,
    ) -> StoreResult<()> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.http_client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(StoreError::Status {
                status: response.status(),
                context: path.to_string(),
            });
        }
        Ok(())
    }

    fn window_query(start: DateTime<Utc>, end: DateTime<Utc>) -> [(&'static str, String); 2] {
        [("start", start.to_rfc3339()), ("end", end.to_rfc3339())]
    }
}

#[async_trait]
impl NotificationStore for PlatformStoreClient {
    async fn user_email(&self, user_id: &str) -> StoreResult<Option<String>> {
        let response: EmailResponse = self
            .get_json(&format!("/v1/users/{user_id}/email"), &[])
            .await?;
        Ok(response.email)
    }

    async fn user_email_verification(&self, user_id: &str) -> StoreResult<bool> {
        let response: VerificationResponse = self
            .get_json(&format!("/v1/users/{user_id}/email-verification"), &[])
            .await?;
        Ok(response.verified)
    }

    async fn user_notification_preference(
        &self,
        user_id: &str,
    ) -> StoreResult<NotificationPreferences> {
        self.get_json(
            &format!("/v1/users/{user_id}/notification-preference"),
            &[],
        )
        .await
    }

    async fn active_user_ids_in_timerange(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<String>> {
        let response: ActiveUsersResponse = self
            .get_json("/v1/users/active", &Self::window_query(start, end))
            .await?;
        Ok(response.user_ids)
    }

    async fn append_to_batch(
        &self,
        user_id: &str,
        kind: NotificationType,
        notification: &StoredNotification,
    ) -> StoreResult<()> {
        self.send_command(
            reqwest::Method::POST,
            &format!("/v1/users/{user_id}/notification-batches/{kind}/events"),
            Some(notification),
        )
        .await
    }

    async fn batch_oldest(
        &self,
        user_id: &str,
        kind: NotificationType,
    ) -> StoreResult<Option<StoredNotification>> {
        let response: OldestResponse = self
            .get_json(
                &format!("/v1/users/{user_id}/notification-batches/{kind}/oldest"),
                &[],
            )
            .await?;
        Ok(response.oldest)
    }

    async fn get_batch(
        &self,
        user_id: &str,
        kind: NotificationType,
    ) -> StoreResult<Option<NotificationBatch>> {
        let response: BatchResponse = self
            .get_json(
                &format!("/v1/users/{user_id}/notification-batches/{kind}"),
                &[],
            )
            .await?;
        Ok(response.batch)
    }

    async fn empty_batch(&self, user_id: &str, kind: NotificationType) -> StoreResult<()> {
        self.send_command(
            reqwest::Method::DELETE,
            &format!("/v1/users/{user_id}/notification-batches/{kind}"),
            None::<&()>,
        )
        .await
    }

    async fn all_batches_by_type(
        &self,
        kind: NotificationType,
    ) -> StoreResult<Vec<NotificationBatch>> {
        let response: BatchListResponse = self
            .get_json(&format!("/v1/notification-batches/{kind}"), &[])
            .await?;
        Ok(response.batches)
    }

    async fn total_credits_used(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<f64> {
        let response: CreditsResponse = self
            .get_json(
                &format!("/v1/users/{user_id}/activity/credits"),
                &Self::window_query(start, end),
            )
            .await?;
        Ok(response.total)
    }

    async fn total_executions(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let response: ExecutionsResponse = self
            .get_json(
                &format!("/v1/users/{user_id}/activity/executions"),
                &Self::window_query(start, end),
            )
            .await?;
        Ok(response.total)
    }

    async fn most_used_agent(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Option<String>> {
        let response: MostUsedAgentResponse = self
            .get_json(
                &format!("/v1/users/{user_id}/activity/most-used-agent"),
                &Self::window_query(start, end),
            )
            .await?;
        Ok(response.agent_name)
    }

    async fn execution_times(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<f64>> {
        let response: ExecutionTimesResponse = self
            .get_json(
                &format!("/v1/users/{user_id}/activity/execution-times"),
                &Self::window_query(start, end),
            )
            .await?;
        Ok(response.seconds)
    }

    async fn execution_outcomes(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<ExecutionOutcome>> {
        let response: OutcomesResponse = self
            .get_json(
                &format!("/v1/users/{user_id}/activity/outcomes"),
                &Self::window_query(start, end),
            )
            .await?;
        Ok(response.outcomes)
    }

    async fn cost_breakdown(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<HashMap<String, f64>> {
        let response: CostBreakdownResponse = self
            .get_json(
                &format!("/v1/users/{user_id}/activity/cost-breakdown"),
                &Self::window_query(start, end),
            )
            .await?;
        Ok(response.costs)
    }
}
