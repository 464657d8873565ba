//! Out-of-band operator alerting

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

/// One-shot side channel for operator alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Delivers an alert message
    ///
    /// # Errors
    ///
    /// Returns an error when the alert could not be delivered.
    async fn send_alert(&self, content: &str) -> anyhow::Result<()>;
}

/// Alert sink posting to a Discord webhook
pub struct DiscordWebhookSink {
    webhook_url: String,
    http_client: Client,
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

impl DiscordWebhookSink {
    /// Creates a sink for the given webhook URL
    #[must_use]
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http_client: Client::new(),
        }
    }
}

#[async_trait]
impl AlertSink for DiscordWebhookSink {
    async fn send_alert(&self, content: &str) -> anyhow::Result<()> {
        let response = self
            .http_client
            .post(&self.webhook_url)
            .json(&WebhookMessage { content })
            .send()
            .await?;

        anyhow::ensure!(
            response.status().is_success(),
            "webhook returned {}",
            response.status()
        );
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Recording alert sink for tests

    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::AlertSink;

    /// [`AlertSink`] double capturing alert contents
    #[derive(Default)]
    pub struct RecordingAlertSink {
        alerts: Mutex<Vec<String>>,
    }

    impl RecordingAlertSink {
        /// Creates an empty sink
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// All alerts captured so far
        ///
        /// # Panics
        ///
        /// Panics if the internal lock is poisoned.
        #[must_use]
        pub fn alerts(&self) -> Vec<String> {
            self.alerts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AlertSink for RecordingAlertSink {
        async fn send_alert(&self, content: &str) -> anyhow::Result<()> {
            self.alerts.lock().unwrap().push(content.to_string());
            Ok(())
        }
    }
}
