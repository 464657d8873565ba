//! Email delivery interface
//!
//! Rendering and transport live in a separate email service; the worker
//! hands over the notification kind, the recipient, and the template data
//! and treats any transport failure as a delivery failure for the message
//! being processed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use notification_types::{NotificationType, TemplateData};

/// Result type alias for email operations
pub type EmailResult<T> = Result<T, EmailError>;

/// Error types for email delivery
#[derive(Error, Debug)]
pub enum EmailError {
    /// The email service could not be reached
    #[error("email transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The email service refused the send request
    #[error("email service returned {status}")]
    Rejected {
        /// HTTP status of the response
        status: reqwest::StatusCode,
    },
}

/// Renders a template for the notification kind and sends it
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Sends a templated email to the given address
    ///
    /// `data` is the single event for immediate and admin kinds, the full
    /// event list for a flushed batch, and the rendered aggregate event for
    /// summaries.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError`] when the message could not be handed to the
    /// email service.
    async fn send_templated(
        &self,
        notification: NotificationType,
        user_email: &str,
        data: &TemplateData,
        user_unsub_link: Option<&str>,
    ) -> EmailResult<()>;
}

/// Builds the opt-out link embedded into user-facing emails
pub trait UnsubscribeLinkGenerator: Send + Sync {
    /// Returns the unsubscribe link for a user
    fn unsubscribe_link(&self, user_id: &str) -> String;
}

/// Link generator pointing at the frontend's unsubscribe page
pub struct FrontendUnsubscribeLinks {
    base_url: String,
}

impl FrontendUnsubscribeLinks {
    /// Creates a generator rooted at the given frontend base URL
    #[must_use]
    pub const fn new(base_url: String) -> Self {
        Self { base_url }
    }
}

impl UnsubscribeLinkGenerator for FrontendUnsubscribeLinks {
    fn unsubscribe_link(&self, user_id: &str) -> String {
        format!("{}/unsubscribe?user_id={user_id}", self.base_url)
    }
}

/// Default request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// HTTP client to the email delivery service
pub struct HttpEmailSender {
    base_url: String,
    http_client: Client,
}

#[derive(Serialize)]
struct SendTemplatedRequest<'a> {
    notification: NotificationType,
    user_email: &'a str,
    data: &'a TemplateData,
    #[serde(skip_serializing_if = "Option::is_none")]
    unsubscribe_link: Option<&'a str>,
}

impl HttpEmailSender {
    /// Creates a new email service client
    ///
    /// # Panics
    ///
    /// If the HTTP client fails to be created
    #[must_use]
    pub fn new(base_url: String) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url,
            http_client,
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send_templated(
        &self,
        notification: NotificationType,
        user_email: &str,
        data: &TemplateData,
        user_unsub_link: Option<&str>,
    ) -> EmailResult<()> {
        let request = SendTemplatedRequest {
            notification,
            user_email,
            data,
            unsubscribe_link: user_unsub_link,
        };

        let response = self
            .http_client
            .post(format!("{}/v1/emails/send", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmailError::Rejected {
                status: response.status(),
            });
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Recording email sender for tests

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use notification_types::{NotificationType, TemplateData};

    use super::{EmailError, EmailResult, EmailSender};

    /// One captured send request
    #[derive(Debug, Clone)]
    pub struct SentEmail {
        /// Notification kind that selected the template
        pub notification: NotificationType,
        /// Recipient address
        pub user_email: String,
        /// Template data handed over
        pub data: TemplateData,
        /// Unsubscribe link, absent for admin sends
        pub unsubscribe_link: Option<String>,
    }

    /// [`EmailSender`] double that records sends and can simulate outages
    #[derive(Default)]
    pub struct RecordingEmailSender {
        sent: Mutex<Vec<SentEmail>>,
        failing: AtomicBool,
    }

    impl RecordingEmailSender {
        /// Creates a sender that accepts everything
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every subsequent send fail with a transport error
        pub fn fail_sends(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// All sends captured so far
        ///
        /// # Panics
        ///
        /// Panics if the internal lock is poisoned.
        #[must_use]
        pub fn sent(&self) -> Vec<SentEmail> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmailSender for RecordingEmailSender {
        async fn send_templated(
            &self,
            notification: NotificationType,
            user_email: &str,
            data: &TemplateData,
            user_unsub_link: Option<&str>,
        ) -> EmailResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(EmailError::Rejected {
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                });
            }

            self.sent.lock().unwrap().push(SentEmail {
                notification,
                user_email: user_email.to_string(),
                data: data.clone(),
                unsubscribe_link: user_unsub_link.map(ToString::to_string),
            });
            Ok(())
        }
    }
}
