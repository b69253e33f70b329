//! Webhook delivery for notifications.
//!
//! [`WebhookDelivery`] POSTs a [`NotificationEvent`] exactly as it is
//! serialized (`event_name`, `payload`, `timestamp`). Transport errors and
//! 5xx / 408 / 429 responses are retried after each entry of the backoff
//! schedule (1 s, 2 s, 4 s by default); any other non-2xx status is final.
//! [`WebhookNotifier`] runs deliveries on their own task so an emit never
//! waits on the remote endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::bus::NotificationEvent;
use crate::notifier::{Notifier, NotifyError};

/// Default wait before each retry.
const DEFAULT_BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Timeout for one POST.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Cannot build webhook client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Webhook {url} rejected the event with HTTP {status}")]
    Rejected { url: String, status: u16 },

    #[error("Webhook {url} unreachable after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: usize,
        last: String,
    },
}

/// How a single POST went.
enum Attempt {
    Delivered,
    Retryable(String),
    Final(StatusCode),
}

// ---------------------------------------------------------------------------
// WebhookDelivery
// ---------------------------------------------------------------------------

pub struct WebhookDelivery {
    client: reqwest::Client,
    backoff: Vec<Duration>,
}

impl WebhookDelivery {
    pub fn new() -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(WebhookError::Client)?;
        Ok(Self {
            client,
            backoff: DEFAULT_BACKOFF.to_vec(),
        })
    }

    /// Replace the retry schedule. An empty schedule means one attempt.
    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Post `event` to `url`. Returns the number of attempts it took.
    pub async fn deliver(&self, url: &str, event: &NotificationEvent) -> Result<usize, WebhookError> {
        let mut delays = self.backoff.iter();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let reason = match self.post(url, event).await {
                Attempt::Delivered => return Ok(attempts),
                Attempt::Final(status) => {
                    tracing::error!(url, event = %event.event_name, %status, "Webhook rejected event");
                    return Err(WebhookError::Rejected {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                Attempt::Retryable(reason) => reason,
            };

            let Some(delay) = delays.next() else {
                tracing::error!(url, event = %event.event_name, attempts, error = %reason, "Webhook delivery gave up");
                return Err(WebhookError::Exhausted {
                    url: url.to_string(),
                    attempts,
                    last: reason,
                });
            };
            tracing::warn!(
                url,
                attempt = attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %reason,
                "Webhook delivery failed, retrying"
            );
            tokio::time::sleep(*delay).await;
        }
    }

    async fn post(&self, url: &str, event: &NotificationEvent) -> Attempt {
        let status = match self.client.post(url).json(event).send().await {
            Ok(response) => response.status(),
            Err(e) => return Attempt::Retryable(e.to_string()),
        };

        if status.is_success() {
            Attempt::Delivered
        } else if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            Attempt::Retryable(format!("HTTP {status}"))
        } else {
            Attempt::Final(status)
        }
    }
}

// ---------------------------------------------------------------------------
// WebhookNotifier
// ---------------------------------------------------------------------------

/// [`Notifier`] that forwards every event to one webhook URL.
pub struct WebhookNotifier {
    delivery: Arc<WebhookDelivery>,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        Ok(Self::with_delivery(WebhookDelivery::new()?, url))
    }

    pub fn with_delivery(delivery: WebhookDelivery, url: impl Into<String>) -> Self {
        Self {
            delivery: Arc::new(delivery),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn emit(&self, event_name: &str, payload: serde_json::Value) -> Result<(), NotifyError> {
        let delivery = Arc::clone(&self.delivery);
        let url = self.url.clone();
        let event = NotificationEvent::new(event_name).with_payload(payload);

        tokio::spawn(async move {
            if let Err(e) = delivery.deliver(&url, &event).await {
                tracing::warn!(event = %event.event_name, error = %e, "Webhook notification dropped");
            }
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
