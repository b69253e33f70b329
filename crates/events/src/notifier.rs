//! The [`Notifier`] sink and its in-process implementations.
//!
//! Emitting is fire-and-forget from the engine's point of view: callers log
//! an `Err` and carry on, a notification failure never changes a Job's
//! outcome.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::{EventBus, NotificationEvent};
use crate::delivery::webhook::WebhookError;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Webhook delivery failed: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Notifier unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn emit(&self, event_name: &str, payload: serde_json::Value) -> Result<(), NotifyError>;
}

// ---------------------------------------------------------------------------
// BusNotifier
// ---------------------------------------------------------------------------

/// Publishes every notification on an [`EventBus`].
pub struct BusNotifier {
    bus: Arc<EventBus>,
}

impl BusNotifier {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Notifier for BusNotifier {
    async fn emit(&self, event_name: &str, payload: serde_json::Value) -> Result<(), NotifyError> {
        self.bus
            .publish(NotificationEvent::new(event_name).with_payload(payload));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FanoutNotifier
// ---------------------------------------------------------------------------

/// Emits to every inner notifier. All of them are tried; the first error is
/// returned.
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(targets: Vec<Arc<dyn Notifier>>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn emit(&self, event_name: &str, payload: serde_json::Value) -> Result<(), NotifyError> {
        let mut first_err = None;
        for target in &self.targets {
            if let Err(e) = target.emit(event_name, payload.clone()).await {
                tracing::warn!(event = event_name, error = %e, "Notifier target failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    #[async_trait]
    impl Notifier for Broken {
        async fn emit(&self, _: &str, _: serde_json::Value) -> Result<(), NotifyError> {
            Err(NotifyError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn bus_notifier_publishes_event() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let notifier = BusNotifier::new(Arc::clone(&bus));

        notifier
            .emit("session_update", serde_json::json!({"task_id": "j1"}))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_name, "session_update");
        assert_eq!(event.payload["task_id"], "j1");
    }

    #[tokio::test]
    async fn fanout_reaches_healthy_targets_despite_failure() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let fanout = FanoutNotifier::new(vec![
            Arc::new(Broken),
            Arc::new(BusNotifier::new(Arc::clone(&bus))),
        ]);

        let result = fanout.emit("canvas_notification", serde_json::json!({})).await;

        assert!(matches!(result, Err(NotifyError::Unavailable(_))));
        assert_eq!(rx.recv().await.unwrap().event_name, "canvas_notification");
    }

    #[tokio::test]
    async fn empty_fanout_is_ok() {
        let fanout = FanoutNotifier::new(Vec::new());
        assert!(fanout.emit("x", serde_json::json!(null)).await.is_ok());
    }
}
