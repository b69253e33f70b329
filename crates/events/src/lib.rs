//! Notification plumbing for the layer-split engine.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`NotificationEvent`]: the envelope carried on the bus.
//! - [`Notifier`]: the fire-and-forget sink the worker emits through.
//! - [`delivery`]: external delivery channels (webhook).

pub mod bus;
pub mod delivery;
pub mod notifier;

pub use bus::{EventBus, NotificationEvent};
pub use delivery::webhook::{WebhookDelivery, WebhookNotifier};
pub use notifier::{BusNotifier, FanoutNotifier, NotifyError, Notifier};
