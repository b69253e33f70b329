//! Notification event names and message types for split-layers Jobs.
//!
//! Used by the worker's progress reporter and job executor when emitting
//! through a `Notifier`.

/// Event carrying per-session updates (progress, layers added).
pub const EVENT_SESSION_UPDATE: &str = "session_update";

/// Event carrying canvas-level summaries.
pub const EVENT_CANVAS_NOTIFICATION: &str = "canvas_notification";

/// Session id used for progress updates of split-layers Jobs.
pub const SESSION_LAYER_SPLIT: &str = "layer_split";

/// Progress update: step, total, percentage and message.
pub const MSG_TYPE_TASK_PROGRESS: &str = "task_progress";

/// One new element was committed to the canvas.
pub const MSG_TYPE_LAYER_ADDED: &str = "layer_added";

/// All elements of a Job were committed.
pub const MSG_TYPE_SPLIT_SUCCESS: &str = "split_layers_success";

/// The Job failed.
pub const MSG_TYPE_SPLIT_ERROR: &str = "split_layers_error";
