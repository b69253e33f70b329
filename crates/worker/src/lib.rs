//! Job queue, worker pool and canvas commit for split-layers Jobs.
//!
//! - [`JobQueue`]: submit / get / cancel / list, backed by a fixed worker pool.
//! - [`CanvasLockManager`]: serializes Jobs that target the same canvas.
//! - [`JobExecutor`]: runs one Job through the pipeline and commits it.
//! - [`ProgressReporter`]: records and emits monotonic progress.
//! - [`storage`]: file-backed canvas and blob stores.

pub mod config;
pub mod error;
pub mod executor;
pub mod lock;
pub mod progress;
pub mod queue;
pub mod registry;
pub mod storage;

pub use config::{ConfigError, WorkerConfig};
pub use error::{JobError, QueueError};
pub use executor::{ClaimedJob, JobExecutor};
pub use lock::{CanvasGuard, CanvasLockManager};
pub use progress::ProgressReporter;
pub use queue::JobQueue;
pub use registry::JobRegistry;
pub use storage::{FileCanvasStore, LocalBlobStore};
