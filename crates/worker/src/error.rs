use layersplit_core::providers::StoreError;

/// Failures that end a whole Job. Per-image problems never surface here;
/// they are recorded in the Job result instead.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Loading or saving the canvas failed.
    #[error("Canvas persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("Canvas {0} not found")]
    CanvasNotFound(String),

    /// The Job's task panicked or was aborted.
    #[error("Job task panicked: {0}")]
    Panicked(String),
}

/// Submission-side errors of the [`crate::JobQueue`].
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Invalid submission: {0}")]
    Validation(String),

    #[error("Job queue is shutting down")]
    ShuttingDown,
}
