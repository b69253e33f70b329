use layersplit_core::providers::StoreError;

use crate::matte::MatteStatus;

/// Failure of one pipeline stage. Per-image and per-layer errors are caught
/// at the stage boundary and recorded, never propagated past the image.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Missing or unusable input image.
    #[error("Invalid image: {0}")]
    Validation(String),

    /// Detection call failed or returned something unparseable.
    #[error("Layer analysis failed: {0}")]
    Analysis(String),

    /// One matting operation failed at the given stage.
    #[error("Matting {status}: {message}")]
    Matting { status: MatteStatus, message: String },

    /// A layer's geometry could not be used.
    #[error("Invalid layer geometry: {0}")]
    Placement(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Blob store error: {0}")]
    Store(#[from] StoreError),

    /// A blocking task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type StageResult<T> = Result<T, StageError>;

impl StageError {
    pub fn matting(status: MatteStatus, message: impl Into<String>) -> Self {
        StageError::Matting {
            status,
            message: message.into(),
        }
    }
}
