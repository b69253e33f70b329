//! Contracts of the external collaborators the engine depends on.
//!
//! The pipeline and worker only ever see these traits (behind `Arc<dyn _>`),
//! so HTTP clients, file-backed stores and test doubles are interchangeable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::canvas::CanvasDocument;
use crate::descriptor::FILE_URL_PREFIX;
use crate::layers::LayerSpec;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("Analyzer request failed: {0}")]
    Request(String),

    #[error("Analyzer could not read image: {0}")]
    Image(String),

    #[error("Analyzer returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// `extract_layers` failure: what went wrong plus the text that was parsed.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{error}")]
pub struct ExtractError {
    pub error: String,
    pub raw_response: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Matting request failed: {0}")]
    Request(String),

    #[error("Matting provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Unexpected matting output: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Blob handles
// ---------------------------------------------------------------------------

/// A file copied into the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlob {
    pub file_id: String,
    /// Name under the store directory, e.g. `im_a1b2c3d4.png`.
    pub file_name: String,
    pub stored_path: PathBuf,
    pub mime_type: String,
}

impl StoredBlob {
    /// URL under which the canvas loads the file.
    pub fn data_url(&self) -> String {
        format!("{FILE_URL_PREFIX}{}", self.file_name)
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Detects labeled layers in an image.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Run detection and return the raw structured response.
    async fn analyze(&self, image: &Path) -> Result<serde_json::Value, AnalyzerError>;

    /// Pull the layer list out of an `analyze` response. An empty list is a
    /// valid answer.
    fn extract_layers(&self, response: &serde_json::Value) -> Result<Vec<LayerSpec>, ExtractError>;
}

/// Remote background removal, split into its four network stages.
#[async_trait]
pub trait MattingProvider: Send + Sync {
    /// Upload a local file and return a URL the workflow can read.
    async fn upload(&self, local_path: &Path) -> Result<String, ProviderError>;

    /// Run the matting workflow on an uploaded image.
    async fn run_matte(&self, url: &str) -> Result<serde_json::Value, ProviderError>;

    /// Find the output URL in a workflow result.
    fn parse_output(&self, result: &serde_json::Value) -> Option<String>;

    /// Download the output into `dest_dir`, naming it after `file_stem`.
    async fn download(
        &self,
        output_url: &str,
        dest_dir: &Path,
        file_stem: &str,
    ) -> Result<PathBuf, ProviderError>;
}

/// Persistence for canvas documents.
#[async_trait]
pub trait CanvasStore: Send + Sync {
    async fn get(&self, canvas_id: &str) -> Result<Option<CanvasDocument>, StoreError>;

    async fn save(&self, canvas_id: &str, document: &CanvasDocument) -> Result<(), StoreError>;
}

/// Storage for element image files.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn copy_into_store(&self, path: &Path) -> Result<StoredBlob, StoreError>;
}
