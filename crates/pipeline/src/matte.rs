//! Stage 3b: background removal for every crop, with bounded concurrency.
//!
//! Each crop gets its own task. A semaphore caps how many run at once, and
//! results are joined in input order whatever order they finish in. One
//! failed operation never cancels its siblings.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use image::imageops::FilterType;
use layersplit_core::providers::MattingProvider;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::crop::CroppedLayer;
use crate::error::{StageError, StageResult};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatteStatus {
    Success,
    UploadFailed,
    WorkflowFailed,
    ParseFailed,
    SaveFailed,
    Exception,
}

impl MatteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatteStatus::Success => "success",
            MatteStatus::UploadFailed => "upload_failed",
            MatteStatus::WorkflowFailed => "workflow_failed",
            MatteStatus::ParseFailed => "parse_failed",
            MatteStatus::SaveFailed => "save_failed",
            MatteStatus::Exception => "exception",
        }
    }
}

impl fmt::Display for MatteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of matting one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatteResult {
    /// Detection index of the layer.
    pub index: usize,
    pub status: MatteStatus,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl MatteResult {
    pub fn success(index: usize, output_path: PathBuf) -> Self {
        Self {
            index,
            status: MatteStatus::Success,
            output_path: Some(output_path),
            error: None,
        }
    }

    pub fn failure(index: usize, status: MatteStatus, error: impl Into<String>) -> Self {
        Self {
            index,
            status,
            output_path: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == MatteStatus::Success
    }

    fn from_stage(index: usize, result: StageResult<PathBuf>) -> Self {
        match result {
            Ok(path) => Self::success(index, path),
            Err(StageError::Matting { status, message }) => Self::failure(index, status, message),
            Err(other) => Self::failure(index, MatteStatus::Exception, other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Matte every crop, at most `max_concurrency` at a time. The returned list
/// is in the same order as `crops`.
pub async fn matte_all(
    provider: Arc<dyn MattingProvider>,
    crops: &[CroppedLayer],
    cutout_dir: &Path,
    max_concurrency: usize,
) -> Vec<MatteResult> {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));

    let handles: Vec<_> = crops
        .iter()
        .map(|crop| {
            let provider = Arc::clone(&provider);
            let semaphore = Arc::clone(&semaphore);
            let crop = crop.clone();
            let cutout_dir = cutout_dir.to_path_buf();
            tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| StageError::matting(MatteStatus::Exception, e.to_string()))?;
                matte_one(provider.as_ref(), &crop, &cutout_dir).await
            })
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .zip(crops)
        .map(|(joined, crop)| {
            let index = crop.layer.index;
            let result = match joined {
                Ok(result) => MatteResult::from_stage(index, result),
                Err(e) => MatteResult::failure(index, MatteStatus::Exception, e.to_string()),
            };
            if !result.is_success() {
                tracing::warn!(
                    layer_index = index,
                    status = %result.status,
                    error = result.error.as_deref().unwrap_or_default(),
                    "Matting failed, using uncut crop"
                );
            }
            result
        })
        .collect()
}

/// Upload, run, parse, download and resize one crop.
pub async fn matte_one(
    provider: &dyn MattingProvider,
    crop: &CroppedLayer,
    cutout_dir: &Path,
) -> StageResult<PathBuf> {
    let url = provider
        .upload(&crop.crop_path)
        .await
        .map_err(|e| StageError::matting(MatteStatus::UploadFailed, e.to_string()))?;

    let result = provider
        .run_matte(&url)
        .await
        .map_err(|e| StageError::matting(MatteStatus::WorkflowFailed, e.to_string()))?;
    if let Some(err) = result.get("error") {
        return Err(StageError::matting(
            MatteStatus::WorkflowFailed,
            err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string()),
        ));
    }

    let output_url = provider.parse_output(&result).ok_or_else(|| {
        StageError::matting(MatteStatus::ParseFailed, "Workflow result has no output URL")
    })?;

    let saved = provider
        .download(&output_url, cutout_dir, &crop.file_stem())
        .await
        .map_err(|e| StageError::matting(MatteStatus::SaveFailed, e.to_string()))?;

    if let Err(e) = fit_cutout(&saved, crop.width, crop.height).await {
        tracing::warn!(path = %saved.display(), error = %e, "Could not resize cutout");
    }

    tracing::debug!(layer_index = crop.layer.index, path = %saved.display(), "Layer matted");
    Ok(saved)
}

/// Resize the cutout at `path` (Lanczos3) to `width` x `height` if needed.
pub async fn fit_cutout(path: &Path, width: u32, height: u32) -> StageResult<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> StageResult<()> {
        let img = image::open(&path)?;
        if img.width() == width && img.height() == height {
            return Ok(());
        }
        let resized = img.to_rgba8();
        let resized = image::imageops::resize(&resized, width, height, FilterType::Lanczos3);
        resized.save(&path)?;
        Ok(())
    })
    .await?
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
