//! File-backed implementations of the canvas and blob stores.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use layersplit_core::canvas::CanvasDocument;
use layersplit_core::providers::{BlobStore, CanvasStore, StoreError, StoredBlob};
use rand::distr::Alphanumeric;
use rand::Rng;

/// Prefix of generated file ids.
pub const FILE_ID_PREFIX: &str = "im_";

const FILE_ID_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Canvas store
// ---------------------------------------------------------------------------

/// Stores each canvas as `<dir>/<canvas_id>.json`.
pub struct FileCanvasStore {
    dir: PathBuf,
}

impl FileCanvasStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, canvas_id: &str) -> Result<PathBuf, StoreError> {
        if canvas_id.is_empty()
            || canvas_id.starts_with('.')
            || canvas_id.contains(['/', '\\'])
        {
            return Err(StoreError::Backend(format!("Invalid canvas id '{canvas_id}'")));
        }
        Ok(self.dir.join(format!("{canvas_id}.json")))
    }
}

#[async_trait]
impl CanvasStore for FileCanvasStore {
    async fn get(&self, canvas_id: &str) -> Result<Option<CanvasDocument>, StoreError> {
        let path = self.path_for(canvas_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a temporary sibling, then rename over the old document.
    async fn save(&self, canvas_id: &str, document: &CanvasDocument) -> Result<(), StoreError> {
        let path = self.path_for(canvas_id)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(document)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(canvas_id, elements = document.elements.len(), "Canvas saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Blob store
// ---------------------------------------------------------------------------

/// Copies files into one flat directory under generated `im_xxxxxxxx` names.
pub struct LocalBlobStore {
    dir: PathBuf,
}

impl LocalBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

/// A fresh `im_` id with eight alphanumeric characters.
pub fn generate_file_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(FILE_ID_LEN)
        .map(char::from)
        .collect();
    format!("{FILE_ID_PREFIX}{suffix}")
}

/// MIME type from a file extension.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn copy_into_store(&self, path: &Path) -> Result<StoredBlob, StoreError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "png".to_string());
        let file_id = generate_file_id();
        let file_name = format!("{file_id}.{ext}");
        let stored_path = self.dir.join(&file_name);

        tokio::fs::create_dir_all(&self.dir).await?;
        let copied = tokio::fs::copy(path, &stored_path).await?;
        if copied == 0 {
            return Err(StoreError::Backend(format!(
                "Copied file {} is empty",
                path.display()
            )));
        }

        Ok(StoredBlob {
            mime_type: mime_for(path).to_string(),
            file_id,
            file_name,
            stored_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn canvas_round_trips_and_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCanvasStore::new(dir.path());

        assert!(store.get("c1").await.unwrap().is_none());

        let doc: CanvasDocument = serde_json::from_value(serde_json::json!({
            "elements": [], "files": {}, "appState": {"zoom": 1}
        }))
        .unwrap();
        store.save("c1", &doc).await.unwrap();

        let loaded = store.get("c1").await.unwrap().unwrap();
        assert_eq!(
            serde_json::to_value(&loaded).unwrap()["appState"]["zoom"],
            1
        );
    }

    #[tokio::test]
    async fn canvas_id_cannot_escape_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCanvasStore::new(dir.path());
        assert_matches!(store.get("../etc").await, Err(StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn blob_copy_gets_fresh_id() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("layer.png");
        std::fs::write(&src, b"png bytes").unwrap();
        let store = LocalBlobStore::new(dir.path().join("files"));

        let a = store.copy_into_store(&src).await.unwrap();
        let b = store.copy_into_store(&src).await.unwrap();

        assert_ne!(a.file_id, b.file_id);
        assert!(a.file_id.starts_with(FILE_ID_PREFIX));
        assert_eq!(a.file_id.len(), 11);
        assert_eq!(a.file_name, format!("{}.png", a.file_id));
        assert_eq!(a.mime_type, "image/png");
        assert_eq!(a.data_url(), format!("/api/file/{}", a.file_name));
        assert_eq!(std::fs::read(&a.stored_path).unwrap(), b"png bytes");
    }

    #[tokio::test]
    async fn empty_or_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.png");
        std::fs::write(&empty, b"").unwrap();
        let store = LocalBlobStore::new(dir.path().join("files"));

        assert_matches!(store.copy_into_store(&empty).await, Err(StoreError::Backend(_)));
        assert_matches!(
            store.copy_into_store(&dir.path().join("nope.png")).await,
            Err(StoreError::Io(_))
        );
    }
}
