//! Stage 1: turn an image descriptor into a decoded raster on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use image::DynamicImage;
use layersplit_core::descriptor::{ImageDescriptor, ImageSource, FILE_URL_PREFIX};

use crate::error::{StageError, StageResult};

/// A source image ready for analysis and cropping.
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub path: PathBuf,
    pub image: Arc<DynamicImage>,
    pub width: u32,
    pub height: u32,
}

impl ResolvedImage {
    /// File stem used to name derived files.
    pub fn base_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string())
    }
}

/// Resolve `descriptor` to a local file and decode it.
///
/// Inline payloads are written under `scratch_dir`; blob-store references
/// are looked up in `files_dir`.
pub async fn resolve_image(
    descriptor: &ImageDescriptor,
    image_index: usize,
    scratch_dir: &Path,
    files_dir: &Path,
) -> StageResult<ResolvedImage> {
    descriptor
        .validate()
        .map_err(|e| StageError::Validation(e.to_string()))?;

    let path = match &descriptor.source {
        ImageSource::LocalPath { path } => path.clone(),
        ImageSource::InlineBytes { data } => {
            write_inline(data, image_index, scratch_dir).await?
        }
        ImageSource::RemoteRef { locator } => files_dir.join(file_name_from_locator(locator)?),
    };

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| StageError::Validation(format!("Cannot read {}: {e}", path.display())))?;
    if bytes.is_empty() {
        return Err(StageError::Validation(format!(
            "Image file {} is empty",
            path.display()
        )));
    }

    let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await?
        .map_err(|e| StageError::Validation(format!("Cannot decode {}: {e}", path.display())))?;

    Ok(ResolvedImage {
        width: image.width(),
        height: image.height(),
        image: Arc::new(image),
        path,
    })
}

/// Strip an optional `data:...;base64,` header and decode.
pub fn decode_inline(data: &str) -> StageResult<Vec<u8>> {
    let payload = match data.trim().strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, b64)| b64)
            .ok_or_else(|| StageError::Validation("Data URL has no payload".to_string()))?,
        None => data.trim(),
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| StageError::Validation(format!("Invalid base64 image data: {e}")))?;
    if bytes.is_empty() {
        return Err(StageError::Validation("Inline image data is empty".to_string()));
    }
    Ok(bytes)
}

async fn write_inline(data: &str, image_index: usize, scratch_dir: &Path) -> StageResult<PathBuf> {
    let bytes = decode_inline(data)?;
    let ext = image::guess_format(&bytes)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("png");

    tokio::fs::create_dir_all(scratch_dir).await?;
    let path = scratch_dir.join(format!("source_{image_index}.{ext}"));
    tokio::fs::write(&path, &bytes).await?;
    Ok(path)
}

/// File name referenced by `/api/file/<name>` or a bare name.
pub fn file_name_from_locator(locator: &str) -> StageResult<&str> {
    let locator = locator.trim();
    let name = locator
        .strip_prefix(FILE_URL_PREFIX)
        .unwrap_or_else(|| locator.rsplit('/').next().unwrap_or(locator));

    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(StageError::Validation(format!(
            "Invalid file reference '{locator}'"
        )));
    }
    Ok(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use image::{Rgba, RgbaImage};

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([1, 2, 3, 255])))
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn descriptor(source: ImageSource) -> ImageDescriptor {
        ImageDescriptor::new(source, 0.0, 0.0, 0.0, 0.0)
    }

    // -- locators -----------------------------------------------------------

    #[test]
    fn locator_forms() {
        assert_eq!(file_name_from_locator("/api/file/im_1.png").unwrap(), "im_1.png");
        assert_eq!(file_name_from_locator("im_2.png").unwrap(), "im_2.png");
        assert_eq!(file_name_from_locator("http://h/x/im_3.png").unwrap(), "im_3.png");
        assert_matches!(file_name_from_locator("/api/file/"), Err(StageError::Validation(_)));
        assert_matches!(file_name_from_locator("/api/file/.."), Err(StageError::Validation(_)));
    }

    // -- inline data --------------------------------------------------------

    #[test]
    fn decode_inline_with_and_without_header() {
        let raw = base64::engine::general_purpose::STANDARD.encode(b"abc");
        assert_eq!(decode_inline(&raw).unwrap(), b"abc");
        assert_eq!(
            decode_inline(&format!("data:image/png;base64,{raw}")).unwrap(),
            b"abc"
        );
        assert_matches!(decode_inline("data:image/png"), Err(StageError::Validation(_)));
        assert_matches!(decode_inline("!!!"), Err(StageError::Validation(_)));
    }

    // -- resolve ------------------------------------------------------------

    #[tokio::test]
    async fn resolves_inline_png() {
        let dir = tempfile::tempdir().unwrap();
        let data = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png_bytes(5, 3))
        );
        let d = descriptor(ImageSource::InlineBytes { data });

        let resolved = resolve_image(&d, 2, dir.path(), dir.path()).await.unwrap();
        assert_eq!((resolved.width, resolved.height), (5, 3));
        assert_eq!(resolved.path, dir.path().join("source_2.png"));
        assert_eq!(resolved.base_name(), "source_2");
    }

    #[tokio::test]
    async fn resolves_remote_ref_in_files_dir() {
        let files = tempfile::tempdir().unwrap();
        std::fs::write(files.path().join("im_abc.png"), png_bytes(4, 4)).unwrap();
        let d = descriptor(ImageSource::RemoteRef {
            locator: "/api/file/im_abc.png".into(),
        });

        let resolved = resolve_image(&d, 0, files.path(), files.path()).await.unwrap();
        assert_eq!(resolved.path, files.path().join("im_abc.png"));
    }

    #[tokio::test]
    async fn missing_local_file_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let d = descriptor(ImageSource::LocalPath {
            path: dir.path().join("nope.png"),
        });
        assert_matches!(
            resolve_image(&d, 0, dir.path(), dir.path()).await,
            Err(StageError::Validation(_))
        );
    }

    #[tokio::test]
    async fn undecodable_file_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.png");
        std::fs::write(&path, b"not an image").unwrap();
        let d = descriptor(ImageSource::LocalPath { path });
        assert_matches!(
            resolve_image(&d, 0, dir.path(), dir.path()).await,
            Err(StageError::Validation(_))
        );
    }
}
