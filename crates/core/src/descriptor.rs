//! Image descriptors submitted with a split-layers Job.
//!
//! A descriptor names where the source raster comes from and where the
//! image currently sits on the canvas. The geometry is what the placement
//! search starts from.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::geometry::Rect;

/// Prefix under which the blob store serves files to the canvas.
pub const FILE_URL_PREFIX: &str = "/api/file/";

/// Where the pixels of a source image come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    /// A file already on the local filesystem.
    LocalPath { path: PathBuf },
    /// Base64 payload, optionally with a `data:image/...;base64,` header.
    InlineBytes { data: String },
    /// A blob-store reference: `/api/file/<name>` or a bare file name.
    RemoteRef { locator: String },
}

impl ImageSource {
    pub fn kind(&self) -> &'static str {
        match self {
            ImageSource::LocalPath { .. } => "local_path",
            ImageSource::InlineBytes { .. } => "inline_bytes",
            ImageSource::RemoteRef { .. } => "remote_ref",
        }
    }
}

/// One source image and its current canvas geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub source: ImageSource,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    /// `<= 0` means "use the raster's pixel width".
    #[serde(default)]
    pub width: f64,
    /// `<= 0` means "use the raster's pixel height".
    #[serde(default)]
    pub height: f64,
}

impl ImageDescriptor {
    pub fn new(source: ImageSource, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            source,
            x,
            y,
            width,
            height,
        }
    }

    /// Structural checks done before any I/O.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (name, v) in [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
        ] {
            if !v.is_finite() {
                return Err(CoreError::Validation(format!(
                    "Image {name} must be a finite number (got {v})"
                )));
            }
        }

        let empty = match &self.source {
            ImageSource::LocalPath { path } => path.as_os_str().is_empty(),
            ImageSource::InlineBytes { data } => data.trim().is_empty(),
            ImageSource::RemoteRef { locator } => locator.trim().is_empty(),
        };
        if empty {
            return Err(CoreError::Validation(format!(
                "Image source '{}' is empty",
                self.source.kind()
            )));
        }
        Ok(())
    }

    /// Canvas rectangle of the source image, substituting the raster size
    /// for a non-positive width or height.
    pub fn source_rect(&self, raster_width: u32, raster_height: u32) -> Rect {
        let width = if self.width > 0.0 {
            self.width
        } else {
            f64::from(raster_width)
        };
        let height = if self.height > 0.0 {
            self.height
        } else {
            f64::from(raster_height)
        };
        Rect::new(self.x, self.y, width, height)
    }
}

/// Validate a submission: a target canvas and at least one image.
pub fn validate_submission(canvas_id: &str, images: &[ImageDescriptor]) -> Result<(), CoreError> {
    if canvas_id.trim().is_empty() {
        return Err(CoreError::Validation(
            "Canvas id must not be empty".to_string(),
        ));
    }
    if images.is_empty() {
        return Err(CoreError::Validation(
            "At least one image is required".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn local(path: &str) -> ImageDescriptor {
        ImageDescriptor::new(
            ImageSource::LocalPath { path: path.into() },
            10.0,
            20.0,
            300.0,
            200.0,
        )
    }

    #[test]
    fn deserializes_tagged_sources() {
        let json = r#"[
            {"source": {"kind": "local_path", "path": "/tmp/a.png"}, "x": 1, "y": 2, "width": 3, "height": 4},
            {"source": {"kind": "inline_bytes", "data": "aGVsbG8="}},
            {"source": {"kind": "remote_ref", "locator": "/api/file/im_abc.png"}, "x": 5}
        ]"#;
        let images: Vec<ImageDescriptor> = serde_json::from_str(json).unwrap();

        assert_eq!(images.len(), 3);
        assert_matches!(images[0].source, ImageSource::LocalPath { .. });
        assert_eq!(images[0].height, 4.0);
        assert_matches!(images[1].source, ImageSource::InlineBytes { .. });
        assert_eq!(images[1].width, 0.0);
        assert_eq!(images[2].x, 5.0);
    }

    #[test]
    fn unknown_source_kind_is_rejected() {
        let json = r#"{"source": {"kind": "ftp", "url": "x"}}"#;
        assert!(serde_json::from_str::<ImageDescriptor>(json).is_err());
    }

    #[test]
    fn validate_rejects_empty_source_and_non_finite_geometry() {
        assert!(local("/tmp/a.png").validate().is_ok());
        assert_matches!(local("").validate(), Err(CoreError::Validation(_)));

        let mut bad = local("/tmp/a.png");
        bad.x = f64::NAN;
        assert_matches!(bad.validate(), Err(CoreError::Validation(_)));

        let blank = ImageDescriptor::new(
            ImageSource::RemoteRef {
                locator: "  ".into(),
            },
            0.0,
            0.0,
            0.0,
            0.0,
        );
        assert_matches!(blank.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn source_rect_substitutes_raster_size() {
        let d = local("/tmp/a.png");
        assert_eq!(d.source_rect(64, 32), Rect::new(10.0, 20.0, 300.0, 200.0));

        let mut unsized_image = d.clone();
        unsized_image.width = 0.0;
        unsized_image.height = -1.0;
        assert_eq!(
            unsized_image.source_rect(64, 32),
            Rect::new(10.0, 20.0, 64.0, 32.0)
        );
    }

    #[test]
    fn submission_needs_canvas_and_images() {
        assert!(validate_submission("c1", &[local("/tmp/a.png")]).is_ok());
        assert_matches!(
            validate_submission("", &[local("/tmp/a.png")]),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            validate_submission("c1", &[]),
            Err(CoreError::Validation(_))
        );
    }
}
