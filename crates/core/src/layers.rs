//! Layers as they move through the pipeline: reported by the analyzer,
//! validated against the source raster, and finally placed on the canvas.

use serde::{Deserialize, Serialize};

use crate::geometry::{normalize_to_absolute, AbsoluteCoords, NormalizedBox, Rect};
use crate::providers::StoredBlob;

/// Label used for the synthesized background plate.
pub const BACKGROUND_CONTENT: &str = "background";

/// A labeled region exactly as the analyzer reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub content: String,
    pub position: NormalizedBox,
}

/// A layer whose box converted cleanly to pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLayer {
    /// Position in the analyzer's list, kept so results can be re-sorted.
    pub index: usize,
    pub content: String,
    pub normalized_box: NormalizedBox,
    pub coords: AbsoluteCoords,
}

impl DetectedLayer {
    /// Validate `spec` against a `width` x `height` raster. `None` means the
    /// box is unusable and the layer is dropped.
    pub fn from_spec(
        index: usize,
        spec: &LayerSpec,
        width: u32,
        height: u32,
        expand_px: u32,
    ) -> Option<Self> {
        let coords = normalize_to_absolute(&spec.position, width, height, expand_px)?;
        Some(Self {
            index,
            content: spec.content.clone(),
            normalized_box: spec.position,
            coords,
        })
    }

    /// Canvas rectangle of the expanded crop, before the batch offset.
    ///
    /// Pixel coordinates are scaled by `source.width / raster_width` (and
    /// likewise for height) and moved to the source's canvas origin.
    pub fn canvas_rect(&self, source: &Rect, raster_width: u32, raster_height: u32) -> Rect {
        let sx = source.width / f64::from(raster_width.max(1));
        let sy = source.height / f64::from(raster_height.max(1));
        let e = &self.coords.expanded;
        Rect::new(
            source.x + f64::from(e.x1) * sx,
            source.y + f64::from(e.y1) * sy,
            f64::from(e.width()) * sx,
            f64::from(e.height()) * sy,
        )
    }
}

/// A new canvas element ready to be committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedElement {
    pub geometry: Rect,
    pub blob: StoredBlob,
    pub content: String,
}
