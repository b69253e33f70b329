//! Coordinate conversion and rectangle overlap tests.
//!
//! Detected layers arrive as boxes normalized to `[0, 1]` against the source
//! raster. Cropping needs absolute pixel boxes (plus a small margin), and
//! placement works on canvas-space rectangles in floating point.

use serde::{Deserialize, Serialize};

/// Pixels added on every side of a detected layer before cropping.
pub const DEFAULT_EXPAND_PX: u32 = 4;

// ---------------------------------------------------------------------------
// Normalized boxes
// ---------------------------------------------------------------------------

/// A box in normalized image coordinates, each component in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl NormalizedBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// True when every coordinate lies in `[0, 1]` and the box has positive
    /// extent on both axes. NaN coordinates are never valid.
    pub fn is_valid(&self) -> bool {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        in_unit(self.x1)
            && in_unit(self.y1)
            && in_unit(self.x2)
            && in_unit(self.y2)
            && self.x1 < self.x2
            && self.y1 < self.y2
    }
}

// ---------------------------------------------------------------------------
// Pixel boxes
// ---------------------------------------------------------------------------

/// A box in absolute pixel coordinates. `x2`/`y2` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelBox {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Convert back to normalized coordinates for a `width` x `height` raster.
    pub fn to_normalized(&self, width: u32, height: u32) -> NormalizedBox {
        let w = f64::from(width.max(1));
        let h = f64::from(height.max(1));
        NormalizedBox {
            x1: f64::from(self.x1) / w,
            y1: f64::from(self.y1) / h,
            x2: f64::from(self.x2) / w,
            y2: f64::from(self.y2) / h,
        }
    }
}

/// Absolute coordinates of a layer and its margin-expanded crop box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsoluteCoords {
    pub absolute: PixelBox,
    pub expanded: PixelBox,
}

/// Convert a normalized box to absolute pixel coordinates.
///
/// Each coordinate becomes `norm * dimension` truncated toward zero. The
/// expanded box grows by `expand_px` on every side, clamped to
/// `[0, dimension]`.
///
/// Returns `None` for out-of-range or inverted boxes, for a zero-sized
/// raster, and when the expanded box would be empty. Callers skip that
/// layer.
pub fn normalize_to_absolute(
    bbox: &NormalizedBox,
    width: u32,
    height: u32,
    expand_px: u32,
) -> Option<AbsoluteCoords> {
    if !bbox.is_valid() || width == 0 || height == 0 {
        return None;
    }

    let to_px = |norm: f64, dim: u32| (norm * f64::from(dim)) as u32;

    let absolute = PixelBox {
        x1: to_px(bbox.x1, width),
        y1: to_px(bbox.y1, height),
        x2: to_px(bbox.x2, width),
        y2: to_px(bbox.y2, height),
    };

    let expanded = PixelBox {
        x1: absolute.x1.saturating_sub(expand_px),
        y1: absolute.y1.saturating_sub(expand_px),
        x2: absolute.x2.saturating_add(expand_px).min(width),
        y2: absolute.y2.saturating_add(expand_px).min(height),
    };

    if expanded.is_empty() {
        return None;
    }

    Some(AbsoluteCoords { absolute, expanded })
}

// ---------------------------------------------------------------------------
// Canvas rectangles
// ---------------------------------------------------------------------------

/// An axis-aligned rectangle in canvas coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The same rectangle moved by `(dx, dy)`.
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// The same rectangle with its top-left corner at `(x, y)`.
    pub fn at(&self, x: f64, y: f64) -> Self {
        Self { x, y, ..*self }
    }
}

/// True if `a` and `b`, each grown by `padding`, intersect on both axes.
pub fn rects_overlap(a: &Rect, b: &Rect, padding: f64) -> bool {
    a.x < b.x + b.width + padding
        && a.x + a.width + padding > b.x
        && a.y < b.y + b.height + padding
        && a.y + a.height + padding > b.y
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
