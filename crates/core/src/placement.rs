//! Collision-avoiding placement of a batch of new canvas elements.
//!
//! A batch (the layers cut from one source image plus its background plate)
//! is moved as a unit: one anchor is chosen for the source rectangle and the
//! resulting offset is applied to every element of the batch, so the layers
//! keep their relative layout exactly.
//!
//! Candidates are tried in a fixed order and the first one that clears every
//! existing element wins. When none does, a fixed fallback anchor is used and
//! the outcome is flagged so callers can tell it apart from a clean fit.

use serde::{Deserialize, Serialize};

use crate::geometry::{rects_overlap, Rect};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Horizontal/vertical distance between the source and the first candidates.
pub const DEFAULT_GAP: f64 = 50.0;

/// Clearance required between the anchor rectangle and existing elements.
pub const DEFAULT_PADDING: f64 = 10.0;

/// Horizontal advance of each scan attempt.
pub const DEFAULT_SCAN_STEP: f64 = 100.0;

/// Number of scan attempts before giving up.
pub const DEFAULT_MAX_SCAN_ATTEMPTS: u32 = 10;

/// Offset of the unconditional fallback anchor from the source.
pub const DEFAULT_FALLBACK_OFFSET: f64 = 200.0;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables of the placement search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementConfig {
    pub gap: f64,
    pub padding: f64,
    pub step: f64,
    pub max_scan_attempts: u32,
    pub fallback_offset: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            gap: DEFAULT_GAP,
            padding: DEFAULT_PADDING,
            step: DEFAULT_SCAN_STEP,
            max_scan_attempts: DEFAULT_MAX_SCAN_ATTEMPTS,
            fallback_offset: DEFAULT_FALLBACK_OFFSET,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Which candidate produced the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlacementStrategy {
    RightOf,
    Below,
    Diagonal,
    /// `attempt` is 1-based.
    Scan { attempt: u32 },
    /// No candidate cleared the existing elements; the anchor may overlap.
    Fallback,
}

/// Anchor chosen for a batch and the offset it implies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementOutcome {
    pub anchor_x: f64,
    pub anchor_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub strategy: PlacementStrategy,
}

impl PlacementOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self.strategy, PlacementStrategy::Fallback)
    }

    /// Move `rect` by the batch offset.
    pub fn apply(&self, rect: &Rect) -> Rect {
        rect.translate(self.offset_x, self.offset_y)
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Ordered anchor candidates for `source`, excluding the fallback.
pub fn candidates(source: &Rect, config: &PlacementConfig) -> Vec<(PlacementStrategy, f64, f64)> {
    let right_x = source.x + source.width + config.gap;
    let below_y = source.y + source.height + config.gap;

    let mut out = vec![
        (PlacementStrategy::RightOf, right_x, source.y),
        (PlacementStrategy::Below, source.x, below_y),
        (PlacementStrategy::Diagonal, right_x, below_y),
    ];
    for attempt in 1..=config.max_scan_attempts {
        out.push((
            PlacementStrategy::Scan { attempt },
            right_x + f64::from(attempt) * config.step,
            source.y,
        ));
    }
    out
}

/// Choose an anchor for a batch whose source rectangle is `source`.
///
/// A candidate is accepted when a rectangle of the source's size placed at
/// it does not overlap any of `existing` once padded by `config.padding`.
pub fn find_anchor(source: &Rect, existing: &[Rect], config: &PlacementConfig) -> PlacementOutcome {
    let fits = |x: f64, y: f64| {
        let placed = source.at(x, y);
        !existing
            .iter()
            .any(|other| rects_overlap(&placed, other, config.padding))
    };

    let (strategy, anchor_x, anchor_y) = candidates(source, config)
        .into_iter()
        .find(|&(_, x, y)| fits(x, y))
        .unwrap_or((
            PlacementStrategy::Fallback,
            source.x + source.width + config.fallback_offset,
            source.y + config.fallback_offset,
        ));

    PlacementOutcome {
        anchor_x,
        anchor_y,
        offset_x: anchor_x - source.x,
        offset_y: anchor_y - source.y,
        strategy,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
