//! Per-image layer pipeline.
//!
//! One [`LayerPipeline::run_image`] call takes a source image through
//! resolve, analyze, crop + concurrent matte, background synthesis,
//! visualization and placement, and returns canvas-ready elements plus a
//! per-image outcome. Stage failures end that image only; they never
//! escape as errors.

pub mod background;
pub mod config;
pub mod crop;
pub mod error;
pub mod matte;
pub mod progress;
pub mod resolve;
pub mod runner;
pub mod visualize;

pub use config::PipelineConfig;
pub use error::{StageError, StageResult};
pub use progress::{NoopObserver, Stage, StageObserver};
pub use runner::{ImageRun, LayerPipeline};
