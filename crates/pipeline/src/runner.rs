//! Per-image orchestration of the pipeline stages.

use std::path::Path;
use std::sync::Arc;

use layersplit_core::descriptor::ImageDescriptor;
use layersplit_core::geometry::{PixelBox, Rect};
use layersplit_core::job::{ImageOutcome, ImageSummary};
use layersplit_core::layers::{DetectedLayer, PlacedElement, BACKGROUND_CONTENT};
use layersplit_core::placement::find_anchor;
use layersplit_core::providers::{Analyzer, BlobStore, MattingProvider};

use crate::background::synthesize_background;
use crate::config::PipelineConfig;
use crate::crop::crop_layers;
use crate::error::{StageError, StageResult};
use crate::matte::matte_all;
use crate::progress::{Stage, StageObserver};
use crate::resolve::{resolve_image, ResolvedImage};
use crate::visualize::save_visualization;

/// Everything one image contributes to its Job.
#[derive(Debug, Clone)]
pub struct ImageRun {
    pub outcome: ImageOutcome,
    /// Canvas-ready elements, background plate first. Empty unless the
    /// outcome is a success.
    pub elements: Vec<PlacedElement>,
}

impl ImageRun {
    fn skipped(image_index: usize, reason: impl Into<String>) -> Self {
        Self {
            outcome: ImageOutcome::Skipped {
                image_index,
                reason: reason.into(),
            },
            elements: Vec::new(),
        }
    }

    fn error(image_index: usize, error: &StageError) -> Self {
        Self {
            outcome: ImageOutcome::Error {
                image_index,
                error: error.to_string(),
            },
            elements: Vec::new(),
        }
    }
}

/// Scratch directories of one image.
struct ImageDirs {
    root: std::path::PathBuf,
    layer: std::path::PathBuf,
    cutout: std::path::PathBuf,
    vis: std::path::PathBuf,
}

impl ImageDirs {
    fn new(scratch_dir: &Path, image_index: usize) -> Self {
        let root = scratch_dir.join(format!("img_{image_index}"));
        let layer = root.join("layer");
        Self {
            cutout: layer.join("cutout"),
            vis: root.join("vis"),
            layer,
            root,
        }
    }
}

/// Runs images through the stages using the injected collaborators.
pub struct LayerPipeline {
    analyzer: Arc<dyn Analyzer>,
    matting: Arc<dyn MattingProvider>,
    blobs: Arc<dyn BlobStore>,
    config: PipelineConfig,
}

impl LayerPipeline {
    pub fn new(
        analyzer: Arc<dyn Analyzer>,
        matting: Arc<dyn MattingProvider>,
        blobs: Arc<dyn BlobStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            analyzer,
            matting,
            blobs,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one image. `existing` holds the canvas rectangles new
    /// elements must avoid. Never fails: stage errors become an
    /// [`ImageOutcome::Error`].
    pub async fn run_image(
        &self,
        image_index: usize,
        descriptor: &ImageDescriptor,
        existing: &[Rect],
        scratch_dir: &Path,
        observer: &dyn StageObserver,
    ) -> ImageRun {
        match self
            .try_run_image(image_index, descriptor, existing, scratch_dir, observer)
            .await
        {
            Ok(run) => run,
            Err(e) => {
                tracing::warn!(image_index, error = %e, "Image processing failed");
                ImageRun::error(image_index, &e)
            }
        }
    }

    async fn try_run_image(
        &self,
        image_index: usize,
        descriptor: &ImageDescriptor,
        existing: &[Rect],
        scratch_dir: &Path,
        observer: &dyn StageObserver,
    ) -> StageResult<ImageRun> {
        let dirs = ImageDirs::new(scratch_dir, image_index);

        observer.stage_started(image_index, Stage::Resolve).await;
        let resolved =
            resolve_image(descriptor, image_index, &dirs.root, &self.config.files_dir).await?;
        tracing::debug!(
            image_index,
            width = resolved.width,
            height = resolved.height,
            source = descriptor.source.kind(),
            "Image resolved"
        );

        observer.stage_started(image_index, Stage::Analyze).await;
        let layers = self.detect_layers(image_index, &resolved).await?;
        if layers.is_empty() {
            tracing::info!(image_index, "No layers detected, skipping image");
            return Ok(ImageRun::skipped(image_index, "No layers detected"));
        }
        let layers_detected = layers.len();

        observer.stage_started(image_index, Stage::Matte).await;
        let crops = crop_layers(
            Arc::clone(&resolved.image),
            layers.clone(),
            dirs.layer.clone(),
            resolved.base_name(),
        )
        .await?;
        let mattes = matte_all(
            Arc::clone(&self.matting),
            &crops,
            &dirs.cutout,
            self.config.max_matte_concurrency,
        )
        .await;
        let matte_failures = mattes.iter().filter(|m| !m.is_success()).count();

        observer.stage_started(image_index, Stage::Visualize).await;
        let excluded: Vec<PixelBox> = layers.iter().map(|l| l.coords.expanded).collect();
        let background_path = synthesize_background(
            Arc::clone(&resolved.image),
            excluded,
            &dirs.cutout,
            &resolved.base_name(),
        )
        .await?;
        let visualization_file_id = self.visualize(&resolved, &layers, &dirs.vis).await;

        let source = descriptor.source_rect(resolved.width, resolved.height);
        let placement = find_anchor(&source, existing, &self.config.placement);
        if placement.is_fallback() {
            tracing::warn!(
                image_index,
                anchor_x = placement.anchor_x,
                anchor_y = placement.anchor_y,
                "No free anchor found, placing at fallback position"
            );
        }

        let mut elements = Vec::with_capacity(crops.len() + 1);
        elements.push(PlacedElement {
            geometry: placement.apply(&source),
            blob: self.blobs.copy_into_store(&background_path).await?,
            content: BACKGROUND_CONTENT.to_string(),
        });

        for (crop, matte) in crops.iter().zip(&mattes) {
            let path = matte.output_path.as_deref().unwrap_or(&crop.crop_path);
            let blob = match self.blobs.copy_into_store(path).await {
                Ok(blob) => blob,
                Err(e) => {
                    tracing::warn!(
                        image_index,
                        layer_index = crop.layer.index,
                        error = %e,
                        "Could not store layer, dropping it"
                    );
                    continue;
                }
            };
            let rect = crop
                .layer
                .canvas_rect(&source, resolved.width, resolved.height);
            elements.push(PlacedElement {
                geometry: placement.apply(&rect),
                blob,
                content: crop.layer.content.clone(),
            });
        }

        tracing::info!(
            image_index,
            layers_detected,
            layers_placed = elements.len(),
            matte_failures,
            strategy = ?placement.strategy,
            "Image processed"
        );

        Ok(ImageRun {
            outcome: ImageOutcome::Success(ImageSummary {
                image_index,
                layers_detected,
                layers_placed: elements.len(),
                matte_failures,
                placement: placement.strategy,
                fallback_placement: placement.is_fallback(),
                visualization_file_id,
            }),
            elements,
        })
    }

    /// Analyze and keep the layers whose boxes are usable.
    async fn detect_layers(
        &self,
        image_index: usize,
        resolved: &ResolvedImage,
    ) -> StageResult<Vec<DetectedLayer>> {
        let response = self
            .analyzer
            .analyze(&resolved.path)
            .await
            .map_err(|e| StageError::Analysis(e.to_string()))?;
        let specs = self
            .analyzer
            .extract_layers(&response)
            .map_err(|e| StageError::Analysis(e.error))?;

        let mut layers = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            match DetectedLayer::from_spec(
                index,
                spec,
                resolved.width,
                resolved.height,
                self.config.expand_px,
            ) {
                Some(layer) => layers.push(layer),
                None => {
                    let err = StageError::Placement(format!("{:?}", spec.position));
                    tracing::warn!(image_index, layer_index = index, error = %err, "Dropping layer");
                }
            }
        }
        Ok(layers)
    }

    /// Draw and store the debug visualization. Failures only log.
    async fn visualize(
        &self,
        resolved: &ResolvedImage,
        layers: &[DetectedLayer],
        vis_dir: &Path,
    ) -> Option<String> {
        let stored = async {
            let path = save_visualization(
                Arc::clone(&resolved.image),
                layers.to_vec(),
                vis_dir,
                &resolved.base_name(),
            )
            .await?;
            Ok::<_, StageError>(self.blobs.copy_into_store(&path).await?)
        }
        .await;

        match stored {
            Ok(blob) => Some(blob.file_id),
            Err(e) => {
                tracing::warn!(path = %vis_dir.display(), error = %e, "Visualization failed");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
