use std::path::PathBuf;

use layersplit_core::geometry::DEFAULT_EXPAND_PX;
use layersplit_core::placement::PlacementConfig;

/// Maximum simultaneous matting operations per image.
pub const DEFAULT_MAX_MATTE_CONCURRENCY: usize = 4;

/// Default directory the blob store serves from.
pub const DEFAULT_FILES_DIR: &str = "./user_data/files";

/// Settings shared by every pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Margin added around each detected layer before cropping.
    pub expand_px: u32,
    pub max_matte_concurrency: usize,
    pub placement: PlacementConfig,
    /// Where `RemoteRef` image locators are resolved.
    pub files_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            expand_px: DEFAULT_EXPAND_PX,
            max_matte_concurrency: DEFAULT_MAX_MATTE_CONCURRENCY,
            placement: PlacementConfig::default(),
            files_dir: PathBuf::from(DEFAULT_FILES_DIR),
        }
    }
}
