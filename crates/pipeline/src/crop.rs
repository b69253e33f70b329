//! Stage 3a: cut each detected layer's expanded box out of the source.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use layersplit_core::layers::DetectedLayer;

use crate::error::StageResult;

/// A layer saved as its own PNG, ready for matting.
#[derive(Debug, Clone)]
pub struct CroppedLayer {
    pub layer: DetectedLayer,
    pub crop_path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl CroppedLayer {
    /// Stem of the crop file, reused to name the cutout.
    pub fn file_stem(&self) -> String {
        self.crop_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("layer_{}", self.layer.index + 1))
    }
}

/// Keep alphanumerics, space, `-` and `_`, then turn spaces into `_`.
pub fn safe_label(content: &str) -> String {
    content
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim_end()
        .replace(' ', "_")
}

/// Crop every layer into `layer_dir` as `<base>_<label>_<n>.png`, `n` being
/// the 1-based detection index. Runs on the blocking pool.
pub async fn crop_layers(
    image: Arc<DynamicImage>,
    layers: Vec<DetectedLayer>,
    layer_dir: PathBuf,
    base_name: String,
) -> StageResult<Vec<CroppedLayer>> {
    tokio::task::spawn_blocking(move || crop_layers_blocking(&image, layers, &layer_dir, &base_name))
        .await?
}

fn crop_layers_blocking(
    image: &DynamicImage,
    layers: Vec<DetectedLayer>,
    layer_dir: &Path,
    base_name: &str,
) -> StageResult<Vec<CroppedLayer>> {
    std::fs::create_dir_all(layer_dir)?;

    let mut out = Vec::with_capacity(layers.len());
    for layer in layers {
        let e = layer.coords.expanded;
        let crop = image.crop_imm(e.x1, e.y1, e.width(), e.height());
        let name = format!(
            "{base_name}_{}_{}.png",
            safe_label(&layer.content),
            layer.index + 1
        );
        let crop_path = layer_dir.join(name);
        crop.save(&crop_path)?;

        out.push(CroppedLayer {
            width: crop.width(),
            height: crop.height(),
            crop_path,
            layer,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};
    use layersplit_core::geometry::NormalizedBox;
    use layersplit_core::layers::LayerSpec;

    #[test]
    fn safe_label_strips_specials() {
        assert_eq!(safe_label("Company logo"), "Company_logo");
        assert_eq!(safe_label("a/b:c*d "), "abcd");
        assert_eq!(safe_label("品名 - 1"), "品名_-_1");
    }

    #[tokio::test]
    async fn crops_expanded_boxes_to_named_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut img = RgbaImage::from_pixel(100, 50, Rgba([0, 0, 0, 255]));
        img.put_pixel(20, 10, Rgba([255, 0, 0, 255]));

        let spec = LayerSpec {
            content: "red dot".into(),
            position: NormalizedBox::new(0.2, 0.2, 0.4, 0.6),
        };
        let layer = DetectedLayer::from_spec(1, &spec, 100, 50, 4).unwrap();

        let crops = crop_layers(
            Arc::new(DynamicImage::ImageRgba8(img)),
            vec![layer],
            dir.path().join("layer"),
            "poster".into(),
        )
        .await
        .unwrap();

        assert_eq!(crops.len(), 1);
        let c = &crops[0];
        assert_eq!(c.crop_path, dir.path().join("layer").join("poster_red_dot_2.png"));
        assert_eq!(c.file_stem(), "poster_red_dot_2");
        // Expanded box (16, 6)..(44, 34).
        assert_eq!((c.width, c.height), (28, 28));

        let saved = image::open(&c.crop_path).unwrap();
        assert_eq!(saved.dimensions(), (28, 28));
        assert_eq!(saved.get_pixel(4, 4), Rgba([255, 0, 0, 255]));
    }
}
