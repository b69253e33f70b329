//! Stage 5: an annotated copy of the source with every layer box outlined.
//!
//! The picture is a debugging aid. Callers log a failure here and move on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, Rgba, RgbaImage};
use layersplit_core::geometry::PixelBox;
use layersplit_core::layers::DetectedLayer;

use crate::error::StageResult;

/// Outline colours, picked by `layer.index % PALETTE.len()`.
pub const PALETTE: [[u8; 3]; 10] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
    [255, 165, 0],
    [128, 0, 128],
    [0, 128, 0],
    [128, 128, 0],
];

pub const OUTLINE_WIDTH: u32 = 3;

pub fn palette_color(index: usize) -> Rgba<u8> {
    let [r, g, b] = PALETTE[index % PALETTE.len()];
    Rgba([r, g, b, 255])
}

/// Draw a `width`-pixel outline just inside `b`, clipped to the canvas.
pub fn draw_outline(canvas: &mut RgbaImage, b: &PixelBox, width: u32, color: Rgba<u8>) {
    let x2 = b.x2.min(canvas.width());
    let y2 = b.y2.min(canvas.height());
    for y in b.y1..y2 {
        for x in b.x1..x2 {
            let on_edge = x < b.x1 + width
                || y < b.y1 + width
                || x + width >= x2
                || y + width >= y2;
            if on_edge {
                canvas.put_pixel(x, y, color);
            }
        }
    }
}

/// Outline each layer's unexpanded box.
pub fn draw_outlines(image: &DynamicImage, layers: &[DetectedLayer]) -> RgbaImage {
    let mut canvas = image.to_rgba8();
    for layer in layers {
        draw_outline(
            &mut canvas,
            &layer.coords.absolute,
            OUTLINE_WIDTH,
            palette_color(layer.index),
        );
    }
    canvas
}

/// Save the annotated image as `<vis_dir>/<base_name>_visualized.png`.
pub async fn save_visualization(
    image: Arc<DynamicImage>,
    layers: Vec<DetectedLayer>,
    vis_dir: &Path,
    base_name: &str,
) -> StageResult<PathBuf> {
    let path = vis_dir.join(format!("{base_name}_visualized.png"));
    let out = path.clone();
    let vis_dir = vis_dir.to_path_buf();

    tokio::task::spawn_blocking(move || -> StageResult<()> {
        std::fs::create_dir_all(&vis_dir)?;
        draw_outlines(&image, &layers).save(&out)?;
        Ok(())
    })
    .await??;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use layersplit_core::geometry::NormalizedBox;
    use layersplit_core::layers::LayerSpec;

    #[test]
    fn palette_wraps() {
        assert_eq!(palette_color(0), Rgba([255, 0, 0, 255]));
        assert_eq!(palette_color(11), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn outline_is_hollow() {
        let mut canvas = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        let b = PixelBox { x1: 2, y1: 2, x2: 18, y2: 18 };
        draw_outline(&mut canvas, &b, 3, Rgba([255, 0, 0, 255]));

        assert_eq!(canvas.get_pixel(2, 10), &Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(4, 10), &Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(17, 17), &Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(10, 10), &Rgba([0, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(1, 1), &Rgba([0, 0, 0, 255]));
    }

    #[tokio::test]
    async fn writes_visualized_png() {
        let dir = tempfile::tempdir().unwrap();
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 40, Rgba([9, 9, 9, 255])));
        let spec = LayerSpec {
            content: "title".into(),
            position: NormalizedBox::new(0.25, 0.25, 0.75, 0.75),
        };
        let layer = DetectedLayer::from_spec(1, &spec, 40, 40, 4).unwrap();

        let path = save_visualization(Arc::new(img), vec![layer], &dir.path().join("vis"), "poster")
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("vis").join("poster_visualized.png"));
        let saved = image::open(&path).unwrap().to_rgba8();
        // Box (10, 10)..(30, 30), index 1 is green.
        assert_eq!(saved.get_pixel(10, 10), &Rgba([0, 255, 0, 255]));
        assert_eq!(saved.get_pixel(20, 20), &Rgba([9, 9, 9, 255]));
    }
}
