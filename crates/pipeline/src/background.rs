//! Stage 4: the flat background plate placed under an image's layers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, Rgb, RgbImage};
use layersplit_core::geometry::PixelBox;

use crate::error::StageResult;

/// Plate colour when every pixel is covered by a layer.
pub const DEFAULT_BACKGROUND: [u8; 3] = [240, 240, 240];

const WHITE: [u8; 3] = [255, 255, 255];

/// Most frequent colour of `image` outside `excluded`.
///
/// Ties go to the smaller RGB triple. If the winner is pure white and the
/// best non-white colour has at least a tenth of white's count, the
/// non-white colour is used instead.
pub fn dominant_color(image: &DynamicImage, excluded: &[PixelBox]) -> [u8; 3] {
    let rgb = image.to_rgb8();
    let mut counts: HashMap<[u8; 3], u64> = HashMap::new();

    for (x, y, px) in rgb.enumerate_pixels() {
        let covered = excluded
            .iter()
            .any(|b| x >= b.x1 && x < b.x2 && y >= b.y1 && y < b.y2);
        if !covered {
            *counts.entry(px.0).or_default() += 1;
        }
    }

    let best = |skip_white: bool| {
        counts
            .iter()
            .filter(|(c, _)| !(skip_white && **c == WHITE))
            .max_by(|(ca, na), (cb, nb)| na.cmp(nb).then_with(|| cb.cmp(ca)))
            .map(|(c, n)| (*c, *n))
    };

    match best(false) {
        None => DEFAULT_BACKGROUND,
        Some((WHITE, white_count)) => match best(true) {
            Some((color, count)) if count * 10 >= white_count => color,
            _ => WHITE,
        },
        Some((color, _)) => color,
    }
}

/// Write `<cutout_dir>/<base_name>_background.png`: a plate the size of the
/// source, flat-filled with its dominant colour.
pub async fn synthesize_background(
    image: Arc<DynamicImage>,
    excluded: Vec<PixelBox>,
    cutout_dir: &Path,
    base_name: &str,
) -> StageResult<PathBuf> {
    let path = cutout_dir.join(format!("{base_name}_background.png"));
    let out = path.clone();
    let cutout_dir = cutout_dir.to_path_buf();

    tokio::task::spawn_blocking(move || -> StageResult<()> {
        let color = dominant_color(&image, &excluded);
        tracing::debug!(?color, "Background colour chosen");

        std::fs::create_dir_all(&cutout_dir)?;
        RgbImage::from_pixel(image.width(), image.height(), Rgb(color)).save(&out)?;
        Ok(())
    })
    .await??;

    Ok(path)
}
