//! Image preparation for the vision request.

use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

/// Largest side sent to the model.
pub const DEFAULT_MAX_DIMENSION: u32 = 2048;

/// JPEG quality of the inline payload.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Size that fits `(width, height)` within `max_dimension` on both sides,
/// keeping the aspect ratio. Images already small enough are unchanged.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width <= max_dimension && height <= max_dimension {
        return (width, height);
    }
    let ratio = f64::min(
        f64::from(max_dimension) / f64::from(width),
        f64::from(max_dimension) / f64::from(height),
    );
    let w = (f64::from(width) * ratio) as u32;
    let h = (f64::from(height) * ratio) as u32;
    (w.max(1), h.max(1))
}

/// Downscale, flatten to RGB and JPEG-encode `img`.
pub fn encode_jpeg(
    img: &DynamicImage,
    max_dimension: u32,
    quality: u8,
) -> Result<Vec<u8>, image::ImageError> {
    let (w, h) = fit_within(img.width(), img.height(), max_dimension);
    let resized;
    let img = if (w, h) != (img.width(), img.height()) {
        resized = img.resize_exact(w, h, FilterType::Lanczos3);
        &resized
    } else {
        img
    };

    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Cursor::new(Vec::new());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
    Ok(buf.into_inner())
}

/// Read `path` and return a `data:image/jpeg;base64,...` URL. Blocking.
pub fn image_data_url(
    path: &Path,
    max_dimension: u32,
    quality: u8,
) -> Result<String, image::ImageError> {
    let img = image::open(path)?;
    let jpeg = encode_jpeg(&img, max_dimension, quality)?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(jpeg);
    Ok(format!("data:image/jpeg;base64,{b64}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn small_images_are_untouched() {
        assert_eq!(fit_within(800, 600, 2048), (800, 600));
        assert_eq!(fit_within(2048, 2048, 2048), (2048, 2048));
    }

    #[test]
    fn large_images_fit_longest_side() {
        assert_eq!(fit_within(4096, 2048, 2048), (2048, 1024));
        assert_eq!(fit_within(1024, 4096, 2048), (512, 2048));
    }

    #[test]
    fn encodes_rgba_as_jpeg_within_bounds() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(300, 100, Rgba([10, 20, 30, 128])));
        let jpeg = encode_jpeg(&img, 150, DEFAULT_JPEG_QUALITY).unwrap();

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (150, 50));
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn data_url_has_jpeg_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.png");
        RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();

        let url = image_data_url(&path, DEFAULT_MAX_DIMENSION, DEFAULT_JPEG_QUALITY).unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
    }
}
