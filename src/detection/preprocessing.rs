use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};

use super::DetectError;
use crate::config::ColorRange;

const HSV_SHIFT: u32 = 12;
const HUE_RANGE: i32 = 180;

/// Decode an encoded image buffer (PNG, JPEG, ...)
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, DetectError> {
    if bytes.is_empty() {
        return Err(DetectError::ProcessingFailed("empty image buffer".into()));
    }
    let img = image::load_from_memory(bytes)
        .map_err(|e| DetectError::ProcessingFailed(format!("failed to decode image: {}", e)))?;
    ensure_not_empty(img.width(), img.height())?;
    Ok(img)
}

pub fn ensure_not_empty(width: u32, height: u32) -> Result<(), DetectError> {
    if width == 0 || height == 0 {
        return Err(DetectError::ProcessingFailed(format!(
            "image has no pixels ({}x{})",
            width, height
        )));
    }
    Ok(())
}

/// Downscale proportionally (bilinear) so the width does not exceed `max_width`
pub fn limit_width(img: RgbImage, max_width: Option<u32>) -> RgbImage {
    let Some(max_width) = max_width else {
        return img;
    };
    let (width, height) = img.dimensions();
    if width <= max_width {
        return img;
    }

    let new_height = ((height as u64 * max_width as u64) / width as u64).max(1) as u32;
    image::imageops::resize(&img, max_width, new_height, FilterType::Triangle)
}

/// Convert one RGB pixel to 8-bit HSV with hue halved into 0..180.
/// Uses the same fixed-point rounding as OpenCV's `COLOR_RGB2HSV`.
pub fn rgb_to_hsv(pixel: Rgb<u8>) -> [u8; 3] {
    let [r, g, b] = pixel.0.map(i32::from);
    let v = r.max(g).max(b);
    let vmin = r.min(g).min(b);
    let diff = v - vmin;

    let round = 1 << (HSV_SHIFT - 1);
    let s = if v == 0 {
        0
    } else {
        let sdiv = (((255 << HSV_SHIFT) as f64) / v as f64).round() as i32;
        (diff * sdiv + round) >> HSV_SHIFT
    };

    let h = if diff == 0 {
        0
    } else {
        let raw = if v == r {
            g - b
        } else if v == g {
            b - r + 2 * diff
        } else {
            r - g + 4 * diff
        };
        let hdiv = (((HUE_RANGE << HSV_SHIFT) as f64) / (6.0 * diff as f64)).round() as i32;
        let h = (raw * hdiv + round) >> HSV_SHIFT;
        if h < 0 { h + HUE_RANGE } else { h }
    };

    [h as u8, s as u8, v as u8]
}

/// Binary mask (255 = selected) of pixels falling into ANY of the ranges
pub fn threshold_mask(img: &RgbImage, ranges: &[ColorRange]) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut mask = GrayImage::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let hsv = rgb_to_hsv(*pixel);
        if ranges.iter().any(|range| range.contains(hsv)) {
            mask.put_pixel(x, y, Luma([255u8]));
        }
    }

    mask
}

/// Morphological open followed by close with a square `(2r+1)` element
pub fn clean_mask(mask: &GrayImage, radius: u8) -> GrayImage {
    let opened = open(mask, Norm::LInf, radius);
    close(&opened, Norm::LInf, radius)
}
