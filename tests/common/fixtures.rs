use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

/// Color constants for tests (hue in OpenCV 8-bit units noted alongside)
pub const PURE_YELLOW: Rgb<u8> = Rgb([255, 255, 0]); // H 30
pub const PURE_ORANGE: Rgb<u8> = Rgb([255, 128, 0]); // H 15
pub const PURE_GREEN: Rgb<u8> = Rgb([0, 255, 0]); // H 60
pub const PURE_BLUE: Rgb<u8> = Rgb([0, 0, 255]); // H 120
pub const MID_GRAY: Rgb<u8> = Rgb([128, 128, 128]); // S 0

/// Creates a uniformly coloured image
pub fn solid_image(width: u32, height: u32, color: Rgb<u8>) -> RgbImage {
    RgbImage::from_pixel(width, height, color)
}

/// Paints a filled rectangle onto an image
pub fn fill_rect(img: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, color: Rgb<u8>) {
    for py in y..(y + height).min(img.height()) {
        for px in x..(x + width).min(img.width()) {
            img.put_pixel(px, py, color);
        }
    }
}

/// Blue background with one solid rectangle of `color`
pub fn image_with_rect(
    size: (u32, u32),
    rect: (u32, u32, u32, u32),
    color: Rgb<u8>,
) -> DynamicImage {
    let mut img = solid_image(size.0, size.1, PURE_BLUE);
    fill_rect(&mut img, rect.0, rect.1, rect.2, rect.3, color);
    DynamicImage::ImageRgb8(img)
}

/// Encodes an image as PNG bytes
pub fn encode_png(img: &DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("Failed to encode test image");
    bytes
}

/// Encodes an image as a PNG data URL, the way browsers submit canvas captures
pub fn png_data_url(img: &DynamicImage) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(encode_png(img)))
}

/// Asserts two values differ by at most `tolerance`
pub fn assert_close(actual: u32, expected: u32, tolerance: u32, what: &str) {
    assert!(
        actual.abs_diff(expected) <= tolerance,
        "{}: expected {} ± {}, got {}",
        what,
        expected,
        tolerance,
        actual
    );
}
