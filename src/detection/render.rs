use ab_glyph::{FontVec, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;
use std::sync::Arc;

use super::DetectError;
use crate::config::ConfigError;
use crate::models::{Detection, GarmentClass};

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);

pub fn class_color(class: GarmentClass) -> Rgb<u8> {
    match class {
        GarmentClass::HasGarment => GREEN,
        GarmentClass::NoGarment => RED,
    }
}

/// Draws detections as coloured rectangles, with text labels when a font is loaded
#[derive(Clone)]
pub struct Renderer {
    font: Option<Arc<FontVec>>,
    thickness: u32,
    label_scale: f32,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            font: None,
            thickness: 2,
            label_scale: 16.0,
        }
    }

    pub fn with_font_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", path.display(), e)))?;
        self.font = Some(Arc::new(font));
        Ok(self)
    }

    pub fn with_thickness(mut self, thickness: u32) -> Self {
        self.thickness = thickness.max(1);
        self
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Copy of `frame` with every detection drawn on it
    pub fn annotate(&self, frame: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = frame.clone();

        for detection in detections {
            let color = class_color(detection.class);
            let bbox = &detection.bbox;

            for t in 0..self.thickness {
                let inset_w = bbox.width.saturating_sub(2 * t);
                let inset_h = bbox.height.saturating_sub(2 * t);
                if inset_w == 0 || inset_h == 0 {
                    break;
                }
                let rect = Rect::at((bbox.x + t) as i32, (bbox.y + t) as i32).of_size(inset_w, inset_h);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }

            if let Some(font) = &self.font {
                let label = format!("{}: {:.2}", detection.class, detection.confidence);
                let text_y = (bbox.y as i32 - self.label_scale as i32 - 2).max(0);
                draw_text_mut(
                    &mut canvas,
                    color,
                    bbox.x as i32,
                    text_y,
                    PxScale::from(self.label_scale),
                    font.as_ref(),
                    &label,
                );
            }
        }

        canvas
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode an annotated frame as JPEG
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, DetectError> {
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder
        .encode_image(img)
        .map_err(|e| DetectError::ProcessingFailed(format!("failed to encode annotated image: {}", e)))?;
    Ok(buffer)
}
