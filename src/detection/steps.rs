use crate::config::ColorRange;
use crate::detection::scoring::{classify, ConfidenceModel};
use crate::detection::{contours, preprocessing};
use crate::pipeline::{MetadataValue, PipelineContext, PipelineData, PipelineStep};
use anyhow::Result;
use image::DynamicImage;

/// Threshold the frame in HSV space against a set of colour ranges (OR-ed)
pub struct ColorMaskStep {
    pub ranges: Vec<ColorRange>,
}

impl PipelineStep for ColorMaskStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let mask = preprocessing::threshold_mask(&item.image.to_rgb8(), &self.ranges);
            let new_item = PipelineData {
                image: DynamicImage::ImageLuma8(mask),
                ..item
            };
            result.push(new_item);
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Color Mask"
    }
}

/// Remove speckles and close small gaps (open, then close)
pub struct MorphologyStep {
    pub radius: u8,
}

impl PipelineStep for MorphologyStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();
        for item in data {
            let cleaned = preprocessing::clean_mask(&item.image.to_luma8(), self.radius);
            let new_item = PipelineData {
                image: DynamicImage::ImageLuma8(cleaned),
                ..item
            };
            result.push(new_item);
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "Morphology"
    }
}

/// Find external contours in the mask - splits one frame into many regions
pub struct ContourDetectionStep {
    pub min_area: f32,
}

impl PipelineStep for ContourDetectionStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();

        for item in data {
            let mask = item.image.to_luma8();
            let found = contours::find_external_contours(&mask);
            let total = found.len();
            let kept = contours::filter_by_area(found, self.min_area);
            tracing::debug!("  {} of {} contours reach min area {}", kept.len(), total, self.min_area);

            // Each contour becomes its own PipelineData
            for contour in kept {
                let bbox = contour.bounding_box();
                let region = image::imageops::crop_imm(
                    item.frame.as_ref(),
                    bbox.x,
                    bbox.y,
                    bbox.width,
                    bbox.height,
                )
                .to_image();

                let contour_data = PipelineData::from_region(
                    DynamicImage::ImageRgb8(region),
                    item.frame.clone(),
                    bbox,
                )
                .with_metadata("area", MetadataValue::Float(contour.area()))
                .with_metadata("aspect_ratio", MetadataValue::Float(contour.aspect_ratio()))
                .with_metadata("border_points", MetadataValue::Int(contour.points.len() as i32));

                result.push(contour_data);
            }
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Contour Detection"
    }
}

/// Attach a confidence derived from area and aspect ratio
pub struct ScoringStep {
    pub model: ConfidenceModel,
}

impl PipelineStep for ScoringStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();

        for item in data {
            let area = item
                .get_float("area")
                .ok_or_else(|| anyhow::anyhow!("Missing area"))?;
            let bbox = item
                .bbox
                .ok_or_else(|| anyhow::anyhow!("Missing region bounding box"))?;

            let confidence = self.model.score(area, &bbox);
            result.push(item.with_metadata("confidence", MetadataValue::Float(confidence)));
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Confidence Scoring"
    }
}

/// Label regions by comparing their confidence against a cutoff
pub struct ClassificationStep {
    pub cutoff: f32,
}

impl PipelineStep for ClassificationStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();

        for item in data {
            let confidence = item
                .get_float("confidence")
                .ok_or_else(|| anyhow::anyhow!("Missing confidence"))?;
            let class = classify(confidence, self.cutoff);
            result.push(item.with_metadata("class", MetadataValue::String(class.as_str().to_string())));
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Classification"
    }
}
