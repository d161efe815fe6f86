use crate::config::{AspectBoost, DetectionConfig};
use crate::models::{BoundingBox, GarmentClass};

/// Area/shape confidence model of the colour detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceModel {
    pub area_normalizer: f32,
    pub max_confidence: f32,
    pub aspect_boost: Option<AspectBoost>,
}

impl ConfidenceModel {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            area_normalizer: config.area_normalizer,
            max_confidence: config.max_confidence,
            aspect_boost: config.aspect_boost,
        }
    }

    /// `min(area / normalizer, max)`, boosted for plausible shapes, re-capped at `max`
    pub fn score(&self, area: f32, bbox: &BoundingBox) -> f32 {
        let mut confidence = (area / self.area_normalizer).min(self.max_confidence);

        if let Some(boost) = &self.aspect_boost {
            let aspect = bbox.aspect_ratio();
            if boost.min_ratio < aspect && aspect < boost.max_ratio {
                confidence *= boost.factor;
            }
        }

        confidence.clamp(0.0, self.max_confidence)
    }
}

pub fn classify(confidence: f32, cutoff: f32) -> GarmentClass {
    if confidence > cutoff {
        GarmentClass::HasGarment
    } else {
        GarmentClass::NoGarment
    }
}
