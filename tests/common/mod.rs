#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from garment_detect for tests
pub use garment_detect::{
    BoundingBox, ColorThresholdDetector, DetectError, DetectionConfig, DetectionService, Detector,
    GarmentClass, ServiceConfig,
};
