pub mod preprocessing;
pub mod contours;
pub mod scoring;
pub mod steps;
pub mod render;
pub mod model;

use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, DetectionConfig, DetectorKind, ServiceConfig};
use crate::models::{Detection, DetectionResult, GarmentClass};
use crate::pipeline::{Pipeline, PipelineData};
use render::Renderer;
use scoring::ConfidenceModel;
use steps::*;

pub use model::ModelDetector;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("processing failed: {0}")]
    ProcessingFailed(String),
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
}

/// A detection strategy
pub trait Detector: Send + Sync {
    /// Run detection on a decoded image. The result is never empty.
    fn detect(&self, image: &DynamicImage) -> Result<DetectionResult, DetectError>;

    /// Short identifier reported to clients (e.g. "color_detection")
    fn method(&self) -> &str;

    /// Whether the detector can serve requests without further initialisation
    fn is_ready(&self) -> bool;

    /// Load any lazily-initialised resources up front
    fn warm_up(&self) -> Result<(), DetectError> {
        Ok(())
    }
}

/// Build the colour-threshold pipeline for a configuration
pub fn build_color_pipeline(config: &DetectionConfig) -> Pipeline {
    let mut pipeline = Pipeline::new().add_step(Arc::new(ColorMaskStep {
        ranges: config.color_ranges.clone(),
    }));

    if let Some(radius) = config.morphology_radius {
        pipeline = pipeline.add_step(Arc::new(MorphologyStep { radius }));
    }

    pipeline
        .add_step(Arc::new(ContourDetectionStep {
            min_area: config.min_area,
        }))
        .add_step(Arc::new(ScoringStep {
            model: ConfidenceModel::from_config(config),
        }))
        .add_step(Arc::new(ClassificationStep {
            cutoff: config.confidence_cutoff,
        }))
}

/// Detects high-visibility garments by their hue
pub struct ColorThresholdDetector {
    config: DetectionConfig,
    pipeline: Pipeline,
    renderer: Renderer,
}

impl ColorThresholdDetector {
    pub fn new(config: DetectionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            pipeline: build_color_pipeline(&config),
            config,
            renderer: Renderer::new(),
        })
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Save every step's intermediate images below `output_dir` (must be empty)
    pub fn with_debug(mut self, output_dir: PathBuf) -> anyhow::Result<Self> {
        self.pipeline = self.pipeline.with_debug(output_dir)?;
        Ok(self)
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

fn to_detection(item: &PipelineData) -> Result<Detection, DetectError> {
    let missing = |what: &str| DetectError::ProcessingFailed(format!("pipeline result without {}", what));

    let bbox = item.bbox.ok_or_else(|| missing("bounding box"))?;
    let confidence = item.get_float("confidence").ok_or_else(|| missing("confidence"))?;
    let class = item
        .get_string("class")
        .ok_or_else(|| missing("class"))?
        .parse::<GarmentClass>()
        .map_err(DetectError::ProcessingFailed)?;

    Ok(Detection::new(bbox, confidence, class))
}

impl Detector for ColorThresholdDetector {
    fn detect(&self, image: &DynamicImage) -> Result<DetectionResult, DetectError> {
        preprocessing::ensure_not_empty(image.width(), image.height())?;

        let frame = preprocessing::limit_width(image.to_rgb8(), self.config.max_width);
        let (width, height) = frame.dimensions();
        debug!(width, height, "processing frame");

        let items = self
            .pipeline
            .run(frame.clone())
            .map_err(|e| DetectError::ProcessingFailed(format!("{:#}", e)))?;

        let mut detections = items.iter().map(to_detection).collect::<Result<Vec<_>, _>>()?;
        if detections.is_empty() {
            debug!("no garment-coloured region found, emitting full-frame fallback");
            detections.push(Detection::fallback(width, height, self.config.fallback_confidence));
        }

        let annotated = self.renderer.annotate(&frame, &detections);
        Ok(DetectionResult { detections, annotated })
    }

    fn method(&self) -> &str {
        "color_detection"
    }

    fn is_ready(&self) -> bool {
        true
    }
}

/// Assemble the detector selected by the configuration
pub fn build_detector(config: &ServiceConfig) -> Result<Arc<dyn Detector>, ConfigError> {
    config.validate()?;

    let renderer = match &config.label_font {
        Some(path) => Renderer::new().with_font_file(path)?,
        None => Renderer::new(),
    };

    let detector: Arc<dyn Detector> = match config.strategy {
        DetectorKind::Color => Arc::new(
            ColorThresholdDetector::new(config.detection.clone())?.with_renderer(renderer),
        ),
        DetectorKind::Model => {
            Arc::new(ModelDetector::new(config.model.clone()).with_renderer(renderer))
        }
    };
    Ok(detector)
}
