use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::GarmentClass;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Inclusive HSV interval, OpenCV 8-bit convention (H in 0..180, S and V in 0..=255)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ColorRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| self.lower[c] <= hsv[c] && hsv[c] <= self.upper[c])
    }
}

pub const YELLOW: ColorRange = ColorRange::new([20, 100, 100], [30, 255, 255]);
pub const ORANGE: ColorRange = ColorRange::new([10, 100, 100], [20, 255, 255]);
pub const ORANGE_WIDE: ColorRange = ColorRange::new([10, 100, 100], [25, 255, 255]);
pub const FLUORESCENT_GREEN: ColorRange = ColorRange::new([40, 100, 100], [80, 255, 255]);

/// Confidence multiplier for contours whose width/height ratio lies strictly inside `(min_ratio, max_ratio)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AspectBoost {
    pub min_ratio: f32,
    pub max_ratio: f32,
    pub factor: f32,
}

impl Default for AspectBoost {
    fn default() -> Self {
        Self {
            min_ratio: 0.3,
            max_ratio: 3.0,
            factor: 1.2,
        }
    }
}

/// Tunables of the colour-threshold detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Frames wider than this are downscaled before processing
    pub max_width: Option<u32>,
    pub color_ranges: Vec<ColorRange>,
    /// Radius of the square structuring element for open/close; `None` skips cleanup
    pub morphology_radius: Option<u8>,
    pub min_area: f32,
    pub area_normalizer: f32,
    pub aspect_boost: Option<AspectBoost>,
    pub max_confidence: f32,
    pub confidence_cutoff: f32,
    pub fallback_confidence: f32,
}

impl DetectionConfig {
    /// Downscaling, three hue bands, morphological cleanup and shape boost
    pub fn ultra_light() -> Self {
        Self {
            max_width: Some(800),
            color_ranges: vec![YELLOW, ORANGE, FLUORESCENT_GREEN],
            morphology_radius: Some(2),
            min_area: 500.0,
            area_normalizer: 5000.0,
            aspect_boost: Some(AspectBoost::default()),
            max_confidence: 0.95,
            confidence_cutoff: 0.4,
            fallback_confidence: 0.6,
        }
    }

    /// Full-resolution yellow/orange thresholding with no cleanup
    pub fn simple() -> Self {
        Self {
            max_width: None,
            color_ranges: vec![YELLOW, ORANGE_WIDE],
            morphology_radius: None,
            min_area: 1000.0,
            area_normalizer: 10000.0,
            aspect_boost: None,
            max_confidence: 0.95,
            confidence_cutoff: 0.3,
            fallback_confidence: 0.7,
        }
    }

    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::UltraLight => Self::ultra_light(),
            Preset::Simple => Self::simple(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.color_ranges.is_empty() {
            return Err(ConfigError::Invalid("at least one color range is required".into()));
        }
        for range in &self.color_ranges {
            if (0..3).any(|c| range.lower[c] > range.upper[c]) {
                return Err(ConfigError::Invalid(format!(
                    "color range lower bound {:?} exceeds upper bound {:?}",
                    range.lower, range.upper
                )));
            }
        }
        if self.max_width == Some(0) {
            return Err(ConfigError::Invalid("max_width must be positive".into()));
        }
        if !(self.area_normalizer > 0.0) {
            return Err(ConfigError::Invalid("area_normalizer must be positive".into()));
        }
        if self.min_area < 0.0 {
            return Err(ConfigError::Invalid("min_area must not be negative".into()));
        }
        if !(0.0..=1.0).contains(&self.max_confidence) {
            return Err(ConfigError::Invalid("max_confidence must be within [0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence_cutoff) {
            return Err(ConfigError::Invalid("confidence_cutoff must be within [0, 1]".into()));
        }
        if !(0.0..=self.max_confidence).contains(&self.fallback_confidence) {
            return Err(ConfigError::Invalid(
                "fallback_confidence must be within [0, max_confidence]".into(),
            ));
        }
        if let Some(boost) = &self.aspect_boost {
            if boost.min_ratio >= boost.max_ratio || boost.factor < 0.0 {
                return Err(ConfigError::Invalid(format!("invalid aspect boost {:?}", boost)));
            }
        }
        Ok(())
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self::ultra_light()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    UltraLight,
    Simple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorKind {
    #[default]
    Color,
    Model,
}

/// Settings for the ONNX model strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Tried in order; the first existing file is loaded
    pub candidate_paths: Vec<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Model class id -> reported class
    pub classes: Vec<GarmentClass>,
    pub fallback_confidence: f32,
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            candidate_paths: vec![
                PathBuf::from("garment_detection/weights/best.onnx"),
                PathBuf::from("trained_model/garment_detection/weights/best.onnx"),
                PathBuf::from("best.onnx"),
            ],
            input_width: 640,
            input_height: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            classes: vec![GarmentClass::NoGarment, GarmentClass::HasGarment],
            fallback_confidence: 0.6,
            intra_threads: 4,
        }
    }
}

impl ModelConfig {
    /// First candidate that exists on disk
    pub fn resolve_path(&self) -> Option<&Path> {
        self.candidate_paths
            .iter()
            .map(PathBuf::as_path)
            .find(|p| p.exists())
    }
}

/// Everything needed to assemble a detection service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub strategy: DetectorKind,
    pub detection: DetectionConfig,
    pub model: ModelConfig,
    /// TrueType/OpenType font used for box labels; boxes are drawn without text when unset
    pub label_font: Option<PathBuf>,
    pub jpeg_quality: u8,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            strategy: DetectorKind::default(),
            detection: DetectionConfig::default(),
            model: ModelConfig::default(),
            label_font: None,
            jpeg_quality: 85,
        }
    }
}

impl ServiceConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate()?;
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::Invalid("jpeg_quality must be within 1..=100".into()));
        }
        if self.model.classes.is_empty() {
            return Err(ConfigError::Invalid("model class table must not be empty".into()));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(ConfigError::Invalid("model input size must be positive".into()));
        }
        Ok(())
    }
}
