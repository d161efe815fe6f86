use anyhow::Result;
use image::{DynamicImage, RgbImage};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::models::BoundingBox;

/// Data that flows through the pipeline
/// Each PipelineData represents the whole frame or a single region of it
#[derive(Clone)]
pub struct PipelineData {
    /// Working image of the current stage (frame, mask or region crop)
    pub image: DynamicImage,

    /// The processed frame every region refers to (shared via Arc)
    pub frame: Arc<RgbImage>,

    /// Region within the frame (None means full frame)
    pub bbox: Option<BoundingBox>,

    /// Metadata for tracking properties (e.g., "area", "confidence", ...)
    pub metadata: HashMap<String, MetadataValue>,
}

/// Metadata value types
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Bool(bool),
    Float(f32),
    String(String),
    Int(i32),
}

impl PipelineData {
    /// Create PipelineData for a full frame
    pub fn from_frame(frame: RgbImage) -> Self {
        let frame = Arc::new(frame);
        Self {
            image: DynamicImage::ImageRgb8(frame.as_ref().clone()),
            frame,
            bbox: None,
            metadata: HashMap::new(),
        }
    }

    /// Create PipelineData for a region of a frame
    pub fn from_region(image: DynamicImage, frame: Arc<RgbImage>, bbox: BoundingBox) -> Self {
        Self {
            image,
            frame,
            bbox: Some(bbox),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.metadata.get(key) {
            Some(MetadataValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_float(&self, key: &str) -> Option<f32> {
        match self.metadata.get(key) {
            Some(MetadataValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.metadata.get(key) {
            Some(MetadataValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.metadata.get(key) {
            Some(MetadataValue::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Context available to all pipeline steps
#[derive(Clone, Default)]
pub struct PipelineContext {
    pub debug: Option<DebugConfig>,
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Process data and return transformed data
    /// Steps can split data (1 → many), filter (many → fewer), or transform (many → many)
    fn process(&self, data: Vec<PipelineData>, context: &PipelineContext) -> Result<Vec<PipelineData>>;

    /// Human-readable name for this step (used in logs and debug directories)
    fn name(&self) -> &str;
}

/// Composable pipeline builder
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Helper method to add a step from a Box (for convenience)
    pub fn add_step_boxed(mut self, step: Box<dyn PipelineStep>) -> Self {
        self.steps.push(Arc::from(step));
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step sequentially on a frame
    pub fn run(&self, frame: RgbImage) -> Result<Vec<PipelineData>> {
        self.run_partial(frame, self.steps.len())
    }

    /// Run the pipeline but stop after `num_steps` steps (useful for inspecting masks)
    pub fn run_partial(&self, frame: RgbImage, num_steps: usize) -> Result<Vec<PipelineData>> {
        let mut data = vec![PipelineData::from_frame(frame)];
        self.save_debug_output("00_input", &data)?;

        for (step_idx, step) in self.steps.iter().take(num_steps).enumerate() {
            debug!("Running step: {} (processing {} items)", step.name(), data.len());

            data = step.process(data, &self.context)?;

            let step_dir_name = format!(
                "{:02}_{}",
                step_idx + 1,
                step.name().to_lowercase().replace(' ', "_")
            );
            self.save_debug_output(&step_dir_name, &data)?;

            debug!("  → {} items", data.len());
        }

        Ok(data)
    }

    fn save_debug_output(&self, step_dir_name: &str, data: &[PipelineData]) -> Result<()> {
        let Some(debug_config) = &self.context.debug else {
            return Ok(());
        };

        let step_dir = debug_config.output_dir.join(step_dir_name);
        std::fs::create_dir_all(&step_dir)?;

        for (idx, item) in data.iter().enumerate() {
            let output_path = step_dir.join(format!("{:02}.png", idx + 1));
            item.image
                .save(&output_path)
                .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))?;
        }

        debug!("  Debug: saved {} images to {}/", data.len(), step_dir_name);
        Ok(())
    }
}
