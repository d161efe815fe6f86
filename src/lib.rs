pub mod config;
pub mod detection;
pub mod models;
pub mod pipeline;
pub mod service;

pub use config::{
    AspectBoost, ColorRange, ConfigError, DetectionConfig, DetectorKind, ModelConfig, Preset,
    ServiceConfig,
};
pub use detection::{
    build_detector, ColorThresholdDetector, DetectError, Detector, ModelDetector,
};
pub use models::{BoundingBox, Contour, Detection, DetectionRecord, DetectionResult, GarmentClass};
pub use pipeline::{
    DebugConfig, MetadataValue, Pipeline, PipelineContext, PipelineData, PipelineStep,
};
pub use service::{
    DetectRequest, DetectResponse, DetectionService, ErrorResponse, HealthStatus, ServiceError,
    ServiceInfo,
};
