//! Transport-agnostic request handling for the detection service.
//!
//! A request carries a base64 image (bare or as a data URL); the response
//! carries the detections and a JPEG of the annotated frame. Failures are
//! typed and map to HTTP status codes through [`ServiceError::status_code`].

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{ConfigError, ServiceConfig};
use crate::detection::render::encode_jpeg;
use crate::detection::{build_detector, preprocessing, DetectError, Detector};
use crate::models::DetectionRecord;

pub const SERVICE_NAME: &str = "Garment Detection";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectRequest {
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectResponse {
    pub detections: Vec<DetectionRecord>,
    /// `data:image/jpeg;base64,...`
    pub annotated_image: String,
    pub success: bool,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub model_loaded: bool,
    pub description: String,
    pub method: String,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no image provided")]
    MissingImage,
    #[error("invalid request payload: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Detection(#[from] DetectError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::MissingImage | ServiceError::InvalidPayload(_) => 400,
            ServiceError::Detection(DetectError::ProcessingFailed(_)) => 422,
            ServiceError::Detection(DetectError::ModelUnavailable(_)) => 503,
            ServiceError::Internal(_) => 500,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            success: false,
        }
    }
}

/// Strip an optional `data:<mime>;base64,` prefix and decode the payload.
/// Line breaks and other ASCII whitespace inside the payload are ignored.
pub fn decode_base64_image(data: &str) -> Result<Vec<u8>, DetectError> {
    let payload = match data.split_once(',') {
        Some((header, rest)) if header.starts_with("data:") => rest,
        _ => data,
    };
    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if payload.is_empty() {
        return Err(DetectError::ProcessingFailed("empty image payload".into()));
    }

    STANDARD
        .decode(payload)
        .map_err(|e| DetectError::ProcessingFailed(format!("invalid base64 image: {}", e)))
}

pub fn to_data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

/// Request handler around one injected detection strategy
#[derive(Clone)]
pub struct DetectionService {
    detector: Arc<dyn Detector>,
    jpeg_quality: u8,
}

impl DetectionService {
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self {
            detector,
            jpeg_quality: 85,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let detector = build_detector(config)?;
        Ok(Self::new(detector).with_jpeg_quality(config.jpeg_quality))
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn detector(&self) -> &Arc<dyn Detector> {
        &self.detector
    }

    /// Load lazily-initialised detector resources before serving traffic
    pub async fn warm_up(&self) -> Result<(), ServiceError> {
        let detector = self.detector.clone();
        tokio::task::spawn_blocking(move || detector.warm_up())
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))??;
        info!(method = self.detector.method(), "detector ready");
        Ok(())
    }

    pub async fn detect(&self, request: DetectRequest) -> Result<DetectResponse, ServiceError> {
        let image = request
            .image
            .filter(|s| !s.trim().is_empty())
            .ok_or(ServiceError::MissingImage)?;

        let detector = self.detector.clone();
        let quality = self.jpeg_quality;

        let (detections, jpeg) = tokio::task::spawn_blocking(move || {
            let bytes = decode_base64_image(&image)?;
            let img = preprocessing::decode_image(&bytes)?;
            let result = detector.detect(&img)?;
            let jpeg = encode_jpeg(&result.annotated, quality)?;
            Ok::<_, DetectError>((result.records(), jpeg))
        })
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))??;

        Ok(DetectResponse {
            detections,
            annotated_image: to_data_url(&jpeg),
            success: true,
            method: self.detector.method().to_string(),
        })
    }

    /// Handle a raw JSON request body, returning the status code and JSON body
    pub async fn handle_json(&self, body: &str) -> (u16, serde_json::Value) {
        let outcome = match serde_json::from_str::<DetectRequest>(body) {
            Ok(request) => self.detect(request).await,
            Err(e) => Err(ServiceError::InvalidPayload(e.to_string())),
        };

        match outcome {
            Ok(response) => match serde_json::to_value(&response) {
                Ok(value) => (200, value),
                Err(e) => self.error_reply(ServiceError::Internal(e.to_string())),
            },
            Err(err) => self.error_reply(err),
        }
    }

    fn error_reply(&self, err: ServiceError) -> (u16, serde_json::Value) {
        let status = err.status_code();
        if status >= 500 {
            error!(status, "detection request failed: {}", err);
        } else {
            warn!(status, "detection request rejected: {}", err);
        }
        let body = serde_json::to_value(err.to_response())
            .unwrap_or_else(|_| serde_json::json!({ "error": err.to_string(), "success": false }));
        (status, body)
    }

    pub fn health(&self) -> HealthStatus {
        let ready = self.detector.is_ready();
        HealthStatus {
            status: "healthy".to_string(),
            model_loaded: ready,
            message: if ready {
                format!("{} detector ready", self.detector.method())
            } else {
                format!("{} detector loads on first request", self.detector.method())
            },
        }
    }

    pub fn info(&self) -> ServiceInfo {
        let description = match self.detector.method() {
            "model" => "Detects safety garments with a pre-trained object-detection model",
            _ => "Detects safety garments by their high-visibility colours",
        };
        ServiceInfo {
            name: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            model_loaded: self.detector.is_ready(),
            description: description.to_string(),
            method: self.detector.method().to_string(),
        }
    }
}
