use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{Array, Array2, Array4, ArrayView2};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{inputs, value::Tensor};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info};

use super::render::Renderer;
use super::{preprocessing, DetectError, Detector};
use crate::config::ModelConfig;
use crate::models::{BoundingBox, Detection, DetectionResult};

const INPUT_NAME: &str = "images";

/// Raw box decoded from the model output, in source-image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Candidate {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &Candidate) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }

    /// Integer box clipped to a `width` x `height` frame; `None` when nothing is left
    pub fn to_bbox(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let x1 = self.x1.clamp(0.0, width as f32).floor() as u32;
        let y1 = self.y1.clamp(0.0, height as f32).floor() as u32;
        let x2 = self.x2.clamp(0.0, width as f32).floor() as u32;
        let y2 = self.y2.clamp(0.0, height as f32).floor() as u32;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(BoundingBox::new(x1, y1, x2 - x1, y2 - y1))
    }
}

/// Decode a YOLOv8 head of shape `[4 + nc, anchors]` (cx, cy, w, h, class scores).
/// `scale` maps model-input coordinates back to the source image.
pub fn decode_predictions(
    output: ArrayView2<f32>,
    scale: (f32, f32),
    confidence_threshold: f32,
) -> Vec<Candidate> {
    let (rows, anchors) = output.dim();
    if rows < 5 {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    for j in 0..anchors {
        let (class_id, confidence) = (4..rows)
            .map(|r| (r - 4, output[[r, j]]))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if confidence < confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (output[[0, j]], output[[1, j]], output[[2, j]], output[[3, j]]);
        candidates.push(Candidate {
            class_id,
            confidence,
            x1: (cx - w / 2.0) * scale.0,
            y1: (cy - h / 2.0) * scale.1,
            x2: (cx + w / 2.0) * scale.0,
            y2: (cy + h / 2.0) * scale.1,
        });
    }

    candidates
}

/// Greedy per-class NMS; result is ordered by descending confidence
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

/// Resize to the model input and lay out as normalised NCHW
pub fn image_to_tensor(img: &DynamicImage, input_width: u32, input_height: u32) -> Array4<f32> {
    let resized = img.resize_exact(input_width, input_height, FilterType::Triangle);
    let mut tensor = Array::zeros((1, 3, input_height as usize, input_width as usize));

    for (x, y, pixel) in resized.pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b, _] = pixel.0;
        tensor[[0, 0, y, x]] = (r as f32) / 255.0;
        tensor[[0, 1, y, x]] = (g as f32) / 255.0;
        tensor[[0, 2, y, x]] = (b as f32) / 255.0;
    }

    tensor
}

fn build_session(model_path: &Path, intra_threads: usize) -> Result<Session, ort::Error> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?
        .commit_from_file(model_path)?;
    Ok(session)
}

fn load_session(config: &ModelConfig) -> Result<Session, DetectError> {
    let path = config.resolve_path().ok_or_else(|| {
        DetectError::ModelUnavailable(format!(
            "no model file found (searched {:?})",
            config.candidate_paths
        ))
    })?;

    info!(path = %path.display(), "loading detection model");
    build_session(path, config.intra_threads)
        .map_err(|e| DetectError::ModelUnavailable(format!("{}: {}", path.display(), e)))
}

fn run_inference(session: &mut Session, input: Array4<f32>) -> Result<Array2<f32>, DetectError> {
    let failed = |e: &dyn std::fmt::Display| DetectError::ProcessingFailed(format!("inference failed: {}", e));

    let shape: Vec<usize> = input.shape().to_vec();
    let (data, _offset) = input.into_raw_vec_and_offset();
    let input_tensor = Tensor::from_array(([shape[0], shape[1], shape[2], shape[3]], data))
        .map_err(|e| failed(&e))?;
    let outputs = session
        .run(inputs![INPUT_NAME => input_tensor])
        .map_err(|e| failed(&e))?;

    let (out_shape, out_data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| failed(&e))?;
    if out_shape.len() != 3 || out_shape[0] != 1 {
        return Err(failed(&format!("unexpected output shape {:?}", out_shape)));
    }

    let output = Array2::from_shape_vec(
        (out_shape[1] as usize, out_shape[2] as usize),
        out_data.to_vec(),
    )
    .map_err(|e| failed(&e))?;

    // Some exports emit [anchors, 4 + nc] instead of [4 + nc, anchors]
    if output.nrows() > output.ncols() {
        return Ok(output.reversed_axes());
    }
    Ok(output)
}

/// Detection through a pre-trained ONNX model.
/// The session is created on first use and shared; inferences are serialised by its lock.
/// Readiness is tracked outside the lock so health checks never wait on an inference.
pub struct ModelDetector {
    config: ModelConfig,
    session: Mutex<Option<Session>>,
    loaded: AtomicBool,
    renderer: Renderer,
}

impl ModelDetector {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            loaded: AtomicBool::new(false),
            renderer: Renderer::new(),
        }
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn with_session<R>(
        &self,
        f: impl FnOnce(&mut Session) -> Result<R, DetectError>,
    ) -> Result<R, DetectError> {
        // A panic inside an earlier inference leaves the session itself intact
        let mut guard = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(load_session(&self.config)?);
            self.loaded.store(true, Ordering::Release);
        }
        let session = guard
            .as_mut()
            .ok_or_else(|| DetectError::ModelUnavailable("model not loaded".into()))?;
        f(session)
    }

    /// Map surviving candidates to detections in frame coordinates
    pub fn to_detections(&self, candidates: &[Candidate], width: u32, height: u32) -> Vec<Detection> {
        candidates
            .iter()
            .filter_map(|c| {
                let Some(class) = self.config.classes.get(c.class_id).copied() else {
                    debug!(class_id = c.class_id, "dropping box of unmapped class");
                    return None;
                };
                let bbox = c.to_bbox(width, height)?;
                Some(Detection::new(bbox, c.confidence.clamp(0.0, 1.0), class))
            })
            .collect()
    }
}

impl Detector for ModelDetector {
    fn detect(&self, image: &DynamicImage) -> Result<DetectionResult, DetectError> {
        let (width, height) = image.dimensions();
        preprocessing::ensure_not_empty(width, height)?;

        let input = image_to_tensor(image, self.config.input_width, self.config.input_height);

        let start_time = Instant::now();
        let output = self.with_session(|session| run_inference(session, input))?;
        debug!(elapsed = ?start_time.elapsed(), "model inference");

        let scale = (
            width as f32 / self.config.input_width as f32,
            height as f32 / self.config.input_height as f32,
        );
        let candidates = decode_predictions(output.view(), scale, self.config.confidence_threshold);
        let kept = non_max_suppression(candidates, self.config.iou_threshold);

        let mut detections = self.to_detections(&kept, width, height);
        if detections.is_empty() {
            detections.push(Detection::fallback(width, height, self.config.fallback_confidence));
        }

        let frame = image.to_rgb8();
        let annotated = self.renderer.annotate(&frame, &detections);
        Ok(DetectionResult { detections, annotated })
    }

    fn method(&self) -> &str {
        "model"
    }

    fn is_ready(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    fn warm_up(&self) -> Result<(), DetectError> {
        self.with_session(|_| Ok(()))
    }
}
