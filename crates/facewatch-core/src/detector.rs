//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes an RGB frame into the 640×640 SCRFD input, decodes the three
//! anchor-free stride heads and suppresses overlapping boxes.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("empty frame ({0}x{1})")]
    EmptyFrame(u32, u32),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Maps letterboxed model coordinates back to frame coordinates.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// Raw head outputs for one stride level.
struct StrideOutputs<'a> {
    stride: usize,
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    /// Per-stride output indices for strides [8, 16, 32].
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            stride_indices,
        })
    }

    /// Detect faces in an RGB frame, most confident first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectorError::EmptyFrame(width, height));
        }

        let (input, letterbox) = preprocess(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[pos];
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };

            let head = StrideOutputs {
                stride,
                scores: extract(score_idx, "scores")?,
                bboxes: extract(bbox_idx, "bboxes")?,
                kps: extract(kps_idx, "kps")?,
            };
            candidates.extend(decode_stride(&head, &letterbox, SCRFD_CONFIDENCE_THRESHOLD));
        }

        Ok(nms(candidates, SCRFD_NMS_THRESHOLD))
    }
}

/// Letterbox an RGB frame into a normalised NCHW tensor.
///
/// Padding stays at zero, which is exactly the normalised mean.
fn preprocess(image: &RgbImage) -> (Array4<f32>, Letterbox) {
    let (width, height) = image.dimensions();
    let size = SCRFD_INPUT_SIZE;
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);

    let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, px) in resized.enumerate_pixels() {
        let (tx, ty) = ((x + pad_x) as usize, (y + pad_y) as usize);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (px[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    let letterbox = Letterbox {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
    };
    (tensor, letterbox)
}

/// Discover output tensor ordering by name.
///
/// Named exports ("score_8", "bbox_16", "kps_32", ...) are mapped by name;
/// anything else falls back to the standard positional layout
/// [scores 8/16/32, bboxes 8/16/32, kps 8/16/32].
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&s| Some((find("score", s)?, find("bbox", s)?, find("kps", s)?)))
        .collect();

    match named {
        Some(idx) => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            [idx[0], idx[1], idx[2]]
        }
        None => {
            tracing::info!(?names, "SCRFD: output names not recognized, using positional mapping");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Decode candidate boxes and landmarks from one stride head.
fn decode_stride(head: &StrideOutputs<'_>, letterbox: &Letterbox, threshold: f32) -> Vec<BoundingBox> {
    let grid_w = SCRFD_INPUT_SIZE as usize / head.stride;
    let grid_h = SCRFD_INPUT_SIZE as usize / head.stride;
    let num_anchors = grid_w * grid_h * SCRFD_ANCHORS_PER_CELL;
    let stride = head.stride as f32;

    let mut detections = Vec::new();

    for (idx, &score) in head.scores.iter().enumerate().take(num_anchors) {
        if score <= threshold {
            continue;
        }
        let Some(dist) = head.bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_x = (cell % grid_w) as f32 * stride;
        let anchor_y = (cell / grid_w) as f32 * stride;

        let (x1, y1) = letterbox.unmap(anchor_x - dist[0] * stride, anchor_y - dist[1] * stride);
        let (x2, y2) = letterbox.unmap(anchor_x + dist[2] * stride, anchor_y + dist[3] * stride);

        let landmarks = head.kps.get(idx * 10..idx * 10 + 10).map(|k| {
            std::array::from_fn(|i| {
                letterbox.unmap(anchor_x + k[i * 2] * stride, anchor_y + k[i * 2 + 1] * stride)
            })
        });

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }

    detections
}

/// Non-Maximum Suppression. Output is sorted by descending confidence.
fn nms(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if keep.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}
