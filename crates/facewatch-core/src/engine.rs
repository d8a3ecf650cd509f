//! Inference engine contract and the SCRFD + ArcFace implementation.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Detection;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Face inference: detection plus one embedding per detected face.
///
/// "No face" is `Ok(None)` / an empty list; `Err` is reserved for hard
/// failures of the engine itself.
pub trait FaceEngine {
    /// Every face in the frame with its embedding, most confident first.
    fn detect_all(&mut self, image: &RgbImage) -> Result<Vec<Detection>, EngineError>;

    /// The single most confident face, if any.
    fn detect_single(&mut self, image: &RgbImage) -> Result<Option<Detection>, EngineError> {
        Ok(self.detect_all(image)?.into_iter().next())
    }
}

impl<E: FaceEngine + ?Sized> FaceEngine for Box<E> {
    fn detect_all(&mut self, image: &RgbImage) -> Result<Vec<Detection>, EngineError> {
        (**self).detect_all(image)
    }

    fn detect_single(&mut self, image: &RgbImage) -> Result<Option<Detection>, EngineError> {
        (**self).detect_single(image)
    }
}

/// Default directory for the ONNX model files.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facewatch/models")
}

/// SCRFD detection + ArcFace embedding, both on ONNX Runtime.
pub struct OnnxFaceEngine {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEngine {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path) -> Result<Self, EngineError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceEngine for OnnxFaceEngine {
    fn detect_all(&mut self, image: &RgbImage) -> Result<Vec<Detection>, EngineError> {
        let faces = self.detector.detect(image)?;
        let mut detections = Vec::with_capacity(faces.len());

        for bbox in faces {
            if bbox.landmarks.is_none() {
                tracing::debug!(confidence = bbox.confidence, "face without landmarks; skipping");
                continue;
            }
            let embedding = self.recognizer.extract(image, &bbox)?;
            detections.push(Detection { bbox, embedding });
        }

        Ok(detections)
    }

    fn detect_single(&mut self, image: &RgbImage) -> Result<Option<Detection>, EngineError> {
        let faces = self.detector.detect(image)?;
        let Some(bbox) = faces.into_iter().find(|f| f.landmarks.is_some()) else {
            return Ok(None);
        };
        let embedding = self.recognizer.extract(image, &bbox)?;
        Ok(Some(Detection { bbox, embedding }))
    }
}
