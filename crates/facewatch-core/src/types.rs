use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Label reported for a face that matches no gallery entry.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Intersection-over-Union with another box, in [0, 1].
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.width * self.height + other.width * other.height - inter;

        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
///
/// Distances are only comparable between embeddings produced by the same model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean (L2) distance between two embeddings.
    ///
    /// Embeddings of different dimensionality are infinitely far apart.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One face found in a frame. Lives for a single detection cycle.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// A labelled reference embedding, built once from a gallery image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceFace {
    pub label: String,
    pub image_path: PathBuf,
    pub embedding: Embedding,
}

/// Immutable, ordered set of reference faces.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    faces: Vec<ReferenceFace>,
}

impl Gallery {
    pub fn new(faces: Vec<ReferenceFace>) -> Self {
        Self { faces }
    }

    pub fn faces(&self) -> &[ReferenceFace] {
        &self.faces
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.faces.iter().map(|f| f.label.as_str())
    }
}

/// Decided identity for one face.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Label {
    Known(String),
    Unknown,
}

impl Label {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Label::Unknown)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Label::Known(name) => name,
            Label::Unknown => UNKNOWN_LABEL,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of matching a probe embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub label: Label,
    /// Distance to the closest gallery entry, even when unmatched.
    /// Infinite for an empty gallery.
    pub distance: f32,
}

impl fmt::Display for MatchResult {
    /// Overlay text, e.g. `Alice (0.31)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2})", self.label, self.distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x, y, width: w, height: h, confidence: 1.0, landmarks: None,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_bbox(0.0, 0.0, 100.0, 100.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0);
        let b = make_bbox(20.0, 20.0, 10.0, 10.0);
        assert!(a.iou(&b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0);
        let b = make_bbox(5.0, 0.0, 10.0, 10.0);
        // Overlap: 5x10 = 50, union: 100+100-50 = 150
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_euclidean_distance_dimension_mismatch() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![0.0, 0.0, 0.0]);
        assert_eq!(a.euclidean_distance(&b), f32::INFINITY);
    }

    #[test]
    fn test_label_display() {
        assert_eq!(Label::Known("Alice".into()).to_string(), "Alice");
        assert_eq!(Label::Unknown.to_string(), UNKNOWN_LABEL);
        let result = MatchResult { label: Label::Unknown, distance: 0.912 };
        assert_eq!(result.to_string(), "unknown (0.91)");
    }
}
