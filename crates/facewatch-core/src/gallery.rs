//! Reference gallery construction.
//!
//! Runs single-face inference once per configured reference image. Entries
//! that yield no usable face are skipped; a hard engine failure aborts the
//! whole build.

use crate::engine::{EngineError, FaceEngine};
use crate::types::{Gallery, ReferenceFace};
use image::{ImageError, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One configured identity: a label and the reference image that shows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub label: String,
    pub image_path: PathBuf,
}

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("inference engine failed on reference `{label}`: {source}")]
    Engine {
        label: String,
        #[source]
        source: EngineError,
    },
    #[error("reference `{label}` produced a {actual}-dim embedding, gallery uses {expected}")]
    DimensionMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },
}

/// Build the gallery from images on disk.
pub fn build_gallery<E>(engine: &mut E, entries: &[GalleryEntry]) -> Result<Gallery, GalleryError>
where
    E: FaceEngine + ?Sized,
{
    build_gallery_with(engine, entries, |path| Ok(image::open(path)?.into_rgb8()))
}

/// Build the gallery with a caller-supplied image loader.
///
/// Unreadable images and images without a detectable face are skipped with a
/// warning. The result keeps the input order of the surviving entries.
pub fn build_gallery_with<E, F>(
    engine: &mut E,
    entries: &[GalleryEntry],
    mut load: F,
) -> Result<Gallery, GalleryError>
where
    E: FaceEngine + ?Sized,
    F: FnMut(&Path) -> Result<RgbImage, ImageError>,
{
    let mut faces: Vec<ReferenceFace> = Vec::with_capacity(entries.len());

    for entry in entries {
        let image = match load(&entry.image_path) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(
                    label = %entry.label,
                    path = %entry.image_path.display(),
                    error = %e,
                    "cannot read reference image; skipping"
                );
                continue;
            }
        };

        let detection = engine
            .detect_single(&image)
            .map_err(|source| GalleryError::Engine {
                label: entry.label.clone(),
                source,
            })?;

        let Some(detection) = detection else {
            tracing::warn!(
                label = %entry.label,
                path = %entry.image_path.display(),
                "no face detected in reference image; skipping"
            );
            continue;
        };

        if let Some(first) = faces.first() {
            if first.embedding.dim() != detection.embedding.dim() {
                return Err(GalleryError::DimensionMismatch {
                    label: entry.label.clone(),
                    expected: first.embedding.dim(),
                    actual: detection.embedding.dim(),
                });
            }
        }

        tracing::debug!(label = %entry.label, confidence = detection.bbox.confidence, "reference embedded");
        faces.push(ReferenceFace {
            label: entry.label.clone(),
            image_path: entry.image_path.clone(),
            embedding: detection.embedding,
        });
    }

    tracing::info!(
        configured = entries.len(),
        embedded = faces.len(),
        "gallery built"
    );
    Ok(Gallery::new(faces))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorError;
    use crate::matcher::{EuclideanMatcher, Matcher};
    use crate::types::{BoundingBox, Detection, Embedding, Label};

    /// Encodes the reference identity in the image width: width N yields a
    /// face with embedding [N, 0]; width 1 has no face; width 99 is a hard failure.
    struct WidthEngine;

    impl FaceEngine for WidthEngine {
        fn detect_all(&mut self, image: &RgbImage) -> Result<Vec<Detection>, EngineError> {
            match image.width() {
                1 => Ok(vec![]),
                99 => Err(DetectorError::InferenceFailed("session poisoned".into()).into()),
                w => Ok(vec![Detection {
                    bbox: BoundingBox {
                        x: 0.0, y: 0.0, width: 1.0, height: 1.0, confidence: 0.9, landmarks: None,
                    },
                    embedding: Embedding::new(vec![w as f32, 0.0]),
                }]),
            }
        }
    }

    /// Like `WidthEngine`, but each call's embedding is one element longer.
    #[derive(Default)]
    struct GrowingEngine {
        calls: usize,
    }

    impl FaceEngine for GrowingEngine {
        fn detect_all(&mut self, image: &RgbImage) -> Result<Vec<Detection>, EngineError> {
            self.calls += 1;
            let mut values = vec![0.0; self.calls + 1];
            values[0] = image.width() as f32;
            Ok(vec![Detection {
                bbox: BoundingBox {
                    x: 0.0, y: 0.0, width: 1.0, height: 1.0, confidence: 0.9, landmarks: None,
                },
                embedding: Embedding::new(values),
            }])
        }
    }

    fn entry(label: &str, path: &str) -> GalleryEntry {
        GalleryEntry { label: label.into(), image_path: path.into() }
    }

    fn loader(path: &Path) -> Result<RgbImage, ImageError> {
        let width: u32 = path.to_string_lossy().trim_end_matches(".jpg").parse().unwrap_or(0);
        if width == 0 {
            return Err(ImageError::IoError(std::io::Error::from(std::io::ErrorKind::NotFound)));
        }
        Ok(RgbImage::new(width, 1))
    }

    #[test]
    fn test_builds_in_input_order() {
        let entries = [entry("Alice", "2.jpg"), entry("Bob", "3.jpg")];
        let gallery = build_gallery_with(&mut WidthEngine, &entries, loader).unwrap();
        assert_eq!(gallery.labels().collect::<Vec<_>>(), vec!["Alice", "Bob"]);
        assert_eq!(gallery.faces()[1].embedding.values, vec![3.0, 0.0]);
    }

    #[test]
    fn test_faceless_reference_is_skipped() {
        let entries = [entry("Alice", "2.jpg"), entry("Ghost", "1.jpg"), entry("Bob", "3.jpg")];
        let gallery = build_gallery_with(&mut WidthEngine, &entries, loader).unwrap();
        assert_eq!(gallery.labels().collect::<Vec<_>>(), vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_unreadable_reference_is_skipped() {
        let entries = [entry("Missing", "nowhere.jpg"), entry("Bob", "3.jpg")];
        let gallery = build_gallery_with(&mut WidthEngine, &entries, loader).unwrap();
        assert_eq!(gallery.labels().collect::<Vec<_>>(), vec!["Bob"]);
    }

    #[test]
    fn test_all_unusable_yields_empty_gallery_and_unknown_matches() {
        let entries = [entry("Ghost", "1.jpg"), entry("Missing", "nowhere.jpg")];
        let gallery = build_gallery_with(&mut WidthEngine, &entries, loader).unwrap();
        assert!(gallery.is_empty());

        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = EuclideanMatcher::default().find_best_match(&probe, &gallery);
        assert_eq!(result.label, Label::Unknown);
    }

    #[test]
    fn test_engine_failure_aborts_build() {
        let entries = [entry("Alice", "2.jpg"), entry("Broken", "99.jpg")];
        let err = build_gallery_with(&mut WidthEngine, &entries, loader).unwrap_err();
        assert!(matches!(err, GalleryError::Engine { ref label, .. } if label == "Broken"));
    }

    #[test]
    fn test_dimension_mismatch_aborts_build() {
        let entries = [entry("A", "2.jpg"), entry("B", "3.jpg"), entry("C", "4.jpg")];
        let err = build_gallery_with(&mut GrowingEngine::default(), &entries, loader).unwrap_err();
        assert!(matches!(
            err,
            GalleryError::DimensionMismatch { ref label, expected: 2, actual: 3 } if label == "B"
        ));
    }
}
