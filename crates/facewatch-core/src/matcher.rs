//! Nearest-neighbour matching of a live embedding against the gallery.

use crate::types::{Embedding, Gallery, Label, MatchResult};

/// Default L2 distance threshold, on the recognition model's calibrated scale.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.6;

/// Strategy for deciding which gallery identity (if any) a probe belongs to.
pub trait Matcher {
    fn find_best_match(&self, probe: &Embedding, gallery: &Gallery) -> MatchResult;
}

/// Euclidean nearest-neighbour matcher with an inclusive distance threshold.
///
/// Ties resolve to the earliest gallery entry.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    threshold: f32,
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DISTANCE_THRESHOLD)
    }
}

impl Matcher for EuclideanMatcher {
    fn find_best_match(&self, probe: &Embedding, gallery: &Gallery) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, face) in gallery.faces().iter().enumerate() {
            let dist = probe.euclidean_distance(&face.embedding);
            // Strict comparison keeps the first of equidistant entries.
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist <= self.threshold => MatchResult {
                label: Label::Known(gallery.faces()[idx].label.clone()),
                distance: best_dist,
            },
            _ => MatchResult {
                label: Label::Unknown,
                distance: best_dist,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReferenceFace;

    fn face(label: &str, values: Vec<f32>) -> ReferenceFace {
        ReferenceFace {
            label: label.into(),
            image_path: format!("{label}.jpg").into(),
            embedding: Embedding::new(values),
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let gallery = Gallery::new(vec![face("Alice", vec![0.0, 0.0])]);
        let probe = Embedding::new(vec![0.5, 0.0]);

        let result = EuclideanMatcher::new(0.5).find_best_match(&probe, &gallery);
        assert_eq!(result.label, Label::Known("Alice".into()));
        assert_eq!(result.distance, 0.5);
    }

    #[test]
    fn test_default_threshold_boundary_matches() {
        let gallery = Gallery::new(vec![face("A", vec![0.0, 0.0])]);
        let matcher = EuclideanMatcher::new(0.6);

        for probe in [vec![0.6, 0.0], vec![0.36, 0.48]] {
            let result = matcher.find_best_match(&Embedding::new(probe), &gallery);
            assert_eq!(result.label, Label::Known("A".into()));
            assert!((result.distance - 0.6).abs() < 1e-6);
        }

        let beyond = matcher.find_best_match(&Embedding::new(vec![0.61, 0.0]), &gallery);
        assert_eq!(beyond.label, Label::Unknown);
    }

    #[test]
    fn test_just_beyond_threshold_is_unknown() {
        let gallery = Gallery::new(vec![face("Alice", vec![0.0, 0.0])]);
        let probe = Embedding::new(vec![0.5001, 0.0]);

        let result = EuclideanMatcher::new(0.5).find_best_match(&probe, &gallery);
        assert_eq!(result.label, Label::Unknown);
        // The true minimum distance is still reported.
        assert!((result.distance - 0.5001).abs() < 1e-6);
    }

    #[test]
    fn test_picks_closest_entry() {
        let gallery = Gallery::new(vec![
            face("Alice", vec![1.0, 0.0, 0.0]),
            face("Bob", vec![0.0, 1.0, 0.0]),
            face("Carol", vec![0.0, 0.0, 1.0]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.9, 0.1]);

        let result = EuclideanMatcher::default().find_best_match(&probe, &gallery);
        assert_eq!(result.label, Label::Known("Bob".into()));
    }

    #[test]
    fn test_tie_resolves_to_first_entry() {
        let gallery = Gallery::new(vec![
            face("Alice", vec![1.0, 0.0]),
            face("Bob", vec![-1.0, 0.0]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);

        for _ in 0..5 {
            let result = EuclideanMatcher::new(1.0).find_best_match(&probe, &gallery);
            assert_eq!(result.label, Label::Known("Alice".into()));
        }
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = EuclideanMatcher::default().find_best_match(&probe, &Gallery::default());
        assert_eq!(result.label, Label::Unknown);
        assert_eq!(result.distance, f32::INFINITY);
    }
}
