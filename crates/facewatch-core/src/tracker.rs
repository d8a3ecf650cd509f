//! Label transition tracking.
//!
//! Only the edge matters: repeated frames of the same decision produce no
//! transition. [`FaceTracks`] keeps one tracker per face stream, associating
//! detections across frames by box overlap.

use crate::types::{BoundingBox, Label};

/// Minimum IoU for a detection to continue an existing face track.
pub const DEFAULT_TRACK_MIN_IOU: f32 = 0.3;

pub type TrackId = u64;

/// A change in decided label between consecutive observations.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// `None` when there was no prior decision.
    pub from: Option<Label>,
    pub to: Label,
}

/// Edge detector over one stream of labels.
#[derive(Debug, Clone, Default)]
pub struct TransitionTracker {
    last_label: Option<Label>,
}

impl TransitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `current` and report a transition if it differs from the last label.
    ///
    /// The stored label is updated whether or not a transition fired.
    pub fn observe(&mut self, current: &Label) -> Option<Transition> {
        let changed = self.last_label.as_ref() != Some(current);
        let from = self.last_label.replace(current.clone());
        changed.then(|| Transition {
            from,
            to: current.clone(),
        })
    }

    pub fn last_label(&self) -> Option<&Label> {
        self.last_label.as_ref()
    }
}

#[derive(Debug, Clone)]
struct Track {
    id: TrackId,
    bbox: BoundingBox,
    tracker: TransitionTracker,
}

/// Per-face transition trackers keyed by spatial continuity.
#[derive(Debug, Clone)]
pub struct FaceTracks {
    tracks: Vec<Track>,
    next_id: TrackId,
    min_iou: f32,
}

impl Default for FaceTracks {
    fn default() -> Self {
        Self::new(DEFAULT_TRACK_MIN_IOU)
    }
}

impl FaceTracks {
    pub fn new(min_iou: f32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            min_iou,
        }
    }

    /// Assign a track id to each box of the current frame, in order.
    ///
    /// Each box greedily takes the unclaimed previous track with the highest
    /// IoU at or above the minimum; unmatched boxes open fresh tracks with no
    /// prior decision. Tracks absent from this frame are dropped.
    pub fn associate(&mut self, boxes: &[BoundingBox]) -> Vec<TrackId> {
        let mut previous: Vec<Option<Track>> = std::mem::take(&mut self.tracks)
            .into_iter()
            .map(Some)
            .collect();
        let mut ids = Vec::with_capacity(boxes.len());

        for bbox in boxes {
            let best = previous
                .iter()
                .enumerate()
                .filter_map(|(i, t)| t.as_ref().map(|t| (i, t.bbox.iou(bbox))))
                .filter(|&(_, iou)| iou >= self.min_iou)
                .fold(None, |best: Option<(usize, f32)>, (i, iou)| match best {
                    Some((_, best_iou)) if best_iou >= iou => best,
                    _ => Some((i, iou)),
                });

            let track = match best.and_then(|(i, _)| previous[i].take()) {
                Some(mut track) => {
                    track.bbox = bbox.clone();
                    track
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    tracing::debug!(track = id, "new face track");
                    Track {
                        id,
                        bbox: bbox.clone(),
                        tracker: TransitionTracker::new(),
                    }
                }
            };
            ids.push(track.id);
            self.tracks.push(track);
        }

        ids
    }

    /// Transition tracker for a live track.
    pub fn tracker_mut(&mut self, id: TrackId) -> Option<&mut TransitionTracker> {
        self.tracks.iter_mut().find(|t| t.id == id).map(|t| &mut t.tracker)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
