//! Matching utilities for centroid-based person tracking.

use nalgebra::{Point2, distance};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::tracker::rect::BoundingBox;

/// A single well-formed detection handed to the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding box in TLBR format (x1, y1, x2, y2), integer pixels
    pub bbox: BoundingBox,
    /// Detection confidence in [0, 1]
    pub confidence: f32,
    /// Class label reported by the detector, e.g. "person"
    pub class_label: String,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, class_label: impl Into<String>) -> Self {
        Self {
            bbox,
            confidence,
            class_label: class_label.into(),
        }
    }

    /// Person detection from TLBR pixel coordinates.
    pub fn person(x1: i32, y1: i32, x2: i32, y2: i32, confidence: f32) -> Self {
        Self::new(BoundingBox::new(x1, y1, x2, y2), confidence, "person")
    }

    pub fn centroid(&self) -> Point2<f64> {
        self.bbox.centroid()
    }
}

/// Euclidean distance matrix of shape (detections, tracks).
pub fn centroid_distance(detections: &[Point2<f64>], tracks: &[Point2<f64>]) -> Array2<f64> {
    let mut dists = Array2::zeros((detections.len(), tracks.len()));
    for (i, d) in detections.iter().enumerate() {
        for (j, t) in tracks.iter().enumerate() {
            dists[[i, j]] = distance(d, t);
        }
    }
    dists
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentResult {
    /// (detection row, track column) pairs in detection order
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

impl AssignmentResult {
    /// Track column assigned to each detection row, `None` for new tracks.
    pub fn by_detection(&self, num_detections: usize) -> Vec<Option<usize>> {
        let mut assigned = vec![None; num_detections];
        for &(det, track) in &self.matches {
            assigned[det] = Some(track);
        }
        assigned
    }
}

/// Greedy nearest-track assignment over a (detections, tracks) cost matrix.
///
/// Rows are visited in their given order and each takes the closest column
/// not yet taken, provided the distance is strictly below `max_distance`.
/// Ties go to the lowest column index. The result depends on row order and
/// is not a globally optimal assignment.
pub fn greedy_assignment(cost_matrix: &Array2<f64>, max_distance: f64) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();
    let mut taken = vec![false; num_cols];
    let mut matches = Vec::new();
    let mut unmatched_detections = Vec::new();

    for row in 0..num_rows {
        let mut best: Option<(usize, f64)> = None;
        for col in 0..num_cols {
            if taken[col] {
                continue;
            }
            let dist = cost_matrix[[row, col]];
            let bound = best.map_or(max_distance, |(_, d)| d);
            if dist < bound {
                best = Some((col, dist));
            }
        }

        match best {
            Some((col, _)) => {
                taken[col] = true;
                matches.push((row, col));
            }
            None => unmatched_detections.push(row),
        }
    }

    let unmatched_tracks = taken
        .iter()
        .enumerate()
        .filter_map(|(i, &t)| if t { None } else { Some(i) })
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}
