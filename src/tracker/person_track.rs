//! Single tracked person and the per-frame output emitted for it.

use image::Rgb;
use nalgebra::Point2;

use crate::tracker::matching::Detection;
use crate::tracker::rect::BoundingBox;

/// One persistent identity across frames.
///
/// `track_id`, `display_name` and `color` are fixed at creation; only the
/// position and frame counters change afterwards.
#[derive(Debug, Clone)]
pub struct PersonTrack {
    track_id: u64,
    display_name: String,
    color: Rgb<u8>,
    centroid: Point2<f64>,
    bbox: BoundingBox,
    frames_matched: u32,
    frames_missed: u32,
    start_frame: u64,
}

impl PersonTrack {
    pub(crate) fn new(track_id: u64, bbox: BoundingBox, color: Rgb<u8>, start_frame: u64) -> Self {
        Self {
            track_id,
            display_name: format!("Person {track_id}"),
            color,
            centroid: bbox.centroid(),
            bbox,
            frames_matched: 1,
            frames_missed: 0,
            start_frame,
        }
    }

    pub fn track_id(&self) -> u64 {
        self.track_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn color(&self) -> Rgb<u8> {
        self.color
    }

    /// Last known centroid.
    pub fn centroid(&self) -> Point2<f64> {
        self.centroid
    }

    /// Last known bounding box.
    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Number of frames in which this track received a detection.
    pub fn frames_matched(&self) -> u32 {
        self.frames_matched
    }

    /// Consecutive frames since the last match.
    pub fn frames_missed(&self) -> u32 {
        self.frames_missed
    }

    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    pub fn duration_seconds(&self, frame_rate: f64) -> f64 {
        self.frames_matched as f64 / frame_rate
    }

    pub(crate) fn mark_matched(&mut self, bbox: BoundingBox) {
        self.centroid = bbox.centroid();
        self.bbox = bbox;
        self.frames_matched += 1;
        self.frames_missed = 0;
    }

    pub(crate) fn mark_missed(&mut self) {
        self.frames_missed += 1;
    }
}

/// A detection annotated with the identity it was assigned this frame.
#[derive(Debug, Clone)]
pub struct TrackedDetection {
    pub detection: Detection,
    pub track_id: u64,
    pub display_name: String,
    /// On-screen time so far; 0 for a track created this frame
    pub duration_seconds: f64,
    pub color: Rgb<u8>,
}

impl TrackedDetection {
    pub(crate) fn new(detection: Detection, track: &PersonTrack, duration_seconds: f64) -> Self {
        Self {
            detection,
            track_id: track.track_id,
            display_name: track.display_name.clone(),
            duration_seconds,
            color: track.color,
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        self.detection.bbox
    }
}
