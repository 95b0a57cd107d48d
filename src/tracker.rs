mod matching;
mod person_track;
mod person_tracker;
mod rect;

pub use matching::{AssignmentResult, Detection, centroid_distance, greedy_assignment};
pub use person_track::{PersonTrack, TrackedDetection};
pub use person_tracker::{PersonTracker, TrackerConfig};
pub use rect::{BoundingBox, iou_xyxy};
