//! Integration module for connecting detection models and codec backends
//! with the person tracker.
//!
//! This module provides the detector seam ([`DetectionSource`]), the adapter
//! that validates detector output, YOLOv8 output decoding and the
//! [`VideoAnalyzer`] frame loop.

mod builder;
mod detector;
mod pipeline;
pub mod yolo;

pub use builder::DetectionBuilder;
pub use detector::{
    DetectionParams, DetectionSource, DetectorAdapter, PERSON_CLASS_ID, RawDetection,
    SharedDetector,
};
pub use pipeline::{CancelToken, ProgressCallback, ProgressUpdate, VideoAnalyzer};

#[cfg(feature = "opencv-backend")]
pub mod opencv_backend;
