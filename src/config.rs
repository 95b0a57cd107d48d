//! Analyzer configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::integration::DetectionParams;
use crate::tracker::TrackerConfig;

/// Scalar settings consumed by the detector, tracker, frame loop and the
/// live-stream poller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Path to the YOLOv8 ONNX weights
    pub model_path: PathBuf,
    /// Run inference on the GPU when the backend supports it
    pub use_gpu: bool,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Centroid distance (pixels) for continuing a track
    pub max_distance: f64,
    /// Consecutive missed frames tolerated before a track is dropped
    pub max_frames_skip: u32,
    /// Frames between progress reports
    pub progress_interval: u64,
    /// Live-stream polling interval in milliseconds
    pub frame_interval_ms: u64,
    pub max_concurrent_streams: usize,
    /// Directory for outputs when the caller gives no output path
    pub output_dir: PathBuf,
    /// Label font replacing the bundled DejaVu Sans Mono
    pub label_font_path: Option<PathBuf>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("yolov8m.onnx"),
            use_gpu: false,
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            max_detections: 300,
            max_distance: 50.0,
            max_frames_skip: 30,
            progress_interval: 50,
            frame_interval_ms: 500,
            max_concurrent_streams: 5,
            output_dir: std::env::temp_dir().join("dwelltrack_videos"),
            label_font_path: None,
        }
    }
}

impl AnalyzerConfig {
    /// Create config from `DWELLTRACK_*` environment variables, after loading
    /// a `.env` file if one exists.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Missing or unparsable
    /// values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let path = |key: &str| lookup(key).map(PathBuf::from);

        Self {
            model_path: path("DWELLTRACK_MODEL_PATH").unwrap_or(defaults.model_path),
            use_gpu: parse_var(&lookup, "DWELLTRACK_USE_GPU").unwrap_or(defaults.use_gpu),
            confidence_threshold: parse_var(&lookup, "DWELLTRACK_CONFIDENCE_THRESHOLD")
                .unwrap_or(defaults.confidence_threshold),
            iou_threshold: parse_var(&lookup, "DWELLTRACK_IOU_THRESHOLD")
                .unwrap_or(defaults.iou_threshold),
            max_detections: parse_var(&lookup, "DWELLTRACK_MAX_DETECTIONS")
                .unwrap_or(defaults.max_detections),
            max_distance: parse_var(&lookup, "DWELLTRACK_MAX_DISTANCE")
                .unwrap_or(defaults.max_distance),
            max_frames_skip: parse_var(&lookup, "DWELLTRACK_MAX_FRAMES_SKIP")
                .unwrap_or(defaults.max_frames_skip),
            progress_interval: parse_var(&lookup, "DWELLTRACK_PROGRESS_INTERVAL")
                .unwrap_or(defaults.progress_interval),
            frame_interval_ms: parse_var(&lookup, "DWELLTRACK_FRAME_INTERVAL_MS")
                .unwrap_or(defaults.frame_interval_ms),
            max_concurrent_streams: parse_var(&lookup, "DWELLTRACK_MAX_CONCURRENT_STREAMS")
                .unwrap_or(defaults.max_concurrent_streams),
            output_dir: path("DWELLTRACK_OUTPUT_DIR").unwrap_or(defaults.output_dir),
            label_font_path: path("DWELLTRACK_LABEL_FONT"),
        }
    }

    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            confidence_threshold: self.confidence_threshold,
            iou_threshold: self.iou_threshold,
            max_detections: self.max_detections,
        }
    }

    pub fn tracker_config(&self, frame_rate: f64) -> TrackerConfig {
        TrackerConfig {
            max_distance: self.max_distance,
            max_frames_skip: self.max_frames_skip,
            frame_rate,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// Parse `key` from `lookup`, ignoring surrounding whitespace.
fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
