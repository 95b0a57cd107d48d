//! Person tracking and dwell-time risk scoring for recorded video.
//!
//! The crate is split the same way a detection/tracking stack usually is:
//! - [`tracker`] owns per-run track state and the greedy centroid matcher.
//! - [`integration`] connects detection models, codec backends and the
//!   tracker into the frame loop ([`VideoAnalyzer`]).
//! - [`risk`], [`annotate`] and [`report`] turn tracks into tiers, drawn
//!   frames and the final run report.
//! - [`stream`] is the live-stream polling loop, independent of the batch
//!   pipeline.

pub mod annotate;
pub mod config;
pub mod error;
pub mod integration;
pub mod report;
pub mod risk;
pub mod stream;
pub mod tracker;
pub mod video;

pub use annotate::Annotator;
pub use config::AnalyzerConfig;
pub use error::{DetectError, PipelineError, StreamError, VideoError};
pub use integration::{
    CancelToken, DetectionBuilder, DetectionParams, DetectionSource, DetectorAdapter,
    ProgressCallback, ProgressUpdate, RawDetection, SharedDetector, VideoAnalyzer,
};
pub use report::{ProcessResponse, Report, ReportSummary, TrackSummary, VideoInfo};
pub use risk::RiskTier;
pub use tracker::{
    BoundingBox, Detection, PersonTrack, PersonTracker, TrackedDetection, TrackerConfig,
};
pub use video::{Codec, EncoderChain, Frame, FrameSink, FrameSource, VideoBackend, VideoMetadata};
