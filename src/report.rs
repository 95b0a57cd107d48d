//! Run report returned by the video analyzer.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::risk::RiskTier;
use crate::tracker::PersonTrack;
use crate::video::VideoMetadata;

/// Format seconds as "{minutes}m {seconds}s", truncating both parts.
pub fn format_duration(duration_seconds: f64) -> String {
    let total = duration_seconds.max(0.0);
    let minutes = (total / 60.0).floor() as u64;
    let seconds = (total % 60.0).floor() as u64;
    format!("{minutes}m {seconds}s")
}

/// Per-track entry of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub track_id: u64,
    pub display_name: String,
    pub duration_seconds: f64,
    pub duration_formatted: String,
    pub frames_matched: u32,
    pub start_frame: u64,
    pub risk_tier: RiskTier,
}

impl TrackSummary {
    pub(crate) fn new(track: &PersonTrack, duration_seconds: f64, risk_tier: RiskTier) -> Self {
        Self {
            track_id: track.track_id(),
            display_name: track.display_name().to_string(),
            duration_seconds,
            duration_formatted: format_duration(duration_seconds),
            frames_matched: track.frames_matched(),
            start_frame: track.start_frame(),
            risk_tier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub total_frames: u64,
    pub duration_seconds: f64,
}

impl From<&VideoMetadata> for VideoInfo {
    fn from(meta: &VideoMetadata) -> Self {
        Self {
            fps: meta.fps,
            width: meta.width,
            height: meta.height,
            total_frames: meta.total_frames,
            duration_seconds: meta.duration_seconds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Distinct people tracked at any point in the run
    pub total_persons: u64,
    /// Live tracks that reached the critical tier
    pub high_risk_persons: usize,
    /// Detections drawn in the critical colour across all frames
    pub high_risk_frames: u64,
    /// Live tracks at the end of the run, longest first
    pub persons_tracked: Vec<TrackSummary>,
}

impl ReportSummary {
    pub fn new(
        total_persons: u64,
        high_risk_frames: u64,
        persons_tracked: Vec<TrackSummary>,
    ) -> Self {
        let high_risk_persons = persons_tracked
            .iter()
            .filter(|p| p.risk_tier.is_critical())
            .count();
        Self {
            total_persons,
            high_risk_persons,
            high_risk_frames,
            persons_tracked,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub output_path: PathBuf,
    pub frames_processed: u64,
    pub video_info: VideoInfo,
    pub summary: ReportSummary,
}

/// Uniform success/failure envelope for callers that map failures onto
/// their own error taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
}

impl From<Result<Report, PipelineError>> for ProcessResponse {
    fn from(result: Result<Report, PipelineError>) -> Self {
        match result {
            Ok(report) => Self {
                success: true,
                error: None,
                report: Some(report),
            },
            Err(err) => Self {
                success: false,
                error: Some(err.to_string()),
                report: None,
            },
        }
    }
}
