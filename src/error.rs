//! Error types for detection, codec I/O and pipeline runs.

use std::path::PathBuf;

use thiserror::Error;

use crate::video::Codec;

/// Errors returned by the detector adapter.
#[derive(Debug, Clone, Error)]
pub enum DetectError {
    /// The model failed to load; every call reports this until replaced.
    #[error("detection model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Errors from video decoding and encoding.
#[derive(Debug, Error)]
pub enum VideoError {
    #[error("cannot open video input {path}: {reason}")]
    OpenInput { path: String, reason: String },

    #[error("no encoder could be opened for {path} (tried {attempted:?})")]
    NoEncoder { path: PathBuf, attempted: Vec<Codec> },

    #[error("encoder {codec} failed to open: {reason}")]
    EncoderOpen { codec: Codec, reason: String },

    #[error("failed to decode frame: {0}")]
    Decode(String),

    #[error("failed to write frame {frame}: {reason}")]
    Write { frame: u64, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VideoError {
    pub fn open_input(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::OpenInput {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Reasons a single pipeline run stopped without a report.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Video(#[from] VideoError),

    #[error("run cancelled after {frames_processed} frames")]
    Cancelled { frames_processed: u64 },
}

/// Errors from the live-stream poller.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream {0} is already active")]
    AlreadyActive(String),

    #[error("stream limit reached ({0} active)")]
    TooManyStreams(usize),

    #[error("streams must be started from within a tokio runtime")]
    NoRuntime,
}
