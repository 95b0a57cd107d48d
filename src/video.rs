//! Frame-sequential video input/output seams and encoder selection.
//!
//! Backends (see `integration::opencv_backend`) implement [`VideoBackend`];
//! the analyzer only ever talks to these traits.

use std::fmt;
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{info, warn};

use crate::error::VideoError;

/// Decoded frame, 8-bit RGB.
pub type Frame = RgbImage;

/// Stream properties reported by the decoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// 0 when the container does not report a frame count
    pub total_frames: u64,
}

impl VideoMetadata {
    pub const DEFAULT_FPS: f64 = 30.0;

    /// Replace an undeterminable frame rate (missing, NaN or below one frame
    /// per second) with [`Self::DEFAULT_FPS`].
    pub fn normalized(mut self) -> Self {
        if !self.fps.is_finite() || self.fps < 1.0 {
            self.fps = Self::DEFAULT_FPS;
        }
        self
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.fps > 0.0 {
            self.total_frames as f64 / self.fps
        } else {
            0.0
        }
    }
}

pub trait FrameSource {
    fn metadata(&self) -> VideoMetadata;

    /// Next decoded frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError>;
}

pub trait FrameSink {
    /// Whether the encoder actually opened; checked before any frame is written.
    fn is_opened(&self) -> bool;

    fn write_frame(&mut self, frame: &Frame) -> Result<(), VideoError>;

    /// Flush and close the output.
    fn finish(&mut self) -> Result<(), VideoError>;
}

/// Encoder choice for the output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// A specific four-character code
    Fourcc([u8; 4]),
    /// Let the platform pick whatever it has
    PlatformDefault,
}

impl Codec {
    pub const H264: Codec = Codec::Fourcc(*b"H264");
    pub const MJPG: Codec = Codec::Fourcc(*b"MJPG");
    pub const MP4V: Codec = Codec::Fourcc(*b"mp4v");

    /// Packed little-endian fourcc code, or -1 for the platform default.
    pub fn code(&self) -> i32 {
        match self {
            Codec::Fourcc(c) => i32::from_le_bytes(*c),
            Codec::PlatformDefault => -1,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Fourcc(c) => write!(f, "{}", String::from_utf8_lossy(c)),
            Codec::PlatformDefault => f.write_str("platform-default"),
        }
    }
}

/// Ordered list of encoders to try for the output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderChain(Vec<Codec>);

impl EncoderChain {
    pub fn new(codecs: Vec<Codec>) -> Self {
        Self(codecs)
    }

    pub fn codecs(&self) -> &[Codec] {
        &self.0
    }
}

impl Default for EncoderChain {
    /// Preferred codec, broadly compatible fallback, then platform choice.
    fn default() -> Self {
        Self(vec![Codec::H264, Codec::MJPG, Codec::PlatformDefault])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderSettings {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl From<&VideoMetadata> for EncoderSettings {
    fn from(meta: &VideoMetadata) -> Self {
        Self {
            fps: meta.fps,
            width: meta.width,
            height: meta.height,
        }
    }
}

/// Codec library used for decoding inputs and encoding outputs.
pub trait VideoBackend {
    type Source: FrameSource;
    type Sink: FrameSink;

    fn open_source(&self, path: &Path) -> Result<Self::Source, VideoError>;

    /// Create an encoder; the caller checks [`FrameSink::is_opened`].
    fn open_sink(
        &self,
        path: &Path,
        codec: Codec,
        settings: &EncoderSettings,
    ) -> Result<Self::Sink, VideoError>;
}

/// Try each codec of `chain` in order and return the first sink that opens.
pub fn open_encoder<B: VideoBackend>(
    backend: &B,
    path: &Path,
    chain: &EncoderChain,
    settings: &EncoderSettings,
) -> Result<(B::Sink, Codec), VideoError> {
    let mut attempted = Vec::with_capacity(chain.codecs().len());
    for &codec in chain.codecs() {
        attempted.push(codec);
        match backend.open_sink(path, codec, settings) {
            Ok(sink) if sink.is_opened() => {
                info!(%codec, path = %path.display(), "encoder opened");
                return Ok((sink, codec));
            }
            Ok(_) => warn!(%codec, "encoder did not open, trying next"),
            Err(e) => warn!(%codec, error = %e, "encoder failed, trying next"),
        }
    }
    Err(VideoError::NoEncoder {
        path: path.to_path_buf(),
        attempted,
    })
}

/// Output file name derived from the current local time.
pub fn timestamped_file_name() -> String {
    format!("analyzed_{}.mp4", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

/// Use `output` when given, otherwise a timestamped file under `fallback_dir`.
/// The parent directory is created either way.
pub fn resolve_output_path(
    output: Option<&Path>,
    fallback_dir: &Path,
) -> Result<PathBuf, VideoError> {
    let path = match output {
        Some(p) => p.to_path_buf(),
        None => fallback_dir.join(timestamped_file_name()),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_defaults_fps() {
        let meta = VideoMetadata {
            fps: 0.0,
            width: 640,
            height: 480,
            total_frames: 0,
        }
        .normalized();
        assert_eq!(meta.fps, 30.0);

        let meta = VideoMetadata {
            fps: f64::NAN,
            width: 640,
            height: 480,
            total_frames: 90,
        }
        .normalized();
        assert_eq!(meta.fps, 30.0);
        assert_eq!(meta.duration_seconds(), 3.0);

        let meta = VideoMetadata {
            fps: 25.0,
            width: 640,
            height: 480,
            total_frames: 0,
        }
        .normalized();
        assert_eq!(meta.fps, 25.0);
    }

    #[test]
    fn test_codec_codes() {
        assert_eq!(Codec::PlatformDefault.code(), -1);
        assert_eq!(Codec::MJPG.code(), i32::from_le_bytes(*b"MJPG"));
        assert_eq!(Codec::H264.to_string(), "H264");
        assert_eq!(
            EncoderChain::default().codecs(),
            &[Codec::H264, Codec::MJPG, Codec::PlatformDefault]
        );
    }

    #[test]
    fn test_resolve_output_path_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();

        let explicit = dir.path().join("nested/out/video.mp4");
        let resolved = resolve_output_path(Some(explicit.as_path()), dir.path()).unwrap();
        assert_eq!(resolved, explicit);
        assert!(explicit.parent().unwrap().is_dir());

        let fallback = dir.path().join("tmp_videos");
        let resolved = resolve_output_path(None, &fallback).unwrap();
        assert!(fallback.is_dir());
        let name = resolved.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("analyzed_") && name.ends_with(".mp4"));
    }
}
