//! VideoAnalyzer for running detection, tracking and annotation over a video.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use super::detector::{DetectionSource, DetectorAdapter};
use crate::annotate::Annotator;
use crate::config::AnalyzerConfig;
use crate::error::{DetectError, PipelineError};
use crate::report::{ProcessResponse, Report, ReportSummary, VideoInfo};
use crate::tracker::PersonTracker;
use crate::video::{self, EncoderChain, EncoderSettings, FrameSink, FrameSource, VideoBackend};

/// Progress of a run, emitted every `progress_interval` frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    pub frames_processed: u64,
    /// 0 when the container does not report a frame count
    pub total_frames: u64,
    /// `None` when `total_frames` is unknown
    pub percent: Option<f64>,
}

impl ProgressUpdate {
    fn new(frames_processed: u64, total_frames: u64) -> Self {
        let percent =
            (total_frames > 0).then(|| frames_processed as f64 / total_frames as f64 * 100.0);
        Self {
            frames_processed,
            total_frames,
            percent,
        }
    }
}

pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + 'static>;

/// Flag a caller sets to stop a run at the next frame boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs the frame loop for one video at a time.
///
/// Each call to [`VideoAnalyzer::process`] gets a fresh [`PersonTracker`], so
/// nothing carries over between runs. To analyze several videos at once, use
/// one analyzer per video and share the model through
/// [`SharedDetector`](super::SharedDetector).
pub struct VideoAnalyzer<B: VideoBackend, D: DetectionSource> {
    backend: B,
    detector: DetectorAdapter<D>,
    annotator: Annotator,
    config: AnalyzerConfig,
    encoders: EncoderChain,
    progress: Option<ProgressCallback>,
    cancel: CancelToken,
}

impl<B: VideoBackend, D: DetectionSource> VideoAnalyzer<B, D> {
    pub fn new(backend: B, detector: DetectorAdapter<D>, config: AnalyzerConfig) -> Self {
        Self {
            backend,
            detector,
            annotator: Annotator::default(),
            config,
            encoders: EncoderChain::default(),
            progress: None,
            cancel: CancelToken::default(),
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_encoders(mut self, encoders: EncoderChain) -> Self {
        self.encoders = encoders;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels runs of this analyzer.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn detector(&self) -> &DetectorAdapter<D> {
        &self.detector
    }

    /// Analyze `input`, writing the annotated video to `output` (or a
    /// timestamped file under `config.output_dir`).
    ///
    /// A frame that fails to decode ends the run early but still produces a
    /// report. Opening, encoding and detector failures abort the run.
    pub fn process(
        &mut self,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<Report, PipelineError> {
        if let Some(reason) = self.detector.unavailable_reason() {
            return Err(DetectError::ModelUnavailable(reason.to_string()).into());
        }

        let mut source = self.backend.open_source(input)?;
        let meta = source.metadata().normalized();
        info!(
            input = %input.display(),
            fps = meta.fps,
            width = meta.width,
            height = meta.height,
            total_frames = meta.total_frames,
            "opened video"
        );

        let output_path = video::resolve_output_path(output, &self.config.output_dir)?;
        let (mut sink, codec) = video::open_encoder(
            &self.backend,
            &output_path,
            &self.encoders,
            &EncoderSettings::from(&meta),
        )?;

        let mut tracker = PersonTracker::new(self.config.tracker_config(meta.fps));
        let mut frames_processed: u64 = 0;
        let mut high_risk_frames: u64 = 0;

        loop {
            if self.cancel.is_cancelled() {
                info!(frames_processed, "run cancelled");
                return Err(PipelineError::Cancelled { frames_processed });
            }

            let mut frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        frame = frames_processed + 1,
                        error = %e,
                        "decode failed, ending run early"
                    );
                    break;
                }
            };
            frames_processed += 1;

            let interval = self.config.progress_interval;
            if interval > 0 && frames_processed % interval == 0 {
                self.report_progress(ProgressUpdate::new(frames_processed, meta.total_frames));
            }

            let detections = self.detector.detect(&frame)?;
            let tracked = tracker.update(detections);
            high_risk_frames += self.annotator.draw(&mut frame, &tracked);

            sink.write_frame(&frame).inspect_err(|e| {
                warn!(frame = frames_processed, error = %e, "write failed")
            })?;
        }

        sink.finish()?;

        let persons = tracker.summary(meta.fps);
        info!(
            frames_processed,
            total_persons = tracker.total_created(),
            live_tracks = persons.len(),
            %codec,
            output = %output_path.display(),
            "analysis complete"
        );

        Ok(Report {
            output_path,
            frames_processed,
            video_info: VideoInfo::from(&meta),
            summary: ReportSummary::new(tracker.total_created(), high_risk_frames, persons),
        })
    }

    /// Like [`Self::process`], but folds any failure into a `ProcessResponse`.
    pub fn process_response(&mut self, input: &Path, output: Option<&Path>) -> ProcessResponse {
        ProcessResponse::from(self.process(input, output))
    }

    fn report_progress(&self, update: ProgressUpdate) {
        match update.percent {
            Some(percent) => info!(
                frames_processed = update.frames_processed,
                total_frames = update.total_frames,
                "progress {percent:.1}%"
            ),
            None => info!(frames_processed = update.frames_processed, "progress"),
        }
        if let Some(callback) = &self.progress {
            callback(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    use crate::error::VideoError;
    use crate::integration::{DetectionBuilder, DetectionParams, RawDetection};
    use crate::video::{Codec, Frame, VideoMetadata};

    struct CountingSource {
        remaining: u32,
    }

    impl FrameSource for CountingSource {
        fn metadata(&self) -> VideoMetadata {
            VideoMetadata {
                fps: 0.0,
                width: 64,
                height: 64,
                total_frames: 0,
            }
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(Frame::new(64, 64)))
        }
    }

    struct NullSink {
        written: Rc<RefCell<u64>>,
    }

    impl FrameSink for NullSink {
        fn is_opened(&self) -> bool {
            true
        }

        fn write_frame(&mut self, _frame: &Frame) -> Result<(), VideoError> {
            *self.written.borrow_mut() += 1;
            Ok(())
        }

        fn finish(&mut self) -> Result<(), VideoError> {
            Ok(())
        }
    }

    struct MemoryBackend {
        frames: u32,
        written: Rc<RefCell<u64>>,
    }

    impl VideoBackend for MemoryBackend {
        type Source = CountingSource;
        type Sink = NullSink;

        fn open_source(&self, _path: &Path) -> Result<Self::Source, VideoError> {
            Ok(CountingSource {
                remaining: self.frames,
            })
        }

        fn open_sink(
            &self,
            _path: &Path,
            _codec: Codec,
            _settings: &EncoderSettings,
        ) -> Result<Self::Sink, VideoError> {
            Ok(NullSink {
                written: Rc::clone(&self.written),
            })
        }
    }

    struct OnePerson;

    impl DetectionSource for OnePerson {
        type Error = DetectError;

        fn detect(
            &mut self,
            _frame: &Frame,
            _params: &DetectionParams,
        ) -> Result<Vec<RawDetection>, Self::Error> {
            Ok(vec![
                DetectionBuilder::new()
                    .tlbr(10.0, 10.0, 30.0, 50.0)
                    .confidence(0.9)
                    .build(),
            ])
        }
    }

    fn analyzer(
        frames: u32,
    ) -> (VideoAnalyzer<MemoryBackend, OnePerson>, Rc<RefCell<u64>>, PathBuf) {
        let written = Rc::new(RefCell::new(0));
        let backend = MemoryBackend {
            frames,
            written: Rc::clone(&written),
        };
        let out = std::env::temp_dir()
            .join("dwelltrack_pipeline_unit")
            .join("out.mp4");
        let analyzer = VideoAnalyzer::new(
            backend,
            DetectorAdapter::new(OnePerson, DetectionParams::default()),
            AnalyzerConfig::default(),
        );
        (analyzer, written, out)
    }

    #[test]
    fn test_single_person_report() {
        let (mut analyzer, written, out) = analyzer(60);
        let report = analyzer.process(Path::new("in.mp4"), Some(out.as_path())).unwrap();

        assert_eq!(*written.borrow(), 60);
        assert_eq!(report.frames_processed, 60);
        assert_eq!(report.video_info.fps, 30.0);
        assert_eq!(report.summary.total_persons, 1);
        assert_eq!(report.summary.persons_tracked.len(), 1);
        assert_eq!(report.summary.persons_tracked[0].duration_seconds, 2.0);
        assert_eq!(report.summary.high_risk_persons, 0);
    }

    #[test]
    fn test_cancelled_before_first_frame() {
        let (mut analyzer, written, out) = analyzer(10);
        analyzer.cancel_token().cancel();

        let err = analyzer.process(Path::new("in.mp4"), Some(out.as_path())).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { frames_processed: 0 }));
        assert_eq!(*written.borrow(), 0);
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(ProgressUpdate::new(50, 200).percent, Some(25.0));
        assert_eq!(ProgressUpdate::new(50, 0).percent, None);
    }
}
