//! OpenCV backend: `VideoCapture`/`VideoWriter` codec I/O and a YOLOv8
//! person detector on the OpenCV DNN module.
//!
//! Enabled with the `opencv-backend` feature.

use std::path::Path;

use ndarray::ArrayView2;
use opencv::core::{self, Mat, Scalar, Size};
use opencv::prelude::*;
use opencv::{dnn, imgproc, videoio};
use tracing::info;

use super::detector::{DetectionParams, DetectionSource, RawDetection};
use super::yolo::{self, InputScale};
use crate::error::VideoError;
use crate::stream::StreamOpener;
use crate::video::{
    Codec, EncoderSettings, Frame, FrameSink, FrameSource, VideoBackend, VideoMetadata,
};

/// YOLOv8 models are exported with a square 640 input.
const MODEL_INPUT_SIZE: i32 = 640;

fn decode_err(e: opencv::Error) -> VideoError {
    VideoError::Decode(e.to_string())
}

/// Convert an 8-bit RGB frame into an owned OpenCV BGR `Mat`.
fn frame_to_bgr(frame: &Frame) -> opencv::Result<Mat> {
    let rgb = Mat::from_slice(frame.as_raw())?
        .reshape(3, frame.height() as i32)?
        .try_clone()?;
    let mut bgr = Mat::default();
    imgproc::cvt_color_def(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR)?;
    Ok(bgr)
}

fn bgr_to_frame(bgr: &Mat) -> Result<Frame, VideoError> {
    let mut rgb = Mat::default();
    imgproc::cvt_color_def(bgr, &mut rgb, imgproc::COLOR_BGR2RGB).map_err(decode_err)?;
    let width = rgb.cols() as u32;
    let height = rgb.rows() as u32;
    let data = rgb.data_bytes().map_err(decode_err)?.to_vec();
    Frame::from_raw(width, height, data).ok_or_else(|| {
        VideoError::Decode(format!("unexpected buffer size for {width}x{height} frame"))
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCvBackend;

impl VideoBackend for OpenCvBackend {
    type Source = OpenCvSource;
    type Sink = OpenCvSink;

    fn open_source(&self, path: &Path) -> Result<Self::Source, VideoError> {
        OpenCvSource::open(&path.to_string_lossy())
    }

    fn open_sink(
        &self,
        path: &Path,
        codec: Codec,
        settings: &EncoderSettings,
    ) -> Result<Self::Sink, VideoError> {
        let writer = videoio::VideoWriter::new(
            &path.to_string_lossy(),
            codec.code(),
            settings.fps,
            Size::new(settings.width as i32, settings.height as i32),
            true,
        )
        .map_err(|e| VideoError::EncoderOpen {
            codec,
            reason: e.to_string(),
        })?;
        Ok(OpenCvSink {
            writer,
            frames_written: 0,
        })
    }
}

/// Frame-sequential decoder over a file path or stream URL.
pub struct OpenCvSource {
    capture: videoio::VideoCapture,
    metadata: VideoMetadata,
}

impl OpenCvSource {
    pub fn open(location: &str) -> Result<Self, VideoError> {
        let capture = videoio::VideoCapture::from_file(location, videoio::CAP_ANY)
            .map_err(|e| VideoError::open_input(location, e))?;
        if !capture.is_opened().unwrap_or(false) {
            return Err(VideoError::open_input(location, "capture did not open"));
        }

        let prop = |id| capture.get(id).unwrap_or(0.0);
        let metadata = VideoMetadata {
            fps: prop(videoio::CAP_PROP_FPS),
            width: prop(videoio::CAP_PROP_FRAME_WIDTH).max(0.0) as u32,
            height: prop(videoio::CAP_PROP_FRAME_HEIGHT).max(0.0) as u32,
            total_frames: prop(videoio::CAP_PROP_FRAME_COUNT).max(0.0) as u64,
        };
        Ok(Self { capture, metadata })
    }
}

impl FrameSource for OpenCvSource {
    fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
        let mut bgr = Mat::default();
        if !self.capture.read(&mut bgr).map_err(decode_err)? || bgr.empty() {
            return Ok(None);
        }
        bgr_to_frame(&bgr).map(Some)
    }
}

pub struct OpenCvSink {
    writer: videoio::VideoWriter,
    frames_written: u64,
}

impl FrameSink for OpenCvSink {
    fn is_opened(&self) -> bool {
        self.writer.is_opened().unwrap_or(false)
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), VideoError> {
        let write_err = |e: opencv::Error| VideoError::Write {
            frame: self.frames_written + 1,
            reason: e.to_string(),
        };
        let bgr = frame_to_bgr(frame).map_err(write_err)?;
        self.writer.write(&bgr).map_err(write_err)?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        self.writer.release().map_err(|e| VideoError::Write {
            frame: self.frames_written,
            reason: e.to_string(),
        })
    }
}

/// Opens live streams (RTSP/HTTP URLs or device paths) through `VideoCapture`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCvStreamOpener;

impl StreamOpener for OpenCvStreamOpener {
    type Source = OpenCvSource;

    fn open(&self, url: &str) -> Result<Self::Source, VideoError> {
        OpenCvSource::open(url)
    }
}

/// YOLOv8 ONNX model run through `opencv::dnn`.
pub struct OpenCvYoloDetector {
    net: dnn::Net,
}

impl OpenCvYoloDetector {
    /// Load an ONNX export. With `use_gpu` the CUDA backend is requested;
    /// OpenCV falls back to the CPU if it was built without CUDA.
    pub fn load(model_path: &Path, use_gpu: bool) -> opencv::Result<Self> {
        let mut net = dnn::read_net_from_onnx(&model_path.to_string_lossy())?;
        if use_gpu {
            net.set_preferable_backend(dnn::DNN_BACKEND_CUDA)?;
            net.set_preferable_target(dnn::DNN_TARGET_CUDA)?;
        } else {
            net.set_preferable_backend(dnn::DNN_BACKEND_OPENCV)?;
            net.set_preferable_target(dnn::DNN_TARGET_CPU)?;
        }
        info!(model = %model_path.display(), use_gpu, "loaded detection model");
        Ok(Self { net })
    }
}

impl DetectionSource for OpenCvYoloDetector {
    type Error = opencv::Error;

    fn detect(
        &mut self,
        frame: &Frame,
        params: &DetectionParams,
    ) -> Result<Vec<RawDetection>, Self::Error> {
        let rgb = Mat::from_slice(frame.as_raw())?
            .reshape(3, frame.height() as i32)?
            .try_clone()?;
        let blob = dnn::blob_from_image(
            &rgb,
            1.0 / 255.0,
            Size::new(MODEL_INPUT_SIZE, MODEL_INPUT_SIZE),
            Scalar::default(),
            false,
            false,
            core::CV_32F,
        )?;
        self.net.set_input(&blob, "", 1.0, Scalar::default())?;
        let output = self.net.forward_single("")?;

        // [1, 4 + classes, anchors]
        let size = output.mat_size();
        let dims: &[i32] = &size;
        let (rows, cols) = match dims {
            [1, rows, cols] => (*rows as usize, *cols as usize),
            other => {
                return Err(opencv::Error::new(
                    core::StsUnmatchedSizes,
                    format!("unexpected YOLOv8 output shape {other:?}"),
                ));
            }
        };
        let data = output.data_typed::<f32>()?;
        let preds = ArrayView2::from_shape((rows, cols), data)
            .map_err(|e| opencv::Error::new(core::StsUnmatchedSizes, e.to_string()))?;

        let scale = InputScale::stretched(
            frame.width(),
            frame.height(),
            MODEL_INPUT_SIZE as u32,
            MODEL_INPUT_SIZE as u32,
        );
        Ok(yolo::decode_persons(preds, &scale, params))
    }
}
