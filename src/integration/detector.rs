//! Detector seam and the adapter that normalises model output.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{error, warn};

use crate::error::DetectError;
use crate::tracker::{BoundingBox, Detection};
use crate::video::Frame;

/// COCO class index of "person".
pub const PERSON_CLASS_ID: usize = 0;

/// Raw detection output from the model, in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// Bounding box: [x1, y1, x2, y2]
    pub bbox: [f32; 4],
    /// Confidence score
    pub confidence: f32,
    /// Class index in the model's label set
    pub class_id: usize,
}

/// Thresholds passed to the model on every call.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            max_detections: 300,
        }
    }
}

/// Trait for object detection inference backends.
///
/// Implement this trait to connect any detection model to the analyzer.
/// Implementations should restrict output to [`PERSON_CLASS_ID`] and apply
/// the thresholds in `params`; the adapter re-checks both anyway.
///
/// # Example
///
/// ```ignore
/// use dwelltrack_rs::{DetectionParams, DetectionSource, Frame, RawDetection};
///
/// struct MyDetector;
///
/// impl DetectionSource for MyDetector {
///     type Error = std::io::Error;
///
///     fn detect(
///         &mut self,
///         frame: &Frame,
///         params: &DetectionParams,
///     ) -> Result<Vec<RawDetection>, Self::Error> {
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionSource {
    type Error: fmt::Display;

    fn detect(
        &mut self,
        frame: &Frame,
        params: &DetectionParams,
    ) -> Result<Vec<RawDetection>, Self::Error>;
}

/// Wraps a detector (or the reason it failed to load) and turns raw model
/// output into validated person [`Detection`]s.
pub struct DetectorAdapter<D> {
    model: Result<D, String>,
    params: DetectionParams,
}

impl<D: DetectionSource> DetectorAdapter<D> {
    pub fn new(model: D, params: DetectionParams) -> Self {
        Self {
            model: Ok(model),
            params,
        }
    }

    /// Adapter from a model load attempt. A failed load is logged once here
    /// and reported as [`DetectError::ModelUnavailable`] on every call.
    pub fn from_load<E: fmt::Display>(loaded: Result<D, E>, params: DetectionParams) -> Self {
        let model = loaded.map_err(|e| {
            error!(error = %e, "failed to load detection model");
            e.to_string()
        });
        Self { model, params }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_ok()
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.model.as_ref().err().map(String::as_str)
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        let model = match self.model.as_mut() {
            Ok(model) => model,
            Err(reason) => return Err(DetectError::ModelUnavailable(reason.clone())),
        };
        let raw = model
            .detect(frame, &self.params)
            .map_err(|e| DetectError::Inference(e.to_string()))?;
        Ok(normalize(raw, &self.params))
    }
}

/// Keep confident person detections with well-formed integer boxes.
fn normalize(raw: Vec<RawDetection>, params: &DetectionParams) -> Vec<Detection> {
    raw.into_iter()
        .filter(|d| d.class_id == PERSON_CLASS_ID && d.confidence >= params.confidence_threshold)
        .filter_map(|d| {
            if d.bbox.iter().any(|v| !v.is_finite()) {
                warn!(bbox = ?d.bbox, "dropping detection with non-finite box");
                return None;
            }
            let bbox = BoundingBox::from_tlbr_f32(d.bbox);
            if !bbox.is_valid() {
                warn!(?bbox, "dropping malformed detection");
                return None;
            }
            Some(Detection::new(bbox, d.confidence.clamp(0.0, 1.0), "person"))
        })
        .take(params.max_detections)
        .collect()
}

/// A detector shared by several concurrent runs. Calls are serialised
/// through a mutex, so the wrapped model never sees concurrent inference.
pub struct SharedDetector<D> {
    inner: Arc<Mutex<D>>,
}

impl<D> SharedDetector<D> {
    pub fn new(detector: D) -> Self {
        Self {
            inner: Arc::new(Mutex::new(detector)),
        }
    }
}

impl<D> Clone for SharedDetector<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: DetectionSource> DetectionSource for SharedDetector<D> {
    type Error = DetectError;

    fn detect(
        &mut self,
        frame: &Frame,
        params: &DetectionParams,
    ) -> Result<Vec<RawDetection>, Self::Error> {
        let mut detector = self
            .inner
            .lock()
            .map_err(|_| DetectError::Inference("detector lock poisoned".to_string()))?;
        detector
            .detect(frame, params)
            .map_err(|e| DetectError::Inference(e.to_string()))
    }
}
