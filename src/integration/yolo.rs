//! YOLOv8 output decoding.
//!
//! A YOLOv8 detection head emits one `[4 + num_classes, num_anchors]`
//! matrix per image: rows 0..4 are the box centre and size in model input
//! pixels, the remaining rows are per-class scores.

use ndarray::{ArrayView2, Axis, s};

use super::builder::DetectionBuilder;
use super::detector::{DetectionParams, PERSON_CLASS_ID, RawDetection};
use crate::tracker::iou_xyxy;

const CXYWH_OFFSET: usize = 4;

/// Mapping from model input pixels back to frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputScale {
    pub scale_x: f32,
    pub scale_y: f32,
    pub frame_width: f32,
    pub frame_height: f32,
}

impl InputScale {
    /// Scale for a frame stretched to a `input_width` x `input_height` blob.
    pub fn stretched(
        frame_width: u32,
        frame_height: u32,
        input_width: u32,
        input_height: u32,
    ) -> Self {
        Self {
            scale_x: frame_width as f32 / input_width as f32,
            scale_y: frame_height as f32 / input_height as f32,
            frame_width: frame_width as f32,
            frame_height: frame_height as f32,
        }
    }
}

/// Decode person detections from one image's prediction matrix.
///
/// Anchors whose best class is not a person, or whose score is below the
/// confidence threshold, are skipped. Survivors go through NMS and are
/// capped at `max_detections`.
pub fn decode_persons(
    preds: ArrayView2<'_, f32>,
    scale: &InputScale,
    params: &DetectionParams,
) -> Vec<RawDetection> {
    if preds.nrows() <= CXYWH_OFFSET + PERSON_CLASS_ID {
        return Vec::new();
    }

    let mut detections = Vec::new();
    for pred in preds.axis_iter(Axis(1)) {
        let bbox = pred.slice(s![0..CXYWH_OFFSET]);
        let classes = pred.slice(s![CXYWH_OFFSET..]);

        let Some((class_id, &confidence)) = classes
            .iter()
            .enumerate()
            .reduce(|best, x| if x.1 > best.1 { x } else { best })
        else {
            continue;
        };
        if class_id != PERSON_CLASS_ID || confidence < params.confidence_threshold {
            continue;
        }

        let mut det = DetectionBuilder::new()
            .xywh(
                bbox[0] * scale.scale_x,
                bbox[1] * scale.scale_y,
                bbox[2] * scale.scale_x,
                bbox[3] * scale.scale_y,
            )
            .confidence(confidence)
            .build();
        det.bbox[0] = det.bbox[0].clamp(0.0, scale.frame_width);
        det.bbox[1] = det.bbox[1].clamp(0.0, scale.frame_height);
        det.bbox[2] = det.bbox[2].clamp(0.0, scale.frame_width);
        det.bbox[3] = det.bbox[3].clamp(0.0, scale.frame_height);
        detections.push(det);
    }

    non_max_suppression(&mut detections, params.iou_threshold);
    detections.truncate(params.max_detections);
    detections
}

/// Greedy NMS: keep the most confident box, drop any later box overlapping
/// a kept one by more than `iou_threshold`.
pub fn non_max_suppression(detections: &mut Vec<RawDetection>, iou_threshold: f32) {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut current_index = 0;
    for index in 0..detections.len() {
        let overlaps = (0..current_index)
            .any(|prev| iou_xyxy(detections[prev].bbox, detections[index].bbox) > iou_threshold);
        if !overlaps {
            detections.swap(current_index, index);
            current_index += 1;
        }
    }
    detections.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Build a [4 + 2, n] prediction matrix from (cx, cy, w, h, person, other).
    fn preds(anchors: &[[f32; 6]]) -> Array2<f32> {
        let mut m = Array2::zeros((6, anchors.len()));
        for (j, a) in anchors.iter().enumerate() {
            for (i, v) in a.iter().enumerate() {
                m[[i, j]] = *v;
            }
        }
        m
    }

    #[test]
    fn test_decodes_and_rescales_person_boxes() {
        let m = preds(&[[320.0, 320.0, 64.0, 128.0, 0.9, 0.1]]);
        let scale = InputScale::stretched(1280, 640, 640, 640);
        let dets = decode_persons(m.view(), &scale, &DetectionParams::default());

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox, [576.0, 256.0, 704.0, 384.0]);
        assert_eq!(dets[0].class_id, PERSON_CLASS_ID);
    }

    #[test]
    fn test_skips_other_classes_and_low_scores() {
        let m = preds(&[
            [100.0, 100.0, 20.0, 20.0, 0.3, 0.95],
            [200.0, 200.0, 20.0, 20.0, 0.4, 0.1],
            [300.0, 300.0, 20.0, 20.0, 0.6, 0.1],
        ]);
        let scale = InputScale::stretched(640, 640, 640, 640);
        let dets = decode_persons(m.view(), &scale, &DetectionParams::default());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].confidence, 0.6);
    }

    #[test]
    fn test_clamps_to_frame() {
        let m = preds(&[[5.0, 5.0, 40.0, 40.0, 0.9, 0.0]]);
        let scale = InputScale::stretched(640, 640, 640, 640);
        let dets = decode_persons(m.view(), &scale, &DetectionParams::default());
        assert_eq!(dets[0].bbox, [0.0, 0.0, 25.0, 25.0]);
    }

    #[test]
    fn test_nms_keeps_most_confident_of_overlaps() {
        let m = preds(&[
            [100.0, 100.0, 50.0, 100.0, 0.7, 0.0],
            [102.0, 101.0, 50.0, 100.0, 0.9, 0.0],
            [400.0, 100.0, 50.0, 100.0, 0.6, 0.0],
        ]);
        let scale = InputScale::stretched(640, 640, 640, 640);
        let dets = decode_persons(m.view(), &scale, &DetectionParams::default());

        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].confidence, 0.9);
        assert_eq!(dets[1].confidence, 0.6);
    }
}
