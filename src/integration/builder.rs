//! Builder for creating RawDetection objects from various box formats.

use super::detector::{PERSON_CLASS_ID, RawDetection};

/// Builder for creating `RawDetection` objects from various box formats.
#[derive(Debug, Clone)]
pub struct DetectionBuilder {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    confidence: f32,
    class_id: usize,
}

impl Default for DetectionBuilder {
    fn default() -> Self {
        Self {
            x1: 0.0,
            y1: 0.0,
            x2: 0.0,
            y2: 0.0,
            confidence: 0.0,
            class_id: PERSON_CLASS_ID,
        }
    }
}

impl DetectionBuilder {
    /// Create a new detection builder for the person class.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bounding box in TLBR format (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.x1 = x1;
        self.y1 = y1;
        self.x2 = x2;
        self.y2 = y2;
        self
    }

    /// Set bounding box in XYWH format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.x1 = cx - w / 2.0;
        self.y1 = cy - h / 2.0;
        self.x2 = cx + w / 2.0;
        self.y2 = cy + h / 2.0;
        self
    }

    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn class_id(mut self, class_id: usize) -> Self {
        self.class_id = class_id;
        self
    }

    /// Build the final `RawDetection`.
    pub fn build(self) -> RawDetection {
        RawDetection {
            bbox: [self.x1, self.y1, self.x2, self.y2],
            confidence: self.confidence,
            class_id: self.class_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_builder() {
        let det = DetectionBuilder::new()
            .tlbr(10.0, 20.0, 50.0, 80.0)
            .confidence(0.95)
            .build();

        assert_eq!(det.confidence, 0.95);
        assert_eq!(det.class_id, PERSON_CLASS_ID);
        assert_eq!(det.bbox, [10.0, 20.0, 50.0, 80.0]);
    }

    #[test]
    fn test_xywh_to_tlbr() {
        let det = DetectionBuilder::new()
            .xywh(30.0, 50.0, 40.0, 60.0)
            .class_id(2)
            .build();
        assert_eq!(det.bbox, [10.0, 20.0, 50.0, 80.0]);
        assert_eq!(det.class_id, 2);
    }
}
