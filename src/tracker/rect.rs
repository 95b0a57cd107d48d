use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Integer pixel-space bounding box in TLBR format (x1, y1, x2, y2).
///
/// A well-formed box has `x1 < x2` and `y1 < y2`; [`BoundingBox::is_valid`]
/// is checked once when detector output enters the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Top-left x coordinate
    pub x1: i32,
    /// Top-left y coordinate
    pub y1: i32,
    /// Bottom-right x coordinate
    pub x2: i32,
    /// Bottom-right y coordinate
    pub y2: i32,
}

impl BoundingBox {
    #[inline]
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Convert float model coordinates to integer pixels, truncating toward zero.
    #[inline]
    pub fn from_tlbr_f32(tlbr: [f32; 4]) -> Self {
        Self {
            x1: tlbr[0] as i32,
            y1: tlbr[1] as i32,
            x2: tlbr[2] as i32,
            y2: tlbr[3] as i32,
        }
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    /// Midpoint of the box, used as the position proxy for matching.
    #[inline]
    pub fn centroid(&self) -> Point2<f64> {
        Point2::new(
            (self.x1 as f64 + self.x2 as f64) / 2.0,
            (self.y1 as f64 + self.y2 as f64) / 2.0,
        )
    }

    #[inline]
    pub fn area(&self) -> i64 {
        self.width().max(0) as i64 * self.height().max(0) as i64
    }

    #[inline]
    pub fn to_tlbr(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        iou_xyxy(
            [self.x1 as f32, self.y1 as f32, self.x2 as f32, self.y2 as f32],
            [other.x1 as f32, other.y1 as f32, other.x2 as f32, other.y2 as f32],
        )
    }
}

/// Intersection over Union of two float boxes in TLBR format.
pub fn iou_xyxy(a: [f32; 4], b: [f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union_area = area_a + area_b - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_is_box_midpoint() {
        let bbox = BoundingBox::new(10, 20, 41, 60);
        let c = bbox.centroid();
        assert_eq!(c.x, 25.5);
        assert_eq!(c.y, 40.0);
    }

    #[test]
    fn test_from_tlbr_f32_truncates() {
        let bbox = BoundingBox::from_tlbr_f32([10.9, 20.2, 40.999, 60.5]);
        assert_eq!(bbox.to_tlbr(), [10, 20, 40, 60]);
        assert_eq!(bbox.width(), 30);
        assert_eq!(bbox.height(), 40);
    }

    #[test]
    fn test_validity() {
        assert!(BoundingBox::new(0, 0, 1, 1).is_valid());
        assert!(!BoundingBox::new(5, 0, 5, 10).is_valid());
        assert!(!BoundingBox::new(0, 10, 10, 3).is_valid());
        assert_eq!(BoundingBox::new(10, 10, 0, 0).area(), 0);
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(5, 5, 15, 15);

        // Intersection: 5x5 = 25
        // Union: 100 + 100 - 25 = 175
        assert!((a.iou(&b) - 25.0 / 175.0).abs() < 1e-6);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&BoundingBox::new(20, 20, 30, 30)), 0.0);
    }
}
