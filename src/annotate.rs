//! Drawing tracked people onto output frames.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::Rgb;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;

use crate::report::format_duration;
use crate::risk::RiskTier;
use crate::tracker::TrackedDetection;
use crate::video::Frame;

/// Box and label colour for people in the critical tier.
pub const ALERT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const BOX_THICKNESS: i32 = 2;
const LABEL_PADDING: i32 = 4;

/// DejaVu Sans Mono, used for labels unless another font is supplied.
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSansMono.ttf");

#[derive(Debug, Error)]
pub enum FontError {
    #[error("cannot read font {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid font {path}")]
    Invalid { path: String },
}

/// Draws a box and a "{name} {m}m {s}s" label for each tracked detection.
///
/// The default annotator labels with the bundled font. An annotator built
/// with [`Annotator::without_labels`] draws boxes only.
#[derive(Clone)]
pub struct Annotator {
    font: Option<FontArc>,
    scale: PxScale,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            font: FontArc::try_from_slice(BUNDLED_FONT).ok(),
            scale: PxScale::from(16.0),
        }
    }
}

impl Annotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxes only, no labels.
    pub fn without_labels() -> Self {
        Self {
            font: None,
            ..Self::default()
        }
    }

    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_scale(mut self, px: f32) -> Self {
        self.scale = PxScale::from(px);
        self
    }

    /// Load a TrueType/OpenType label font from disk.
    pub fn from_font_file(path: &Path) -> Result<Self, FontError> {
        let bytes = std::fs::read(path).map_err(|source| FontError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let font = FontArc::try_from_vec(bytes).map_err(|_| FontError::Invalid {
            path: path.display().to_string(),
        })?;
        Ok(Self::default().with_font(font))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn label(det: &TrackedDetection) -> String {
        format!("{} {}", det.display_name, format_duration(det.duration_seconds))
    }

    /// Track colour, or [`ALERT_COLOR`] once the person is critical.
    pub fn box_color(det: &TrackedDetection) -> Rgb<u8> {
        if RiskTier::classify(det.duration_seconds).is_critical() {
            ALERT_COLOR
        } else {
            det.color
        }
    }

    /// Draw every detection and return how many were drawn in the alert colour.
    pub fn draw(&self, frame: &mut Frame, detections: &[TrackedDetection]) -> u64 {
        let mut alerts = 0;
        for det in detections {
            if RiskTier::classify(det.duration_seconds).is_critical() {
                alerts += 1;
            }
            self.draw_one(frame, det, Self::box_color(det));
        }
        alerts
    }

    fn draw_one(&self, frame: &mut Frame, det: &TrackedDetection, color: Rgb<u8>) {
        let bbox = det.bbox();
        for inset in 0..BOX_THICKNESS {
            let w = bbox.width() - 2 * inset;
            let h = bbox.height() - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(bbox.x1 + inset, bbox.y1 + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(frame, rect, color);
        }

        let Some(font) = self.font.as_ref() else {
            return;
        };
        let label = Self::label(det);
        let (text_w, text_h) = text_size(self.scale, font, &label);
        if text_w == 0 || text_h == 0 {
            return;
        }
        let top = bbox.y1 - text_h as i32 - LABEL_PADDING;
        let background = Rect::at(bbox.x1, top).of_size(text_w, text_h + LABEL_PADDING as u32);
        draw_filled_rect_mut(frame, background, color);
        draw_text_mut(
            frame,
            LABEL_TEXT_COLOR,
            bbox.x1,
            top + LABEL_PADDING / 2,
            self.scale,
            font,
            &label,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{BoundingBox, Detection};

    fn tracked(duration_seconds: f64, color: Rgb<u8>) -> TrackedDetection {
        TrackedDetection {
            detection: Detection::new(BoundingBox::new(10, 10, 30, 40), 0.9, "person"),
            track_id: 3,
            display_name: "Person 3".to_string(),
            duration_seconds,
            color,
        }
    }

    #[test]
    fn test_label_format() {
        assert_eq!(Annotator::label(&tracked(125.7, Rgb([0, 255, 0]))), "Person 3 2m 5s");
    }

    #[test]
    fn test_alert_color_follows_critical_tier() {
        let green = Rgb([0, 255, 0]);
        assert_eq!(Annotator::box_color(&tracked(300.0, green)), green);
        assert_eq!(Annotator::box_color(&tracked(300.5, green)), ALERT_COLOR);
    }

    #[test]
    fn test_draws_box_outline() {
        let green = Rgb([0, 255, 0]);
        let mut frame = Frame::new(64, 64);
        let alerts = Annotator::new().draw(&mut frame, &[tracked(1.0, green)]);

        assert_eq!(alerts, 0);
        assert_eq!(*frame.get_pixel(10, 10), green);
        assert_eq!(*frame.get_pixel(11, 11), green);
        assert_eq!(*frame.get_pixel(29, 39), green);
        assert_eq!(*frame.get_pixel(20, 25), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_counts_alert_draws() {
        let mut frame = Frame::new(64, 64);
        let dets = [tracked(400.0, Rgb([0, 255, 0])), tracked(10.0, Rgb([0, 0, 255]))];
        let alerts = Annotator::without_labels().draw(&mut frame, &dets);
        assert_eq!(alerts, 1);
        assert_eq!(*frame.get_pixel(10, 10), Rgb([0, 0, 255]));
    }

    #[test]
    fn test_default_annotator_draws_label_above_box() {
        let green = Rgb([0, 255, 0]);
        let mut frame = Frame::new(120, 80);
        let mut det = tracked(65.0, green);
        det.detection = Detection::new(BoundingBox::new(10, 40, 50, 70), 0.9, "person");

        let annotator = Annotator::default();
        assert!(annotator.has_font());
        annotator.draw(&mut frame, &[det]);

        let label_pixels = (10..110)
            .flat_map(|x| (0..40).map(move |y| (x, y)))
            .filter(|&(x, y)| *frame.get_pixel(x, y) != Rgb([0, 0, 0]))
            .count();
        assert!(label_pixels > 0);
        assert_eq!(*frame.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_without_labels_draws_box_only() {
        let mut frame = Frame::new(120, 80);
        let mut det = tracked(65.0, Rgb([0, 255, 0]));
        det.detection = Detection::new(BoundingBox::new(10, 40, 50, 70), 0.9, "person");

        let annotator = Annotator::without_labels();
        assert!(!annotator.has_font());
        annotator.draw(&mut frame, &[det]);

        let mut above_box = (0..120).flat_map(|x| (0..40).map(move |y| (x, y)));
        assert!(above_box.all(|(x, y)| frame.get_pixel(x, y).0 == [0, 0, 0]));
        assert_eq!(*frame.get_pixel(10, 40), Rgb([0, 255, 0]));
    }

    #[test]
    fn test_missing_font_file() {
        let err = Annotator::from_font_file(Path::new("/nonexistent/font.ttf"))
            .err()
            .unwrap();
        assert!(matches!(err, FontError::Read { .. }));
    }
}
