//! Box and label drawing.
//!
//! Boxes are hollow rectangles and labels are rendered with a TrueType font
//! (DejaVu Sans Bold embedded by default). Drawing is clipped to the frame,
//! so boxes touching the border and labels above the top edge are partially
//! drawn rather than rejected.

use std::fmt;
use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detect::BoundingBox;
use crate::frame::Frame;
use crate::output::DetectionRecord;

static EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans-Bold.ttf");

/// The built-in label font.
pub fn embedded_font() -> Result<FontArc> {
    FontArc::try_from_slice(EMBEDDED_FONT).map_err(|e| anyhow!("embedded label font: {}", e))
}

/// Load a TrueType/OpenType font for labels.
pub fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read font file {}", path.display()))?;
    FontArc::try_from_vec(bytes).map_err(|e| anyhow!("invalid font file {}: {}", path.display(), e))
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnotationStyle {
    pub color: Rgb<u8>,
    /// Rectangle stroke width in pixels.
    pub box_thickness: u32,
    /// Label glyph height in pixels.
    pub text_height: f32,
    /// Distance from the box's top edge up to the text baseline.
    pub text_offset: i32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            color: Rgb([0, 255, 0]),
            box_thickness: 2,
            text_height: 16.0,
            text_offset: 10,
        }
    }
}

/// `"<label> <confidence to 2 decimals>"`.
pub fn label_text(label: &str, confidence: f32) -> String {
    format!("{} {:.2}", label, confidence)
}

#[derive(Clone)]
pub struct Annotator {
    style: AnnotationStyle,
    font: FontArc,
}

impl fmt::Debug for Annotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Annotator")
            .field("style", &self.style)
            .finish_non_exhaustive()
    }
}

impl Annotator {
    /// Annotator using the embedded font.
    pub fn new(style: AnnotationStyle) -> Result<Self> {
        Ok(Self::with_font(style, embedded_font()?))
    }

    pub fn with_font(style: AnnotationStyle, font: FontArc) -> Self {
        Self { style, font }
    }

    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    /// Draw every record's box and label onto `frame`.
    pub fn annotate(&self, frame: &mut Frame, records: &[DetectionRecord]) {
        let image = frame.image_mut();
        for record in records {
            self.draw_box(image, &record.bbox);
            self.draw_label(
                image,
                &label_text(&record.label, record.confidence),
                record.bbox.x1,
                record.bbox.y1.saturating_sub(self.style.text_offset),
            );
        }
    }

    /// Hollow rectangle; the stroke straddles the box edge. Corners are
    /// clamped to just outside the frame first, so huge boxes stay cheap and
    /// never overflow.
    fn draw_box(&self, image: &mut RgbImage, bbox: &BoundingBox) {
        let t = self.style.box_thickness.max(1) as i32;
        let half = t / 2;
        let (w, h) = (image.width() as i32, image.height() as i32);
        let clamp_x = |v: i32| v.clamp(-t, w + t);
        let clamp_y = |v: i32| v.clamp(-t, h + t);
        let (x1, x2) = (clamp_x(bbox.x1.min(bbox.x2)), clamp_x(bbox.x1.max(bbox.x2)));
        let (y1, y2) = (clamp_y(bbox.y1.min(bbox.y2)), clamp_y(bbox.y1.max(bbox.y2)));
        for ring in 0..t {
            let off = half - ring;
            let (left, top) = (x1 - off, y1 - off);
            let (right, bottom) = (x2 + off, y2 + off);
            if right < left || bottom < top {
                continue;
            }
            let rect = Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
            draw_hollow_rect_mut(image, rect, self.style.color);
        }
    }

    /// Text whose baseline starts at (`x`, `baseline`).
    fn draw_label(&self, image: &mut RgbImage, text: &str, x: i32, baseline: i32) {
        let scale = PxScale::from(self.style.text_height);
        let ascent = self.font.as_scaled(scale).ascent().round() as i32;
        let (tw, th) = text_size(scale, &self.font, text);
        let (w, h) = (image.width() as i32, image.height() as i32);
        // Anything further out than this is invisible anyway.
        let x = x.clamp(-(tw as i32) - 1, w);
        let top = baseline.saturating_sub(ascent).clamp(-(th as i32) - 1, h);
        draw_text_mut(image, self.style.color, x, top, scale, &self.font, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
    const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

    fn annotator() -> Annotator {
        Annotator::new(AnnotationStyle::default()).unwrap()
    }

    fn record(label: &str, bbox: BoundingBox) -> DetectionRecord {
        DetectionRecord {
            object_id: format!("{}_{}_{}_{}_{}", label, bbox.x1, bbox.y1, bbox.x2, bbox.y2),
            label: label.to_string(),
            confidence: 0.876,
            bbox,
        }
    }

    fn lit(img: &RgbImage, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> usize {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .filter(|&(x, y)| *img.get_pixel(x, y) != BLACK)
            .count()
    }

    #[test]
    fn label_has_two_decimals() {
        assert_eq!(label_text("car", 0.876), "car 0.88");
        assert_eq!(label_text("traffic light", 1.0), "traffic light 1.00");
    }

    #[test]
    fn draws_box_edges_but_not_interior() {
        let mut frame = Frame::filled(100, 100, 0, [0, 0, 0]);
        annotator().annotate(&mut frame, &[record("car", BoundingBox::new(20, 40, 60, 80))]);
        let img = frame.image();
        assert_eq!(*img.get_pixel(20, 60), GREEN);
        assert_eq!(*img.get_pixel(19, 60), GREEN);
        assert_eq!(*img.get_pixel(60, 60), GREEN);
        assert_eq!(*img.get_pixel(40, 40), GREEN);
        assert_eq!(*img.get_pixel(40, 80), GREEN);
        assert_eq!(*img.get_pixel(40, 60), BLACK);
        assert_eq!(*img.get_pixel(90, 90), BLACK);
    }

    #[test]
    fn label_sits_above_the_box() {
        let mut frame = Frame::filled(200, 100, 0, [0, 0, 0]);
        annotator().annotate(&mut frame, &[record("car", BoundingBox::new(20, 40, 60, 80))]);
        let img = frame.image();
        // Baseline at y = 30.
        assert!(lit(img, 20..140, 10..31) > 0);
        // Gap between baseline and box stroke stays untouched.
        assert_eq!(lit(img, 20..140, 33..38), 0);
    }

    #[test]
    fn label_keeps_letter_case() {
        let mut lower = Frame::filled(200, 100, 0, [0, 0, 0]);
        let mut upper = Frame::filled(200, 100, 0, [0, 0, 0]);
        annotator().annotate(&mut lower, &[record("car", BoundingBox::new(20, 40, 60, 80))]);
        annotator().annotate(&mut upper, &[record("CAR", BoundingBox::new(20, 40, 60, 80))]);
        assert_ne!(lower.image(), upper.image());
    }

    #[test]
    fn non_ascii_labels_render_their_own_glyphs() {
        let mut plain = Frame::filled(200, 100, 0, [0, 0, 0]);
        let mut accented = Frame::filled(200, 100, 0, [0, 0, 0]);
        annotator().annotate(&mut plain, &[record("cafe", BoundingBox::new(20, 40, 60, 80))]);
        annotator().annotate(&mut accented, &[record("café", BoundingBox::new(20, 40, 60, 80))]);
        assert_ne!(plain.image(), accented.image());
    }

    #[test]
    fn drawing_is_clipped_to_frame() {
        let mut frame = Frame::filled(40, 40, 0, [0, 0, 0]);
        annotator().annotate(&mut frame, &[record("car", BoundingBox::new(0, 2, 39, 39))]);
        assert_eq!(*frame.image().get_pixel(0, 20), GREEN);
        assert_eq!(*frame.image().get_pixel(39, 20), GREEN);
    }

    #[test]
    fn extreme_boxes_do_not_overflow() {
        let mut frame = Frame::filled(40, 40, 0, [0, 0, 0]);
        let boxes = [
            BoundingBox::new(5, i32::MIN + 5, 30, 30),
            BoundingBox::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX),
            BoundingBox::new(i32::MAX - 1, i32::MAX - 1, i32::MAX, i32::MAX),
        ];
        let records: Vec<_> = boxes.into_iter().map(|b| record("car", b)).collect();
        annotator().annotate(&mut frame, &records);
        assert_eq!(*frame.image().get_pixel(5, 20), GREEN);
    }

    #[test]
    fn missing_font_file_names_the_path() {
        let err = load_font(Path::new("/nonexistent/label.ttf")).err().unwrap();
        assert!(err.to_string().contains("/nonexistent/label.ttf"));
    }
}
