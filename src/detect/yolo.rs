//! YOLOv8 pre/post-processing.
//!
//! Kept free of any inference runtime so the geometry and box decoding can be
//! exercised without a model file. The runtime backend feeds the letterboxed
//! tensor through the network and hands the raw `[4 + classes, anchors]`
//! output back here.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::config::DetectorSettings;
use crate::detect::labels::ClassNames;
use crate::detect::result::{BoundingBox, Detection};

/// Padding colour used by the Ultralytics letterbox.
const PAD_VALUE: u8 = 114;

/// Scale-and-pad transform from frame space into the square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub resized_width: u32,
    pub resized_height: u32,
    pub source_width: u32,
    pub source_height: u32,
    pub target: u32,
}

impl Letterbox {
    pub fn new(source_width: u32, source_height: u32, target: u32) -> Self {
        let scale = f32::min(
            target as f32 / source_width.max(1) as f32,
            target as f32 / source_height.max(1) as f32,
        );
        let resized_width = ((source_width as f32 * scale).round() as u32).clamp(1, target);
        let resized_height = ((source_height as f32 * scale).round() as u32).clamp(1, target);
        Self {
            scale,
            pad_x: (target - resized_width) / 2,
            pad_y: (target - resized_height) / 2,
            resized_width,
            resized_height,
            source_width,
            source_height,
            target,
        }
    }

    /// Produce the padded `target x target` image.
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let resized = imageops::resize(
            image,
            self.resized_width,
            self.resized_height,
            FilterType::Triangle,
        );
        let mut canvas = RgbImage::from_pixel(self.target, self.target, Rgb([PAD_VALUE; 3]));
        imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }

    /// Map a point from model-input space back to source pixels, clamped to the frame.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let sx = (x - self.pad_x as f32) / self.scale;
        let sy = (y - self.pad_y as f32) / self.scale;
        (
            sx.clamp(0.0, self.source_width as f32),
            sy.clamp(0.0, self.source_height as f32),
        )
    }
}

/// One decoded box in model-input space, before NMS.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub class_index: usize,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &Candidate) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Decode a channel-major `[channels, anchors]` output of `(cx, cy, w, h, scores...)`.
pub fn decode(output: &[f32], channels: usize, anchors: usize, score_floor: f32) -> Vec<Candidate> {
    if channels <= 4 || output.len() < channels * anchors {
        return Vec::new();
    }
    let at = |c: usize, i: usize| output[c * anchors + i];
    let mut candidates = Vec::new();
    for i in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for c in 4..channels {
            let score = at(c, i);
            if score > best_score {
                best_score = score;
                best_class = c - 4;
            }
        }
        if best_score.is_nan() || best_score < score_floor {
            continue;
        }
        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        candidates.push(Candidate {
            class_index: best_class,
            confidence: best_score.min(1.0),
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        });
    }
    candidates
}

/// Class-aware greedy NMS. Output is confidence-descending, capped at `max_detections`.
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Candidate> = Vec::new();
    for cand in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_index == cand.class_index && k.iou(&cand) > iou_threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}

/// Full post-processing: decode, NMS, map to frame pixels, resolve labels.
pub fn postprocess(
    output: &[f32],
    channels: usize,
    anchors: usize,
    letterbox: &Letterbox,
    settings: &DetectorSettings,
    names: &ClassNames,
) -> Vec<Detection> {
    let candidates = decode(output, channels, anchors, settings.score_floor);
    non_max_suppression(candidates, settings.nms_iou, settings.max_detections)
        .into_iter()
        .map(|c| {
            let (x1, y1) = letterbox.to_source(c.x1, c.y1);
            let (x2, y2) = letterbox.to_source(c.x2, c.y2);
            // Truncation toward zero, same as casting the float corners to int.
            let bbox = BoundingBox::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32);
            Detection::new(names.name(c.class_index), c.confidence, bbox)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_from_rows(rows: &[[f32; 6]]) -> Vec<f32> {
        // rows are anchors of (cx, cy, w, h, score0, score1); transpose to channel-major.
        let anchors = rows.len();
        let mut out = vec![0.0; 6 * anchors];
        for (i, row) in rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                out[c * anchors + i] = *v;
            }
        }
        out
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let lb = Letterbox::new(1280, 720, 640);
        assert_eq!(lb.resized_width, 640);
        assert_eq!(lb.resized_height, 360);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 140);
        let (x, y) = lb.to_source(320.0, 320.0);
        assert!((x - 640.0).abs() < 1e-3);
        assert!((y - 360.0).abs() < 1e-3);
    }

    #[test]
    fn letterbox_apply_fills_padding() {
        let image = RgbImage::from_pixel(100, 50, Rgb([255, 0, 0]));
        let lb = Letterbox::new(100, 50, 64);
        let out = lb.apply(&image);
        assert_eq!(out.dimensions(), (64, 64));
        assert_eq!(out.get_pixel(32, 0), &Rgb([PAD_VALUE; 3]));
        let inside = out.get_pixel(32, 32);
        assert!(inside[0] > 250 && inside[1] < 5 && inside[2] < 5);
    }

    #[test]
    fn to_source_clamps_to_frame() {
        let lb = Letterbox::new(640, 640, 640);
        assert_eq!(lb.to_source(-5.0, 700.0), (0.0, 640.0));
    }

    #[test]
    fn decode_keeps_best_class_above_floor() {
        let out = output_from_rows(&[
            [50.0, 50.0, 20.0, 20.0, 0.1, 0.8],
            [10.0, 10.0, 4.0, 4.0, 0.2, 0.1],
        ]);
        let cands = decode(&out, 6, 2, 0.25);
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].class_index, 1);
        assert!((cands[0].confidence - 0.8).abs() < 1e-6);
        assert_eq!((cands[0].x1, cands[0].y1), (40.0, 40.0));
        assert_eq!((cands[0].x2, cands[0].y2), (60.0, 60.0));
    }

    #[test]
    fn nms_is_class_aware_and_ordered() {
        let a = Candidate {
            class_index: 0,
            confidence: 0.6,
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
        };
        let b = Candidate {
            confidence: 0.9,
            x1: 1.0,
            ..a
        };
        let c = Candidate {
            class_index: 1,
            confidence: 0.7,
            ..a
        };
        let kept = non_max_suppression(vec![a, b, c], 0.7, 300);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_index, 1);

        let capped = non_max_suppression(vec![a, c], 0.7, 1);
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn postprocess_maps_back_to_frame_and_labels() {
        let out = output_from_rows(&[[320.0, 320.0, 100.0, 50.0, 0.05, 0.9]]);
        let lb = Letterbox::new(1280, 720, 640);
        let names = ClassNames::from_names(vec!["person".into(), "car".into()]);
        let dets = postprocess(&out, 6, 1, &lb, &DetectorSettings::default(), &names);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "car");
        assert_eq!(dets[0].bbox, BoundingBox::new(540, 310, 740, 410));
    }
}
