//! YOLOv8 / YOLO11 detection head decoding.
//!
//! Exports of both model families emit a single `[1, 4 + nc, anchors]` tensor
//! (some toolchains transpose it to `[1, anchors, 4 + nc]`). Each anchor column
//! holds `cx, cy, w, h` in model-input pixels followed by one score per class.
//! Frames reach the model letterboxed: scaled to fit the square input with
//! the aspect ratio kept, then centred on grey padding. Decoding removes the
//! padding and scale again. It is independent of the inference runtime so it
//! can be tested on hand-built tensors.

use anyhow::{anyhow, Result};

use super::result::{BoundingBox, Detection};

const CXYWH_OFFSET: usize = 4;

/// Thresholds and the model-input to frame mapping.
///
/// A model coordinate `m` maps to frame pixel `(m - pad) * scale`.
#[derive(Clone, Copy, Debug)]
pub struct DecodeParams {
    pub confidence: f32,
    pub iou: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub frame_width: f32,
    pub frame_height: f32,
}

/// Aspect-preserving fit of a frame into the square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    /// Model pixels per frame pixel.
    pub ratio: f32,
    pub resized_width: u32,
    pub resized_height: u32,
    /// Left and top padding in model pixels.
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, side: u32) -> Self {
        let (width, height, side) = (width.max(1), height.max(1), side.max(1));
        let ratio = (side as f32 / width as f32).min(side as f32 / height as f32);
        let resized_width = ((width as f32 * ratio).round() as u32).clamp(1, side);
        let resized_height = ((height as f32 * ratio).round() as u32).clamp(1, side);
        Self {
            ratio,
            resized_width,
            resized_height,
            pad_x: (side - resized_width) / 2,
            pad_y: (side - resized_height) / 2,
        }
    }

    /// Decode parameters mapping model output back onto a `width x height` frame.
    pub fn decode_params(&self, confidence: f32, iou: f32, width: u32, height: u32) -> DecodeParams {
        DecodeParams {
            confidence,
            iou,
            scale_x: 1.0 / self.ratio,
            scale_y: 1.0 / self.ratio,
            pad_x: self.pad_x as f32,
            pad_y: self.pad_y as f32,
            frame_width: width as f32,
            frame_height: height as f32,
        }
    }
}

/// A scored box before it is given a label.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
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
        let l = self.x1.max(other.x1);
        let r = self.x2.min(other.x2);
        let t = self.y1.max(other.y1);
        let b = self.y2.min(other.y2);
        let inter = (r - l).max(0.0) * (b - t).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Decode a `rows x cols` output matrix (batch dimension already stripped).
///
/// The shorter axis is taken as the attribute axis.
pub fn decode(data: &[f32], rows: usize, cols: usize, params: &DecodeParams) -> Result<Vec<Candidate>> {
    if data.len() != rows * cols {
        return Err(anyhow!(
            "output tensor has {} values, expected {}x{}",
            data.len(),
            rows,
            cols
        ));
    }
    let attributes_first = rows <= cols;
    let (attrs, anchors) = if attributes_first {
        (rows, cols)
    } else {
        (cols, rows)
    };
    if attrs <= CXYWH_OFFSET {
        return Err(anyhow!(
            "output tensor has {} attributes per anchor, need at least {}",
            attrs,
            CXYWH_OFFSET + 1
        ));
    }
    let at = |attr: usize, anchor: usize| {
        if attributes_first {
            data[attr * cols + anchor]
        } else {
            data[anchor * cols + attr]
        }
    };

    let mut out = Vec::new();
    for anchor in 0..anchors {
        let (class_id, confidence) = (CXYWH_OFFSET..attrs)
            .map(|attr| (attr - CXYWH_OFFSET, at(attr, anchor)))
            .fold((0usize, f32::NEG_INFINITY), |best, x| {
                if x.1 > best.1 {
                    x
                } else {
                    best
                }
            });
        if confidence < params.confidence {
            continue;
        }

        let cx = (at(0, anchor) - params.pad_x) * params.scale_x;
        let cy = (at(1, anchor) - params.pad_y) * params.scale_y;
        let w = at(2, anchor) * params.scale_x;
        let h = at(3, anchor) * params.scale_y;
        out.push(Candidate {
            class_id,
            confidence,
            x1: (cx - w / 2.).clamp(0.0, params.frame_width),
            y1: (cy - h / 2.).clamp(0.0, params.frame_height),
            x2: (cx + w / 2.).clamp(0.0, params.frame_width),
            y2: (cy + h / 2.).clamp(0.0, params.frame_height),
        });
    }

    non_max_suppression(&mut out, params.iou);
    Ok(out)
}

/// Greedy per-class NMS. Keeps the highest-scoring box of every overlapping
/// group of the same class; boxes of different classes never suppress each
/// other. Survivors stay sorted by descending confidence.
pub fn non_max_suppression(xs: &mut Vec<Candidate>, iou_threshold: f32) {
    xs.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].class_id == xs[index].class_id
                && xs[prev_index].iou(&xs[index]) > iou_threshold
            {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

/// Attach labels and convert to integer-pixel detections.
pub fn into_detections(
    candidates: Vec<Candidate>,
    label_for: impl Fn(usize) -> String,
) -> Vec<Detection> {
    candidates
        .into_iter()
        .map(|c| {
            Detection::new(label_for(c.class_id), BoundingBox::from_xyxy(c.x1, c.y1, c.x2, c.y2))
                .with_confidence(c.confidence)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DecodeParams {
        DecodeParams {
            confidence: 0.25,
            iou: 0.7,
            scale_x: 2.0,
            scale_y: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            frame_width: 1280.0,
            frame_height: 640.0,
        }
    }

    /// Two classes, six anchors, attributes-first layout.
    fn tensor() -> Vec<f32> {
        // rows: cx, cy, w, h, score(class0), score(class1)
        vec![
            100.0, 102.0, 400.0, 0.0, 0.0, 0.0, // cx
            100.0, 100.0, 300.0, 0.0, 0.0, 0.0, // cy
            40.0, 40.0, 20.0, 0.0, 0.0, 0.0, // w
            40.0, 40.0, 20.0, 0.0, 0.0, 0.0, // h
            0.9, 0.8, 0.1, 0.0, 0.0, 0.0, // class 0
            0.1, 0.2, 0.2, 0.0, 0.0, 0.0, // class 1
        ]
    }

    #[test]
    fn decodes_scales_and_suppresses_overlaps() -> Result<()> {
        let out = decode(&tensor(), 6, 6, &params())?;
        // anchor 1 overlaps anchor 0 and scores lower; the rest are below threshold
        assert_eq!(out.len(), 1);
        let c = &out[0];
        assert_eq!(c.class_id, 0);
        assert_eq!(c.x1, 160.0);
        assert_eq!(c.x2, 240.0);
        assert_eq!(c.y1, 80.0);
        assert_eq!(c.y2, 120.0);
        Ok(())
    }

    #[test]
    fn transposed_layout_gives_same_result() -> Result<()> {
        let t = tensor();
        let mut padded = t.clone();
        // one extra zero-score anchor so the attribute axis is the shorter one
        for row in (0..6).rev() {
            padded.insert(row * 6 + 6, 0.0);
        }
        let mut transposed = vec![0.0; padded.len()];
        for attr in 0..6 {
            for anchor in 0..7 {
                transposed[anchor * 6 + attr] = padded[attr * 7 + anchor];
            }
        }
        assert_eq!(
            decode(&transposed, 7, 6, &params())?,
            decode(&t, 6, 6, &params())?
        );
        Ok(())
    }

    #[test]
    fn clamps_to_frame_bounds() -> Result<()> {
        let mut data = vec![0.0; 5 * 5];
        data[2 * 5] = 100.0; // w of anchor 0
        data[3 * 5] = 100.0; // h of anchor 0
        data[4 * 5] = 0.9; // score of anchor 0
        let out = decode(&data, 5, 5, &params())?;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].x1, 0.0);
        assert_eq!(out[0].y1, 0.0);
        assert_eq!(out[0].x2, 100.0);
        assert_eq!(out[0].y2, 50.0);
        Ok(())
    }

    /// Attributes-first tensor of `count` anchors; unlisted anchors score zero.
    fn attributes_first(anchors: &[&[f32]], count: usize) -> (Vec<f32>, usize, usize) {
        let attrs = anchors[0].len();
        let mut data = vec![0.0; attrs * count];
        for (anchor, values) in anchors.iter().enumerate() {
            for (attr, value) in values.iter().enumerate() {
                data[attr * count + anchor] = *value;
            }
        }
        (data, attrs, count)
    }

    fn candidate(class_id: usize, confidence: f32, x1: f32, x2: f32) -> Candidate {
        Candidate {
            class_id,
            confidence,
            x1,
            y1: 0.0,
            x2,
            y2: 100.0,
        }
    }

    #[test]
    fn overlapping_boxes_of_different_classes_both_survive() -> Result<()> {
        // class 0 at x 0..100 and class 1 at x 20..120: IoU 8000 / 12000
        let (data, rows, cols) = attributes_first(
            &[
                &[50.0, 50.0, 100.0, 100.0, 0.9, 0.0],
                &[70.0, 50.0, 100.0, 100.0, 0.0, 0.8],
            ],
            6,
        );
        let params = DecodeParams {
            scale_x: 1.0,
            ..params()
        };
        let out = decode(&data, rows, cols, &params)?;

        assert!((out[0].iou(&out[1]) - 2.0 / 3.0).abs() < 1e-6);
        let classes: Vec<usize> = out.iter().map(|c| c.class_id).collect();
        assert_eq!(classes, vec![0, 1]);
        Ok(())
    }

    #[test]
    fn suppression_only_applies_within_a_class() {
        let mut xs = vec![
            candidate(2, 0.6, 2.0, 102.0),
            candidate(2, 0.9, 0.0, 100.0),
            candidate(7, 0.8, 1.0, 101.0),
        ];
        non_max_suppression(&mut xs, 0.7);

        let kept: Vec<(usize, f32)> = xs.iter().map(|c| (c.class_id, c.confidence)).collect();
        assert_eq!(kept, vec![(2, 0.9), (7, 0.8)]);
    }

    #[test]
    fn letterbox_fits_wide_and_tall_frames() {
        assert_eq!(
            Letterbox::fit(1280, 640, 640),
            Letterbox {
                ratio: 0.5,
                resized_width: 640,
                resized_height: 320,
                pad_x: 0,
                pad_y: 160,
            }
        );
        let tall = Letterbox::fit(480, 640, 640);
        assert_eq!((tall.resized_width, tall.resized_height), (480, 640));
        assert_eq!((tall.pad_x, tall.pad_y), (80, 0));
    }

    #[test]
    fn letterbox_padding_is_removed_when_decoding() -> Result<()> {
        let letterbox = Letterbox::fit(1280, 640, 640);
        let params = letterbox.decode_params(0.25, 0.7, 1280, 640);

        // one anchor at (320, 260) in model pixels, 40x20, inside the padded band
        let (data, rows, cols) = attributes_first(&[&[320.0, 260.0, 40.0, 20.0, 0.9]], 5);
        let out = decode(&data, rows, cols, &params)?;
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].x1, out[0].x2), (600.0, 680.0));
        assert_eq!((out[0].y1, out[0].y2), (180.0, 220.0));
        Ok(())
    }

    #[test]
    fn rejects_short_attribute_axis() {
        assert!(decode(&[0.0; 8], 4, 2, &params()).is_err());
    }

    #[test]
    fn labels_come_from_the_lookup() {
        let candidates = vec![Candidate {
            class_id: 2,
            confidence: 0.7,
            x1: 1.9,
            y1: 2.2,
            x2: 10.6,
            y2: 20.0,
        }];
        let dets = into_detections(candidates, crate::detect::vocabulary::coco_label);
        assert_eq!(dets[0].label, "car");
        assert_eq!(dets[0].bbox, BoundingBox::new(1, 2, 10, 20));
    }
}
