#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::detect::vocabulary::coco_label;
use crate::detect::yolo::{self, Letterbox};
use crate::frame::Frame;

/// Padding colour around a letterboxed frame.
const LETTERBOX_FILL: [u8; 3] = [114, 114, 114];

/// Tract-based backend for YOLOv8 / YOLO11 ONNX exports.
///
/// Loads a local model file once and runs it on every frame. Frames are
/// letterboxed into the square model input (aspect ratio kept, grey padding);
/// boxes are mapped back to frame pixels.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{} input)",
            model_path.display(),
            input_size,
            input_size
        );

        Ok(Self {
            model,
            input_size,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
        })
    }

    /// Override the default confidence and NMS IoU thresholds.
    pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
        self.confidence_threshold = confidence;
        self.iou_threshold = iou;
        self
    }

    fn build_input(&self, frame: &Frame) -> (Tensor, Letterbox) {
        let side = self.input_size;
        let letterbox = Letterbox::fit(frame.width(), frame.height(), side);
        let resized = imageops::resize(
            frame.image(),
            letterbox.resized_width,
            letterbox.resized_height,
            FilterType::Triangle,
        );
        let mut canvas = RgbImage::from_pixel(side, side, Rgb(LETTERBOX_FILL));
        imageops::overlay(
            &mut canvas,
            &resized,
            letterbox.pad_x as i64,
            letterbox.pad_y as i64,
        );

        let side = side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            canvas.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0
        });
        (input.into_tensor(), letterbox)
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        frame: &Frame,
        letterbox: &Letterbox,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        let (rows, cols) = match shape.as_slice() {
            [1, rows, cols] => (*rows, *cols),
            [rows, cols] => (*rows, *cols),
            other => return Err(anyhow!("unexpected YOLO output shape {:?}", other)),
        };
        let data: Vec<f32> = view.iter().copied().collect();

        let params = letterbox.decode_params(
            self.confidence_threshold,
            self.iou_threshold,
            frame.width(),
            frame.height(),
        );
        let candidates = yolo::decode(&data, rows, cols, &params)?;
        Ok(yolo::into_detections(candidates, coco_label))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (input, letterbox) = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame, &letterbox)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::filled(self.input_size, self.input_size, LETTERBOX_FILL, 0);
        self.detect(&blank).map(|_| ())
    }
}
