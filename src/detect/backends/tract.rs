#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::nms::non_max_suppression;
use crate::detect::result::{BoundingBox, Detection, DetectionSet, ObjectClass};
use crate::frame::Frame;

const TRACT_CLASSES: [ObjectClass; 5] = [
    ObjectClass::Person,
    ObjectClass::Vehicle,
    ObjectClass::Animal,
    ObjectClass::Package,
    ObjectClass::Unknown,
];

/// Tract-based backend for YOLOv5-style ONNX object detectors.
///
/// Expects a square `1x3xSxS` float input and a `1xNx(5+C)` output where each
/// row is `cx, cy, w, h, objectness, class scores...` in input pixels. Class
/// indices follow COCO-80.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    score_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)))
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            score_threshold: 0.25,
            iou_threshold: 0.45,
        })
    }

    /// Nearest-neighbour resize into the square model input, scaled to 0..1.
    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let expected_len = Frame::expected_rgb_len(frame.width, frame.height)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if frame.width == 0 || frame.height == 0 || frame.pixels().len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected_len,
                frame.width,
                frame.height,
                frame.pixels().len()
            ));
        }

        let size = self.input_size as usize;
        let src_w = frame.width as usize;
        let src_h = frame.height as usize;
        let pixels = frame.pixels();
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            let sx = (x * src_w / size).min(src_w - 1);
            let sy = (y * src_h / size).min(src_h - 1);
            pixels[(sy * src_w + sx) * 3 + c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<DetectionSet> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[2] < 6 {
            return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
        }
        let rows = view
            .into_shape((shape[1], shape[2]))
            .context("reshape YOLO output")?;

        let scale = self.input_size as f32;
        let mut candidates = Vec::new();
        for row in rows.outer_iter() {
            let objectness = row[4];
            if objectness < self.score_threshold {
                continue;
            }
            let (class_id, class_score) = row
                .iter()
                .skip(5)
                .cloned()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (i, s)| {
                    if s > best.1 {
                        (i, s)
                    } else {
                        best
                    }
                });
            let confidence = objectness * class_score;
            if !confidence.is_finite() || confidence < self.score_threshold {
                continue;
            }
            let (cx, cy, w, h) = (row[0] / scale, row[1] / scale, row[2] / scale, row[3] / scale);
            candidates.push(Detection::new(
                ObjectClass::from_coco(class_id),
                confidence.clamp(0.0, 1.0),
                BoundingBox::new(cx - w / 2.0, cy - h / 2.0, w, h),
            ));
        }

        Ok(non_max_suppression(candidates, self.iou_threshold).into())
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn classes(&self) -> &[ObjectClass] {
        &TRACT_CLASSES
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionSet> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = self.input_size;
        let blank = Frame::new(vec![0u8; (size * size * 3) as usize], size, size, 0);
        self.detect(&blank).map(|_| ())
    }
}
