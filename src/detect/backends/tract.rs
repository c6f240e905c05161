#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::config::DetectorSettings;
use crate::detect::backend::DetectorBackend;
use crate::detect::labels::ClassNames;
use crate::detect::result::Detection;
use crate::detect::yolo::{self, Letterbox};
use crate::frame::Frame;

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// Expects a `[1, 3, S, S]` float input and a `[1, 4 + classes, anchors]`
/// output. It does not perform any network I/O or write to disk beyond model
/// loading.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    settings: DetectorSettings,
    names: ClassNames,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        settings: DetectorSettings,
        names: ClassNames,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = settings.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            settings,
            names,
        })
    }

    fn build_input(&self, letterbox: &Letterbox, frame: &Frame) -> Tensor {
        let padded = letterbox.apply(frame.image());
        let size = self.settings.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
            padded.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        });
        input.into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let letterbox = Letterbox::new(frame.width(), frame.height(), self.settings.input_size);
        let input = self.build_input(&letterbox, frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("expected a [1, channels, anchors] output tensor")?;
        let (_, channels, anchors) = view.dim();
        if channels.saturating_sub(4) != self.names.len() {
            log::debug!(
                "model reports {} classes, label table has {}",
                channels.saturating_sub(4),
                self.names.len()
            );
        }
        let flat: Vec<f32> = view.iter().copied().collect();
        Ok(yolo::postprocess(
            &flat,
            channels,
            anchors,
            &letterbox,
            &self.settings,
            &self.names,
        ))
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = self.settings.input_size;
        let blank = Frame::filled(size, size, 0, [0; 3]);
        self.detect(&blank).map(|_| ())
    }
}
