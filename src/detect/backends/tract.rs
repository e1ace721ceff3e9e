#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops::FilterType, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::{InferenceBackend, Thresholds};
use crate::detect::result::Detection;
use crate::detect::yolo::{non_max_suppression, YoloOutput};
use crate::error::InferenceError;
use crate::frame::{ChannelOrder, Frame};

/// Tract-based backend for YOLOv8 ONNX models.
///
/// Loads a local model file once and runs it on RGB frames resized to the
/// square model input. No network I/O.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
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

        Ok(Self { model, input_size })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;
        let resized =
            image::imageops::resize(&image, self.input_size, self.input_size, FilterType::Triangle);
        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn run(&self, frame: &Frame, thresholds: Thresholds) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected output shape {:?}, expected [1, C, N]", shape));
        }
        let data: Vec<f32> = view.iter().copied().collect();
        let head = YoloOutput::new(&data, shape[1], shape[2])?;

        let sx = frame.width as f32 / self.input_size as f32;
        let sy = frame.height as f32 / self.input_size as f32;
        let candidates = head.decode(thresholds.confidence, sx, sy);
        Ok(non_max_suppression(candidates, thresholds.iou))
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    fn infer(
        &mut self,
        frame: &Frame,
        thresholds: Thresholds,
    ) -> Result<Vec<Detection>, InferenceError> {
        self.run(frame, thresholds)
            .map_err(|err| InferenceError::Run(format!("{:#}", err)))
    }

    fn warm_up(&mut self) -> Result<(), InferenceError> {
        let side = self.input_size;
        let blank = Frame::new(
            vec![0u8; (side as usize) * (side as usize) * 3],
            side,
            side,
            ChannelOrder::Rgb,
            0,
        )
        .map_err(|err| InferenceError::Run(format!("{:#}", err)))?;
        self.infer(&blank, Thresholds::default()).map(|_| ())
    }
}
