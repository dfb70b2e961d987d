use tracing::debug;
use tract_onnx::prelude::*;

use crate::config::OnnxConfig;
use crate::error::{InferenceError, ModelLoadError};
use crate::estimator::{crop_face, AgeEstimate, AgeEstimator};
use crate::face_locator::FaceRegion;
use crate::raster::RasterImage;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Age estimator running an ONNX classification model on tract.
///
/// The model takes a `1 × 3 × S × S` normalized RGB face crop and emits one
/// score per age bin. The estimate is the probability-weighted mean of the
/// bin ages; the confidence is the probability of the most likely bin.
pub struct OnnxAgeEstimator {
    plan: Plan,
    config: OnnxConfig,
}

impl OnnxAgeEstimator {
    /// Load and optimize the model at `config.model_path`.
    pub fn new(config: OnnxConfig) -> Result<Self, ModelLoadError> {
        let path = config.model_path.display().to_string();
        let size = config.input_size as usize;
        let load_error = |e: TractError| ModelLoadError::Backend {
            path: path.clone(),
            message: e.to_string(),
        };

        let plan = tract_onnx::onnx()
            .model_for_path(&config.model_path)
            .and_then(|model| model.with_input_fact(0, f32::fact([1, 3, size, size]).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(load_error)?;

        debug!(%path, input_size = size, bins = config.bin_ages.len(), "loaded ONNX age model");
        Ok(Self { plan, config })
    }

    fn input_tensor(&self, crop: &image::RgbImage) -> Tensor {
        let size = self.config.input_size as usize;
        let OnnxConfig { mean, std: stddev, .. } = &self.config;
        tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            let value = crop.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
            (value - mean[c]) / stddev[c]
        })
        .into()
    }
}

impl AgeEstimator for OnnxAgeEstimator {
    fn estimate(
        &self,
        raster: &RasterImage,
        face: &FaceRegion,
    ) -> Result<AgeEstimate, InferenceError> {
        let crop = crop_face(raster, face, self.config.face_margin, self.config.input_size)?;
        let input = self.input_tensor(&crop);

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| InferenceError::Backend(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::InvalidOutput("model produced no outputs".to_string()))?;
        let scores: Vec<f32> = output
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::InvalidOutput(e.to_string()))?
            .iter()
            .copied()
            .collect();

        decode_bins(&scores, &self.config.bin_ages, self.config.outputs_logits)
    }
}

/// Turn per-bin scores into an [`AgeEstimate`].
pub(crate) fn decode_bins(
    scores: &[f32],
    bin_ages: &[f32],
    logits: bool,
) -> Result<AgeEstimate, InferenceError> {
    if scores.len() != bin_ages.len() {
        return Err(InferenceError::InvalidOutput(format!(
            "expected {} age bins, got {}",
            bin_ages.len(),
            scores.len()
        )));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(InferenceError::InvalidOutput(
            "non-finite score in model output".to_string(),
        ));
    }

    let mut probs = scores.to_vec();
    if logits {
        softmax(&mut probs);
    } else {
        let total: f32 = probs.iter().sum();
        if total <= 0.0 || probs.iter().any(|p| *p < 0.0) {
            return Err(InferenceError::InvalidOutput(
                "probabilities must be non-negative with a positive sum".to_string(),
            ));
        }
        probs.iter_mut().for_each(|p| *p /= total);
    }

    let years: f32 = probs.iter().zip(bin_ages).map(|(p, age)| p * age).sum();
    if !years.is_finite() {
        return Err(InferenceError::InvalidOutput(format!(
            "non-finite expected age: {years}"
        )));
    }
    let confidence = probs.iter().copied().fold(0.0_f32, f32::max);
    Ok(AgeEstimate { years, confidence })
}

fn softmax(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}
