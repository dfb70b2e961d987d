use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, info, info_span, warn};

use crate::config::{NormalizerConfig, Policy};
use crate::decision::{Decision, FallbackReason};
use crate::error::{DecodeError, InferenceError};
use crate::estimator::AgeEstimator;
use crate::face_locator::{locate_faces, FaceLocator};
use crate::raster::{normalize, RasterImage};

/// Fail-safe age classification service.
///
/// Holds the loaded backends and the validated policy. Construct once at
/// startup, share by reference or `Arc` across workers, drop to release the
/// models. Calls are independent and keep no state between them.
pub struct AgeGate {
    locator: Box<dyn FaceLocator>,
    estimator: Box<dyn AgeEstimator>,
    policy: Policy,
    normalizer: NormalizerConfig,
}

impl AgeGate {
    /// Build a service from explicit backends with the default policy.
    pub fn new(locator: Box<dyn FaceLocator>, estimator: Box<dyn AgeEstimator>) -> Self {
        Self {
            locator,
            estimator,
            policy: Policy::default(),
            normalizer: NormalizerConfig::default(),
        }
    }

    /// Replace the decision policy.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the input decoding limits.
    pub fn normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Load the bundled SeetaFace locator and ONNX estimator from `config`.
    #[cfg(all(feature = "rustface", feature = "onnx"))]
    pub fn from_config(
        config: &crate::config::AgeGateConfig,
    ) -> Result<Self, crate::error::InitError> {
        config.validate()?;
        let locator = crate::rustface_backend::RustfaceLocator::new(config.rustface.clone())?;
        let estimator = crate::onnx_backend::OnnxAgeEstimator::new(config.onnx.clone())?;
        Ok(Self::new(Box::new(locator), Box::new(estimator))
            .policy(config.policy()?)
            .normalizer(config.normalizer.clone()))
    }

    /// The active policy.
    pub fn active_policy(&self) -> &Policy {
        &self.policy
    }

    /// Classify an encoded image.
    ///
    /// `Err` means the input itself was unusable and should be reported to
    /// the client as a validation failure. Every other outcome, including
    /// backend faults and panics, is an `Ok` decision. A panic inside an image
    /// decoder is reported as [`DecodeError::Malformed`].
    pub fn classify(&self, input: &[u8]) -> Result<Decision, DecodeError> {
        let span = info_span!("classify", input_bytes = input.len());
        let _guard = span.enter();

        let raster = match guarded_decode(|| normalize(input, &self.normalizer)) {
            Ok(raster) => raster,
            Err(e) => {
                info!(error = %e, "rejected input");
                return Err(e);
            }
        };
        Ok(self.decide(&raster))
    }

    /// Classify a raster that is already in canonical form.
    pub fn classify_raster(&self, raster: &RasterImage) -> Decision {
        let span = info_span!("classify_raster", width = raster.width(), height = raster.height());
        let _guard = span.enter();
        self.decide(raster)
    }

    fn decide(&self, raster: &RasterImage) -> Decision {
        debug!(width = raster.width(), height = raster.height(), "normalized");

        let faces = match guarded("face location", || {
            locate_faces(self.locator.as_ref(), raster, self.policy.min_face_confidence)
        }) {
            Ok(faces) => faces,
            Err(e) => return fallback(FallbackReason::InternalError, Some(&e)),
        };

        let Some(face) = faces.first() else {
            return fallback(FallbackReason::NoFace, None);
        };
        debug!(
            faces = faces.len(),
            x = face.x,
            y = face.y,
            width = face.width,
            height = face.height,
            detection_confidence = face.confidence,
            "selected face"
        );

        let estimate = match guarded("age estimation", || self.estimator.estimate(raster, face)) {
            Ok(estimate) => estimate,
            Err(e) => return fallback(FallbackReason::InternalError, Some(&e)),
        };
        debug!(years = estimate.years, confidence = estimate.confidence, "estimated");

        if !estimate.years.is_finite() {
            let fault = InferenceError::InvalidOutput(format!(
                "non-finite age estimate: {}",
                estimate.years
            ));
            return fallback(FallbackReason::InternalError, Some(&fault));
        }
        if !estimate.confidence.is_finite()
            || estimate.confidence < self.policy.min_estimate_confidence
        {
            return fallback(FallbackReason::LowConfidence, None);
        }

        let band = self.policy.bands.map(estimate.years);
        let decision = Decision::estimated(band, estimate.confidence);
        info!(band = %decision.band, confidence = decision.confidence, "decided");
        decision
    }
}

/// Run a backend stage, turning a panic into an [`InferenceError`].
fn guarded<T>(
    stage: &'static str,
    run: impl FnOnce() -> Result<T, InferenceError>,
) -> Result<T, InferenceError> {
    panic::catch_unwind(AssertUnwindSafe(run)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        error!(stage, panic = %message, "backend panicked");
        Err(InferenceError::Backend(format!("{stage} panicked: {message}")))
    })
}

/// Run the decoder, turning a panic into [`DecodeError::Malformed`].
fn guarded_decode(
    run: impl FnOnce() -> Result<RasterImage, DecodeError>,
) -> Result<RasterImage, DecodeError> {
    panic::catch_unwind(AssertUnwindSafe(run)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        error!(panic = %message, "decoder panicked");
        Err(DecodeError::Malformed(format!("decoder panicked: {message}")))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn fallback(reason: FallbackReason, cause: Option<&InferenceError>) -> Decision {
    match cause {
        Some(e) => warn!(error = %e, reason = reason.message(), "forcing restrictive band"),
        None => info!(reason = reason.message(), "forcing restrictive band"),
    }
    Decision::forced(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band::{AgeBand, BandCutoff, BandTable};
    use crate::estimator::AgeEstimate;
    use crate::face_locator::FaceRegion;
    use image::RgbImage;

    struct OneFace(f32);

    impl FaceLocator for OneFace {
        fn locate(&self, _raster: &RasterImage) -> Result<Vec<FaceRegion>, InferenceError> {
            Ok(vec![FaceRegion {
                x: 4,
                y: 4,
                width: 16,
                height: 16,
                confidence: self.0,
            }])
        }
    }

    struct Fixed(f32, f32);

    impl AgeEstimator for Fixed {
        fn estimate(
            &self,
            _raster: &RasterImage,
            _face: &FaceRegion,
        ) -> Result<AgeEstimate, InferenceError> {
            Ok(AgeEstimate {
                years: self.0,
                confidence: self.1,
            })
        }
    }

    fn raster() -> RasterImage {
        RasterImage::from_rgb(RgbImage::new(32, 32)).unwrap()
    }

    fn gate(face_confidence: f32, years: f32, confidence: f32) -> AgeGate {
        AgeGate::new(Box::new(OneFace(face_confidence)), Box::new(Fixed(years, confidence)))
    }

    #[test]
    fn confident_estimate_maps_to_band() {
        let decision = gate(0.9, 30.0, 0.85).classify_raster(&raster());
        assert_eq!(decision, Decision::estimated(AgeBand::Adult, 0.85));
    }

    #[test]
    fn weak_face_is_treated_as_no_face() {
        let decision = gate(0.2, 30.0, 0.85).classify_raster(&raster());
        assert_eq!(decision, Decision::forced(FallbackReason::NoFace));
    }

    #[test]
    fn confidence_exactly_at_threshold_is_accepted() {
        let decision = gate(0.9, 15.0, 0.6).classify_raster(&raster());
        assert_eq!(decision.band, AgeBand::Teen);
        assert!(!decision.forced_safety);
    }

    #[test]
    fn nan_confidence_is_low_confidence() {
        let decision = gate(0.9, 30.0, f32::NAN).classify_raster(&raster());
        assert_eq!(decision, Decision::forced(FallbackReason::LowConfidence));
    }

    #[test]
    fn non_finite_age_is_an_internal_error() {
        for years in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let decision = gate(0.9, years, 0.95).classify_raster(&raster());
            assert_eq!(decision, Decision::forced(FallbackReason::InternalError));
        }
    }

    #[test]
    fn custom_policy_is_applied() {
        let policy = Policy::new(
            0.1,
            0.95,
            BandTable::new(vec![BandCutoff::new(21.0, AgeBand::Adult)]).unwrap(),
        )
        .unwrap();
        let gate = gate(0.2, 30.0, 0.9).policy(policy);
        assert_eq!(
            gate.classify_raster(&raster()),
            Decision::forced(FallbackReason::LowConfidence)
        );
        assert_eq!(gate.active_policy().min_estimate_confidence(), 0.95);
    }

    #[test]
    fn panic_message_extracts_strings() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn guarded_converts_panic_to_backend_error() {
        let result: Result<(), InferenceError> = guarded("test", || panic!("kaboom"));
        assert!(matches!(result, Err(InferenceError::Backend(message)) if message.contains("kaboom")));
    }

    #[test]
    fn decoder_panic_is_malformed_input() {
        let result = guarded_decode(|| panic!("corrupt huffman table"));
        assert!(
            matches!(result, Err(DecodeError::Malformed(message)) if message.contains("huffman"))
        );
    }

    #[test]
    fn decoder_result_passes_through() {
        assert_eq!(guarded_decode(|| Err(DecodeError::Empty)), Err(DecodeError::Empty));
        assert!(guarded_decode(|| Ok(raster())).is_ok());
    }
}
