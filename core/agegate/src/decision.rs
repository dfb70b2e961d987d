use serde::Serialize;

use crate::band::AgeBand;

/// Why a decision fell back to the restrictive band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The locator found no face above the confidence threshold.
    NoFace,
    /// Location or estimation failed.
    InternalError,
    /// The estimator was not confident enough.
    LowConfidence,
}

impl FallbackReason {
    /// Message carried in the decision.
    pub fn message(self) -> &'static str {
        match self {
            FallbackReason::NoFace => "no face detected",
            FallbackReason::InternalError => "internal processing error",
            FallbackReason::LowConfidence => "low confidence",
        }
    }
}

/// Result of one classification.
///
/// Serializes as `{"age_group", "confidence", "forced_safety", "msg"}`, with
/// `msg` omitted when there is no reason to report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    /// The chosen band.
    #[serde(rename = "age_group")]
    pub band: AgeBand,
    /// Estimator confidence in [0,1]; always 0.0 for forced decisions.
    pub confidence: f32,
    /// Whether the band was chosen by fallback rather than by an estimate.
    pub forced_safety: bool,
    /// Why the decision was forced.
    #[serde(rename = "msg", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Decision {
    /// Fail-safe decision: most restrictive band, zero confidence.
    pub fn forced(reason: FallbackReason) -> Self {
        Self {
            band: AgeBand::MOST_RESTRICTIVE,
            confidence: 0.0,
            forced_safety: true,
            reason: Some(reason.message().to_string()),
        }
    }

    /// Decision backed by a confident estimate.
    pub fn estimated(band: AgeBand, confidence: f32) -> Self {
        Self {
            band,
            confidence: confidence.clamp(0.0, 1.0),
            forced_safety: false,
            reason: None,
        }
    }

    /// `true` when the decision allows anything beyond the restrictive band.
    pub fn is_permissive(&self) -> bool {
        self.band > AgeBand::MOST_RESTRICTIVE
    }
}
