//! Configuration for the classification pipeline and its bundled backends.
//!
//! Every field has a default, so an empty file (or no file) yields a working
//! configuration. Values are read from an optional TOML file and then from
//! `AGEGATE__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::band::{BandCutoff, BandTable, DEFAULT_CUTOFFS};
use crate::error::ConfigError;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/agegate.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgeGateConfig {
    /// Input decoding limits.
    pub normalizer: NormalizerConfig,
    /// Decision thresholds and band table.
    pub policy: PolicyConfig,
    /// SeetaFace locator settings.
    pub rustface: RustfaceConfig,
    /// ONNX age estimator settings.
    pub onnx: OnnxConfig,
}

/// Limits applied while decoding untrusted input.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Largest accepted encoded payload, in bytes.
    pub max_input_bytes: usize,
    /// Largest accepted width or height of the encoded image.
    pub max_image_side: u32,
    /// Allocation ceiling for the decoder, in bytes.
    pub max_decode_alloc: u64,
    /// Longer side of the working raster; larger images are downscaled.
    pub max_dimension: u32,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: 20 * 1024 * 1024,
            max_image_side: 16_384,
            max_decode_alloc: 512 * 1024 * 1024,
            max_dimension: 1024,
        }
    }
}

/// Fail-safe policy thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Face regions below this detection confidence are ignored.
    pub min_face_confidence: f32,
    /// Estimates below this confidence force the restrictive band.
    pub min_estimate_confidence: f32,
    /// Age cutoffs, ascending.
    pub bands: Vec<BandCutoff>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_face_confidence: 0.5,
            min_estimate_confidence: 0.6,
            bands: DEFAULT_CUTOFFS.to_vec(),
        }
    }
}

/// Validated policy used by the arbiter.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub(crate) min_face_confidence: f32,
    pub(crate) min_estimate_confidence: f32,
    pub(crate) bands: BandTable,
}

impl Policy {
    /// Build a policy from explicit thresholds and a band table.
    pub fn new(
        min_face_confidence: f32,
        min_estimate_confidence: f32,
        bands: BandTable,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            min_face_confidence: unit_interval("min_face_confidence", min_face_confidence)?,
            min_estimate_confidence: unit_interval(
                "min_estimate_confidence",
                min_estimate_confidence,
            )?,
            bands,
        })
    }

    /// The band table.
    pub fn bands(&self) -> &BandTable {
        &self.bands
    }

    /// Minimum detection confidence for a face to be considered.
    pub fn min_face_confidence(&self) -> f32 {
        self.min_face_confidence
    }

    /// Minimum estimator confidence for a non-forced decision.
    pub fn min_estimate_confidence(&self) -> f32 {
        self.min_estimate_confidence
    }
}

impl Default for Policy {
    fn default() -> Self {
        let config = PolicyConfig::default();
        Self {
            min_face_confidence: config.min_face_confidence,
            min_estimate_confidence: config.min_estimate_confidence,
            bands: BandTable::default(),
        }
    }
}

impl TryFrom<&PolicyConfig> for Policy {
    type Error = ConfigError;

    fn try_from(config: &PolicyConfig) -> Result<Self, Self::Error> {
        Policy::new(
            config.min_face_confidence,
            config.min_estimate_confidence,
            BandTable::new(config.bands.clone())?,
        )
    }
}

fn unit_interval(name: &'static str, value: f32) -> Result<f32, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidThreshold { name, value })
    }
}

/// Settings for the SeetaFace frontal face locator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RustfaceConfig {
    /// Path to `seeta_fd_frontal_v1.0.bin`.
    pub model_path: PathBuf,
    /// Smallest face side searched for, in pixels.
    pub min_face_size: u32,
    /// Raw cascade score below which candidates are discarded.
    pub score_thresh: f64,
    /// Image pyramid scale step.
    pub pyramid_scale_factor: f32,
    /// Sliding window stride in pixels.
    pub slide_window_step: u32,
    /// Raw score that maps to detection confidence 1.0.
    pub score_saturation: f64,
}

impl Default for RustfaceConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/seeta_fd_frontal_v1.0.bin"),
            min_face_size: 20,
            score_thresh: 2.0,
            pyramid_scale_factor: 0.8,
            slide_window_step: 4,
            score_saturation: 20.0,
        }
    }
}

/// Settings for the ONNX age estimator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OnnxConfig {
    /// Path to the ONNX model.
    pub model_path: PathBuf,
    /// Square input side expected by the model.
    pub input_size: u32,
    /// Per-channel mean, applied after scaling pixels to [0,1].
    pub mean: [f32; 3],
    /// Per-channel standard deviation.
    pub std: [f32; 3],
    /// Representative age of each output bin, in model output order.
    pub bin_ages: Vec<f32>,
    /// Whether the model emits logits that still need a softmax.
    pub outputs_logits: bool,
    /// Crop side as a multiple of the detected face side.
    pub face_margin: f32,
}

impl Default for OnnxConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/age.onnx"),
            input_size: 224,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            // Midpoints of the 0-2, 4-6, 8-12, 15-20, 25-32, 38-43, 48-53, 60+ buckets.
            bin_ages: vec![1.0, 5.0, 10.0, 17.5, 28.5, 40.5, 50.5, 80.0],
            outputs_logits: true,
            face_margin: 1.4,
        }
    }
}

impl AgeGateConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load from `path` (if present) and the environment.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("AGEGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let parsed: Self = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        let parsed: Self = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Check every setting that would otherwise fail per call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Policy::try_from(&self.policy)?;

        if self.normalizer.max_dimension == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "normalizer.max_dimension",
                message: "must be > 0".to_string(),
            });
        }
        if !self.rustface.score_saturation.is_finite() || self.rustface.score_saturation <= 0.0 {
            return Err(ConfigError::InvalidSetting {
                name: "rustface.score_saturation",
                message: "must be finite and > 0".to_string(),
            });
        }
        if self.onnx.input_size == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "onnx.input_size",
                message: "must be > 0".to_string(),
            });
        }
        if self.onnx.bin_ages.is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "onnx.bin_ages",
                message: "at least one bin is required".to_string(),
            });
        }
        if self.onnx.bin_ages.iter().any(|age| !age.is_finite()) {
            return Err(ConfigError::InvalidSetting {
                name: "onnx.bin_ages",
                message: "every bin age must be finite".to_string(),
            });
        }
        if self.onnx.mean.iter().any(|m| !m.is_finite()) {
            return Err(ConfigError::InvalidSetting {
                name: "onnx.mean",
                message: "every channel must be finite".to_string(),
            });
        }
        if self.onnx.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(ConfigError::InvalidSetting {
                name: "onnx.std",
                message: "every channel must be finite and > 0".to_string(),
            });
        }
        if !self.onnx.face_margin.is_finite() || self.onnx.face_margin < 1.0 {
            return Err(ConfigError::InvalidSetting {
                name: "onnx.face_margin",
                message: "must be finite and >= 1.0".to_string(),
            });
        }
        Ok(())
    }

    /// The validated policy.
    pub fn policy(&self) -> Result<Policy, ConfigError> {
        Policy::try_from(&self.policy)
    }
}
