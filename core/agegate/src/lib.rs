//! Fail-safe apparent-age classification.
//!
//! Decodes an image, locates the most prominent face, estimates its apparent
//! age and maps it to a coarse [`AgeBand`]. Whenever evidence is missing or
//! weak, or a backend fails, the result is forced to the most restrictive
//! band ([`AgeBand::Kid`]) with zero confidence.
//!
//! The only error a caller sees is [`DecodeError`], for input that is not a
//! usable image. Everything else is a [`Decision`].
//!
//! # Models
//!
//! Model files are not shipped with the crate. The bundled backends read them
//! from the paths in `config/agegate.toml`, relative to the repository root:
//!
//! - `models/seeta_fd_frontal_v1.0.bin`, the SeetaFace frontal cascade from
//!   the `rustface` repository (feature `rustface`)
//! - `models/age.onnx`, an age-bin classifier (feature `onnx`)
//!
//! With the SeetaFace model in place, the detector-backed tests run with
//! `cargo test -p agegate -- --ignored`.
//!
//! # Example
//!
//! ```no_run
//! use agegate::{AgeGate, AgeGateConfig};
//!
//! # #[cfg(all(feature = "rustface", feature = "onnx"))]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AgeGateConfig::load()?;
//! let gate = AgeGate::from_config(&config)?;
//!
//! let bytes = std::fs::read("portrait.jpg")?;
//! match gate.classify(&bytes) {
//!     Ok(decision) => println!("{} ({:.2})", decision.band, decision.confidence),
//!     Err(e) => eprintln!("bad input: {e}"),
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(all(feature = "rustface", feature = "onnx")))]
//! # fn main() {}
//! ```
#![warn(missing_docs)]

mod arbiter;
mod band;
/// Pipeline and backend configuration.
pub mod config;
mod crop;
mod decision;
mod error;
/// Age estimation traits and face-crop helpers.
pub mod estimator;
/// Face location traits and data types.
pub mod face_locator;
#[cfg(feature = "onnx")]
/// Bundled ONNX age estimator running on tract.
pub mod onnx_backend;
mod raster;
#[cfg(feature = "rustface")]
/// Bundled SeetaFace-based face locator backend.
pub mod rustface_backend;

/// The classification service.
pub use arbiter::AgeGate;
/// Age bands and the age-to-band table.
pub use band::{AgeBand, BandCutoff, BandTable};
/// Configuration entry points.
pub use config::{AgeGateConfig, NormalizerConfig, Policy};
/// Crop geometry around a detected face.
pub use crop::{face_crop_region, CropRegion};
/// Classification results.
pub use decision::{Decision, FallbackReason};
/// Error types.
pub use error::{ConfigError, DecodeError, InferenceError, InitError, ModelLoadError};
/// Age estimation trait and estimate type.
pub use estimator::{AgeEstimate, AgeEstimator, ExclusiveAgeEstimator, SerializedEstimator};
/// Face location trait and region type.
pub use face_locator::{FaceLocator, FaceRegion};
#[cfg(feature = "onnx")]
/// Bundled ONNX age estimator.
pub use onnx_backend::OnnxAgeEstimator;
/// Image normalization.
pub use raster::{normalize, RasterImage};
#[cfg(feature = "rustface")]
/// Bundled SeetaFace face locator.
pub use rustface_backend::RustfaceLocator;
