use std::fs::File;
use std::io::BufReader;

use tracing::debug;

use crate::config::RustfaceConfig;
use crate::error::{InferenceError, ModelLoadError};
use crate::face_locator::{FaceLocator, FaceRegion};
use crate::raster::RasterImage;

/// Face locator backed by the `rustface` crate (SeetaFace frontal cascade).
///
/// The model is read once on construction and shared read-only. Each call
/// builds its own detector from a clone of the model, so concurrent calls
/// never contend.
pub struct RustfaceLocator {
    model: rustface::Model,
    config: RustfaceConfig,
}

impl RustfaceLocator {
    /// Load the SeetaFace model from `config.model_path`.
    pub fn new(config: RustfaceConfig) -> Result<Self, ModelLoadError> {
        let path = config.model_path.display().to_string();
        let file = File::open(&config.model_path).map_err(|source| ModelLoadError::Io {
            path: path.clone(),
            source,
        })?;
        let model = rustface::read_model(BufReader::new(file)).map_err(|e| {
            ModelLoadError::Backend {
                path: path.clone(),
                message: e.to_string(),
            }
        })?;
        debug!(%path, "loaded SeetaFace model");
        Ok(Self { model, config })
    }

    /// Map a raw cascade score onto [0,1].
    fn confidence(&self, score: f64) -> f32 {
        (score / self.config.score_saturation).clamp(0.0, 1.0) as f32
    }
}

impl FaceLocator for RustfaceLocator {
    fn locate(&self, raster: &RasterImage) -> Result<Vec<FaceRegion>, InferenceError> {
        let gray = raster.to_gray();
        let (width, height) = (gray.width(), gray.height());

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.config.min_face_size);
        detector.set_score_thresh(self.config.score_thresh);
        detector.set_pyramid_scale_factor(self.config.pyramid_scale_factor);
        detector.set_slide_window_step(self.config.slide_window_step, self.config.slide_window_step);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));
        debug!(count = faces.len(), "cascade candidates");

        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                // The cascade may report boxes that start left of or above the image.
                let x = bbox.x().max(0);
                let y = bbox.y().max(0);
                let right = (bbox.x() + bbox.width() as i32).max(x);
                let bottom = (bbox.y() + bbox.height() as i32).max(y);
                FaceRegion {
                    x: x as u32,
                    y: y as u32,
                    width: (right - x) as u32,
                    height: (bottom - y) as u32,
                    confidence: self.confidence(face.score()),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_model_file_is_an_io_error() {
        let config = RustfaceConfig {
            model_path: PathBuf::from("does/not/exist.bin"),
            ..RustfaceConfig::default()
        };
        assert!(matches!(
            RustfaceLocator::new(config),
            Err(ModelLoadError::Io { .. })
        ));
    }
}
