use image::imageops::{self, FilterType};
use image::RgbImage;
use parking_lot::Mutex;

use crate::crop::face_crop_region;
use crate::error::InferenceError;
use crate::face_locator::FaceRegion;
use crate::raster::RasterImage;

/// Apparent age of one face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgeEstimate {
    /// Estimated age in years.
    pub years: f32,
    /// Estimator confidence in [0,1].
    pub confidence: f32,
}

/// Pluggable age estimation backend.
///
/// Implementations receive the full raster and the selected face so they can
/// crop with whatever context their model expects (see [`crop_face`]).
pub trait AgeEstimator: Send + Sync {
    /// Estimate the apparent age of the person in `face`.
    fn estimate(&self, raster: &RasterImage, face: &FaceRegion)
        -> Result<AgeEstimate, InferenceError>;
}

/// Cut the face out of the raster with `margin` context and resize it to a
/// `size` × `size` square.
pub fn crop_face(
    raster: &RasterImage,
    face: &FaceRegion,
    margin: f32,
    size: u32,
) -> Result<RgbImage, InferenceError> {
    if size == 0 {
        return Err(InferenceError::EmptyCrop);
    }
    let region = face_crop_region(face, raster.width(), raster.height(), margin)
        .ok_or(InferenceError::EmptyCrop)?;

    let cropped =
        imageops::crop_imm(raster.as_rgb(), region.x, region.y, region.width, region.height)
            .to_image();
    if cropped.width() == 0 || cropped.height() == 0 {
        return Err(InferenceError::EmptyCrop);
    }
    if cropped.width() == size && cropped.height() == size {
        return Ok(cropped);
    }
    Ok(imageops::resize(&cropped, size, size, FilterType::Triangle))
}

/// Estimator whose runtime needs exclusive access while it runs.
///
/// Wrap it in a [`SerializedEstimator`] to share it between workers.
pub trait ExclusiveAgeEstimator: Send {
    /// Estimate the apparent age of the person in `face`.
    fn estimate_exclusive(
        &mut self,
        raster: &RasterImage,
        face: &FaceRegion,
    ) -> Result<AgeEstimate, InferenceError>;
}

/// Serializes calls into an estimator whose runtime is not reentrant.
///
/// Only the inference call is under the lock; decoding and face location for
/// other requests keep running in parallel.
pub struct SerializedEstimator<E> {
    inner: Mutex<E>,
}

impl<E> SerializedEstimator<E> {
    /// Wrap `inner`.
    pub fn new(inner: E) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Unwrap, releasing the backend.
    pub fn into_inner(self) -> E {
        self.inner.into_inner()
    }
}

impl<E: ExclusiveAgeEstimator> AgeEstimator for SerializedEstimator<E> {
    fn estimate(
        &self,
        raster: &RasterImage,
        face: &FaceRegion,
    ) -> Result<AgeEstimate, InferenceError> {
        self.inner.lock().estimate_exclusive(raster, face)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(width: u32, height: u32) -> RasterImage {
        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([x as u8, y as u8, 7]);
        }
        RasterImage::from_rgb(img).unwrap()
    }

    fn face(x: u32, y: u32, side: u32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width: side,
            height: side,
            confidence: 0.9,
        }
    }

    #[test]
    fn crop_face_resizes_to_model_input() {
        let crop = crop_face(&raster(120, 80), &face(40, 20, 30), 1.4, 64).unwrap();
        assert_eq!((crop.width(), crop.height()), (64, 64));
    }

    #[test]
    fn crop_face_without_resize_keeps_pixels() {
        // 10px face at (20, 30), margin 1.0, size 10 → exact cut of the face.
        let crop = crop_face(&raster(64, 64), &face(20, 30, 10), 1.0, 10).unwrap();
        assert_eq!(crop.get_pixel(0, 0), &image::Rgb([20, 30, 7]));
        assert_eq!(crop.get_pixel(9, 9), &image::Rgb([29, 39, 7]));
    }

    #[test]
    fn degenerate_face_is_an_empty_crop() {
        let result = crop_face(&raster(50, 50), &face(10, 10, 0), 1.4, 32);
        assert_eq!(result, Err(InferenceError::EmptyCrop));
    }

    #[test]
    fn zero_input_size_is_an_empty_crop() {
        let result = crop_face(&raster(50, 50), &face(10, 10, 10), 1.4, 0);
        assert_eq!(result, Err(InferenceError::EmptyCrop));
    }

    struct CountingEstimator(usize);

    impl ExclusiveAgeEstimator for CountingEstimator {
        fn estimate_exclusive(
            &mut self,
            _raster: &RasterImage,
            _face: &FaceRegion,
        ) -> Result<AgeEstimate, InferenceError> {
            self.0 += 1;
            Ok(AgeEstimate {
                years: 30.0,
                confidence: 0.9,
            })
        }
    }

    #[test]
    fn serialized_estimator_delegates() {
        let estimator = SerializedEstimator::new(CountingEstimator(0));
        let raster = raster(40, 40);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let estimate = estimator.estimate(&raster, &face(5, 5, 20)).unwrap();
                    assert_eq!(estimate.years, 30.0);
                });
            }
        });
        assert_eq!(estimator.into_inner().0, 4);
    }
}
