use std::cmp::Ordering;

use crate::error::InferenceError;
use crate::raster::RasterImage;

/// Bounding box of a detected face within a raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRegion {
    /// X coordinate of the top-left corner (pixels).
    pub x: u32,
    /// Y coordinate of the top-left corner (pixels).
    pub y: u32,
    /// Width of the bounding box (pixels).
    pub width: u32,
    /// Height of the bounding box (pixels).
    pub height: u32,
    /// Detection confidence in [0,1].
    pub confidence: f32,
}

impl FaceRegion {
    /// Area in pixels.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Intersect with a `width` × `height` raster. `None` when nothing remains.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<FaceRegion> {
        let x0 = self.x.min(width);
        let y0 = self.y.min(height);
        let x1 = self.x.saturating_add(self.width).min(width);
        let y1 = self.y.saturating_add(self.height).min(height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(FaceRegion {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
            confidence: self.confidence,
        })
    }
}

/// Pluggable face detection backend.
///
/// Implementations only report what they see; thresholding, clipping and
/// ordering happen in [`locate_faces`]. An empty result is a normal outcome.
pub trait FaceLocator: Send + Sync {
    /// Find candidate face regions in the raster.
    fn locate(&self, raster: &RasterImage) -> Result<Vec<FaceRegion>, InferenceError>;
}

/// Run a locator and return usable regions, best candidate first.
///
/// Regions under `min_confidence`, with non-finite confidence, or with no
/// area inside the raster are dropped. The rest are sorted by descending
/// confidence, then descending area, then top-to-bottom and left-to-right,
/// so the first element is a deterministic choice among several faces.
pub fn locate_faces(
    locator: &dyn FaceLocator,
    raster: &RasterImage,
    min_confidence: f32,
) -> Result<Vec<FaceRegion>, InferenceError> {
    let mut regions: Vec<FaceRegion> = locator
        .locate(raster)?
        .into_iter()
        .filter(|region| region.confidence.is_finite() && region.confidence >= min_confidence)
        .filter_map(|region| region.clip_to(raster.width(), raster.height()))
        .map(|region| FaceRegion {
            confidence: region.confidence.min(1.0),
            ..region
        })
        .collect();

    regions.sort_by(rank);
    Ok(regions)
}

fn rank(a: &FaceRegion, b: &FaceRegion) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.area().cmp(&a.area()))
        .then_with(|| a.y.cmp(&b.y))
        .then_with(|| a.x.cmp(&b.x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct FixedLocator(Vec<FaceRegion>);

    impl FaceLocator for FixedLocator {
        fn locate(&self, _raster: &RasterImage) -> Result<Vec<FaceRegion>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    fn region(x: u32, y: u32, side: u32, confidence: f32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width: side,
            height: side,
            confidence,
        }
    }

    fn raster() -> RasterImage {
        RasterImage::from_rgb(RgbImage::new(200, 100)).unwrap()
    }

    #[test]
    fn empty_detection_is_not_an_error() {
        let faces = locate_faces(&FixedLocator(vec![]), &raster(), 0.5).unwrap();
        assert!(faces.is_empty());
    }

    #[test]
    fn drops_low_confidence_regions() {
        let locator = FixedLocator(vec![region(0, 0, 10, 0.3), region(20, 0, 10, 0.9)]);
        let faces = locate_faces(&locator, &raster(), 0.5).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].x, 20);
    }

    #[test]
    fn drops_nan_confidence() {
        let locator = FixedLocator(vec![region(0, 0, 10, f32::NAN)]);
        assert!(locate_faces(&locator, &raster(), 0.0).unwrap().is_empty());
    }

    #[test]
    fn orders_by_confidence_then_area() {
        let locator = FixedLocator(vec![
            region(0, 0, 10, 0.7),
            region(50, 0, 30, 0.9),
            region(100, 0, 40, 0.7),
        ]);
        let faces = locate_faces(&locator, &raster(), 0.5).unwrap();
        let xs: Vec<u32> = faces.iter().map(|f| f.x).collect();
        assert_eq!(xs, vec![50, 100, 0]);
    }

    #[test]
    fn full_ties_break_by_position() {
        let locator = FixedLocator(vec![
            region(60, 10, 20, 0.8),
            region(10, 10, 20, 0.8),
            region(30, 0, 20, 0.8),
        ]);
        let faces = locate_faces(&locator, &raster(), 0.5).unwrap();
        let positions: Vec<(u32, u32)> = faces.iter().map(|f| (f.x, f.y)).collect();
        assert_eq!(positions, vec![(30, 0), (10, 10), (60, 10)]);
    }

    #[test]
    fn clips_regions_to_raster() {
        let locator = FixedLocator(vec![region(180, 90, 50, 0.9)]);
        let faces = locate_faces(&locator, &raster(), 0.5).unwrap();
        assert_eq!(faces[0].width, 20);
        assert_eq!(faces[0].height, 10);
    }

    #[test]
    fn drops_regions_outside_raster() {
        let locator = FixedLocator(vec![region(500, 500, 50, 0.9), region(0, 0, 0, 0.9)]);
        assert!(locate_faces(&locator, &raster(), 0.5).unwrap().is_empty());
    }

    #[test]
    fn propagates_backend_fault() {
        struct Broken;
        impl FaceLocator for Broken {
            fn locate(&self, _raster: &RasterImage) -> Result<Vec<FaceRegion>, InferenceError> {
                Err(InferenceError::Backend("detector unavailable".to_string()))
            }
        }
        assert!(locate_faces(&Broken, &raster(), 0.5).is_err());
    }
}
