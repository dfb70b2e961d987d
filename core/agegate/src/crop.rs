use crate::face_locator::FaceRegion;

/// Crop region within the source raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    /// Left edge (pixels).
    pub x: u32,
    /// Top edge (pixels).
    pub y: u32,
    /// Width (pixels).
    pub width: u32,
    /// Height (pixels).
    pub height: u32,
}

/// Square crop around a face, `margin` times the face's longer side.
///
/// The square is centered on the face, then shifted (not shrunk) to stay
/// inside the image; it is only shrunk when the image itself is too small.
/// Returns `None` when the face or the image is empty.
pub fn face_crop_region(
    face: &FaceRegion,
    image_width: u32,
    image_height: u32,
    margin: f32,
) -> Option<CropRegion> {
    if face.width == 0 || face.height == 0 || image_width == 0 || image_height == 0 {
        return None;
    }

    let face_side = face.width.max(face.height) as f64;
    let desired = (face_side * margin.max(1.0) as f64).round() as u32;
    let side = desired.min(image_width).min(image_height).max(1);

    let center_x = face.x as f64 + face.width as f64 / 2.0;
    let center_y = face.y as f64 + face.height as f64 / 2.0;

    let x = (center_x - side as f64 / 2.0)
        .round()
        .max(0.0)
        .min(image_width.saturating_sub(side) as f64) as u32;
    let y = (center_y - side as f64 / 2.0)
        .round()
        .max(0.0)
        .min(image_height.saturating_sub(side) as f64) as u32;

    Some(CropRegion {
        x,
        y,
        width: side,
        height: side,
    })
}
