use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageError, ImageReader, Limits, RgbImage, RgbaImage};

use crate::config::NormalizerConfig;
use crate::error::DecodeError;

/// Canonical RGB8 raster handed to detection and estimation.
///
/// Width and height are always non-zero.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pixels: RgbImage,
}

impl RasterImage {
    /// Wrap an RGB buffer, rejecting zero-sized images.
    pub fn from_rgb(pixels: RgbImage) -> Result<Self, DecodeError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(DecodeError::ZeroDimensions);
        }
        Ok(Self { pixels })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// The underlying RGB buffer.
    pub fn as_rgb(&self) -> &RgbImage {
        &self.pixels
    }

    /// Luma conversion for detectors that work on grayscale.
    pub fn to_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.pixels)
    }
}

/// Decode untrusted bytes into a [`RasterImage`].
///
/// Decode → downscale to `max_dimension` → flatten alpha onto white.
pub fn normalize(input: &[u8], config: &NormalizerConfig) -> Result<RasterImage, DecodeError> {
    if input.is_empty() {
        return Err(DecodeError::Empty);
    }
    if input.len() > config.max_input_bytes {
        return Err(DecodeError::TooLarge(format!(
            "{} bytes exceeds the {} byte limit",
            input.len(),
            config.max_input_bytes
        )));
    }

    let decoded = decode_image(input, config)?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(DecodeError::ZeroDimensions);
    }

    let resized = downscale(decoded, config.max_dimension);
    RasterImage::from_rgb(flatten_alpha(&resized))
}

fn decode_image(input: &[u8], config: &NormalizerConfig) -> Result<DynamicImage, DecodeError> {
    let mut reader = ImageReader::new(Cursor::new(input))
        .with_guessed_format()
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    if reader.format().is_none() {
        return Err(DecodeError::UnsupportedFormat);
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(config.max_image_side);
    limits.max_image_height = Some(config.max_image_side);
    limits.max_alloc = Some(config.max_decode_alloc);
    reader.limits(limits);

    reader.decode().map_err(|e| match e {
        ImageError::Limits(limit) => DecodeError::TooLarge(limit.to_string()),
        ImageError::Unsupported(_) => DecodeError::UnsupportedFormat,
        other => DecodeError::Malformed(other.to_string()),
    })
}

/// Shrink so the longer side is at most `max_dimension`, keeping the aspect
/// ratio. Smaller images pass through untouched.
fn downscale(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    if image.width() <= max_dimension && image.height() <= max_dimension {
        return image;
    }
    image.resize(max_dimension, max_dimension, FilterType::Triangle)
}

/// Flatten alpha channel by compositing onto a white background.
fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba: RgbaImage = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let background = 255.0 * (1.0 - alpha);
        rgb.put_pixel(
            x,
            y,
            image::Rgb([
                (r as f32 * alpha + background).round() as u8,
                (g as f32 * alpha + background).round() as u8,
                (b as f32 * alpha + background).round() as u8,
            ]),
        );
    }
    rgb
}
