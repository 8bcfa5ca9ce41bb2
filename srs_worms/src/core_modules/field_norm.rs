// THEORY:
// Field normalization corrects the uneven brightness of the SRS field of view
// (laser focus falloff, detector vignetting). Each experiment carries one
// calibration image of a uniform sample. Blurring it with a wide gaussian keeps
// only the illumination profile; the multiplier at each pixel is then
// `max(profile) / profile(pixel)`, which lifts every pixel to the level of the
// brightest part of the field.
//
// Applying the multiplier is a per-pixel product followed by a cast back to
// the 16-bit sample type. Values above `u16::MAX` saturate and fractions are
// truncated, the same result a float-to-int cast gives for in-range values.

use crate::core_modules::stack::{Plane, Stack};
use crate::error::{Error, Result};
use image::{ImageBuffer, Luma};
use tracing::debug;

pub const DEFAULT_RADIUS: f32 = 50.0;

pub type Gray32FImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Per-pixel gain map derived from a calibration plane.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNormalizer {
    pub width: u32,
    pub height: u32,
    pub multiplier: Vec<f32>,
}

impl FieldNormalizer {
    /// Builds the gain map from a (possibly multi-page) calibration stack.
    pub fn from_calibration(calibration: &Stack, radius: f32) -> Result<Self> {
        let (width, height) = calibration.dimensions();
        let profile = ImageBuffer::from_raw(width, height, calibration.mean_plane()).ok_or(
            Error::DimensionMismatch {
                expected: (width, height),
                found: (calibration.pixels_per_plane() as u32, 1),
            },
        )?;
        let multiplier = fnorm_multiplier(&profile, radius);
        debug!(width, height, radius, "built field normalization multiplier");
        Ok(Self {
            width,
            height,
            multiplier: multiplier.into_raw(),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn normalize_plane(&self, plane: &[u16]) -> Plane {
        normalize_plane(plane, &self.multiplier)
    }

    pub fn normalize_stack(&self, stack: &Stack) -> Result<Stack> {
        if stack.dimensions() != self.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions(),
                found: stack.dimensions(),
            });
        }
        Ok(Stack {
            width: stack.width,
            height: stack.height,
            planes: stack.planes.iter().map(|p| self.normalize_plane(p)).collect(),
        })
    }
}

/// `max(blur) / blur` for a gaussian blur of standard deviation `radius`.
/// Pixels whose blurred value is zero get a multiplier of zero.
pub fn fnorm_multiplier(calibration: &Gray32FImage, radius: f32) -> Gray32FImage {
    let blurred = if radius > 0.0 {
        image::imageops::blur(calibration, radius)
    } else {
        calibration.clone()
    };
    let max = blurred.pixels().map(|p| p.0[0]).fold(0f32, f32::max);

    let mut out = Gray32FImage::new(blurred.width(), blurred.height());
    for (dst, src) in out.pixels_mut().zip(blurred.pixels()) {
        let v = src.0[0];
        dst.0[0] = if v > 0.0 { max / v } else { 0.0 };
    }
    out
}

pub fn normalize_plane(plane: &[u16], multiplier: &[f32]) -> Plane {
    plane
        .iter()
        .zip(multiplier)
        .map(|(&v, &m)| saturate_u16(v as f64 * m as f64))
        .collect()
}

/// Truncating float to `u16` cast that clamps out-of-range values.
pub fn saturate_u16(value: f64) -> u16 {
    if value.is_nan() || value <= 0.0 {
        0
    } else if value >= u16::MAX as f64 {
        u16::MAX
    } else {
        value as u16
    }
}
