// THEORY:
// `worm_masks` splits a whole-worm mask into an anterior and a posterior mask.
// It composes the morphology building blocks in a fixed order:
//
// 1.  **Outline**: external contour of the largest region (`contour`).
// 2.  **Endpoints**: the two sharpest turns of the outline (`endpoints`), with
//     the head picked by a coarse anterior mask supplied by the caller.
// 3.  **Midline**: averaged spline of the two outline sides (`spline`).
// 4.  **Cut**: a line across the body perpendicular to the midline at a fixed
//     fraction of its length from the head (`mask_ops::divide_mask`).
// 5.  **Selection**: relabel the cut mask and keep the piece under the head tip
//     as anterior and the piece under the tail tip as posterior.

use crate::core_modules::contour::border_path;
use crate::core_modules::endpoints::{DEFAULT_SPACE, endpoint_indices, orient_head};
use crate::core_modules::geometry::Point;
use crate::core_modules::labeling::label;
use crate::core_modules::mask_ops::{DEFAULT_NORMAL_MULTIPLIER, divide_mask, select_mask};
use crate::core_modules::spline::{DEFAULT_RESAMPLE_POINTS, midline, quantile_point};
use crate::error::Result;
use image::GrayImage;
use tracing::debug;

pub const DEFAULT_CUT_QUANTILE: f64 = 0.13;

/// Tunable constants of the anterior/posterior split.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphologyParams {
    /// Contour offset used when measuring turning angles.
    pub endpoint_space: usize,
    /// Samples per side when building the midline.
    pub resample_points: usize,
    /// Fraction of the midline, from the head, where the cut goes.
    pub cut_quantile: f64,
    /// Midline offset used for the cut direction.
    pub cut_space: usize,
    /// How far the cut extends, in multiples of the cut direction segment.
    pub normal_multiplier: f64,
}

impl Default for MorphologyParams {
    fn default() -> Self {
        Self {
            endpoint_space: DEFAULT_SPACE,
            resample_points: DEFAULT_RESAMPLE_POINTS,
            cut_quantile: DEFAULT_CUT_QUANTILE,
            cut_space: DEFAULT_SPACE,
            normal_multiplier: DEFAULT_NORMAL_MULTIPLIER,
        }
    }
}

/// Result of splitting a worm mask.
#[derive(Debug, Clone)]
pub struct WormMasks {
    pub anterior: GrayImage,
    pub posterior: GrayImage,
    pub border: Vec<Point>,
    pub midline: Vec<Point>,
    pub head: Point,
    pub tail: Point,
}

/// Splits `mask` at `quantile` of the midline using the default parameters.
pub fn worm_masks(mask: &GrayImage, anterior_mask: &GrayImage, quantile: f64) -> Result<WormMasks> {
    let params = MorphologyParams {
        cut_quantile: quantile,
        ..MorphologyParams::default()
    };
    worm_masks_with(mask, anterior_mask, &params)
}

pub fn worm_masks_with(
    mask: &GrayImage,
    anterior_mask: &GrayImage,
    params: &MorphologyParams,
) -> Result<WormMasks> {
    let border = border_path(mask)?;
    let (first, second) = endpoint_indices(&border, params.endpoint_space)?;
    let (head_idx, tail_idx) = orient_head(&border, first, second, anterior_mask);
    let spline = midline(&border, head_idx, tail_idx, params.resample_points)?;
    let mid_point_idx = quantile_point(&spline, params.cut_quantile);
    debug!(
        contour_points = border.len(),
        head_idx,
        tail_idx,
        mid_point_idx,
        "splitting worm mask"
    );

    let divided = divide_mask(
        mask,
        &spline,
        mid_point_idx,
        params.cut_space,
        params.normal_multiplier,
    )?;
    let labels = label(&divided);
    let head = border[head_idx];
    let tail = border[tail_idx];

    Ok(WormMasks {
        anterior: select_mask(&labels, head),
        posterior: select_mask(&labels, tail),
        border,
        midline: spline,
        head,
        tail,
    })
}
