// THEORY:
// A worm outline is a long closed loop with two sharp turns, the head and the
// tail. At every contour point we look `space` points back and `space` points
// forward (wrapping around the loop) and measure the angle between the two
// vectors. Along the flanks the vectors point in opposite directions (angle
// near pi); at a tip both point back into the body (angle near zero). The
// smallest angle is the first endpoint.
//
// The second endpoint is the smallest angle in the half of the loop facing the
// first one: a quarter of the loop on either side of the first endpoint is
// excluded. Which of the two is the head is decided by an anterior mask.

use crate::core_modules::geometry::Point;
use crate::error::{Error, Result};
use image::GrayImage;
use std::f64::consts::PI;

pub const DEFAULT_SPACE: usize = 50;

/// Angle at every point between the vectors to the points `space` steps back and forward.
/// Degenerate vectors (coincident points) get an angle of pi so they never win.
pub fn turning_angles(path: &[Point], space: usize) -> Result<Vec<f64>> {
    let n = path.len();
    if space == 0 || n < 2 * space + 1 {
        return Err(Error::PathTooShort {
            len: n,
            needed: 2 * space.max(1) + 1,
        });
    }

    Ok((0..n)
        .map(|i| {
            let here = path[i];
            let forward = path[(i + n - space) % n].sub(here);
            let backward = path[(i + space) % n].sub(here);
            let norms = forward.norm() * backward.norm();
            if norms == 0.0 {
                return PI;
            }
            (forward.dot(backward) / norms).clamp(-1.0, 1.0).acos()
        })
        .collect())
}

fn argmin(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b <= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Index of the sharpest point of the contour.
pub fn endpoint_index(path: &[Point], space: usize) -> Result<usize> {
    let angles = turning_angles(path, space)?;
    argmin(&angles).ok_or(Error::EmptyMask)
}

/// Indices of both endpoints.
pub fn endpoint_indices(path: &[Point], space: usize) -> Result<(usize, usize)> {
    let angles = turning_angles(path, space)?;
    let first = argmin(&angles).ok_or(Error::EmptyMask)?;
    let second = second_endpoint_index(path, &angles, first)?;
    Ok((first, second))
}

/// Sharpest point of the half loop opposite `idx`.
pub fn second_endpoint_index(path: &[Point], angles: &[f64], idx: usize) -> Result<usize> {
    let n = path.len();
    let skip = n / 4;
    if skip == 0 || n < 2 * skip + 1 || angles.len() != n {
        return Err(Error::PathTooShort { len: n, needed: 4 });
    }
    // Rotate so `idx` sits at position 0, then search the middle half.
    let rotated: Vec<f64> = (0..n).map(|k| angles[(idx + k) % n]).collect();
    let offset = argmin(&rotated[skip..n - skip]).ok_or(Error::PathTooShort { len: n, needed: 4 })?;
    let coordinate = path[(idx + offset + skip) % n];
    // First occurrence of that coordinate, so repeated contour points map consistently.
    Ok(path.iter().position(|p| *p == coordinate).unwrap_or((idx + offset + skip) % n))
}

/// Returns `(head, tail)`: `idx` is the head when the anterior mask covers it.
pub fn orient_head(
    path: &[Point],
    idx: usize,
    second_idx: usize,
    anterior: &GrayImage,
) -> (usize, usize) {
    let (width, height) = anterior.dimensions();
    let on_anterior = path
        .get(idx)
        .and_then(|p| p.to_pixel(width, height))
        .is_some_and(|(x, y)| anterior.get_pixel(x, y).0[0] != 0);
    if on_anterior {
        (idx, second_idx)
    } else {
        (second_idx, idx)
    }
}
