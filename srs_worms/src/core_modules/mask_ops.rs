// THEORY:
// Two mask edits split a worm into anterior and posterior parts. `divide_mask`
// burns a background line across the body, perpendicular to the midline at a
// chosen point; `select_mask` then keeps whichever labeled piece contains a
// given anchor pixel.
//
// The cut is drawn with a plus-shaped brush (3 pixels wide) so that no pair of
// foreground pixels on opposite sides remains 8-connected through a diagonal
// gap in the line.

use crate::core_modules::geometry::Point;
use crate::core_modules::labeling::LabelMap;
use crate::error::{Error, Result};
use image::{GrayImage, Luma};

pub const DEFAULT_NORMAL_MULTIPLIER: f64 = 6.0;

const BRUSH: [(i64, i64); 5] = [(0, 0), (1, 0), (-1, 0), (0, 1), (0, -1)];

fn stamp(image: &mut GrayImage, x: i64, y: i64, value: u8) {
    for (dx, dy) in BRUSH {
        let (px, py) = (x + dx, y + dy);
        if px >= 0 && py >= 0 && px < image.width() as i64 && py < image.height() as i64 {
            image.put_pixel(px as u32, py as u32, Luma([value]));
        }
    }
}

/// Bresenham line from `from` to `to`, painted with the plus brush.
pub fn draw_line(image: &mut GrayImage, from: (i64, i64), to: (i64, i64), value: u8) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        stamp(image, x, y, value);
        if (x, y) == to {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Copy of `mask` with a background line drawn along the normal of the path at `mid_point_idx`.
///
/// The normal is the path segment `mid_point_idx -> mid_point_idx + space` rotated by 90
/// degrees, extended `multiplier` times its length to each side of the point.
pub fn divide_mask(
    mask: &GrayImage,
    path: &[Point],
    mid_point_idx: usize,
    space: usize,
    multiplier: f64,
) -> Result<GrayImage> {
    let far = mid_point_idx + space;
    if far >= path.len() {
        return Err(Error::PathTooShort {
            len: path.len(),
            needed: far + 1,
        });
    }
    let Point { x: x1, y: y1 } = path[mid_point_idx];
    let Point { x: x2, y: y2 } = path[far];
    let normal = Point::new(y2 - y1, x1 - x2);

    let start = (
        (x1 + multiplier * normal.x) as i64,
        (y1 + multiplier * normal.y) as i64,
    );
    let end = (
        (x1 - multiplier * normal.x) as i64,
        (y1 - multiplier * normal.y) as i64,
    );

    let mut divided = mask.clone();
    draw_line(&mut divided, start, end, 0);
    Ok(divided)
}

/// Binary mask of the labeled region under `anchor`; empty when the anchor is background.
pub fn select_mask(labels: &LabelMap, anchor: Point) -> GrayImage {
    let region = anchor
        .to_pixel(labels.width, labels.height)
        .map_or(0, |(x, y)| labels.get(x, y));
    labels.region_mask(region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::labeling::label;

    fn bar(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([255]))
    }

    #[test]
    fn vertical_cut_splits_horizontal_bar() {
        let mask = bar(40, 9);
        let path: Vec<Point> = (0..40).map(|x| Point::new(x as f64, 4.0)).collect();
        let divided = divide_mask(&mask, &path, 20, 2, 6.0).unwrap();

        // normal of (2, 0) is (0, -2); six times that spans the whole bar height
        for y in 0..9 {
            assert_eq!(divided.get_pixel(20, y).0[0], 0);
        }
        assert_eq!(label(&divided).count, 2);
        assert_eq!(mask.get_pixel(20, 4).0[0], 255, "input untouched");
    }

    #[test]
    fn diagonal_cut_leaves_no_8_connected_leak() {
        let mask = bar(30, 30);
        let path: Vec<Point> = (0..30).map(|i| Point::new(i as f64, i as f64)).collect();
        let divided = divide_mask(&mask, &path, 15, 1, 20.0).unwrap();
        assert_eq!(label(&divided).count, 2);
    }

    #[test]
    fn cut_past_path_end_is_rejected() {
        let path = vec![Point::new(0.0, 0.0); 3];
        assert!(divide_mask(&bar(4, 4), &path, 2, 1, 6.0).is_err());
    }

    #[test]
    fn select_keeps_anchor_region() {
        let mut mask = bar(10, 3);
        draw_line(&mut mask, (5, -1), (5, 4), 0);
        let labels = label(&mask);
        let left = select_mask(&labels, Point::new(1.0, 1.0));
        assert_eq!(left.get_pixel(1, 1).0[0], 255);
        assert_eq!(left.get_pixel(8, 1).0[0], 0);

        let none = select_mask(&labels, Point::new(5.0, 1.0));
        assert!(none.pixels().all(|p| p.0[0] == 0));
    }
}
