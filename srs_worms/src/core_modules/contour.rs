// THEORY:
// The worm outline is the external boundary of the mask's largest region.
//
// Each 8-connected region is traced with Moore-neighbor tracing: start at the
// region's first pixel in raster order (everything above and to its left is
// background), then repeatedly sweep the 8 neighbors clockwise, starting just
// after the background pixel we came from, and step to the first foreground
// pixel found. Tracing stops with Jacob's criterion: back at the start pixel
// about to repeat the first move.
//
// The raw trace is then compressed to the points where the walking direction
// changes, so straight horizontal, vertical and diagonal runs keep only their
// end points. The region whose compressed polygon has the largest shoelace
// area wins. Output points are `(x, y)` pixel centers in clockwise screen order.

use crate::core_modules::geometry::Point;
use crate::core_modules::labeling::{LabelMap, label};
use crate::error::{Error, Result};
use image::GrayImage;

/// Clockwise neighbor offsets (y grows downward), starting east.
const DIRECTIONS: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];
const WEST: usize = 4;

fn direction_index(dx: i64, dy: i64) -> usize {
    DIRECTIONS
        .iter()
        .position(|&d| d == (dx, dy))
        .unwrap_or(WEST)
}

/// Traces the external boundary of region `region` starting at its first raster pixel.
fn trace_region(labels: &LabelMap, region: u32, start: (i64, i64)) -> Vec<(i64, i64)> {
    let inside = |(x, y): (i64, i64)| {
        x >= 0
            && y >= 0
            && x < labels.width as i64
            && y < labels.height as i64
            && labels.get(x as u32, y as u32) == region
    };

    // Sweep clockwise from just past `back`; returns the next pixel and its backtrack direction.
    let step = |current: (i64, i64), back: usize| -> Option<((i64, i64), usize)> {
        for i in 1..8 {
            let d = (back + i) % 8;
            let n = (current.0 + DIRECTIONS[d].0, current.1 + DIRECTIONS[d].1);
            if inside(n) {
                let prev = (back + i - 1) % 8;
                let p = (current.0 + DIRECTIONS[prev].0, current.1 + DIRECTIONS[prev].1);
                return Some((n, direction_index(p.0 - n.0, p.1 - n.1)));
            }
        }
        None
    };

    let mut points = vec![start];
    let mut current = start;
    let mut back = WEST;
    let mut second: Option<(i64, i64)> = None;
    let limit = 4 * labels.labels.len() + 8;

    while points.len() <= limit {
        let Some((next, next_back)) = step(current, back) else {
            break;
        };
        if current == start {
            match second {
                Some(s) if s == next => break,
                None => second = Some(next),
                _ => {}
            }
        }
        points.push(next);
        current = next;
        back = next_back;
    }

    if points.len() > 1 && points.last() == Some(&start) {
        points.pop();
    }
    points
}

/// Keeps only the points of a closed pixel chain where the step direction changes.
pub fn compress_chain(points: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let n = points.len();
    if n <= 2 {
        return points.to_vec();
    }
    (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let cur = points[i];
            let next = points[(i + 1) % n];
            (cur.0 - prev.0, cur.1 - prev.1) != (next.0 - cur.0, next.1 - cur.1)
        })
        .map(|i| points[i])
        .collect()
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice.abs() / 2.0
}

/// Compressed external contours of every region, in label order.
pub fn external_contours(mask: &GrayImage) -> Vec<Vec<Point>> {
    let labels = label(mask);
    let mut starts: Vec<Option<(i64, i64)>> = vec![None; labels.count as usize];
    for y in 0..labels.height {
        for x in 0..labels.width {
            let l = labels.get(x, y);
            if l != 0 && starts[(l - 1) as usize].is_none() {
                starts[(l - 1) as usize] = Some((x as i64, y as i64));
            }
        }
    }

    starts
        .into_iter()
        .enumerate()
        .filter_map(|(i, start)| start.map(|s| (i as u32 + 1, s)))
        .map(|(region, start)| {
            compress_chain(&trace_region(&labels, region, start))
                .into_iter()
                .map(|(x, y)| Point::new(x as f64, y as f64))
                .collect()
        })
        .collect()
}

/// The external contour with the largest area.
pub fn border_path(mask: &GrayImage) -> Result<Vec<Point>> {
    let mut best: Option<(f64, Vec<Point>)> = None;
    for contour in external_contours(mask) {
        let area = polygon_area(&contour);
        if best.as_ref().is_none_or(|(a, _)| area > *a) {
            best = Some((area, contour));
        }
    }
    best.map(|(_, c)| c).ok_or(Error::EmptyMask)
}
