// THEORY:
// The worm midline is built from the two sides of the outline. Between head and
// tail the contour splits into two chains; each is fitted with a parametric
// cubic spline (natural end conditions, parameterized by normalized cumulative
// chord length) and sampled at the same number of evenly spaced parameters.
// Averaging the two samplings point by point gives a smooth centerline, which
// is then oriented so it starts at the head.

use crate::core_modules::geometry::Point;
use crate::error::{Error, Result};

pub const DEFAULT_RESAMPLE_POINTS: usize = 5000;

/// Natural cubic spline through `(t[i], y[i])`, `t` strictly increasing.
struct CubicSpline<'a> {
    t: &'a [f64],
    y: Vec<f64>,
    second: Vec<f64>,
}

impl<'a> CubicSpline<'a> {
    fn new(t: &'a [f64], y: Vec<f64>) -> Self {
        let n = t.len();
        let mut second = vec![0.0; n];
        if n > 2 {
            // Thomas algorithm over the interior knots; M[0] = M[n-1] = 0.
            let m = n - 2;
            let mut diag = vec![0.0; m];
            let mut upper = vec![0.0; m];
            let mut rhs = vec![0.0; m];
            for k in 0..m {
                let i = k + 1;
                let h0 = t[i] - t[i - 1];
                let h1 = t[i + 1] - t[i];
                diag[k] = 2.0 * (h0 + h1);
                upper[k] = h1;
                rhs[k] = 6.0 * ((y[i + 1] - y[i]) / h1 - (y[i] - y[i - 1]) / h0);
            }
            for k in 1..m {
                let lower = t[k + 1] - t[k];
                let w = lower / diag[k - 1];
                diag[k] -= w * upper[k - 1];
                rhs[k] -= w * rhs[k - 1];
            }
            for k in (0..m).rev() {
                let next = if k + 1 < m { second[k + 2] } else { 0.0 };
                second[k + 1] = (rhs[k] - upper[k] * next) / diag[k];
            }
        }
        Self { t, y, second }
    }

    fn eval(&self, u: f64) -> f64 {
        let n = self.t.len();
        if n == 1 {
            return self.y[0];
        }
        let j = self.t.partition_point(|&v| v <= u).clamp(1, n - 1) - 1;
        let (t0, t1) = (self.t[j], self.t[j + 1]);
        let h = t1 - t0;
        let (a, b) = (t1 - u, u - t0);
        let (m0, m1) = (self.second[j], self.second[j + 1]);
        m0 * a.powi(3) / (6.0 * h)
            + m1 * b.powi(3) / (6.0 * h)
            + (self.y[j] / h - m0 * h / 6.0) * a
            + (self.y[j + 1] / h - m1 * h / 6.0) * b
    }
}

/// Interpolates `path` with a parametric cubic spline and samples it at `num_points` even steps.
pub fn resample_path(path: &[Point], num_points: usize) -> Result<Vec<Point>> {
    let mut points: Vec<Point> = Vec::with_capacity(path.len());
    for &p in path {
        if points.last() != Some(&p) {
            points.push(p);
        }
    }
    match points.len() {
        0 => return Err(Error::PathTooShort { len: 0, needed: 1 }),
        1 => return Ok(vec![points[0]; num_points]),
        _ => {}
    }

    let mut t = Vec::with_capacity(points.len());
    let mut total = 0.0;
    t.push(0.0);
    for pair in points.windows(2) {
        total += pair[0].distance(pair[1]);
        t.push(total);
    }
    for v in &mut t {
        *v /= total;
    }

    let sx = CubicSpline::new(&t, points.iter().map(|p| p.x).collect());
    let sy = CubicSpline::new(&t, points.iter().map(|p| p.y).collect());
    let denom = num_points.saturating_sub(1).max(1) as f64;
    Ok((0..num_points)
        .map(|k| {
            let u = k as f64 / denom;
            Point::new(sx.eval(u), sy.eval(u))
        })
        .collect())
}

/// Centerline between the two contour sides joining `head_idx` and `tail_idx`, starting
/// at the head.
pub fn midline(
    path: &[Point],
    head_idx: usize,
    tail_idx: usize,
    num_points: usize,
) -> Result<Vec<Point>> {
    let (small, large) = (head_idx.min(tail_idx), head_idx.max(tail_idx));
    if small == large || large >= path.len() {
        return Err(Error::PathTooShort {
            len: path.len(),
            needed: large + 1,
        });
    }
    let first_half = &path[small..large];
    let mut second_half: Vec<Point> = path[large..].iter().chain(&path[..small]).copied().collect();
    second_half.reverse();

    let a = resample_path(first_half, num_points)?;
    let b = resample_path(&second_half, num_points)?;
    let mut avg: Vec<Point> = a.iter().zip(&b).map(|(p, q)| p.average(*q)).collect();

    let anchor = path[head_idx];
    if let (Some(first), Some(last)) = (avg.first(), avg.last()) {
        if first.distance(anchor) > last.distance(anchor) {
            avg.reverse();
        }
    }
    Ok(avg)
}

/// Index of the point at fraction `q` of the path's arc length.
pub fn quantile_point(path: &[Point], q: f64) -> usize {
    let cumulative: Vec<f64> = path
        .windows(2)
        .scan(0.0, |acc, w| {
            *acc += w[0].distance(w[1]);
            Some(*acc)
        })
        .collect();
    let Some(&total) = cumulative.last() else {
        return 0;
    };
    let target = total * q;
    cumulative
        .iter()
        .enumerate()
        .fold((0usize, f64::INFINITY), |(bi, bd), (i, &c)| {
            let d = (c - target).abs();
            if d < bd { (i, d) } else { (bi, bd) }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_resamples_evenly() {
        let path = vec![Point::new(0.0, 0.0), Point::new(5.0, 0.0), Point::new(10.0, 0.0)];
        let out = resample_path(&path, 11).unwrap();
        assert_eq!(out.len(), 11);
        for (k, p) in out.iter().enumerate() {
            assert!((p.x - k as f64).abs() < 1e-9, "{p:?}");
            assert!(p.y.abs() < 1e-9);
        }
    }

    #[test]
    fn spline_passes_through_knots() {
        let path = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 0.0),
            Point::new(3.0, 1.0),
        ];
        let out = resample_path(&path, 4).unwrap();
        assert_eq!(out[0], path[0]);
        assert!(out[3].distance(path[3]) < 1e-9);
    }

    #[test]
    fn duplicates_are_ignored() {
        let path = vec![Point::new(0.0, 0.0), Point::new(0.0, 0.0), Point::new(2.0, 0.0)];
        let out = resample_path(&path, 3).unwrap();
        assert!((out[1].x - 1.0).abs() < 1e-9);
        let single = resample_path(&[Point::new(3.0, 4.0)], 2).unwrap();
        assert_eq!(single, vec![Point::new(3.0, 4.0); 2]);
    }

    #[test]
    fn midline_of_rectangle_runs_head_to_tail() {
        // Rectangle outline 0..=10 x 0..=2, head at (0,1) and tail at (10,1).
        let path = vec![
            Point::new(0.0, 1.0),
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 1.0),
            Point::new(10.0, 2.0),
            Point::new(0.0, 2.0),
        ];
        let mid = midline(&path, 3, 0, 50).unwrap();
        assert!(mid[0].x > 9.0, "starts at head side {:?}", mid[0]);
        assert!(mid[49].x < 1.0, "ends at tail side {:?}", mid[49]);
    }

    #[test]
    fn quantile_point_tracks_arc_length() {
        let path: Vec<Point> = (0..=100).map(|i| Point::new(i as f64, 0.0)).collect();
        assert_eq!(quantile_point(&path, 0.13), 12);
        assert_eq!(quantile_point(&path, 1.0), 99);
        assert_eq!(quantile_point(&path[..1], 0.5), 0);
    }
}
