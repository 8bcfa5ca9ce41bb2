// THEORY:
// `Point` is the shared coordinate type of the morphology layer. Contours come
// out of the tracer on the integer pixel grid, but every later stage (spline
// resampling, averaging, normal lines) works in sub-pixel space, so a single
// `f64` point type flows through the whole chain. Coordinates are `(x, y)` with
// `y` growing downward, the same convention the `image` crate uses.

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn norm(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Self) -> f64 {
        self.sub(other).norm()
    }

    /// Midpoint of two points.
    pub fn average(self, other: Self) -> Self {
        Self::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// Pixel indices of the point, or `None` when it falls outside a `width` x `height` grid.
    pub fn to_pixel(self, width: u32, height: u32) -> Option<(u32, u32)> {
        let x = self.x.round();
        let y = self.y.round();
        if x < 0.0 || y < 0.0 || x >= width as f64 || y >= height as f64 {
            return None;
        }
        Some((x as u32, y as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_and_dot() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance(b), 5.0);
        assert_eq!(b.dot(Point::new(1.0, 1.0)), 7.0);
    }

    #[test]
    fn pixel_conversion_checks_bounds() {
        assert_eq!(Point::new(1.4, 2.6).to_pixel(4, 4), Some((1, 3)));
        assert_eq!(Point::new(-0.6, 0.0).to_pixel(4, 4), None);
        assert_eq!(Point::new(3.7, 0.0).to_pixel(4, 4), None);
    }
}
