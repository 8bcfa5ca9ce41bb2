// THEORY:
// Connected component labeling turns a binary mask into a map of regions. It is
// the piece the morphology layer uses to tell the two halves of a worm apart
// once a cut line has been drawn through the body.
//
// Algorithm:
// 1.  **Seeding**: Pixels are scanned in raster order. The first foreground pixel
//     not yet visited seeds a new region, so region numbers follow the raster
//     position of each region's top-left-most pixel. Background stays 0.
// 2.  **Region Growing**: From the seed, a stack-based flood fill claims every
//     foreground pixel reachable through the 8 neighbors (diagonals count, so a
//     one pixel diagonal bridge joins two regions).
// 3.  **Stateless Utility**: Labeling has no memory; the same mask always gives
//     the same map.

use image::GrayImage;

const NEIGHBORS_8: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Region labels for every pixel of a mask. `0` is background.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
    pub width: u32,
    pub height: u32,
    pub labels: Vec<u32>,
    /// Number of regions; labels run from 1 to `count`.
    pub count: u32,
}

impl LabelMap {
    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.labels[(y * self.width + x) as usize]
    }

    /// Pixel count of region `label`.
    pub fn area(&self, label: u32) -> usize {
        self.labels.iter().filter(|&&l| l == label).count()
    }

    /// Binary mask (0/255) of a single region.
    pub fn region_mask(&self, label: u32) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([if label != 0 && self.get(x, y) == label { 255 } else { 0 }])
        })
    }
}

/// Labels the 8-connected foreground regions (nonzero pixels) of `mask`.
pub fn label(mask: &GrayImage) -> LabelMap {
    let (width, height) = mask.dimensions();
    let mut labels = vec![0u32; (width * height) as usize];
    let mut count = 0u32;
    let mut stack: Vec<(u32, u32)> = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let index = (y * width + x) as usize;
            if mask.get_pixel(x, y).0[0] == 0 || labels[index] != 0 {
                continue;
            }

            // New region seeded at the first unvisited foreground pixel.
            count += 1;
            labels[index] = count;
            stack.push((x, y));

            while let Some((cx, cy)) = stack.pop() {
                for (dx, dy) in NEIGHBORS_8 {
                    let nx = cx as i64 + dx;
                    let ny = cy as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let (nx, ny) = (nx as u32, ny as u32);
                    let n_index = (ny * width + nx) as usize;
                    if labels[n_index] == 0 && mask.get_pixel(nx, ny).0[0] != 0 {
                        labels[n_index] = count;
                        stack.push((nx, ny));
                    }
                }
            }
        }
    }

    LabelMap {
        width,
        height,
        labels,
        count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&str]) -> GrayImage {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        GrayImage::from_fn(width, height, |x, y| {
            let on = rows[y as usize].as_bytes()[x as usize] == b'#';
            image::Luma([if on { 255 } else { 0 }])
        })
    }

    #[test]
    fn separate_regions_get_raster_ordered_labels() {
        let mask = mask_from(&[
            "##...", //
            "##..#",
            "....#",
            "#....",
        ]);
        let map = label(&mask);
        assert_eq!(map.count, 3);
        assert_eq!(map.get(0, 0), 1);
        assert_eq!(map.get(4, 1), 2);
        assert_eq!(map.get(0, 3), 3);
        assert_eq!(map.get(2, 2), 0);
        assert_eq!(map.area(1), 4);
    }

    #[test]
    fn diagonal_touch_joins_regions() {
        let mask = mask_from(&[
            "#..", //
            ".#.",
            "..#",
        ]);
        assert_eq!(label(&mask).count, 1);
    }

    #[test]
    fn empty_mask_has_no_regions() {
        let map = label(&GrayImage::new(4, 4));
        assert_eq!(map.count, 0);
        assert!(map.labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn region_mask_is_binary() {
        let mask = mask_from(&["#.#"]);
        let map = label(&mask);
        let second = map.region_mask(2);
        assert_eq!(second.as_raw(), &vec![0, 0, 255]);
    }
}
