// THEORY:
// A `Stack` is the in-memory form of a multi-page grayscale TIFF: a list of
// equally sized 16-bit planes in file order. SRS acquisitions interleave their
// channels plane by plane, so at this level a plane is just "the next page";
// the channel structure is imposed later by `hyperstack`.
//
// A `Hyperstack` is the channel-resolved form: one `Stack` per channel, every
// channel with the same number of slices. It knows how to write itself as an
// ImageJ hyperstack (pages in slice-major, channel-minor order plus the
// `ImageJ=` image description that tells Fiji how to fold the pages back up).
//
// 8-bit inputs are widened to 16 bits on read so every downstream stage works on
// a single sample type.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;
use tracing::debug;

pub type Plane = Vec<u16>;

/// A z-ordered list of 16-bit grayscale planes sharing one size.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    pub width: u32,
    pub height: u32,
    pub planes: Vec<Plane>,
}

impl Stack {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            planes: Vec::new(),
        }
    }

    pub fn from_planes(width: u32, height: u32, planes: Vec<Plane>) -> Result<Self> {
        let mut stack = Self::new(width, height);
        for plane in planes {
            stack.push(plane)?;
        }
        Ok(stack)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels_per_plane(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn plane(&self, index: usize) -> Option<&Plane> {
        self.planes.get(index)
    }

    pub fn push(&mut self, plane: Plane) -> Result<()> {
        if plane.len() != self.pixels_per_plane() {
            return Err(Error::PlaneSizeMismatch {
                expected: self.pixels_per_plane(),
                found: plane.len(),
            });
        }
        self.planes.push(plane);
        Ok(())
    }

    /// Drops the first `n` planes (all of them when `n` exceeds the length).
    pub fn skip_front(&mut self, n: usize) {
        let n = n.min(self.planes.len());
        self.planes.drain(..n);
    }

    /// Appends every plane of `other`, which must share this stack's size.
    pub fn append(&mut self, other: Stack) -> Result<()> {
        if other.dimensions() != self.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions(),
                found: other.dimensions(),
            });
        }
        self.planes.extend(other.planes);
        Ok(())
    }

    /// Per-pixel mean over all planes, used to collapse a multi-page calibration image.
    pub fn mean_plane(&self) -> Vec<f32> {
        let mut sum = vec![0f64; self.pixels_per_plane()];
        for plane in &self.planes {
            for (acc, &v) in sum.iter_mut().zip(plane) {
                *acc += v as f64;
            }
        }
        let n = self.planes.len().max(1) as f64;
        sum.into_iter().map(|v| (v / n) as f32).collect()
    }
}

/// Reads every page of a grayscale TIFF into a `Stack`.
pub fn read_tiff(path: &Path) -> Result<Stack> {
    let reader = BufReader::new(File::open(path)?);
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());
    let (width, height) = decoder.dimensions()?;
    let mut stack = Stack::new(width, height);

    loop {
        let page_dims = decoder.dimensions()?;
        if page_dims != (width, height) {
            return Err(Error::DimensionMismatch {
                expected: (width, height),
                found: page_dims,
            });
        }
        let plane = match decoder.read_image()? {
            DecodingResult::U16(data) => data,
            DecodingResult::U8(data) => data.into_iter().map(u16::from).collect(),
            _ => return Err(Error::UnsupportedSampleFormat(path.to_path_buf())),
        };
        if plane.len() != stack.pixels_per_plane() {
            // Multi-sample (RGB) pages decode to more than one value per pixel.
            return Err(Error::UnsupportedSampleFormat(path.to_path_buf()));
        }
        stack.planes.push(plane);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    debug!(
        path = %path.display(),
        planes = stack.len(),
        width,
        height,
        "read tiff stack"
    );
    Ok(stack)
}

/// Writes a plain multi-page 16-bit TIFF.
pub fn write_tiff(path: &Path, stack: &Stack) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(writer)?;
    for plane in &stack.planes {
        encoder.write_image::<colortype::Gray16>(stack.width, stack.height, plane)?;
    }
    Ok(())
}

/// Channel-resolved image: `channels[c].planes[z]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperstack {
    pub channels: Vec<Stack>,
}

impl Hyperstack {
    pub fn new(channels: Vec<Stack>) -> Result<Self> {
        if let Some(first) = channels.first() {
            for (index, channel) in channels.iter().enumerate().skip(1) {
                if channel.dimensions() != first.dimensions() {
                    return Err(Error::DimensionMismatch {
                        expected: first.dimensions(),
                        found: channel.dimensions(),
                    });
                }
                if channel.len() != first.len() {
                    return Err(Error::SliceCountMismatch {
                        channel: index,
                        expected: first.len(),
                        found: channel.len(),
                    });
                }
            }
        }
        Ok(Self { channels })
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_slices(&self) -> usize {
        self.channels.first().map_or(0, Stack::len)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.channels.first().map_or((0, 0), Stack::dimensions)
    }

    /// The ImageJ `ImageDescription` for this hyperstack.
    pub fn imagej_description(&self) -> String {
        let channels = self.num_channels();
        let slices = self.num_slices();
        let mut description = format!("ImageJ=1.11a\nimages={}\n", channels * slices);
        if channels > 1 {
            description.push_str(&format!("channels={channels}\n"));
        }
        if slices > 1 {
            description.push_str(&format!("slices={slices}\n"));
        }
        if channels > 1 && slices > 1 {
            description.push_str("hyperstack=true\n");
        }
        description.push_str("mode=grayscale\nloop=false\n");
        description
    }

    /// Writes the hyperstack as an ImageJ TIFF, slice-major and channel-minor.
    /// A hyperstack without pages is rejected before the file is created.
    pub fn write_imagej(&self, path: &Path) -> Result<()> {
        if self.num_channels() == 0 || self.num_slices() == 0 {
            return Err(Error::EmptyHyperstack {
                channels: self.num_channels(),
                slices: self.num_slices(),
            });
        }
        let (width, height) = self.dimensions();
        let writer = BufWriter::new(File::create(path)?);
        let mut encoder = TiffEncoder::new(writer)?;
        let description = self.imagej_description();
        let mut first = true;

        for z in 0..self.num_slices() {
            for channel in &self.channels {
                let mut image = encoder.new_image::<colortype::Gray16>(width, height)?;
                if first {
                    image
                        .encoder()
                        .write_tag(Tag::ImageDescription, description.as_str())?;
                    first = false;
                }
                image.write_data(&channel.planes[z])?;
            }
        }

        debug!(
            path = %path.display(),
            channels = self.num_channels(),
            slices = self.num_slices(),
            "wrote imagej hyperstack"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: u32, height: u32, offset: u16) -> Plane {
        (0..width * height).map(|i| i as u16 + offset).collect()
    }

    #[test]
    fn push_rejects_wrong_size() {
        let mut stack = Stack::new(2, 2);
        assert!(stack.push(vec![0; 4]).is_ok());
        assert!(matches!(
            stack.push(vec![0; 3]),
            Err(Error::PlaneSizeMismatch { expected: 4, found: 3 })
        ));
    }

    #[test]
    fn skip_and_append() {
        let mut a = Stack::from_planes(2, 1, vec![vec![1, 1], vec![2, 2], vec![3, 3]]).unwrap();
        assert_eq!(a.plane(1), Some(&vec![2, 2]));
        assert_eq!(a.plane(3), None);
        a.skip_front(2);
        assert_eq!(a.plane(0), Some(&vec![3, 3]));
        assert_eq!(a.planes, vec![vec![3, 3]]);
        a.skip_front(10);
        assert!(a.is_empty());

        let b = Stack::from_planes(2, 1, vec![vec![4, 4]]).unwrap();
        a.append(b).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a.plane(0), Some(&vec![4, 4]));

        let wrong = Stack::new(1, 2);
        assert!(a.append(wrong).is_err());
    }

    #[test]
    fn mean_plane_averages_pages() {
        let stack = Stack::from_planes(2, 1, vec![vec![0, 10], vec![4, 20]]).unwrap();
        assert_eq!(stack.mean_plane(), vec![2.0, 15.0]);
    }

    #[test]
    fn tiff_stack_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.tif");
        let planes = vec![ramp(3, 2, 0), ramp(3, 2, 100), ramp(3, 2, 60000)];
        let stack = Stack::from_planes(3, 2, planes).unwrap();

        write_tiff(&path, &stack).unwrap();
        let back = read_tiff(&path).unwrap();

        assert_eq!(back, stack);
    }

    #[test]
    fn imagej_description_lists_axes() {
        let c = Stack::from_planes(1, 1, vec![vec![1], vec![2]]).unwrap();
        let hyper = Hyperstack::new(vec![c.clone(), c.clone(), c]).unwrap();
        let description = hyper.imagej_description();
        assert!(description.starts_with("ImageJ="));
        assert!(description.contains("images=6\n"));
        assert!(description.contains("channels=3\n"));
        assert!(description.contains("slices=2\n"));
        assert!(description.contains("hyperstack=true\n"));
    }

    #[test]
    fn imagej_pages_are_slice_major() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hyper.tif");
        let protein = Stack::from_planes(1, 1, vec![vec![10], vec![11]]).unwrap();
        let lipid = Stack::from_planes(1, 1, vec![vec![20], vec![21]]).unwrap();
        let hyper = Hyperstack::new(vec![protein, lipid]).unwrap();
        hyper.write_imagej(&path).unwrap();

        let pages = read_tiff(&path).unwrap();
        assert_eq!(pages.planes, vec![vec![10], vec![20], vec![11], vec![21]]);
    }

    #[test]
    fn hyperstack_rejects_uneven_channels() {
        let a = Stack::from_planes(1, 1, vec![vec![1], vec![2]]).unwrap();
        let b = Stack::from_planes(1, 1, vec![vec![1]]).unwrap();
        assert!(matches!(
            Hyperstack::new(vec![a, b]),
            Err(Error::SliceCountMismatch { channel: 1, expected: 2, found: 1 })
        ));
    }

    #[test]
    fn empty_hyperstack_is_not_written() {
        let dir = tempfile::tempdir().unwrap();

        let no_channels = Hyperstack::new(Vec::new()).unwrap();
        let path = dir.path().join("no_channels.tif");
        assert!(matches!(
            no_channels.write_imagej(&path),
            Err(Error::EmptyHyperstack { channels: 0, slices: 0 })
        ));
        assert!(!path.exists());

        let no_slices = Hyperstack::new(vec![Stack::new(2, 2), Stack::new(2, 2)]).unwrap();
        let path = dir.path().join("no_slices.tif");
        assert!(matches!(
            no_slices.write_imagej(&path),
            Err(Error::EmptyHyperstack { channels: 2, slices: 0 })
        ));
        assert!(!path.exists());
    }
}
