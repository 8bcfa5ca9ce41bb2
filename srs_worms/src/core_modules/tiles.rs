// THEORY:
// Long z acquisitions are saved as several TIFF chunks per tile, each named
// `..._<start>_<end>.tif` after the slices it holds. Every chunk begins with a
// few settling frames recorded while the stage moves (two by default), which
// are dropped. What remains must hold exactly `(end - start + 1) * channels`
// planes; anything else means a truncated or mislabeled file and the whole
// tile is rejected. Chunks are concatenated in order of their start slice.

use crate::core_modules::filename::WormImageName;
use crate::core_modules::layout::list_tiffs;
use crate::core_modules::stack::{Stack, read_tiff};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_SKIP: usize = 2;

/// A z-chunk file and the slice range its name declares.
#[derive(Debug, Clone, PartialEq)]
pub struct TileChunk {
    pub path: PathBuf,
    pub start: u32,
    pub end: u32,
}

impl TileChunk {
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = WormImageName::from_path(path);
        let (start, end) = name
            .z_range()
            .filter(|(start, end)| end >= start)
            .ok_or_else(|| Error::InvalidFileName(path.display().to_string()))?;
        Ok(Self {
            path: path.to_path_buf(),
            start,
            end,
        })
    }

    pub fn expected_planes(&self, num_chn: usize) -> usize {
        ((self.end - self.start) as usize + 1).saturating_mul(num_chn)
    }
}

/// Chunk files of a tile directory, ordered by start slice.
pub fn tile_chunks(dir: &Path) -> Result<Vec<TileChunk>> {
    let mut chunks = list_tiffs(dir)?
        .iter()
        .map(|p| TileChunk::from_path(p))
        .collect::<Result<Vec<_>>>()?;
    if chunks.is_empty() {
        return Err(Error::NoImages(dir.to_path_buf()));
    }
    chunks.sort_by_key(|c| (c.start, c.end));
    Ok(chunks)
}

/// Reads and concatenates every chunk in `dir`.
pub fn scan_tiles(dir: &Path, skip: usize, num_chn: usize) -> Result<Stack> {
    let mut stack: Option<Stack> = None;

    for chunk in tile_chunks(dir)? {
        let mut img = read_tiff(&chunk.path)?;
        img.skip_front(skip);

        let expected = chunk.expected_planes(num_chn);
        if img.len() != expected {
            return Err(Error::TileSliceMismatch {
                path: chunk.path,
                found: img.len(),
                expected,
            });
        }
        debug!(
            path = %chunk.path.display(),
            start = chunk.start,
            end = chunk.end,
            "appending tile chunk"
        );

        match stack.as_mut() {
            None => stack = Some(img),
            Some(s) => s.append(img)?,
        }
    }

    stack.ok_or_else(|| Error::NoImages(dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::stack::write_tiff;

    fn write_chunk(dir: &Path, name: &str, values: &[u16]) {
        let planes = values.iter().map(|&v| vec![v; 4]).collect();
        let stack = Stack::from_planes(2, 2, planes).unwrap();
        write_tiff(&dir.join(name), &stack).unwrap();
    }

    #[test]
    fn concatenates_in_start_order_after_skip() {
        let dir = tempfile::tempdir().unwrap();
        // 2 settle frames + 2 slices * 2 channels
        write_chunk(dir.path(), "w1_03_04.tif", &[0, 0, 30, 31, 40, 41]);
        write_chunk(dir.path(), "w1_01_02.tif", &[0, 0, 10, 11, 20, 21]);

        let stack = scan_tiles(dir.path(), 2, 2).unwrap();
        let firsts: Vec<u16> = stack.planes.iter().map(|p| p[0]).collect();
        assert_eq!(firsts, vec![10, 11, 20, 21, 30, 31, 40, 41]);
    }

    #[test]
    fn slice_mismatch_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_chunk(dir.path(), "w1_01_03.tif", &[0, 0, 1, 2, 3, 4]);

        match scan_tiles(dir.path(), 2, 2) {
            Err(Error::TileSliceMismatch { found, expected, .. }) => {
                assert_eq!(found, 4);
                assert_eq!(expected, 6);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn name_without_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_chunk(dir.path(), "worm_overview.tif", &[1]);
        assert!(matches!(scan_tiles(dir.path(), 0, 1), Err(Error::InvalidFileName(_))));
    }

    #[test]
    fn widest_range_is_a_mismatch_not_an_overflow() {
        let chunk = TileChunk::from_path(Path::new("w_0_4294967295.tif")).unwrap();
        assert_eq!(chunk.expected_planes(2), (u32::MAX as usize + 1) * 2);

        let dir = tempfile::tempdir().unwrap();
        write_chunk(dir.path(), "w_0_4294967295.tif", &[0, 0, 1, 2]);
        match scan_tiles(dir.path(), 2, 2) {
            Err(Error::TileSliceMismatch { found, .. }) => assert_eq!(found, 2),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn empty_dir_has_no_images() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(scan_tiles(dir.path(), 2, 2), Err(Error::NoImages(_))));
    }
}
