//! Error types for srs_worms

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for srs_worms operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while discovering, processing or analyzing images
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("no calibration image found in experiment {}", .0.display())]
    MissingCalibration(PathBuf),

    #[error(
        "experiment {} has more than one calibration candidate: {}",
        .dir.display(),
        .candidates.join(", ")
    )]
    AmbiguousCalibration { dir: PathBuf, candidates: Vec<String> },

    #[error("no images found in {}", .0.display())]
    NoImages(PathBuf),

    #[error("file name does not follow the tile convention: {0}")]
    InvalidFileName(String),

    #[error("{} has {found} slices, expected {expected}", .path.display())]
    TileSliceMismatch { path: PathBuf, found: usize, expected: usize },

    #[error("unsupported TIFF sample format in {}", .0.display())]
    UnsupportedSampleFormat(PathBuf),

    #[error("dimension mismatch: expected {expected:?}, found {found:?}")]
    DimensionMismatch { expected: (u32, u32), found: (u32, u32) },

    #[error("plane holds {found} pixels, expected {expected}")]
    PlaneSizeMismatch { expected: usize, found: usize },

    #[error("{planes} planes cannot be split into {channels} channels")]
    ChannelMismatch { planes: usize, channels: usize },

    #[error("channel {channel} has {found} slices, expected {expected}")]
    SliceCountMismatch { channel: usize, expected: usize, found: usize },

    #[error("hyperstack has {channels} channels and {slices} slices, nothing to write")]
    EmptyHyperstack { channels: usize, slices: usize },

    #[error("cannot derive a channel ratio: reference quantile is zero")]
    DegenerateRatio,

    #[error("mask contains no foreground pixels")]
    EmptyMask,

    #[error("path of {len} points is too short (need at least {needed})")]
    PathTooShort { len: usize, needed: usize },

    #[error("Fiji failed: {0}")]
    Fiji(String),
}
