// THEORY:
// The on-disk convention for an SRS project is a three level tree:
//
//   project/
//     experiment_a/
//       calibration.tif          <- the only TIFF at experiment level
//       subfolder_1/
//         worm_..._01_05.tif     <- worm images / z-chunk tiles
//       subfolder_2/ ...
//     experiment_b/ ...
//
// Discovery is a read-only walk that turns this tree into typed values. It is
// strict where ambiguity would silently corrupt results (an experiment must have
// exactly one calibration image) and lenient elsewhere (an experiment without
// image subfolders is kept and reported). Hidden entries are ignored and every
// list is sorted by name so repeated runs see the same order.

use crate::core_modules::filename::WormImageName;
use crate::error::{Error, Result};
use glob::MatchOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const TIFF_PATTERNS: [&str; 2] = ["*.tif", "*.tiff"];

/// A single worm image inside an image subfolder.
#[derive(Debug, Clone, PartialEq)]
pub struct WormImage {
    pub path: PathBuf,
    pub name: WormImageName,
}

/// A folder of worm images belonging to one experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSubfolder {
    pub name: String,
    pub dir: PathBuf,
    pub images: Vec<WormImage>,
}

/// One experiment: a calibration image plus its image subfolders.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    pub name: String,
    pub dir: PathBuf,
    pub calibration: PathBuf,
    pub subfolders: Vec<ImageSubfolder>,
}

/// A project folder and every experiment found in it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub experiments: Vec<Experiment>,
}

impl ProjectLayout {
    pub fn discover(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::NotADirectory(root.to_path_buf()));
        }
        let experiments = list_subdirs(root)?
            .iter()
            .map(|dir| Experiment::discover(dir))
            .collect::<Result<Vec<_>>>()?;
        debug!(root = %root.display(), experiments = experiments.len(), "discovered project");
        Ok(Self {
            root: root.to_path_buf(),
            experiments,
        })
    }

    pub fn image_count(&self) -> usize {
        self.experiments.iter().map(Experiment::image_count).sum()
    }
}

impl Experiment {
    pub fn discover(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::NotADirectory(dir.to_path_buf()));
        }
        let mut candidates = list_tiffs(dir)?;
        let calibration = match candidates.len() {
            0 => return Err(Error::MissingCalibration(dir.to_path_buf())),
            1 => candidates.remove(0),
            _ => {
                return Err(Error::AmbiguousCalibration {
                    dir: dir.to_path_buf(),
                    candidates: candidates.iter().map(|p| file_name(p)).collect(),
                });
            }
        };

        let subfolders = list_subdirs(dir)?
            .into_iter()
            .map(|sub| ImageSubfolder::discover(&sub))
            .collect::<Result<Vec<_>>>()?;
        if subfolders.is_empty() {
            warn!(experiment = %dir.display(), "experiment has no image subfolders");
        }

        Ok(Self {
            name: file_name(dir),
            dir: dir.to_path_buf(),
            calibration,
            subfolders,
        })
    }

    pub fn image_count(&self) -> usize {
        self.subfolders.iter().map(|s| s.images.len()).sum()
    }
}

impl ImageSubfolder {
    pub fn discover(dir: &Path) -> Result<Self> {
        let images: Vec<WormImage> = list_tiffs(dir)?
            .into_iter()
            .map(|path| WormImage {
                name: WormImageName::from_path(&path),
                path,
            })
            .collect();
        if images.is_empty() {
            warn!(subfolder = %dir.display(), "image subfolder is empty");
        }
        Ok(Self {
            name: file_name(dir),
            dir: dir.to_path_buf(),
            images,
        })
    }
}

/// Sorted `.tif`/`.tiff` files directly inside `dir`, extension case ignored.
pub fn list_tiffs(dir: &Path) -> Result<Vec<PathBuf>> {
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let mut files = Vec::new();
    for pattern in TIFF_PATTERNS {
        for entry in glob::glob_with(&format!("{base}/{pattern}"), options)? {
            let path = entry.map_err(std::io::Error::from)?;
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn list_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() && !file_name(&path).starts_with('.') {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
