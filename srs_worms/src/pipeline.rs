// THEORY:
// The `pipeline` module is the top-level API for processing a project. It wires
// the core modules into the per-experiment flow:
//
//   calibration ──► FieldNormalizer
//   subfolder   ──► scan_tiles ──► normalize ──► hyperstack ──► unmix ──► ImageJ TIFF
//
// One failing subfolder (a truncated chunk, a bad file name) is recorded in the
// report and the run moves on; a failing calibration stops its experiment,
// because nothing in it can be normalized. Stitching through Fiji is a separate,
// async step run on the processed tiles of one experiment.

use crate::core_modules::field_norm::{DEFAULT_RADIUS, FieldNormalizer};
use crate::core_modules::fiji::{
    DEFAULT_MEMORY, DEFAULT_OUTPUT_PATTERN, GRID_STITCHING_TEMPLATE, batch_rename, create_macro,
    run_macro, write_macro,
};
use crate::core_modules::hyperstack::{DEFAULT_CHANNELS, hyperstack_srs};
use crate::core_modules::layout::{Experiment, ImageSubfolder, ProjectLayout};
use crate::core_modules::stack::read_tiff;
use crate::core_modules::tiles::{DEFAULT_SKIP, scan_tiles};
use crate::core_modules::unmix::{DEFAULT_QUANTILE, pro_sub_lip};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const STITCH_DIR_NAME: &str = "stitch";
pub const STITCHED_DIR_NAME: &str = "stitched";
pub const MACRO_FILE_NAME: &str = "stitch.ijm";

/// Configuration for the processing pipeline, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Raman bands interleaved in each raw stack.
    pub num_channels: usize,
    /// Settling frames dropped from the start of every chunk file.
    pub skip_slices: usize,
    /// Gaussian sigma of the calibration blur, in pixels.
    pub fnorm_radius: f32,
    /// Quantile used to match the protein and lipid bands.
    pub unmix_quantile: f64,
    /// Fixed protein/lipid ratio; estimated per tile when absent.
    pub unmix_ratio: Option<f64>,
    /// Name of the per-experiment output folder.
    pub output_dir_name: String,
    pub stitching: Option<StitchingConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_channels: DEFAULT_CHANNELS,
            skip_slices: DEFAULT_SKIP,
            fnorm_radius: DEFAULT_RADIUS,
            unmix_quantile: DEFAULT_QUANTILE,
            unmix_ratio: None,
            output_dir_name: "processed".to_string(),
            stitching: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn output_dir(&self, experiment: &Experiment) -> PathBuf {
        experiment.dir.join(&self.output_dir_name)
    }
}

/// Settings for the Fiji Grid/Collection stitching step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchingConfig {
    /// Fiji launcher, e.g. `ImageJ-linux64`.
    pub fiji_path: PathBuf,
    /// Macro template file; the built-in Grid/Collection template when absent.
    pub template: Option<PathBuf>,
    pub grid_x: u32,
    pub grid_y: u32,
    pub memory: String,
    /// Glob matching the channel files Fiji writes.
    pub output_pattern: String,
    pub prefix: String,
    pub channel_names: Option<Vec<String>>,
}

impl Default for StitchingConfig {
    fn default() -> Self {
        Self {
            fiji_path: PathBuf::from("fiji"),
            template: None,
            grid_x: 1,
            grid_y: 1,
            memory: DEFAULT_MEMORY.to_string(),
            output_pattern: DEFAULT_OUTPUT_PATTERN.to_string(),
            prefix: "chn".to_string(),
            channel_names: None,
        }
    }
}

/// What happened to one image subfolder.
#[derive(Debug, Clone, PartialEq)]
pub enum SubfolderOutcome {
    Processed { subfolder: String, output: PathBuf, slices: usize },
    Failed { subfolder: String, error: String },
}

impl SubfolderOutcome {
    pub fn is_processed(&self) -> bool {
        matches!(self, SubfolderOutcome::Processed { .. })
    }

    pub(crate) fn from_result(
        subfolder: &ImageSubfolder,
        result: Result<(PathBuf, usize)>,
    ) -> Self {
        match result {
            Ok((output, slices)) => {
                info!(
                    subfolder = %subfolder.name,
                    output = %output.display(),
                    slices,
                    "processed subfolder"
                );
                SubfolderOutcome::Processed {
                    subfolder: subfolder.name.clone(),
                    output,
                    slices,
                }
            }
            Err(e) => {
                error!(subfolder = %subfolder.name, error = %e, "subfolder failed");
                SubfolderOutcome::Failed {
                    subfolder: subfolder.name.clone(),
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Per-experiment summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentReport {
    pub experiment: String,
    pub output_dir: PathBuf,
    pub outcomes: Vec<SubfolderOutcome>,
}

impl ExperimentReport {
    pub fn processed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_processed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.processed()
    }
}

/// Whole-project summary. Experiments whose calibration could not be used are listed separately.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectReport {
    pub experiments: Vec<ExperimentReport>,
    pub failed_experiments: Vec<(String, String)>,
}

impl ProjectReport {
    pub fn processed(&self) -> usize {
        self.experiments.iter().map(ExperimentReport::processed).sum()
    }

    pub fn failed(&self) -> usize {
        self.experiments.iter().map(ExperimentReport::failed).sum()
    }
}

/// Builds the field normalizer of an experiment from its calibration image.
pub fn load_normalizer(
    config: &PipelineConfig,
    experiment: &Experiment,
) -> Result<FieldNormalizer> {
    let calibration = read_tiff(&experiment.calibration)?;
    FieldNormalizer::from_calibration(&calibration, config.fnorm_radius)
}

/// Runs one subfolder end to end and returns the output path and slice count.
pub fn process_subfolder(
    config: &PipelineConfig,
    normalizer: &FieldNormalizer,
    subfolder: &ImageSubfolder,
    out_dir: &Path,
) -> Result<(PathBuf, usize)> {
    let raw = scan_tiles(&subfolder.dir, config.skip_slices, config.num_channels)?;
    let normalized = normalizer.normalize_stack(&raw)?;
    let hyperstack = hyperstack_srs(&normalized, config.num_channels)?;
    let unmixed = pro_sub_lip(&hyperstack, config.unmix_ratio, config.unmix_quantile)?;

    let output = out_dir.join(format!("{}.tif", subfolder.name));
    unmixed.write_imagej(&output)?;
    Ok((output, unmixed.num_slices()))
}

/// Subfolders to process, leaving out the pipeline's own output folder.
pub fn input_subfolders<'a>(
    config: &PipelineConfig,
    experiment: &'a Experiment,
) -> Vec<&'a ImageSubfolder> {
    experiment
        .subfolders
        .iter()
        .filter(|s| {
            let is_output = s.name == config.output_dir_name;
            if is_output {
                debug!(subfolder = %s.name, "skipping output folder");
            }
            !is_output
        })
        .collect()
}

/// Sequential driver over experiments and their subfolders.
pub struct ExperimentPipeline {
    config: PipelineConfig,
}

impl ExperimentPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn process_experiment(&self, experiment: &Experiment) -> Result<ExperimentReport> {
        info!(experiment = %experiment.name, "processing experiment");
        let normalizer = load_normalizer(&self.config, experiment)?;
        let output_dir = self.config.output_dir(experiment);
        std::fs::create_dir_all(&output_dir)?;

        let outcomes = input_subfolders(&self.config, experiment)
            .into_iter()
            .map(|sub| {
                let result = process_subfolder(&self.config, &normalizer, sub, &output_dir);
                SubfolderOutcome::from_result(sub, result)
            })
            .collect();

        Ok(ExperimentReport {
            experiment: experiment.name.clone(),
            output_dir,
            outcomes,
        })
    }

    pub fn process_project(&self, layout: &ProjectLayout) -> ProjectReport {
        let mut report = ProjectReport::default();
        for experiment in &layout.experiments {
            match self.process_experiment(experiment) {
                Ok(r) => report.experiments.push(r),
                Err(e) => {
                    error!(experiment = %experiment.name, error = %e, "experiment failed");
                    report.failed_experiments.push((experiment.name.clone(), e.to_string()));
                }
            }
        }
        info!(
            processed = report.processed(),
            failed = report.failed(),
            failed_experiments = report.failed_experiments.len(),
            "project done"
        );
        report
    }

    /// Stitches the processed tiles of `experiment` with Fiji and returns the renamed
    /// channel files.
    pub async fn stitch_experiment(
        &self,
        experiment: &Experiment,
        stitching: &StitchingConfig,
    ) -> Result<Vec<PathBuf>> {
        let output_dir = self.config.output_dir(experiment);
        let stitch_dir = output_dir.join(STITCH_DIR_NAME);
        let tiles = prepare_stitch_dir(&self.config, experiment, &stitch_dir)?;
        info!(experiment = %experiment.name, tiles, "stitching experiment");

        let macro_path = stitch_dir.join(MACRO_FILE_NAME);
        match &stitching.template {
            Some(template) => create_macro(
                template,
                &stitch_dir,
                &macro_path,
                stitching.grid_x,
                stitching.grid_y,
            )?,
            None => write_macro(
                GRID_STITCHING_TEMPLATE,
                &stitch_dir,
                &macro_path,
                stitching.grid_x,
                stitching.grid_y,
            )?,
        }
        run_macro(&stitching.fiji_path, &macro_path, &stitching.memory).await?;

        let renamed = batch_rename(
            &stitch_dir,
            &output_dir.join(STITCHED_DIR_NAME),
            &stitching.output_pattern,
            &stitching.prefix,
            stitching.channel_names.as_deref(),
        )?;
        if renamed.is_empty() {
            warn!(
                experiment = %experiment.name,
                pattern = %stitching.output_pattern,
                "fiji produced no channel files"
            );
        }
        Ok(renamed)
    }
}

/// Copies processed tiles to `stitch_dir` as `tile_01.tif`, `tile_02.tif`, ... in subfolder order.
pub fn prepare_stitch_dir(
    config: &PipelineConfig,
    experiment: &Experiment,
    stitch_dir: &Path,
) -> Result<usize> {
    let output_dir = config.output_dir(experiment);
    std::fs::create_dir_all(stitch_dir)?;
    let mut count = 0;
    for sub in input_subfolders(config, experiment) {
        let processed = output_dir.join(format!("{}.tif", sub.name));
        if !processed.is_file() {
            warn!(subfolder = %sub.name, "no processed tile, skipping");
            continue;
        }
        count += 1;
        std::fs::copy(&processed, stitch_dir.join(format!("tile_{count:02}.tif")))?;
    }
    if count == 0 {
        return Err(Error::NoImages(output_dir));
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_acquisition_setup() {
        let config = PipelineConfig::default();
        assert_eq!(config.num_channels, 2);
        assert_eq!(config.skip_slices, 2);
        assert_eq!(config.fnorm_radius, 50.0);
        assert_eq!(config.unmix_quantile, 0.999);
        assert!(config.stitching.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            skip_slices = 0
            unmix_ratio = 1.5

            [stitching]
            fiji_path = "/opt/Fiji.app/ImageJ-linux64"
            grid_x = 3
            grid_y = 2
            channel_names = ["protein", "lipid", "protein_sub_lipid"]
            "#,
        )
        .unwrap();
        assert_eq!(config.skip_slices, 0);
        assert_eq!(config.num_channels, 2);
        assert_eq!(config.unmix_ratio, Some(1.5));
        let stitching = config.stitching.unwrap();
        assert_eq!(stitching.grid_x, 3);
        assert_eq!(stitching.memory, "32000M");
        assert_eq!(stitching.channel_names.unwrap().len(), 3);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let parsed = PipelineConfig::from_toml_str("skip_slices = \"two\"");
        assert!(matches!(parsed, Err(Error::Config(_))));
    }
}
