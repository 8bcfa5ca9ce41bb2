#![forbid(unsafe_code)]

//! Command line runner for the srs_worms pipeline.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use srs_worms::core_modules::layout::{Experiment, ProjectLayout};
use srs_worms::core_modules::morphology::{DEFAULT_CUT_QUANTILE, worm_masks};
use srs_worms::parallel_pipeline::ParallelPipeline;
use srs_worms::pipeline::{ExperimentPipeline, PipelineConfig, ProjectReport, SubfolderOutcome};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Process SRS worm images: field normalization, unmixing, stitching and morphology.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the experiments, calibration images and subfolders of a project
    Discover { root: PathBuf },

    /// Normalize, hyperstack and unmix every subfolder of a project
    Process {
        root: PathBuf,
        /// Pipeline configuration (TOML)
        #[arg(short, long, env = "SRS_WORMS_CONFIG")]
        config: Option<PathBuf>,
        /// Process subfolders on a worker pool
        #[arg(long)]
        parallel: bool,
        /// Worker count for --parallel (defaults to the number of CPUs)
        #[arg(long)]
        workers: Option<usize>,
        /// Override the fixed protein/lipid ratio
        #[arg(long)]
        ratio: Option<f64>,
    },

    /// Stitch the processed tiles of one experiment with Fiji
    Stitch {
        experiment: PathBuf,
        /// Pipeline configuration with a [stitching] table
        #[arg(short, long, env = "SRS_WORMS_CONFIG")]
        config: PathBuf,
    },

    /// Split a worm mask into anterior and posterior masks
    Morphology {
        mask: PathBuf,
        anterior_mask: PathBuf,
        #[arg(short, long)]
        out_dir: PathBuf,
        /// Fraction of the midline, from the head, where the cut is made
        #[arg(short, long, default_value_t = DEFAULT_CUT_QUANTILE)]
        quantile: f64,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_toml_file(p)
            .with_context(|| format!("reading config {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn print_layout(layout: &ProjectLayout) {
    println!("{}", layout.root.display());
    for exp in &layout.experiments {
        println!("  {} (calibration: {})", exp.name, exp.calibration.display());
        for sub in &exp.subfolders {
            println!("    {}/ {} image(s)", sub.name, sub.images.len());
            for image in &sub.images {
                match image.name.z_range() {
                    Some((start, end)) => println!("      {} [z {start}-{end}]", image.name.stem),
                    None => println!("      {}", image.name.stem),
                }
            }
        }
    }
}

fn print_report(report: &ProjectReport) {
    for exp in &report.experiments {
        println!("{} -> {}", exp.experiment, exp.output_dir.display());
        for outcome in &exp.outcomes {
            match outcome {
                SubfolderOutcome::Processed { subfolder, output, slices } => {
                    println!("  ok    {subfolder}: {} ({slices} slices)", output.display())
                }
                SubfolderOutcome::Failed { subfolder, error } => {
                    println!("  FAIL  {subfolder}: {error}")
                }
            }
        }
    }
    for (name, error) in &report.failed_experiments {
        println!("{name}: FAIL {error}");
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Discover { root } => {
            let layout = ProjectLayout::discover(&root).context("discovering project")?;
            print_layout(&layout);
        }
        Command::Process {
            root,
            config,
            parallel,
            workers,
            ratio,
        } => {
            let mut config = load_config(config.as_deref())?;
            if ratio.is_some() {
                config.unmix_ratio = ratio;
            }
            let layout = ProjectLayout::discover(&root).context("discovering project")?;
            info!(
                experiments = layout.experiments.len(),
                images = layout.image_count(),
                "starting run"
            );

            let report = if parallel {
                let pipeline = match workers {
                    Some(n) => ParallelPipeline::new(config, n),
                    None => ParallelPipeline::with_default_workers(config),
                };
                pipeline.process_project(&layout).await
            } else {
                ExperimentPipeline::new(config).process_project(&layout)
            };
            print_report(&report);
            if report.failed() > 0 || !report.failed_experiments.is_empty() {
                bail!(
                    "{} subfolder(s) and {} experiment(s) failed",
                    report.failed(),
                    report.failed_experiments.len()
                );
            }
        }
        Command::Stitch { experiment, config } => {
            let config = load_config(Some(config.as_path()))?;
            let Some(stitching) = config.stitching.clone() else {
                bail!("configuration has no [stitching] table");
            };
            let experiment = Experiment::discover(&experiment).context("discovering experiment")?;
            let outputs = ExperimentPipeline::new(config)
                .stitch_experiment(&experiment, &stitching)
                .await
                .context("stitching")?;
            for path in outputs {
                println!("{}", path.display());
            }
        }
        Command::Morphology {
            mask,
            anterior_mask,
            out_dir,
            quantile,
        } => {
            let mask = image::open(&mask)
                .with_context(|| format!("opening {}", mask.display()))?
                .into_luma8();
            let anterior = image::open(&anterior_mask)
                .with_context(|| format!("opening {}", anterior_mask.display()))?
                .into_luma8();
            let masks = worm_masks(&mask, &anterior, quantile).context("splitting worm mask")?;

            std::fs::create_dir_all(&out_dir)?;
            masks.anterior.save(out_dir.join("anterior.png"))?;
            masks.posterior.save(out_dir.join("posterior.png"))?;
            info!(
                head = ?(masks.head.x, masks.head.y),
                tail = ?(masks.tail.x, masks.tail.y),
                out_dir = %out_dir.display(),
                "wrote worm masks"
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    run(args.command).await
}
