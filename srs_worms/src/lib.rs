// THEORY:
// This file is the main entry point for the `srs_worms` library crate.
// It exposes the two high-level drivers (`ExperimentPipeline` for a sequential
// run and `ParallelPipeline` for a worker-pool run) together with the project
// layout types they consume.
//
// The individual processing stages (field normalization, hyperstacking,
// unmixing, tile scanning, Fiji stitching, worm morphology) live in
// `core_modules` and are public as well, so a caller can drive a single stage
// on its own data without going through a full project run.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use error::{Error, Result};
