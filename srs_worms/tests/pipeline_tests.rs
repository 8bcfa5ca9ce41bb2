use srs_worms::Error;
use srs_worms::core_modules::layout::ProjectLayout;
use srs_worms::core_modules::stack::{Stack, read_tiff, write_tiff};
use srs_worms::parallel_pipeline::ParallelPipeline;
use srs_worms::pipeline::{
    ExperimentPipeline, MACRO_FILE_NAME, PipelineConfig, STITCH_DIR_NAME, StitchingConfig,
    SubfolderOutcome,
};
use std::fs;
use std::path::Path;

const SIZE: u32 = 8;
const PROTEIN: u16 = 1000;
const LIPID: u16 = 400;

fn plane(value: u16) -> Vec<u16> {
    vec![value; (SIZE * SIZE) as usize]
}

/// Chunk with two settling frames followed by `slices` protein/lipid pairs.
fn write_chunk(path: &Path, slices: usize) {
    let mut planes = vec![plane(0), plane(0)];
    for _ in 0..slices {
        planes.push(plane(PROTEIN));
        planes.push(plane(LIPID));
    }
    write_tiff(path, &Stack::from_planes(SIZE, SIZE, planes).unwrap()).unwrap();
}

/// exp1/{calib.tif, plate1/ (3 slices in two chunks), plate2/ (broken chunk)}
fn build_project(root: &Path) {
    let exp = root.join("exp1");
    fs::create_dir_all(exp.join("plate1")).unwrap();
    fs::create_dir_all(exp.join("plate2")).unwrap();
    let calibration = Stack::from_planes(SIZE, SIZE, vec![plane(500)]).unwrap();
    write_tiff(&exp.join("calib.tif"), &calibration).unwrap();

    write_chunk(&exp.join("plate1").join("ctrl_p1_w1_01_02.tif"), 2);
    write_chunk(&exp.join("plate1").join("ctrl_p1_w1_03_03.tif"), 1);
    // declares five slices but holds two
    write_chunk(&exp.join("plate2").join("ctrl_p2_w1_01_05.tif"), 2);
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        fnorm_radius: 2.0,
        unmix_ratio: Some(1.0),
        ..PipelineConfig::default()
    }
}

fn assert_close(found: u16, expected: u16) {
    assert!(found.abs_diff(expected) <= 1, "found {found}, expected {expected}");
}

#[test]
fn sequential_run_writes_unmixed_hyperstack() {
    let root = tempfile::tempdir().unwrap();
    build_project(root.path());
    let layout = ProjectLayout::discover(root.path()).unwrap();

    let report = ExperimentPipeline::new(test_config()).process_project(&layout);

    assert!(report.failed_experiments.is_empty());
    assert_eq!(report.processed(), 1);
    assert_eq!(report.failed(), 1);
    let exp = &report.experiments[0];
    match &exp.outcomes[0] {
        SubfolderOutcome::Processed { subfolder, slices, .. } => {
            assert_eq!(subfolder, "plate1");
            assert_eq!(*slices, 3);
        }
        other => panic!("plate1 should succeed: {other:?}"),
    }
    match &exp.outcomes[1] {
        SubfolderOutcome::Failed { subfolder, error } => {
            assert_eq!(subfolder, "plate2");
            assert!(error.contains("expected 10"), "{error}");
        }
        other => panic!("plate2 should fail: {other:?}"),
    }

    let out = read_tiff(&exp.output_dir.join("plate1.tif")).unwrap();
    assert_eq!(out.len(), 9);
    assert_close(out.planes[0][0], PROTEIN);
    assert_close(out.planes[1][0], LIPID);
    assert_close(out.planes[2][0], PROTEIN - LIPID);
}

#[test]
fn rerun_ignores_output_folder() {
    let root = tempfile::tempdir().unwrap();
    build_project(root.path());
    let pipeline = ExperimentPipeline::new(test_config());

    pipeline.process_project(&ProjectLayout::discover(root.path()).unwrap());
    let layout = ProjectLayout::discover(root.path()).unwrap();
    assert_eq!(layout.experiments[0].subfolders.len(), 3);

    let report = pipeline.process_project(&layout);
    assert_eq!(report.experiments[0].outcomes.len(), 2);
}

#[test]
fn bad_calibration_fails_the_experiment_only() {
    let root = tempfile::tempdir().unwrap();
    build_project(root.path());
    let broken = root.path().join("exp0");
    fs::create_dir_all(broken.join("plate")).unwrap();
    fs::write(broken.join("calib.tif"), b"not a tiff").unwrap();

    let layout = ProjectLayout::discover(root.path()).unwrap();
    let report = ExperimentPipeline::new(test_config()).process_project(&layout);

    assert_eq!(report.failed_experiments.len(), 1);
    assert_eq!(report.failed_experiments[0].0, "exp0");
    assert_eq!(report.experiments.len(), 1);
}

#[tokio::test]
async fn parallel_run_matches_sequential_order() {
    let root = tempfile::tempdir().unwrap();
    build_project(root.path());
    let layout = ProjectLayout::discover(root.path()).unwrap();

    let pipeline = ParallelPipeline::new(test_config(), 3);
    assert_eq!(pipeline.num_workers(), 3);
    let report = pipeline.process_project(&layout).await;

    let names: Vec<_> = report.experiments[0]
        .outcomes
        .iter()
        .map(|o| match o {
            SubfolderOutcome::Processed { subfolder, .. }
            | SubfolderOutcome::Failed { subfolder, .. } => subfolder.as_str(),
        })
        .collect();
    assert_eq!(names, vec!["plate1", "plate2"]);
    assert_eq!(report.processed(), 1);
    assert!(report.experiments[0].output_dir.join("plate1.tif").is_file());
}

#[tokio::test]
async fn stitching_prepares_tiles_and_reports_missing_fiji() {
    let root = tempfile::tempdir().unwrap();
    build_project(root.path());
    let layout = ProjectLayout::discover(root.path()).unwrap();
    let pipeline = ExperimentPipeline::new(test_config());
    let experiment = &layout.experiments[0];
    pipeline.process_experiment(experiment).unwrap();

    let stitching = StitchingConfig {
        fiji_path: root.path().join("missing-fiji"),
        grid_x: 2,
        grid_y: 1,
        ..StitchingConfig::default()
    };
    let result = pipeline.stitch_experiment(experiment, &stitching).await;
    assert!(matches!(result, Err(Error::Fiji(_))));

    let stitch_dir = experiment.dir.join("processed").join(STITCH_DIR_NAME);
    assert!(stitch_dir.join("tile_01.tif").is_file());
    assert!(!stitch_dir.join("tile_02.tif").exists(), "failed subfolder has no tile");
    let rendered = fs::read_to_string(stitch_dir.join(MACRO_FILE_NAME)).unwrap();
    assert!(rendered.contains("grid_size_x=2 grid_size_y=1"));
}
