// THEORY:
// Tile stitching is delegated to Fiji's Grid/Collection stitching plugin. The
// crate never links against ImageJ; it writes an ImageJ macro from a template,
// runs Fiji headless on it as a child process and then tidies up the channel
// files the plugin writes out.
//
// Templates are plain text with three placeholders:
//   GRID_X    - tiles per row
//   GRID_Y    - tiles per column
//   FILE_PATH - directory holding the `tile_NN.tif` inputs (outputs land there too)
//
// With `image_output=[Write to disk]` the plugin saves one file per channel
// named `img_t1_z1_c<N>`; `batch_rename` turns those into `chn_01.tif` or into
// caller-chosen channel names.

use crate::core_modules::filename::channel_index;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

pub const DEFAULT_MEMORY: &str = "32000M";
pub const DEFAULT_OUTPUT_PATTERN: &str = "img_t1_z1_c*";

/// Grid/Collection stitching macro used when no template file is configured.
pub const GRID_STITCHING_TEMPLATE: &str = r#"run("Grid/Collection stitching", "type=[Grid: row-by-row] order=[Right & Down                ] grid_size_x=GRID_X grid_size_y=GRID_Y tile_overlap=10 first_file_index_i=1 directory=[FILE_PATH] file_names=tile_{ii}.tif output_textfile_name=TileConfiguration.txt fusion_method=[Linear Blending] regression_threshold=0.30 max/avg_displacement_threshold=2.50 absolute_displacement_threshold=3.50 compute_overlap subpixel_accuracy computation_parameters=[Save computation time (but use more RAM)] image_output=[Write to disk] output_directory=[FILE_PATH]");
"#;

/// Substitutes the grid size and tile directory into `template`.
pub fn render_macro(template: &str, stitch_dir: &Path, grid_x: u32, grid_y: u32) -> String {
    template
        .replace("GRID_X", &grid_x.to_string())
        .replace("GRID_Y", &grid_y.to_string())
        .replace("FILE_PATH", &stitch_dir.display().to_string())
}

/// Renders the template file at `template_path` into `out_path`.
pub fn create_macro(
    template_path: &Path,
    stitch_dir: &Path,
    out_path: &Path,
    grid_x: u32,
    grid_y: u32,
) -> Result<()> {
    let template = std::fs::read_to_string(template_path)?;
    write_macro(&template, stitch_dir, out_path, grid_x, grid_y)
}

/// Renders `template` into `out_path`.
pub fn write_macro(
    template: &str,
    stitch_dir: &Path,
    out_path: &Path,
    grid_x: u32,
    grid_y: u32,
) -> Result<()> {
    let rendered = render_macro(template, stitch_dir, grid_x, grid_y);
    std::fs::write(out_path, rendered)?;
    debug!(path = %out_path.display(), grid_x, grid_y, "wrote stitching macro");
    Ok(())
}

/// Runs `fiji --headless -macro <macro_path> --mem=<memory>` and waits for it.
pub async fn run_macro(fiji: &Path, macro_path: &Path, memory: &str) -> Result<()> {
    info!(fiji = %fiji.display(), macro_path = %macro_path.display(), "running fiji headless");
    let status = Command::new(fiji)
        .arg("--headless")
        .arg("-macro")
        .arg(macro_path)
        .arg(format!("--mem={memory}"))
        .status()
        .await
        .map_err(|e| Error::Fiji(format!("could not start {}: {e}", fiji.display())))?;

    if !status.success() {
        return Err(Error::Fiji(format!("{} exited with {status}", fiji.display())));
    }
    Ok(())
}

/// Moves every file in `src_dir` matching `pattern` into `dest_dir`, named after its channel.
///
/// Without `suffixes` a channel `n` file becomes `<prefix>_NN.tif`; with them it becomes
/// `<prefix>_<suffixes[n - 1]>.tif`. Returns the new paths in channel order.
pub fn batch_rename(
    src_dir: &Path,
    dest_dir: &Path,
    pattern: &str,
    prefix: &str,
    suffixes: Option<&[String]>,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dest_dir)?;
    let full_pattern = format!("{}/{}", glob::Pattern::escape(&src_dir.to_string_lossy()), pattern);

    let mut renamed = Vec::new();
    for entry in glob::glob(&full_pattern)? {
        let file = entry.map_err(std::io::Error::from)?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let chn = channel_index(&name).ok_or_else(|| Error::InvalidFileName(name.clone()))?;

        let output_name = match suffixes {
            None => format!("{prefix}_{chn:02}.tif"),
            Some(names) => {
                let suffix = chn
                    .checked_sub(1)
                    .and_then(|i| names.get(i))
                    .ok_or_else(|| {
                        Error::InvalidFileName(format!("{name}: no channel name for channel {chn}"))
                    })?;
                format!("{prefix}_{suffix}.tif")
            }
        };
        let output = dest_dir.join(output_name);
        std::fs::rename(&file, &output)?;
        debug!(from = %file.display(), to = %output.display(), "renamed channel output");
        renamed.push((chn, output));
    }

    renamed.sort_by_key(|(chn, _)| *chn);
    Ok(renamed.into_iter().map(|(_, path)| path).collect())
}
