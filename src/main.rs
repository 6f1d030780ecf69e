use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rootcause::prelude::*;

use povscene::ExportSummary;
use povscene::assets::dir::DirectoryFetcher;
use povscene::export::{
    CameraMode, DEFAULT_CACHE_FILE, ExportOptions, SceneExporter, scene_file_name,
};
use povscene::mesh::reference::ReferenceMesher;
use povscene::scene::SceneSnapshot;
use povscene::terrain::splat::HeightBandSplatter;

/// Export a captured region to a POV-Ray scene
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Output scene file. `.pov` is appended if missing; defaults to `sim.pov`
    output: Option<String>,

    /// Region snapshot (JSON) to export
    #[clap(short, long)]
    scene: PathBuf,

    /// Directory holding `<id>.png`, `<id>.jpg` and `<id>.mesh.json` assets.
    /// Defaults to the directory containing the snapshot
    #[clap(short, long)]
    assets: Option<PathBuf>,

    /// Texture color cache shared between exports
    #[clap(long, default_value = DEFAULT_CACHE_FILE)]
    cache: PathBuf,

    #[clap(long, value_enum, default_value_t)]
    camera: CameraMode,

    /// Seconds to wait for each asset before giving up on it
    #[clap(long, default_value_t = 30)]
    timeout_secs: u64,
}

fn run(args: Args) -> Result<(PathBuf, ExportSummary), Report> {
    let data = std::fs::read(&args.scene).context("Could not read scene snapshot")?;
    let snapshot = SceneSnapshot::from_json(&data).context("Invalid scene snapshot")?;
    let region = snapshot.region_handle;
    let scenes = HashMap::from([(region, Arc::new(snapshot.into_scene()))]);

    let assets_dir = args.assets.unwrap_or_else(|| {
        args.scene
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    });
    let options = ExportOptions::builder()
        .camera(args.camera)
        .cache_path(args.cache)
        .fetch_timeout(Duration::from_secs(args.timeout_secs))
        .build();

    let output = scene_file_name(args.output.as_deref());
    let mut exporter = SceneExporter::new(
        DirectoryFetcher::new(assets_dir),
        ReferenceMesher,
        HeightBandSplatter,
        options,
    );
    let summary = exporter
        .export_region(&scenes, region, &output)
        .context("Export failed")?;
    Ok((output, summary))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args) {
        Ok((output, summary)) => {
            println!("exported sim to file: {}", output.display());
            println!(
                "{} primitives, {} faces written, {} faces skipped, {} mesh failures",
                summary.primitives_exported,
                summary.faces_written,
                summary.faces_skipped,
                summary.mesh_failures
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error exporting sim: {e}");
            ExitCode::FAILURE
        }
    }
}
