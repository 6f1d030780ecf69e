//! Region export to a POV-Ray scene.
//!
//! [`SceneExporter`] owns the collaborators (asset fetcher, image codec,
//! mesher, terrain splatter) and the texture color cache, and drives one
//! export at a time:
//!
//! 1. camera and light header
//! 2. terrain block, plus the splatted ground texture written next to the scene
//! 3. snapshot and classification of the region's primitives
//! 4. one `mesh2` block per renderable face of every exportable primitive
//!
//! Asset problems only degrade the output: a texture that cannot be fetched
//! leaves faces with their raw tint, a mesh that cannot be built is skipped,
//! and missing terrain data skips the terrain block.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use image::RgbImage;
use rootcause::Report;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::assets::image::{DecodedImage, ImageCodec, RasterCodec};
use crate::assets::{AssetClient, AssetFetcher, DEFAULT_FETCH_TIMEOUT};
use crate::mesh::{MeshGenerator, PrimMesher};
use crate::scene::forest::collect;
use crate::scene::transform::world_transform;
use crate::scene::{RegionHandle, Scene, SceneProvider};
use crate::terrain::{self, TerrainError, TerrainMesh, TerrainSplatter};
use crate::types::Color4;

pub mod pov;
pub mod texture_cache;

pub use self::pov::CameraMode;
use self::texture_cache::{TextureColor, TextureColorCache};

pub const DEFAULT_SCENE_FILE: &str = "sim.pov";
pub const DEFAULT_CACHE_FILE: &str = "knownTextures.txt";
pub const DEFAULT_TERRAIN_SUFFIX: &str = "Terrain.png";
/// Region meters to scene units.
pub const DEFAULT_VERTEX_SCALE: f32 = 0.1;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no scene for region {0:#x}")]
    SceneNotFound(RegionHandle),
    #[error("could not create {path}: {reason}")]
    CreateOutput { path: String, reason: String },
    #[error("error writing scene: {0}")]
    Write(String),
}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Write(e.to_string())
    }
}

#[derive(Debug, Clone, Builder)]
pub struct ExportOptions {
    #[builder(default)]
    pub camera: CameraMode,
    #[builder(default = PathBuf::from(DEFAULT_CACHE_FILE), into)]
    pub cache_path: PathBuf,
    #[builder(default = DEFAULT_FETCH_TIMEOUT)]
    pub fetch_timeout: Duration,
    #[builder(default = DEFAULT_VERTEX_SCALE)]
    pub vertex_scale: f32,
    /// Appended to the scene file's base name to name the ground texture.
    #[builder(default = DEFAULT_TERRAIN_SUFFIX.to_string(), into)]
    pub terrain_suffix: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// What an export produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub terrain_written: bool,
    pub primitives_exported: usize,
    pub faces_written: usize,
    pub faces_skipped: usize,
    pub mesh_failures: usize,
    /// Records written to the texture cache file, if it was saved.
    pub cached_textures: Option<usize>,
}

/// Normalize a requested output name: default `sim.pov`, `.pov` appended if
/// missing.
pub fn scene_file_name(requested: Option<&str>) -> PathBuf {
    match requested {
        None | Some("") => PathBuf::from(DEFAULT_SCENE_FILE),
        Some(name) if name.ends_with(".pov") => PathBuf::from(name),
        Some(name) => PathBuf::from(format!("{name}.pov")),
    }
}

/// Side-car ground texture path: the scene path minus `.pov`, plus `suffix`.
pub fn terrain_texture_path(scene_file: &Path, suffix: &str) -> PathBuf {
    let name = scene_file.to_string_lossy();
    let base = name.strip_suffix(".pov").unwrap_or(&name);
    PathBuf::from(format!("{base}{suffix}"))
}

pub struct SceneExporter {
    fetcher: Box<dyn AssetFetcher>,
    codec: Box<dyn ImageCodec>,
    mesher: Box<dyn PrimMesher>,
    splatter: Box<dyn TerrainSplatter>,
    cache: TextureColorCache,
    options: ExportOptions,
}

impl SceneExporter {
    pub fn new(
        fetcher: impl AssetFetcher + 'static,
        mesher: impl PrimMesher + 'static,
        splatter: impl TerrainSplatter + 'static,
        options: ExportOptions,
    ) -> Self {
        Self {
            fetcher: Box::new(fetcher),
            codec: Box::new(RasterCodec),
            mesher: Box::new(mesher),
            splatter: Box::new(splatter),
            cache: TextureColorCache::new(),
            options,
        }
    }

    pub fn cache(&self) -> &TextureColorCache {
        &self.cache
    }

    /// Export `region` to `output` and update the texture cache file.
    ///
    /// Fails without writing anything if the region is unknown.
    pub fn export_region(
        &mut self,
        provider: &dyn SceneProvider,
        region: RegionHandle,
        output: &Path,
    ) -> Result<ExportSummary, Report<ExportError>> {
        let scene = provider
            .scene(region)
            .ok_or_else(|| Report::new(ExportError::SceneNotFound(region)))?;
        self.export_to_file(&scene, output)
    }

    /// Export `scene` to the file at `output`, writing the ground texture next
    /// to it. The texture cache is loaded first and merged and saved at the end.
    pub fn export_to_file(
        &mut self,
        scene: &Scene,
        output: &Path,
    ) -> Result<ExportSummary, Report<ExportError>> {
        debug!("povscene: file name {}", output.display());
        let cache_path = self.options.cache_path.clone();
        match self.cache.load(&cache_path) {
            Ok(n) => debug!("loaded {n} cached texture colors"),
            Err(e) => warn!("ignoring texture cache: {e}"),
        }

        let file = File::create(output).map_err(|e| {
            Report::new(ExportError::CreateOutput {
                path: output.display().to_string(),
                reason: e.to_string(),
            })
        })?;
        let mut writer = BufWriter::new(file);
        let texture_path = terrain_texture_path(output, &self.options.terrain_suffix);
        let result = self.export_scene(scene, &mut writer, Some(&texture_path));
        let flushed = writer
            .flush()
            .map_err(|e| Report::new(ExportError::from(e)));

        // Other exporters may have saved colors while this one was busy.
        let saved = match self.cache.reload_and_save(&cache_path) {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("could not save texture cache: {e}");
                None
            }
        };

        let mut summary = result?;
        flushed?;
        summary.cached_textures = saved;
        info!(
            "exported {} primitives ({} faces) to {}",
            summary.primitives_exported,
            summary.faces_written,
            output.display()
        );
        Ok(summary)
    }

    /// Write the scene description for `scene` to `out`.
    ///
    /// The ground texture is saved to `terrain_texture` when given; when it is
    /// not, the terrain block is still written but no texture is produced.
    pub fn export_scene<W: Write>(
        &mut self,
        scene: &Scene,
        out: &mut W,
        terrain_texture: Option<&Path>,
    ) -> Result<ExportSummary, Report<ExportError>> {
        let mut summary = ExportSummary::default();
        let assets = AssetClient::new(&*self.fetcher, &*self.codec, self.options.fetch_timeout);

        pov::write_header(out, self.options.camera).map_err(io_report)?;

        match build_terrain(scene, &mut self.cache, &assets, &*self.splatter) {
            Ok((mesh, texture)) => {
                if let Some(path) = terrain_texture {
                    if let Err(e) = texture.save(path) {
                        warn!("could not save terrain texture {}: {e}", path.display());
                    }
                }
                pov::write_terrain(out, &mesh, self.options.vertex_scale).map_err(io_report)?;
                summary.terrain_written = true;
            }
            Err(e) => warn!("skipping terrain: {e}"),
        }

        let collected = collect(scene, &mut self.cache, &assets);
        let mut generator = MeshGenerator::new(&*self.mesher);

        for prim in collected
            .exportable
            .iter()
            .filter(|p| p.pcode.is_mesh_renderable())
        {
            let mesh = match generator.generate(prim, &mut self.cache, &assets) {
                Ok(mesh) => mesh,
                Err(e) => {
                    warn!("prim {}: {e}", prim.local_id);
                    summary.mesh_failures += 1;
                    continue;
                }
            };
            let model = world_transform(prim, &collected.roots).matrix();

            for face in &mesh.faces {
                let Some(entry) = prim.texture_face(face.id) else {
                    summary.faces_skipped += 1;
                    continue;
                };
                if face.is_empty() {
                    summary.faces_skipped += 1;
                    continue;
                }
                let color = face_color(entry.rgba, entry.texture.and_then(|id| self.cache.get(id)));
                pov::write_face(out, face, &model, self.options.vertex_scale, color)
                    .map_err(io_report)?;
                summary.faces_written += 1;
            }
            summary.primitives_exported += 1;
        }

        Ok(summary)
    }
}

fn io_report(e: std::io::Error) -> Report<ExportError> {
    Report::new(ExportError::from(e))
}

/// Face tint, modulated by the texture's mean color when that is known.
pub fn face_color(tint: Color4, texture: Option<TextureColor>) -> Color4 {
    match texture {
        Some(TextureColor::Known(mean)) => tint * mean,
        _ => tint,
    }
}

fn build_terrain(
    scene: &Scene,
    cache: &mut TextureColorCache,
    assets: &AssetClient<'_>,
    splatter: &dyn TerrainSplatter,
) -> Result<(TerrainMesh, RgbImage), TerrainError> {
    let heights = scene.heightfield().ok_or(TerrainError::NoHeightField)?;
    debug!("terrain found");

    let params = &scene.terrain_textures;
    let mut detail: Vec<DecodedImage> = Vec::with_capacity(4);
    for (index, &id) in params.detail_textures.iter().enumerate() {
        let image = cache
            .fetch_image(id, assets)
            .ok_or(TerrainError::DetailTexture { index, id })?;
        detail.push(image);
    }
    let detail: [DecodedImage; 4] = detail
        .try_into()
        .map_err(|_| TerrainError::Splat)?;

    terrain::build_terrain(&heights, &detail, params, splatter)
}
