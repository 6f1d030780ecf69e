//! Faceted primitive meshes and strategy selection.
//!
//! The actual tessellation lives behind [`PrimMesher`]; [`MeshGenerator`]
//! decides which of its entry points applies to a primitive and fetches the
//! sculpt map or mesh asset it needs first.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::assets::image::DecodedImage;
use crate::assets::{AssetClient, AssetKind, FetchError};
use crate::error::IResult;
use crate::export::texture_cache::TextureColorCache;
use crate::scene::{Primitive, SculptKind};
use crate::types::{AssetId, Vec2, Vec3};

pub mod reference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DetailLevel {
    Low,
    Medium,
    High,
    Highest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub position: Vec3,
    #[serde(default)]
    pub normal: Vec3,
    #[serde(default)]
    pub tex_coord: Vec2,
}

/// One face of a faceted mesh. `indices` holds triangle triples referencing
/// `vertices`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Face {
    /// Face number used to look up the primitive's texture entry.
    pub id: usize,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Face {
    /// True when the face has nothing to draw: no vertices or not a single
    /// complete triangle.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.triangle_count() == 0
    }

    /// Complete triangles; a dangling partial triple is ignored.
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub faces: Vec<Face>,
}

impl Mesh {
    /// Parse a JSON mesh payload.
    pub fn from_json(data: &[u8]) -> IResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("mesh asset unavailable: {0}")]
    MeshAsset(FetchError),
    #[error("sculpt map {0} unavailable")]
    SculptMap(AssetId),
    #[error("could not decode mesh asset {0}")]
    Decode(AssetId),
    #[error("mesher produced no mesh for primitive {0}")]
    Generation(u32),
}

/// Tessellation engine for primitives.
pub trait PrimMesher {
    /// Mesh from the primitive's own shape parameters.
    fn faceted_mesh(&self, prim: &Primitive, detail: DetailLevel) -> Option<Mesh>;

    /// Mesh from a decoded sculpt map.
    fn sculpt_mesh(
        &self,
        prim: &Primitive,
        sculpt: &DecodedImage,
        detail: DetailLevel,
    ) -> Option<Mesh>;

    /// Decode a binary mesh asset payload.
    fn decode_mesh_asset(
        &self,
        prim: &Primitive,
        data: &[u8],
        detail: DetailLevel,
    ) -> Option<Mesh>;
}

/// Meshes the primitives of one export run.
pub struct MeshGenerator<'a> {
    mesher: &'a dyn PrimMesher,
    /// Mesh assets that could not be fetched this run.
    failed_assets: HashMap<AssetId, FetchError>,
}

impl<'a> MeshGenerator<'a> {
    pub fn new(mesher: &'a dyn PrimMesher) -> Self {
        Self {
            mesher,
            failed_assets: HashMap::new(),
        }
    }

    /// Build the mesh for `prim`.
    ///
    /// Mesh assets decode at the highest detail, sculpt maps tessellate at
    /// medium detail, and everything else is generated procedurally at the
    /// highest detail. Sculpt maps go through the texture cache so their mean
    /// color is recorded as a side effect. An asset that failed once is not
    /// requested again by this generator.
    pub fn generate(
        &mut self,
        prim: &Primitive,
        cache: &mut TextureColorCache,
        assets: &AssetClient<'_>,
    ) -> Result<Mesh, MeshError> {
        let mesh = match prim.active_sculpt() {
            Some(sculpt) if sculpt.kind == SculptKind::Mesh => {
                let data = self.fetch_mesh_asset(sculpt.texture, assets)?;
                debug!(
                    "decoding mesh asset {} ({} bytes) for prim {}",
                    sculpt.texture,
                    data.len(),
                    prim.local_id
                );
                self.mesher
                    .decode_mesh_asset(prim, &data, DetailLevel::Highest)
                    .ok_or(MeshError::Decode(sculpt.texture))?
            }
            Some(sculpt) => {
                let image = cache
                    .fetch_image(sculpt.texture, assets)
                    .ok_or(MeshError::SculptMap(sculpt.texture))?;
                self.mesher
                    .sculpt_mesh(prim, &image, DetailLevel::Medium)
                    .ok_or(MeshError::Generation(prim.local_id))?
            }
            None => self
                .mesher
                .faceted_mesh(prim, DetailLevel::Highest)
                .ok_or(MeshError::Generation(prim.local_id))?,
        };
        Ok(mesh)
    }

    fn fetch_mesh_asset(
        &mut self,
        id: AssetId,
        assets: &AssetClient<'_>,
    ) -> Result<Vec<u8>, MeshError> {
        if let Some(e) = self.failed_assets.get(&id) {
            return Err(MeshError::MeshAsset(e.clone()));
        }
        assets.fetch(id, AssetKind::Mesh).map_err(|e| {
            self.failed_assets.insert(id, e.clone());
            MeshError::MeshAsset(e)
        })
    }
}
