//! Live region state handed to the exporter: primitives and terrain patches.
//!
//! The network/session layer owns a [`Scene`] and keeps it up to date; the
//! exporter only ever reads it through [`Scene::snapshot`] and
//! [`Scene::heightfield`], each of which holds the relevant lock just long
//! enough to copy the data out.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::IResult;
use crate::terrain::{HeightField, TerrainPatch, TerrainTextureParams};
use crate::types::{AssetId, Color4, Quat, Vec3};

pub mod forest;
pub mod transform;

/// Region-local primitive identifier. `0` is reserved to mean "no parent".
pub type LocalId = u32;

/// Region identifier used to look a scene up from a [`SceneProvider`].
pub type RegionHandle = u64;

/// Object type code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PCode {
    #[default]
    Prim,
    Avatar,
    Grass,
    Tree,
    NewTree,
    ParticleSystem,
}

impl PCode {
    /// Only plain prims are turned into meshes.
    pub fn is_mesh_renderable(self) -> bool {
        matches!(self, PCode::Prim)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SculptKind {
    /// RGB sculpt map, each pixel encoding a surface position.
    Image,
    /// Reference to a precomputed binary mesh asset.
    Mesh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sculpt {
    pub texture: AssetId,
    pub kind: SculptKind,
}

/// Texture and tint applied to one face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureFace {
    #[serde(default)]
    pub texture: Option<AssetId>,
    #[serde(default)]
    pub rgba: Color4,
}

/// Per-primitive texture table: a default entry plus optional per-face overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextureEntry {
    #[serde(default)]
    pub default: Option<TextureFace>,
    /// Overrides indexed by face number; `None` falls back to `default`.
    #[serde(default)]
    pub faces: Vec<Option<TextureFace>>,
}

impl TextureEntry {
    pub fn face(&self, index: usize) -> Option<&TextureFace> {
        self.faces
            .get(index)
            .and_then(Option::as_ref)
            .or(self.default.as_ref())
    }

    /// Every texture referenced by this entry, default first, duplicates included.
    pub fn texture_ids(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.default
            .iter()
            .chain(self.faces.iter().flatten())
            .filter_map(|face| face.texture)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Primitive {
    pub local_id: LocalId,
    #[serde(default)]
    pub parent_id: LocalId,
    pub position: Vec3,
    #[serde(default = "identity_rotation")]
    pub rotation: Quat,
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
    #[serde(default)]
    pub sculpt: Option<Sculpt>,
    #[serde(default)]
    pub textures: Option<TextureEntry>,
    #[serde(default)]
    pub pcode: PCode,
}

fn identity_rotation() -> Quat {
    Quat::IDENTITY
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

impl Primitive {
    /// A renderable root prim at `position` with identity rotation and unit scale.
    pub fn new(local_id: LocalId, position: Vec3) -> Self {
        Self {
            local_id,
            parent_id: 0,
            position,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            sculpt: None,
            textures: None,
            pcode: PCode::Prim,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id == 0
    }

    /// Sculpt descriptor, ignoring ones that point at the zero asset.
    pub fn active_sculpt(&self) -> Option<&Sculpt> {
        self.sculpt.as_ref().filter(|s| !s.texture.is_zero())
    }

    pub fn texture_face(&self, index: usize) -> Option<&TextureFace> {
        self.textures.as_ref().and_then(|t| t.face(index))
    }
}

/// One region's primitives and terrain, shared with whatever keeps it current.
#[derive(Debug, Default)]
pub struct Scene {
    pub region_handle: RegionHandle,
    primitives: RwLock<Vec<Primitive>>,
    terrain: RwLock<Option<Vec<Option<TerrainPatch>>>>,
    pub terrain_textures: TerrainTextureParams,
}

impl Scene {
    pub fn new(region_handle: RegionHandle) -> Self {
        Self {
            region_handle,
            ..Default::default()
        }
    }

    pub fn add_primitive(&self, prim: Primitive) {
        self.primitives
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prim);
    }

    /// Copy of the primitive list taken under the read lock.
    pub fn snapshot(&self) -> Vec<Primitive> {
        self.primitives
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Store a terrain patch. Patches are numbered `row * 16 + column`.
    pub fn set_terrain_patch(&self, index: usize, patch: TerrainPatch) {
        let mut terrain = self.terrain.write().unwrap_or_else(PoisonError::into_inner);
        let patches = terrain.get_or_insert_with(|| vec![None; crate::terrain::PATCH_COUNT]);
        if let Some(slot) = patches.get_mut(index) {
            *slot = Some(patch);
        }
    }

    /// Assembled heightfield, or `None` if no terrain has been received yet.
    pub fn heightfield(&self) -> Option<HeightField> {
        self.terrain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .map(HeightField::from_patches)
    }
}

/// Looks up the scene for a region.
pub trait SceneProvider {
    fn scene(&self, region: RegionHandle) -> Option<Arc<Scene>>;
}

impl SceneProvider for HashMap<RegionHandle, Arc<Scene>> {
    fn scene(&self, region: RegionHandle) -> Option<Arc<Scene>> {
        self.get(&region).cloned()
    }
}

/// Serialized form of a [`Scene`], used to replay a captured region offline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub region_handle: RegionHandle,
    #[serde(default)]
    pub primitives: Vec<Primitive>,
    /// Patch grid, `row * 16 + column`; absent when no terrain was captured.
    #[serde(default)]
    pub terrain: Option<Vec<Option<TerrainPatch>>>,
    #[serde(default)]
    pub terrain_textures: TerrainTextureParams,
}

impl SceneSnapshot {
    pub fn from_json(data: &[u8]) -> IResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn into_scene(self) -> Scene {
        Scene {
            region_handle: self.region_handle,
            primitives: RwLock::new(self.primitives),
            terrain: RwLock::new(self.terrain),
            terrain_textures: self.terrain_textures,
        }
    }
}
