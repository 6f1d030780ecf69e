//! Region terrain: heightfield assembly and ground mesh generation.
//!
//! A region is 256 x 256 samples, delivered as a 16 x 16 grid of patches of
//! 16 x 16 samples each. Patch `n` covers columns `(n % 16) * 16..` and rows
//! `(n / 16) * 16..`; within a patch samples are stored row-major.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assets::image::DecodedImage;
use crate::types::{AssetId, Vec2, Vec3};

pub mod splat;

pub const REGION_WIDTH: usize = 256;
pub const PATCH_SIZE: usize = 16;
pub const PATCHES_PER_EDGE: usize = REGION_WIDTH / PATCH_SIZE;
pub const PATCH_COUNT: usize = PATCHES_PER_EDGE * PATCHES_PER_EDGE;

#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("no terrain heightfield for this region")]
    NoHeightField,
    #[error("terrain detail texture {index} ({id}) unavailable")]
    DetailTexture { index: usize, id: AssetId },
    #[error("terrain splatting produced no texture")]
    Splat,
}

/// One 16 x 16 block of elevation samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainPatch {
    pub data: Vec<f32>,
}

impl TerrainPatch {
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }
}

/// Detail textures and per-corner elevation bands used to color the ground.
///
/// Corner arrays are ordered `[00, 01, 10, 11]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerrainTextureParams {
    pub detail_textures: [AssetId; 4],
    pub start_heights: [f32; 4],
    pub height_ranges: [f32; 4],
}

/// 256 x 256 elevation grid, row-major (`y * 256 + x`).
#[derive(Debug, Clone, PartialEq)]
pub struct HeightField {
    samples: Vec<f32>,
}

impl Default for HeightField {
    fn default() -> Self {
        Self::flat(0.0)
    }
}

impl HeightField {
    pub fn flat(z: f32) -> Self {
        Self {
            samples: vec![z; REGION_WIDTH * REGION_WIDTH],
        }
    }

    /// Assemble from a patch grid. Missing or short patches read as zero.
    pub fn from_patches(patches: &[Option<TerrainPatch>]) -> Self {
        let mut hf = Self::flat(0.0);
        for y in 0..REGION_WIDTH {
            for x in 0..REGION_WIDTH {
                let patch = (y / PATCH_SIZE) * PATCHES_PER_EDGE + x / PATCH_SIZE;
                let sample = (y % PATCH_SIZE) * PATCH_SIZE + x % PATCH_SIZE;
                if let Some(z) = patches
                    .get(patch)
                    .and_then(Option::as_ref)
                    .and_then(|p| p.data.get(sample))
                {
                    hf.samples[y * REGION_WIDTH + x] = *z;
                }
            }
        }
        hf
    }

    pub fn width(&self) -> usize {
        REGION_WIDTH
    }

    pub fn height(&self) -> usize {
        REGION_WIDTH
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.samples[y * REGION_WIDTH + x]
    }

    pub fn set(&mut self, x: usize, y: usize, z: f32) {
        self.samples[y * REGION_WIDTH + x] = z;
    }
}

/// Ground mesh in region coordinates: x/y on the grid, z up.
#[derive(Debug, Clone)]
pub struct TerrainMesh {
    pub positions: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub triangles: Vec<[u32; 3]>,
}

/// One vertex per sample, two triangles per grid cell.
pub fn build_terrain_mesh(hf: &HeightField) -> TerrainMesh {
    let width = hf.width();
    let height = hf.height();
    let mut positions = Vec::with_capacity(width * height);
    let mut uvs = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            positions.push(Vec3::new(x as f32, y as f32, hf.get(x, y)));
            uvs.push(Vec2::new(x as f32 / 255.0, y as f32 / 255.0));
        }
    }

    let w = width as u32;
    let mut triangles = Vec::with_capacity((width - 1) * (height - 1) * 2);
    for y in 0..height as u32 - 1 {
        for x in 0..w - 1 {
            let v = y * w + x;
            triangles.push([v, v + 1, v + w]);
            triangles.push([v + w + 1, v + w, v + 1]);
        }
    }

    TerrainMesh {
        positions,
        uvs,
        triangles,
    }
}

/// Blends detail textures into a ground color texture.
pub trait TerrainSplatter {
    fn splat(
        &self,
        heights: &HeightField,
        detail: &[DecodedImage; 4],
        start_heights: &[f32; 4],
        height_ranges: &[f32; 4],
    ) -> Option<RgbImage>;
}

/// Build the ground mesh and its color texture.
pub fn build_terrain(
    hf: &HeightField,
    detail: &[DecodedImage; 4],
    params: &TerrainTextureParams,
    splatter: &dyn TerrainSplatter,
) -> Result<(TerrainMesh, RgbImage), TerrainError> {
    let texture = splatter
        .splat(hf, detail, &params.start_heights, &params.height_ranges)
        .ok_or(TerrainError::Splat)?;
    Ok((build_terrain_mesh(hf), texture))
}
