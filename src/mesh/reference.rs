//! A small self-contained [`PrimMesher`].
//!
//! Procedural prims are approximated by their unit box (six faces, numbered
//! like the box faces of a prim). Sculpt maps are tessellated as a single
//! surface face whose vertex positions come from the map's RGB values. Mesh
//! asset payloads are JSON-encoded [`Mesh`] documents.

use tracing::debug;

use crate::assets::image::DecodedImage;
use crate::mesh::{DetailLevel, Face, Mesh, PrimMesher, Vertex};
use crate::scene::Primitive;
use crate::types::{Vec2, Vec3};

#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceMesher;

/// Outward normal and the two in-plane axes of each box face.
const BOX_FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    (Vec3::X, Vec3::Y, Vec3::Z),
    (Vec3::Y, Vec3::NEG_X, Vec3::Z),
    (Vec3::NEG_X, Vec3::NEG_Y, Vec3::Z),
    (Vec3::NEG_Z, Vec3::X, Vec3::NEG_Y),
];

fn sculpt_resolution(detail: DetailLevel) -> u32 {
    match detail {
        DetailLevel::Low => 8,
        DetailLevel::Medium => 16,
        DetailLevel::High => 32,
        DetailLevel::Highest => 64,
    }
}

/// Two triangles per cell of a `(cols + 1) x (rows + 1)` vertex grid.
fn grid_indices(cols: u32, rows: u32) -> Vec<u32> {
    let stride = cols + 1;
    let mut indices = Vec::with_capacity((cols * rows * 6) as usize);
    for y in 0..rows {
        for x in 0..cols {
            let v = y * stride + x;
            indices.extend_from_slice(&[v, v + 1, v + stride, v + stride + 1, v + stride, v + 1]);
        }
    }
    indices
}

pub fn unit_box() -> Mesh {
    let faces = BOX_FACES
        .iter()
        .enumerate()
        .map(|(id, &(normal, u, v))| {
            let center = normal * 0.5;
            let vertices = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]
                .into_iter()
                .map(|(s, t)| Vertex {
                    position: center + u * (s - 0.5) + v * (t - 0.5),
                    normal,
                    tex_coord: Vec2::new(s, t),
                })
                .collect();
            Face {
                id,
                vertices,
                indices: grid_indices(1, 1),
            }
        })
        .collect();
    Mesh { faces }
}

impl PrimMesher for ReferenceMesher {
    fn faceted_mesh(&self, _prim: &Primitive, _detail: DetailLevel) -> Option<Mesh> {
        Some(unit_box())
    }

    fn sculpt_mesh(
        &self,
        _prim: &Primitive,
        sculpt: &DecodedImage,
        detail: DetailLevel,
    ) -> Option<Mesh> {
        if sculpt.width == 0 || sculpt.height == 0 {
            return None;
        }
        let cols = sculpt_resolution(detail).min(sculpt.width.max(2) - 1).max(1);
        let rows = sculpt_resolution(detail).min(sculpt.height.max(2) - 1).max(1);

        let mut vertices = Vec::with_capacity(((cols + 1) * (rows + 1)) as usize);
        for y in 0..=rows {
            for x in 0..=cols {
                let s = x as f32 / cols as f32;
                let t = y as f32 / rows as f32;
                let px = (s * (sculpt.width - 1) as f32).round() as u32;
                let py = (t * (sculpt.height - 1) as f32).round() as u32;
                let [r, g, b, _] = sculpt.pixel(px, py);
                vertices.push(Vertex {
                    position: Vec3::new(r as f32, g as f32, b as f32) / 255.0 - Vec3::splat(0.5),
                    normal: Vec3::ZERO,
                    tex_coord: Vec2::new(s, t),
                });
            }
        }

        Some(Mesh {
            faces: vec![Face {
                id: 0,
                vertices,
                indices: grid_indices(cols, rows),
            }],
        })
    }

    fn decode_mesh_asset(
        &self,
        prim: &Primitive,
        data: &[u8],
        _detail: DetailLevel,
    ) -> Option<Mesh> {
        match Mesh::from_json(data) {
            Ok(mesh) => Some(mesh),
            Err(e) => {
                debug!("bad mesh payload for prim {}: {e}", prim.local_id);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_has_six_quads() {
        let mesh = unit_box();
        assert_eq!(mesh.faces.len(), 6);
        for (i, face) in mesh.faces.iter().enumerate() {
            assert_eq!(face.id, i);
            assert_eq!(face.vertices.len(), 4);
            assert_eq!(face.triangle_count(), 2);
            for v in &face.vertices {
                assert!(v.position.abs().max_element() <= 0.5 + f32::EPSILON);
                assert!((v.position.dot(v.normal) - 0.5).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn sculpt_map_positions() {
        let sculpt = DecodedImage::solid(64, 64, [255, 0, 128, 255], false);
        let mesh = ReferenceMesher
            .sculpt_mesh(&Primitive::new(1, Vec3::ZERO), &sculpt, DetailLevel::Medium)
            .unwrap();
        let face = &mesh.faces[0];
        assert_eq!(face.vertices.len(), 17 * 17);
        assert_eq!(face.triangle_count(), 16 * 16 * 2);
        let p = face.vertices[0].position;
        assert!((p - Vec3::new(0.5, -0.5, 128.0 / 255.0 - 0.5)).length() < 1e-6);
    }

    #[test]
    fn tiny_sculpt_map_is_clamped() {
        let sculpt = DecodedImage::solid(1, 1, [0, 0, 0, 255], false);
        let mesh = ReferenceMesher
            .sculpt_mesh(&Primitive::new(1, Vec3::ZERO), &sculpt, DetailLevel::Highest)
            .unwrap();
        assert_eq!(mesh.faces[0].vertices.len(), 4);
        assert!(mesh.faces[0].triangles().flatten().all(|i| i < 4));
    }

    #[test]
    fn json_mesh_asset() {
        let json = br#"{"faces":[{"id":2,
            "vertices":[{"position":[0,0,0]},{"position":[1,0,0]},{"position":[0,1,0]}],
            "indices":[0,1,2]}]}"#;
        let mesh = ReferenceMesher
            .decode_mesh_asset(&Primitive::new(1, Vec3::ZERO), json, DetailLevel::Highest)
            .unwrap();
        assert_eq!(mesh.faces[0].id, 2);
        assert_eq!(mesh.faces[0].vertices[1].position, Vec3::X);
        assert!(
            ReferenceMesher
                .decode_mesh_asset(&Primitive::new(1, Vec3::ZERO), b"nope", DetailLevel::Highest)
                .is_none()
        );
    }
}
