//! POV-Ray scene text.
//!
//! Region coordinates are z-up; POV-Ray is y-up, so every vector is written as
//! `<x, z, y>`. Non-finite components are written as `0`.

use std::io::{self, Write};

use crate::mesh::Face;
use crate::terrain::TerrainMesh;
use crate::types::{Color4, Mat4, Vec3};

/// Camera placement written at the top of the scene.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "bin", derive(clap::ValueEnum))]
pub enum CameraMode {
    /// Straight down over the region center, map-tile style.
    #[default]
    Orthographic,
    Perspective,
}

/// Flat green used for the ground.
pub const TERRAIN_COLOR: Color4 = Color4::new(0.15, 0.5, 0.1, 1.0);

fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() { v } else { 0.0 }
}

pub fn coordinate_format(x: f32, y: f32, z: f32) -> String {
    format!(
        "<{},{},{}>",
        finite_or_zero(x),
        finite_or_zero(z),
        finite_or_zero(y)
    )
}

pub fn pov_vector(v: Vec3) -> String {
    coordinate_format(v.x, v.y, v.z)
}

/// `rgbf` pigment; POV-Ray filter is the inverse of alpha.
pub fn pigment(c: Color4) -> String {
    format!("pigment {{rgbf <{},{},{},{}>}}", c.r, c.g, c.b, 1.0 - c.a)
}

pub fn write_header(w: &mut impl Write, camera: CameraMode) -> io::Result<()> {
    writeln!(w, "#include \"colors.inc\"")?;
    writeln!(w, "camera")?;
    writeln!(w, "{{")?;
    match camera {
        CameraMode::Orthographic => {
            writeln!(w, "orthographic angle 40")?;
            writeln!(w, "location <12.8, 35, 12.8>")?;
            writeln!(w, "look_at <12.8, 0, 12.8>")?;
            writeln!(w, "right x * image_width / image_height")?;
        }
        CameraMode::Perspective => {
            writeln!(w, "location <12.5, 12, -15>")?;
            writeln!(w, "look_at  <12.5, 5,  5>")?;
        }
    }
    writeln!(w, "}}")?;
    writeln!(w, "light_source {{ <-9, 284, -8> color White}}")
}

pub fn write_terrain(w: &mut impl Write, mesh: &TerrainMesh, scale: f32) -> io::Result<()> {
    writeln!(w, "mesh2 // terrain")?;
    writeln!(w, "{{")?;

    writeln!(w, "vertex_vectors")?;
    writeln!(w, "{{")?;
    writeln!(w, "{}", mesh.positions.len())?;
    for p in &mesh.positions {
        writeln!(w, "{}", pov_vector(*p * scale))?;
    }
    writeln!(w, "}}")?;

    writeln!(w, "uv_vectors")?;
    writeln!(w, "{{")?;
    writeln!(w, "{}", mesh.uvs.len())?;
    for uv in &mesh.uvs {
        writeln!(w, "<{},{}>", uv.x, uv.y)?;
    }
    writeln!(w, "}}")?;

    writeln!(w, "face_indices")?;
    writeln!(w, "{{")?;
    writeln!(w, "{}", mesh.triangles.len())?;
    for [a, b, c] in &mesh.triangles {
        writeln!(w, "<{a},{b},{c}>")?;
    }
    writeln!(w, "}}")?;

    writeln!(w, "{}", pigment(TERRAIN_COLOR))?;
    writeln!(w, "}} // terrain")
}

/// One `mesh2` block for a face, vertices moved by `model` then scaled.
pub fn write_face(
    w: &mut impl Write,
    face: &Face,
    model: &Mat4,
    scale: f32,
    color: Color4,
) -> io::Result<()> {
    writeln!(w, "mesh2")?;
    writeln!(w, "{{")?;

    writeln!(w, "vertex_vectors")?;
    writeln!(w, "{{")?;
    writeln!(w, "{}", face.vertices.len())?;
    for v in &face.vertices {
        writeln!(w, "{}", pov_vector(model.transform_point3(v.position) * scale))?;
    }
    writeln!(w, "}}")?;

    writeln!(w, "face_indices")?;
    writeln!(w, "{{")?;
    writeln!(w, "{}", face.triangle_count())?;
    for [a, b, c] in face.triangles() {
        writeln!(w, "<{a},{b},{c}>")?;
    }
    writeln!(w, "}}")?;

    writeln!(w, "{}", pigment(color))?;
    writeln!(w, "}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Vertex;
    use crate::types::Vec2;

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn coordinates_swap_y_and_z() {
        assert_eq!(coordinate_format(1.0, 2.0, 3.0), "<1,3,2>");
        assert_eq!(coordinate_format(0.5, -1.25, 0.0), "<0.5,0,-1.25>");
    }

    #[test]
    fn non_finite_coordinates_become_zero() {
        assert_eq!(coordinate_format(f32::NAN, 2.0, 3.0), "<0,3,2>");
        assert_eq!(coordinate_format(1.0, f32::INFINITY, 3.0), "<1,3,0>");
        assert_eq!(coordinate_format(1.0, 2.0, f32::NEG_INFINITY), "<1,0,2>");
    }

    #[test]
    fn pigment_filter_is_inverse_alpha() {
        assert_eq!(
            pigment(Color4::new(1.0, 0.5, 0.25, 1.0)),
            "pigment {rgbf <1,0.5,0.25,0>}"
        );
        assert_eq!(
            pigment(Color4::new(0.0, 0.0, 0.0, 0.25)),
            "pigment {rgbf <0,0,0,0.75>}"
        );
    }

    #[test]
    fn header_camera_modes() {
        let ortho = render(|w| write_header(w, CameraMode::Orthographic));
        assert!(ortho.starts_with("#include \"colors.inc\"\ncamera\n{\northographic angle 40\n"));
        assert!(ortho.ends_with("light_source { <-9, 284, -8> color White}\n"));

        let persp = render(|w| write_header(w, CameraMode::Perspective));
        assert!(!persp.contains("orthographic"));
        assert!(persp.contains("location <12.5, 12, -15>"));
    }

    #[test]
    fn face_block_layout() {
        let face = Face {
            id: 0,
            vertices: [Vec3::ZERO, Vec3::X, Vec3::Y]
                .into_iter()
                .map(|position| Vertex {
                    position,
                    normal: Vec3::Z,
                    tex_coord: Vec2::ZERO,
                })
                .collect(),
            indices: vec![0, 1, 2],
        };
        let model = Mat4::from_translation(Vec3::new(10.0, 20.0, 30.0));
        let text = render(|w| write_face(w, &face, &model, 0.1, Color4::new(1.0, 0.0, 0.0, 1.0)));
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "mesh2");
        assert_eq!(lines[4], "3");
        assert_eq!(lines[5], "<1,3,2>");
        assert_eq!(lines[11], "1");
        assert_eq!(lines[12], "<0,1,2>");
        assert_eq!(lines[14], "pigment {rgbf <1,0,0,0>}");
        assert_eq!(*lines.last().unwrap(), "}");
    }
}
