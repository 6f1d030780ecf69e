//! World-space placement of primitives.

use std::collections::HashMap;

use tracing::warn;

use crate::scene::{LocalId, Primitive};
use crate::types::{Mat4, Quat, Vec3};

/// Scale, then rotate, then translate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldTransform {
    pub scale: Vec3,
    pub rotation: Quat,
    pub position: Vec3,
}

impl WorldTransform {
    pub fn local(prim: &Primitive) -> Self {
        Self {
            scale: prim.scale,
            rotation: prim.rotation,
            position: prim.position,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.matrix().transform_point3(p)
    }
}

/// Resolve a primitive's world transform.
///
/// Children inherit their root's rotation and position. A child whose root is
/// not in `roots` keeps its local pose.
pub fn world_transform(prim: &Primitive, roots: &HashMap<LocalId, Primitive>) -> WorldTransform {
    let mut xf = WorldTransform::local(prim);
    if prim.is_root() {
        return xf;
    }

    match roots.get(&prim.parent_id) {
        Some(parent) => {
            xf.rotation = parent.rotation * prim.rotation;
            xf.position = parent.position + parent.rotation * prim.position;
        }
        None => warn!(
            "root prim {} of prim {} not found, using local transform",
            prim.parent_id, prim.local_id
        ),
    }
    xf
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn root_uses_own_pose() {
        let mut prim = Primitive::new(1, Vec3::new(10.0, 20.0, 30.0));
        prim.scale = Vec3::new(2.0, 3.0, 4.0);
        prim.rotation = Quat::from_rotation_z(FRAC_PI_2);

        let xf = world_transform(&prim, &HashMap::new());
        assert_eq!(xf, WorldTransform::local(&prim));
        let composed = Mat4::from_translation(prim.position)
            * Mat4::from_quat(prim.rotation)
            * Mat4::from_scale(prim.scale);
        assert!(xf.matrix().abs_diff_eq(composed, 1e-5));

        // x axis is scaled to 2, rotated onto +y, then moved.
        let p = xf.transform_point(Vec3::X);
        assert!(approx(p, Vec3::new(10.0, 22.0, 30.0)));
    }

    #[test]
    fn child_composes_with_root() {
        let mut root = Primitive::new(1, Vec3::new(100.0, 0.0, 0.0));
        root.rotation = Quat::from_rotation_z(FRAC_PI_2);
        let mut child = Primitive::new(2, Vec3::new(1.0, 0.0, 0.0));
        child.parent_id = 1;
        child.rotation = Quat::from_rotation_x(FRAC_PI_2);

        let roots = HashMap::from([(1, root.clone())]);
        let xf = world_transform(&child, &roots);

        assert_eq!(xf.rotation, root.rotation * child.rotation);
        assert!(approx(xf.position, Vec3::new(100.0, 1.0, 0.0)));
        assert_eq!(xf.scale, child.scale);
    }

    #[test]
    fn missing_root_keeps_local_pose() {
        let mut child = Primitive::new(2, Vec3::new(1.0, 2.0, 3.0));
        child.parent_id = 9;
        let xf = world_transform(&child, &HashMap::new());
        assert_eq!(xf, WorldTransform::local(&child));
    }
}
