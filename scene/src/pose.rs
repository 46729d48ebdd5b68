#[cfg(test)]
#[path = "pose_test.rs"]
mod pose_test;

use glam::{Mat4, Quat, Vec3};

/// Decomposed parent-relative transform with every component filled in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self { position: Vec3::ZERO, rotation: Quat::IDENTITY, scale: Vec3::ONE };

    /// Fill absent wire fields with zero translation, identity rotation, unit scale.
    #[must_use]
    pub fn from_wire(transform: &wire::Transform) -> Self {
        Self {
            position: transform.position.map_or(Vec3::ZERO, vec3_from_wire),
            rotation: transform.rotation.map_or(Quat::IDENTITY, |q| Quat::from_xyzw(q.x, q.y, q.z, q.w)),
            scale: transform.scale.map_or(Vec3::ONE, vec3_from_wire),
        }
    }

    /// Wire form with every field present.
    #[must_use]
    pub fn to_wire(&self) -> wire::Transform {
        wire::Transform {
            position: Some(vec3_to_wire(self.position)),
            rotation: Some(wire::Quat::new(self.rotation.x, self.rotation.y, self.rotation.z, self.rotation.w)),
            scale: Some(vec3_to_wire(self.scale)),
        }
    }

    /// Translate · rotate · scale. A degenerate rotation is treated as identity.
    #[must_use]
    pub fn to_mat4(&self) -> Mat4 {
        let rotation = if self.rotation.length_squared() > f32::EPSILON {
            self.rotation.normalize()
        } else {
            Quat::IDENTITY
        };
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }

    /// Decompose an affine matrix. Shear is lost.
    #[must_use]
    pub fn from_mat4(matrix: &Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self { position, rotation, scale }
    }
}

fn vec3_from_wire(v: wire::Vec3) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn vec3_to_wire(v: Vec3) -> wire::Vec3 {
    wire::Vec3::new(v.x, v.y, v.z)
}

/// Length of the node's Y axis in universe space. Panels use this to
/// convert panel-local depth into universe distance.
#[must_use]
pub fn y_axis_scale(universe_from_node: &Mat4) -> f32 {
    universe_from_node.transform_vector3(Vec3::Y).length()
}
