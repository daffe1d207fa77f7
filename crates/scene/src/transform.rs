//! Entity transforms.

use glam::{EulerRot, Mat4, Vec3};

/// Translation, rotation, and scale of an entity.
///
/// Rotations are Tait-Bryan angles applied in Y, X, Z order, so the model
/// matrix corresponds to `Translate * Ry * Rx * Rz * Scale`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Position in world space.
    pub translation: Vec3,
    /// Euler angles in radians (applied Y, then X, then Z).
    pub rotation: Vec3,
    /// Per-axis scale.
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Creates a transform at `translation` with no rotation and unit scale.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Model matrix: `Translate * Ry * Rx * Rz * Scale`.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_translation(self.translation)
            * Mat4::from_euler(
                EulerRot::YXZ,
                self.rotation.y,
                self.rotation.x,
                self.rotation.z,
            )
            * Mat4::from_scale(self.scale)
    }

    /// Normal matrix for transforming surface normals into world space.
    ///
    /// The transpose of the inverse of the model matrix; shaders consume its
    /// upper-left 3x3. Translation does not affect it.
    pub fn normal_matrix(&self) -> Mat4 {
        self.matrix().inverse().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mats_close(a: Mat4, b: Mat4) -> bool {
        a.to_cols_array()
            .iter()
            .zip(b.to_cols_array())
            .all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_identity_transform() {
        let transform = Transform::default();
        assert!(mats_close(transform.matrix(), Mat4::IDENTITY));
        assert!(mats_close(transform.normal_matrix(), Mat4::IDENTITY));
    }

    #[test]
    fn test_translation_moves_points() {
        let transform = Transform::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let moved = transform.matrix().transform_point3(Vec3::ZERO);
        assert!((moved - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn test_normal_matrix_ignores_translation() {
        let still = Transform {
            rotation: Vec3::new(0.3, 1.1, -0.4),
            scale: Vec3::new(2.0, 0.5, 1.5),
            ..Default::default()
        };
        let moved = Transform {
            translation: Vec3::new(10.0, -4.0, 2.0),
            ..still
        };
        // The upper-left 3x3 is what shaders consume
        let a = still.normal_matrix();
        let b = moved.normal_matrix();
        for col in 0..3 {
            let diff = a.col(col).truncate() - b.col(col).truncate();
            assert!(diff.length() < 1e-5);
        }
    }

    #[test]
    fn test_normal_matrix_of_pure_rotation_is_rotation() {
        let transform = Transform {
            rotation: Vec3::new(0.2, 0.7, 1.3),
            ..Default::default()
        };
        assert!(mats_close(transform.normal_matrix(), transform.matrix()));
    }
}
