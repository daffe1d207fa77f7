//! Camera: view and projection matrices for the frame loop.

use glam::{Mat4, Quat, Vec3};

/// Projection type for the camera.
#[derive(Clone, Debug)]
pub enum Projection {
    /// Perspective projection
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    /// Orthographic projection
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

/// A camera for rendering the scene.
///
/// The frame loop updates the aspect ratio once per frame from the current
/// swapchain extent and reads the view/projection matrices when filling the
/// per-frame uniform buffer.
#[derive(Clone, Debug)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    /// Camera rotation
    pub rotation: Quat,
    /// Projection settings
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            rotation: Quat::IDENTITY,
            projection: Projection::Perspective {
                fov_y: 45.0_f32.to_radians(),
                aspect: 16.0 / 9.0,
                near: 0.1,
                far: 100.0,
            },
        }
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the perspective projection.
    pub fn set_perspective(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        self.projection = Projection::Perspective {
            fov_y,
            aspect,
            near,
            far,
        };
    }

    /// Update the aspect ratio (for perspective projection).
    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective {
            fov_y, near, far, ..
        } = self.projection
        {
            self.projection = Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            };
        }
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        let forward = self.rotation * Vec3::NEG_Z;
        let target = self.position + forward;
        Mat4::look_at_rh(self.position, target, Vec3::Y)
    }

    /// Get the projection matrix (with Vulkan Y-flip).
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = match self.projection {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(left, right, bottom, top, near, far),
        };
        // Flip Y for Vulkan's clip space
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Look at a target position.
    pub fn look_at(&mut self, target: Vec3) {
        let to_target = target - self.position;
        if to_target.length_squared() > 0.0 {
            self.rotation = Quat::from_rotation_arc(Vec3::NEG_Z, to_target.normalize());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_camera_looks_down_negative_z() {
        let camera = Camera::new();
        let view = camera.view_matrix();
        // A point in front of the camera lands in front in view space (-Z)
        let in_front = Vec3::new(0.0, 0.0, 0.0);
        let view_space = view.transform_point3(in_front);
        assert!(view_space.z < 0.0);
    }

    #[test]
    fn test_projection_flips_y_for_vulkan() {
        let camera = Camera::new();
        let proj = camera.projection_matrix();
        assert!(proj.y_axis.y < 0.0);
    }

    #[test]
    fn test_set_aspect_updates_perspective() {
        let mut camera = Camera::new();
        camera.set_aspect(2.0);
        match camera.projection {
            Projection::Perspective { aspect, .. } => assert_eq!(aspect, 2.0),
            _ => panic!("expected perspective projection"),
        }
    }

    #[test]
    fn test_look_at_faces_target() {
        let mut camera = Camera::new();
        camera.position = Vec3::new(0.0, 0.0, 10.0);
        camera.look_at(Vec3::ZERO);
        let forward = camera.rotation * Vec3::NEG_Z;
        assert!((forward - Vec3::NEG_Z).length() < 1e-5);
    }
}
