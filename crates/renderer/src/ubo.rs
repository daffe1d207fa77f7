//! Uniform buffer and push constant layouts.
//!
//! These structures must match the GLSL block layouts exactly. All use
//! `#[repr(C)]` and implement `Pod`/`Zeroable` for byte casting into mapped
//! uniform memory.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Per-frame global uniform data (set 0, binding 0).
///
/// One instance per frame in flight, written at the frame's index before
/// recording and flushed from the host-visible buffer.
///
/// # Memory Layout
///
/// - Offset 0: projection matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Offset 128: ambient light color, rgb + intensity in w (16 bytes)
/// - Offset 144: light position, xyz (16 bytes)
/// - Offset 160: light color, rgb + intensity in w (16 bytes)
/// - Total size: 176 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GlobalUbo {
    /// Projection matrix (view to clip space).
    pub projection: Mat4,
    /// View matrix (world to view space).
    pub view: Mat4,
    /// Ambient light color with intensity in the w component.
    pub ambient_light_color: Vec4,
    /// Point light position (w unused).
    pub light_position: Vec4,
    /// Point light color with intensity in the w component.
    pub light_color: Vec4,
}

impl GlobalUbo {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates a global UBO from camera matrices with the default lights.
    pub fn new(projection: Mat4, view: Mat4) -> Self {
        Self {
            projection,
            view,
            ..Default::default()
        }
    }
}

impl Default for GlobalUbo {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            ambient_light_color: Vec4::new(1.0, 1.0, 1.0, 0.04),
            light_position: Vec4::new(5.0, -1.0, 2.8, 0.0),
            light_color: Vec4::new(1.0, 1.0, 1.0, 1.0),
        }
    }
}

/// Per-draw uniform data written at a dynamic offset (set 1, binding 0).
///
/// One instance per entity in the shared dynamic buffer; the draw submitter
/// binds the set with `entity index * instance alignment` as the dynamic
/// offset.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ObjectUniform {
    /// Texture/material index sampled by the fragment shader.
    pub texture_index: i32,
}

impl ObjectUniform {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Per-draw push constant data.
///
/// Pushed inline for every draw; the 128-byte size matches the minimum
/// push-constant budget Vulkan guarantees, so this must not grow.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PushConstants {
    /// Model matrix (object to world space).
    pub model: Mat4,
    /// Normal matrix (transpose of the inverse of the model matrix).
    pub normal: Mat4,
}

impl PushConstants {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_global_ubo_size() {
        // 2 Mat4 (128) + 3 Vec4 (48)
        assert_eq!(GlobalUbo::SIZE, 176);
    }

    #[test]
    fn test_global_ubo_field_offsets() {
        assert_eq!(std::mem::offset_of!(GlobalUbo, projection), 0);
        assert_eq!(std::mem::offset_of!(GlobalUbo, view), 64);
        assert_eq!(std::mem::offset_of!(GlobalUbo, ambient_light_color), 128);
        assert_eq!(std::mem::offset_of!(GlobalUbo, light_position), 144);
        assert_eq!(std::mem::offset_of!(GlobalUbo, light_color), 160);
    }

    #[test]
    fn test_push_constants_fit_minimum_budget() {
        // maxPushConstantsSize is at least 128 on every conforming device
        assert_eq!(PushConstants::SIZE, 128);
    }

    #[test]
    fn test_object_uniform_size() {
        assert_eq!(ObjectUniform::SIZE, 4);
    }

    #[test]
    fn test_ubo_byte_casting() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let ubo = GlobalUbo::new(Mat4::IDENTITY, view);
        let bytes = bytemuck::bytes_of(&ubo);
        assert_eq!(bytes.len(), GlobalUbo::SIZE);

        let object = ObjectUniform { texture_index: 7 };
        let bytes = bytemuck::bytes_of(&object);
        assert_eq!(i32::from_ne_bytes(bytes.try_into().unwrap()), 7);
    }
}
