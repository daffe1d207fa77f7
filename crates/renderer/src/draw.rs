//! Draw submission over a collection of entities.
//!
//! [`DrawSubmitter`] owns the pipelines and pipeline layout for the object
//! pass. Per draw it writes the entity's uniform payload into the shared
//! dynamic buffer at a computed offset, binds the object descriptor set with
//! that dynamic offset, pushes the model/normal matrices, and issues the
//! entity's draw call.
//!
//! Pipeline selection is a tagged enum over a fixed-size array of
//! precompiled pipelines, toggled by external state (a debug key).

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use helio_rhi::buffer::Buffer;
use helio_rhi::descriptor::DescriptorSetLayout;
use helio_rhi::device::Device;
use helio_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use helio_rhi::shader::{Shader, ShaderStage};
use helio_rhi::vertex::Vertex;
use helio_rhi::{RhiError, RhiResult};
use helio_scene::Entities;

use crate::frame::FrameContext;
use crate::ubo::{ObjectUniform, PushConstants};

/// The fixed set of precompiled pipeline configurations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PipelineVariant {
    /// The standard shaded pipeline.
    #[default]
    Standard,
    /// The debug visualization pipeline.
    Debug,
}

impl PipelineVariant {
    /// Number of variants.
    pub const COUNT: usize = 2;

    /// Index into the pipeline array.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            PipelineVariant::Standard => 0,
            PipelineVariant::Debug => 1,
        }
    }

    /// The next variant in the cycle; used by the debug toggle key.
    pub fn cycled(self) -> Self {
        match self {
            PipelineVariant::Standard => PipelineVariant::Debug,
            PipelineVariant::Debug => PipelineVariant::Standard,
        }
    }
}

/// Computes the dynamic uniform offset for the draw at `index`.
///
/// The offset is `index * stride`, where the stride is the dynamic buffer's
/// aligned instance size. An offset whose instance region would extend past
/// `max_range` means the dynamic buffer was undersized relative to the
/// entity count: a capability mismatch, not a recoverable condition.
///
/// # Errors
///
/// Returns [`RhiError::UniformRangeExceeded`] when
/// `offset + stride > max_range` (a region starting exactly at `max_range`
/// is already over).
pub fn dynamic_offset(index: u64, stride: vk::DeviceSize, max_range: u32) -> RhiResult<u32> {
    let offset = index
        .checked_mul(stride)
        .filter(|offset| {
            offset
                .checked_add(stride)
                .is_some_and(|end| end <= u64::from(max_range))
        })
        .ok_or_else(|| RhiError::UniformRangeExceeded {
            offset: index.saturating_mul(stride).min(u64::from(u32::MAX)) as u32,
            max_range,
        })?;

    Ok(offset as u32)
}

/// Records draw calls for the object pass.
pub struct DrawSubmitter {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Pipeline layout shared by all variants.
    pipeline_layout: PipelineLayout,
    /// Precompiled pipelines, indexed by [`PipelineVariant`].
    pipelines: [Pipeline; PipelineVariant::COUNT],
}

impl DrawSubmitter {
    /// Creates the pipeline layout and both pipeline variants.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `render_pass` - The swapchain render pass the pipelines execute in
    /// * `global_layout` - Set 0: per-frame global uniforms
    /// * `object_layout` - Set 1: dynamic per-object uniforms
    ///
    /// # Errors
    ///
    /// Returns an error if shader loading or pipeline creation fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: vk::RenderPass,
        global_layout: &DescriptorSetLayout,
        object_layout: &DescriptorSetLayout,
    ) -> RhiResult<Self> {
        let push_constant_range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: PushConstants::SIZE as u32,
        };

        let set_layouts = [global_layout.handle(), object_layout.handle()];
        let pipeline_layout =
            PipelineLayout::new(device.clone(), &set_layouts, &[push_constant_range])?;

        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            Path::new("shaders/spirv/object.vert.spv"),
            ShaderStage::Vertex,
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            Path::new("shaders/spirv/object.frag.spv"),
            ShaderStage::Fragment,
        )?;
        let debug_fragment_shader = Shader::from_spirv_file(
            device.clone(),
            Path::new("shaders/spirv/object_debug.frag.spv"),
            ShaderStage::Fragment,
        )?;

        let standard = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .render_pass(render_pass)
            .build(device.clone(), &pipeline_layout)?;

        let debug = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&debug_fragment_shader)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .render_pass(render_pass)
            .build(device.clone(), &pipeline_layout)?;

        info!("Draw submitter pipelines created");

        Ok(Self {
            device,
            pipeline_layout,
            pipelines: [standard, debug],
        })
    }

    /// Records the object pass for every drawable entity.
    ///
    /// Per entity index `i`, writes the entity's [`ObjectUniform`] into
    /// `object_buffer` at instance `i`, flushes that instance, binds the
    /// object descriptor set with the corresponding dynamic offset, pushes
    /// the model/normal matrices, and draws the mesh. Entities without a
    /// mesh are skipped (they occupy no buffer instance).
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UniformRangeExceeded`] if an entity's offset
    /// falls outside the device's uniform range, meaning the dynamic buffer was
    /// undersized for the entity count. Buffer write failures propagate.
    pub fn render(
        &self,
        frame: &FrameContext<'_>,
        entities: &Entities,
        object_buffer: &Buffer,
        variant: PipelineVariant,
    ) -> RhiResult<()> {
        let cmd = frame.command_buffer;
        let max_range = self.device.limits().max_uniform_buffer_range;
        let stride = object_buffer.layout().alignment_size;

        self.pipelines[variant.index()].bind(cmd);

        let global_sets = [frame.global_descriptor_set];
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout.handle(),
                0,
                &global_sets,
                &[],
            );
        }

        let mut draw_index: u64 = 0;
        for entity in entities.iter() {
            let Some(mesh) = &entity.mesh else {
                continue;
            };

            let offset = dynamic_offset(draw_index, stride, max_range)?;

            let payload = ObjectUniform {
                texture_index: entity.texture_index,
            };
            object_buffer.write_at_index(bytemuck::bytes_of(&payload), draw_index)?;
            object_buffer.flush_index(draw_index)?;

            let push = PushConstants {
                model: entity.transform.matrix(),
                normal: entity.transform.normal_matrix(),
            };

            let object_sets = [frame.object_descriptor_set];
            let dynamic_offsets = [offset];
            unsafe {
                self.device.handle().cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipeline_layout.handle(),
                    1,
                    &object_sets,
                    &dynamic_offsets,
                );

                self.device.handle().cmd_push_constants(
                    cmd,
                    self.pipeline_layout.handle(),
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytemuck::bytes_of(&push),
                );
            }

            mesh.bind(cmd);
            mesh.draw(cmd);

            draw_index += 1;
        }

        debug!("Recorded {} draw(s)", draw_index);
        Ok(())
    }

    /// Returns the pipeline layout handle.
    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_offset_within_range() {
        // minUniformBufferOffsetAlignment=256, maxUniformBufferRange=1024:
        // indices 0..3 fit
        for index in 0..4u64 {
            assert_eq!(dynamic_offset(index, 256, 1024).unwrap(), index as u32 * 256);
        }
    }

    #[test]
    fn test_dynamic_offset_at_max_is_fatal() {
        // entityCount=5: index 4 computes offset 1024 == max, whose region
        // would end at 1280, past the range
        let err = dynamic_offset(4, 256, 1024);
        assert!(matches!(
            err,
            Err(RhiError::UniformRangeExceeded {
                offset: 1024,
                max_range: 1024
            })
        ));
    }

    #[test]
    fn test_dynamic_offset_past_max_is_fatal() {
        let err = dynamic_offset(8, 256, 1024);
        assert!(matches!(
            err,
            Err(RhiError::UniformRangeExceeded {
                offset: 2048,
                max_range: 1024
            })
        ));
    }

    #[test]
    fn test_dynamic_offset_overflow_is_fatal() {
        assert!(dynamic_offset(u64::MAX / 2, 256, u32::MAX).is_err());
    }

    #[test]
    fn test_variant_indices_are_dense() {
        assert_eq!(PipelineVariant::Standard.index(), 0);
        assert_eq!(PipelineVariant::Debug.index(), 1);
        assert!(PipelineVariant::Standard.index() < PipelineVariant::COUNT);
        assert!(PipelineVariant::Debug.index() < PipelineVariant::COUNT);
    }

    #[test]
    fn test_variant_cycle_returns_home() {
        let start = PipelineVariant::Standard;
        assert_eq!(start.cycled(), PipelineVariant::Debug);
        assert_eq!(start.cycled().cycled(), start);
    }
}
