//! Render state: GPU resources and the per-frame protocol.
//!
//! Assembles the rendering core around a window: the frame orchestrator,
//! the per-frame uniform buffers and descriptor sets, the draw submitter,
//! and the scene. Field order encodes teardown order: GPU resources are
//! declared (and therefore dropped) before the orchestrator, which owns the
//! device and instance; the `Drop` impl waits for the GPU to go idle before
//! any of that happens.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use glam::Vec3;
use gpu_allocator::MemoryLocation;
use tracing::info;

use helio_platform::InputState;
use helio_render::draw::{DrawSubmitter, PipelineVariant};
use helio_render::frame::FrameContext;
use helio_render::orchestrator::FrameOrchestrator;
use helio_render::ubo::{GlobalUbo, ObjectUniform};
use helio_render::MAX_FRAMES_IN_FLIGHT;
use helio_rhi::buffer::{Buffer, BufferUsage};
use helio_rhi::descriptor::{
    DescriptorKind, DescriptorPool, DescriptorSetLayout, DescriptorSetWriter,
};
use helio_rhi::mesh::Mesh;
use helio_rhi::vk;
use helio_scene::{Camera, Entities, Transform};

use crate::PIPELINE_TOGGLE_KEY;
use crate::cube::cube_geometry;

/// Entity grid dimensions.
const GRID: (i32, i32, i32) = (4, 4, 4);
/// Spacing between grid entities.
const GRID_SPACING: f32 = 1.6;
/// Capacity of the per-frame dynamic object buffer, in draws.
const OBJECT_CAPACITY: u64 = (GRID.0 * GRID.1 * GRID.2) as u64;

/// Everything the frame loop needs, wired together.
pub struct RenderState {
    // GPU resources first: they must be released before the orchestrator
    // below tears down the device and instance.
    entities: Entities,
    global_buffer: Buffer,
    object_buffers: Vec<Buffer>,
    global_sets: Vec<vk::DescriptorSet>,
    object_sets: Vec<vk::DescriptorSet>,
    descriptor_pool: DescriptorPool,
    global_layout: DescriptorSetLayout,
    object_layout: DescriptorSetLayout,
    draw_submitter: DrawSubmitter,
    camera: Camera,
    variant: PipelineVariant,
    // Owns instance, device, surface, swapchain; dropped last.
    orchestrator: FrameOrchestrator,
}

impl RenderState {
    /// Builds the rendering core and the demo scene for a window.
    pub fn new(window: &helio_platform::Window) -> Result<Self> {
        let orchestrator = FrameOrchestrator::new(window).context("initializing rendering core")?;
        let device = orchestrator.device().clone();
        let limits = *device.limits();

        // Indexed uniform regions must satisfy both the offset alignment and
        // the flush granularity
        let uniform_alignment = limits.uniform_atom_alignment();

        let mut global_buffer = Buffer::new_aligned(
            device.clone(),
            GlobalUbo::SIZE as u64,
            MAX_FRAMES_IN_FLIGHT as u64,
            BufferUsage::Uniform,
            MemoryLocation::CpuToGpu,
            uniform_alignment,
        )
        .context("creating global uniform buffer")?;
        global_buffer.map()?;

        let mut object_buffers = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            let mut buffer = Buffer::new_aligned(
                device.clone(),
                ObjectUniform::SIZE as u64,
                OBJECT_CAPACITY,
                BufferUsage::Uniform,
                MemoryLocation::CpuToGpu,
                uniform_alignment,
            )
            .context("creating per-object uniform buffer")?;
            buffer.map()?;
            object_buffers.push(buffer);
        }

        let global_layout = DescriptorSetLayout::builder()
            .add_binding(
                0,
                DescriptorKind::UniformBuffer,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )?
            .build(device.clone())?;

        let object_layout = DescriptorSetLayout::builder()
            .add_binding(
                0,
                DescriptorKind::UniformBufferDynamic,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )?
            .build(device.clone())?;

        let descriptor_pool = DescriptorPool::builder()
            .add_pool_size(DescriptorKind::UniformBuffer, MAX_FRAMES_IN_FLIGHT as u32)
            .add_pool_size(
                DescriptorKind::UniformBufferDynamic,
                MAX_FRAMES_IN_FLIGHT as u32,
            )
            .set_max_sets(2 * MAX_FRAMES_IN_FLIGHT as u32)
            .build(device.clone())?;

        // One global set per frame slot, each pointing at its region of the
        // global buffer; one dynamic object set per frame slot, pointing at
        // instance 0 of that slot's object buffer (the draw-time dynamic
        // offset selects the instance)
        let mut global_sets = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut object_sets = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for frame in 0..MAX_FRAMES_IN_FLIGHT {
            let global_set = DescriptorSetWriter::new(&global_layout, &descriptor_pool)
                .write_buffer(0, global_buffer.descriptor_info_at(frame as u64))?
                .build()?
                .ok_or_else(|| anyhow!("descriptor pool exhausted for global set {}", frame))?;
            global_sets.push(global_set);

            let object_set = DescriptorSetWriter::new(&object_layout, &descriptor_pool)
                .write_buffer(0, object_buffers[frame].descriptor_info_at(0))?
                .build()?
                .ok_or_else(|| anyhow!("descriptor pool exhausted for object set {}", frame))?;
            object_sets.push(object_set);
        }

        let draw_submitter = DrawSubmitter::new(
            device.clone(),
            orchestrator.render_pass(),
            &global_layout,
            &object_layout,
        )
        .context("creating draw submitter")?;

        // Demo scene: a grid of cubes sharing one mesh
        let (vertices, indices) = cube_geometry();
        let cube = Arc::new(Mesh::new(device.clone(), &vertices, &indices)?);

        let mut entities = Entities::new();
        for x in 0..GRID.0 {
            for y in 0..GRID.1 {
                for z in 0..GRID.2 {
                    let translation = Vec3::new(
                        (x - GRID.0 / 2) as f32 * GRID_SPACING,
                        (y - GRID.1 / 2) as f32 * GRID_SPACING,
                        (z - GRID.2 / 2) as f32 * GRID_SPACING,
                    );
                    let mut transform = Transform::from_translation(translation);
                    transform.scale = Vec3::splat(0.5);
                    entities.spawn(Some(cube.clone()), transform, (x + y + z) % 4);
                }
            }
        }
        info!("Spawned {} entities", entities.len());

        let mut camera = Camera::new();
        camera.position = Vec3::new(6.0, 4.0, 10.0);
        camera.look_at(Vec3::ZERO);
        camera.set_perspective(
            50.0_f32.to_radians(),
            orchestrator.aspect_ratio(),
            0.1,
            100.0,
        );

        Ok(Self {
            entities,
            global_buffer,
            object_buffers,
            global_sets,
            object_sets,
            descriptor_pool,
            global_layout,
            object_layout,
            draw_submitter,
            camera,
            variant: PipelineVariant::Standard,
            orchestrator,
        })
    }

    /// Forwards a window resize to the orchestrator.
    pub fn handle_resize(&mut self, width: u32, height: u32) {
        self.orchestrator.handle_resize(width, height);
    }

    /// Applies input and time to the scene.
    pub fn update(&mut self, input: &InputState, delta: f32) {
        if input.is_key_just_pressed(PIPELINE_TOGGLE_KEY) {
            self.variant = self.variant.cycled();
            info!("Pipeline variant: {:?}", self.variant);
        }

        for entity in self.entities.iter_mut() {
            entity.transform.rotation.y += 0.6 * delta;
            entity.transform.rotation.x += 0.25 * delta;
        }
    }

    /// Records and presents one frame.
    ///
    /// Skips cleanly when the orchestrator reports a swapchain rebuild.
    pub fn draw_frame(&mut self, delta: f32) -> Result<()> {
        // Aspect ratio follows the swapchain, which follows the window
        self.camera.set_aspect(self.orchestrator.aspect_ratio());

        let Some(cmd) = self.orchestrator.begin_frame()? else {
            return Ok(());
        };

        let frame_index = self.orchestrator.frame_index();

        let ubo = GlobalUbo::new(self.camera.projection_matrix(), self.camera.view_matrix());
        self.global_buffer
            .write_at_index(bytemuck::bytes_of(&ubo), frame_index as u64)?;
        self.global_buffer.flush_index(frame_index as u64)?;

        let frame = FrameContext {
            frame_index,
            frame_time: delta,
            command_buffer: cmd,
            camera: &self.camera,
            global_descriptor_set: self.global_sets[frame_index],
            object_descriptor_set: self.object_sets[frame_index],
        };

        self.orchestrator.begin_render_pass(cmd);
        self.draw_submitter.render(
            &frame,
            &self.entities,
            &self.object_buffers[frame_index],
            self.variant,
        )?;
        self.orchestrator.end_render_pass(cmd);
        self.orchestrator.end_frame()?;

        Ok(())
    }
}

impl Drop for RenderState {
    fn drop(&mut self) {
        // All in-flight frames must finish before buffers and descriptor
        // objects are released below
        if let Err(e) = self.orchestrator.device().wait_idle() {
            tracing::error!("Failed to wait for device idle during shutdown: {:?}", e);
        }
    }
}
