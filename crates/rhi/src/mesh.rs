//! Mesh GPU resources.
//!
//! A [`Mesh`] owns device-local vertex and index buffers populated through a
//! staging buffer and a synchronous copy. Entities share meshes through
//! `Arc<Mesh>`; the buffers live as long as the longest-lived referencing
//! entity.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::vertex::Vertex;

/// Vertex and index buffers for one mesh.
pub struct Mesh {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Device-local vertex buffer.
    vertex_buffer: Buffer,
    /// Device-local index buffer, absent for unindexed meshes.
    index_buffer: Option<Buffer>,
    /// Number of vertices.
    vertex_count: u32,
    /// Number of indices (zero when unindexed).
    index_count: u32,
}

impl Mesh {
    /// Creates a mesh from vertex and index data.
    ///
    /// Both buffers are device-local; the data travels through a staging
    /// buffer and a one-shot GPU copy. Pass an empty index slice for an
    /// unindexed mesh.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than three vertices are supplied or any
    /// buffer creation/upload fails.
    pub fn new(device: Arc<Device>, vertices: &[Vertex], indices: &[u32]) -> RhiResult<Self> {
        if vertices.len() < 3 {
            return Err(RhiError::Map(format!(
                "Mesh needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }

        let vertex_buffer = upload_through_staging(
            &device,
            bytemuck::cast_slice(vertices),
            BufferUsage::Vertex,
        )?;

        let index_buffer = if indices.is_empty() {
            None
        } else {
            Some(upload_through_staging(
                &device,
                bytemuck::cast_slice(indices),
                BufferUsage::Index,
            )?)
        };

        debug!(
            "Mesh uploaded: {} vertices, {} indices",
            vertices.len(),
            indices.len()
        );

        Ok(Self {
            device,
            vertex_buffer,
            index_buffer,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
        })
    }

    /// Binds the vertex (and index) buffers into the command buffer.
    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        let buffers = [self.vertex_buffer.handle()];
        let offsets = [0];
        unsafe {
            self.device
                .handle()
                .cmd_bind_vertex_buffers(command_buffer, 0, &buffers, &offsets);

            if let Some(index_buffer) = &self.index_buffer {
                self.device.handle().cmd_bind_index_buffer(
                    command_buffer,
                    index_buffer.handle(),
                    0,
                    vk::IndexType::UINT32,
                );
            }
        }
    }

    /// Issues the draw call for the whole mesh.
    ///
    /// Must be called after [`bind`](Self::bind) within an active render
    /// pass.
    pub fn draw(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            if self.index_buffer.is_some() {
                self.device
                    .handle()
                    .cmd_draw_indexed(command_buffer, self.index_count, 1, 0, 0, 0);
            } else {
                self.device
                    .handle()
                    .cmd_draw(command_buffer, self.vertex_count, 1, 0, 0);
            }
        }
    }

    /// Returns the number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Returns the number of indices (zero for unindexed meshes).
    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Creates a device-local buffer and fills it from a staging buffer.
fn upload_through_staging(
    device: &Arc<Device>,
    data: &[u8],
    usage: BufferUsage,
) -> RhiResult<Buffer> {
    let size = data.len() as vk::DeviceSize;

    let mut staging = Buffer::new(
        device.clone(),
        size,
        1,
        BufferUsage::Staging,
        MemoryLocation::CpuToGpu,
    )?;
    staging.map()?;
    staging.write(data)?;
    staging.flush(vk::WHOLE_SIZE, 0)?;
    staging.unmap();

    let buffer = Buffer::new(device.clone(), size, 1, usage, MemoryLocation::GpuOnly)?;

    device.copy_buffer(staging.handle(), buffer.handle(), size)?;

    Ok(buffer)
}
