//! GPU buffer management.
//!
//! This module provides [`Buffer`], a sized and aligned block of device
//! memory with host mapping, indexed writes, and explicit flush/invalidate.
//! Buffers represent linear arrays of data bound to pipelines via descriptor
//! sets or used directly as vertex/index sources.
//!
//! # Instance alignment
//!
//! A buffer is created as `instance_count` regions of `instance_size` bytes.
//! When the buffer backs an offset-indexed uniform (one region per frame or
//! per draw), each region must start at a multiple of the device's minimum
//! offset alignment, so the effective region stride is
//! `alignment_size = ceil(instance_size / alignment) * alignment` and the
//! total allocation is `alignment_size * instance_count`. [`BufferLayout`]
//! carries this arithmetic; [`Buffer::descriptor_info_at`] exposes the
//! per-region descriptor ranges derived from it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gpu_allocator::MemoryLocation;
//! use helio_rhi::device::Device;
//! use helio_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), helio_rhi::RhiError> {
//! // One 64-byte uniform region per frame in flight, 256-byte aligned
//! let mut ubo = Buffer::new_aligned(
//!     device,
//!     64,
//!     2,
//!     BufferUsage::Uniform,
//!     MemoryLocation::CpuToGpu,
//!     256,
//! )?;
//! ubo.map()?;
//! ubo.write_at_index(&[0u8; 64], 1)?;
//! ubo.flush_index(1)?;
//! # Ok(())
//! # }
//! ```

use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Buffer usage type.
///
/// Defines the intended use of the buffer, which maps onto Vulkan usage
/// flags. Vertex and index buffers are also transfer destinations so they
/// can be filled from a staging buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer - stores vertex data
    Vertex,
    /// Index buffer - stores index data
    Index,
    /// Uniform buffer - stores shader uniform data
    Uniform,
    /// Staging buffer - CPU-writable transfer source
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// Returns the smallest multiple of `min_offset_alignment` that holds
/// `instance_size` bytes.
///
/// An alignment of zero means "no requirement" and returns the size
/// unchanged.
pub fn align_up(instance_size: vk::DeviceSize, min_offset_alignment: vk::DeviceSize) -> vk::DeviceSize {
    if min_offset_alignment > 0 {
        instance_size.div_ceil(min_offset_alignment) * min_offset_alignment
    } else {
        instance_size
    }
}

/// Sizing arithmetic for an instance-indexed buffer.
///
/// Separated from [`Buffer`] so offset math can be reasoned about (and
/// tested) without a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferLayout {
    /// Size of one instance in bytes, as requested by the caller.
    pub instance_size: vk::DeviceSize,
    /// Number of instances.
    pub instance_count: u64,
    /// Stride between instances after alignment.
    pub alignment_size: vk::DeviceSize,
}

impl BufferLayout {
    /// Computes the layout for `instance_count` regions of `instance_size`
    /// bytes, each aligned to `min_offset_alignment`.
    pub fn new(
        instance_size: vk::DeviceSize,
        instance_count: u64,
        min_offset_alignment: vk::DeviceSize,
    ) -> Self {
        Self {
            instance_size,
            instance_count,
            alignment_size: align_up(instance_size, min_offset_alignment),
        }
    }

    /// Total byte size of the buffer.
    #[inline]
    pub fn total_size(&self) -> vk::DeviceSize {
        self.alignment_size * self.instance_count
    }

    /// Byte offset of the instance at `index`.
    #[inline]
    pub fn offset_of(&self, index: u64) -> vk::DeviceSize {
        index * self.alignment_size
    }
}

/// GPU buffer wrapper with managed memory.
///
/// Wraps a Vulkan buffer and its gpu-allocator backed memory. The buffer is
/// exclusively owned by the component that created it; shared access goes
/// through explicit reference types at a higher level.
///
/// # Thread Safety
///
/// The buffer itself is not thread-safe. Host writes come from the single
/// driving thread; each frame slot owns a disjoint region.
pub struct Buffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// GPU memory allocation.
    allocation: Option<Allocation>,
    /// Instance sizing and alignment.
    layout: BufferLayout,
    /// Buffer usage type.
    usage: BufferUsage,
    /// Host pointer while mapped.
    mapped: Option<NonNull<u8>>,
}

impl Buffer {
    /// Creates a new buffer with no instance alignment requirement.
    ///
    /// Equivalent to [`new_aligned`](Self::new_aligned) with an alignment of
    /// one. Use this for vertex/index/staging buffers where instances are
    /// densely packed.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation or memory allocation fails.
    pub fn new(
        device: Arc<Device>,
        instance_size: vk::DeviceSize,
        instance_count: u64,
        usage: BufferUsage,
        location: MemoryLocation,
    ) -> RhiResult<Self> {
        Self::new_aligned(device, instance_size, instance_count, usage, location, 1)
    }

    /// Creates a new buffer whose instances are aligned to
    /// `min_offset_alignment`.
    ///
    /// Uniform buffers addressed by index or dynamic offset must pass the
    /// device's minimum uniform offset alignment here (combined with the
    /// non-coherent atom size when the memory will be flushed per index, see
    /// [`DeviceLimits::uniform_atom_alignment`]).
    ///
    /// [`DeviceLimits::uniform_atom_alignment`]:
    ///     crate::physical_device::DeviceLimits::uniform_atom_alignment
    ///
    /// # Errors
    ///
    /// Returns an error if the sizing is degenerate, or if buffer object
    /// creation or memory allocation fails.
    pub fn new_aligned(
        device: Arc<Device>,
        instance_size: vk::DeviceSize,
        instance_count: u64,
        usage: BufferUsage,
        location: MemoryLocation,
        min_offset_alignment: vk::DeviceSize,
    ) -> RhiResult<Self> {
        if instance_size == 0 || instance_count == 0 {
            return Err(RhiError::Map(
                "Buffer instance size and count must be greater than 0".to_string(),
            ));
        }

        let layout = BufferLayout::new(instance_size, instance_count, min_offset_alignment);

        let buffer_info = vk::BufferCreateInfo::default()
            .size(layout.total_size())
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate(&AllocationCreateDesc {
                name: usage.name(),
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?
        };

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        debug!(
            "Created {} buffer: {} instance(s) of {} bytes, stride {}, total {}",
            usage.name(),
            instance_count,
            instance_size,
            layout.alignment_size,
            layout.total_size()
        );

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            layout,
            usage,
            mapped: None,
        })
    }

    /// Establishes a host pointer for the whole buffer range.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Map`] if the underlying memory is not
    /// host-visible or the allocation is gone.
    pub fn map(&mut self) -> RhiResult<()> {
        let allocation = self
            .allocation
            .as_ref()
            .ok_or_else(|| RhiError::Map("Called map on a destroyed buffer".to_string()))?;

        let ptr = allocation.mapped_ptr().ok_or_else(|| {
            RhiError::Map(format!(
                "{} buffer memory is not host-visible",
                self.usage.name()
            ))
        })?;

        self.mapped = Some(ptr.cast());
        Ok(())
    }

    /// Releases the host pointer.
    ///
    /// Safe to call when not mapped.
    pub fn unmap(&mut self) {
        self.mapped = None;
    }

    /// Whether the buffer currently has a host pointer.
    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    /// Copies `data` into the mapped region at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Map`] if the buffer is not mapped or the write
    /// would run past the end of the buffer.
    pub fn write_at(&self, data: &[u8], offset: vk::DeviceSize) -> RhiResult<()> {
        let mapped = self
            .mapped
            .ok_or_else(|| RhiError::Map("Cannot write to unmapped buffer".to_string()))?;

        copy_to_mapped(
            mapped,
            self.layout.total_size() as usize,
            data,
            offset as usize,
        )
    }

    /// Copies `data` to the start of the mapped region.
    pub fn write(&self, data: &[u8]) -> RhiResult<()> {
        self.write_at(data, 0)
    }

    /// Copies `data` into the instance region at `index`.
    ///
    /// Equivalent to `write_at(data, index * alignment_size)`. The data must
    /// fit within one instance.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Map`] if the buffer is not mapped, the index is
    /// out of range, or the data does not fit in one instance.
    pub fn write_at_index(&self, data: &[u8], index: u64) -> RhiResult<()> {
        if index >= self.layout.instance_count {
            return Err(RhiError::Map(format!(
                "Instance index {} out of range ({} instances)",
                index, self.layout.instance_count
            )));
        }
        if data.len() as vk::DeviceSize > self.layout.instance_size {
            return Err(RhiError::Map(format!(
                "Write of {} bytes exceeds instance size {}",
                data.len(),
                self.layout.instance_size
            )));
        }
        self.write_at(data, self.layout.offset_of(index))
    }

    /// Flushes a memory range of the buffer to make host writes visible to
    /// the device.
    ///
    /// Only required for non-coherent memory, but callers invoke it
    /// uniformly regardless of memory type so the call sites stay portable.
    /// The range is widened to the device's non-coherent atom granularity.
    ///
    /// # Errors
    ///
    /// Returns an error if the Vulkan flush call fails.
    pub fn flush(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> RhiResult<()> {
        let range = self.mapped_range(size, offset)?;
        unsafe {
            self.device.handle().flush_mapped_memory_ranges(&[range])?;
        }
        Ok(())
    }

    /// Invalidates a memory range of the buffer to make device writes
    /// visible to the host.
    ///
    /// Only required for non-coherent memory; see [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// Returns an error if the Vulkan invalidate call fails.
    pub fn invalidate(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> RhiResult<()> {
        let range = self.mapped_range(size, offset)?;
        unsafe {
            self.device
                .handle()
                .invalidate_mapped_memory_ranges(&[range])?;
        }
        Ok(())
    }

    /// Flushes the instance region at `index`.
    pub fn flush_index(&self, index: u64) -> RhiResult<()> {
        self.flush(self.layout.alignment_size, self.layout.offset_of(index))
    }

    /// Builds the mapped-memory range for a flush or invalidate, aligned to
    /// the non-coherent atom size.
    fn mapped_range(
        &self,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> RhiResult<vk::MappedMemoryRange> {
        let allocation = self
            .allocation
            .as_ref()
            .ok_or_else(|| RhiError::Map("Buffer allocation is gone".to_string()))?;

        let atom = self.device.limits().non_coherent_atom_size.max(1);
        let absolute = allocation.offset() + offset;
        let aligned_offset = absolute / atom * atom;
        let end = if size == vk::WHOLE_SIZE {
            allocation.offset() + self.layout.total_size()
        } else {
            absolute + size
        };
        let aligned_size = align_up(end - aligned_offset, atom);

        // SAFETY: the allocation is alive for as long as this buffer.
        let memory = unsafe { allocation.memory() };

        Ok(vk::MappedMemoryRange::default()
            .memory(memory)
            .offset(aligned_offset)
            .size(aligned_size))
    }

    /// Returns a descriptor buffer info covering the whole buffer.
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer)
            .offset(0)
            .range(self.layout.total_size())
    }

    /// Returns a descriptor buffer info for the instance at `index`:
    /// `{handle, index * alignment_size, alignment_size}`.
    pub fn descriptor_info_at(&self, index: u64) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer)
            .offset(self.layout.offset_of(index))
            .range(self.layout.alignment_size)
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the instance layout of the buffer.
    #[inline]
    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    /// Returns the total buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.layout.total_size()
    }

    /// Returns the buffer usage type.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // Unmap first, then free memory, then destroy the buffer object
        self.mapped = None;

        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free buffer allocation: {:?}", e);
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

/// Bounds-checked copy of `data` into a mapped region of `capacity` bytes.
fn copy_to_mapped(
    mapped: NonNull<u8>,
    capacity: usize,
    data: &[u8],
    offset: usize,
) -> RhiResult<()> {
    if data.is_empty() {
        return Ok(());
    }

    let end = offset
        .checked_add(data.len())
        .ok_or_else(|| RhiError::Map("Write offset overflow".to_string()))?;
    if end > capacity {
        return Err(RhiError::Map(format!(
            "Write exceeds buffer size: offset {} + data {} > buffer {}",
            offset,
            data.len(),
            capacity
        )));
    }

    // SAFETY: the range [offset, end) was checked against the mapped capacity
    unsafe {
        std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.as_ptr().add(offset), data.len());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up_rounds_to_multiple() {
        for (size, align) in [(1u64, 64u64), (64, 64), (65, 64), (200, 256), (256, 256)] {
            let aligned = align_up(size, align);
            assert_eq!(aligned % align, 0, "{} not aligned to {}", aligned, align);
            assert!(aligned >= size);
            assert!(aligned < size + align);
        }
    }

    #[test]
    fn test_align_up_zero_alignment_is_identity() {
        assert_eq!(align_up(100, 0), 100);
    }

    #[test]
    fn test_layout_offsets_stay_in_bounds() {
        let layout = BufferLayout::new(48, 8, 64);
        assert_eq!(layout.alignment_size, 64);
        assert_eq!(layout.total_size(), 512);
        for index in 0..layout.instance_count {
            let offset = layout.offset_of(index);
            assert_eq!(offset, index * layout.alignment_size);
            assert!(offset + layout.alignment_size <= layout.total_size());
        }
    }

    #[test]
    fn test_layout_256_by_4_scenario() {
        // elementSize=256, elementCount=4, minOffsetAlignment=256
        let layout = BufferLayout::new(256, 4, 256);
        assert_eq!(layout.alignment_size, 256);
        assert_eq!(layout.total_size(), 1024);
        assert_eq!(layout.offset_of(2), 512);
    }

    #[test]
    fn test_copy_to_mapped_round_trips() {
        let mut backing = vec![0u8; 1024];
        let layout = BufferLayout::new(256, 4, 256);
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();

        // Four distinct 256-byte payloads, one per instance
        let payloads: Vec<Vec<u8>> = (0..4u8).map(|i| vec![i + 1; 256]).collect();
        for (i, payload) in payloads.iter().enumerate() {
            copy_to_mapped(ptr, 1024, payload, layout.offset_of(i as u64) as usize).unwrap();
        }

        for (i, payload) in payloads.iter().enumerate() {
            let offset = layout.offset_of(i as u64) as usize;
            assert_eq!(&backing[offset..offset + 256], payload.as_slice());
        }

        // Repeating an identical write is idempotent
        copy_to_mapped(ptr, 1024, &payloads[2], layout.offset_of(2) as usize).unwrap();
        assert_eq!(&backing[512..768], payloads[2].as_slice());
    }

    #[test]
    fn test_copy_to_mapped_rejects_overflow() {
        let mut backing = vec![0u8; 64];
        let ptr = NonNull::new(backing.as_mut_ptr()).unwrap();

        let err = copy_to_mapped(ptr, 64, &[0u8; 16], 56);
        assert!(matches!(err, Err(RhiError::Map(_))));
        // The failed write must not have touched the backing store
        assert!(backing.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_descriptor_info_math_uses_layout() {
        // descriptor_info_at derives from the layout: offset = index * stride
        let layout = BufferLayout::new(200, 3, 256);
        assert_eq!(layout.alignment_size, 256);
        let info = vk::DescriptorBufferInfo::default()
            .buffer(vk::Buffer::null())
            .offset(layout.offset_of(2))
            .range(layout.alignment_size);
        assert_eq!(info.offset, 512);
        assert_eq!(info.range, 256);
        assert!(info.offset + info.range <= layout.total_size());
    }

    #[test]
    fn test_buffer_usage_flags() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert!(
            BufferUsage::Staging
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_SRC)
        );
    }
}
