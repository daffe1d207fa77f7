//! Descriptor set management for shader resource binding.
//!
//! This module provides the descriptor abstractions of the renderer:
//! - [`DescriptorSetLayout`] and its builder define shader-visible binding
//!   slots; duplicate slots are rejected at build time.
//! - [`DescriptorPool`] and its builder manage fixed-capacity pools; pool
//!   exhaustion is a recoverable signal (`Ok(None)`), not an error, so a
//!   caller may create an overflow pool.
//! - [`DescriptorSetWriter`] queues buffer/image writes, validates each one
//!   against the layout's declared kind and count, and applies them all
//!   after a successful allocation; a failed allocation produces no
//!   partially written set.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use helio_rhi::device::Device;
//! use helio_rhi::descriptor::{
//!     DescriptorKind, DescriptorPool, DescriptorSetLayout, DescriptorSetWriter,
//! };
//!
//! # fn example(device: Arc<Device>, info: vk::DescriptorBufferInfo) -> Result<(), helio_rhi::RhiError> {
//! let layout = DescriptorSetLayout::builder()
//!     .add_binding(0, DescriptorKind::UniformBuffer, vk::ShaderStageFlags::VERTEX)?
//!     .build(device.clone())?;
//!
//! let pool = DescriptorPool::builder()
//!     .add_pool_size(DescriptorKind::UniformBuffer, 2)
//!     .set_max_sets(2)
//!     .build(device.clone())?;
//!
//! let set = DescriptorSetWriter::new(&layout, &pool)
//!     .write_buffer(0, info)?
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// The resource kind a descriptor binding accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorKind {
    /// Uniform buffer bound at a fixed offset
    UniformBuffer,
    /// Uniform buffer whose offset is supplied at bind time
    UniformBufferDynamic,
    /// Storage buffer
    StorageBuffer,
    /// Combined image and sampler
    CombinedImageSampler,
}

impl DescriptorKind {
    /// Converts to the Vulkan descriptor type.
    pub fn to_vk(self) -> vk::DescriptorType {
        match self {
            DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorKind::UniformBufferDynamic => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }

    /// Whether this kind is written with buffer descriptors.
    pub fn is_buffer(self) -> bool {
        matches!(
            self,
            DescriptorKind::UniformBuffer
                | DescriptorKind::UniformBufferDynamic
                | DescriptorKind::StorageBuffer
        )
    }

    /// Whether this kind is written with image descriptors.
    pub fn is_image(self) -> bool {
        matches!(self, DescriptorKind::CombinedImageSampler)
    }
}

/// A single declared binding within a layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingDesc {
    /// Resource kind accepted by the slot.
    pub kind: DescriptorKind,
    /// Shader stages that may access the slot.
    pub stages: vk::ShaderStageFlags,
    /// Number of descriptors in the slot.
    pub count: u32,
}

/// Ordered slot table of a descriptor set layout.
///
/// This is the device-free half of a layout: the writer validates against it
/// and tests exercise it directly.
#[derive(Clone, Debug, Default)]
pub struct LayoutBindings {
    bindings: BTreeMap<u32, BindingDesc>,
}

impl LayoutBindings {
    /// Declares a binding slot.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DuplicateBinding`] if the slot is already in use.
    pub fn add(
        &mut self,
        slot: u32,
        kind: DescriptorKind,
        stages: vk::ShaderStageFlags,
        count: u32,
    ) -> RhiResult<()> {
        if self.bindings.contains_key(&slot) {
            return Err(RhiError::DuplicateBinding(slot));
        }
        self.bindings.insert(
            slot,
            BindingDesc {
                kind,
                stages,
                count,
            },
        );
        Ok(())
    }

    /// Looks up a slot and checks the descriptor count a write supplies.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::LayoutMismatch`] if the slot was never declared
    /// or the write's descriptor count differs from the declared count.
    pub fn expect(&self, slot: u32, count: u32) -> RhiResult<&BindingDesc> {
        let desc = self.bindings.get(&slot).ok_or_else(|| {
            RhiError::LayoutMismatch(format!("Layout does not contain binding {}", slot))
        })?;

        if desc.count != count {
            return Err(RhiError::LayoutMismatch(format!(
                "Binding {} expects {} descriptor(s), write supplies {}",
                slot, desc.count, count
            )));
        }

        Ok(desc)
    }

    /// Number of declared slots.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no slots are declared.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Iterates the declared slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &BindingDesc)> {
        self.bindings.iter().map(|(&slot, desc)| (slot, desc))
    }
}

/// Builder for [`DescriptorSetLayout`].
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: LayoutBindings,
}

impl DescriptorSetLayoutBuilder {
    /// Declares a single-descriptor binding slot.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DuplicateBinding`] if the slot is already in use.
    pub fn add_binding(
        mut self,
        slot: u32,
        kind: DescriptorKind,
        stages: vk::ShaderStageFlags,
    ) -> RhiResult<Self> {
        self.bindings.add(slot, kind, stages, 1)?;
        Ok(self)
    }

    /// Declares a binding slot holding `count` descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DuplicateBinding`] if the slot is already in use.
    pub fn add_binding_array(
        mut self,
        slot: u32,
        kind: DescriptorKind,
        stages: vk::ShaderStageFlags,
        count: u32,
    ) -> RhiResult<Self> {
        self.bindings.add(slot, kind, stages, count)?;
        Ok(self)
    }

    /// Creates the immutable layout on the device.
    ///
    /// # Errors
    ///
    /// Returns an error if Vulkan layout creation fails.
    pub fn build(self, device: Arc<Device>) -> RhiResult<DescriptorSetLayout> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = self
            .bindings
            .iter()
            .map(|(slot, desc)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(slot)
                    .descriptor_type(desc.kind.to_vk())
                    .descriptor_count(desc.count)
                    .stage_flags(desc.stages)
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            self.bindings.len()
        );

        Ok(DescriptorSetLayout {
            device,
            layout,
            bindings: self.bindings,
        })
    }
}

/// Descriptor set layout wrapper.
///
/// Immutable after creation; carries its [`LayoutBindings`] so writers can
/// validate against the declared kinds and counts.
pub struct DescriptorSetLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan descriptor set layout handle.
    layout: vk::DescriptorSetLayout,
    /// Declared slot table.
    bindings: LayoutBindings,
}

impl DescriptorSetLayout {
    /// Starts building a layout.
    pub fn builder() -> DescriptorSetLayoutBuilder {
        DescriptorSetLayoutBuilder::default()
    }

    /// Returns the Vulkan descriptor set layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Returns the declared slot table.
    #[inline]
    pub fn bindings(&self) -> &LayoutBindings {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Builder for [`DescriptorPool`].
#[derive(Default)]
pub struct DescriptorPoolBuilder {
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    max_sets: u32,
    flags: vk::DescriptorPoolCreateFlags,
}

impl DescriptorPoolBuilder {
    /// Reserves capacity for `count` descriptors of `kind`.
    pub fn add_pool_size(mut self, kind: DescriptorKind, count: u32) -> Self {
        self.pool_sizes.push(
            vk::DescriptorPoolSize::default()
                .ty(kind.to_vk())
                .descriptor_count(count),
        );
        self
    }

    /// Sets the maximum number of sets the pool can allocate.
    pub fn set_max_sets(mut self, count: u32) -> Self {
        self.max_sets = count;
        self
    }

    /// Sets pool creation flags (e.g. free-descriptor-set).
    pub fn set_flags(mut self, flags: vk::DescriptorPoolCreateFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Creates the pool on the device.
    ///
    /// # Errors
    ///
    /// Returns an error if Vulkan pool creation fails.
    pub fn build(self, device: Arc<Device>) -> RhiResult<DescriptorPool> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(self.max_sets)
            .pool_sizes(&self.pool_sizes)
            .flags(self.flags);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, {} pool size(s)",
            self.max_sets,
            self.pool_sizes.len()
        );

        Ok(DescriptorPool {
            device,
            pool,
            max_sets: self.max_sets,
        })
    }
}

/// Descriptor pool for allocating descriptor sets.
///
/// The pool has fixed capacity per resource kind and a fixed maximum set
/// count. Running out of either is reported as `Ok(None)` from
/// [`try_allocate`](Self::try_allocate) so the caller can decide whether to
/// treat it as fatal or build an overflow pool.
pub struct DescriptorPool {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan descriptor pool handle.
    pool: vk::DescriptorPool,
    /// Maximum number of sets that can be allocated.
    max_sets: u32,
}

impl DescriptorPool {
    /// Starts building a pool.
    pub fn builder() -> DescriptorPoolBuilder {
        DescriptorPoolBuilder::default()
    }

    /// Allocates one descriptor set with the given layout.
    ///
    /// # Returns
    ///
    /// `Ok(Some(set))` on success, `Ok(None)` when the pool is exhausted or
    /// fragmented.
    ///
    /// # Errors
    ///
    /// Returns an error for any other allocation failure.
    pub fn try_allocate(
        &self,
        layout: &DescriptorSetLayout,
    ) -> RhiResult<Option<vk::DescriptorSet>> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        match unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => Ok(Some(sets[0])),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                warn!("Descriptor pool exhausted (max_sets={})", self.max_sets);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Frees descriptor sets back to the pool.
    ///
    /// Requires the pool to have been built with the free-descriptor-set
    /// flag.
    ///
    /// # Errors
    ///
    /// Returns an error if freeing fails.
    pub fn free(&self, sets: &[vk::DescriptorSet]) -> RhiResult<()> {
        unsafe {
            self.device.handle().free_descriptor_sets(self.pool, sets)?;
        }
        Ok(())
    }

    /// Resets the pool, reclaiming all allocated sets at once.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        Ok(())
    }

    /// Returns the Vulkan descriptor pool handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Returns the maximum number of sets the pool can allocate.
    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// A validated write queued by a [`DescriptorSetWriter`].
enum PendingWrite {
    Buffer {
        slot: u32,
        ty: vk::DescriptorType,
        info: vk::DescriptorBufferInfo,
    },
    Image {
        slot: u32,
        ty: vk::DescriptorType,
        infos: Vec<vk::DescriptorImageInfo>,
    },
}

/// Queues descriptor writes against a layout, then allocates and applies
/// them in one step.
///
/// Every write is validated against the layout's declared `{kind, count}`
/// when it is queued; [`build`](Self::build) therefore either produces a
/// fully written set, reports pool exhaustion, or fails. It never produces
/// a malformed set.
pub struct DescriptorSetWriter<'a> {
    layout: &'a DescriptorSetLayout,
    pool: &'a DescriptorPool,
    writes: Vec<PendingWrite>,
}

impl<'a> DescriptorSetWriter<'a> {
    /// Starts a writer over a layout and a pool.
    pub fn new(layout: &'a DescriptorSetLayout, pool: &'a DescriptorPool) -> Self {
        Self {
            layout,
            pool,
            writes: Vec::new(),
        }
    }

    /// Queues a buffer write for `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::LayoutMismatch`] if the slot is undeclared, is
    /// not a buffer binding, or expects more than one descriptor.
    pub fn write_buffer(mut self, slot: u32, info: vk::DescriptorBufferInfo) -> RhiResult<Self> {
        let desc = self.layout.bindings().expect(slot, 1)?;
        if !desc.kind.is_buffer() {
            return Err(RhiError::LayoutMismatch(format!(
                "Binding {} is not a buffer binding",
                slot
            )));
        }

        self.writes.push(PendingWrite::Buffer {
            slot,
            ty: desc.kind.to_vk(),
            info,
        });
        Ok(self)
    }

    /// Queues an image write for `slot`.
    ///
    /// The number of supplied image infos must equal the slot's declared
    /// descriptor count.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::LayoutMismatch`] if the slot is undeclared, is
    /// not an image binding, or the count differs from the declaration.
    pub fn write_image(mut self, slot: u32, infos: Vec<vk::DescriptorImageInfo>) -> RhiResult<Self> {
        let desc = self.layout.bindings().expect(slot, infos.len() as u32)?;
        if !desc.kind.is_image() {
            return Err(RhiError::LayoutMismatch(format!(
                "Binding {} is not an image binding",
                slot
            )));
        }

        self.writes.push(PendingWrite::Image {
            slot,
            ty: desc.kind.to_vk(),
            infos,
        });
        Ok(self)
    }

    /// Allocates a set from the pool and applies all queued writes.
    ///
    /// # Returns
    ///
    /// `Ok(Some(set))` on success, `Ok(None)` when the pool is exhausted,
    /// in which case no writes were applied.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails for another reason.
    pub fn build(self) -> RhiResult<Option<vk::DescriptorSet>> {
        let Some(set) = self.pool.try_allocate(self.layout)? else {
            return Ok(None);
        };

        let pending = self.writes;
        let vk_writes: Vec<vk::WriteDescriptorSet> = pending
            .iter()
            .map(|write| match write {
                PendingWrite::Buffer { slot, ty, info } => vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*slot)
                    .dst_array_element(0)
                    .descriptor_type(*ty)
                    .buffer_info(std::slice::from_ref(info)),
                PendingWrite::Image { slot, ty, infos } => vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*slot)
                    .dst_array_element(0)
                    .descriptor_type(*ty)
                    .image_info(infos),
            })
            .collect();

        unsafe {
            self.layout
                .device
                .handle()
                .update_descriptor_sets(&vk_writes, &[]);
        }

        debug!("Built descriptor set with {} write(s)", vk_writes.len());

        Ok(Some(set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LayoutBindings {
        let mut bindings = LayoutBindings::default();
        bindings
            .add(
                0,
                DescriptorKind::UniformBuffer,
                vk::ShaderStageFlags::VERTEX,
                1,
            )
            .unwrap();
        bindings
            .add(
                1,
                DescriptorKind::CombinedImageSampler,
                vk::ShaderStageFlags::FRAGMENT,
                4,
            )
            .unwrap();
        bindings
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let mut bindings = table();
        let err = bindings.add(
            0,
            DescriptorKind::StorageBuffer,
            vk::ShaderStageFlags::VERTEX,
            1,
        );
        assert!(matches!(err, Err(RhiError::DuplicateBinding(0))));
        // The table is unchanged
        assert_eq!(bindings.len(), 2);
        assert_eq!(
            bindings.expect(0, 1).unwrap().kind,
            DescriptorKind::UniformBuffer
        );
    }

    #[test]
    fn test_expect_unknown_slot_fails() {
        let bindings = table();
        assert!(matches!(
            bindings.expect(7, 1),
            Err(RhiError::LayoutMismatch(_))
        ));
    }

    #[test]
    fn test_expect_count_mismatch_fails() {
        let bindings = table();
        // Binding 1 declares 4 descriptors; a single-descriptor write must fail
        assert!(matches!(
            bindings.expect(1, 1),
            Err(RhiError::LayoutMismatch(_))
        ));
        // The declared count passes
        assert_eq!(bindings.expect(1, 4).unwrap().count, 4);
    }

    #[test]
    fn test_iteration_is_slot_ordered() {
        let mut bindings = LayoutBindings::default();
        bindings
            .add(
                2,
                DescriptorKind::UniformBuffer,
                vk::ShaderStageFlags::VERTEX,
                1,
            )
            .unwrap();
        bindings
            .add(
                0,
                DescriptorKind::UniformBufferDynamic,
                vk::ShaderStageFlags::FRAGMENT,
                1,
            )
            .unwrap();
        let slots: Vec<u32> = bindings.iter().map(|(slot, _)| slot).collect();
        assert_eq!(slots, vec![0, 2]);
    }

    #[test]
    fn test_kind_classification() {
        assert!(DescriptorKind::UniformBuffer.is_buffer());
        assert!(DescriptorKind::UniformBufferDynamic.is_buffer());
        assert!(DescriptorKind::StorageBuffer.is_buffer());
        assert!(!DescriptorKind::CombinedImageSampler.is_buffer());
        assert!(DescriptorKind::CombinedImageSampler.is_image());
        assert_eq!(
            DescriptorKind::UniformBufferDynamic.to_vk(),
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        );
    }
}
