//! Swapchain management.
//!
//! This module owns the presentable image chain and everything whose
//! lifetime is tied to it: image views, depth buffers, the render pass,
//! framebuffers, and the per-frame synchronization objects that bound the
//! number of frames in flight.
//!
//! # Frame protocol
//!
//! 1. [`Swapchain::acquire_next_image`] waits on the current frame's
//!    in-flight fence, then acquires an image. `Ok(None)` means the chain is
//!    out of date and the caller must rebuild and skip this frame's work.
//! 2. The caller records commands against
//!    [`Swapchain::framebuffer`]/[`Swapchain::render_pass`].
//! 3. [`Swapchain::submit_and_present`] waits for any prior frame still
//!    using the image, submits with the acquire/release semaphores, presents,
//!    and advances the internal frame cursor. `Ok(true)` means the chain has
//!    gone stale (out of date or suboptimal) and should be rebuilt; the
//!    frame still counts as presented.
//!
//! # Rebuild
//!
//! A new swapchain is constructed with
//! [`Swapchain::new_with_previous`], passing the retiring chain as a
//! creation hint so the driver can transfer resources; the old value is
//! dropped only after the new one exists. Format compatibility across the
//! rebuild is the caller's responsibility via [`SwapchainFormats::is_compatible`].

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::sync::{Fence, Semaphore};

/// Maximum number of frames that can be recorded while earlier frames are
/// still executing on the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Candidate depth formats, most precise first.
const DEPTH_FORMAT_CANDIDATES: &[vk::Format] = &[
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Checks if the swapchain support is adequate for rendering.
    ///
    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// The color and depth formats a swapchain was built with.
///
/// A rebuilt swapchain must reproduce these exactly; render passes and
/// pipelines were compiled against them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainFormats {
    /// Color attachment format of the presentable images.
    pub color: vk::Format,
    /// Depth attachment format.
    pub depth: vk::Format,
}

impl SwapchainFormats {
    /// Whether another swapchain's formats match this one.
    #[inline]
    pub fn is_compatible(&self, other: &SwapchainFormats) -> bool {
        self.color == other.color && self.depth == other.depth
    }
}

/// Depth attachment resources for one swapchain image.
struct DepthImage {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
}

impl DepthImage {
    fn new(device: Arc<Device>, format: vk::Format, extent: vk::Extent2D) -> RhiResult<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate(&AllocationCreateDesc {
                name: "depth attachment",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?
        };

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::DEPTH)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let view = unsafe { device.handle().create_image_view(&view_info, None)? };

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
        })
    }
}

impl Drop for DepthImage {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free depth allocation: {:?}", e);
            }
        }
        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }
    }
}

/// Vulkan swapchain wrapper.
///
/// Owns the presentable images, their views and depth attachments, the
/// render pass and framebuffers recorded against them, and the
/// synchronization objects that pace the frame loop.
///
/// # Thread Safety
///
/// Not thread-safe; driven by the single rendering thread.
pub struct Swapchain {
    /// Reference to the logical device
    device: Arc<Device>,
    /// Swapchain extension loader
    swapchain_loader: ash::khr::swapchain::Device,
    /// Swapchain handle
    swapchain: vk::SwapchainKHR,
    /// Swapchain images (owned by the swapchain)
    images: Vec<vk::Image>,
    /// Image views for the swapchain images
    image_views: Vec<vk::ImageView>,
    /// Depth attachment per swapchain image
    depth_images: Vec<DepthImage>,
    /// Render pass matching the color/depth formats
    render_pass: vk::RenderPass,
    /// Framebuffer per swapchain image
    framebuffers: Vec<vk::Framebuffer>,
    /// Color and depth formats the chain was built with
    formats: SwapchainFormats,
    /// Swapchain extent (resolution)
    extent: vk::Extent2D,
    /// Semaphore per frame slot, signaled when an image is available
    image_available: Vec<Semaphore>,
    /// Semaphore per frame slot, signaled when rendering finishes
    render_finished: Vec<Semaphore>,
    /// Fence per frame slot, signaled when that slot's GPU work completes
    in_flight_fences: Vec<Fence>,
    /// For each image, the fence of the frame currently rendering to it
    images_in_flight: Vec<vk::Fence>,
    /// Current frame slot, advanced after each submit
    current_frame: usize,
}

impl Swapchain {
    /// Creates a new swapchain.
    ///
    /// Prefers B8G8R8A8_SRGB with SRGB_NONLINEAR color space and MAILBOX
    /// presentation (FIFO fallback). The image count is one above the
    /// surface minimum, clamped to the surface maximum.
    ///
    /// # Errors
    ///
    /// Returns an error if surface queries, swapchain creation, or any
    /// attachment/sync object creation fails. These are fatal startup
    /// conditions.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        Self::create_internal(instance, device, surface, extent, vk::SwapchainKHR::null())
    }

    /// Creates a new swapchain reusing the retiring one as a creation hint.
    ///
    /// The old swapchain stays alive (and is still presented from) until it
    /// is dropped, which the caller does only after this returns. The caller
    /// must verify format compatibility between old and new before using
    /// the new chain.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`new`](Self::new).
    pub fn new_with_previous(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
        previous: &Swapchain,
    ) -> RhiResult<Self> {
        Self::create_internal(instance, device, surface, extent, previous.swapchain)
    }

    fn create_internal(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::Swapchain(format!(
                "Cannot build swapchain with zero extent {}x{}",
                extent.width, extent.height
            )));
        }

        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)?;

        if !support.is_adequate() {
            return Err(RhiError::Swapchain(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, extent.width, extent.height);
        let image_count = determine_image_count(&support.capabilities);

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        let queue_families = device.queue_families();
        let graphics_family = queue_families.graphics_family.unwrap();
        let present_family = queue_families.present_family.unwrap();
        let family_indices = [graphics_family, present_family];

        let (sharing_mode, family_indices_slice) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices_slice)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };
        info!("Swapchain created with {} images", images.len());

        let image_views = create_image_views(&device, &images, surface_format.format)?;

        let depth_format = find_depth_format(instance, device.physical_device())?;
        let formats = SwapchainFormats {
            color: surface_format.format,
            depth: depth_format,
        };

        let depth_images: Vec<DepthImage> = (0..images.len())
            .map(|_| DepthImage::new(device.clone(), depth_format, extent))
            .collect::<RhiResult<_>>()?;

        let render_pass = create_render_pass(&device, formats)?;

        let framebuffers = create_framebuffers(
            &device,
            render_pass,
            &image_views,
            &depth_images,
            extent,
        )?;

        let mut image_available = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut render_finished = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut in_flight_fences = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            image_available.push(Semaphore::new(device.clone())?);
            render_finished.push(Semaphore::new(device.clone())?);
            // Signaled so the first wait on each slot does not block forever
            in_flight_fences.push(Fence::new(device.clone(), true)?);
        }
        let images_in_flight = vec![vk::Fence::null(); images.len()];

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            depth_images,
            render_pass,
            framebuffers,
            formats,
            extent,
            image_available,
            render_finished,
            in_flight_fences,
            images_in_flight,
            current_frame: 0,
        })
    }

    /// Acquires the next swapchain image for rendering.
    ///
    /// Blocks on the current frame slot's in-flight fence until the GPU has
    /// finished the last frame that used this slot's resources.
    ///
    /// # Returns
    ///
    /// `Ok(Some(image_index))` on success. `Ok(None)` when the swapchain is
    /// out of date; the caller must rebuild and skip this frame's work.
    ///
    /// # Errors
    ///
    /// Returns an error for acquisition failures other than staleness.
    pub fn acquire_next_image(&mut self) -> RhiResult<Option<u32>> {
        self.in_flight_fences[self.current_frame].wait(u64::MAX)?;

        match unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.image_available[self.current_frame].handle(),
                vk::Fence::null(),
            )
        } {
            Ok((index, _suboptimal)) => Ok(Some(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Submits a recorded command buffer and presents the image.
    ///
    /// Waits for any earlier frame still rendering to this image, then
    /// submits with the frame slot's semaphores and fence, queues the
    /// present, and advances the frame cursor.
    ///
    /// # Returns
    ///
    /// `Ok(true)` when the swapchain has gone stale (out of date or
    /// suboptimal) and should be rebuilt; the image is still considered
    /// presented. `Ok(false)` on a clean present.
    ///
    /// # Errors
    ///
    /// Returns an error for submission/present failures other than staleness.
    pub fn submit_and_present(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> RhiResult<bool> {
        let image_index_usize = image_index as usize;

        // If an earlier frame is still rendering to this image, wait for it
        if self.images_in_flight[image_index_usize] != vk::Fence::null() {
            unsafe {
                self.device.handle().wait_for_fences(
                    &[self.images_in_flight[image_index_usize]],
                    true,
                    u64::MAX,
                )?;
            }
        }
        self.images_in_flight[image_index_usize] =
            self.in_flight_fences[self.current_frame].handle();

        let wait_semaphores = [self.image_available[self.current_frame].handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.render_finished[self.current_frame].handle()];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        self.in_flight_fences[self.current_frame].reset()?;

        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                self.in_flight_fences[self.current_frame].handle(),
            )?;
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present_result = unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue(), &present_info)
        };

        // The image was handed to the presentation engine either way
        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;

        match present_result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during present");
                Ok(true)
            }
            Err(vk::Result::SUBOPTIMAL_KHR) => {
                debug!("Swapchain suboptimal during present");
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Returns the color/depth formats the chain was built with.
    #[inline]
    pub fn formats(&self) -> SwapchainFormats {
        self.formats
    }

    /// Returns the render pass matching the swapchain attachments.
    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Returns the framebuffer for the image at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn framebuffer(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index]
    }

    /// Returns the swapchain extent (resolution).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the aspect ratio of the swapchain extent.
    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height as f32
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
            for &view in &self.image_views {
                self.device.handle().destroy_image_view(view, None);
            }
        }

        // Depth images free themselves through their own Drop impls
        self.depth_images.clear();

        unsafe {
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// Chooses the best surface format from the available formats.
///
/// Prefers B8G8R8A8_SRGB with SRGB_NONLINEAR color space, then
/// B8G8R8A8_UNORM, then whatever comes first.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    if let Some(&format) = preferred {
        return format;
    }

    let alternative = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    if let Some(&format) = alternative {
        warn!("Using fallback surface format: B8G8R8A8_UNORM");
        return format;
    }

    warn!(
        "Using first available surface format: {:?}",
        formats[0].format
    );
    formats[0]
}

/// Chooses the best present mode from the available modes.
///
/// Prefers MAILBOX (no tearing, low latency), falls back to FIFO which the
/// Vulkan spec guarantees.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        return vk::PresentModeKHR::MAILBOX;
    }
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent (resolution).
///
/// If the surface reports a current extent, it wins; otherwise the requested
/// size is clamped to the surface's limits.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Determines the number of swapchain images.
///
/// One more than the minimum so the presentation engine never starves,
/// respecting the maximum when the surface reports one (0 = unlimited).
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// Selects a depth format supported for optimal-tiling depth attachments.
fn find_depth_format(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
) -> RhiResult<vk::Format> {
    for &candidate in DEPTH_FORMAT_CANDIDATES {
        let props = unsafe {
            instance
                .handle()
                .get_physical_device_format_properties(physical_device, candidate)
        };
        if props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        {
            debug!("Selected depth format {:?}", candidate);
            return Ok(candidate);
        }
    }

    Err(RhiError::Swapchain(
        "No supported depth attachment format".to_string(),
    ))
}

/// Creates image views for swapchain images.
fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for &image in images {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let image_view = unsafe { device.handle().create_image_view(&create_info, None)? };
        image_views.push(image_view);
    }

    Ok(image_views)
}

/// Creates the render pass for the swapchain's color and depth attachments.
fn create_render_pass(device: &Device, formats: SwapchainFormats) -> RhiResult<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription {
        format: formats.color,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    };

    let depth_attachment = vk::AttachmentDescription {
        format: formats.depth,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::DONT_CARE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ..Default::default()
    };

    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    let color_refs = [color_ref];
    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref);

    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        src_access_mask: vk::AccessFlags::empty(),
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ..Default::default()
    };

    let attachments = [color_attachment, depth_attachment];
    let subpasses = [subpass];
    let dependencies = [dependency];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };
    debug!(
        "Created render pass (color {:?}, depth {:?})",
        formats.color, formats.depth
    );

    Ok(render_pass)
}

/// Creates one framebuffer per swapchain image.
fn create_framebuffers(
    device: &Device,
    render_pass: vk::RenderPass,
    image_views: &[vk::ImageView],
    depth_images: &[DepthImage],
    extent: vk::Extent2D,
) -> RhiResult<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());

    for (view, depth) in image_views.iter().zip(depth_images) {
        let attachments = [*view, depth.view];
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };
        framebuffers.push(framebuffer);
    }

    Ok(framebuffers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formats_compatible_when_identical() {
        let a = SwapchainFormats {
            color: vk::Format::B8G8R8A8_SRGB,
            depth: vk::Format::D32_SFLOAT,
        };
        let b = a;
        assert!(a.is_compatible(&b));
    }

    #[test]
    fn test_formats_incompatible_on_any_change() {
        let base = SwapchainFormats {
            color: vk::Format::B8G8R8A8_SRGB,
            depth: vk::Format::D32_SFLOAT,
        };
        let color_changed = SwapchainFormats {
            color: vk::Format::B8G8R8A8_UNORM,
            ..base
        };
        let depth_changed = SwapchainFormats {
            depth: vk::Format::D24_UNORM_S8_UINT,
            ..base
        };
        assert!(!base.is_compatible(&color_changed));
        assert!(!base.is_compatible(&depth_changed));
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_choose_surface_format_falls_back_to_first() {
        let formats = vec![vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_present_mode() {
        let with_mailbox = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&with_mailbox),
            vk::PresentModeKHR::MAILBOX
        );

        let without = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&without), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current_when_defined() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 1080);
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let clamped_max = choose_extent(&capabilities, 3000, 3000);
        assert_eq!(clamped_max.width, 2000);

        let clamped_min = choose_extent(&capabilities, 50, 50);
        assert_eq!(clamped_min.height, 100);

        let in_range = choose_extent(&capabilities, 800, 600);
        assert_eq!(in_range.width, 800);
        assert_eq!(in_range.height, 600);
    }

    #[test]
    fn test_determine_image_count_clamps() {
        let with_max = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&with_max), 3);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unbounded), 3);
    }

    #[test]
    fn test_frames_in_flight_is_small() {
        assert!(MAX_FRAMES_IN_FLIGHT >= 1);
        assert!(MAX_FRAMES_IN_FLIGHT <= 3);
    }
}
