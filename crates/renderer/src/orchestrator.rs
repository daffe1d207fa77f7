//! Frame orchestration.
//!
//! [`FrameOrchestrator`] is the top-level state machine of the rendering
//! core. It owns the Vulkan instance, surface, device, swapchain, and the
//! per-frame command buffers, and sequences the begin/end-frame and
//! render-pass brackets across the frames in flight.
//!
//! # Frame loop
//!
//! ```no_run
//! # use helio_render::FrameOrchestrator;
//! # fn example(orchestrator: &mut FrameOrchestrator) -> Result<(), helio_rhi::RhiError> {
//! if let Some(cmd) = orchestrator.begin_frame()? {
//!     orchestrator.begin_render_pass(cmd);
//!     // record draws...
//!     orchestrator.end_render_pass(cmd);
//!     orchestrator.end_frame()?;
//! }
//! // a None command buffer means the swapchain was rebuilt; skip this frame
//! # Ok(())
//! # }
//! ```
//!
//! # Rebuild protocol
//!
//! A stale signal from acquire or present, or a resize notification from the
//! window, schedules a swapchain rebuild: wait for the device to go idle,
//! build the new chain with the old one as a creation hint, verify the
//! color/depth formats did not change (a change is fatal; pipelines and
//! the render pass were compiled against them), then retire the old chain.
//! While the window reports a zero extent the rebuild stays pending and
//! frames are skipped.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use helio_platform::{Surface, Window};
use helio_rhi::command::CommandPool;
use helio_rhi::device::Device;
use helio_rhi::instance::Instance;
use helio_rhi::physical_device::select_physical_device;
use helio_rhi::swapchain::{MAX_FRAMES_IN_FLIGHT, Swapchain};
use helio_rhi::{RhiError, RhiResult};

use crate::frame::FrameTracker;

/// Clear color for the swapchain render pass.
const CLEAR_COLOR: [f32; 4] = [0.01, 0.01, 0.01, 1.0];

/// Top-level frame and swapchain orchestrator.
///
/// Owns every object whose lifetime spans the whole rendering session.
/// Teardown order matters (swapchain before surface before instance), so
/// the swapchain, pool, and surface are released explicitly in `Drop`, and
/// the device Arc is declared before the instance so the remaining field
/// drops run in the required order.
pub struct FrameOrchestrator {
    /// Swapchain and everything tied to it. Dropped first, explicitly.
    swapchain: ManuallyDrop<Swapchain>,
    /// Command pool for the per-frame command buffers. Dropped second.
    command_pool: ManuallyDrop<CommandPool>,
    /// One primary command buffer per frame in flight (freed with the pool).
    command_buffers: Vec<vk::CommandBuffer>,
    /// Window surface. Dropped third, before the instance.
    surface: ManuallyDrop<Surface>,
    /// Logical device, shared with every GPU object. The Arc here must be
    /// released before the instance below, so it is declared before it.
    device: Arc<Device>,
    /// Vulkan instance. Plain field so it drops after the device's Arc.
    instance: Instance,
    /// Frame lifecycle state machine.
    tracker: FrameTracker,
    /// Swapchain image index acquired for the current frame.
    current_image_index: u32,
    /// Extent of a resize notification not yet applied.
    pending_resize: Option<vk::Extent2D>,
}

impl FrameOrchestrator {
    /// Initializes the rendering core against a window.
    ///
    /// Creates the instance (validation layers in debug builds), surface,
    /// device, swapchain, and per-frame command buffers. Every failure here
    /// is a fatal initialization error.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object creation fails or no suitable
    /// GPU is present.
    pub fn new(window: &Window) -> RhiResult<Self> {
        let (width, height) = window.extent();
        info!("Initializing rendering core ({}x{})", width, height);

        let instance = Instance::new(cfg!(debug_assertions))?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::Surface(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;

        let device = Device::new(&instance, &physical_device_info)?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            vk::Extent2D { width, height },
        )?;

        let graphics_family = device.queue_families().graphics_family.unwrap();
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let command_buffers = command_pool.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;

        info!(
            "Rendering core initialized: {} swapchain images, {} frames in flight",
            swapchain.image_count(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            swapchain: ManuallyDrop::new(swapchain),
            command_pool: ManuallyDrop::new(command_pool),
            command_buffers,
            surface: ManuallyDrop::new(surface),
            device,
            instance,
            tracker: FrameTracker::new(MAX_FRAMES_IN_FLIGHT),
            current_image_index: 0,
            pending_resize: None,
        })
    }

    /// Returns the shared device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the swapchain render pass; pipelines (including overlay
    /// passes) are created against it.
    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.swapchain.render_pass()
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    /// Returns the aspect ratio of the current swapchain extent.
    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.aspect_ratio()
    }

    /// Returns the current frame-in-flight index.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn frame_index(&self) -> usize {
        assert!(
            self.tracker.is_frame_in_progress(),
            "Cannot get the frame index when no frame is in progress"
        );
        self.tracker.frame_index()
    }

    /// Whether a frame is currently being recorded.
    #[inline]
    pub fn is_frame_in_progress(&self) -> bool {
        self.tracker.is_frame_in_progress()
    }

    /// Returns the command buffer of the frame being recorded.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        assert!(
            self.tracker.is_frame_in_progress(),
            "Cannot get the command buffer when no frame is in progress"
        );
        self.command_buffers[self.tracker.frame_index()]
    }

    /// Notifies the orchestrator that the presentation surface changed size.
    ///
    /// The rebuild happens at the next frame boundary. A zero extent keeps
    /// the rebuild pending and frames are skipped until the window reports a
    /// drawable size again.
    pub fn handle_resize(&mut self, width: u32, height: u32) {
        debug!("Resize notification: {}x{}", width, height);
        self.pending_resize = Some(vk::Extent2D { width, height });
    }

    /// Begins a new frame.
    ///
    /// Acquires a swapchain image (waiting on the frame slot's fence) and
    /// starts recording its command buffer.
    ///
    /// # Returns
    ///
    /// `Ok(Some(command_buffer))` when the frame can be recorded.
    /// `Ok(None)` when the frame was skipped because the swapchain was
    /// stale or a resize was pending; the caller must not record any draw
    /// work this iteration, and the frame index does not advance.
    ///
    /// # Errors
    ///
    /// Returns an error for fatal acquire or rebuild failures, including a
    /// format change across the rebuild.
    ///
    /// # Panics
    ///
    /// Panics if a frame is already in progress.
    pub fn begin_frame(&mut self) -> RhiResult<Option<vk::CommandBuffer>> {
        assert!(
            !self.tracker.is_frame_in_progress(),
            "Can't begin a frame while one is already in progress"
        );

        if self.pending_resize.is_some() {
            self.tracker.skip_frame();
            self.apply_pending_rebuild()?;
            return Ok(None);
        }

        let image_index = match self.swapchain.acquire_next_image()? {
            Some(index) => index,
            None => {
                // Stale swapchain; rebuild at the current extent and skip
                self.tracker.skip_frame();
                self.rebuild_swapchain(self.swapchain.extent())?;
                return Ok(None);
            }
        };

        self.current_image_index = image_index;
        self.tracker.begin_frame();

        let cmd = self.command_buffers[self.tracker.frame_index()];
        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            self.device.handle().begin_command_buffer(cmd, &begin_info)?;
        }

        Ok(Some(cmd))
    }

    /// Opens the swapchain render pass on the frame's command buffer and
    /// sets the viewport and scissor.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress, a render pass is already open, or
    /// `command_buffer` belongs to a different frame slot.
    pub fn begin_render_pass(&mut self, command_buffer: vk::CommandBuffer) {
        assert_eq!(
            command_buffer,
            self.command_buffers[self.tracker.frame_index()],
            "Can't begin a render pass on a command buffer from a different frame"
        );
        self.tracker.begin_render_pass();

        let extent = self.swapchain.extent();

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.swapchain.render_pass())
            .framebuffer(self.swapchain.framebuffer(self.current_image_index as usize))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        unsafe {
            self.device.handle().cmd_begin_render_pass(
                command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
            self.device
                .handle()
                .cmd_set_viewport(command_buffer, 0, &[viewport]);
            self.device
                .handle()
                .cmd_set_scissor(command_buffer, 0, &[scissor]);
        }
    }

    /// Closes the swapchain render pass.
    ///
    /// # Panics
    ///
    /// Panics if no render pass is open or `command_buffer` belongs to a
    /// different frame slot.
    pub fn end_render_pass(&mut self, command_buffer: vk::CommandBuffer) {
        assert_eq!(
            command_buffer,
            self.command_buffers[self.tracker.frame_index()],
            "Can't end a render pass on a command buffer from a different frame"
        );
        self.tracker.end_render_pass();

        unsafe {
            self.device.handle().cmd_end_render_pass(command_buffer);
        }
    }

    /// Ends the frame: finalizes recording, submits, presents, and advances
    /// the frame-in-flight index by one.
    ///
    /// A stale present or a pending resize notification triggers the
    /// rebuild protocol; the frame still counts as presented.
    ///
    /// # Errors
    ///
    /// Returns an error for fatal submit/present/rebuild failures.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress or the render pass is still open.
    pub fn end_frame(&mut self) -> RhiResult<()> {
        assert!(
            self.tracker.is_frame_in_progress(),
            "Can't end a frame that never began"
        );
        let cmd = self.command_buffers[self.tracker.frame_index()];

        unsafe {
            self.device.handle().end_command_buffer(cmd)?;
        }

        let stale = self
            .swapchain
            .submit_and_present(cmd, self.current_image_index)?;

        // Presentation happened either way; the frame index advances
        self.tracker.end_frame();

        if stale || self.pending_resize.is_some() {
            self.apply_pending_rebuild()?;
        }

        Ok(())
    }

    /// Applies a pending resize, or rebuilds at the current extent when the
    /// staleness came from the swapchain itself.
    fn apply_pending_rebuild(&mut self) -> RhiResult<()> {
        let extent = self.pending_resize.unwrap_or_else(|| self.swapchain.extent());

        if extent.width == 0 || extent.height == 0 {
            // Minimized; keep the rebuild pending until the extent is drawable
            debug!("Deferring swapchain rebuild while extent is zero");
            return Ok(());
        }

        self.rebuild_swapchain(extent)?;
        self.pending_resize = None;
        Ok(())
    }

    /// Rebuilds the swapchain at `extent`.
    ///
    /// Waits for the device to go idle, constructs the new chain with the
    /// old one as a creation hint, verifies format compatibility, then
    /// retires the old chain.
    fn rebuild_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        info!(
            "Rebuilding swapchain at {}x{}",
            extent.width, extent.height
        );

        self.device.wait_idle()?;

        let new_swapchain = Swapchain::new_with_previous(
            &self.instance,
            self.device.clone(),
            self.surface.handle(),
            extent,
            &self.swapchain,
        )?;

        if !self
            .swapchain
            .formats()
            .is_compatible(&new_swapchain.formats())
        {
            // The surface capabilities changed under us; pipelines and the
            // render pass no longer match the chain
            return Err(RhiError::FormatMismatch);
        }

        // Retire the old chain only now that the new one exists
        unsafe {
            ManuallyDrop::drop(&mut self.swapchain);
        }
        self.swapchain = ManuallyDrop::new(new_swapchain);

        Ok(())
    }
}

impl Drop for FrameOrchestrator {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle during teardown: {:?}", e);
        }

        // Explicit dependency-ordered teardown: swapchain and command pool
        // before the surface. The device Arc and the instance then drop in
        // field order, device first.
        unsafe {
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.surface);
        }

        info!("Rendering core destroyed");
    }
}
