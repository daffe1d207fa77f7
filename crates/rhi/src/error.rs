//! RHI-specific error types.
//!
//! The variants map onto the failure classes the frame core distinguishes:
//! fatal initialization failures (device object creation), capability
//! mismatches detected at runtime (format change, uniform range overflow),
//! and validation failures in the descriptor layer. Transient swapchain
//! staleness and descriptor pool exhaustion are deliberately *not* errors;
//! those are reported as `Ok(None)`/`Ok(true)` values by their operations.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocation error: {0}")]
    Allocation(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Buffer mapping error
    #[error("Map error: {0}")]
    Map(String),

    /// A descriptor layout builder saw the same binding slot twice
    #[error("Descriptor binding {0} already in use")]
    DuplicateBinding(u32),

    /// A descriptor write did not match the layout's declared binding
    #[error("Descriptor layout mismatch: {0}")]
    LayoutMismatch(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    Surface(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    Swapchain(String),

    /// Swapchain image or depth format changed across a rebuild
    #[error("Swapchain image or depth format has changed")]
    FormatMismatch,

    /// A per-draw dynamic offset fell outside the device's uniform range
    #[error("Dynamic uniform offset {offset} exceeds device range {max_range}")]
    UniformRangeExceeded { offset: u32, max_range: u32 },

    /// Shader loading or module creation error
    #[error("Shader error: {0}")]
    Shader(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
