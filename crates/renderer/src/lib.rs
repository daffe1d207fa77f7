//! Frame orchestration and draw submission for the helio renderer.
//!
//! This crate drives the per-frame protocol on top of `helio_rhi`:
//! - [`FrameOrchestrator`] sequences begin/end-frame and render-pass
//!   bracketing across the frames in flight, and owns the swapchain rebuild
//!   protocol
//! - [`DrawSubmitter`] binds pipelines and issues draws over a collection of
//!   entities, feeding per-draw data through an offset-indexed dynamic
//!   uniform buffer
//! - [`ubo`] defines the uniform and push-constant layouts shared with the
//!   shaders

pub mod draw;
pub mod frame;
pub mod orchestrator;
pub mod ubo;

pub use draw::{DrawSubmitter, PipelineVariant};
pub use frame::{FrameContext, FramePhase, FrameTracker};
pub use orchestrator::FrameOrchestrator;

pub use helio_rhi::swapchain::MAX_FRAMES_IN_FLIGHT;
