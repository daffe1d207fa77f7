//! Platform layer: windowing, surface creation, and input state.
//!
//! This crate wraps winit and ash-window so the rest of the renderer never
//! talks to the window system directly. It provides:
//! - [`Window`] and [`Surface`] for presentation
//! - [`InputState`], a per-frame input context object queried by the frame
//!   loop instead of global callback state

mod input;
mod window;

pub use input::{InputState, KeyCode, MouseButton};
pub use window::{Surface, Window};
