//! Core utilities for the helio renderer.
//!
//! This crate provides foundational types and utilities used across the
//! renderer:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing

mod error;
mod logging;
mod timer;

pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
