//! kiln engine crate.
//!
//! `render` is the platform-independent submission core: GPU resource
//! wrappers, render commands and the command queue, all running on an
//! emulated graphics context with a pluggable backend. The remaining modules
//! host it in a winit window on wgpu.

pub mod render;

pub mod device;
pub mod window;
pub mod time;
pub mod core;

pub mod logging;
