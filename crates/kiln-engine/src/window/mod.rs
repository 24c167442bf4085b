//! winit event loop and per-window GPU ownership.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig, RuntimeCtx};
