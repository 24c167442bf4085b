//! Contract between the window runtime and the program driving it.
//!
//! The runtime owns the event loop and one [`Gpu`](crate::device::Gpu) per
//! window; an [`App`] only sees the per-frame [`FrameCtx`].

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::{FrameCtx, WindowCtx};
