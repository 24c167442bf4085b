//! Window-bound GPU device.
//!
//! Creates the wgpu instance, adapter, device and queue for one window,
//! keeps its surface configured, and hands out one presentable frame at a time.
//! The render core never sees this module: it reaches the GPU through a
//! `render::WgpuBackend` built from [`Gpu::device`] and [`Gpu::queue`].

mod error;
mod frame;
mod gpu;
mod init;
mod surface;

pub use error::SurfaceErrorAction;
pub use frame::GpuFrame;
pub use gpu::Gpu;
pub use init::GpuInit;
