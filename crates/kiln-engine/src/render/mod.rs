//! Rendering submission.
//!
//! Engine code describes a frame as [`RenderCommand`]s, submits them to a
//! [`RenderContext`], and the context's [`CommandQueue`] executes them against a
//! [`GraphicsDevice`], either one by one or with consecutive sprite draws
//! folded into instanced batches.
//!
//! Convention:
//! - sprite coordinates are in pixels (top-left origin, +Y down)
//! - viewports follow the device convention (bottom-left origin)
//! - API failures surface as [`RenderError`]; broken preconditions panic

mod handle;
mod error;
mod layout;
mod uniform;
pub mod reflect;
pub mod backend;
mod state;
mod device;

mod buffer;
mod vertex_array;
mod geometry;
mod shader;
mod shader_library;

pub mod command;
mod transform;
pub mod batch;
mod queue;
mod context;

pub use handle::{GpuHandle, TextureId};
pub use error::{ApiError, ApiErrors, RenderError, RenderResult};
pub use layout::{AttributeType, VertexAttribute, VertexLayout};
pub use uniform::{UniformLocation, UniformValue};
pub use backend::{
    Backend, BufferTarget, BufferUsage, CallLog, HeadlessBackend, PrimitiveKind, Viewport,
    WgpuBackend,
};
pub use device::GraphicsDevice;

pub use buffer::{GpuBuffer, IndexBuffer, VertexBuffer};
pub use vertex_array::VertexArray;
pub use geometry::{quad_layout, Geometry, QuadVertex, QUAD_INDICES};
pub use shader::{Shader, ShaderDiagnostic, ShaderPhase};
pub use shader_library::ShaderLibrary;

pub use command::{CommandKind, RenderCommand};
pub use transform::{screen_projection, Transform};
pub use queue::{CommandQueue, FlushStats};
pub use context::{ExecutionMode, RenderConfig, RenderContext};
