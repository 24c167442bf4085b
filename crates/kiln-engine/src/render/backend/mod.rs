//! Graphics backends.
//!
//! The emulated context in `state` owns all API semantics (handles, bound state,
//! error codes). A backend only observes the resulting call stream and realizes
//! its effects:
//! - `HeadlessBackend` records the stream (used by tests and tools)
//! - `WgpuBackend` renders it with wgpu

mod headless;
mod wgpu_backend;

pub use headless::{CallLog, HeadlessBackend};
pub use wgpu_backend::WgpuBackend;

use glam::Vec4;

use super::error::ApiError;
use super::handle::GpuHandle;
use super::layout::AttributeType;
use super::reflect::{LinkedProgram, ShaderStage};
use super::uniform::{UniformLocation, UniformValue};

// ── call vocabulary ───────────────────────────────────────────────────────

/// Binding point of a buffer object.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
}

/// Update-frequency hint supplied with a full buffer upload.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum BufferUsage {
    #[default]
    Static,
    Dynamic,
    Stream,
}

/// Primitive assembly mode for draw calls.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum PrimitiveKind {
    #[default]
    Triangles,
    TriangleStrip,
    Lines,
    LineStrip,
    Points,
}

/// Viewport rectangle in framebuffer pixels, bottom-left origin.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One traced call into the emulated context.
///
/// Every entry point of `GraphicsDevice` produces exactly one of these before it
/// runs, so a recorded trace is the full, ordered history of GPU-facing work.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    GenBuffer { buffer: GpuHandle },
    BindBuffer { target: BufferTarget, buffer: GpuHandle },
    BufferData { buffer: GpuHandle, size: usize, usage: BufferUsage },
    BufferSubData { buffer: GpuHandle, offset: usize, size: usize },
    DeleteBuffer { buffer: GpuHandle },

    GenVertexArray { vertex_array: GpuHandle },
    BindVertexArray { vertex_array: GpuHandle },
    EnableVertexAttrib { slot: u32 },
    VertexAttribPointer { slot: u32, ty: AttributeType, normalized: bool, stride: usize, offset: usize },
    VertexAttribDivisor { slot: u32, divisor: u32 },
    DeleteVertexArray { vertex_array: GpuHandle },

    CreateShader { shader: GpuHandle, stage: ShaderStage },
    CompileShader { shader: GpuHandle },
    DeleteShader { shader: GpuHandle },
    CreateProgram { program: GpuHandle },
    AttachShader { program: GpuHandle, shader: GpuHandle },
    LinkProgram { program: GpuHandle },
    ValidateProgram { program: GpuHandle },
    UseProgram { program: GpuHandle },
    DeleteProgram { program: GpuHandle },
    GetUniformLocation { program: GpuHandle, name: String },
    ProgramUniform { program: GpuHandle, location: UniformLocation, value: UniformValue },

    CreateTexture { width: u32, height: u32 },
    BindTexture { texture: GpuHandle },
    DeleteTexture { texture: GpuHandle },

    Viewport(Viewport),
    Clear { color: Vec4, depth: bool, stencil: bool },
    DrawArrays { mode: PrimitiveKind, first: u32, count: u32, instances: u32 },
    DrawElements { mode: PrimitiveKind, count: u32, offset: usize, instances: u32 },
}

impl ApiCall {
    /// GL-style entry point name, used in logs and error reports.
    pub const fn name(&self) -> &'static str {
        match self {
            ApiCall::GenBuffer { .. } => "glGenBuffers",
            ApiCall::BindBuffer { .. } => "glBindBuffer",
            ApiCall::BufferData { .. } => "glNamedBufferData",
            ApiCall::BufferSubData { .. } => "glNamedBufferSubData",
            ApiCall::DeleteBuffer { .. } => "glDeleteBuffers",
            ApiCall::GenVertexArray { .. } => "glGenVertexArrays",
            ApiCall::BindVertexArray { .. } => "glBindVertexArray",
            ApiCall::EnableVertexAttrib { .. } => "glEnableVertexAttribArray",
            ApiCall::VertexAttribPointer { .. } => "glVertexAttribPointer",
            ApiCall::VertexAttribDivisor { .. } => "glVertexAttribDivisor",
            ApiCall::DeleteVertexArray { .. } => "glDeleteVertexArrays",
            ApiCall::CreateShader { .. } => "glCreateShader",
            ApiCall::CompileShader { .. } => "glCompileShader",
            ApiCall::DeleteShader { .. } => "glDeleteShader",
            ApiCall::CreateProgram { .. } => "glCreateProgram",
            ApiCall::AttachShader { .. } => "glAttachShader",
            ApiCall::LinkProgram { .. } => "glLinkProgram",
            ApiCall::ValidateProgram { .. } => "glValidateProgram",
            ApiCall::UseProgram { .. } => "glUseProgram",
            ApiCall::DeleteProgram { .. } => "glDeleteProgram",
            ApiCall::GetUniformLocation { .. } => "glGetUniformLocation",
            ApiCall::ProgramUniform { .. } => "glProgramUniform",
            ApiCall::CreateTexture { .. } => "glTexImage2D",
            ApiCall::BindTexture { .. } => "glBindTexture",
            ApiCall::DeleteTexture { .. } => "glDeleteTextures",
            ApiCall::Viewport(_) => "glViewport",
            ApiCall::Clear { .. } => "glClear",
            ApiCall::DrawArrays { .. } => "glDrawArraysInstanced",
            ApiCall::DrawElements { .. } => "glDrawElementsInstanced",
        }
    }

    pub const fn is_draw(&self) -> bool {
        matches!(self, ApiCall::DrawArrays { .. } | ApiCall::DrawElements { .. })
    }
}

// ── effect payloads ───────────────────────────────────────────────────────

/// One enabled vertex attribute as captured at draw time.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct AttributeBinding {
    pub slot: u32,
    pub buffer: GpuHandle,
    pub ty: AttributeType,
    pub normalized: bool,
    pub stride: usize,
    pub offset: usize,
    pub divisor: u32,
}

/// Element range of an indexed draw (32-bit indices).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct IndexRange {
    pub buffer: GpuHandle,
    /// First index, in indices.
    pub first: u32,
    pub count: u32,
}

/// A fully validated draw, with every piece of state it depends on resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawPacket {
    pub program: GpuHandle,
    pub mode: PrimitiveKind,
    pub attributes: Vec<AttributeBinding>,
    pub indices: Option<IndexRange>,
    /// Vertex range for non-indexed draws.
    pub first_vertex: u32,
    pub vertex_count: u32,
    pub instances: u32,
    /// Snapshot of the program's uniform block storage.
    pub uniforms: Vec<u8>,
    pub texture: Option<GpuHandle>,
    pub viewport: Viewport,
}

/// A framebuffer clear.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ClearRequest {
    pub color: Vec4,
    pub depth: bool,
    pub stencil: bool,
}

// ── backend contract ──────────────────────────────────────────────────────

/// Sink for the emulated context's call stream.
///
/// All hooks run while the context is borrowed; implementations keep their own
/// interior state and must not call back into `GraphicsDevice`.
pub trait Backend {
    /// Called before every API call, in submission order.
    fn trace(&self, call: &ApiCall) {
        let _ = call;
    }

    /// Full replacement of a buffer's contents.
    fn buffer_data(&self, buffer: GpuHandle, data: &[u8], usage: BufferUsage) {
        let _ = (buffer, data, usage);
    }

    /// Partial update of `offset..offset + len`; `contents` is the whole buffer
    /// after the update.
    fn buffer_sub_data(&self, buffer: GpuHandle, offset: usize, len: usize, contents: &[u8]) {
        let _ = (buffer, offset, len, contents);
    }

    fn buffer_deleted(&self, buffer: GpuHandle) {
        let _ = buffer;
    }

    fn texture_created(&self, texture: GpuHandle, width: u32, height: u32, rgba: &[u8]) {
        let _ = (texture, width, height, rgba);
    }

    fn texture_deleted(&self, texture: GpuHandle) {
        let _ = texture;
    }

    fn program_linked(&self, program: GpuHandle, linked: &LinkedProgram) {
        let _ = (program, linked);
    }

    fn program_deleted(&self, program: GpuHandle) {
        let _ = program;
    }

    fn clear(&self, request: &ClearRequest) -> Result<(), ApiError> {
        let _ = request;
        Ok(())
    }

    fn draw(&self, packet: &DrawPacket) -> Result<(), ApiError> {
        let _ = packet;
        Ok(())
    }
}
