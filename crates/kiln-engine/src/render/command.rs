//! Deferred render commands.
//!
//! A closed set of operations recorded into a `CommandQueue` and executed at
//! the frame's flush point. Payloads are plain values or shared (`Rc`)
//! references, so a command never outlives the resources it names.

use std::rc::Rc;

use bytemuck::Pod;
use glam::{Vec2, Vec4};

use super::buffer::{IndexBuffer, VertexBuffer};
use super::handle::{GpuHandle, TextureId};
use super::transform::Transform;
use super::uniform::UniformValue;
use super::vertex_array::VertexArray;

pub use super::backend::PrimitiveKind;

// ── framebuffer state ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ClearCommand {
    pub color: Vec4,
    pub clear_depth: bool,
    pub clear_stencil: bool,
}

impl ClearCommand {
    /// Colour-only clear.
    pub fn color(color: Vec4) -> Self {
        Self {
            color,
            clear_depth: false,
            clear_stencil: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetViewportCommand {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

// ── program state ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct BindShaderCommand {
    pub program: GpuHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetUniformCommand {
    pub program: GpuHandle,
    pub name: String,
    pub value: UniformValue,
}

impl SetUniformCommand {
    pub fn new(program: GpuHandle, name: impl Into<String>, value: impl Into<UniformValue>) -> Self {
        Self {
            program,
            name: name.into(),
            value: value.into(),
        }
    }
}

// ── draws ─────────────────────────────────────────────────────────────────

/// Indexed draw; `index_offset` counts indices, not bytes.
#[derive(Debug, Clone)]
pub struct DrawIndexedCommand {
    pub vertex_array: Rc<VertexArray>,
    pub index_count: u32,
    pub primitive: PrimitiveKind,
    pub index_offset: u32,
}

#[derive(Debug, Clone)]
pub struct DrawIndexedInstancedCommand {
    pub vertex_array: Rc<VertexArray>,
    pub index_count: u32,
    pub primitive: PrimitiveKind,
    pub index_offset: u32,
    pub instance_count: u32,
}

#[derive(Debug, Clone)]
pub struct DrawArraysCommand {
    pub vertex_array: Rc<VertexArray>,
    pub vertex_count: u32,
    pub vertex_offset: u32,
    pub primitive: PrimitiveKind,
}

/// One textured, tinted sprite on the unit quad.
///
/// `screen_dimensions` is the viewport size the transform is expressed
/// against.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawSpriteCommand {
    pub texture_id: TextureId,
    pub transform: Transform,
    pub screen_dimensions: Vec2,
    pub tint_color: Vec4,
}

impl DrawSpriteCommand {
    /// Untinted sprite.
    pub fn new(texture_id: TextureId, transform: Transform, screen_dimensions: Vec2) -> Self {
        Self {
            texture_id,
            transform,
            screen_dimensions,
            tint_color: Vec4::ONE,
        }
    }

    pub fn with_tint(mut self, tint: Vec4) -> Self {
        self.tint_color = tint;
        self
    }
}

// ── buffer updates ────────────────────────────────────────────────────────

/// Partial upload into a vertex buffer; `offset` is in bytes.
#[derive(Debug, Clone)]
pub struct UpdateVertexBufferCommand {
    pub buffer: Rc<VertexBuffer>,
    pub data: Vec<u8>,
    pub offset: usize,
}

impl UpdateVertexBufferCommand {
    pub fn from_slice<T: Pod>(buffer: Rc<VertexBuffer>, data: &[T], offset: usize) -> Self {
        Self {
            buffer,
            data: bytemuck::cast_slice(data).to_vec(),
            offset,
        }
    }
}

/// Partial upload into an index buffer; `offset` is in indices.
#[derive(Debug, Clone)]
pub struct UpdateIndexBufferCommand {
    pub buffer: Rc<IndexBuffer>,
    pub indices: Vec<u32>,
    pub offset: usize,
}

impl UpdateIndexBufferCommand {
    pub fn new(buffer: Rc<IndexBuffer>, indices: impl Into<Vec<u32>>, offset: usize) -> Self {
        Self {
            buffer,
            indices: indices.into(),
            offset,
        }
    }
}

// ── vertex array binding ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BindVertexArrayCommand {
    pub vertex_array: Rc<VertexArray>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UnbindVertexArrayCommand;

// ── the sum type ──────────────────────────────────────────────────────────

/// Discriminant of a [`RenderCommand`], handy for assertions and logs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CommandKind {
    Clear,
    SetViewport,
    BindShader,
    SetUniform,
    DrawIndexed,
    DrawIndexedInstanced,
    DrawArrays,
    UpdateVertexBuffer,
    UpdateIndexBuffer,
    BindVertexArray,
    UnbindVertexArray,
    DrawSprite,
}

#[derive(Debug, Clone)]
pub enum RenderCommand {
    Clear(ClearCommand),
    SetViewport(SetViewportCommand),
    BindShader(BindShaderCommand),
    SetUniform(SetUniformCommand),
    DrawIndexed(DrawIndexedCommand),
    DrawIndexedInstanced(DrawIndexedInstancedCommand),
    DrawArrays(DrawArraysCommand),
    UpdateVertexBuffer(UpdateVertexBufferCommand),
    UpdateIndexBuffer(UpdateIndexBufferCommand),
    BindVertexArray(BindVertexArrayCommand),
    UnbindVertexArray(UnbindVertexArrayCommand),
    DrawSprite(DrawSpriteCommand),
}

impl RenderCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            RenderCommand::Clear(_) => CommandKind::Clear,
            RenderCommand::SetViewport(_) => CommandKind::SetViewport,
            RenderCommand::BindShader(_) => CommandKind::BindShader,
            RenderCommand::SetUniform(_) => CommandKind::SetUniform,
            RenderCommand::DrawIndexed(_) => CommandKind::DrawIndexed,
            RenderCommand::DrawIndexedInstanced(_) => CommandKind::DrawIndexedInstanced,
            RenderCommand::DrawArrays(_) => CommandKind::DrawArrays,
            RenderCommand::UpdateVertexBuffer(_) => CommandKind::UpdateVertexBuffer,
            RenderCommand::UpdateIndexBuffer(_) => CommandKind::UpdateIndexBuffer,
            RenderCommand::BindVertexArray(_) => CommandKind::BindVertexArray,
            RenderCommand::UnbindVertexArray(_) => CommandKind::UnbindVertexArray,
            RenderCommand::DrawSprite(_) => CommandKind::DrawSprite,
        }
    }

    pub fn as_sprite(&self) -> Option<&DrawSpriteCommand> {
        match self {
            RenderCommand::DrawSprite(s) => Some(s),
            _ => None,
        }
    }
}

macro_rules! impl_from_command {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for RenderCommand {
                fn from(cmd: $ty) -> Self {
                    RenderCommand::$variant(cmd)
                }
            }
        )*
    };
}

impl_from_command!(
    Clear(ClearCommand),
    SetViewport(SetViewportCommand),
    BindShader(BindShaderCommand),
    SetUniform(SetUniformCommand),
    DrawIndexed(DrawIndexedCommand),
    DrawIndexedInstanced(DrawIndexedInstancedCommand),
    DrawArrays(DrawArraysCommand),
    UpdateVertexBuffer(UpdateVertexBufferCommand),
    UpdateIndexBuffer(UpdateIndexBufferCommand),
    BindVertexArray(BindVertexArrayCommand),
    UnbindVertexArray(UnbindVertexArrayCommand),
    DrawSprite(DrawSpriteCommand),
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_impls_pick_the_matching_variant() {
        let c: RenderCommand = ClearCommand::color(Vec4::ZERO).into();
        assert_eq!(c.kind(), CommandKind::Clear);

        let s: RenderCommand =
            DrawSpriteCommand::new(GpuHandle::from_raw(3), Transform::IDENTITY, Vec2::ONE).into();
        assert_eq!(s.kind(), CommandKind::DrawSprite);
        assert_eq!(s.as_sprite().map(|s| s.texture_id.raw()), Some(3));
    }

    #[test]
    fn vertex_update_from_slice_copies_bytes() {
        let (device, _log) = crate::render::device::GraphicsDevice::headless();
        let vb = Rc::new(VertexBuffer::with_data(&device, &[0u8; 16], Default::default()).unwrap());
        let cmd = UpdateVertexBufferCommand::from_slice(vb, &[1.0f32, 2.0], 8);
        assert_eq!(cmd.data.len(), 8);
        assert_eq!(cmd.offset, 8);
    }

    #[test]
    fn uniform_command_converts_values() {
        let cmd = SetUniformCommand::new(GpuHandle::from_raw(1), "u_tint", Vec4::ONE);
        assert_eq!(cmd.value, UniformValue::Vec4(Vec4::ONE));
    }
}
