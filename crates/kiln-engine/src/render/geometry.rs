//! Ready-to-draw geometry built on a [`VertexArray`].

use std::rc::Rc;

use bytemuck::{Pod, Zeroable};

use super::backend::BufferUsage;
use super::buffer::{IndexBuffer, VertexBuffer};
use super::device::GraphicsDevice;
use super::error::{precondition, RenderResult};
use super::layout::{AttributeType, VertexLayout};
use super::vertex_array::VertexArray;

/// One quad vertex: position in `xy`, texture coordinate in `zw`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub pos_uv: [f32; 4],
}

/// Two triangles sharing the 1–2 edge.
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 1, 3];

/// Layout of the quad vertex stream: one packed `vec4`.
pub fn quad_layout() -> VertexLayout {
    VertexLayout::default().with("a_vertex", AttributeType::Float4)
}

/// A shared vertex array with preloaded vertex/index data.
#[derive(Debug)]
pub struct Geometry {
    vertex_array: Rc<VertexArray>,
    vertex_buffer: Rc<VertexBuffer>,
    index_buffer: Rc<IndexBuffer>,
    layout: VertexLayout,
}

impl Geometry {
    /// Builds a `width` × `height` quad centred on the origin.
    ///
    /// UV `(0, 0)` sits at the `-x, -y` corner, which is the top-left one in a
    /// +Y-down space.
    #[track_caller]
    pub fn create_quad(device: &GraphicsDevice, width: f32, height: f32) -> RenderResult<Rc<Self>> {
        let (hw, hh) = (width * 0.5, height * 0.5);
        let vertices = [
            QuadVertex { pos_uv: [-hw, -hh, 0.0, 0.0] },
            QuadVertex { pos_uv: [hw, -hh, 1.0, 0.0] },
            QuadVertex { pos_uv: [-hw, hh, 0.0, 1.0] },
            QuadVertex { pos_uv: [hw, hh, 1.0, 1.0] },
        ];

        let vertex_buffer = Rc::new(VertexBuffer::from_slice(device, &vertices, BufferUsage::Static)?);
        let index_buffer = Rc::new(IndexBuffer::with_indices(device, &QUAD_INDICES, BufferUsage::Static)?);
        let layout = quad_layout();

        let vertex_array = Rc::new(VertexArray::new(device)?);
        vertex_array.add_vertex_buffer(Rc::clone(&vertex_buffer), layout.clone())?;
        vertex_array.set_index_buffer(Rc::clone(&index_buffer))?;

        log::debug!(target: "kiln::render", "created {width}x{height} quad geometry");

        Ok(Rc::new(Self {
            vertex_array,
            vertex_buffer,
            index_buffer,
            layout,
        }))
    }

    pub fn vertex_array(&self) -> &Rc<VertexArray> {
        &self.vertex_array
    }

    pub fn vertex_buffer(&self) -> &Rc<VertexBuffer> {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &Rc<IndexBuffer> {
        &self.index_buffer
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    /// Number of vertices currently stored.
    pub fn vertex_count(&self) -> usize {
        match self.layout.stride() {
            0 => 0,
            stride => self.vertex_buffer.size() / stride,
        }
    }

    /// # Panics
    /// If the geometry was destroyed or has no index buffer.
    #[track_caller]
    pub fn index_count(&self) -> usize {
        precondition!(!self.vertex_array.is_destroyed(), "index_count on destroyed geometry");
        let ib = self.vertex_array.index_buffer();
        precondition!(ib.is_some(), "index_count on geometry without an index buffer");
        ib.map_or(0, |ib| ib.count())
    }

    #[track_caller]
    pub fn bind(&self) -> RenderResult<()> {
        self.vertex_array.bind()
    }

    #[track_caller]
    pub fn unbind(&self) -> RenderResult<()> {
        self.vertex_array.unbind()
    }

    #[track_caller]
    pub fn destroy(&self) -> RenderResult<()> {
        self.vertex_array.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::ApiCall;

    #[test]
    fn quad_has_four_vertices_and_six_indices() {
        let (device, _log) = GraphicsDevice::headless();
        let quad = Geometry::create_quad(&device, 2.0, 4.0).unwrap();

        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(quad.index_buffer().count(), 6);
        assert_eq!(quad.index_count(), 6);
        assert_eq!(quad.layout().stride(), 16);
    }

    #[test]
    fn quad_vertices_are_centered_with_uvs() {
        let (device, _log) = GraphicsDevice::headless();
        let quad = Geometry::create_quad(&device, 2.0, 4.0).unwrap();

        let bytes = device.buffer_contents(quad.vertex_buffer().handle()).unwrap();
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(&floats[0..4], &[-1.0, -2.0, 0.0, 0.0]);
        assert_eq!(&floats[12..16], &[1.0, 2.0, 1.0, 1.0]);

        let indices = device.buffer_contents(quad.index_buffer().handle()).unwrap();
        assert_eq!(indices, bytemuck::cast_slice::<u32, u8>(&QUAD_INDICES).to_vec());
    }

    #[test]
    #[should_panic(expected = "destroyed geometry")]
    fn index_count_after_destroy_is_fatal() {
        let (device, _log) = GraphicsDevice::headless();
        let quad = Geometry::create_quad(&device, 1.0, 1.0).unwrap();
        quad.destroy().unwrap();
        quad.index_count();
    }

    #[test]
    fn destroy_forwards_to_vertex_array_once() {
        let (device, log) = GraphicsDevice::headless();
        let quad = Geometry::create_quad(&device, 1.0, 1.0).unwrap();
        quad.destroy().unwrap();
        quad.destroy().unwrap();
        assert_eq!(log.count(|c| matches!(c, ApiCall::DeleteVertexArray { .. })), 1);
    }
}
