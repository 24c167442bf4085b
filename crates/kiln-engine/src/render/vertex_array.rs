//! Vertex array: buffers + layouts assembled into one bindable draw unit.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::backend::BufferTarget;
use super::buffer::{IndexBuffer, VertexBuffer};
use super::device::GraphicsDevice;
use super::error::{precondition, RenderResult};
use super::handle::GpuHandle;
use super::layout::VertexLayout;
use super::state::MAX_VERTEX_ATTRIBS;

/// Aggregates vertex buffers, their layouts and at most one index buffer.
///
/// Buffers are shared (`Rc`): the array keeps every buffer it was given alive
/// for at least as long as itself, and a buffer shared with another array is
/// only released when its last owner drops it. Destroying the array releases
/// the array object alone.
#[derive(Debug)]
pub struct VertexArray {
    device: GraphicsDevice,
    handle: Cell<GpuHandle>,
    vertex_buffers: RefCell<Vec<(Rc<VertexBuffer>, VertexLayout)>>,
    index_buffer: RefCell<Option<Rc<IndexBuffer>>>,
    next_slot: Cell<u32>,
}

impl VertexArray {
    #[track_caller]
    pub fn new(device: &GraphicsDevice) -> RenderResult<Self> {
        let handle = device.gen_vertex_array()?;
        log::debug!(target: "kiln::render", "created vertex array {handle}");
        Ok(Self {
            device: device.clone(),
            handle: Cell::new(handle),
            vertex_buffers: RefCell::new(Vec::new()),
            index_buffer: RefCell::new(None),
            next_slot: Cell::new(0),
        })
    }

    #[inline]
    pub fn handle(&self) -> GpuHandle {
        self.handle.get()
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.handle.get().is_null()
    }

    #[track_caller]
    fn live_handle(&self, op: &str) -> GpuHandle {
        let handle = self.handle.get();
        precondition!(!handle.is_null(), "{op} on a destroyed vertex array");
        handle
    }

    /// Binds every attribute of `layout` to successive slots, per-vertex.
    #[track_caller]
    pub fn add_vertex_buffer(&self, buffer: Rc<VertexBuffer>, layout: VertexLayout) -> RenderResult<()> {
        self.attach(buffer, layout, 0)
    }

    /// Like [`add_vertex_buffer`](Self::add_vertex_buffer), but each slot
    /// advances once per instance.
    #[track_caller]
    pub fn add_instance_buffer(&self, buffer: Rc<VertexBuffer>, layout: VertexLayout) -> RenderResult<()> {
        self.attach(buffer, layout, 1)
    }

    #[track_caller]
    fn attach(&self, buffer: Rc<VertexBuffer>, layout: VertexLayout, divisor: u32) -> RenderResult<()> {
        let handle = self.live_handle("add_vertex_buffer");
        precondition!(!buffer.is_destroyed(), "adding a destroyed vertex buffer to vertex array {handle}");

        let first = self.next_slot.get();
        precondition!(
            first + layout.len() as u32 <= MAX_VERTEX_ATTRIBS,
            "vertex array {handle} would exceed {MAX_VERTEX_ATTRIBS} attribute slots"
        );

        self.device.bind_vertex_array(handle)?;
        buffer.bind()?;

        for (i, attr) in layout.attributes().iter().enumerate() {
            let slot = first + i as u32;
            self.device.enable_vertex_attrib(slot)?;
            self.device
                .vertex_attrib_pointer(slot, attr.ty, attr.normalized, layout.stride(), attr.offset())?;
            if divisor != 0 {
                self.device.vertex_attrib_divisor(slot, divisor)?;
            }
        }

        self.device.bind_vertex_array(GpuHandle::NULL)?;

        self.next_slot.set(first + layout.len() as u32);
        self.vertex_buffers.borrow_mut().push((buffer, layout));
        Ok(())
    }

    /// Records `buffer` as this array's element buffer.
    #[track_caller]
    pub fn set_index_buffer(&self, buffer: Rc<IndexBuffer>) -> RenderResult<()> {
        let handle = self.live_handle("set_index_buffer");
        precondition!(!buffer.is_destroyed(), "setting a destroyed index buffer on vertex array {handle}");

        self.device.bind_vertex_array(handle)?;
        self.device.bind_buffer(BufferTarget::ElementArray, buffer.handle())?;
        self.device.bind_vertex_array(GpuHandle::NULL)?;

        *self.index_buffer.borrow_mut() = Some(buffer);
        Ok(())
    }

    pub fn index_buffer(&self) -> Option<Rc<IndexBuffer>> {
        self.index_buffer.borrow().clone()
    }

    pub fn vertex_buffers(&self) -> Vec<Rc<VertexBuffer>> {
        self.vertex_buffers.borrow().iter().map(|(b, _)| Rc::clone(b)).collect()
    }

    /// Next free attribute slot.
    pub fn next_slot(&self) -> u32 {
        self.next_slot.get()
    }

    #[track_caller]
    pub fn bind(&self) -> RenderResult<()> {
        let handle = self.live_handle("bind");
        self.device.bind_vertex_array(handle)
    }

    #[track_caller]
    pub fn unbind(&self) -> RenderResult<()> {
        self.device.bind_vertex_array(GpuHandle::NULL)
    }

    /// Releases the array object and drops its buffer references. Buffers
    /// still owned elsewhere stay alive. Later calls are no-ops.
    #[track_caller]
    pub fn destroy(&self) -> RenderResult<()> {
        let handle = self.handle.replace(GpuHandle::NULL);
        if handle.is_null() {
            return Ok(());
        }
        self.vertex_buffers.borrow_mut().clear();
        self.index_buffer.borrow_mut().take();
        self.next_slot.set(0);
        log::debug!(target: "kiln::render", "destroying vertex array {handle}");
        self.device.delete_vertex_array(handle)
    }
}

impl Drop for VertexArray {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            log::warn!(target: "kiln::render", "vertex array release failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::{ApiCall, BufferUsage};
    use crate::render::layout::AttributeType;

    fn pos_uv_layout() -> VertexLayout {
        VertexLayout::default()
            .with("a_pos", AttributeType::Float2)
            .with("a_uv", AttributeType::Float2)
    }

    #[test]
    fn attributes_take_successive_slots_with_layout_offsets() {
        let (device, log) = GraphicsDevice::headless();
        let vb = Rc::new(VertexBuffer::with_data(&device, &[0u8; 64], BufferUsage::Static).unwrap());
        let vb2 = Rc::new(VertexBuffer::with_data(&device, &[0u8; 64], BufferUsage::Static).unwrap());
        let va = VertexArray::new(&device).unwrap();

        va.add_vertex_buffer(vb, pos_uv_layout()).unwrap();
        va.add_instance_buffer(vb2, VertexLayout::default().with("a_tint", AttributeType::Float4))
            .unwrap();
        assert_eq!(va.next_slot(), 3);

        let pointers: Vec<(u32, usize, usize)> = log
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::VertexAttribPointer { slot, stride, offset, .. } => Some((slot, stride, offset)),
                _ => None,
            })
            .collect();
        assert_eq!(pointers, vec![(0, 16, 0), (1, 16, 8), (2, 16, 0)]);

        assert_eq!(
            log.count(|c| matches!(c, ApiCall::VertexAttribDivisor { slot: 2, divisor: 1 })),
            1
        );
    }

    #[test]
    fn index_buffer_is_recorded_on_the_array() {
        let (device, _log) = GraphicsDevice::headless();
        let ib = Rc::new(IndexBuffer::with_indices(&device, &[0, 1, 2], BufferUsage::Static).unwrap());
        let va = VertexArray::new(&device).unwrap();
        va.set_index_buffer(Rc::clone(&ib)).unwrap();

        assert_eq!(device.element_buffer_of(va.handle()), Some(ib.handle()));
        assert!(device.bound_vertex_array().is_null());
    }

    #[test]
    fn destroying_one_array_keeps_shared_buffers_alive() {
        let (device, log) = GraphicsDevice::headless();
        let vb = Rc::new(VertexBuffer::with_data(&device, &[0u8; 64], BufferUsage::Static).unwrap());

        let a = VertexArray::new(&device).unwrap();
        let b = VertexArray::new(&device).unwrap();
        a.add_vertex_buffer(Rc::clone(&vb), pos_uv_layout()).unwrap();
        b.add_vertex_buffer(Rc::clone(&vb), pos_uv_layout()).unwrap();
        drop(vb);

        a.destroy().unwrap();
        assert_eq!(log.count(|c| matches!(c, ApiCall::DeleteBuffer { .. })), 0);

        let shared = b.vertex_buffers().remove(0);
        assert!(!shared.is_destroyed());
        assert_eq!(device.buffer_size(shared.handle()), Some(64));

        drop(shared);
        drop(b);
        assert_eq!(log.count(|c| matches!(c, ApiCall::DeleteBuffer { .. })), 1);
    }

    #[test]
    fn destroy_is_idempotent() {
        let (device, log) = GraphicsDevice::headless();
        let va = VertexArray::new(&device).unwrap();
        va.destroy().unwrap();
        va.destroy().unwrap();
        drop(va);
        assert_eq!(log.count(|c| matches!(c, ApiCall::DeleteVertexArray { .. })), 1);
    }

    #[test]
    #[should_panic(expected = "destroyed vertex array")]
    fn binding_destroyed_array_is_fatal() {
        let (device, _log) = GraphicsDevice::headless();
        let va = VertexArray::new(&device).unwrap();
        va.destroy().unwrap();
        let _ = va.bind();
    }
}
