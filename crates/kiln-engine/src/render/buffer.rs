//! RAII wrappers over GPU buffer objects.
//!
//! `VertexBuffer` and `IndexBuffer` share one handle-lifecycle core
//! ([`GpuBuffer`]) tagged with its [`BufferTarget`]. Wrappers are move-only;
//! sharing goes through `Rc`, and the GPU object is released exactly once, on
//! `destroy` or on drop of the last owner.

use std::cell::Cell;

use bytemuck::Pod;

use super::backend::{BufferTarget, BufferUsage};
use super::device::GraphicsDevice;
use super::error::{precondition, RenderResult};
use super::handle::GpuHandle;

const INDEX_SIZE: usize = std::mem::size_of::<u32>();

/// Handle lifecycle shared by both buffer kinds.
#[derive(Debug)]
pub struct GpuBuffer {
    device: GraphicsDevice,
    handle: Cell<GpuHandle>,
    size: Cell<usize>,
    target: BufferTarget,
}

impl GpuBuffer {
    #[track_caller]
    fn create(device: &GraphicsDevice, target: BufferTarget) -> RenderResult<Self> {
        let handle = device.gen_buffer()?;
        log::debug!(target: "kiln::render", "created {target:?} buffer {handle}");
        Ok(Self {
            device: device.clone(),
            handle: Cell::new(handle),
            size: Cell::new(0),
            target,
        })
    }

    #[inline]
    pub fn handle(&self) -> GpuHandle {
        self.handle.get()
    }

    #[inline]
    pub fn target(&self) -> BufferTarget {
        self.target
    }

    /// Current size in bytes (from the last `set_data`).
    #[inline]
    pub fn size(&self) -> usize {
        self.size.get()
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.handle.get().is_null()
    }

    #[track_caller]
    fn live_handle(&self, op: &str) -> GpuHandle {
        let handle = self.handle.get();
        precondition!(!handle.is_null(), "{op} on a destroyed {:?} buffer", self.target);
        handle
    }

    #[track_caller]
    fn set_data(&self, bytes: &[u8], usage: BufferUsage) -> RenderResult<()> {
        let handle = self.live_handle("set_data");
        self.device.buffer_data(handle, bytes, usage)?;
        self.size.set(bytes.len());
        Ok(())
    }

    #[track_caller]
    fn update_data(&self, bytes: &[u8], offset: usize) -> RenderResult<()> {
        let handle = self.live_handle("update_data");
        let size = self.size.get();
        precondition!(
            offset.checked_add(bytes.len()).is_some_and(|end| end <= size),
            "update of {} bytes at offset {offset} overflows {:?} buffer {handle} of {size} bytes",
            bytes.len(),
            self.target
        );
        self.device.buffer_sub_data(handle, offset, bytes)
    }

    #[track_caller]
    fn bind(&self) -> RenderResult<()> {
        let handle = self.live_handle("bind");
        self.device.bind_buffer(self.target, handle)
    }

    #[track_caller]
    fn unbind(&self) -> RenderResult<()> {
        self.device.bind_buffer(self.target, GpuHandle::NULL)
    }

    /// Releases the GPU object. Later calls are no-ops.
    #[track_caller]
    fn destroy(&self) -> RenderResult<()> {
        let handle = self.handle.replace(GpuHandle::NULL);
        if handle.is_null() {
            return Ok(());
        }
        self.size.set(0);
        log::debug!(target: "kiln::render", "destroying {:?} buffer {handle}", self.target);
        self.device.delete_buffer(handle)
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            log::warn!(target: "kiln::render", "buffer release failed: {e}");
        }
    }
}

// ── vertex buffer ─────────────────────────────────────────────────────────

/// Interleaved vertex (or per-instance) data.
#[derive(Debug)]
pub struct VertexBuffer(GpuBuffer);

impl VertexBuffer {
    #[track_caller]
    pub fn new(device: &GraphicsDevice) -> RenderResult<Self> {
        GpuBuffer::create(device, BufferTarget::Array).map(Self)
    }

    #[track_caller]
    pub fn with_data(device: &GraphicsDevice, bytes: &[u8], usage: BufferUsage) -> RenderResult<Self> {
        let vb = Self::new(device)?;
        vb.set_data(bytes, usage)?;
        Ok(vb)
    }

    #[track_caller]
    pub fn from_slice<T: Pod>(device: &GraphicsDevice, data: &[T], usage: BufferUsage) -> RenderResult<Self> {
        Self::with_data(device, bytemuck::cast_slice(data), usage)
    }

    /// Replaces the whole contents and records the new size.
    #[track_caller]
    pub fn set_data(&self, bytes: &[u8], usage: BufferUsage) -> RenderResult<()> {
        self.0.set_data(bytes, usage)
    }

    /// Overwrites `offset..offset + bytes.len()`.
    ///
    /// # Panics
    /// If the range exceeds the current size, or the buffer was destroyed.
    #[track_caller]
    pub fn update_data(&self, bytes: &[u8], offset: usize) -> RenderResult<()> {
        self.0.update_data(bytes, offset)
    }

    #[track_caller]
    pub fn bind(&self) -> RenderResult<()> {
        self.0.bind()
    }

    #[track_caller]
    pub fn unbind(&self) -> RenderResult<()> {
        self.0.unbind()
    }

    #[track_caller]
    pub fn destroy(&self) -> RenderResult<()> {
        self.0.destroy()
    }

    pub fn handle(&self) -> GpuHandle {
        self.0.handle()
    }

    pub fn size(&self) -> usize {
        self.0.size()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.is_destroyed()
    }

    pub fn raw(&self) -> &GpuBuffer {
        &self.0
    }
}

// ── index buffer ──────────────────────────────────────────────────────────

/// 32-bit element indices. Tracks an element count separate from byte size.
#[derive(Debug)]
pub struct IndexBuffer {
    buffer: GpuBuffer,
    count: Cell<usize>,
}

impl IndexBuffer {
    #[track_caller]
    pub fn new(device: &GraphicsDevice) -> RenderResult<Self> {
        Ok(Self {
            buffer: GpuBuffer::create(device, BufferTarget::ElementArray)?,
            count: Cell::new(0),
        })
    }

    #[track_caller]
    pub fn with_indices(device: &GraphicsDevice, indices: &[u32], usage: BufferUsage) -> RenderResult<Self> {
        let ib = Self::new(device)?;
        ib.set_indices(indices, usage)?;
        Ok(ib)
    }

    #[track_caller]
    pub fn set_indices(&self, indices: &[u32], usage: BufferUsage) -> RenderResult<()> {
        self.buffer.set_data(bytemuck::cast_slice(indices), usage)?;
        self.count.set(indices.len());
        Ok(())
    }

    /// Raw-byte replacement; the element count becomes `bytes.len() / 4`.
    #[track_caller]
    pub fn set_data(&self, bytes: &[u8], usage: BufferUsage) -> RenderResult<()> {
        self.buffer.set_data(bytes, usage)?;
        self.count.set(bytes.len() / INDEX_SIZE);
        Ok(())
    }

    /// Overwrites indices starting at index `offset` (not bytes).
    ///
    /// # Panics
    /// If the range exceeds the current size, or the buffer was destroyed.
    #[track_caller]
    pub fn update_indices(&self, indices: &[u32], offset: usize) -> RenderResult<()> {
        let byte_offset = offset.checked_mul(INDEX_SIZE);
        precondition!(
            byte_offset.is_some(),
            "update of {} indices at index {offset} overflows index buffer {}",
            indices.len(),
            self.handle()
        );
        self.buffer
            .update_data(bytemuck::cast_slice(indices), byte_offset.unwrap_or(usize::MAX))
    }

    #[track_caller]
    pub fn update_data(&self, bytes: &[u8], offset: usize) -> RenderResult<()> {
        self.buffer.update_data(bytes, offset)
    }

    #[track_caller]
    pub fn bind(&self) -> RenderResult<()> {
        self.buffer.bind()
    }

    #[track_caller]
    pub fn unbind(&self) -> RenderResult<()> {
        self.buffer.unbind()
    }

    #[track_caller]
    pub fn destroy(&self) -> RenderResult<()> {
        self.count.set(0);
        self.buffer.destroy()
    }

    pub fn count(&self) -> usize {
        self.count.get()
    }

    pub fn handle(&self) -> GpuHandle {
        self.buffer.handle()
    }

    pub fn size(&self) -> usize {
        self.buffer.size()
    }

    pub fn is_destroyed(&self) -> bool {
        self.buffer.is_destroyed()
    }

    pub fn raw(&self) -> &GpuBuffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::ApiCall;

    fn device() -> (GraphicsDevice, crate::render::backend::CallLog) {
        GraphicsDevice::headless()
    }

    // ── sizes ────────────────────────────────────────────────────────────

    #[test]
    fn set_data_records_size() {
        let (device, _log) = device();
        let vb = VertexBuffer::new(&device).unwrap();
        assert_eq!(vb.size(), 0);

        vb.set_data(&[0u8; 48], BufferUsage::Static).unwrap();
        assert_eq!(vb.size(), 48);
        assert_eq!(device.buffer_size(vb.handle()), Some(48));
    }

    #[test]
    fn index_count_is_distinct_from_byte_size() {
        let (device, _log) = device();
        let ib = IndexBuffer::with_indices(&device, &[0, 1, 2, 2, 1, 3], BufferUsage::Static).unwrap();
        assert_eq!(ib.count(), 6);
        assert_eq!(ib.size(), 24);
    }

    // ── updates ──────────────────────────────────────────────────────────

    #[test]
    fn update_within_bounds_writes_range() {
        let (device, _log) = device();
        let vb = VertexBuffer::with_data(&device, &[0u8; 8], BufferUsage::Dynamic).unwrap();
        vb.update_data(&[7, 7], 6).unwrap();
        assert_eq!(
            device.buffer_contents(vb.handle()).unwrap(),
            vec![0, 0, 0, 0, 0, 0, 7, 7]
        );
    }

    #[test]
    fn update_indices_offset_is_in_elements() {
        let (device, _log) = device();
        let ib = IndexBuffer::with_indices(&device, &[0, 0, 0], BufferUsage::Dynamic).unwrap();
        ib.update_indices(&[9], 2).unwrap();
        let bytes = device.buffer_contents(ib.handle()).unwrap();
        assert_eq!(&bytes[8..12], &9u32.to_ne_bytes());
    }

    #[test]
    #[should_panic(expected = "overflows")]
    fn update_past_end_is_fatal() {
        let (device, _log) = device();
        let vb = VertexBuffer::with_data(&device, &[0u8; 8], BufferUsage::Dynamic).unwrap();
        let _ = vb.update_data(&[1, 2, 3], 6);
    }

    #[test]
    #[should_panic(expected = "overflows index buffer")]
    fn index_offset_that_wraps_in_bytes_is_fatal() {
        let (device, _log) = device();
        let ib = IndexBuffer::with_indices(&device, &[1, 2, 3], BufferUsage::Dynamic).unwrap();
        let _ = ib.update_indices(&[9], usize::MAX / INDEX_SIZE + 1);
    }

    #[test]
    fn wrapped_index_update_leaves_contents_alone() {
        let (device, _log) = device();
        let ib = IndexBuffer::with_indices(&device, &[1, 2, 3], BufferUsage::Dynamic).unwrap();
        let attempt = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = ib.update_indices(&[9], usize::MAX / INDEX_SIZE + 1);
        }));
        assert!(attempt.is_err());
        let expected: &[u8] = bytemuck::cast_slice(&[1u32, 2, 3]);
        assert_eq!(device.buffer_contents(ib.handle()).unwrap(), expected);
    }

    #[test]
    fn rejected_update_is_never_partially_applied() {
        let (device, _log) = device();
        let vb = VertexBuffer::with_data(&device, &[0u8; 4], BufferUsage::Dynamic).unwrap();
        let attempt = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = vb.update_data(&[1, 1, 1, 1, 1], 0);
        }));
        assert!(attempt.is_err());
        assert_eq!(device.buffer_contents(vb.handle()).unwrap(), vec![0; 4]);
    }

    // ── lifecycle ────────────────────────────────────────────────────────

    #[test]
    #[should_panic(expected = "destroyed")]
    fn bind_after_destroy_is_fatal() {
        let (device, _log) = device();
        let vb = VertexBuffer::new(&device).unwrap();
        vb.destroy().unwrap();
        let _ = vb.bind();
    }

    #[test]
    fn destroy_twice_releases_once() {
        let (device, log) = device();
        let ib = IndexBuffer::new(&device).unwrap();
        ib.destroy().unwrap();
        ib.destroy().unwrap();
        drop(ib);

        assert_eq!(log.count(|c| matches!(c, ApiCall::DeleteBuffer { .. })), 1);
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn drop_releases_the_handle() {
        let (device, _log) = device();
        {
            let _vb = VertexBuffer::with_data(&device, &[1, 2, 3, 4], BufferUsage::Static).unwrap();
            assert_eq!(device.live_objects(), 1);
        }
        assert_eq!(device.live_objects(), 0);
    }
}
