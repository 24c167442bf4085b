//! Checked entry points into the emulated graphics context.

use std::cell::RefCell;
use std::fmt;
use std::panic::Location;
use std::rc::Rc;

use glam::Vec4;

use super::backend::{
    ApiCall, Backend, BufferTarget, BufferUsage, CallLog, ClearRequest, HeadlessBackend,
    PrimitiveKind, Viewport,
};
use super::error::{ApiErrors, RenderError, RenderResult};
use super::handle::GpuHandle;
use super::layout::AttributeType;
use super::reflect::ShaderStage;
use super::state::GlState;
use super::uniform::{UniformLocation, UniformValue};

struct Shared {
    state: RefCell<GlState>,
    backend: Rc<dyn Backend>,
}

/// Shared handle to one graphics context.
///
/// Every resource wrapper keeps a clone, so the context outlives all resources
/// created from it. Single-threaded by construction (`Rc`, not `Send`).
///
/// Every state-mutating method runs through a checked call: pending errors are
/// drained before the call, the call is traced to the backend, and any error it
/// raised is logged with the caller's location and returned as
/// [`RenderError::Api`].
#[derive(Clone)]
pub struct GraphicsDevice {
    shared: Rc<Shared>,
}

impl fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("live_objects", &self.live_objects())
            .finish_non_exhaustive()
    }
}

impl GraphicsDevice {
    pub fn new(backend: Rc<dyn Backend>) -> Self {
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(GlState::new()),
                backend,
            }),
        }
    }

    /// Creates a device on a [`HeadlessBackend`] and returns its call log.
    pub fn headless() -> (Self, CallLog) {
        let backend = Rc::new(HeadlessBackend::new());
        let log = backend.log();
        (Self::new(backend), log)
    }

    #[track_caller]
    fn checked<R>(
        &self,
        call: ApiCall,
        op: impl FnOnce(&mut GlState, &dyn Backend) -> R,
    ) -> RenderResult<R> {
        let location = Location::caller();
        let mut state = self.shared.state.borrow_mut();

        let stale = state.take_errors();
        if !stale.is_empty() {
            log::warn!(
                target: "kiln::gpu",
                "discarding stale errors [{}] before {} at {location}",
                ApiErrors(stale),
                call.name()
            );
        }

        let backend = self.shared.backend.as_ref();
        backend.trace(&call);
        let out = op(&mut state, backend);

        let errors = state.take_errors();
        if errors.is_empty() {
            return Ok(out);
        }

        let errors = ApiErrors(errors);
        log::error!(target: "kiln::gpu", "{} failed with [{errors}] at {location}", call.name());
        Err(RenderError::Api {
            call: call.name(),
            errors,
            location,
        })
    }

    // ── queries (untraced) ───────────────────────────────────────────────

    pub fn buffer_size(&self, buffer: GpuHandle) -> Option<usize> {
        self.shared.state.borrow().buffer_size(buffer)
    }

    pub fn buffer_contents(&self, buffer: GpuHandle) -> Option<Vec<u8>> {
        self.shared.state.borrow().buffer_contents(buffer).map(<[u8]>::to_vec)
    }

    pub fn element_buffer_of(&self, vertex_array: GpuHandle) -> Option<GpuHandle> {
        self.shared.state.borrow().element_buffer_of(vertex_array)
    }

    pub fn is_linked(&self, program: GpuHandle) -> bool {
        self.shared.state.borrow().is_linked(program)
    }

    pub fn current_program(&self) -> GpuHandle {
        self.shared.state.borrow().current_program()
    }

    pub fn bound_vertex_array(&self) -> GpuHandle {
        self.shared.state.borrow().bound_vertex_array()
    }

    pub fn bound_texture(&self) -> GpuHandle {
        self.shared.state.borrow().bound_texture()
    }

    pub fn current_viewport(&self) -> Viewport {
        self.shared.state.borrow().viewport()
    }

    /// Number of live objects of every kind; useful for leak checks.
    pub fn live_objects(&self) -> usize {
        self.shared.state.borrow().live_objects()
    }

    // ── buffers ──────────────────────────────────────────────────────────

    #[track_caller]
    pub fn gen_buffer(&self) -> RenderResult<GpuHandle> {
        let handle = self.shared.state.borrow_mut().gen_buffer();
        self.checked(ApiCall::GenBuffer { buffer: handle }, |_, _| handle)
    }

    #[track_caller]
    pub fn bind_buffer(&self, target: BufferTarget, buffer: GpuHandle) -> RenderResult<()> {
        self.checked(ApiCall::BindBuffer { target, buffer }, |gl, _| {
            gl.bind_buffer(target, buffer)
        })
    }

    #[track_caller]
    pub fn buffer_data(&self, buffer: GpuHandle, data: &[u8], usage: BufferUsage) -> RenderResult<()> {
        let call = ApiCall::BufferData {
            buffer,
            size: data.len(),
            usage,
        };
        self.checked(call, |gl, be| gl.buffer_data(be, buffer, data, usage))
    }

    #[track_caller]
    pub fn buffer_sub_data(&self, buffer: GpuHandle, offset: usize, data: &[u8]) -> RenderResult<()> {
        let call = ApiCall::BufferSubData {
            buffer,
            offset,
            size: data.len(),
        };
        self.checked(call, |gl, be| gl.buffer_sub_data(be, buffer, offset, data))
    }

    #[track_caller]
    pub fn delete_buffer(&self, buffer: GpuHandle) -> RenderResult<()> {
        self.checked(ApiCall::DeleteBuffer { buffer }, |gl, be| {
            gl.delete_buffer(be, buffer)
        })
    }

    // ── vertex arrays ────────────────────────────────────────────────────

    #[track_caller]
    pub fn gen_vertex_array(&self) -> RenderResult<GpuHandle> {
        let handle = self.shared.state.borrow_mut().gen_vertex_array();
        self.checked(ApiCall::GenVertexArray { vertex_array: handle }, |_, _| handle)
    }

    #[track_caller]
    pub fn bind_vertex_array(&self, vertex_array: GpuHandle) -> RenderResult<()> {
        self.checked(ApiCall::BindVertexArray { vertex_array }, |gl, _| {
            gl.bind_vertex_array(vertex_array)
        })
    }

    #[track_caller]
    pub fn enable_vertex_attrib(&self, slot: u32) -> RenderResult<()> {
        self.checked(ApiCall::EnableVertexAttrib { slot }, |gl, _| {
            gl.enable_vertex_attrib(slot)
        })
    }

    /// Captures the currently bound array buffer into `slot` of the bound
    /// vertex array.
    #[track_caller]
    pub fn vertex_attrib_pointer(
        &self,
        slot: u32,
        ty: AttributeType,
        normalized: bool,
        stride: usize,
        offset: usize,
    ) -> RenderResult<()> {
        let call = ApiCall::VertexAttribPointer {
            slot,
            ty,
            normalized,
            stride,
            offset,
        };
        self.checked(call, |gl, _| {
            gl.vertex_attrib_pointer(slot, ty, normalized, stride, offset)
        })
    }

    #[track_caller]
    pub fn vertex_attrib_divisor(&self, slot: u32, divisor: u32) -> RenderResult<()> {
        self.checked(ApiCall::VertexAttribDivisor { slot, divisor }, |gl, _| {
            gl.vertex_attrib_divisor(slot, divisor)
        })
    }

    #[track_caller]
    pub fn delete_vertex_array(&self, vertex_array: GpuHandle) -> RenderResult<()> {
        self.checked(ApiCall::DeleteVertexArray { vertex_array }, |gl, _| {
            gl.delete_vertex_array(vertex_array)
        })
    }

    // ── shaders & programs ───────────────────────────────────────────────

    #[track_caller]
    pub fn create_shader(&self, stage: ShaderStage, source: &str) -> RenderResult<GpuHandle> {
        let shader = self.shared.state.borrow_mut().create_shader(stage, source);
        self.checked(ApiCall::CreateShader { shader, stage }, |_, _| shader)
    }

    /// Compiles a shader; the inner `Err` is the compile log.
    #[track_caller]
    pub fn compile_shader(&self, shader: GpuHandle) -> RenderResult<Result<(), String>> {
        self.checked(ApiCall::CompileShader { shader }, |gl, _| {
            gl.compile_shader(shader)
        })
    }

    #[track_caller]
    pub fn delete_shader(&self, shader: GpuHandle) -> RenderResult<()> {
        self.checked(ApiCall::DeleteShader { shader }, |gl, _| gl.delete_shader(shader))
    }

    #[track_caller]
    pub fn create_program(&self) -> RenderResult<GpuHandle> {
        let program = self.shared.state.borrow_mut().create_program();
        self.checked(ApiCall::CreateProgram { program }, |_, _| program)
    }

    #[track_caller]
    pub fn attach_shader(&self, program: GpuHandle, shader: GpuHandle) -> RenderResult<()> {
        self.checked(ApiCall::AttachShader { program, shader }, |gl, _| {
            gl.attach_shader(program, shader)
        })
    }

    /// Links a program; the inner `Err` is the link log.
    #[track_caller]
    pub fn link_program(&self, program: GpuHandle) -> RenderResult<Result<(), String>> {
        self.checked(ApiCall::LinkProgram { program }, |gl, be| {
            gl.link_program(be, program)
        })
    }

    /// Validates a program; the inner `Err` is the validation log.
    #[track_caller]
    pub fn validate_program(&self, program: GpuHandle) -> RenderResult<Result<(), String>> {
        self.checked(ApiCall::ValidateProgram { program }, |gl, _| {
            gl.validate_program(program)
        })
    }

    #[track_caller]
    pub fn use_program(&self, program: GpuHandle) -> RenderResult<()> {
        self.checked(ApiCall::UseProgram { program }, |gl, _| gl.use_program(program))
    }

    #[track_caller]
    pub fn delete_program(&self, program: GpuHandle) -> RenderResult<()> {
        self.checked(ApiCall::DeleteProgram { program }, |gl, be| {
            gl.delete_program(be, program)
        })
    }

    #[track_caller]
    pub fn uniform_location(
        &self,
        program: GpuHandle,
        name: &str,
    ) -> RenderResult<Option<UniformLocation>> {
        let call = ApiCall::GetUniformLocation {
            program,
            name: name.to_string(),
        };
        self.checked(call, |gl, _| gl.uniform_location(program, name))
    }

    #[track_caller]
    pub fn program_uniform(
        &self,
        program: GpuHandle,
        location: UniformLocation,
        value: UniformValue,
    ) -> RenderResult<()> {
        let call = ApiCall::ProgramUniform {
            program,
            location,
            value,
        };
        self.checked(call, |gl, _| gl.program_uniform(program, location, &value))
    }

    /// Resolves `name` in `program` and uploads `value`.
    ///
    /// An unresolvable name is a content error and comes back as
    /// [`RenderError::UnknownUniform`].
    #[track_caller]
    pub fn set_uniform(&self, program: GpuHandle, name: &str, value: UniformValue) -> RenderResult<()> {
        let location = self
            .uniform_location(program, name)?
            .ok_or_else(|| RenderError::UnknownUniform {
                name: name.to_string(),
                program,
            })?;
        self.program_uniform(program, location, value)
    }

    // ── textures ─────────────────────────────────────────────────────────

    /// Creates an sRGB RGBA8 texture from tightly packed rows.
    #[track_caller]
    pub fn create_texture_rgba8(&self, width: u32, height: u32, rgba: &[u8]) -> RenderResult<GpuHandle> {
        self.checked(ApiCall::CreateTexture { width, height }, |gl, be| {
            gl.create_texture_rgba8(be, width, height, rgba)
        })
    }

    #[track_caller]
    pub fn bind_texture(&self, texture: GpuHandle) -> RenderResult<()> {
        self.checked(ApiCall::BindTexture { texture }, |gl, _| gl.bind_texture(texture))
    }

    #[track_caller]
    pub fn delete_texture(&self, texture: GpuHandle) -> RenderResult<()> {
        self.checked(ApiCall::DeleteTexture { texture }, |gl, be| {
            gl.delete_texture(be, texture)
        })
    }

    // ── framebuffer & draws ──────────────────────────────────────────────

    #[track_caller]
    pub fn viewport(&self, x: i32, y: i32, width: u32, height: u32) -> RenderResult<()> {
        let vp = Viewport {
            x,
            y,
            width,
            height,
        };
        self.checked(ApiCall::Viewport(vp), |gl, _| gl.set_viewport(vp))
    }

    #[track_caller]
    pub fn clear(&self, color: Vec4, depth: bool, stencil: bool) -> RenderResult<()> {
        let request = ClearRequest {
            color,
            depth,
            stencil,
        };
        self.checked(ApiCall::Clear { color, depth, stencil }, |gl, be| {
            gl.clear(be, &request)
        })
    }

    #[track_caller]
    pub fn draw_arrays(
        &self,
        mode: PrimitiveKind,
        first: u32,
        count: u32,
        instances: u32,
    ) -> RenderResult<()> {
        let call = ApiCall::DrawArrays {
            mode,
            first,
            count,
            instances,
        };
        self.checked(call, |gl, be| gl.draw_arrays(be, mode, first, count, instances))
    }

    /// Indexed draw from the bound vertex array's element buffer; `offset` is
    /// in bytes.
    #[track_caller]
    pub fn draw_elements(
        &self,
        mode: PrimitiveKind,
        count: u32,
        offset: usize,
        instances: u32,
    ) -> RenderResult<()> {
        let call = ApiCall::DrawElements {
            mode,
            count,
            offset,
            instances,
        };
        self.checked(call, |gl, be| gl.draw_elements(be, mode, count, offset, instances))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::error::ApiError;

    #[test]
    fn failed_call_returns_api_error_with_call_name() {
        let (device, _log) = GraphicsDevice::headless();
        let err = device
            .bind_buffer(BufferTarget::Array, GpuHandle::from_raw(99))
            .unwrap_err();

        match err {
            RenderError::Api { call, errors, location } => {
                assert_eq!(call, "glBindBuffer");
                assert!(errors.contains(ApiError::InvalidOperation));
                assert!(location.file().ends_with("device.rs"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn every_call_is_traced_in_order() {
        let (device, log) = GraphicsDevice::headless();
        let b = device.gen_buffer().unwrap();
        device.bind_buffer(BufferTarget::Array, b).unwrap();
        device.buffer_data(b, &[0; 8], BufferUsage::Dynamic).unwrap();
        device.delete_buffer(b).unwrap();

        assert_eq!(
            log.names(),
            vec!["glGenBuffers", "glBindBuffer", "glNamedBufferData", "glDeleteBuffers"]
        );
    }

    #[test]
    fn errors_do_not_leak_into_the_next_call() {
        let (device, _log) = GraphicsDevice::headless();
        assert!(device.use_program(GpuHandle::from_raw(5)).is_err());
        assert!(device.viewport(0, 0, 10, 10).is_ok());
    }

    #[test]
    fn texture_creation_returns_a_live_name() {
        let (device, log) = GraphicsDevice::headless();
        let t = device.create_texture_rgba8(1, 1, &[255; 4]).unwrap();
        assert!(!t.is_null());
        assert_eq!(
            log.calls().last(),
            Some(&ApiCall::CreateTexture { width: 1, height: 1 })
        );
        assert!(device.bind_texture(t).is_ok());
        assert_eq!(device.bound_texture(), t);
    }

    #[test]
    fn texture_with_wrong_byte_count_is_rejected() {
        let (device, _log) = GraphicsDevice::headless();
        let err = device.create_texture_rgba8(2, 2, &[0; 4]).unwrap_err();
        assert!(err.api_errors().is_some_and(|e| e.contains(ApiError::InvalidValue)));
    }

    #[test]
    fn set_uniform_on_unknown_name_is_recoverable() {
        let (device, _log) = GraphicsDevice::headless();
        let p = device.create_program().unwrap();
        // unlinked program: lookup itself is an API error
        assert!(matches!(
            device.set_uniform(p, "u_x", UniformValue::Float(1.0)),
            Err(RenderError::Api { .. })
        ));
    }
}
