//! Emulated graphics-context state.
//!
//! `GlState` keeps the classic bind-to-edit object model: integer names, an
//! implicit "current" binding per target, vertex array objects that capture
//! attribute pointers, and an error queue that calls append to instead of
//! failing. `GraphicsDevice` drains the queue around every call.
//!
//! Nothing here touches a GPU; effects are forwarded to a [`Backend`].

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::backend::{
    AttributeBinding, Backend, BufferTarget, BufferUsage, ClearRequest, DrawPacket, IndexRange,
    PrimitiveKind, Viewport,
};
use super::error::ApiError;
use super::handle::GpuHandle;
use super::layout::AttributeType;
use super::reflect::{self, InputKind, LinkedProgram, ResourceKind, ShaderStage, StageInfo};
use super::uniform::{UniformLocation, UniformValue};

/// Number of vertex attribute slots per vertex array.
pub const MAX_VERTEX_ATTRIBS: u32 = 16;

const INDEX_SIZE: usize = std::mem::size_of::<u32>();

// ── objects ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct BufferObject {
    data: Vec<u8>,
}

#[derive(Debug, Copy, Clone)]
struct AttribPointer {
    buffer: GpuHandle,
    ty: AttributeType,
    normalized: bool,
    stride: usize,
    offset: usize,
}

#[derive(Debug, Copy, Clone, Default)]
struct AttribSlot {
    enabled: bool,
    pointer: Option<AttribPointer>,
    divisor: u32,
}

#[derive(Debug)]
struct VertexArrayObject {
    slots: [AttribSlot; MAX_VERTEX_ATTRIBS as usize],
    element_buffer: GpuHandle,
}

impl Default for VertexArrayObject {
    fn default() -> Self {
        Self {
            slots: [AttribSlot::default(); MAX_VERTEX_ATTRIBS as usize],
            element_buffer: GpuHandle::NULL,
        }
    }
}

#[derive(Debug)]
struct ShaderObject {
    stage: ShaderStage,
    source: String,
    compiled: Option<Rc<StageInfo>>,
}

#[derive(Debug, Default)]
struct ProgramObject {
    attached: Vec<GpuHandle>,
    linked: Option<LinkedProgram>,
    uniforms: Vec<u8>,
}

// ── state ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct GlState {
    next_name: u32,
    errors: Vec<ApiError>,

    buffers: HashMap<GpuHandle, BufferObject>,
    vertex_arrays: HashMap<GpuHandle, VertexArrayObject>,
    shaders: HashMap<GpuHandle, ShaderObject>,
    programs: HashMap<GpuHandle, ProgramObject>,
    textures: HashSet<GpuHandle>,

    array_buffer: GpuHandle,
    /// Element binding used while no vertex array is bound.
    default_element_buffer: GpuHandle,
    vertex_array: GpuHandle,
    program: GpuHandle,
    texture: GpuHandle,
    viewport: Viewport,
}

impl Default for GlState {
    fn default() -> Self {
        Self::new()
    }
}

impl GlState {
    pub fn new() -> Self {
        Self {
            next_name: 1,
            errors: Vec::new(),
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            textures: HashSet::new(),
            array_buffer: GpuHandle::NULL,
            default_element_buffer: GpuHandle::NULL,
            vertex_array: GpuHandle::NULL,
            program: GpuHandle::NULL,
            texture: GpuHandle::NULL,
            viewport: Viewport::default(),
        }
    }

    fn gen_name(&mut self) -> GpuHandle {
        let h = GpuHandle::from_raw(self.next_name);
        self.next_name += 1;
        h
    }

    fn raise(&mut self, err: ApiError) {
        self.errors.push(err);
    }

    pub fn take_errors(&mut self) -> Vec<ApiError> {
        std::mem::take(&mut self.errors)
    }

    // ── queries ──────────────────────────────────────────────────────────

    pub fn buffer_size(&self, buffer: GpuHandle) -> Option<usize> {
        self.buffers.get(&buffer).map(|b| b.data.len())
    }

    pub fn buffer_contents(&self, buffer: GpuHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.data.as_slice())
    }

    pub fn is_linked(&self, program: GpuHandle) -> bool {
        self.programs.get(&program).is_some_and(|p| p.linked.is_some())
    }

    pub fn element_buffer_of(&self, vertex_array: GpuHandle) -> Option<GpuHandle> {
        self.vertex_arrays.get(&vertex_array).map(|v| v.element_buffer)
    }

    pub fn current_program(&self) -> GpuHandle {
        self.program
    }

    pub fn bound_vertex_array(&self) -> GpuHandle {
        self.vertex_array
    }

    pub fn bound_texture(&self) -> GpuHandle {
        self.texture
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn live_objects(&self) -> usize {
        self.buffers.len()
            + self.vertex_arrays.len()
            + self.shaders.len()
            + self.programs.len()
            + self.textures.len()
    }

    // ── buffers ──────────────────────────────────────────────────────────

    pub fn gen_buffer(&mut self) -> GpuHandle {
        let h = self.gen_name();
        self.buffers.insert(h, BufferObject::default());
        h
    }

    fn element_binding_mut(&mut self) -> &mut GpuHandle {
        let vao = self.vertex_array;
        match self.vertex_arrays.get_mut(&vao) {
            Some(v) => &mut v.element_buffer,
            None => &mut self.default_element_buffer,
        }
    }

    pub fn bind_buffer(&mut self, target: BufferTarget, buffer: GpuHandle) {
        if !buffer.is_null() && !self.buffers.contains_key(&buffer) {
            self.raise(ApiError::InvalidOperation);
            return;
        }
        match target {
            BufferTarget::Array => self.array_buffer = buffer,
            BufferTarget::ElementArray => *self.element_binding_mut() = buffer,
        }
    }

    pub fn buffer_data(
        &mut self,
        backend: &dyn Backend,
        buffer: GpuHandle,
        data: &[u8],
        usage: BufferUsage,
    ) {
        let Some(obj) = self.buffers.get_mut(&buffer) else {
            self.raise(ApiError::InvalidOperation);
            return;
        };
        obj.data.clear();
        obj.data.extend_from_slice(data);
        backend.buffer_data(buffer, data, usage);
    }

    pub fn buffer_sub_data(
        &mut self,
        backend: &dyn Backend,
        buffer: GpuHandle,
        offset: usize,
        data: &[u8],
    ) {
        let Some(obj) = self.buffers.get_mut(&buffer) else {
            self.raise(ApiError::InvalidOperation);
            return;
        };
        let end = match offset.checked_add(data.len()) {
            Some(end) if end <= obj.data.len() => end,
            _ => {
                self.raise(ApiError::InvalidValue);
                return;
            }
        };
        obj.data[offset..end].copy_from_slice(data);
        backend.buffer_sub_data(buffer, offset, data.len(), &obj.data);
    }

    /// Unknown and null names are silently ignored.
    pub fn delete_buffer(&mut self, backend: &dyn Backend, buffer: GpuHandle) {
        if self.buffers.remove(&buffer).is_none() {
            return;
        }
        if self.array_buffer == buffer {
            self.array_buffer = GpuHandle::NULL;
        }
        if self.default_element_buffer == buffer {
            self.default_element_buffer = GpuHandle::NULL;
        }
        for vao in self.vertex_arrays.values_mut() {
            if vao.element_buffer == buffer {
                vao.element_buffer = GpuHandle::NULL;
            }
        }
        backend.buffer_deleted(buffer);
    }

    // ── vertex arrays ────────────────────────────────────────────────────

    pub fn gen_vertex_array(&mut self) -> GpuHandle {
        let h = self.gen_name();
        self.vertex_arrays.insert(h, VertexArrayObject::default());
        h
    }

    pub fn bind_vertex_array(&mut self, vertex_array: GpuHandle) {
        if !vertex_array.is_null() && !self.vertex_arrays.contains_key(&vertex_array) {
            self.raise(ApiError::InvalidOperation);
            return;
        }
        self.vertex_array = vertex_array;
    }

    fn bound_slot_mut(&mut self, slot: u32) -> Result<&mut AttribSlot, ApiError> {
        if slot >= MAX_VERTEX_ATTRIBS {
            return Err(ApiError::InvalidValue);
        }
        let vao = self.vertex_array;
        self.vertex_arrays
            .get_mut(&vao)
            .map(|v| &mut v.slots[slot as usize])
            .ok_or(ApiError::InvalidOperation)
    }

    pub fn enable_vertex_attrib(&mut self, slot: u32) {
        match self.bound_slot_mut(slot) {
            Ok(s) => s.enabled = true,
            Err(e) => self.raise(e),
        }
    }

    pub fn vertex_attrib_pointer(
        &mut self,
        slot: u32,
        ty: AttributeType,
        normalized: bool,
        stride: usize,
        offset: usize,
    ) {
        let buffer = self.array_buffer;
        if buffer.is_null() {
            self.raise(ApiError::InvalidOperation);
            return;
        }
        match self.bound_slot_mut(slot) {
            Ok(s) => {
                s.pointer = Some(AttribPointer {
                    buffer,
                    ty,
                    normalized,
                    stride: if stride == 0 { ty.size() } else { stride },
                    offset,
                })
            }
            Err(e) => self.raise(e),
        }
    }

    pub fn vertex_attrib_divisor(&mut self, slot: u32, divisor: u32) {
        match self.bound_slot_mut(slot) {
            Ok(s) => s.divisor = divisor,
            Err(e) => self.raise(e),
        }
    }

    pub fn delete_vertex_array(&mut self, vertex_array: GpuHandle) {
        if self.vertex_arrays.remove(&vertex_array).is_some() && self.vertex_array == vertex_array {
            self.vertex_array = GpuHandle::NULL;
        }
    }

    // ── shaders & programs ───────────────────────────────────────────────

    pub fn create_shader(&mut self, stage: ShaderStage, source: &str) -> GpuHandle {
        let h = self.gen_name();
        self.shaders.insert(
            h,
            ShaderObject {
                stage,
                source: source.to_string(),
                compiled: None,
            },
        );
        h
    }

    /// Compiles a shader object; `Err` carries the info log.
    pub fn compile_shader(&mut self, shader: GpuHandle) -> Result<(), String> {
        let Some(obj) = self.shaders.get_mut(&shader) else {
            self.raise(ApiError::InvalidValue);
            return Err(format!("{shader} is not a shader object"));
        };

        match reflect::compile_stage(obj.stage, &obj.source) {
            Ok(info) => {
                obj.compiled = Some(Rc::new(info));
                Ok(())
            }
            Err(log) => {
                obj.compiled = None;
                Err(log)
            }
        }
    }

    pub fn delete_shader(&mut self, shader: GpuHandle) {
        self.shaders.remove(&shader);
    }

    pub fn create_program(&mut self) -> GpuHandle {
        let h = self.gen_name();
        self.programs.insert(h, ProgramObject::default());
        h
    }

    pub fn attach_shader(&mut self, program: GpuHandle, shader: GpuHandle) {
        if !self.shaders.contains_key(&shader) {
            self.raise(ApiError::InvalidValue);
            return;
        }
        let Some(p) = self.programs.get_mut(&program) else {
            self.raise(ApiError::InvalidValue);
            return;
        };
        if p.attached.contains(&shader) {
            self.raise(ApiError::InvalidOperation);
            return;
        }
        p.attached.push(shader);
    }

    /// Links the attached stages; `Err` carries the info log.
    pub fn link_program(&mut self, backend: &dyn Backend, program: GpuHandle) -> Result<(), String> {
        let Some(attached) = self.programs.get(&program).map(|p| p.attached.clone()) else {
            self.raise(ApiError::InvalidValue);
            return Err(format!("{program} is not a program object"));
        };

        let outcome = attached
            .iter()
            .map(|s| {
                self.shaders
                    .get(s)
                    .and_then(|o| o.compiled.clone())
                    .ok_or_else(|| format!("attached shader {s} is not compiled"))
            })
            .collect::<Result<Vec<_>, String>>()
            .and_then(|stages| reflect::link(&stages));

        let Some(p) = self.programs.get_mut(&program) else {
            return Err(format!("{program} is not a program object"));
        };

        match outcome {
            Ok(linked) => {
                p.uniforms = vec![0; linked.uniform_size()];
                backend.program_linked(program, &linked);
                p.linked = Some(linked);
                Ok(())
            }
            Err(log) => {
                p.linked = None;
                p.uniforms.clear();
                Err(log)
            }
        }
    }

    /// Checks a linked program against the draw-time requirements.
    pub fn validate_program(&mut self, program: GpuHandle) -> Result<(), String> {
        let Some(p) = self.programs.get(&program) else {
            self.raise(ApiError::InvalidValue);
            return Err(format!("{program} is not a program object"));
        };
        match &p.linked {
            Some(linked) => reflect::validate(linked),
            None => Err("program is not linked".to_string()),
        }
    }

    pub fn use_program(&mut self, program: GpuHandle) {
        if program.is_null() {
            self.program = program;
            return;
        }
        match self.programs.get(&program) {
            None => self.raise(ApiError::InvalidValue),
            Some(p) if p.linked.is_none() => self.raise(ApiError::InvalidOperation),
            Some(_) => self.program = program,
        }
    }

    pub fn delete_program(&mut self, backend: &dyn Backend, program: GpuHandle) {
        if self.programs.remove(&program).is_none() {
            return;
        }
        if self.program == program {
            self.program = GpuHandle::NULL;
        }
        backend.program_deleted(program);
    }

    pub fn uniform_location(&mut self, program: GpuHandle, name: &str) -> Option<UniformLocation> {
        let Some(p) = self.programs.get(&program) else {
            self.raise(ApiError::InvalidValue);
            return None;
        };
        let Some(linked) = &p.linked else {
            self.raise(ApiError::InvalidOperation);
            return None;
        };
        linked
            .uniforms
            .as_ref()
            .and_then(|u| u.member(name))
            .map(|(i, _)| UniformLocation(i as u32))
    }

    pub fn program_uniform(&mut self, program: GpuHandle, location: UniformLocation, value: &UniformValue) {
        let Some(p) = self.programs.get_mut(&program) else {
            self.raise(ApiError::InvalidValue);
            return;
        };

        let member = p
            .linked
            .as_ref()
            .and_then(|l| l.uniforms.as_ref())
            .and_then(|u| u.members.get(location.0 as usize));

        let Some(member) = member.filter(|m| m.kind.accepts(value)) else {
            self.raise(ApiError::InvalidOperation);
            return;
        };

        let bytes = value.to_bytes();
        let start = member.offset as usize;
        match p.uniforms.get_mut(start..start + bytes.len()) {
            Some(dst) => dst.copy_from_slice(&bytes),
            None => self.raise(ApiError::InvalidOperation),
        }
    }

    // ── textures ─────────────────────────────────────────────────────────

    pub fn create_texture_rgba8(
        &mut self,
        backend: &dyn Backend,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> GpuHandle {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            self.raise(ApiError::InvalidValue);
            return GpuHandle::NULL;
        }
        let h = self.gen_name();
        self.textures.insert(h);
        backend.texture_created(h, width, height, rgba);
        h
    }

    pub fn bind_texture(&mut self, texture: GpuHandle) {
        if !texture.is_null() && !self.textures.contains(&texture) {
            self.raise(ApiError::InvalidOperation);
            return;
        }
        self.texture = texture;
    }

    pub fn delete_texture(&mut self, backend: &dyn Backend, texture: GpuHandle) {
        if !self.textures.remove(&texture) {
            return;
        }
        if self.texture == texture {
            self.texture = GpuHandle::NULL;
        }
        backend.texture_deleted(texture);
    }

    // ── framebuffer ──────────────────────────────────────────────────────

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn clear(&mut self, backend: &dyn Backend, request: &ClearRequest) {
        if let Err(e) = backend.clear(request) {
            self.raise(e);
        }
    }

    // ── draws ────────────────────────────────────────────────────────────

    pub fn draw_arrays(
        &mut self,
        backend: &dyn Backend,
        mode: PrimitiveKind,
        first: u32,
        count: u32,
        instances: u32,
    ) {
        if first.checked_add(count).is_none() {
            self.raise(ApiError::InvalidValue);
            return;
        }
        if count == 0 || instances == 0 {
            return;
        }
        let packet = self.draw_packet(mode, None, first, count, instances);
        self.submit_draw(backend, packet);
    }

    /// `offset` is a byte offset into the bound element buffer.
    pub fn draw_elements(
        &mut self,
        backend: &dyn Backend,
        mode: PrimitiveKind,
        count: u32,
        offset: usize,
        instances: u32,
    ) {
        if offset % INDEX_SIZE != 0 {
            self.raise(ApiError::InvalidOperation);
            return;
        }
        if count == 0 || instances == 0 {
            return;
        }

        let element_buffer = self
            .vertex_arrays
            .get(&self.vertex_array)
            .map(|v| v.element_buffer)
            .unwrap_or(GpuHandle::NULL);

        let Some(first) = u32::try_from(offset / INDEX_SIZE)
            .ok()
            .filter(|first| first.checked_add(count).is_some())
        else {
            self.raise(ApiError::InvalidValue);
            return;
        };
        let range = IndexRange {
            buffer: element_buffer,
            first,
            count,
        };
        let packet = self.draw_packet(mode, Some(range), 0, 0, instances);
        self.submit_draw(backend, packet);
    }

    fn submit_draw(&mut self, backend: &dyn Backend, packet: Result<DrawPacket, ApiError>) {
        let result = packet.and_then(|p| backend.draw(&p));
        if let Err(e) = result {
            self.raise(e);
        }
    }

    /// Resolves and bounds-checks everything a draw reads.
    fn draw_packet(
        &self,
        mode: PrimitiveKind,
        indices: Option<IndexRange>,
        first_vertex: u32,
        vertex_count: u32,
        instances: u32,
    ) -> Result<DrawPacket, ApiError> {
        let program = self.programs.get(&self.program).ok_or(ApiError::InvalidOperation)?;
        let linked = program.linked.as_ref().ok_or(ApiError::InvalidOperation)?;
        let vao = self
            .vertex_arrays
            .get(&self.vertex_array)
            .ok_or(ApiError::InvalidOperation)?;

        // Number of vertices the draw will fetch.
        let vertices_read = match indices {
            Some(r) => {
                let data = self
                    .buffer_contents(r.buffer)
                    .ok_or(ApiError::InvalidOperation)?;
                let start = r.first as usize * INDEX_SIZE;
                let end = start + r.count as usize * INDEX_SIZE;
                let bytes = data.get(start..end).ok_or(ApiError::InvalidOperation)?;
                bytes
                    .chunks_exact(INDEX_SIZE)
                    .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                    .max()
                    .map_or(0, |m| m as usize + 1)
            }
            None => first_vertex as usize + vertex_count as usize,
        };

        let mut attributes = Vec::with_capacity(linked.vertex.inputs.len());

        for input in &linked.vertex.inputs {
            let slot = vao
                .slots
                .get(input.location as usize)
                .filter(|s| s.enabled)
                .ok_or(ApiError::InvalidOperation)?;
            let ptr = slot.pointer.ok_or(ApiError::InvalidOperation)?;

            let float_fetch = !ptr.ty.is_integer() || ptr.normalized;
            let compatible = ptr.ty.components() == input.components
                && match input.kind {
                    InputKind::Float => float_fetch,
                    InputKind::Sint | InputKind::Uint => !float_fetch,
                };
            if !compatible {
                return Err(ApiError::InvalidOperation);
            }

            let elements = match slot.divisor {
                0 => vertices_read,
                d => (instances as usize).div_ceil(d as usize),
            };
            let size = self.buffer_size(ptr.buffer).ok_or(ApiError::InvalidOperation)?;
            if elements > 0 && (elements - 1) * ptr.stride + ptr.offset + ptr.ty.size() > size {
                return Err(ApiError::InvalidOperation);
            }

            attributes.push(AttributeBinding {
                slot: input.location,
                buffer: ptr.buffer,
                ty: ptr.ty,
                normalized: ptr.normalized,
                stride: ptr.stride,
                offset: ptr.offset,
                divisor: slot.divisor,
            });
        }

        let samples_texture = linked
            .resources
            .iter()
            .any(|r| r.kind == ResourceKind::Texture);

        Ok(DrawPacket {
            program: self.program,
            mode,
            attributes,
            indices,
            first_vertex,
            vertex_count,
            instances,
            uniforms: program.uniforms.clone(),
            texture: (samples_texture && !self.texture.is_null()).then_some(self.texture),
            viewport: self.viewport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::HeadlessBackend;

    const SPRITE_VS: &str = include_str!("shaders/sprite.vert.wgsl");
    const SPRITE_FS: &str = include_str!("shaders/sprite.frag.wgsl");

    fn linked_sprite_program(gl: &mut GlState, be: &dyn Backend) -> GpuHandle {
        let vs = gl.create_shader(ShaderStage::Vertex, SPRITE_VS);
        let fs = gl.create_shader(ShaderStage::Fragment, SPRITE_FS);
        gl.compile_shader(vs).unwrap();
        gl.compile_shader(fs).unwrap();
        let p = gl.create_program();
        gl.attach_shader(p, vs);
        gl.attach_shader(p, fs);
        gl.link_program(be, p).unwrap();
        p
    }

    // ── buffers ──────────────────────────────────────────────────────────

    #[test]
    fn names_start_at_one_and_never_repeat() {
        let mut gl = GlState::new();
        let a = gl.gen_buffer();
        let b = gl.gen_vertex_array();
        assert_eq!(a.raw(), 1);
        assert_eq!(b.raw(), 2);
    }

    #[test]
    fn binding_unknown_buffer_raises_invalid_operation() {
        let mut gl = GlState::new();
        gl.bind_buffer(BufferTarget::Array, GpuHandle::from_raw(42));
        assert_eq!(gl.take_errors(), vec![ApiError::InvalidOperation]);
    }

    #[test]
    fn sub_data_out_of_range_raises_and_leaves_contents() {
        let be = HeadlessBackend::new();
        let mut gl = GlState::new();
        let b = gl.gen_buffer();
        gl.buffer_data(&be, b, &[1, 2, 3, 4], BufferUsage::Static);
        gl.buffer_sub_data(&be, b, 2, &[9, 9, 9]);

        assert_eq!(gl.take_errors(), vec![ApiError::InvalidValue]);
        assert_eq!(gl.buffer_contents(b), Some(&[1u8, 2, 3, 4][..]));
    }

    #[test]
    fn element_binding_is_vertex_array_state() {
        let mut gl = GlState::new();
        let ib = gl.gen_buffer();
        let vao = gl.gen_vertex_array();

        gl.bind_vertex_array(vao);
        gl.bind_buffer(BufferTarget::ElementArray, ib);
        gl.bind_vertex_array(GpuHandle::NULL);
        gl.bind_buffer(BufferTarget::ElementArray, GpuHandle::NULL);

        assert_eq!(gl.element_buffer_of(vao), Some(ib));
    }

    #[test]
    fn attrib_pointer_requires_array_buffer() {
        let mut gl = GlState::new();
        let vao = gl.gen_vertex_array();
        gl.bind_vertex_array(vao);
        gl.vertex_attrib_pointer(0, AttributeType::Float4, false, 16, 0);
        assert_eq!(gl.take_errors(), vec![ApiError::InvalidOperation]);
    }

    #[test]
    fn attrib_slot_out_of_range_raises_invalid_value() {
        let mut gl = GlState::new();
        let vao = gl.gen_vertex_array();
        gl.bind_vertex_array(vao);
        gl.enable_vertex_attrib(MAX_VERTEX_ATTRIBS);
        assert_eq!(gl.take_errors(), vec![ApiError::InvalidValue]);
    }

    // ── programs ─────────────────────────────────────────────────────────

    #[test]
    fn using_unlinked_program_raises_invalid_operation() {
        let mut gl = GlState::new();
        let p = gl.create_program();
        gl.use_program(p);
        assert_eq!(gl.take_errors(), vec![ApiError::InvalidOperation]);
        assert!(gl.current_program().is_null());
    }

    #[test]
    fn link_without_compiled_stage_reports_log() {
        let be = HeadlessBackend::new();
        let mut gl = GlState::new();
        let vs = gl.create_shader(ShaderStage::Vertex, SPRITE_VS);
        let p = gl.create_program();
        gl.attach_shader(p, vs);

        let log = gl.link_program(&be, p).unwrap_err();
        assert!(log.contains("not compiled"));
        assert!(!gl.is_linked(p));
    }

    #[test]
    fn uniform_type_mismatch_raises_invalid_operation() {
        let be = HeadlessBackend::new();
        let mut gl = GlState::new();
        let p = linked_sprite_program(&mut gl, &be);

        let loc = gl.uniform_location(p, "u_tint").unwrap();
        gl.program_uniform(p, loc, &UniformValue::Float(1.0));
        assert_eq!(gl.take_errors(), vec![ApiError::InvalidOperation]);

        gl.program_uniform(p, loc, &UniformValue::Vec4(glam::Vec4::ONE));
        assert!(gl.take_errors().is_empty());
    }

    #[test]
    fn unknown_uniform_name_has_no_location() {
        let be = HeadlessBackend::new();
        let mut gl = GlState::new();
        let p = linked_sprite_program(&mut gl, &be);
        assert_eq!(gl.uniform_location(p, "u_nope"), None);
        assert!(gl.take_errors().is_empty());
    }

    // ── draws ────────────────────────────────────────────────────────────

    #[test]
    fn draw_without_program_raises_invalid_operation() {
        let be = HeadlessBackend::new();
        let mut gl = GlState::new();
        let vao = gl.gen_vertex_array();
        gl.bind_vertex_array(vao);
        gl.draw_arrays(&be, PrimitiveKind::Triangles, 0, 3, 1);
        assert_eq!(gl.take_errors(), vec![ApiError::InvalidOperation]);
        assert!(be.log().draws().is_empty());
    }

    #[test]
    fn draw_range_past_u32_raises_invalid_value() {
        let be = HeadlessBackend::new();
        let mut gl = GlState::new();
        let p = linked_sprite_program(&mut gl, &be);
        let vao = gl.gen_vertex_array();
        gl.bind_vertex_array(vao);
        gl.use_program(p);

        gl.draw_arrays(&be, PrimitiveKind::Triangles, u32::MAX - 1, 3, 1);
        assert_eq!(gl.take_errors(), vec![ApiError::InvalidValue]);

        gl.draw_elements(&be, PrimitiveKind::Triangles, 3, (u32::MAX as usize - 1) * INDEX_SIZE, 1);
        assert_eq!(gl.take_errors(), vec![ApiError::InvalidValue]);
        assert!(be.log().draws().is_empty());
    }

    #[test]
    fn indexed_draw_checks_vertex_bounds_from_indices() {
        let be = HeadlessBackend::new();
        let mut gl = GlState::new();
        let p = linked_sprite_program(&mut gl, &be);

        let vb = gl.gen_buffer();
        gl.buffer_data(&be, vb, &[0u8; 4 * 16], BufferUsage::Static);
        let ib = gl.gen_buffer();
        let vao = gl.gen_vertex_array();

        gl.bind_vertex_array(vao);
        gl.bind_buffer(BufferTarget::Array, vb);
        gl.enable_vertex_attrib(0);
        gl.vertex_attrib_pointer(0, AttributeType::Float4, false, 16, 0);
        gl.bind_buffer(BufferTarget::ElementArray, ib);
        gl.use_program(p);

        // index 4 is past the 4 vertices stored
        let indices: [u32; 3] = [0, 1, 4];
        gl.buffer_data(&be, ib, bytemuck::cast_slice(&indices), BufferUsage::Static);
        gl.draw_elements(&be, PrimitiveKind::Triangles, 3, 0, 1);
        assert_eq!(gl.take_errors(), vec![ApiError::InvalidOperation]);

        let indices: [u32; 3] = [0, 1, 3];
        gl.buffer_data(&be, ib, bytemuck::cast_slice(&indices), BufferUsage::Static);
        gl.draw_elements(&be, PrimitiveKind::Triangles, 3, 0, 1);
        assert!(gl.take_errors().is_empty());

        let draws = be.log().draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].uniforms.len(), 144);
        assert_eq!(draws[0].indices.map(|r| r.count), Some(3));
    }
}
