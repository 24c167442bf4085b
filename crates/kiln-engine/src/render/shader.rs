//! Shader program wrapper.
//!
//! Building a program runs every stage even when an earlier one failed, so one
//! call reports all independent problems. Each failure is logged and kept as a
//! [`ShaderDiagnostic`]; the resulting program may be unusable, in which case
//! later use surfaces as a checked API error.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use super::device::GraphicsDevice;
use super::error::{precondition, RenderError, RenderResult};
use super::handle::GpuHandle;
use super::reflect::ShaderStage;
use super::uniform::{UniformLocation, UniformValue};

/// Build step a diagnostic came from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderPhase {
    CompileVertex,
    CompileFragment,
    Link,
    Validate,
}

impl fmt::Display for ShaderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderPhase::CompileVertex => "vertex compile",
            ShaderPhase::CompileFragment => "fragment compile",
            ShaderPhase::Link => "link",
            ShaderPhase::Validate => "validate",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderDiagnostic {
    pub phase: ShaderPhase,
    pub message: String,
}

/// A linked vertex + fragment program.
///
/// Not `Clone`: share it through `Rc<Shader>`. Commands refer to the program by
/// its plain [`GpuHandle`].
pub struct Shader {
    device: GraphicsDevice,
    name: String,
    program: Cell<GpuHandle>,
    stages: Cell<[GpuHandle; 2]>,
    diagnostics: Vec<ShaderDiagnostic>,
    locations: RefCell<HashMap<String, UniformLocation>>,
}

impl fmt::Debug for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shader")
            .field("name", &self.name)
            .field("program", &self.program.get())
            .field("diagnostics", &self.diagnostics.len())
            .finish_non_exhaustive()
    }
}

impl Shader {
    /// Compiles, links and validates a program from WGSL sources.
    ///
    /// `Err` is reserved for API-level failures; content errors land in
    /// [`diagnostics`](Self::diagnostics).
    #[track_caller]
    pub fn from_memory(
        device: &GraphicsDevice,
        name: impl Into<String>,
        vertex_src: &str,
        fragment_src: &str,
    ) -> RenderResult<Self> {
        let name = name.into();
        let mut diagnostics = Vec::new();

        let vs = device.create_shader(ShaderStage::Vertex, vertex_src)?;
        if let Err(message) = device.compile_shader(vs)? {
            report(&name, &mut diagnostics, ShaderPhase::CompileVertex, message);
        }

        let fs = device.create_shader(ShaderStage::Fragment, fragment_src)?;
        if let Err(message) = device.compile_shader(fs)? {
            report(&name, &mut diagnostics, ShaderPhase::CompileFragment, message);
        }

        let program = device.create_program()?;
        device.attach_shader(program, vs)?;
        device.attach_shader(program, fs)?;

        if let Err(message) = device.link_program(program)? {
            report(&name, &mut diagnostics, ShaderPhase::Link, message);
        }
        if let Err(message) = device.validate_program(program)? {
            report(&name, &mut diagnostics, ShaderPhase::Validate, message);
        }

        if diagnostics.is_empty() {
            log::debug!(target: "kiln::render", "shader '{name}' ready as program {program}");
        }

        Ok(Self {
            device: device.clone(),
            name,
            program: Cell::new(program),
            stages: Cell::new([vs, fs]),
            diagnostics,
            locations: RefCell::new(HashMap::new()),
        })
    }

    /// Reads both stages from disk, then behaves like
    /// [`from_memory`](Self::from_memory).
    #[track_caller]
    pub fn from_file(
        device: &GraphicsDevice,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> RenderResult<Self> {
        let vertex_path = vertex_path.as_ref();
        let fragment_path = fragment_path.as_ref();

        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|source| RenderError::ShaderSource {
                path: path.to_path_buf(),
                source,
            })
        };
        let vertex_src = read(vertex_path)?;
        let fragment_src = read(fragment_path)?;

        let name = vertex_path
            .file_stem()
            .and_then(|s| s.to_str())
            .map_or_else(|| vertex_path.display().to_string(), |s| s.trim_end_matches(".vert").to_string());

        Self::from_memory(device, name, &vertex_src, &fragment_src)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn handle(&self) -> GpuHandle {
        self.program.get()
    }

    pub fn diagnostics(&self) -> &[ShaderDiagnostic] {
        &self.diagnostics
    }

    /// Linked and still alive.
    pub fn is_usable(&self) -> bool {
        let program = self.program.get();
        !program.is_null() && self.device.is_linked(program)
    }

    #[track_caller]
    fn live_handle(&self, op: &str) -> GpuHandle {
        let program = self.program.get();
        precondition!(!program.is_null(), "{op} on destroyed shader '{}'", self.name);
        program
    }

    #[track_caller]
    pub fn bind(&self) -> RenderResult<()> {
        let program = self.live_handle("bind");
        self.device.use_program(program)
    }

    #[track_caller]
    pub fn unbind(&self) -> RenderResult<()> {
        self.device.use_program(GpuHandle::NULL)
    }

    /// Uploads `value` to the uniform called `name`.
    ///
    /// A name the program does not declare yields
    /// [`RenderError::UnknownUniform`]; the program is left untouched.
    #[track_caller]
    pub fn set_uniform(&self, name: &str, value: impl Into<UniformValue>) -> RenderResult<()> {
        let program = self.live_handle("set_uniform");
        let location = self.location(program, name)?;
        self.device.program_uniform(program, location, value.into())
    }

    #[track_caller]
    fn location(&self, program: GpuHandle, name: &str) -> RenderResult<UniformLocation> {
        if let Some(&loc) = self.locations.borrow().get(name) {
            return Ok(loc);
        }
        let Some(loc) = self.device.uniform_location(program, name)? else {
            log::error!(target: "kiln::render", "shader '{}' has no uniform '{name}'", self.name);
            return Err(RenderError::UnknownUniform {
                name: name.to_string(),
                program,
            });
        };
        self.locations.borrow_mut().insert(name.to_string(), loc);
        Ok(loc)
    }

    /// Releases the program and its stage objects. Later calls are no-ops.
    #[track_caller]
    pub fn destroy(&self) -> RenderResult<()> {
        let program = self.program.replace(GpuHandle::NULL);
        if program.is_null() {
            return Ok(());
        }
        let [vs, fs] = self.stages.replace([GpuHandle::NULL; 2]);
        self.locations.borrow_mut().clear();

        log::debug!(target: "kiln::render", "destroying shader '{}' (program {program})", self.name);
        self.device.delete_program(program)?;
        self.device.delete_shader(vs)?;
        self.device.delete_shader(fs)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            log::warn!(target: "kiln::render", "shader release failed: {e}");
        }
    }
}

fn report(name: &str, out: &mut Vec<ShaderDiagnostic>, phase: ShaderPhase, message: String) {
    log::error!(target: "kiln::render", "shader '{name}' {phase} failed:\n{message}");
    out.push(ShaderDiagnostic { phase, message });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::ApiCall;
    use glam::{Mat4, Vec4};

    const SPRITE_VS: &str = include_str!("shaders/sprite.vert.wgsl");
    const SPRITE_FS: &str = include_str!("shaders/sprite.frag.wgsl");

    fn sprite(device: &GraphicsDevice) -> Shader {
        Shader::from_memory(device, "sprite", SPRITE_VS, SPRITE_FS).unwrap()
    }

    #[test]
    fn builtin_sprite_shader_builds_cleanly() {
        let (device, _log) = GraphicsDevice::headless();
        let shader = sprite(&device);
        assert!(shader.diagnostics().is_empty(), "{:?}", shader.diagnostics());
        assert!(shader.is_usable());
    }

    #[test]
    fn every_phase_runs_even_after_a_failure() {
        let (device, log) = GraphicsDevice::headless();
        let shader = Shader::from_memory(&device, "broken", "fn vs_main( {", SPRITE_FS).unwrap();

        let phases: Vec<_> = shader.diagnostics().iter().map(|d| d.phase).collect();
        assert_eq!(phases, vec![ShaderPhase::CompileVertex, ShaderPhase::Link, ShaderPhase::Validate]);
        assert!(!shader.is_usable());

        assert_eq!(log.count(|c| matches!(c, ApiCall::CompileShader { .. })), 2);
        assert_eq!(log.count(|c| matches!(c, ApiCall::LinkProgram { .. })), 1);
        assert_eq!(log.count(|c| matches!(c, ApiCall::ValidateProgram { .. })), 1);
    }

    #[test]
    fn unknown_uniform_is_recoverable() {
        let (device, _log) = GraphicsDevice::headless();
        let shader = sprite(&device);

        let err = shader.set_uniform("u_missing", 1.0f32).unwrap_err();
        assert!(matches!(err, RenderError::UnknownUniform { ref name, .. } if name == "u_missing"));

        // the shader stays usable afterwards
        shader.set_uniform("u_tint", Vec4::ONE).unwrap();
        shader.set_uniform("u_model", Mat4::IDENTITY).unwrap();
    }

    #[test]
    fn mismatched_uniform_kind_is_an_api_error() {
        let (device, _log) = GraphicsDevice::headless();
        let shader = sprite(&device);
        assert!(matches!(
            shader.set_uniform("u_tint", 1.0f32),
            Err(RenderError::Api { .. })
        ));
    }

    #[test]
    fn locations_are_resolved_once() {
        let (device, log) = GraphicsDevice::headless();
        let shader = sprite(&device);
        shader.set_uniform("u_tint", Vec4::ONE).unwrap();
        shader.set_uniform("u_tint", Vec4::ZERO).unwrap();
        assert_eq!(log.count(|c| matches!(c, ApiCall::GetUniformLocation { .. })), 1);
    }

    #[test]
    fn destroy_releases_program_and_stages_once() {
        let (device, log) = GraphicsDevice::headless();
        let shader = sprite(&device);
        shader.destroy().unwrap();
        shader.destroy().unwrap();
        drop(shader);

        assert_eq!(log.count(|c| matches!(c, ApiCall::DeleteProgram { .. })), 1);
        assert_eq!(log.count(|c| matches!(c, ApiCall::DeleteShader { .. })), 2);
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn missing_file_maps_to_shader_source_error() {
        let (device, _log) = GraphicsDevice::headless();
        let err = Shader::from_file(&device, "/nonexistent/a.vert.wgsl", "/nonexistent/a.frag.wgsl")
            .unwrap_err();
        assert!(matches!(err, RenderError::ShaderSource { .. }));
    }
}
