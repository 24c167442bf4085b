//! Named shader registry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use super::device::GraphicsDevice;
use super::error::RenderResult;
use super::shader::Shader;

const SPRITE_VS: &str = include_str!("shaders/sprite.vert.wgsl");
const SPRITE_FS: &str = include_str!("shaders/sprite.frag.wgsl");
const SPRITE_INSTANCED_VS: &str = include_str!("shaders/sprite_instanced.vert.wgsl");
const SPRITE_INSTANCED_FS: &str = include_str!("shaders/sprite_instanced.frag.wgsl");

/// Shaders by name, built on one device.
///
/// Explicitly constructed and passed around as `Rc<ShaderLibrary>`; the two
/// built-in sprite programs are compiled on first request.
#[derive(Debug)]
pub struct ShaderLibrary {
    device: GraphicsDevice,
    shaders: RefCell<HashMap<String, Rc<Shader>>>,
}

impl ShaderLibrary {
    pub const SPRITE: &'static str = "sprite";
    pub const SPRITE_INSTANCED: &'static str = "sprite_instanced";

    pub fn new(device: &GraphicsDevice) -> Self {
        Self {
            device: device.clone(),
            shaders: RefCell::new(HashMap::new()),
        }
    }

    /// Compiles both built-in programs now instead of on first use.
    #[track_caller]
    pub fn load_builtins(&self) -> RenderResult<()> {
        self.sprite()?;
        self.sprite_instanced()?;
        Ok(())
    }

    /// Per-sprite program (uniforms `u_projection`, `u_model`, `u_tint`).
    #[track_caller]
    pub fn sprite(&self) -> RenderResult<Rc<Shader>> {
        self.get_or_build(Self::SPRITE, SPRITE_VS, SPRITE_FS)
    }

    /// Instanced program; all per-sprite data comes from the instance stream.
    #[track_caller]
    pub fn sprite_instanced(&self) -> RenderResult<Rc<Shader>> {
        self.get_or_build(Self::SPRITE_INSTANCED, SPRITE_INSTANCED_VS, SPRITE_INSTANCED_FS)
    }

    #[track_caller]
    fn get_or_build(&self, name: &str, vs: &str, fs: &str) -> RenderResult<Rc<Shader>> {
        if let Some(shader) = self.get(name) {
            return Ok(shader);
        }
        let shader = Rc::new(Shader::from_memory(&self.device, name, vs, fs)?);
        self.insert(name, Rc::clone(&shader));
        Ok(shader)
    }

    pub fn get(&self, name: &str) -> Option<Rc<Shader>> {
        self.shaders.borrow().get(name).cloned()
    }

    /// Registers `shader` under `name`, returning the one it replaced.
    pub fn insert(&self, name: impl Into<String>, shader: Rc<Shader>) -> Option<Rc<Shader>> {
        self.shaders.borrow_mut().insert(name.into(), shader)
    }

    /// Builds a shader from two files and registers it under `name`.
    #[track_caller]
    pub fn load(
        &self,
        name: impl Into<String>,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> RenderResult<Rc<Shader>> {
        let shader = Rc::new(Shader::from_file(&self.device, vertex_path, fragment_path)?);
        self.insert(name, Rc::clone(&shader));
        Ok(shader)
    }

    /// Drops every registered shader; programs still shared elsewhere live on.
    pub fn clear(&self) {
        self.shaders.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.shaders.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::ApiCall;

    #[test]
    fn builtins_compile_once_and_are_cached() {
        let (device, log) = GraphicsDevice::headless();
        let lib = ShaderLibrary::new(&device);

        let a = lib.sprite().unwrap();
        let b = lib.sprite().unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(log.count(|c| matches!(c, ApiCall::LinkProgram { .. })), 1);

        lib.load_builtins().unwrap();
        assert_eq!(lib.len(), 2);
        assert!(lib.sprite_instanced().unwrap().diagnostics().is_empty());
    }

    #[test]
    fn clear_releases_unshared_programs() {
        let (device, log) = GraphicsDevice::headless();
        let lib = ShaderLibrary::new(&device);
        let kept = lib.sprite().unwrap();
        lib.sprite_instanced().unwrap();

        lib.clear();
        assert!(lib.is_empty());
        assert_eq!(log.count(|c| matches!(c, ApiCall::DeleteProgram { .. })), 1);
        assert!(kept.is_usable());
    }
}
