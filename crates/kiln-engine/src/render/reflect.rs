//! WGSL stage compilation, program linking and program validation.
//!
//! Stages are parsed and validated with naga (the same front-end wgpu uses),
//! then reflected into the small amount of layout information the emulated
//! context needs: entry point, uniform block members, texture/sampler slots
//! and vertex inputs. Both backends share these results.

use std::collections::BTreeMap;
use std::rc::Rc;

use naga::valid::{Capabilities, ValidationFlags, Validator};

use super::uniform::UniformValue;

/// Largest uniform block accepted by program validation (one 64 KiB binding).
pub const MAX_UNIFORM_BLOCK_SIZE: u32 = 64 * 1024;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub const fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }

    fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

// ── reflected layout ──────────────────────────────────────────────────────

/// Host-visible kind of one uniform block member.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum UniformKind {
    Int,
    Uint,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    /// Arrays, nested structs and anything else the upload API cannot address.
    Other,
}

impl UniformKind {
    fn of(inner: &naga::TypeInner) -> Self {
        use naga::{Scalar, ScalarKind, TypeInner, VectorSize};

        match *inner {
            TypeInner::Scalar(Scalar { kind: ScalarKind::Sint, width: 4 }) => UniformKind::Int,
            TypeInner::Scalar(Scalar { kind: ScalarKind::Uint, width: 4 }) => UniformKind::Uint,
            TypeInner::Scalar(Scalar { kind: ScalarKind::Float, width: 4 }) => UniformKind::Float,
            TypeInner::Vector { size, scalar: Scalar { kind: ScalarKind::Float, width: 4 } } => {
                match size {
                    VectorSize::Bi => UniformKind::Vec2,
                    VectorSize::Tri => UniformKind::Vec3,
                    VectorSize::Quad => UniformKind::Vec4,
                }
            }
            TypeInner::Matrix {
                columns: VectorSize::Quad,
                rows: VectorSize::Quad,
                scalar: Scalar { kind: ScalarKind::Float, width: 4 },
            } => UniformKind::Mat4,
            _ => UniformKind::Other,
        }
    }

    /// Whether `value` may be written into a member of this kind.
    pub fn accepts(self, value: &UniformValue) -> bool {
        matches!(
            (self, value),
            (UniformKind::Int | UniformKind::Uint, UniformValue::Bool(_))
                | (UniformKind::Int, UniformValue::Int(_))
                | (UniformKind::Float, UniformValue::Float(_))
                | (UniformKind::Vec2, UniformValue::Vec2(_))
                | (UniformKind::Vec3, UniformValue::Vec3(_))
                | (UniformKind::Vec4, UniformValue::Vec4(_))
                | (UniformKind::Mat4, UniformValue::Mat4(_))
        )
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UniformMember {
    pub name: String,
    pub offset: u32,
    pub kind: UniformKind,
}

/// The single `var<uniform>` a stage may declare.
///
/// A struct-typed block exposes its members by name; a plain value exposes one
/// member named after the variable.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UniformBlock {
    pub group: u32,
    pub binding: u32,
    pub size: u32,
    pub members: Vec<UniformMember>,
}

impl UniformBlock {
    pub fn member(&self, name: &str) -> Option<(usize, &UniformMember)> {
        self.members.iter().enumerate().find(|(_, m)| m.name == name)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ResourceKind {
    UniformBuffer,
    Texture,
    Sampler,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceSlot {
    pub group: u32,
    pub binding: u32,
    pub kind: ResourceKind,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum InputKind {
    Float,
    Sint,
    Uint,
}

/// One `@location(n)` input of a vertex entry point.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexInput {
    pub location: u32,
    pub components: u32,
    pub kind: InputKind,
}

/// Result of compiling one stage.
#[derive(Debug, Clone)]
pub struct StageInfo {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub source: Rc<str>,
    pub uniforms: Option<UniformBlock>,
    pub resources: Vec<ResourceSlot>,
    pub inputs: Vec<VertexInput>,
    pub writes_color: bool,
}

/// Result of linking a vertex and a fragment stage.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub vertex: Rc<StageInfo>,
    pub fragment: Rc<StageInfo>,
    pub uniforms: Option<UniformBlock>,
    pub resources: Vec<ResourceSlot>,
}

impl LinkedProgram {
    pub fn uniform_size(&self) -> usize {
        self.uniforms.as_ref().map_or(0, |u| u.size as usize)
    }
}

// ── compile ───────────────────────────────────────────────────────────────

/// Parses, validates and reflects one WGSL stage.
///
/// The error string is a human-readable diagnostic suitable for an info log.
pub fn compile_stage(stage: ShaderStage, source: &str) -> Result<StageInfo, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| error_chain(e.as_inner()))?;

    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage.to_naga())
        .ok_or_else(|| format!("no @{} entry point found", stage.name()))?;

    let mut uniforms = None;
    let mut resources = Vec::new();

    for (_, var) in module.global_variables.iter() {
        let Some(rb) = var.binding.as_ref() else { continue };
        let name = var.name.as_deref().unwrap_or("<unnamed>");

        let kind = match var.space {
            naga::AddressSpace::Uniform => {
                if uniforms.is_some() {
                    return Err(format!(
                        "`{name}`: only one uniform block per stage is supported"
                    ));
                }
                uniforms = Some(uniform_block(&module, name, var.ty, rb));
                ResourceKind::UniformBuffer
            }
            naga::AddressSpace::Handle => resource_kind(&module.types[var.ty].inner)
                .ok_or_else(|| {
                    format!("`{name}`: only filterable 2D float textures and samplers are supported")
                })?,
            _ => return Err(format!("`{name}`: unsupported resource address space")),
        };

        resources.push(ResourceSlot {
            group: rb.group,
            binding: rb.binding,
            kind,
        });
    }

    let inputs = match stage {
        ShaderStage::Vertex => vertex_inputs(&module, &entry.function)?,
        ShaderStage::Fragment => Vec::new(),
    };

    Ok(StageInfo {
        stage,
        entry_point: entry.name.clone(),
        source: Rc::from(source),
        uniforms,
        resources,
        inputs,
        writes_color: writes_color(&module, &entry.function),
    })
}

fn uniform_block(
    module: &naga::Module,
    name: &str,
    ty: naga::Handle<naga::Type>,
    rb: &naga::ResourceBinding,
) -> UniformBlock {
    let inner = &module.types[ty].inner;
    let size = inner.size(module.to_ctx());

    let members = match inner {
        naga::TypeInner::Struct { members, .. } => members
            .iter()
            .map(|m| UniformMember {
                name: m.name.clone().unwrap_or_default(),
                offset: m.offset,
                kind: UniformKind::of(&module.types[m.ty].inner),
            })
            .collect(),
        other => vec![UniformMember {
            name: name.to_string(),
            offset: 0,
            kind: UniformKind::of(other),
        }],
    };

    UniformBlock {
        group: rb.group,
        binding: rb.binding,
        size,
        members,
    }
}

fn resource_kind(inner: &naga::TypeInner) -> Option<ResourceKind> {
    match *inner {
        naga::TypeInner::Image {
            dim: naga::ImageDimension::D2,
            arrayed: false,
            class: naga::ImageClass::Sampled { kind: naga::ScalarKind::Float, multi: false },
        } => Some(ResourceKind::Texture),
        naga::TypeInner::Sampler { comparison: false } => Some(ResourceKind::Sampler),
        _ => None,
    }
}

fn vertex_inputs(module: &naga::Module, function: &naga::Function) -> Result<Vec<VertexInput>, String> {
    let mut inputs = Vec::new();

    for arg in &function.arguments {
        match &arg.binding {
            Some(naga::Binding::Location { location, .. }) => {
                inputs.push(vertex_input(module, *location, arg.ty)?);
            }
            Some(_) => {}
            None => {
                if let naga::TypeInner::Struct { members, .. } = &module.types[arg.ty].inner {
                    for m in members {
                        if let Some(naga::Binding::Location { location, .. }) = &m.binding {
                            inputs.push(vertex_input(module, *location, m.ty)?);
                        }
                    }
                }
            }
        }
    }

    inputs.sort_by_key(|i| i.location);
    Ok(inputs)
}

fn vertex_input(
    module: &naga::Module,
    location: u32,
    ty: naga::Handle<naga::Type>,
) -> Result<VertexInput, String> {
    let (components, scalar) = match module.types[ty].inner {
        naga::TypeInner::Scalar(scalar) => (1, scalar),
        naga::TypeInner::Vector { size, scalar } => (size as u32, scalar),
        _ => return Err(format!("vertex input @location({location}) has an unsupported type")),
    };

    let kind = match scalar.kind {
        naga::ScalarKind::Float => InputKind::Float,
        naga::ScalarKind::Sint => InputKind::Sint,
        naga::ScalarKind::Uint => InputKind::Uint,
        _ => return Err(format!("vertex input @location({location}) has an unsupported scalar")),
    };

    Ok(VertexInput {
        location,
        components,
        kind,
    })
}

fn writes_color(module: &naga::Module, function: &naga::Function) -> bool {
    let Some(result) = function.result.as_ref() else {
        return false;
    };

    match &result.binding {
        Some(naga::Binding::Location { .. }) => true,
        Some(_) => false,
        None => match &module.types[result.ty].inner {
            naga::TypeInner::Struct { members, .. } => members
                .iter()
                .any(|m| matches!(m.binding, Some(naga::Binding::Location { .. }))),
            _ => false,
        },
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        msg.push_str(": ");
        msg.push_str(&s.to_string());
        source = s.source();
    }
    msg
}

// ── link ──────────────────────────────────────────────────────────────────

/// Links the attached stages: exactly one vertex and one fragment stage, with
/// compatible uniform blocks and resource slots.
pub fn link(stages: &[Rc<StageInfo>]) -> Result<LinkedProgram, String> {
    let mut vertex = None;
    let mut fragment = None;

    for s in stages {
        let slot = match s.stage {
            ShaderStage::Vertex => &mut vertex,
            ShaderStage::Fragment => &mut fragment,
        };
        if slot.replace(Rc::clone(s)).is_some() {
            return Err(format!("more than one {} stage attached", s.stage.name()));
        }
    }

    let vertex = vertex.ok_or("no compiled vertex stage attached")?;
    let fragment = fragment.ok_or("no compiled fragment stage attached")?;

    let uniforms = merge_blocks(vertex.uniforms.as_ref(), fragment.uniforms.as_ref())?;
    let resources = merge_resources(&vertex.resources, &fragment.resources)?;

    Ok(LinkedProgram {
        vertex,
        fragment,
        uniforms,
        resources,
    })
}

fn merge_blocks(
    a: Option<&UniformBlock>,
    b: Option<&UniformBlock>,
) -> Result<Option<UniformBlock>, String> {
    let (a, b) = match (a, b) {
        (None, None) => return Ok(None),
        (Some(x), None) | (None, Some(x)) => return Ok(Some(x.clone())),
        (Some(a), Some(b)) => (a, b),
    };

    if (a.group, a.binding) != (b.group, b.binding) {
        return Err(format!(
            "uniform blocks disagree on binding: @group({}) @binding({}) vs @group({}) @binding({})",
            a.group, a.binding, b.group, b.binding
        ));
    }

    let mut merged = a.clone();
    merged.size = a.size.max(b.size);

    for m in &b.members {
        match merged.members.iter().find(|x| x.name == m.name) {
            Some(existing) if existing.offset != m.offset || existing.kind != m.kind => {
                return Err(format!("uniform `{}` is declared differently in each stage", m.name));
            }
            Some(_) => {}
            None => merged.members.push(m.clone()),
        }
    }

    Ok(Some(merged))
}

fn merge_resources(a: &[ResourceSlot], b: &[ResourceSlot]) -> Result<Vec<ResourceSlot>, String> {
    let mut slots: BTreeMap<(u32, u32), ResourceKind> = BTreeMap::new();

    for r in a.iter().chain(b) {
        match slots.insert((r.group, r.binding), r.kind) {
            Some(prev) if prev != r.kind => {
                return Err(format!(
                    "@group({}) @binding({}) is bound to different resource kinds",
                    r.group, r.binding
                ));
            }
            _ => {}
        }
    }

    Ok(slots
        .into_iter()
        .map(|((group, binding), kind)| ResourceSlot { group, binding, kind })
        .collect())
}

// ── validate ──────────────────────────────────────────────────────────────

/// Checks that a linked program can actually be drawn with.
pub fn validate(program: &LinkedProgram) -> Result<(), String> {
    if !program.fragment.writes_color {
        return Err(format!(
            "fragment entry point `{}` writes no colour output",
            program.fragment.entry_point
        ));
    }

    for tex in program.resources.iter().filter(|r| r.kind == ResourceKind::Texture) {
        let has_sampler = program
            .resources
            .iter()
            .any(|r| r.group == tex.group && r.kind == ResourceKind::Sampler);
        if !has_sampler {
            return Err(format!(
                "texture at @group({}) @binding({}) has no sampler in the same group",
                tex.group, tex.binding
            ));
        }
    }

    if let Some(u) = &program.uniforms {
        if u.size > MAX_UNIFORM_BLOCK_SIZE {
            return Err(format!(
                "uniform block is {} bytes; the limit is {MAX_UNIFORM_BLOCK_SIZE}",
                u.size
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPRITE_VS: &str = include_str!("shaders/sprite.vert.wgsl");
    const SPRITE_FS: &str = include_str!("shaders/sprite.frag.wgsl");
    const INSTANCED_VS: &str = include_str!("shaders/sprite_instanced.vert.wgsl");

    fn stage(stage: ShaderStage, src: &str) -> Rc<StageInfo> {
        Rc::new(compile_stage(stage, src).expect("stage compiles"))
    }

    #[test]
    fn sprite_vertex_stage_reflects_uniforms_and_input() {
        let vs = stage(ShaderStage::Vertex, SPRITE_VS);
        assert_eq!(vs.entry_point, "vs_main");

        let block = vs.uniforms.as_ref().expect("uniform block");
        assert_eq!((block.group, block.binding), (0, 0));
        assert_eq!(block.size, 64 + 64 + 16);

        let (_, model) = block.member("u_model").expect("u_model");
        assert_eq!(model.offset, 64);
        assert_eq!(model.kind, UniformKind::Mat4);

        assert_eq!(
            vs.inputs,
            vec![VertexInput { location: 0, components: 4, kind: InputKind::Float }]
        );
    }

    #[test]
    fn struct_inputs_are_collected_in_location_order() {
        let vs = stage(ShaderStage::Vertex, INSTANCED_VS);
        let locations: Vec<u32> = vs.inputs.iter().map(|i| i.location).collect();
        assert_eq!(locations, vec![0, 1, 2, 3, 4, 5]);
        assert!(vs.uniforms.is_none());
    }

    #[test]
    fn syntax_error_is_reported_not_panicked() {
        let err = compile_stage(ShaderStage::Vertex, "fn vs_main( {").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn missing_entry_point_for_stage_fails() {
        let err = compile_stage(ShaderStage::Fragment, SPRITE_VS).unwrap_err();
        assert!(err.contains("fragment"));
    }

    #[test]
    fn link_merges_blocks_and_resources() {
        let program = link(&[
            stage(ShaderStage::Vertex, SPRITE_VS),
            stage(ShaderStage::Fragment, SPRITE_FS),
        ])
        .expect("links");

        assert_eq!(program.uniform_size(), 144);
        assert_eq!(program.resources.len(), 3);
        assert!(validate(&program).is_ok());
    }

    #[test]
    fn link_requires_both_stages() {
        let err = link(&[stage(ShaderStage::Vertex, SPRITE_VS)]).unwrap_err();
        assert!(err.contains("fragment"));
    }

    #[test]
    fn conflicting_member_layouts_fail_to_link() {
        let fs = r#"
            struct Other { u_tint: vec4<f32> };
            @group(0) @binding(0) var<uniform> u: Other;
            @fragment
            fn fs_main() -> @location(0) vec4<f32> { return u.u_tint; }
        "#;

        let err = link(&[
            stage(ShaderStage::Vertex, SPRITE_VS),
            stage(ShaderStage::Fragment, fs),
        ])
        .unwrap_err();
        assert!(err.contains("u_tint"));
    }

    #[test]
    fn texture_without_sampler_fails_validation() {
        let fs = r#"
            @group(1) @binding(0) var t: texture_2d<f32>;
            @fragment
            fn fs_main() -> @location(0) vec4<f32> {
                return textureLoad(t, vec2<i32>(0, 0), 0);
            }
        "#;

        let program = link(&[
            stage(ShaderStage::Vertex, SPRITE_VS),
            stage(ShaderStage::Fragment, fs),
        ])
        .expect("links");
        assert!(validate(&program).unwrap_err().contains("sampler"));
    }
}
