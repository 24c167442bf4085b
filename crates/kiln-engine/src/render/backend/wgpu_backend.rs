//! wgpu realisation of the emulated context's call stream.
//!
//! Buffers, textures and programs are mirrored as wgpu objects when the
//! context creates them. Draws are recorded as pending passes and flushed into
//! one render pass over the current target:
//! - at `end_target`
//! - before a buffer sub-upload, so earlier draws read the old contents
//! - before a clear that follows draws
//!
//! Pipelines are cached per (program, vertex layout, topology).

use std::cell::RefCell;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::ops::Range;

use wgpu::util::DeviceExt;

use crate::render::error::ApiError;
use crate::render::handle::GpuHandle;
use crate::render::layout::AttributeType;
use crate::render::reflect::{LinkedProgram, ResourceKind, ResourceSlot};

use super::{AttributeBinding, Backend, BufferUsage, ClearRequest, DrawPacket, PrimitiveKind};

const COPY_ALIGN: usize = wgpu::COPY_BUFFER_ALIGNMENT as usize;

fn align_up(n: usize) -> usize {
    n.div_ceil(COPY_ALIGN) * COPY_ALIGN
}

// ── mirrored objects ──────────────────────────────────────────────────────

struct ProgramEntry {
    vertex: wgpu::ShaderModule,
    vertex_entry: String,
    fragment: wgpu::ShaderModule,
    fragment_entry: String,
    layout: wgpu::PipelineLayout,
    bind_group_layouts: Vec<wgpu::BindGroupLayout>,
    resources: Vec<ResourceSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    stride: u64,
    per_instance: bool,
    attributes: Vec<(u32, wgpu::VertexFormat, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: GpuHandle,
    streams: Vec<StreamKey>,
    topology: wgpu::PrimitiveTopology,
}

/// One vertex buffer slot of a draw: which buffer, from which byte offset.
struct StreamBinding {
    buffer: wgpu::Buffer,
    offset: u64,
}

struct PendingDraw {
    pipeline: wgpu::RenderPipeline,
    bind_groups: Vec<wgpu::BindGroup>,
    streams: Vec<StreamBinding>,
    indices: Option<(wgpu::Buffer, Range<u32>)>,
    vertices: Range<u32>,
    instances: Range<u32>,
    /// x, y, w, h in target pixels, top-left origin.
    viewport: [f32; 4],
}

struct Target {
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

struct Inner {
    buffers: HashMap<GpuHandle, wgpu::Buffer>,
    textures: HashMap<GpuHandle, wgpu::TextureView>,
    programs: HashMap<GpuHandle, ProgramEntry>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    target: Option<Target>,
    pending_clear: Option<wgpu::Color>,
    pending: Vec<PendingDraw>,
}

/// Renders the call stream into a caller-provided colour target.
///
/// Per frame the host calls [`begin_target`](Self::begin_target), runs the
/// frame's commands, then [`end_target`](Self::end_target) before presenting.
/// Clears and draws issued with no target set fail with
/// `INVALID_FRAMEBUFFER_OPERATION`.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    sampler: wgpu::Sampler,
    /// Bound when a program samples a texture but none is bound.
    white: wgpu::TextureView,
    inner: RefCell<Inner>,
}

impl WgpuBackend {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("kiln sprite sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let white = upload_rgba8(device, queue, "kiln white texture", 1, 1, &[255; 4]);

        Self {
            device: device.clone(),
            queue: queue.clone(),
            format,
            sampler,
            white,
            inner: RefCell::new(Inner {
                buffers: HashMap::new(),
                textures: HashMap::new(),
                programs: HashMap::new(),
                pipelines: HashMap::new(),
                target: None,
                pending_clear: None,
                pending: Vec::new(),
            }),
        }
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Directs subsequent clears and draws at `view` (`width` × `height`).
    pub fn begin_target(&self, view: &wgpu::TextureView, width: u32, height: u32) {
        let mut inner = self.inner.borrow_mut();
        if inner.target.is_some() {
            log::warn!(target: "kiln::gpu", "begin_target while a target is active; flushing it");
            self.flush(&mut inner);
        }
        inner.target = Some(Target {
            view: view.clone(),
            width: width.max(1),
            height: height.max(1),
        });
    }

    /// Submits everything recorded for the current target and releases it.
    pub fn end_target(&self) {
        let mut inner = self.inner.borrow_mut();
        self.flush(&mut inner);
        inner.target = None;
    }

    /// Encodes pending work into one render pass and submits it.
    fn flush(&self, inner: &mut Inner) {
        if inner.pending.is_empty() && inner.pending_clear.is_none() {
            return;
        }
        let Some(target) = inner.target.as_ref() else {
            inner.pending.clear();
            inner.pending_clear = None;
            return;
        };

        let load = match inner.pending_clear.take() {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kiln flush encoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kiln pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for draw in &inner.pending {
                let [x, y, w, h] = draw.viewport;
                rpass.set_viewport(x, y, w, h, 0.0, 1.0);
                rpass.set_pipeline(&draw.pipeline);
                for (i, group) in draw.bind_groups.iter().enumerate() {
                    rpass.set_bind_group(i as u32, group, &[]);
                }
                for (i, stream) in draw.streams.iter().enumerate() {
                    rpass.set_vertex_buffer(i as u32, stream.buffer.slice(stream.offset..));
                }
                match &draw.indices {
                    Some((buffer, range)) => {
                        rpass.set_index_buffer(buffer.slice(..), wgpu::IndexFormat::Uint32);
                        rpass.draw_indexed(range.clone(), 0, draw.instances.clone());
                    }
                    None => rpass.draw(draw.vertices.clone(), draw.instances.clone()),
                }
            }
        }

        log::trace!(target: "kiln::gpu", "submitting pass with {} draws", inner.pending.len());
        inner.pending.clear();
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    // ── draw assembly ────────────────────────────────────────────────────

    fn pipeline(
        &self,
        inner: &mut Inner,
        key: PipelineKey,
    ) -> Result<wgpu::RenderPipeline, ApiError> {
        if let Some(p) = inner.pipelines.get(&key) {
            return Ok(p.clone());
        }
        let program = inner.programs.get(&key.program).ok_or(ApiError::InvalidOperation)?;

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = key
            .streams
            .iter()
            .map(|s| {
                s.attributes
                    .iter()
                    .map(|&(shader_location, format, offset)| wgpu::VertexAttribute {
                        format,
                        offset,
                        shader_location,
                    })
                    .collect()
            })
            .collect();

        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
            .streams
            .iter()
            .zip(&attributes)
            .map(|(s, attrs)| wgpu::VertexBufferLayout {
                array_stride: s.stride,
                step_mode: if s.per_instance {
                    wgpu::VertexStepMode::Instance
                } else {
                    wgpu::VertexStepMode::Vertex
                },
                attributes: attrs,
            })
            .collect();

        let strip = matches!(
            key.topology,
            wgpu::PrimitiveTopology::TriangleStrip | wgpu::PrimitiveTopology::LineStrip
        );

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("kiln program pipeline"),
            layout: Some(&program.layout),

            vertex: wgpu::VertexState {
                module: &program.vertex,
                entry_point: Some(&program.vertex_entry),
                compilation_options: Default::default(),
                buffers: &buffers,
            },

            fragment: Some(wgpu::FragmentState {
                module: &program.fragment,
                entry_point: Some(&program.fragment_entry),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: key.topology,
                strip_index_format: strip.then_some(wgpu::IndexFormat::Uint32),
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        log::debug!(
            target: "kiln::gpu",
            "built pipeline for program {} ({} streams, {:?})",
            key.program,
            key.streams.len(),
            key.topology
        );
        inner.pipelines.insert(key, pipeline.clone());
        Ok(pipeline)
    }

    fn bind_groups(
        &self,
        inner: &Inner,
        packet: &DrawPacket,
    ) -> Result<Vec<wgpu::BindGroup>, ApiError> {
        let program = inner.programs.get(&packet.program).ok_or(ApiError::InvalidOperation)?;

        let uniforms = (!packet.uniforms.is_empty()).then(|| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("kiln uniform snapshot"),
                contents: &packet.uniforms,
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });

        let texture = match packet.texture {
            Some(t) => inner.textures.get(&t).ok_or(ApiError::InvalidOperation)?,
            None => &self.white,
        };

        program
            .bind_group_layouts
            .iter()
            .enumerate()
            .map(|(group, layout)| {
                let entries = program
                    .resources
                    .iter()
                    .filter(|r| r.group == group as u32)
                    .map(|r| {
                        let resource = match r.kind {
                            ResourceKind::UniformBuffer => uniforms
                                .as_ref()
                                .ok_or(ApiError::InvalidOperation)?
                                .as_entire_binding(),
                            ResourceKind::Texture => wgpu::BindingResource::TextureView(texture),
                            ResourceKind::Sampler => wgpu::BindingResource::Sampler(&self.sampler),
                        };
                        Ok(wgpu::BindGroupEntry {
                            binding: r.binding,
                            resource,
                        })
                    })
                    .collect::<Result<Vec<_>, ApiError>>()?;

                Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("kiln draw bind group"),
                    layout,
                    entries: &entries,
                }))
            })
            .collect()
    }

    /// Groups attributes that read the same buffer with the same stride and
    /// step rate into one vertex stream.
    fn streams(
        inner: &Inner,
        attributes: &[AttributeBinding],
    ) -> Result<(Vec<StreamKey>, Vec<StreamBinding>), ApiError> {
        let mut keys: Vec<StreamKey> = Vec::new();
        let mut bindings: Vec<(GpuHandle, StreamBinding)> = Vec::new();

        for a in attributes {
            let format = vertex_format(a.ty, a.normalized)?;
            let buffer = inner.buffers.get(&a.buffer).ok_or(ApiError::InvalidOperation)?;
            let per_instance = a.divisor != 0;
            let stride = a.stride as u64;

            // Attribute offsets are relative to the stream's base offset, which
            // is the first attribute seen for that stream.
            let existing = keys.iter().zip(&bindings).position(|(k, (h, b))| {
                *h == a.buffer
                    && k.stride == stride
                    && k.per_instance == per_instance
                    && (a.offset as u64) >= b.offset
                    && (a.offset as u64) - b.offset + (a.ty.size() as u64) <= stride
            });

            match existing {
                Some(i) => {
                    let rel = a.offset as u64 - bindings[i].1.offset;
                    keys[i].attributes.push((a.slot, format, rel));
                }
                None => {
                    keys.push(StreamKey {
                        stride,
                        per_instance,
                        attributes: vec![(a.slot, format, 0)],
                    });
                    bindings.push((
                        a.buffer,
                        StreamBinding {
                            buffer: buffer.clone(),
                            offset: a.offset as u64,
                        },
                    ));
                }
            }
        }

        Ok((keys, bindings.into_iter().map(|(_, b)| b).collect()))
    }

    fn assemble(&self, inner: &mut Inner, packet: &DrawPacket) -> Result<PendingDraw, ApiError> {
        let target = inner.target.as_ref().ok_or(ApiError::InvalidFramebufferOperation)?;
        let viewport = target_viewport(packet, target.width, target.height);

        let (streams, bindings) = Self::streams(inner, &packet.attributes)?;
        let bind_groups = self.bind_groups(inner, packet)?;
        let pipeline = self.pipeline(
            inner,
            PipelineKey {
                program: packet.program,
                streams,
                topology: topology(packet.mode),
            },
        )?;

        let indices = match packet.indices {
            Some(r) => {
                let buffer = inner.buffers.get(&r.buffer).ok_or(ApiError::InvalidOperation)?;
                Some((buffer.clone(), r.first..r.first + r.count))
            }
            None => None,
        };

        Ok(PendingDraw {
            pipeline,
            bind_groups,
            streams: bindings,
            indices,
            vertices: packet.first_vertex..packet.first_vertex + packet.vertex_count,
            instances: 0..packet.instances,
            viewport,
        })
    }
}

impl Backend for WgpuBackend {
    fn buffer_data(&self, buffer: GpuHandle, data: &[u8], usage: BufferUsage) {
        // Sized up to the copy alignment so partial writes can always be
        // widened to aligned ranges.
        let mut contents = data.to_vec();
        contents.resize(align_up(data.len()).max(COPY_ALIGN), 0);

        let gpu = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("kiln buffer"),
            contents: &contents,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
        });
        log::trace!(target: "kiln::gpu", "buffer {buffer}: {} bytes ({usage:?})", data.len());
        self.inner.borrow_mut().buffers.insert(buffer, gpu);
    }

    fn buffer_sub_data(&self, buffer: GpuHandle, offset: usize, len: usize, contents: &[u8]) {
        let mut inner = self.inner.borrow_mut();
        self.flush(&mut inner);

        let Some(gpu) = inner.buffers.get(&buffer) else {
            return;
        };
        let start = offset - offset % COPY_ALIGN;
        let end = align_up(offset + len).min(gpu.size() as usize);
        if end <= start {
            return;
        }

        let mut chunk = contents.get(start..end.min(contents.len())).unwrap_or_default().to_vec();
        chunk.resize(end - start, 0);
        self.queue.write_buffer(gpu, start as u64, &chunk);
    }

    fn buffer_deleted(&self, buffer: GpuHandle) {
        self.inner.borrow_mut().buffers.remove(&buffer);
    }

    fn texture_created(&self, texture: GpuHandle, width: u32, height: u32, rgba: &[u8]) {
        let view = upload_rgba8(&self.device, &self.queue, "kiln texture", width, height, rgba);
        self.inner.borrow_mut().textures.insert(texture, view);
    }

    fn texture_deleted(&self, texture: GpuHandle) {
        self.inner.borrow_mut().textures.remove(&texture);
    }

    fn program_linked(&self, program: GpuHandle, linked: &LinkedProgram) {
        let module = |label: &str, src: &str| {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(src.to_owned().into()),
            })
        };
        let vertex = module("kiln vertex stage", &linked.vertex.source);
        let fragment = module("kiln fragment stage", &linked.fragment.source);

        let uniform_size = linked
            .uniforms
            .as_ref()
            .and_then(|u| NonZeroU64::new(u.size as u64));

        let groups = linked.resources.iter().map(|r| r.group + 1).max().unwrap_or(0);
        let bind_group_layouts: Vec<wgpu::BindGroupLayout> = (0..groups)
            .map(|group| {
                let entries: Vec<wgpu::BindGroupLayoutEntry> = linked
                    .resources
                    .iter()
                    .filter(|r| r.group == group)
                    .map(|r| wgpu::BindGroupLayoutEntry {
                        binding: r.binding,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: match r.kind {
                            ResourceKind::UniformBuffer => wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: uniform_size,
                            },
                            ResourceKind::Texture => wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            ResourceKind::Sampler => {
                                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
                            }
                        },
                        count: None,
                    })
                    .collect();

                self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("kiln program bgl"),
                    entries: &entries,
                })
            })
            .collect();

        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kiln program layout"),
            bind_group_layouts: &bind_group_layouts.iter().collect::<Vec<_>>(),
            immediate_size: 0,
        });

        let mut inner = self.inner.borrow_mut();
        inner.pipelines.retain(|k, _| k.program != program);
        inner.programs.insert(
            program,
            ProgramEntry {
                vertex,
                vertex_entry: linked.vertex.entry_point.clone(),
                fragment,
                fragment_entry: linked.fragment.entry_point.clone(),
                layout,
                bind_group_layouts,
                resources: linked.resources.clone(),
            },
        );
    }

    fn program_deleted(&self, program: GpuHandle) {
        let mut inner = self.inner.borrow_mut();
        inner.programs.remove(&program);
        inner.pipelines.retain(|k, _| k.program != program);
    }

    fn clear(&self, request: &ClearRequest) -> Result<(), ApiError> {
        let mut inner = self.inner.borrow_mut();
        if inner.target.is_none() {
            return Err(ApiError::InvalidFramebufferOperation);
        }
        if !inner.pending.is_empty() {
            self.flush(&mut inner);
        }
        let c = request.color;
        inner.pending_clear = Some(wgpu::Color {
            r: c.x as f64,
            g: c.y as f64,
            b: c.z as f64,
            a: c.w as f64,
        });
        Ok(())
    }

    fn draw(&self, packet: &DrawPacket) -> Result<(), ApiError> {
        let mut inner = self.inner.borrow_mut();
        let draw = self.assemble(&mut inner, packet)?;
        // Fully clipped viewports draw nothing.
        if draw.viewport[2] > 0.0 && draw.viewport[3] > 0.0 {
            inner.pending.push(draw);
        }
        Ok(())
    }
}

// ── conversions ───────────────────────────────────────────────────────────

fn vertex_format(ty: AttributeType, normalized: bool) -> Result<wgpu::VertexFormat, ApiError> {
    use wgpu::VertexFormat as F;
    if normalized && ty.is_integer() {
        // no normalized 32-bit integer formats
        return Err(ApiError::InvalidOperation);
    }
    Ok(match ty {
        AttributeType::Float => F::Float32,
        AttributeType::Float2 => F::Float32x2,
        AttributeType::Float3 => F::Float32x3,
        AttributeType::Float4 => F::Float32x4,
        AttributeType::Int => F::Sint32,
        AttributeType::Int2 => F::Sint32x2,
        AttributeType::Int3 => F::Sint32x3,
        AttributeType::Int4 => F::Sint32x4,
    })
}

fn topology(mode: PrimitiveKind) -> wgpu::PrimitiveTopology {
    match mode {
        PrimitiveKind::Triangles => wgpu::PrimitiveTopology::TriangleList,
        PrimitiveKind::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        PrimitiveKind::Lines => wgpu::PrimitiveTopology::LineList,
        PrimitiveKind::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        PrimitiveKind::Points => wgpu::PrimitiveTopology::PointList,
    }
}

/// Bottom-left viewport → top-left, clamped to the target. An unset (empty)
/// viewport covers the whole target.
fn target_viewport(packet: &DrawPacket, width: u32, height: u32) -> [f32; 4] {
    let vp = packet.viewport;
    if vp.width == 0 || vp.height == 0 {
        return [0.0, 0.0, width as f32, height as f32];
    }
    let (tw, th) = (width as i64, height as i64);
    let top = th - vp.y as i64 - vp.height as i64;

    let x0 = (vp.x as i64).clamp(0, tw);
    let y0 = top.clamp(0, th);
    let x1 = (vp.x as i64 + vp.width as i64).clamp(0, tw);
    let y1 = (top + vp.height as i64).clamp(0, th);
    [x0 as f32, y0 as f32, (x1 - x0) as f32, (y1 - y0) as f32]
}

fn upload_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> wgpu::TextureView {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );

    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::Viewport;

    fn packet(viewport: Viewport) -> DrawPacket {
        DrawPacket {
            program: GpuHandle::from_raw(1),
            mode: PrimitiveKind::Triangles,
            attributes: Vec::new(),
            indices: None,
            first_vertex: 0,
            vertex_count: 3,
            instances: 1,
            uniforms: Vec::new(),
            texture: None,
            viewport,
        }
    }

    #[test]
    fn viewport_flips_to_top_left() {
        let vp = Viewport { x: 10, y: 20, width: 100, height: 50 };
        assert_eq!(target_viewport(&packet(vp), 800, 600), [10.0, 530.0, 100.0, 50.0]);
    }

    #[test]
    fn unset_viewport_covers_target() {
        assert_eq!(
            target_viewport(&packet(Viewport::default()), 640, 480),
            [0.0, 0.0, 640.0, 480.0]
        );
    }

    #[test]
    fn oversized_viewport_is_clamped() {
        let vp = Viewport { x: -10, y: 0, width: 2000, height: 2000 };
        assert_eq!(target_viewport(&packet(vp), 800, 600), [0.0, 0.0, 800.0, 600.0]);
    }

    #[test]
    fn normalized_int_attributes_have_no_format() {
        assert_eq!(
            vertex_format(AttributeType::Int2, true),
            Err(ApiError::InvalidOperation)
        );
        assert_eq!(vertex_format(AttributeType::Float3, false), Ok(wgpu::VertexFormat::Float32x3));
    }

    #[test]
    fn partial_writes_round_to_copy_alignment() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(5), 8);
        assert_eq!(align_up(8), 8);
    }
}
