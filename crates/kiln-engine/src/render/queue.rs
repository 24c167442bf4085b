//! Deferred command queue.
//!
//! Commands accumulate in submission order and run at the flush point, either
//! one by one ([`CommandQueue::execute`]) or with consecutive sprite draws
//! folded into instanced batches ([`CommandQueue::execute_batched`]). Both
//! modes empty the queue, including when a command fails.

use std::rc::Rc;

use glam::Mat4;

use super::backend::{BufferUsage, PrimitiveKind};
use super::batch::{self, FlushStep, SpriteBatch, SpriteInstance};
use super::buffer::VertexBuffer;
use super::command::{DrawSpriteCommand, RenderCommand};
use super::device::GraphicsDevice;
use super::error::{precondition, RenderResult};
use super::geometry::{quad_layout, Geometry};
use super::handle::GpuHandle;
use super::shader::Shader;
use super::shader_library::ShaderLibrary;
use super::transform::screen_projection;
use super::vertex_array::VertexArray;

const INDEX_SIZE: usize = std::mem::size_of::<u32>();

/// Totals of one flush.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FlushStats {
    /// Commands taken from the queue.
    pub commands: usize,
    pub draw_calls: usize,
    pub batches: usize,
    /// Sprites drawn, batched or not.
    pub sprites: usize,
}

/// Unit quad + per-sprite program, used by direct sprite draws.
#[derive(Debug, Clone)]
struct SpriteResources {
    quad: Rc<Geometry>,
    shader: Rc<Shader>,
}

/// Quad + instance stream assembled into one vertex array.
#[derive(Debug, Clone)]
struct BatchResources {
    vertex_array: Rc<VertexArray>,
    instance_buffer: Rc<VertexBuffer>,
    shader: Rc<Shader>,
}

#[derive(Debug)]
pub struct CommandQueue {
    device: GraphicsDevice,
    shaders: Rc<ShaderLibrary>,
    commands: Vec<RenderCommand>,
    max_per_batch: usize,

    sprite: Option<SpriteResources>,
    batch: Option<BatchResources>,
}

impl CommandQueue {
    /// # Panics
    /// If `max_per_batch` is zero.
    #[track_caller]
    pub fn new(device: &GraphicsDevice, shaders: Rc<ShaderLibrary>, max_per_batch: usize) -> Self {
        precondition!(max_per_batch > 0, "sprite batch size must be at least 1");
        Self {
            device: device.clone(),
            shaders,
            commands: Vec::new(),
            max_per_batch,
            sprite: None,
            batch: None,
        }
    }

    pub fn enqueue(&mut self, command: impl Into<RenderCommand>) {
        self.commands.push(command.into());
    }

    /// Pending commands, oldest first.
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn max_per_batch(&self) -> usize {
        self.max_per_batch
    }

    /// Capacity hint; no observable effect.
    pub fn reserve(&mut self, additional: usize) {
        self.commands.reserve(additional);
    }

    /// Discards pending commands without running them.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Clears the queue and drops the lazily built sprite resources.
    pub fn reset(&mut self) {
        self.commands.clear();
        self.sprite = None;
        self.batch = None;
    }

    // ── flushing ─────────────────────────────────────────────────────────

    /// Runs every command in submission order.
    #[track_caller]
    pub fn execute(&mut self) -> RenderResult<FlushStats> {
        let mut commands = std::mem::take(&mut self.commands);
        let mut stats = FlushStats {
            commands: commands.len(),
            ..FlushStats::default()
        };

        let result = commands
            .iter()
            .try_for_each(|cmd| self.dispatch(cmd, &mut stats));

        commands.clear();
        self.commands = commands;
        self.finish("direct", result, stats)
    }

    /// Runs the queue with consecutive sprite draws grouped by texture into
    /// instanced batches; see [`batch`](super::batch) for the grouping rules.
    #[track_caller]
    pub fn execute_batched(&mut self) -> RenderResult<FlushStats> {
        let mut commands = std::mem::take(&mut self.commands);
        let mut stats = FlushStats {
            commands: commands.len(),
            ..FlushStats::default()
        };

        let result = batch::plan_batches(&commands, self.max_per_batch)
            .into_iter()
            .try_for_each(|step| match step {
                FlushStep::Command(cmd) => self.dispatch(cmd, &mut stats),
                FlushStep::Batch(b) => self.draw_batch(&b, &mut stats),
            });

        commands.clear();
        self.commands = commands;
        self.finish("batched", result, stats)
    }

    fn finish(&self, mode: &str, result: RenderResult<()>, stats: FlushStats) -> RenderResult<FlushStats> {
        match result {
            Ok(()) => {
                log::trace!(
                    target: "kiln::render",
                    "{mode} flush: {} commands, {} draw calls, {} batches, {} sprites",
                    stats.commands,
                    stats.draw_calls,
                    stats.batches,
                    stats.sprites
                );
                Ok(stats)
            }
            Err(e) => {
                log::error!(target: "kiln::render", "{mode} flush aborted, queue discarded: {e}");
                Err(e)
            }
        }
    }

    #[track_caller]
    fn dispatch(&mut self, command: &RenderCommand, stats: &mut FlushStats) -> RenderResult<()> {
        let device = &self.device;
        match command {
            RenderCommand::Clear(c) => device.clear(c.color, c.clear_depth, c.clear_stencil),
            RenderCommand::SetViewport(c) => device.viewport(c.x, c.y, c.width, c.height),
            RenderCommand::BindShader(c) => device.use_program(c.program),
            RenderCommand::SetUniform(c) => device.set_uniform(c.program, &c.name, c.value),
            RenderCommand::DrawIndexed(c) => {
                c.vertex_array.bind()?;
                stats.draw_calls += 1;
                device.draw_elements(c.primitive, c.index_count, c.index_offset as usize * INDEX_SIZE, 1)
            }
            RenderCommand::DrawIndexedInstanced(c) => {
                c.vertex_array.bind()?;
                stats.draw_calls += 1;
                device.draw_elements(
                    c.primitive,
                    c.index_count,
                    c.index_offset as usize * INDEX_SIZE,
                    c.instance_count,
                )
            }
            RenderCommand::DrawArrays(c) => {
                c.vertex_array.bind()?;
                stats.draw_calls += 1;
                device.draw_arrays(c.primitive, c.vertex_offset, c.vertex_count, 1)
            }
            RenderCommand::UpdateVertexBuffer(c) => c.buffer.update_data(&c.data, c.offset),
            RenderCommand::UpdateIndexBuffer(c) => c.buffer.update_indices(&c.indices, c.offset),
            RenderCommand::BindVertexArray(c) => c.vertex_array.bind(),
            RenderCommand::UnbindVertexArray(_) => device.bind_vertex_array(GpuHandle::NULL),
            RenderCommand::DrawSprite(c) => {
                stats.draw_calls += 1;
                stats.sprites += 1;
                self.draw_sprite(c)
            }
        }
    }

    // ── sprites ──────────────────────────────────────────────────────────

    #[track_caller]
    fn sprite_resources(&mut self) -> RenderResult<SpriteResources> {
        if let Some(res) = &self.sprite {
            return Ok(res.clone());
        }
        let res = SpriteResources {
            quad: Geometry::create_quad(&self.device, 1.0, 1.0)?,
            shader: self.shaders.sprite()?,
        };
        log::debug!(target: "kiln::render", "sprite resources ready");
        self.sprite = Some(res.clone());
        Ok(res)
    }

    #[track_caller]
    fn batch_resources(&mut self) -> RenderResult<BatchResources> {
        if let Some(res) = &self.batch {
            return Ok(res.clone());
        }
        let quad = self.sprite_resources()?.quad;

        let instance_bytes = vec![0u8; self.max_per_batch * std::mem::size_of::<SpriteInstance>()];
        let instance_buffer = Rc::new(VertexBuffer::with_data(&self.device, &instance_bytes, BufferUsage::Dynamic)?);

        let vertex_array = Rc::new(VertexArray::new(&self.device)?);
        vertex_array.add_vertex_buffer(Rc::clone(quad.vertex_buffer()), quad_layout())?;
        vertex_array.add_instance_buffer(Rc::clone(&instance_buffer), batch::instance_layout())?;
        vertex_array.set_index_buffer(Rc::clone(quad.index_buffer()))?;

        let res = BatchResources {
            vertex_array,
            instance_buffer,
            shader: self.shaders.sprite_instanced()?,
        };
        log::debug!(
            target: "kiln::render",
            "batch resources ready ({} instances per batch)",
            self.max_per_batch
        );
        self.batch = Some(res.clone());
        Ok(res)
    }

    #[track_caller]
    fn draw_sprite(&mut self, cmd: &DrawSpriteCommand) -> RenderResult<()> {
        let SpriteResources { quad, shader } = self.sprite_resources()?;
        let projection: Mat4 = screen_projection(cmd.screen_dimensions);

        shader.bind()?;
        shader.set_uniform("u_projection", projection)?;
        shader.set_uniform("u_model", cmd.transform.matrix())?;
        shader.set_uniform("u_tint", cmd.tint_color)?;
        self.device.bind_texture(cmd.texture_id)?;

        quad.bind()?;
        self.device
            .draw_elements(PrimitiveKind::Triangles, quad.index_count() as u32, 0, 1)
    }

    #[track_caller]
    fn draw_batch(&mut self, batch: &SpriteBatch, stats: &mut FlushStats) -> RenderResult<()> {
        let res = self.batch_resources()?;
        let count = batch.instances.len();

        res.shader.bind()?;
        self.device.bind_texture(batch.texture_id)?;
        res.instance_buffer
            .update_data(bytemuck::cast_slice(&batch.instances), 0)?;

        res.vertex_array.bind()?;
        self.device
            .draw_elements(PrimitiveKind::Triangles, 6, 0, count as u32)?;

        stats.draw_calls += 1;
        stats.batches += 1;
        stats.sprites += count;
        Ok(())
    }
}
