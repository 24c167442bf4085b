//! Frame lifecycle and the single submission entry point.

use std::rc::Rc;

use glam::Vec4;

use super::command::{ClearCommand, RenderCommand, SetViewportCommand};
use super::device::GraphicsDevice;
use super::error::{precondition, RenderResult};
use super::queue::{CommandQueue, FlushStats};
use super::shader_library::ShaderLibrary;

/// How [`RenderContext::end_frame`] flushes the queue.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum ExecutionMode {
    #[default]
    Direct,
    /// Consecutive sprite draws become instanced batches.
    Batched,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Colour written by the clear that opens every frame.
    pub clear_color: Vec4,
    pub execution: ExecutionMode,
    pub max_sprites_per_batch: usize,
    /// Commands reserved up front in the queue.
    pub queue_capacity: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: Vec4::new(0.08, 0.08, 0.08, 1.0),
            execution: ExecutionMode::Direct,
            max_sprites_per_batch: 1000,
            queue_capacity: 1000,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Lifecycle {
    Uninitialized,
    Initialized,
    Shutdown,
}

/// Owns one command queue and the viewport of one rendering surface.
///
/// Uninitialized → Initialized (via [`initialize`](Self::initialize)) →
/// Shutdown. Every frame is `begin_frame`, any number of `submit`s, then
/// `end_frame`.
#[derive(Debug)]
pub struct RenderContext {
    device: GraphicsDevice,
    config: RenderConfig,
    shaders: Rc<ShaderLibrary>,
    queue: CommandQueue,
    width: u32,
    height: u32,
    lifecycle: Lifecycle,
}

impl RenderContext {
    pub fn new(device: &GraphicsDevice, config: RenderConfig) -> Self {
        let shaders = Rc::new(ShaderLibrary::new(device));
        let queue = CommandQueue::new(device, Rc::clone(&shaders), config.max_sprites_per_batch);
        Self {
            device: device.clone(),
            config,
            shaders,
            queue,
            width: 0,
            height: 0,
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    /// Sets the initial viewport and builds the built-in shaders.
    ///
    /// A second call on an initialized context returns `Ok` without doing
    /// anything. An `Err` means the context is unusable and startup should be
    /// abandoned.
    ///
    /// # Panics
    /// After [`shutdown`](Self::shutdown).
    #[track_caller]
    pub fn initialize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        precondition!(self.lifecycle != Lifecycle::Shutdown, "initialize after shutdown");
        if self.lifecycle == Lifecycle::Initialized {
            return Ok(());
        }

        self.width = width;
        self.height = height;

        self.device.viewport(0, 0, width, height)?;
        self.shaders.load_builtins()?;
        self.queue.reserve(self.config.queue_capacity);

        self.lifecycle = Lifecycle::Initialized;
        log::info!(
            target: "kiln::render",
            "render context initialized at {width}x{height} ({:?} execution)",
            self.config.execution
        );
        Ok(())
    }

    #[track_caller]
    fn require_initialized(&self, op: &str) {
        precondition!(
            self.lifecycle == Lifecycle::Initialized,
            "{op} on a render context that is not initialized"
        );
    }

    /// Opens a frame with a clear ahead of any submitted command.
    #[track_caller]
    pub fn begin_frame(&mut self) {
        self.require_initialized("begin_frame");
        self.queue.enqueue(ClearCommand {
            color: self.config.clear_color,
            clear_depth: true,
            clear_stencil: false,
        });
    }

    /// Flushes the queue with the configured execution mode.
    #[track_caller]
    pub fn end_frame(&mut self) -> RenderResult<FlushStats> {
        self.require_initialized("end_frame");
        match self.config.execution {
            ExecutionMode::Direct => self.queue.execute(),
            ExecutionMode::Batched => self.queue.execute_batched(),
        }
    }

    pub fn submit(&mut self, command: impl Into<RenderCommand>) {
        self.queue.enqueue(command);
    }

    /// Records the new size and queues a matching viewport change; nothing
    /// reaches the device until the next flush.
    #[track_caller]
    pub fn resize(&mut self, width: u32, height: u32) {
        self.require_initialized("resize");
        self.width = width;
        self.height = height;
        self.submit(SetViewportCommand {
            x: 0,
            y: 0,
            width,
            height,
        });
    }

    pub fn viewport_dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle == Lifecycle::Initialized
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn device(&self) -> &GraphicsDevice {
        &self.device
    }

    pub fn command_queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn command_queue_mut(&mut self) -> &mut CommandQueue {
        &mut self.queue
    }

    pub fn shaders(&self) -> &Rc<ShaderLibrary> {
        &self.shaders
    }

    /// Drops pending commands, sprite resources and registered shaders. The
    /// context cannot be used afterwards.
    pub fn shutdown(&mut self) {
        if self.lifecycle == Lifecycle::Shutdown {
            return;
        }
        self.queue.reset();
        self.shaders.clear();
        self.lifecycle = Lifecycle::Shutdown;
        log::info!(target: "kiln::render", "render context shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::ApiCall;
    use crate::render::command::{CommandKind, DrawSpriteCommand};
    use crate::render::handle::GpuHandle;
    use crate::render::transform::Transform;
    use glam::Vec2;

    fn context() -> (RenderContext, crate::render::backend::CallLog) {
        let (device, log) = GraphicsDevice::headless();
        (RenderContext::new(&device, RenderConfig::default()), log)
    }

    #[test]
    fn initialize_is_idempotent() {
        let (mut ctx, log) = context();
        ctx.initialize(800, 600).unwrap();
        let calls = log.calls().len();

        ctx.initialize(1, 1).unwrap();
        assert_eq!(log.calls().len(), calls);
        assert_eq!(ctx.viewport_dimensions(), (800, 600));
        assert!(ctx.is_initialized());
    }

    #[test]
    #[should_panic(expected = "not initialized")]
    fn begin_frame_requires_initialize() {
        let (mut ctx, _log) = context();
        ctx.begin_frame();
    }

    #[test]
    fn begin_frame_queues_a_clear_first() {
        let (mut ctx, _log) = context();
        ctx.initialize(64, 64).unwrap();
        ctx.begin_frame();
        let kinds: Vec<_> = ctx.command_queue().commands().iter().map(RenderCommand::kind).collect();
        assert_eq!(kinds, vec![CommandKind::Clear]);
    }

    #[test]
    fn resize_is_deferred_to_the_next_flush() {
        let (mut ctx, log) = context();
        ctx.initialize(800, 600).unwrap();
        ctx.resize(1024, 768);

        assert_eq!(ctx.viewport_dimensions(), (1024, 768));
        assert_eq!(ctx.device().current_viewport().width, 800);

        ctx.end_frame().unwrap();
        assert_eq!(ctx.device().current_viewport().width, 1024);
        assert!(matches!(
            log.calls().last(),
            Some(ApiCall::Viewport(v)) if v.height == 768
        ));
    }

    #[test]
    fn shutdown_is_terminal() {
        let (mut ctx, _log) = context();
        ctx.initialize(10, 10).unwrap();
        ctx.submit(ClearCommand::color(Vec4::ZERO));
        ctx.shutdown();

        assert!(!ctx.is_initialized());
        assert!(ctx.command_queue().is_empty());
        assert!(ctx.shaders().is_empty());
        ctx.shutdown();
    }

    // ── whole frames ─────────────────────────────────────────────────────

    fn sprite(texture: u32) -> DrawSpriteCommand {
        DrawSpriteCommand::new(
            GpuHandle::from_raw(texture),
            Transform::from_position(Vec2::new(100.0, 100.0)),
            Vec2::new(800.0, 600.0),
        )
    }

    #[test]
    fn frame_with_unknown_texture_fails_and_empties_the_queue() {
        let (mut ctx, _log) = context();
        ctx.initialize(800, 600).unwrap();

        ctx.begin_frame();
        ctx.submit(DrawSpriteCommand::new(
            GpuHandle::from_raw(7),
            Transform::IDENTITY,
            Vec2::new(800.0, 600.0),
        ));

        let queued = ctx.command_queue().commands();
        let kinds: Vec<_> = queued.iter().map(RenderCommand::kind).collect();
        assert_eq!(kinds, vec![CommandKind::Clear, CommandKind::DrawSprite]);
        let queued_sprite = queued[1].as_sprite().unwrap();
        assert_eq!(queued_sprite.texture_id.raw(), 7);
        assert_eq!(queued_sprite.transform, Transform::IDENTITY);

        let err = ctx.end_frame().unwrap_err();
        assert!(err.api_errors().is_some());
        assert!(ctx.command_queue().is_empty());
    }

    #[test]
    fn direct_frame_clears_then_draws() {
        let (mut ctx, log) = context();
        ctx.initialize(800, 600).unwrap();
        let tex = ctx.device().create_texture_rgba8(2, 2, &[255; 16]).unwrap();
        log.clear();

        ctx.begin_frame();
        ctx.submit(sprite(tex.raw()));
        ctx.submit(sprite(tex.raw()).with_tint(Vec4::new(1.0, 0.0, 0.0, 1.0)));
        let stats = ctx.end_frame().unwrap();

        assert_eq!(stats.commands, 3);
        assert_eq!(stats.draw_calls, 2);
        let clears = log.clears();
        assert_eq!(clears.len(), 1);
        assert_eq!(clears[0].color, Vec4::new(0.08, 0.08, 0.08, 1.0));
        assert!(clears[0].depth && !clears[0].stencil);

        let names = log.names();
        let clear_at = names.iter().position(|n| *n == "glClear");
        let first_draw = names.iter().position(|n| *n == "glDrawElementsInstanced");
        assert!(clear_at < first_draw);
        assert!(log.draws().iter().all(|d| d.texture == Some(tex)));
    }

    #[test]
    fn batched_frame_draws_one_instanced_call_per_texture() {
        let (device, log) = GraphicsDevice::headless();
        let config = RenderConfig {
            execution: ExecutionMode::Batched,
            ..RenderConfig::default()
        };
        let mut ctx = RenderContext::new(&device, config);
        ctx.initialize(800, 600).unwrap();
        let a = device.create_texture_rgba8(1, 1, &[255; 4]).unwrap();
        let b = device.create_texture_rgba8(1, 1, &[0; 4]).unwrap();
        log.clear();

        ctx.begin_frame();
        for t in [a, b, a, a, b] {
            ctx.submit(sprite(t.raw()));
        }
        let stats = ctx.end_frame().unwrap();

        assert_eq!(stats.batches, 2);
        assert_eq!(stats.sprites, 5);
        let draws = log.draws();
        let shape: Vec<_> = draws.iter().map(|d| (d.texture, d.instances)).collect();
        assert_eq!(shape, vec![(Some(a), 3), (Some(b), 2)]);
    }

    #[test]
    #[should_panic(expected = "after shutdown")]
    fn initialize_after_shutdown_is_fatal() {
        let (mut ctx, _log) = context();
        ctx.shutdown();
        let _ = ctx.initialize(10, 10);
    }
}
