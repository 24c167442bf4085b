//! Sprite sandbox: a ring of spinning sprites on two procedural textures,
//! drawn through the batched command queue.
//!
//! `KILN_DIRECT=1` switches to direct execution for comparison.

use std::rc::Rc;

use glam::{Vec2, Vec4};
use winit::event::WindowEvent;
use winit::window::WindowId;

use kiln_engine::core::{App, AppControl, FrameCtx};
use kiln_engine::device::GpuInit;
use kiln_engine::logging::{init_logging, LoggingConfig};
use kiln_engine::render::command::DrawSpriteCommand;
use kiln_engine::render::{
    ExecutionMode, GraphicsDevice, RenderConfig, RenderContext, TextureId, Transform, WgpuBackend,
};
use kiln_engine::window::{Runtime, RuntimeConfig};

const SPRITES: usize = 64;
const SPRITE_SIZE: f32 = 48.0;

fn checkerboard(size: u32, a: [u8; 4], b: [u8; 4]) -> Vec<u8> {
    (0..size * size)
        .flat_map(|i| {
            let (x, y) = (i % size, i / size);
            if (x / 4 + y / 4) % 2 == 0 { a } else { b }
        })
        .collect()
}

struct Scene {
    backend: Rc<WgpuBackend>,
    ctx: RenderContext,
    textures: [TextureId; 2],
}

impl Scene {
    fn new(frame: &FrameCtx<'_, '_>, execution: ExecutionMode) -> anyhow::Result<Self> {
        let gpu = &*frame.gpu;
        let backend = Rc::new(WgpuBackend::new(gpu.device(), gpu.queue(), gpu.surface_format()));
        let device = GraphicsDevice::new(backend.clone());

        let mut ctx = RenderContext::new(
            &device,
            RenderConfig {
                execution,
                ..RenderConfig::default()
            },
        );
        let (w, h) = frame.window.physical_size();
        ctx.initialize(w, h)?;

        let textures = [
            device.create_texture_rgba8(16, 16, &checkerboard(16, [230, 120, 40, 255], [250, 200, 90, 255]))?,
            device.create_texture_rgba8(16, 16, &checkerboard(16, [40, 140, 220, 255], [120, 210, 250, 180]))?,
        ];

        Ok(Self {
            backend,
            ctx,
            textures,
        })
    }

    fn submit_sprites(&mut self, t: f32) {
        let (w, h) = self.ctx.viewport_dimensions();
        let screen = Vec2::new(w as f32, h as f32);
        let center = screen * 0.5;
        let radius = screen.min_element() * 0.35;

        for i in 0..SPRITES {
            let phase = i as f32 / SPRITES as f32 * std::f32::consts::TAU;
            let angle = phase + t * 0.5;
            let position = center + Vec2::new(angle.cos(), angle.sin()) * radius;
            let transform = Transform::from_position(position)
                .with_rotation(t * 2.0 + phase)
                .with_scale(Vec2::splat(SPRITE_SIZE));

            let pulse = 0.75 + 0.25 * (t * 3.0 + phase).sin();
            self.ctx.submit(
                DrawSpriteCommand::new(self.textures[i % 2], transform, screen)
                    .with_tint(Vec4::new(pulse, pulse, pulse, 1.0)),
            );
        }
    }
}

struct Sandbox {
    execution: ExecutionMode,
    scene: Option<Scene>,
}

impl App for Sandbox {
    fn on_window_event(&mut self, _id: WindowId, event: &WindowEvent) -> AppControl {
        if let (WindowEvent::Resized(size), Some(scene)) = (event, self.scene.as_mut()) {
            if size.width > 0 && size.height > 0 {
                scene.ctx.resize(size.width, size.height);
            }
        }
        AppControl::Continue
    }

    fn on_frame(&mut self, frame: &mut FrameCtx<'_, '_>) -> AppControl {
        if self.scene.is_none() {
            match Scene::new(frame, self.execution) {
                Ok(scene) => self.scene = Some(scene),
                Err(e) => {
                    log::error!("failed to set up the sandbox scene: {e:#}");
                    return AppControl::Exit;
                }
            }
        }
        let Some(scene) = self.scene.as_mut() else {
            return AppControl::Exit;
        };

        let t = frame.time.elapsed;
        let frame_index = frame.time.frame_index;
        let mut failed = false;

        let control = frame.render(|view, (w, h)| {
            scene.backend.begin_target(view, w, h);

            scene.ctx.begin_frame();
            scene.submit_sprites(t);
            match scene.ctx.end_frame() {
                Ok(stats) if frame_index % 600 == 0 => log::info!(
                    "frame {frame_index}: {} draw calls, {} batches, {} sprites",
                    stats.draw_calls,
                    stats.batches,
                    stats.sprites
                ),
                Ok(_) => {}
                Err(e) => {
                    log::error!("frame {frame_index} failed: {e}");
                    failed = true;
                }
            }

            scene.backend.end_target();
        });

        if failed { AppControl::Exit } else { control }
    }
}

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());

    let execution = match std::env::var("KILN_DIRECT").as_deref() {
        Ok("1") => ExecutionMode::Direct,
        _ => ExecutionMode::Batched,
    };
    log::info!("kiln sandbox starting ({execution:?} execution)");

    Runtime::run(
        RuntimeConfig {
            title: "kiln sandbox".to_string(),
            ..RuntimeConfig::default()
        },
        GpuInit::default(),
        Sandbox {
            execution,
            scene: None,
        },
    )
}
