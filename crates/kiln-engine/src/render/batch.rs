//! Sprite batching pre-pass.
//!
//! Turns a command list into flush steps: non-sprite commands pass through
//! untouched, and every maximal run of consecutive `DrawSprite` commands is
//! replaced by instanced batches grouped by texture.
//!
//! Grouping inside a run is stable: batches come out in the order each
//! texture was first seen, and instances keep their submission order. A
//! texture with more sprites than the cap yields several batches in a row.
//! Any other command closes the run, so it still executes between the sprites
//! submitted before and after it.

use bytemuck::{Pod, Zeroable};

use super::command::{DrawSpriteCommand, RenderCommand};
use super::error::precondition;
use super::handle::TextureId;
use super::layout::{AttributeType, VertexLayout};
use super::transform::screen_projection;

/// Per-instance record of the instanced sprite program.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct SpriteInstance {
    /// Projection × model, column-major.
    pub clip_from_local: [[f32; 4]; 4],
    pub tint: [f32; 4],
}

impl SpriteInstance {
    pub fn from_command(cmd: &DrawSpriteCommand) -> Self {
        let m = screen_projection(cmd.screen_dimensions) * cmd.transform.matrix();
        Self {
            clip_from_local: m.to_cols_array_2d(),
            tint: cmd.tint_color.to_array(),
        }
    }
}

/// Layout of the instance stream (one `mat4` as four columns, then the tint).
pub fn instance_layout() -> VertexLayout {
    VertexLayout::default()
        .with("clip_from_local_0", AttributeType::Float4)
        .with("clip_from_local_1", AttributeType::Float4)
        .with("clip_from_local_2", AttributeType::Float4)
        .with("clip_from_local_3", AttributeType::Float4)
        .with("tint", AttributeType::Float4)
}

/// Sprites sharing one texture, drawn with a single instanced call.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteBatch {
    pub texture_id: TextureId,
    pub instances: Vec<SpriteInstance>,
}

#[derive(Debug)]
pub enum FlushStep<'a> {
    Command(&'a RenderCommand),
    Batch(SpriteBatch),
}

/// Plans the batched flush of `commands`.
///
/// # Panics
/// If `max_per_batch` is zero.
#[track_caller]
pub fn plan_batches(commands: &[RenderCommand], max_per_batch: usize) -> Vec<FlushStep<'_>> {
    precondition!(max_per_batch > 0, "sprite batch size must be at least 1");

    let mut steps = Vec::new();
    let mut run: Vec<&DrawSpriteCommand> = Vec::new();

    for cmd in commands {
        match cmd.as_sprite() {
            Some(sprite) => run.push(sprite),
            None => {
                flush_run(&mut run, max_per_batch, &mut steps);
                steps.push(FlushStep::Command(cmd));
            }
        }
    }
    flush_run(&mut run, max_per_batch, &mut steps);

    steps
}

fn flush_run<'a>(run: &mut Vec<&DrawSpriteCommand>, max: usize, out: &mut Vec<FlushStep<'a>>) {
    if run.is_empty() {
        return;
    }

    // (texture, instances) in first-seen order; runs are short enough that a
    // linear scan beats hashing.
    let mut groups: Vec<(TextureId, Vec<SpriteInstance>)> = Vec::new();
    for sprite in run.drain(..) {
        let instance = SpriteInstance::from_command(sprite);
        match groups.iter_mut().find(|(t, _)| *t == sprite.texture_id) {
            Some((_, instances)) => instances.push(instance),
            None => groups.push((sprite.texture_id, vec![instance])),
        }
    }

    for (texture_id, instances) in groups {
        for chunk in instances.chunks(max) {
            out.push(FlushStep::Batch(SpriteBatch {
                texture_id,
                instances: chunk.to_vec(),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::command::{ClearCommand, SetViewportCommand};
    use crate::render::handle::GpuHandle;
    use crate::render::transform::Transform;
    use glam::{Vec2, Vec4};

    fn sprite(texture: u32, x: f32) -> RenderCommand {
        DrawSpriteCommand::new(
            GpuHandle::from_raw(texture),
            Transform::from_position(Vec2::new(x, 0.0)),
            Vec2::new(800.0, 600.0),
        )
        .into()
    }

    fn batches<'a>(steps: &'a [FlushStep<'a>]) -> Vec<&'a SpriteBatch> {
        steps
            .iter()
            .filter_map(|s| match s {
                FlushStep::Batch(b) => Some(b),
                FlushStep::Command(_) => None,
            })
            .collect()
    }

    #[test]
    fn instance_record_matches_instance_layout() {
        assert_eq!(std::mem::size_of::<SpriteInstance>(), 80);
        assert_eq!(instance_layout().stride(), 80);
    }

    #[test]
    fn counts_are_preserved_per_texture_and_capped() {
        let mut cmds = Vec::new();
        for i in 0..7 {
            cmds.push(sprite(1, i as f32));
        }
        for i in 0..5 {
            cmds.push(sprite(2, i as f32));
        }

        let steps = plan_batches(&cmds, 3);
        let bs = batches(&steps);

        let total = |t: u32| -> usize {
            bs.iter()
                .filter(|b| b.texture_id.raw() == t)
                .map(|b| b.instances.len())
                .sum()
        };
        assert_eq!(total(1), 7);
        assert_eq!(total(2), 5);
        assert!(bs.iter().all(|b| b.instances.len() <= 3));
        assert_eq!(bs.len(), 3 + 2);
    }

    #[test]
    fn first_seen_texture_order_is_stable() {
        let cmds = vec![sprite(5, 0.0), sprite(9, 1.0), sprite(5, 2.0), sprite(9, 3.0)];
        let steps = plan_batches(&cmds, 100);
        let bs = batches(&steps);

        assert_eq!(bs.len(), 2);
        assert_eq!(bs[0].texture_id.raw(), 5);
        assert_eq!(bs[1].texture_id.raw(), 9);

        // submission order within a texture: x = 0 then x = 2
        let expected_first = SpriteInstance::from_command(cmds[0].as_sprite().unwrap());
        let expected_second = SpriteInstance::from_command(cmds[2].as_sprite().unwrap());
        assert_eq!(bs[0].instances, vec![expected_first, expected_second]);
    }

    #[test]
    fn other_commands_keep_their_position() {
        let cmds = vec![
            ClearCommand::color(Vec4::ZERO).into(),
            sprite(1, 0.0),
            sprite(2, 0.0),
            SetViewportCommand { x: 0, y: 0, width: 10, height: 10 }.into(),
            sprite(1, 1.0),
        ];
        let steps = plan_batches(&cmds, 10);

        let shape: Vec<String> = steps
            .iter()
            .map(|s| match s {
                FlushStep::Command(c) => format!("{:?}", c.kind()),
                FlushStep::Batch(b) => format!("batch{}x{}", b.texture_id.raw(), b.instances.len()),
            })
            .collect();
        assert_eq!(shape, vec!["Clear", "batch1x1", "batch2x1", "SetViewport", "batch1x1"]);
    }

    #[test]
    fn instance_matrix_is_projection_times_model() {
        let cmd = DrawSpriteCommand::new(GpuHandle::from_raw(1), Transform::IDENTITY, Vec2::new(2.0, 2.0))
            .with_tint(Vec4::new(1.0, 0.0, 0.0, 1.0));
        let inst = SpriteInstance::from_command(&cmd);
        assert_eq!(inst.clip_from_local, screen_projection(Vec2::new(2.0, 2.0)).to_cols_array_2d());
        assert_eq!(inst.tint, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    #[should_panic(expected = "at least 1")]
    fn zero_batch_size_is_fatal() {
        plan_batches(&[], 0);
    }
}
