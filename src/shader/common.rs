//! WGSL shared by several geometries and fragments.

use crate::geometry::{Mat4, Matrix};
use crate::gpu::Command;
use crate::hw::HwDrawContext;

use super::upload_uniform;

/// Per-draw vertex uniform. `extraInfo.x` carries the clip depth written to `z`.
pub const COMMON_VERTEX_WGSL: &str = r#"
struct CommonSlot {
  mvp: mat4x4<f32>,
  userTransform: mat4x4<f32>,
  extraInfo: vec4<f32>,
};

@group(0) @binding(0) var<uniform> common_slot: CommonSlot;

fn get_vertex_position(a_pos: vec2<f32>, cs: CommonSlot) -> vec4<f32> {
  let pos = cs.mvp * cs.userTransform * vec4<f32>(a_pos, 0.0, 1.0);
  return vec4<f32>(pos.x, pos.y, cs.extraInfo.x * pos.w, pos.w);
}
"#;

/// Tile modes: 0 clamp, 1 repeat, 2 mirror, 3 decal (left as is).
pub const REMAP_FLOAT_TILE_WGSL: &str = r#"
fn remap_float_tile(t: f32, tile_mode: i32) -> f32 {
  if (tile_mode == 0) {
    return clamp(t, 0.0, 1.0);
  } else if (tile_mode == 1) {
    return fract(t);
  } else if (tile_mode == 2) {
    let t1 = t - 1.0;
    let t2 = t1 - 2.0 * floor(t1 * 0.5) - 1.0;
    return abs(t2);
  }
  return t;
}
"#;

/// Uploads `common_slot`. Returns `false` if the pipeline does not declare it.
pub fn setup_common_info(
    cmd: &mut Command,
    ctx: &mut HwDrawContext<'_, '_>,
    transform: &Matrix,
    clip_depth: f32,
) -> bool {
    let mvp = ctx.mvp;
    upload_uniform(cmd, ctx, "common_slot", |block| {
        block.set_pod("mvp", &mvp);
        block.set_pod("userTransform", &Mat4::from_matrix(transform));
        block.set_pod("extraInfo", &[clip_depth, 0.0, 0.0, 0.0]);
    })
}
