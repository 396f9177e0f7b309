//! Instanced rounded rects. One static 24-vertex mesh is stretched per instance in the
//! vertex stage and the fragment stage evaluates an analytic coverage mask, so fills,
//! strokes and their antialiasing need no stencil.

use bytemuck::{Pod, Zeroable};

use crate::geometry::{Matrix, RRect};
use crate::gpu::{Command, VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode};
use crate::hw::HwDrawContext;
use crate::paint::{Paint, PaintStyle, StrokeJoin};
use crate::shader::common::{setup_common_info, COMMON_VERTEX_WGSL};
use crate::shader::{ShaderFlags, WgslGeometry};

const RRECT_VS_FUNCTIONS: &str = r#"
// 0 => (-1, -1), 1 => (1, -1), 2 => (1, 1), 3 => (-1, 1)
fn get_corner_sign(corner_idx: i32) -> vec2<f32> {
  let x = f32(((corner_idx + 1) & 2) - 1);
  let y = f32((corner_idx & 2) - 1);
  return vec2<f32>(x, y);
}

fn inverse_grid_length(g: vec2<f32>, j: mat2x2<f32>) -> f32 {
  let grid = j * g;
  return 1.0 / sqrt(dot(grid, grid));
}
"#;

const RRECT_VS_INPUT: &str = r#"
struct VSInput {
  @location(0) packed: vec4<f32>,
  @location(1) rect: vec4<f32>,
  @location(2) radii: vec2<f32>,
  @location(3) stroke: vec2<f32>,
  @location(4) j: vec4<f32>,
  @location(5) transform0: vec4<f32>,
  @location(6) transform1: vec2<f32>,
  @location(7) color: vec4<f32>,
};
"#;

const RRECT_VS_MAIN: &str = r#"
  let offset = input.packed.xy;
  let corner_and_outside = i32(input.packed.z);
  let corner_idx = corner_and_outside & 3;
  let outside = f32(corner_and_outside >> 2u);
  let region = input.packed.w;

  let corner_sign = get_corner_sign(corner_idx);
  let center = (input.rect.xy + input.rect.zw) * 0.5;
  let half_wh = center - input.rect.xy;
  let j = mat2x2<f32>(input.j.xy, input.j.zw);
  let aa = abs(j * vec2<f32>(1.0, 1.0));
  let stroke_vec = vec2<f32>(input.stroke.x);

  let r_outer = half_wh + stroke_vec + aa;
  let r_inner = max(half_wh - stroke_vec - aa, vec2<f32>(0.0));
  let r_core = half_wh - input.radii;
  let diff = input.radii - (stroke_vec + aa);
  let mask_diff = vec2<f32>(select(0.0, 1.0, diff.x < 0.0), select(0.0, 1.0, diff.y < 0.0));

  let r1 = mix(r_inner, r_outer, vec2<f32>(outside));
  let r2 = mix(r_core, r_inner, mask_diff);
  let r_final = mix(r2, r1, offset);

  var pos = center + corner_sign * r_final;
  if (input.stroke.x == 0.0 && region > 0.0) {
    pos = center;
  }

  let inv_grid = vec2<f32>(
    inverse_grid_length(vec2<f32>(1.0, 0.0), j),
    inverse_grid_length(vec2<f32>(0.0, 1.0), j));

  local_pos = pos;
  var instance_slot = common_slot;
  instance_slot.userTransform = mat4x4<f32>(
    input.transform0.x, input.transform0.y, 0.0, 0.0,
    input.transform0.z, input.transform0.w, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    input.transform1.x, input.transform1.y, 0.0, 1.0);
  output.pos = get_vertex_position(pos, instance_slot);
  output.v_fs_packed = vec4<f32>(local_pos, f32(corner_idx), region);
  output.v_rect = input.rect;
  output.v_radii = input.radii;
  output.v_stroke = input.stroke;
  output.v_j = vec4<f32>(j[0], j[1]);
  output.v_inv_grid = inv_grid;
"#;

const RRECT_FS_FUNCTIONS: &str = r#"
fn inverse_grid_length(g: vec2<f32>, j: mat2x2<f32>) -> f32 {
  let grid = j * g;
  return 1.0 / sqrt(dot(grid, grid));
}

fn ellipse_sdf(p: vec2<f32>, ab: vec2<f32>, j: mat2x2<f32>) -> f32 {
  let inv_a2b2 = 1.0 / (ab * ab);
  let k1 = dot(p * p, inv_a2b2) - 1.0;
  let k2 = inverse_grid_length(2.0 * p * inv_a2b2, j);
  return k1 * k2;
}

fn linearstep(edge0: f32, edge1: f32, x: f32) -> f32 {
  return clamp((x - edge0) / (edge1 - edge0), 0.0, 1.0);
}

fn get_corner_sign(corner_idx: i32) -> vec2<f32> {
  let x = f32(((corner_idx + 1) & 2) - 1);
  let y = f32((corner_idx & 2) - 1);
  return vec2<f32>(x, y);
}

fn in_corner_region(pos_to_corner: vec2<f32>, corner_sign: vec2<f32>) -> bool {
  let s = sign(pos_to_corner) * corner_sign;
  return s.x > 0.0 && s.y > 0.0;
}

fn calculate_mask_alpha(v_pos: vec2<f32>, corner_idx: i32, v_region: f32, v_rect: vec4<f32>, v_radii: vec2<f32>, v_stroke: vec2<f32>, v_j: vec4<f32>, v_inv_grid: vec2<f32>) -> f32 {
  if (v_region > 0.0 && v_stroke.x == 0.0) {
    return 1.0;
  }
  var d_inner: f32 = 1.0;
  let is_rect = v_radii.x == 0.0 && v_radii.y == 0.0;
  let j = mat2x2<f32>(v_j.xy, v_j.zw);
  let raw_distances = v_rect - vec4<f32>(v_pos, v_pos);
  let edge_distances = vec4<f32>(raw_distances.xy, -raw_distances.zw);
  let outer_distances = edge_distances - v_stroke.x;
  let max_outer = max(outer_distances.xy, outer_distances.zw);
  let need_handle_join = v_stroke.x > 0.0 && is_rect && max_outer.x > -v_stroke.x && max_outer.y > -v_stroke.x;

  let scaled_outer = max_outer * v_inv_grid;
  var d_outer = max(scaled_outer.x, scaled_outer.y);

  if (v_stroke.x > 0.0) {
    let inner_distances = edge_distances + v_stroke.x;
    let max_inner = max(inner_distances.xy, inner_distances.zw) * v_inv_grid;
    d_inner = max(max_inner.x, max_inner.y);
  }

  if (v_region < 0.0) {
    let core_rect = vec4<f32>(v_rect.xy + v_radii, v_rect.zw - v_radii);
    var core_rect_x = core_rect.xzzx;
    var core_rect_y = core_rect.yyww;
    let corner_origin = vec2<f32>(core_rect_x[corner_idx], core_rect_y[corner_idx]);
    let pos_to_corner = v_pos - corner_origin;
    let corner_sign = get_corner_sign(corner_idx);
    let may_have_round_corner = in_corner_region(pos_to_corner, corner_sign) && !is_rect;
    let handle_inner_ellipse = may_have_round_corner && v_stroke.x > 0.0;
    let handle_outer_ellipse = may_have_round_corner || (v_stroke.y == 1.0 && need_handle_join);
    let handle_bevel = v_stroke.y == 2.0 && need_handle_join;

    if (handle_bevel) {
      let abs_to_corner = abs(pos_to_corner);
      let d_bevel = (abs_to_corner.x + abs_to_corner.y - v_stroke.x) * inverse_grid_length(corner_sign, j);
      d_outer = max(d_outer, d_bevel);
    }
    if (handle_outer_ellipse) {
      d_outer = max(ellipse_sdf(pos_to_corner, v_radii + vec2<f32>(v_stroke.x), j), d_outer);
    }
    if (handle_inner_ellipse) {
      d_inner = max(ellipse_sdf(pos_to_corner, v_radii - vec2<f32>(v_stroke.x), j), d_inner);
    }
  }

  return linearstep(0.5, -0.5, max(d_outer, -d_inner));
}
"#;

/// One rounded rect to draw, with the paint and transform it was recorded under.
#[derive(Debug, Clone)]
pub struct RRectItem {
    pub rrect: RRect,
    pub paint: Paint,
    pub transform: Matrix,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RRectInstance {
    rect: [f32; 4],
    radii: [f32; 2],
    stroke: [f32; 2],
    inv_jacobian: [f32; 4],
    transform0: [f32; 4],
    transform1: [f32; 2],
    color: [f32; 4],
}

const INSTANCE_SIZE: u64 = std::mem::size_of::<RRectInstance>() as u64;

impl RRectInstance {
    fn new(item: &RRectItem, scale: [f32; 2]) -> Self {
        let RRectItem {
            rrect,
            paint,
            transform,
        } = item;
        let scaled = Matrix::scale(scale[0], scale[1]) * *transform;
        let inv = scaled.invert().unwrap_or_default();

        let is_stroke = paint.style == PaintStyle::Stroke;
        let stroke_radius = if is_stroke {
            (paint.stroke_width / 2.0).max(0.5)
        } else {
            0.0
        };
        // Joins only matter on sharp corners: 0 miter, 1 round, 2 bevel.
        let join = if is_stroke && rrect.is_rect() {
            match paint.join {
                StrokeJoin::Miter if paint.miter_limit < std::f32::consts::SQRT_2 => 2.0,
                StrokeJoin::Miter => 0.0,
                StrokeJoin::Round => 1.0,
                StrokeJoin::Bevel => 2.0,
            }
        } else {
            0.0
        };
        let color = if is_stroke {
            paint.stroke_color
        } else {
            paint.fill_color
        };
        let r = &rrect.rect;
        Self {
            rect: [r.left, r.top, r.right, r.bottom],
            radii: [rrect.radii[0].x, rrect.radii[0].y],
            stroke: [stroke_radius, join],
            inv_jacobian: [inv.scale_x(), inv.skew_y(), inv.skew_x(), inv.scale_y()],
            transform0: [
                transform.scale_x(),
                transform.skew_y(),
                transform.skew_x(),
                transform.scale_y(),
            ],
            transform1: [transform.translate_x(), transform.translate_y()],
            color: color.0,
        }
    }
}

pub struct RRectGeometry<'a> {
    items: &'a [RRectItem],
}

impl<'a> RRectGeometry<'a> {
    pub fn new(items: &'a [RRectItem]) -> Self {
        Self { items }
    }
}

impl WgslGeometry for RRectGeometry<'_> {
    fn flags(&self) -> ShaderFlags {
        ShaderFlags::SNIPPET | ShaderFlags::AFFECTS_FRAGMENT
    }

    fn name(&self) -> String {
        "RRect".to_string()
    }

    fn vs_functions(&self) -> String {
        format!("{COMMON_VERTEX_WGSL}{RRECT_VS_FUNCTIONS}")
    }

    fn vs_input(&self) -> String {
        RRECT_VS_INPUT.to_string()
    }

    fn vs_main(&self) -> String {
        RRECT_VS_MAIN.to_string()
    }

    fn varyings(&self) -> Vec<String> {
        [
            "v_fs_packed: vec4<f32>",
            "v_rect: vec4<f32>",
            "v_radii: vec2<f32>",
            "v_stroke: vec2<f32>",
            "v_j: vec4<f32>",
            "v_inv_grid: vec2<f32>",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    fn fs_name_suffix(&self) -> String {
        "RRect".to_string()
    }

    fn fs_functions(&self) -> String {
        RRECT_FS_FUNCTIONS.to_string()
    }

    fn fs_mask(&self) -> String {
        "  mask_alpha = calculate_mask_alpha(input.v_fs_packed.xy, i32(input.v_fs_packed.z), input.v_fs_packed.w, input.v_rect, input.v_radii, input.v_stroke, input.v_j, input.v_inv_grid);\n"
            .to_string()
    }

    fn buffer_layout(&self) -> Vec<VertexBufferLayout> {
        let attr = |format, offset_floats: u64, shader_location| VertexAttribute {
            format,
            offset: offset_floats * 4,
            shader_location,
        };
        vec![
            VertexBufferLayout {
                array_stride: 16,
                step_mode: VertexStepMode::Vertex,
                attributes: vec![attr(VertexFormat::Float32x4, 0, 0)],
            },
            VertexBufferLayout {
                array_stride: INSTANCE_SIZE,
                step_mode: VertexStepMode::Instance,
                attributes: vec![
                    attr(VertexFormat::Float32x4, 0, 1),
                    attr(VertexFormat::Float32x2, 4, 2),
                    attr(VertexFormat::Float32x2, 6, 3),
                    attr(VertexFormat::Float32x4, 8, 4),
                    attr(VertexFormat::Float32x4, 12, 5),
                    attr(VertexFormat::Float32x2, 16, 6),
                    attr(VertexFormat::Float32x4, 18, 7),
                ],
            },
        ]
    }

    fn prepare_cmd(
        &self,
        cmd: &mut Command,
        ctx: &mut HwDrawContext<'_, '_>,
        transform: &Matrix,
        clip_depth: f32,
        _stencil_cmd: Option<&Command>,
    ) {
        if cmd.pipeline.is_none() {
            return;
        }
        cmd.vertex_buffer = ctx.static_buffer.rrect_vertex_view();
        cmd.index_buffer = ctx.static_buffer.rrect_index_view();
        cmd.index_count = (cmd.index_buffer.size / 4) as u32;

        let scale = [ctx.scale.x, ctx.scale.y];
        ctx.stage_buffer
            .begin_writing_instance(self.items.len() * INSTANCE_SIZE as usize, 16);
        for item in self.items {
            ctx.stage_buffer
                .append_instance(bytemuck::bytes_of(&RRectInstance::new(item, scale)));
        }
        let instances = ctx.stage_buffer.end_writing_instance();
        cmd.instance_count = (instances.size / INSTANCE_SIZE) as u32;
        cmd.instance_buffer = instances;

        setup_common_info(cmd, ctx, transform, clip_depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::geometry::Rect;

    #[test]
    fn instance_is_22_floats() {
        assert_eq!(INSTANCE_SIZE, 88);
    }

    #[test]
    fn thin_strokes_keep_half_a_pixel() {
        let item = RRectItem {
            rrect: RRect::from_rect(Rect::from_wh(10.0, 10.0)),
            paint: Paint::stroke(Color::RED, 0.2),
            transform: Matrix::identity(),
        };
        let instance = RRectInstance::new(&item, [1.0, 1.0]);
        assert_eq!(instance.stroke, [0.5, 0.0]);
        assert_eq!(instance.color, Color::RED.to_color4f().0);
    }

    #[test]
    fn sharp_miters_fall_back_to_bevel() {
        let mut paint = Paint::stroke(Color::BLACK, 4.0);
        paint.miter_limit = 1.0;
        let item = RRectItem {
            rrect: RRect::from_rect(Rect::from_wh(10.0, 10.0)),
            paint,
            transform: Matrix::translate(5.0, 6.0),
        };
        let instance = RRectInstance::new(&item, [2.0, 2.0]);
        assert_eq!(instance.stroke, [2.0, 2.0]);
        assert_eq!(instance.transform1, [5.0, 6.0]);
        assert_eq!(instance.inv_jacobian, [0.5, 0.0, 0.0, 0.5]);
    }
}
