use crate::color::Color4f;
use crate::geometry::{Mat4, Matrix};
use crate::gpu::Command;
use crate::hw::HwDrawContext;
use crate::paint::{GradientShader, GradientType};
use crate::shader::common::REMAP_FLOAT_TILE_WGSL;
use crate::shader::{upload_uniform, upload_uniform_bytes, ShaderFlags, WgslFragment, WgxFilter};

use super::init_filter;

const MAX_COLOR_COUNT: usize = 64;

/// Gradient evaluation shared by path and text fragments.
///
/// Declares `GradientInfo` at `binding` and the per-type uniform at `binding + 1`, and
/// provides `generate_gradient_color(pos)` returning a premultiplied color.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientWgsl {
    kind: GradientType,
    colors: Vec<Color4f>,
    stops: Vec<f32>,
    points: [[f32; 2]; 2],
    radii: [f32; 2],
    tile: i32,
    global_alpha: f32,
    max_color_count: usize,
}

impl GradientWgsl {
    pub fn new(shader: &GradientShader, global_alpha: f32) -> Self {
        let mut colors: Vec<Color4f> = shader.colors.iter().copied().take(MAX_COLOR_COUNT).collect();
        match colors.len() {
            0 => colors = vec![Color4f::TRANSPARENT; 2],
            1 => colors.push(colors[0]),
            _ => {}
        }
        let stops = if shader.stops.len() == shader.colors.len() && colors.len() == shader.stops.len() {
            shader.stops.clone()
        } else {
            Vec::new()
        };
        let max_color_count = colors.len().next_power_of_two().min(MAX_COLOR_COUNT);
        Self {
            kind: shader.kind,
            colors,
            stops,
            points: [shader.points[0].to_array(), shader.points[1].to_array()],
            radii: shader.radii,
            tile: shader.tile as i32,
            global_alpha,
            max_color_count,
        }
    }

    fn offset_fast(&self) -> bool {
        self.stops.is_empty()
    }

    fn color_fast(&self) -> bool {
        self.colors.len() == 2
    }

    /// E.g. `GradientLinear2OffsetFastColorFast`.
    pub fn name(&self) -> String {
        let mut name = format!("Gradient{}{}", self.kind.name(), self.max_color_count);
        if self.offset_fast() {
            name += "OffsetFast";
        }
        if self.color_fast() {
            name += "ColorFast";
        }
        name
    }

    fn type_uniform(&self) -> &'static str {
        match self.kind {
            GradientType::Linear => "linear_pts",
            GradientType::Radial => "radial_pts",
            GradientType::Conical => "conical_info",
            GradientType::Sweep => "sweep_pts",
        }
    }

    pub fn gen_source_wgsl(&self, binding: u32) -> String {
        let n = self.max_color_count;
        let mut src = String::from(REMAP_FLOAT_TILE_WGSL);
        src += "\nstruct GradientInfo {\n  infos: vec4<i32>,\n";
        src += &format!("  colors: array<vec4<f32>, {n}>,\n");
        if !self.offset_fast() {
            src += &format!("  stops: array<vec4<f32>, {}>,\n", n.div_ceil(4));
        }
        src += "  global_alpha: f32,\n};\n";
        src += &format!("\n@group(1) @binding({binding}) var<uniform> gradient_info: GradientInfo;\n");
        let type_binding = binding + 1;
        match self.kind {
            GradientType::Conical => {
                src += "\nstruct ConicalInfo {\n  center1: vec2<f32>,\n  center2: vec2<f32>,\n  radius1: f32,\n  radius2: f32,\n};\n";
                src += &format!("@group(1) @binding({type_binding}) var<uniform> conical_info: ConicalInfo;\n");
            }
            _ => {
                src += &format!(
                    "@group(1) @binding({type_binding}) var<uniform> {}: vec4<f32>;\n",
                    self.type_uniform()
                );
            }
        }

        if self.offset_fast() {
            src += r#"
fn get_stop(index: i32) -> f32 {
  return f32(index) / f32(gradient_info.infos.x - 1);
}
"#;
        } else {
            src += r#"
fn get_stop(index: i32) -> f32 {
  let packed = gradient_info.stops[index / 4];
  return packed[index % 4];
}
"#;
        }

        if self.color_fast() {
            src += r#"
fn lerp_color(t: f32) -> vec4<f32> {
  let t0 = get_stop(0);
  let t1 = get_stop(1);
  let w = clamp((t - t0) / max(t1 - t0, 0.00001), 0.0, 1.0);
  return mix(gradient_info.colors[0], gradient_info.colors[1], vec4<f32>(w));
}
"#;
        } else {
            src += r#"
fn lerp_color(t: f32) -> vec4<f32> {
  let count = gradient_info.infos.x;
  if (t <= get_stop(0)) {
    return gradient_info.colors[0];
  }
  for (var i: i32 = 1; i < count; i = i + 1) {
    let prev = get_stop(i - 1);
    let curr = get_stop(i);
    if (t <= curr) {
      let w = (t - prev) / max(curr - prev, 0.00001);
      return mix(gradient_info.colors[i - 1], gradient_info.colors[i], vec4<f32>(w));
    }
  }
  return gradient_info.colors[count - 1];
}
"#;
        }

        src += r#"
fn calculate_gradient_color(t_in: f32) -> vec4<f32> {
  if (gradient_info.infos.z == 3 && (t_in < 0.0 || t_in > 1.0)) {
    return vec4<f32>(0.0);
  }
  let t = remap_float_tile(t_in, gradient_info.infos.z);
  let c = lerp_color(t);
  return vec4<f32>(c.rgb * c.a, c.a) * gradient_info.global_alpha;
}
"#;

        src += match self.kind {
            GradientType::Linear => {
                r#"
fn generate_gradient_color(pos: vec2<f32>) -> vec4<f32> {
  let d = linear_pts.zw - linear_pts.xy;
  let len2 = dot(d, d);
  var t: f32 = 0.0;
  if (len2 > 0.0) {
    t = dot(pos - linear_pts.xy, d) / len2;
  }
  return calculate_gradient_color(t);
}
"#
            }
            GradientType::Radial => {
                r#"
fn generate_gradient_color(pos: vec2<f32>) -> vec4<f32> {
  var t: f32 = 0.0;
  if (radial_pts.z > 0.0) {
    t = length(pos - radial_pts.xy) / radial_pts.z;
  }
  return calculate_gradient_color(t);
}
"#
            }
            GradientType::Sweep => {
                r#"
fn generate_gradient_color(pos: vec2<f32>) -> vec4<f32> {
  let d = pos - sweep_pts.xy;
  let angle = atan2(-d.y, -d.x) * 0.1591549430918 + 0.5;
  return calculate_gradient_color((angle + sweep_pts.z) * sweep_pts.w);
}
"#
            }
            GradientType::Conical => {
                r#"
fn compute_conical_t(pos: vec2<f32>) -> vec2<f32> {
  let cd = conical_info.center2 - conical_info.center1;
  let pd = pos - conical_info.center1;
  let r0 = conical_info.radius1;
  let dr = conical_info.radius2 - r0;
  let a = dot(cd, cd) - dr * dr;
  let b = dot(pd, cd) + r0 * dr;
  let c = dot(pd, pd) - r0 * r0;
  if (abs(a) < 0.00001) {
    if (abs(b) < 0.00001) {
      return vec2<f32>(0.0, 0.0);
    }
    let t = c / (2.0 * b);
    if (r0 + t * dr < 0.0) {
      return vec2<f32>(0.0, 0.0);
    }
    return vec2<f32>(t, 1.0);
  }
  let disc = b * b - a * c;
  if (disc < 0.0) {
    return vec2<f32>(0.0, 0.0);
  }
  let s = sqrt(disc);
  let hi = max((b + s) / a, (b - s) / a);
  let lo = min((b + s) / a, (b - s) / a);
  if (r0 + hi * dr >= 0.0) {
    return vec2<f32>(hi, 1.0);
  }
  if (r0 + lo * dr >= 0.0) {
    return vec2<f32>(lo, 1.0);
  }
  return vec2<f32>(0.0, 0.0);
}

fn generate_gradient_color(pos: vec2<f32>) -> vec4<f32> {
  let res = compute_conical_t(pos);
  if (res.y <= 0.0) {
    return vec4<f32>(0.0);
  }
  return calculate_gradient_color(res.x);
}
"#
            }
        };
        src
    }

    /// Uploads `gradient_info` and the per-type uniform.
    pub fn upload(&self, cmd: &mut Command, ctx: &mut HwDrawContext<'_, '_>) -> bool {
        let infos = [self.colors.len() as i32, self.stops.len() as i32, self.tile, 0];
        let colors: Vec<f32> = self.colors.iter().flat_map(|c| c.0).collect();
        let mut stops = self.stops.clone();
        stops.resize(self.max_color_count.div_ceil(4) * 4, 1.0);
        let global_alpha = self.global_alpha;
        let uploaded = upload_uniform(cmd, ctx, "gradient_info", |block| {
            block.set_pod("infos", &infos);
            block.set("colors", bytemuck::cast_slice(&colors));
            block.set("stops", bytemuck::cast_slice(&stops));
            block.set_pod("global_alpha", &global_alpha);
        });
        if !uploaded {
            return false;
        }
        let [p0, p1] = self.points;
        match self.kind {
            GradientType::Conical => {
                let radii = self.radii;
                upload_uniform(cmd, ctx, "conical_info", |block| {
                    block.set_pod("center1", &p0);
                    block.set_pod("center2", &p1);
                    block.set_pod("radius1", &radii[0]);
                    block.set_pod("radius2", &radii[1]);
                })
            }
            GradientType::Linear => upload_uniform_bytes(cmd, ctx, "linear_pts", bytemuck::bytes_of(&[p0[0], p0[1], p1[0], p1[1]])),
            GradientType::Radial => {
                upload_uniform_bytes(cmd, ctx, "radial_pts", bytemuck::bytes_of(&[p0[0], p0[1], self.radii[0], 0.0]))
            }
            GradientType::Sweep => upload_uniform_bytes(
                cmd,
                ctx,
                "sweep_pts",
                bytemuck::bytes_of(&[p0[0], p0[1], self.radii[0], self.radii[1]]),
            ),
        }
    }
}

/// Gradient shading of path geometry. Positions reach the fragment stage in gradient
/// space through the inverse local matrix.
#[derive(Debug, Clone)]
pub struct GradientFragment {
    gradient: GradientWgsl,
    local_matrix: Matrix,
    filter: Option<WgxFilter>,
}

impl GradientFragment {
    pub fn new(shader: &GradientShader, global_alpha: f32) -> Self {
        Self {
            gradient: GradientWgsl::new(shader, global_alpha),
            local_matrix: shader.local_matrix,
            filter: None,
        }
    }
}

impl WgslFragment for GradientFragment {
    fn flags(&self) -> ShaderFlags {
        ShaderFlags::SNIPPET | ShaderFlags::AFFECTS_VERTEX
    }

    fn name(&self) -> String {
        self.gradient.name()
    }

    fn vs_name_suffix(&self) -> String {
        "Gradient".to_string()
    }

    fn vs_uniforms(&self) -> String {
        "\n@group(0) @binding(1) var<uniform> inv_matrix: mat4x4<f32>;\n".to_string()
    }

    fn vs_assign(&self) -> String {
        "  output.f_param_pos = (inv_matrix * vec4<f32>(local_pos, 0.0, 1.0)).xy;\n".to_string()
    }

    fn varyings(&self) -> Vec<String> {
        vec!["f_param_pos: vec2<f32>".to_string()]
    }

    fn fs_functions(&self) -> String {
        self.gradient.gen_source_wgsl(0)
    }

    fn fs_main(&self) -> String {
        "  color = generate_gradient_color(input.f_param_pos);\n".to_string()
    }

    fn next_binding(&self) -> u32 {
        2
    }

    fn filter(&self) -> Option<&WgxFilter> {
        self.filter.as_ref()
    }

    fn set_filter(&mut self, filter: WgxFilter) {
        self.filter = Some(init_filter(self.next_binding(), filter));
    }

    fn prepare_cmd(&self, cmd: &mut Command, ctx: &mut HwDrawContext<'_, '_>) {
        let inv = self.local_matrix.invert().unwrap_or_default();
        upload_uniform_bytes(cmd, ctx, "inv_matrix", Mat4::from_matrix(&inv).as_bytes());
        self.gradient.upload(cmd, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point;
    use crate::paint::TileMode;

    fn two_color_linear() -> GradientShader {
        GradientShader::linear(
            point(0.0, 0.0),
            point(100.0, 0.0),
            vec![Color4f::BLACK, Color4f::WHITE],
            Vec::new(),
            TileMode::Clamp,
        )
    }

    #[test]
    fn two_color_linear_takes_both_fast_paths() {
        let gradient = GradientWgsl::new(&two_color_linear(), 1.0);
        assert_eq!(gradient.name(), "GradientLinear2OffsetFastColorFast");
        let src = gradient.gen_source_wgsl(0);
        assert!(!src.contains("stops:"));
        assert!(src.contains("var<uniform> linear_pts: vec4<f32>"));
    }

    #[test]
    fn explicit_stops_round_color_count_up() {
        let shader = GradientShader::radial(
            point(10.0, 10.0),
            5.0,
            vec![Color4f::BLACK, Color4f::WHITE, Color4f::BLACK],
            vec![0.0, 0.3, 1.0],
            TileMode::Repeat,
        );
        let gradient = GradientWgsl::new(&shader, 1.0);
        assert_eq!(gradient.name(), "GradientRadial4");
        let src = gradient.gen_source_wgsl(2);
        assert!(src.contains("stops: array<vec4<f32>, 1>"));
        assert!(src.contains("@group(1) @binding(3) var<uniform> radial_pts"));
    }

    #[test]
    fn mismatched_stops_fall_back_to_even_spacing() {
        let mut shader = two_color_linear();
        shader.stops = vec![0.0];
        assert!(GradientWgsl::new(&shader, 1.0).name().contains("OffsetFast"));
    }

    #[test]
    fn single_color_is_padded() {
        let mut shader = two_color_linear();
        shader.colors.truncate(1);
        assert_eq!(GradientWgsl::new(&shader, 1.0).name(), "GradientLinear2OffsetFastColorFast");
    }
}
