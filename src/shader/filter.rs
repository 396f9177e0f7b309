//! Color filters compiled into WGSL `filter_color` functions.

use crate::color::Color4f;
use crate::gpu::Command;
use crate::hw::HwDrawContext;
use crate::paint::{BlendMode, ColorFilter};

use super::upload_uniform;

#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    Blend { mode: BlendMode, color: Color4f },
    Matrix([f32; 20]),
    LinearToSrgbGamma,
    SrgbToLinearGamma,
    Compose(Vec<WgxFilter>),
}

/// A color filter as it appears in a fragment module.
///
/// Leaves of a composed chain carry a numeric suffix so their functions, structs and
/// uniforms do not collide.
#[derive(Debug, Clone, PartialEq)]
pub struct WgxFilter {
    kind: FilterKind,
    suffix: String,
    binding: u32,
}

impl WgxFilter {
    pub fn make(filter: &ColorFilter) -> Self {
        let leaves = filter.flatten();
        if let [leaf] = leaves.as_slice() {
            return Self::leaf(leaf, String::new());
        }
        let children = leaves
            .iter()
            .enumerate()
            .map(|(i, leaf)| Self::leaf(leaf, i.to_string()))
            .collect();
        Self {
            kind: FilterKind::Compose(children),
            suffix: String::new(),
            binding: 0,
        }
    }

    fn leaf(filter: &ColorFilter, suffix: String) -> Self {
        let kind = match filter {
            ColorFilter::Blend { color, mode } => FilterKind::Blend {
                mode: *mode,
                color: color.to_color4f(),
            },
            ColorFilter::Matrix(m) => FilterKind::Matrix(*m),
            ColorFilter::LinearToSrgbGamma => FilterKind::LinearToSrgbGamma,
            ColorFilter::SrgbToLinearGamma => FilterKind::SrgbToLinearGamma,
            // flatten() never yields a compose node
            ColorFilter::Compose { .. } => FilterKind::Compose(Vec::new()),
        };
        Self {
            kind,
            suffix,
            binding: 0,
        }
    }

    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    /// Assigns group-1 bindings starting at `start` and returns the next free one.
    pub fn init_binding(&mut self, start: u32) -> u32 {
        self.binding = start;
        match &mut self.kind {
            FilterKind::Blend { mode, .. } if blend_uses_color(*mode) => start + 1,
            FilterKind::Matrix(_) => start + 1,
            FilterKind::Compose(children) => children.iter_mut().fold(start, |next, c| c.init_binding(next)),
            _ => start,
        }
    }

    pub fn name(&self) -> String {
        match &self.kind {
            FilterKind::Blend { mode, .. } => match blend_expr(*mode) {
                Some(_) => format!("Blend{mode:?}Filter"),
                None => "UnsupportedBlendFilter".to_string(),
            },
            FilterKind::Matrix(_) => "MatrixFilter".to_string(),
            FilterKind::LinearToSrgbGamma => "LinearToSRGBGammaFilter".to_string(),
            FilterKind::SrgbToLinearGamma => "SRGBToLinearGammaFilter".to_string(),
            FilterKind::Compose(children) => {
                let mut name = "ComposeFilter".to_string();
                for child in children {
                    name.push('_');
                    name.push_str(&child.name());
                }
                name
            }
        }
    }

    fn fn_name(&self) -> String {
        self.suffixed("filter_color")
    }

    fn suffixed(&self, base: &str) -> String {
        if self.suffix.is_empty() {
            base.to_string()
        } else {
            format!("{base}_{}", self.suffix)
        }
    }

    /// Declarations plus `fn filter_color(input_color: vec4<f32>) -> vec4<f32>`.
    pub fn gen_source_wgsl(&self) -> String {
        let func = self.fn_name();
        match &self.kind {
            FilterKind::Blend { mode, .. } => {
                let uniform = self.suffixed("uBlendSrcColor");
                let Some(expr) = blend_expr(*mode) else {
                    return format!(
                        "\nfn {func}(input_color: vec4<f32>) -> vec4<f32> {{\n  return vec4<f32>(0.0);\n}}\n"
                    );
                };
                let mut code = String::new();
                if blend_uses_color(*mode) {
                    code += &format!(
                        "\n@group(1) @binding({}) var<uniform> {uniform}: vec4<f32>;\n",
                        self.binding
                    );
                }
                code += &format!(
                    "\nfn {func}(input_color: vec4<f32>) -> vec4<f32> {{\n  let src = {src};\n  let dst = input_color;\n  return {expr};\n}}\n",
                    src = if blend_uses_color(*mode) {
                        uniform.as_str()
                    } else {
                        "vec4<f32>(0.0)"
                    },
                );
                code
            }
            FilterKind::Matrix(_) => {
                let ty = self.suffixed("MatrixFilterInfo");
                let uniform = self.suffixed("uMatrixFilterInfo");
                format!(
                    r#"
struct {ty} {{
  matrix_add: vec4<f32>,
  matrix_mul: mat4x4<f32>,
}};

@group(1) @binding({binding}) var<uniform> {uniform}: {ty};

fn {func}(input_color: vec4<f32>) -> vec4<f32> {{
  var color = input_color;
  if (color.a > 0.0) {{
    color = vec4<f32>(color.rgb / color.a, color.a);
  }}
  color = {uniform}.matrix_mul * color + {uniform}.matrix_add;
  color = clamp(color, vec4<f32>(0.0), vec4<f32>(1.0));
  return vec4<f32>(color.rgb * color.a, color.a);
}}
"#,
                    binding = self.binding
                )
            }
            FilterKind::LinearToSrgbGamma => gamma_wgsl(
                &func,
                "let lo = c * 12.92;\n  let hi = 1.055 * pow(c, vec3<f32>(1.0 / 2.4)) - vec3<f32>(0.055);\n  let mapped = select(hi, lo, c <= vec3<f32>(0.0031308));",
            ),
            FilterKind::SrgbToLinearGamma => gamma_wgsl(
                &func,
                "let lo = c / 12.92;\n  let hi = pow((c + vec3<f32>(0.055)) / 1.055, vec3<f32>(2.4));\n  let mapped = select(hi, lo, c <= vec3<f32>(0.04045));",
            ),
            FilterKind::Compose(children) => {
                let mut code: String = children.iter().map(WgxFilter::gen_source_wgsl).collect();
                code += &format!("\nfn {func}(input_color: vec4<f32>) -> vec4<f32> {{\n  var color = input_color;\n");
                for child in children {
                    code += &format!("  color = {}(color);\n", child.fn_name());
                }
                code += "  return color;\n}\n";
                code
            }
        }
    }

    /// Uploads this filter's uniforms, if it has any.
    pub fn setup_bind_group(&self, cmd: &mut Command, ctx: &mut HwDrawContext<'_, '_>) {
        match &self.kind {
            FilterKind::Blend { mode, color } if blend_uses_color(*mode) => {
                let premul = color.premultiplied();
                upload_uniform(cmd, ctx, &self.suffixed("uBlendSrcColor"), |block| {
                    block.set_all(bytemuck::bytes_of(&premul))
                });
            }
            FilterKind::Matrix(m) => {
                let (mul, add) = split_color_matrix(m);
                upload_uniform(cmd, ctx, &self.suffixed("uMatrixFilterInfo"), |block| {
                    block.set_pod("matrix_add", &add);
                    block.set_pod("matrix_mul", &mul);
                });
            }
            FilterKind::Compose(children) => {
                for child in children {
                    child.setup_bind_group(cmd, ctx);
                }
            }
            _ => {}
        }
    }
}

fn gamma_wgsl(func: &str, body: &str) -> String {
    format!(
        r#"
fn {func}(input_color: vec4<f32>) -> vec4<f32> {{
  var color = input_color;
  if (color.a > 0.0) {{
    color = vec4<f32>(color.rgb / color.a, color.a);
  }}
  let c = clamp(color.rgb, vec3<f32>(0.0), vec3<f32>(1.0));
  {body}
  return vec4<f32>(mapped * color.a, color.a);
}}
"#
    )
}

fn blend_uses_color(mode: BlendMode) -> bool {
    blend_expr(mode).is_some() && !matches!(mode, BlendMode::Clear | BlendMode::Dst)
}

/// Porter-Duff blend of the filter color `src` over the shaded color `dst`.
fn blend_expr(mode: BlendMode) -> Option<&'static str> {
    Some(match mode {
        BlendMode::Clear => "vec4<f32>(0.0)",
        BlendMode::Src => "src",
        BlendMode::Dst => "dst",
        BlendMode::SrcOver => "src + dst * (1.0 - src.a)",
        BlendMode::DstOver => "dst + src * (1.0 - dst.a)",
        BlendMode::SrcIn => "src * dst.a",
        BlendMode::DstIn => "dst * src.a",
        BlendMode::SrcOut => "src * (1.0 - dst.a)",
        BlendMode::DstOut => "dst * (1.0 - src.a)",
        BlendMode::SrcATop => "src * dst.a + dst * (1.0 - src.a)",
        BlendMode::DstATop => "dst * src.a + src * (1.0 - dst.a)",
        BlendMode::Xor => "src * (1.0 - dst.a) + dst * (1.0 - src.a)",
        BlendMode::Plus => "min(src + dst, vec4<f32>(1.0))",
        BlendMode::Modulate => "src * dst",
        BlendMode::Screen => "src + dst - src * dst",
        BlendMode::Overlay | BlendMode::Darken | BlendMode::Lighten | BlendMode::Multiply => return None,
    })
}

/// Splits a row-major 4x5 color matrix into a column-major `mat4x4` and the bias column.
fn split_color_matrix(m: &[f32; 20]) -> ([f32; 16], [f32; 4]) {
    let mut mul = [0.0; 16];
    let mut add = [0.0; 4];
    for row in 0..4 {
        for col in 0..4 {
            mul[col * 4 + row] = m[row * 5 + col];
        }
        add[row] = m[row * 5 + 4];
    }
    (mul, add)
}
