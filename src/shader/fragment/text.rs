//! Self-contained fragment modules for atlas text.
//!
//! All of them bind a sampler at 0 and the four atlas textures of one group at 1..=4, and
//! read the texture slot from the flat `txt_index` varying.

use std::sync::Arc;

use crate::color::Color4f;
use crate::gpu::{Command, GpuSampler, GpuTexture};
use crate::hw::HwDrawContext;
use crate::paint::GradientShader;
use crate::shader::{bind_sampler, bind_texture, upload_uniform_bytes, ShaderFlags, WgslFragment, WgxFilter};
use crate::text::MAX_NUM_TEXTURE_PER_ATLAS;

use super::gradient::GradientWgsl;
use super::init_filter;

const COMMON_TEXT_FRAGMENT: &str = r#"
@group(1) @binding(0) var uSampler: sampler;
@group(1) @binding(1) var uFontTexture0: texture_2d<f32>;
@group(1) @binding(2) var uFontTexture1: texture_2d<f32>;
@group(1) @binding(3) var uFontTexture2: texture_2d<f32>;
@group(1) @binding(4) var uFontTexture3: texture_2d<f32>;

fn get_texture_color(font_index: i32, uv: vec2<f32>) -> vec4<f32> {
  let coord = uv / vec2<f32>(textureDimensions(uFontTexture0));
  let c0 = textureSampleLevel(uFontTexture0, uSampler, coord, 0.0);
  let c1 = textureSampleLevel(uFontTexture1, uSampler, coord, 0.0);
  let c2 = textureSampleLevel(uFontTexture2, uSampler, coord, 0.0);
  let c3 = textureSampleLevel(uFontTexture3, uSampler, coord, 0.0);
  var color = select(c0, c1, font_index == 1);
  color = select(color, c2, font_index == 2);
  color = select(color, c3, font_index == 3);
  return color;
}
"#;

const TEXT_FS_INPUT: &str = r#"
struct TextFSInput {
  @location(0) @interpolate(flat) txt_index: i32,
  @location(1) v_uv: vec2<f32>,
};
"#;

const GRADIENT_TEXT_FS_INPUT: &str = r#"
struct TextFSInput {
  @location(0) @interpolate(flat) txt_index: i32,
  @location(1) v_uv: vec2<f32>,
  @location(2) v_pos: vec2<f32>,
};
"#;

/// Atlas textures and sampler of one glyph group.
#[derive(Debug, Clone)]
pub struct TextTextures {
    pub textures: [Arc<dyn GpuTexture>; MAX_NUM_TEXTURE_PER_ATLAS],
    pub sampler: Arc<dyn GpuSampler>,
}

impl TextTextures {
    fn bind(&self, cmd: &mut Command) {
        bind_sampler(cmd, "uSampler", self.sampler.clone());
        for (i, texture) in self.textures.iter().enumerate() {
            bind_texture(cmd, &format!("uFontTexture{i}"), texture.clone());
        }
    }

    pub fn same_as(&self, other: &TextTextures) -> bool {
        Arc::ptr_eq(&self.sampler, &other.sampler)
            && self.textures.iter().zip(&other.textures).all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

fn text_module(declarations: &str, input: &str, filter: Option<&WgxFilter>, body: &str, result: &str) -> String {
    let mut src = String::from(COMMON_TEXT_FRAGMENT);
    src += declarations;
    if let Some(filter) = filter {
        src += &filter.gen_source_wgsl();
    }
    src += input;
    src += "\n@fragment\nfn fs_main(input: TextFSInput) -> @location(0) vec4<f32> {\n";
    src += body;
    if filter.is_some() {
        src += "  color = filter_color(color);\n";
    }
    src += &format!("  return {result};\n}}\n");
    src
}

macro_rules! text_filter_accessors {
    () => {
        fn filter(&self) -> Option<&WgxFilter> {
            self.filter.as_ref()
        }

        fn set_filter(&mut self, filter: WgxFilter) {
            self.filter = Some(init_filter(self.next_binding(), filter));
        }
    };
}

/// A8 coverage times a uniform color.
#[derive(Debug, Clone)]
pub struct ColorTextFragment {
    textures: TextTextures,
    color: Color4f,
    filter: Option<WgxFilter>,
}

impl ColorTextFragment {
    pub fn new(textures: TextTextures, color: Color4f) -> Self {
        Self {
            textures,
            color,
            filter: None,
        }
    }

    pub fn can_merge(&self, other: &Self) -> bool {
        self.textures.same_as(&other.textures) && self.color == other.color && self.filter == other.filter
    }
}

impl WgslFragment for ColorTextFragment {
    fn flags(&self) -> ShaderFlags {
        ShaderFlags::empty()
    }

    fn name(&self) -> String {
        "ColorTextFragmentWGSL".to_string()
    }

    fn shader_name(&self) -> String {
        self.name()
    }

    fn gen_source_wgsl(&self) -> String {
        text_module(
            "\n@group(1) @binding(5) var<uniform> uColor: vec4<f32>;\n",
            TEXT_FS_INPUT,
            self.filter.as_ref(),
            "  let font_alpha = get_texture_color(input.txt_index, input.v_uv).r;\n  var color = vec4<f32>(uColor.rgb * uColor.a, uColor.a);\n",
            "color * font_alpha",
        )
    }

    fn next_binding(&self) -> u32 {
        6
    }

    text_filter_accessors!();

    fn prepare_cmd(&self, cmd: &mut Command, ctx: &mut HwDrawContext<'_, '_>) {
        self.textures.bind(cmd);
        upload_uniform_bytes(cmd, ctx, "uColor", bytemuck::bytes_of(&self.color));
    }
}

/// Color glyphs sampled straight from an RGBA atlas.
#[derive(Debug, Clone)]
pub struct ColorEmojiFragment {
    textures: TextTextures,
    swizzle_rb: bool,
    alpha: f32,
    filter: Option<WgxFilter>,
}

impl ColorEmojiFragment {
    pub fn new(textures: TextTextures, swizzle_rb: bool, alpha: f32) -> Self {
        Self {
            textures,
            swizzle_rb,
            alpha,
            filter: None,
        }
    }

    pub fn can_merge(&self, other: &Self) -> bool {
        self.textures.same_as(&other.textures)
            && self.swizzle_rb == other.swizzle_rb
            && self.alpha == other.alpha
            && self.filter == other.filter
    }
}

impl WgslFragment for ColorEmojiFragment {
    fn flags(&self) -> ShaderFlags {
        ShaderFlags::empty()
    }

    fn name(&self) -> String {
        let swizzle = if self.swizzle_rb { "SwizzleRB" } else { "NoSwizzle" };
        format!("ColorEmoji{swizzle}FragmentWGSL")
    }

    fn shader_name(&self) -> String {
        self.name()
    }

    fn gen_source_wgsl(&self) -> String {
        let sample = if self.swizzle_rb {
            "  let texel = get_texture_color(input.txt_index, input.v_uv);\n  var color = vec4<f32>(texel.b, texel.g, texel.r, texel.a);\n"
        } else {
            "  var color = get_texture_color(input.txt_index, input.v_uv);\n"
        };
        text_module(
            "\n@group(1) @binding(5) var<uniform> uAlpha: f32;\n",
            TEXT_FS_INPUT,
            self.filter.as_ref(),
            sample,
            "color * uAlpha",
        )
    }

    fn next_binding(&self) -> u32 {
        6
    }

    text_filter_accessors!();

    fn prepare_cmd(&self, cmd: &mut Command, ctx: &mut HwDrawContext<'_, '_>) {
        self.textures.bind(cmd);
        upload_uniform_bytes(cmd, ctx, "uAlpha", bytemuck::bytes_of(&self.alpha));
    }
}

/// A8 coverage times a gradient evaluated at the glyph quad's gradient-space position.
#[derive(Debug, Clone)]
pub struct GradientTextFragment {
    textures: TextTextures,
    gradient: GradientWgsl,
    filter: Option<WgxFilter>,
}

impl GradientTextFragment {
    pub fn new(textures: TextTextures, shader: &GradientShader, global_alpha: f32) -> Self {
        Self {
            textures,
            gradient: GradientWgsl::new(shader, global_alpha),
            filter: None,
        }
    }
}

impl WgslFragment for GradientTextFragment {
    fn flags(&self) -> ShaderFlags {
        ShaderFlags::empty()
    }

    fn name(&self) -> String {
        format!("{}TextWGSL", self.gradient.name())
    }

    fn shader_name(&self) -> String {
        self.name()
    }

    fn gen_source_wgsl(&self) -> String {
        text_module(
            &self.gradient.gen_source_wgsl(5),
            GRADIENT_TEXT_FS_INPUT,
            self.filter.as_ref(),
            "  let font_alpha = get_texture_color(input.txt_index, input.v_uv).r;\n  var color = generate_gradient_color(input.v_pos);\n",
            "color * font_alpha",
        )
    }

    fn next_binding(&self) -> u32 {
        7
    }

    text_filter_accessors!();

    fn prepare_cmd(&self, cmd: &mut Command, ctx: &mut HwDrawContext<'_, '_>) {
        self.textures.bind(cmd);
        self.gradient.upload(cmd, ctx);
    }
}

/// Signed-distance-field glyphs, antialiased with screen-space derivatives.
#[derive(Debug, Clone)]
pub struct SdfColorTextFragment {
    textures: TextTextures,
    color: Color4f,
    filter: Option<WgxFilter>,
}

impl SdfColorTextFragment {
    pub fn new(textures: TextTextures, color: Color4f) -> Self {
        Self {
            textures,
            color,
            filter: None,
        }
    }

    pub fn can_merge(&self, other: &Self) -> bool {
        self.textures.same_as(&other.textures) && self.color == other.color && self.filter == other.filter
    }
}

impl WgslFragment for SdfColorTextFragment {
    fn flags(&self) -> ShaderFlags {
        ShaderFlags::empty()
    }

    fn name(&self) -> String {
        "SdfColorTextFragmentWGSL".to_string()
    }

    fn shader_name(&self) -> String {
        self.name()
    }

    fn gen_source_wgsl(&self) -> String {
        text_module(
            "\n@group(1) @binding(5) var<uniform> uColor: vec4<f32>;\n",
            TEXT_FS_INPUT,
            self.filter.as_ref(),
            r#"  let distance = 7.96875 * (get_texture_color(input.txt_index, input.v_uv).r - 0.5019608);
  let raw_grad = vec2<f32>(dpdx(distance), dpdy(distance));
  let jacobian = mat2x2<f32>(dpdx(input.v_uv), dpdy(input.v_uv));
  let len2 = dot(raw_grad, raw_grad);
  let dist_grad = select(raw_grad * inverseSqrt(max(len2, 0.0001)), vec2<f32>(0.7071), len2 < 0.0001);
  let afwidth = 0.65 * length(jacobian * dist_grad);
  let text_alpha = smoothstep(-afwidth, afwidth, distance);
  var color = vec4<f32>(uColor.rgb * uColor.a, uColor.a);
"#,
            "color * text_alpha",
        )
    }

    fn next_binding(&self) -> u32 {
        6
    }

    text_filter_accessors!();

    fn prepare_cmd(&self, cmd: &mut Command, ctx: &mut HwDrawContext<'_, '_>) {
        self.textures.bind(cmd);
        upload_uniform_bytes(cmd, ctx, "uColor", bytemuck::bytes_of(&self.color));
    }
}
