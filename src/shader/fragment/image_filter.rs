//! Self-contained fragment modules for offscreen filter passes. Both read the
//! `FilterGeometry` uv and sample a single input texture.

use std::sync::Arc;

use crate::gpu::{Command, GpuTexture, SamplerDescriptor};
use crate::hw::HwDrawContext;
use crate::shader::{bind_sampler, bind_texture, upload_uniform, ShaderFlags, WgslFragment, WgxFilter};

use super::init_filter;

const FILTER_FS_INPUT: &str = r#"
struct FilterFSInput {
  @location(0) v_uv: vec2<f32>,
};
"#;

const BLUR_FRAGMENT_WGSL: &str = r#"
struct BlurInfo {
  dir: vec2<f32>,
  uv_scale: vec2<f32>,
  uv_offset: vec2<f32>,
  radius: f32,
};

@group(1) @binding(0) var<uniform> blur_info: BlurInfo;
@group(1) @binding(1) var uSampler: sampler;
@group(1) @binding(2) var uTexture: texture_2d<f32>;

fn sample_decal(uv: vec2<f32>) -> vec4<f32> {
  let inside = all(uv >= vec2<f32>(0.0)) && all(uv <= vec2<f32>(1.0));
  let color = textureSampleLevel(uTexture, uSampler, uv, 0.0);
  return select(vec4<f32>(0.0), color, inside);
}

fn gaussian(x: f32, sigma: f32) -> f32 {
  return exp(-(x * x) / (2.0 * sigma * sigma));
}
"#;

const BLUR_MAIN: &str = r#"
@fragment
fn fs_main(input: FilterFSInput) -> @location(0) vec4<f32> {
  let uv = input.v_uv * blur_info.uv_scale + blur_info.uv_offset;
  let sigma = blur_info.radius * 0.57735 + 0.5;
  let taps = i32(ceil(blur_info.radius));
  var total = sample_decal(uv);
  var weight_total: f32 = 1.0;
  for (var i: i32 = 1; i <= taps; i = i + 1) {
    let offset = f32(i);
    let weight = gaussian(offset, sigma);
    let pair = sample_decal(uv + blur_info.dir * offset) + sample_decal(uv - blur_info.dir * offset);
    total = total + pair * weight;
    weight_total = weight_total + 2.0 * weight;
  }
  return total / weight_total;
}
"#;

fn linear_sampler(cmd: &mut Command, ctx: &mut HwDrawContext<'_, '_>) {
    let sampler = ctx.pipeline_lib.sampler(&SamplerDescriptor::linear());
    bind_sampler(cmd, "uSampler", sampler);
}

/// Copies its input, optionally through a color filter. Used for downsampling, color
/// filters and merging.
#[derive(Debug, Clone)]
pub struct ImageFilterFragment {
    texture: Arc<dyn GpuTexture>,
    filter: Option<WgxFilter>,
}

impl ImageFilterFragment {
    pub fn new(texture: Arc<dyn GpuTexture>) -> Self {
        Self { texture, filter: None }
    }
}

impl WgslFragment for ImageFilterFragment {
    fn flags(&self) -> ShaderFlags {
        ShaderFlags::empty()
    }

    fn name(&self) -> String {
        "ImageFilterFragmentWGSL".to_string()
    }

    fn shader_name(&self) -> String {
        self.name()
    }

    fn gen_source_wgsl(&self) -> String {
        let mut src = String::from(
            "\n@group(1) @binding(0) var uSampler: sampler;\n@group(1) @binding(1) var uTexture: texture_2d<f32>;\n",
        );
        if let Some(filter) = &self.filter {
            src += &filter.gen_source_wgsl();
        }
        src += FILTER_FS_INPUT;
        src += "\n@fragment\nfn fs_main(input: FilterFSInput) -> @location(0) vec4<f32> {\n";
        src += "  var color = textureSampleLevel(uTexture, uSampler, input.v_uv, 0.0);\n";
        if self.filter.is_some() {
            src += "  color = filter_color(color);\n";
        }
        src += "  return color;\n}\n";
        src
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
        linear_sampler(cmd, ctx);
        bind_texture(cmd, "uTexture", self.texture.clone());
    }
}

/// One axis of a separable gaussian. Samples outside the input read as transparent, and
/// the output may be larger than the input to leave room for the spread.
#[derive(Debug, Clone)]
pub struct BlurFragment {
    texture: Arc<dyn GpuTexture>,
    /// One texel along the blur axis, in input uv.
    direction: [f32; 2],
    /// In input pixels.
    radius: f32,
    uv_scale: [f32; 2],
    uv_offset: [f32; 2],
}

impl BlurFragment {
    /// `axis` is a unit vector along x or y. `uv_scale` and `uv_offset` map the output's uv
    /// onto the input's.
    pub fn new(texture: Arc<dyn GpuTexture>, axis: [f32; 2], radius: f32, uv_scale: [f32; 2], uv_offset: [f32; 2]) -> Self {
        let desc = texture.descriptor();
        let direction = [axis[0] / desc.width.max(1) as f32, axis[1] / desc.height.max(1) as f32];
        Self {
            texture,
            direction,
            radius,
            uv_scale,
            uv_offset,
        }
    }

    pub fn direction(&self) -> [f32; 2] {
        self.direction
    }
}

impl WgslFragment for BlurFragment {
    fn flags(&self) -> ShaderFlags {
        ShaderFlags::empty()
    }

    fn name(&self) -> String {
        "BlurFilterFragmentWGSL".to_string()
    }

    fn shader_name(&self) -> String {
        self.name()
    }

    fn gen_source_wgsl(&self) -> String {
        format!("{BLUR_FRAGMENT_WGSL}{FILTER_FS_INPUT}{BLUR_MAIN}")
    }

    fn next_binding(&self) -> u32 {
        3
    }

    fn filter(&self) -> Option<&WgxFilter> {
        None
    }

    fn set_filter(&mut self, _filter: WgxFilter) {}

    fn prepare_cmd(&self, cmd: &mut Command, ctx: &mut HwDrawContext<'_, '_>) {
        upload_uniform(cmd, ctx, "blur_info", |block| {
            block.set_pod("dir", &self.direction);
            block.set_pod("uv_scale", &self.uv_scale);
            block.set_pod("uv_offset", &self.uv_offset);
            block.set_pod("radius", &self.radius);
        });
        linear_sampler(cmd, ctx);
        bind_texture(cmd, "uTexture", self.texture.clone());
    }
}
