use tracing::warn;

use crate::geometry::{Mat4, Matrix};
use crate::gpu::{AddressMode, Command, SamplerDescriptor};
use crate::hw::HwDrawContext;
use crate::paint::{Image, ImageShader};
use crate::shader::common::REMAP_FLOAT_TILE_WGSL;
use crate::shader::{bind_sampler, bind_texture, upload_uniform, ShaderFlags, WgslFragment, WgxFilter};

use super::init_filter;

/// Image shading. Vertex positions are mapped into normalized image coordinates, then tiled
/// per axis in the fragment stage.
#[derive(Debug, Clone)]
pub struct TextureFragment {
    shader: ImageShader,
    global_alpha: f32,
    filter: Option<WgxFilter>,
}

impl TextureFragment {
    pub fn new(shader: ImageShader, global_alpha: f32) -> Self {
        Self {
            shader,
            global_alpha,
            filter: None,
        }
    }
}

impl WgslFragment for TextureFragment {
    fn flags(&self) -> ShaderFlags {
        ShaderFlags::SNIPPET | ShaderFlags::AFFECTS_VERTEX
    }

    fn name(&self) -> String {
        "Texture".to_string()
    }

    fn vs_name_suffix(&self) -> String {
        "Texture".to_string()
    }

    fn vs_uniforms(&self) -> String {
        r#"
struct ImageBoundsInfo {
  bounds: vec2<f32>,
  inv_matrix: mat4x4<f32>,
};

@group(0) @binding(1) var<uniform> image_bounds: ImageBoundsInfo;
"#
        .to_string()
    }

    fn vs_assign(&self) -> String {
        "  output.f_frag_coord = (image_bounds.inv_matrix * vec4<f32>(local_pos, 0.0, 1.0)).xy / image_bounds.bounds;\n"
            .to_string()
    }

    fn varyings(&self) -> Vec<String> {
        vec!["f_frag_coord: vec2<f32>".to_string()]
    }

    fn fs_functions(&self) -> String {
        REMAP_FLOAT_TILE_WGSL.to_string()
    }

    fn fs_uniforms(&self) -> String {
        r#"
struct ImageColorInfo {
  infos: vec3<i32>,
  global_alpha: f32,
};

@group(1) @binding(0) var<uniform> image_color_info: ImageColorInfo;
@group(1) @binding(1) var uSampler: sampler;
@group(1) @binding(2) var uTexture: texture_2d<f32>;
"#
        .to_string()
    }

    fn fs_main(&self) -> String {
        r#"  let coord = input.f_frag_coord;
  let uv = vec2<f32>(remap_float_tile(coord.x, image_color_info.infos.y), remap_float_tile(coord.y, image_color_info.infos.z));
  var tex_color = textureSampleLevel(uTexture, uSampler, uv, 0.0);
  if (image_color_info.infos.x == 3) {
    tex_color = vec4<f32>(tex_color.rgb * tex_color.a, tex_color.a);
  }
  color = tex_color * image_color_info.global_alpha;
  let outside_x = image_color_info.infos.y == 3 && (coord.x < 0.0 || coord.x > 1.0);
  let outside_y = image_color_info.infos.z == 3 && (coord.y < 0.0 || coord.y > 1.0);
  if (outside_x || outside_y) {
    color = vec4<f32>(0.0);
  }
"#
        .to_string()
    }

    fn next_binding(&self) -> u32 {
        3
    }

    fn filter(&self) -> Option<&WgxFilter> {
        self.filter.as_ref()
    }

    fn set_filter(&mut self, filter: WgxFilter) {
        self.filter = Some(init_filter(self.next_binding(), filter));
    }

    fn prepare_cmd(&self, cmd: &mut Command, ctx: &mut HwDrawContext<'_, '_>) {
        let image = &self.shader.image;
        let texture = match image {
            Image::Texture(texture) => texture.gpu_texture(),
            Image::Pixmap(pixmap) => ctx.texture_manager.find_or_create_texture(pixmap).gpu_texture(),
        };
        let Some(texture) = texture else {
            warn!("image has no GPU texture, skipping");
            return;
        };

        let bounds = [image.width() as f32, image.height() as f32];
        let inv = self.shader.local_matrix.invert().unwrap_or_else(Matrix::identity);
        upload_uniform(cmd, ctx, "image_bounds", |block| {
            block.set_pod("bounds", &bounds);
            block.set_pod("inv_matrix", &Mat4::from_matrix(&inv));
        });

        let infos = [
            image.alpha_type() as i32,
            self.shader.tile_x as i32,
            self.shader.tile_y as i32,
        ];
        let global_alpha = self.global_alpha;
        upload_uniform(cmd, ctx, "image_color_info", |block| {
            block.set_pod("infos", &infos);
            block.set_pod("global_alpha", &global_alpha);
        });

        let mut desc = SamplerDescriptor::from_sampling(&self.shader.sampling);
        desc.address_mode_u = AddressMode::from(self.shader.tile_x);
        desc.address_mode_v = AddressMode::from(self.shader.tile_y);
        let sampler = ctx.pipeline_lib.sampler(&desc);
        bind_sampler(cmd, "uSampler", sampler);
        bind_texture(cmd, "uTexture", texture);
    }
}
