//! Glyph quads. Both variants are complete vertex modules matching the text fragments'
//! `TextFSInput`.

use crate::geometry::{Mat4, Matrix, Rect};
use crate::gpu::{Command, VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode};
use crate::hw::path_raster::{TextRaster, TEXT_VERTEX_FLOATS};
use crate::hw::HwDrawContext;
use crate::shader::common::{setup_common_info, COMMON_VERTEX_WGSL};
use crate::shader::{upload_uniform_bytes, ShaderFlags, WgslGeometry};

use super::upload_mesh;

const TEXT_COMMON_VERTEX: &str = r#"
struct TextVSInput {
  @location(0) a_pos: vec2<f32>,
  @location(1) a_uv: vec2<f32>,
};

fn get_texture_index(u: f32) -> i32 {
  return i32(u) >> 14u;
}

fn get_texture_uv(uv: vec2<f32>) -> vec2<f32> {
  return vec2<f32>(f32(i32(uv.x) & 0x3FFF), uv.y);
}
"#;

const SOLID_COLOR_MAIN: &str = r#"
struct TextVSOutput {
  @builtin(position) pos: vec4<f32>,
  @location(0) @interpolate(flat) txt_index: i32,
  @location(1) v_uv: vec2<f32>,
};

@vertex
fn vs_main(text_in: TextVSInput) -> TextVSOutput {
  var output: TextVSOutput;
  output.pos = get_vertex_position(text_in.a_pos, common_slot);
  output.txt_index = get_texture_index(text_in.a_uv.x);
  output.v_uv = get_texture_uv(text_in.a_uv);
  return output;
}
"#;

const GRADIENT_MAIN: &str = r#"
struct TextVSOutput {
  @builtin(position) pos: vec4<f32>,
  @location(0) @interpolate(flat) txt_index: i32,
  @location(1) v_uv: vec2<f32>,
  @location(2) v_pos: vec2<f32>,
};

@group(0) @binding(1) var<uniform> inv_matrix: mat4x4<f32>;

@vertex
fn vs_main(text_in: TextVSInput) -> TextVSOutput {
  var output: TextVSOutput;
  output.pos = get_vertex_position(text_in.a_pos, common_slot);
  output.txt_index = get_texture_index(text_in.a_uv.x);
  output.v_uv = get_texture_uv(text_in.a_uv);
  output.v_pos = (inv_matrix * common_slot.userTransform * vec4<f32>(text_in.a_pos, 0.0, 1.0)).xy;
  return output;
}
"#;

/// A glyph's quad and its packed atlas coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphRect {
    pub rect: Rect,
    pub uv_lt: [f32; 2],
    pub uv_rb: [f32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextGeometryKind {
    SolidColor,
    /// Passes the gradient-space position on; `inv_matrix` is the inverse of the shader's
    /// local matrix.
    Gradient { inv_matrix: Matrix },
}

pub struct TextGeometry<'a> {
    kind: TextGeometryKind,
    rects: &'a [GlyphRect],
}

impl<'a> TextGeometry<'a> {
    pub fn new(kind: TextGeometryKind, rects: &'a [GlyphRect]) -> Self {
        Self { kind, rects }
    }

    /// Gradient text never batches: each run has its own gradient uniforms.
    pub fn can_merge(&self, other: &TextGeometry<'_>) -> bool {
        matches!(
            (self.kind, other.kind),
            (TextGeometryKind::SolidColor, TextGeometryKind::SolidColor)
        )
    }
}

impl WgslGeometry for TextGeometry<'_> {
    fn flags(&self) -> ShaderFlags {
        ShaderFlags::empty()
    }

    fn name(&self) -> String {
        match self.kind {
            TextGeometryKind::SolidColor => "TextSolidColorVertexWGSL",
            TextGeometryKind::Gradient { .. } => "TextGradientVertexWGSL",
        }
        .to_string()
    }

    fn shader_name(&self) -> String {
        self.name()
    }

    fn gen_source_wgsl(&self) -> String {
        let main = match self.kind {
            TextGeometryKind::SolidColor => SOLID_COLOR_MAIN,
            TextGeometryKind::Gradient { .. } => GRADIENT_MAIN,
        };
        format!("{COMMON_VERTEX_WGSL}{TEXT_COMMON_VERTEX}{main}")
    }

    fn buffer_layout(&self) -> Vec<VertexBufferLayout> {
        vec![VertexBufferLayout {
            array_stride: (TEXT_VERTEX_FLOATS * 4) as u64,
            step_mode: VertexStepMode::Vertex,
            attributes: vec![
                VertexAttribute {
                    format: VertexFormat::Float32x2,
                    offset: 0,
                    shader_location: 0,
                },
                VertexAttribute {
                    format: VertexFormat::Float32x2,
                    offset: 8,
                    shader_location: 1,
                },
            ],
        }]
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
        let mut raster = TextRaster::with_capacity(self.rects.len());
        for glyph in self.rects {
            raster.fill_text_rect(&glyph.rect, glyph.uv_lt, glyph.uv_rb);
        }
        upload_mesh(cmd, ctx, raster.vertices(), raster.indices());
        if !setup_common_info(cmd, ctx, transform, clip_depth) {
            return;
        }
        if let TextGeometryKind::Gradient { inv_matrix } = self.kind {
            let inv = Mat4::from_matrix(&inv_matrix);
            upload_uniform_bytes(cmd, ctx, "inv_matrix", inv.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::fragment::{ColorTextFragment, TextTextures};
    use crate::shader::WgslShaderWriter;

    #[test]
    fn self_contained_names() {
        let solid = TextGeometry::new(TextGeometryKind::SolidColor, &[]);
        let gradient = TextGeometry::new(
            TextGeometryKind::Gradient {
                inv_matrix: Matrix::identity(),
            },
            &[],
        );
        assert_eq!(solid.shader_name(), "TextSolidColorVertexWGSL");
        assert_eq!(gradient.shader_name(), "TextGradientVertexWGSL");
        assert!(solid.can_merge(&solid));
        assert!(!gradient.can_merge(&gradient));
        assert!(gradient.gen_source_wgsl().contains("var<uniform> inv_matrix"));
    }

    #[test]
    fn writer_passes_self_contained_modules_through() {
        use crate::gpu::headless::HeadlessDevice;
        use crate::gpu::{GpuDevice, SamplerDescriptor, TextureDescriptor, TextureFormat, TextureUsage};

        let device = HeadlessDevice::default();
        let tex = device.create_texture(&TextureDescriptor::new(
            4,
            4,
            TextureFormat::R8Unorm,
            TextureUsage::TEXTURE_BINDING,
        ));
        let textures = TextTextures {
            textures: [tex.clone(), tex.clone(), tex.clone(), tex],
            sampler: device.create_sampler(&SamplerDescriptor::default()),
        };
        let fragment = ColorTextFragment::new(textures, crate::color::Color4f::BLACK);
        let geometry = TextGeometry::new(TextGeometryKind::SolidColor, &[]);
        let writer = WgslShaderWriter::new(&geometry, &fragment);
        assert_eq!(writer.vs_shader_name(), "TextSolidColorVertexWGSL");
        assert_eq!(writer.fs_shader_name(), "ColorTextFragmentWGSL");
        assert_eq!(writer.gen_vs_source(), geometry.gen_source_wgsl());
    }
}
