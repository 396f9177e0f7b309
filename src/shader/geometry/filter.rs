//! Quads for offscreen filter passes. Positions arrive in clip space, so the module needs
//! no common slot.

use crate::geometry::Matrix;
use crate::gpu::{Command, VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode};
use crate::hw::HwDrawContext;
use crate::shader::{ShaderFlags, WgslGeometry};

use super::upload_mesh;

const FILTER_VERTEX_WGSL: &str = r#"
struct FilterVSInput {
  @location(0) a_pos: vec2<f32>,
  @location(1) a_uv: vec2<f32>,
};

struct FilterVSOutput {
  @builtin(position) pos: vec4<f32>,
  @location(0) v_uv: vec2<f32>,
};

@vertex
fn vs_main(input: FilterVSInput) -> FilterVSOutput {
  var output: FilterVSOutput;
  output.pos = vec4<f32>(input.a_pos, 0.0, 1.0);
  output.v_uv = input.a_uv;
  return output;
}
"#;

/// Clip-space corners covering the whole target: left-top, left-bottom, right-top,
/// right-bottom.
pub const FULL_TARGET: [[f32; 2]; 4] = [[-1.0, 1.0], [-1.0, -1.0], [1.0, 1.0], [1.0, -1.0]];

/// One textured quad; the uv runs over the whole input texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterGeometry {
    corners: [[f32; 2]; 4],
    flip_v: bool,
}

impl FilterGeometry {
    /// `corners` in the order of [`FULL_TARGET`]. `flip_v` samples the input upside down,
    /// for backends whose sampled render targets are stored bottom-up.
    pub fn new(corners: [[f32; 2]; 4], flip_v: bool) -> Self {
        Self { corners, flip_v }
    }

    pub fn full_target(flip_v: bool) -> Self {
        Self::new(FULL_TARGET, flip_v)
    }

    fn vertices(&self) -> [f32; 16] {
        let (top, bottom) = if self.flip_v { (1.0, 0.0) } else { (0.0, 1.0) };
        let uvs = [[0.0, top], [0.0, bottom], [1.0, top], [1.0, bottom]];
        let mut vertices = [0.0; 16];
        for (i, (corner, uv)) in self.corners.iter().zip(uvs).enumerate() {
            vertices[i * 4..i * 4 + 4].copy_from_slice(&[corner[0], corner[1], uv[0], uv[1]]);
        }
        vertices
    }
}

impl WgslGeometry for FilterGeometry {
    fn flags(&self) -> ShaderFlags {
        ShaderFlags::empty()
    }

    fn name(&self) -> String {
        "FilterVertexWGSL".to_string()
    }

    fn shader_name(&self) -> String {
        self.name()
    }

    fn gen_source_wgsl(&self) -> String {
        FILTER_VERTEX_WGSL.to_string()
    }

    fn buffer_layout(&self) -> Vec<VertexBufferLayout> {
        vec![VertexBufferLayout {
            array_stride: 16,
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
        _transform: &Matrix,
        _clip_depth: f32,
        _stencil_cmd: Option<&Command>,
    ) {
        if cmd.pipeline.is_none() {
            return;
        }
        upload_mesh(cmd, ctx, &self.vertices(), &[0, 1, 2, 2, 1, 3]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flipping_swaps_the_v_coordinate_only() {
        let upright = FilterGeometry::full_target(false).vertices();
        let flipped = FilterGeometry::full_target(true).vertices();
        // left-top corner
        assert_eq!(&upright[0..4], &[-1.0, 1.0, 0.0, 0.0]);
        assert_eq!(&flipped[0..4], &[-1.0, 1.0, 0.0, 1.0]);
        // right-bottom corner
        assert_eq!(&upright[12..16], &[1.0, -1.0, 1.0, 1.0]);
        assert_eq!(&flipped[12..16], &[1.0, -1.0, 1.0, 0.0]);
    }
}
