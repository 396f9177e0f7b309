use tracing::trace_span;

use crate::geometry::Matrix;
use crate::gpu::{Command, VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode};
use crate::hw::path_raster::{PathRaster, PATH_VERTEX_FLOATS};
use crate::hw::HwDrawContext;
use crate::paint::Paint;
use crate::path::Path;
use crate::shader::common::{setup_common_info, COMMON_VERTEX_WGSL};
use crate::shader::{ShaderFlags, WgslGeometry};

use super::upload_mesh;

const PATH_VS_INPUT: &str = r#"
struct VSInput {
  @location(0) a_pos: vec2<f32>,
};
"#;

const PATH_AA_VS_INPUT: &str = r#"
struct VSInput {
  @location(0) a_pos: vec2<f32>,
  @location(1) a_pos_aa: f32,
};
"#;

fn path_layout(aa: bool) -> Vec<VertexBufferLayout> {
    let mut attributes = vec![VertexAttribute {
        format: VertexFormat::Float32x2,
        offset: 0,
        shader_location: 0,
    }];
    if aa {
        attributes.push(VertexAttribute {
            format: VertexFormat::Float32,
            offset: 8,
            shader_location: 1,
        });
    }
    vec![VertexBufferLayout {
        array_stride: (PATH_VERTEX_FLOATS * 4) as u64,
        step_mode: VertexStepMode::Vertex,
        attributes,
    }]
}

fn device_matrix(ctx: &HwDrawContext<'_, '_>, transform: &Matrix) -> Matrix {
    Matrix::scale(ctx.scale.x, ctx.scale.y) * *transform
}

/// Fill fan or stroke mesh of a path, in local space.
pub struct PathGeometry<'a> {
    path: &'a Path,
    paint: &'a Paint,
    stroke: bool,
}

impl<'a> PathGeometry<'a> {
    pub fn new(path: &'a Path, paint: &'a Paint, stroke: bool) -> Self {
        Self { path, paint, stroke }
    }
}

impl WgslGeometry for PathGeometry<'_> {
    fn name(&self) -> String {
        "Path".to_string()
    }

    fn vs_functions(&self) -> String {
        COMMON_VERTEX_WGSL.to_string()
    }

    fn vs_input(&self) -> String {
        PATH_VS_INPUT.to_string()
    }

    fn vs_main(&self) -> String {
        "  local_pos = input.a_pos;\n  output.pos = get_vertex_position(input.a_pos, common_slot);\n".to_string()
    }

    fn buffer_layout(&self) -> Vec<VertexBufferLayout> {
        path_layout(false)
    }

    fn prepare_cmd(
        &self,
        cmd: &mut Command,
        ctx: &mut HwDrawContext<'_, '_>,
        transform: &Matrix,
        clip_depth: f32,
        stencil_cmd: Option<&Command>,
    ) {
        // A cover pass over an already stenciled mesh draws the same triangles.
        if let Some(stencil_cmd) = stencil_cmd {
            cmd.vertex_buffer = stencil_cmd.vertex_buffer.clone();
            cmd.index_buffer = stencil_cmd.index_buffer.clone();
            cmd.index_count = stencil_cmd.index_count;
            cmd.uniform_bindings = stencil_cmd.uniform_bindings.clone();
            return;
        }
        if cmd.pipeline.is_none() {
            return;
        }
        let _span = trace_span!("path_geometry_prepare", stroke = self.stroke).entered();

        let matrix = device_matrix(ctx, transform);
        let mut raster = PathRaster::new();
        if self.stroke {
            raster.stroke_path(self.path, self.paint, &matrix);
        } else {
            raster.fill_path(self.path, &matrix);
        }
        upload_mesh(cmd, ctx, raster.vertices(), raster.indices());
        setup_common_info(cmd, ctx, transform, clip_depth);
    }
}

/// One-pixel fringe around a path whose alpha fades the cover color out.
pub struct PathAaGeometry<'a> {
    path: &'a Path,
}

impl<'a> PathAaGeometry<'a> {
    pub fn new(path: &'a Path) -> Self {
        Self { path }
    }
}

impl WgslGeometry for PathAaGeometry<'_> {
    fn flags(&self) -> ShaderFlags {
        ShaderFlags::SNIPPET | ShaderFlags::AFFECTS_FRAGMENT
    }

    fn name(&self) -> String {
        "PathAA".to_string()
    }

    fn vs_functions(&self) -> String {
        COMMON_VERTEX_WGSL.to_string()
    }

    fn vs_input(&self) -> String {
        PATH_AA_VS_INPUT.to_string()
    }

    fn vs_main(&self) -> String {
        "  local_pos = input.a_pos;\n  output.pos = get_vertex_position(input.a_pos, common_slot);\n  output.v_pos_aa = input.a_pos_aa;\n"
            .to_string()
    }

    fn varyings(&self) -> Vec<String> {
        vec!["v_pos_aa: f32".to_string()]
    }

    fn fs_name_suffix(&self) -> String {
        "AA".to_string()
    }

    fn fs_mask(&self) -> String {
        "  mask_alpha = input.v_pos_aa;\n".to_string()
    }

    fn buffer_layout(&self) -> Vec<VertexBufferLayout> {
        path_layout(true)
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
        let matrix = device_matrix(ctx, transform);
        let mut raster = PathRaster::new();
        raster.stroke_aa_outline(self.path, &matrix, ctx.ctx_scale);
        upload_mesh(cmd, ctx, raster.vertices(), raster.indices());
        setup_common_info(cmd, ctx, transform, clip_depth);
    }
}
