//! Vertex-side building blocks: path meshes, instanced rounded rects, glyph quads and
//! filter quads.

mod filter;
mod path;
mod rrect;
mod text;

pub use filter::{FilterGeometry, FULL_TARGET};
pub use path::{PathAaGeometry, PathGeometry};
pub use rrect::{RRectGeometry, RRectItem};
pub use text::{GlyphRect, TextGeometry, TextGeometryKind};

use crate::gpu::Command;
use crate::hw::HwDrawContext;

/// Stages a mesh into the frame's stage buffer. Empty meshes leave `cmd` without buffers,
/// which makes it invalid.
pub(crate) fn upload_mesh(cmd: &mut Command, ctx: &mut HwDrawContext<'_, '_>, vertices: &[f32], indices: &[u32]) {
    if vertices.is_empty() || indices.is_empty() {
        return;
    }
    cmd.vertex_buffer = ctx.stage_buffer.push_vertex(bytemuck::cast_slice(vertices));
    cmd.index_buffer = ctx.stage_buffer.push_index(bytemuck::cast_slice(indices));
    cmd.index_count = indices.len() as u32;
}

#[cfg(test)]
mod tests {
    use crate::color::Color4f;
    use crate::geometry::{Matrix, RRect, Rect};
    use crate::paint::{ColorFilter, Paint};
    use crate::path::Path;
    use crate::shader::fragment::{SolidColorFragment, SolidVertexColorFragment, StencilFragment};
    use crate::shader::{WgslFragment, WgslShaderWriter, WgxFilter};

    use super::*;

    #[test]
    fn path_with_solid_color_names() {
        let path = Path::rect(&Rect::from_wh(10.0, 10.0));
        let paint = Paint::default();
        let geometry = PathGeometry::new(&path, &paint, false);
        let fragment = SolidColorFragment::new(Color4f::RED);
        let writer = WgslShaderWriter::new(&geometry, &fragment);
        assert_eq!(writer.vs_shader_name(), "VS_Path");
        assert_eq!(writer.fs_shader_name(), "FS_SolidColor");
    }

    #[test]
    fn aa_geometry_and_filter_extend_the_fragment_name() {
        let path = Path::rect(&Rect::from_wh(10.0, 10.0));
        let geometry = PathAaGeometry::new(&path);
        let mut fragment = SolidColorFragment::new(Color4f::RED);
        fragment.set_filter(WgxFilter::make(&ColorFilter::Matrix([0.0; 20])));
        let writer = WgslShaderWriter::new(&geometry, &fragment);
        assert_eq!(writer.vs_shader_name(), "VS_PathAA");
        assert_eq!(writer.fs_shader_name(), "FS_SolidColor_AA_MatrixFilter");
        assert!(writer.gen_fs_source().contains("mask_alpha = input.v_pos_aa;"));
    }

    #[test]
    fn rrect_takes_the_vertex_color_suffix() {
        let items = vec![RRectItem {
            rrect: RRect::from_rect_xy(Rect::from_wh(20.0, 10.0), 2.0, 2.0),
            paint: Paint::default(),
            transform: Matrix::identity(),
        }];
        let geometry = RRectGeometry::new(&items);
        let fragment = SolidVertexColorFragment::new();
        let writer = WgslShaderWriter::new(&geometry, &fragment);
        assert_eq!(writer.vs_shader_name(), "VS_RRect_SolidVertexColor");
        assert_eq!(writer.fs_shader_name(), "FS_SolidVertexColor_RRect");
        let vs = writer.gen_vs_source();
        assert!(vs.contains("@location(0) f_color: vec4<f32>"));
        assert!(vs.contains("@location(1) v_fs_packed: vec4<f32>"));
    }

    #[test]
    fn stencil_pass_shares_the_vertex_module() {
        let path = Path::rect(&Rect::from_wh(10.0, 10.0));
        let paint = Paint::default();
        let geometry = PathGeometry::new(&path, &paint, false);
        let stencil = WgslShaderWriter::new(&geometry, &StencilFragment);
        let color = SolidColorFragment::new(Color4f::BLACK);
        let cover = WgslShaderWriter::new(&geometry, &color);
        assert_eq!(stencil.gen_vs_source(), cover.gen_vs_source());
        assert_eq!(stencil.fs_shader_name(), "FS_Stencil");
    }
}
