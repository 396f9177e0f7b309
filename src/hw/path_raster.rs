//! CPU triangulation of paths into stencil-and-cover meshes.
//!
//! Vertices are `[x, y, alpha]` in the path's local space. `alpha` is only read by the
//! antialiasing geometry; plain fills and strokes write 1.

use lyon::tessellation::{
    BuffersBuilder, LineCap, LineJoin, StrokeOptions, StrokeTessellator, StrokeVertex, StrokeVertexConstructor,
    VertexBuffers,
};
use tracing::{trace, warn};

use crate::geometry::{point, Matrix, Point, Rect};
use crate::paint::{Paint, StrokeCap, StrokeJoin};
use crate::path::Path;

/// Flattening tolerance in device pixels.
const DEVICE_TOLERANCE: f32 = 0.25;

/// Floats per vertex of a path mesh.
pub const PATH_VERTEX_FLOATS: usize = 3;
/// Floats per vertex of a text mesh: position then atlas uv.
pub const TEXT_VERTEX_FLOATS: usize = 4;

/// Local-space tolerance that flattens to [`DEVICE_TOLERANCE`] once `matrix` is applied.
pub fn local_tolerance(matrix: &Matrix) -> f32 {
    let scale = matrix.max_scale();
    if scale > 0.0 && scale.is_finite() {
        DEVICE_TOLERANCE / scale
    } else {
        DEVICE_TOLERANCE
    }
}

#[derive(Debug, Default, Clone)]
pub struct PathRaster {
    vertices: Vec<f32>,
    indices: Vec<u32>,
}

struct PathVertexCtor;

impl StrokeVertexConstructor<[f32; 3]> for PathVertexCtor {
    fn new_vertex(&mut self, vertex: StrokeVertex) -> [f32; 3] {
        let p = vertex.position();
        [p.x, p.y, 1.0]
    }
}

impl PathRaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / PATH_VERTEX_FLOATS
    }

    fn append_vertex(&mut self, p: Point, alpha: f32) -> u32 {
        let index = (self.vertices.len() / PATH_VERTEX_FLOATS) as u32;
        self.vertices.extend_from_slice(&[p.x, p.y, alpha]);
        index
    }

    fn append_triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }

    /// Fans every contour from its first point. Overlaps and reversed triangles are
    /// resolved by the stencil, so the fan is valid for any polygon.
    pub fn fill_path(&mut self, path: &Path, matrix: &Matrix) {
        for contour in path.contours(local_tolerance(matrix)) {
            let pts = &contour.points;
            if pts.len() < 3 {
                continue;
            }
            let first = pts[0];
            let first_index = self.append_vertex(first, 1.0);
            for pair in pts[1..].windows(2) {
                let (p1, p2) = (pair[0], pair[1]);
                if p1 == first || p2 == first {
                    continue;
                }
                if (p1 - first).cross(p2 - first) == 0.0 {
                    continue;
                }
                let i1 = self.append_vertex(p1, 1.0);
                let i2 = self.append_vertex(p2, 1.0);
                self.append_triangle(first_index, i1, i2);
            }
        }
        trace!(vertices = self.vertex_count(), indices = self.indices.len(), "fill raster");
    }

    /// Triangulates the stroke outline of `path` with `paint`'s width, caps and joins.
    /// Hairlines are widened to one device pixel.
    pub fn stroke_path(&mut self, path: &Path, paint: &Paint, matrix: &Matrix) {
        let scale = matrix.max_scale().max(f32::EPSILON);
        let width = if paint.stroke_width > 0.0 {
            paint.stroke_width
        } else {
            1.0 / scale
        };
        let cap = match paint.cap {
            StrokeCap::Butt => LineCap::Butt,
            StrokeCap::Round => LineCap::Round,
            StrokeCap::Square => LineCap::Square,
        };
        let join = match paint.join {
            StrokeJoin::Miter => LineJoin::Miter,
            StrokeJoin::Round => LineJoin::Round,
            StrokeJoin::Bevel => LineJoin::Bevel,
        };
        let options = StrokeOptions::default()
            .with_line_width(width)
            .with_line_cap(cap)
            .with_line_join(join)
            .with_miter_limit(paint.miter_limit.max(StrokeOptions::MINIMUM_MITER_LIMIT))
            .with_tolerance(local_tolerance(matrix));

        let mut buffers: VertexBuffers<[f32; 3], u32> = VertexBuffers::new();
        let mut tessellator = StrokeTessellator::new();
        if let Err(err) = tessellator.tessellate_path(
            path.as_lyon(),
            &options,
            &mut BuffersBuilder::new(&mut buffers, PathVertexCtor),
        ) {
            warn!("stroke tessellation failed: {err:?}");
            return;
        }

        let base = self.vertex_count() as u32;
        for v in &buffers.vertices {
            self.vertices.extend_from_slice(v);
        }
        self.indices.extend(buffers.indices.iter().map(|i| base + i));
        trace!(vertices = self.vertex_count(), indices = self.indices.len(), "stroke raster");
    }

    /// Emits a one-pixel fringe around every closed contour, fading from alpha 1 on the
    /// edge to 0 outside. Concave contours get the fringe on both sides.
    pub fn stroke_aa_outline(&mut self, path: &Path, matrix: &Matrix, context_scale: f32) {
        let scale_x = if matrix.skew_y() != 0.0 {
            (matrix.scale_x() * matrix.scale_x() + matrix.skew_y() * matrix.skew_y()).sqrt()
        } else {
            matrix.scale_x().abs()
        };
        let mut fringe = if scale_x > 0.0 { 1.0 / scale_x } else { 1.0 };
        fringe /= context_scale.max(f32::EPSILON);

        let contours = path.contours(local_tolerance(matrix));
        let convex = contours.len() == 1 && crate::path::is_convex_polygon(&contours[0].points);
        for contour in &contours {
            let normal_dir = if !convex || contour.signed_area2() >= 0.0 {
                1.0
            } else {
                -1.0
            };
            self.assemble_edge_aa(&contour.points, convex, normal_dir, fringe);
        }
    }

    fn assemble_edge_aa(&mut self, pts: &[Point], convex: bool, normal_dir: f32, fringe: f32) {
        if pts.len() < 3 {
            warn!(points = pts.len(), "aa outline needs at least 3 points per contour");
            return;
        }
        let n = pts.len();
        for i in 0..n {
            let prev = pts[if i == 0 { n - 1 } else { i - 1 }];
            let from = pts[i];
            let to = pts[(i + 1) % n];

            let curr_dir = (to - from).normalize();
            let vertical = lyon::math::vector(curr_dir.y, -curr_dir.x) * normal_dir;

            let from_1 = from + vertical * fringe;
            let from_2 = from - vertical * fringe;
            let to_1 = to + vertical * fringe;
            let to_2 = to - vertical * fringe;

            let from_index = self.append_vertex(from, 1.0);
            let to_index = self.append_vertex(to, 1.0);
            let from_1_index = self.append_vertex(from_1, 0.0);
            let to_1_index = self.append_vertex(to_1, 0.0);
            self.append_triangle(from_1_index, from_index, to_index);
            self.append_triangle(from_1_index, to_index, to_1_index);

            if !convex {
                let from_2_index = self.append_vertex(from_2, 0.0);
                let to_2_index = self.append_vertex(to_2, 0.0);
                self.append_triangle(from_2_index, from_index, to_index);
                self.append_triangle(from_2_index, to_index, to_2_index);
            }

            // Joint wedge between the previous edge's fringe and this one.
            let prev_dir = (from - prev).normalize();
            let prev_vertical = lyon::math::vector(prev_dir.y, -prev_dir.x);
            let out_dir = (prev_dir - curr_dir) * 0.5;
            let aa_p1 = if out_dir.dot(prev_vertical) < 0.0 {
                from - prev_vertical * fringe
            } else {
                from + prev_vertical * fringe
            };
            let aa_p2 = if out_dir.dot(vertical) < 0.0 { from_2 } else { from_1 };
            let p1_index = self.append_vertex(aa_p1, 0.0);
            let p2_index = self.append_vertex(aa_p2, 0.0);
            self.append_triangle(p1_index, p2_index, from_index);
        }
    }
}

/// Triangles of a stroke as a fillable path, each wound the same way. Filling it with the
/// winding rule covers exactly the stroke, which lets the antialiasing fringe treat a
/// stroke like a fill.
pub fn stroke_outline_path(path: &Path, paint: &Paint, matrix: &Matrix) -> Path {
    let mut raster = PathRaster::new();
    raster.stroke_path(path, paint, matrix);
    let vertex = |i: u32| {
        let base = i as usize * PATH_VERTEX_FLOATS;
        point(raster.vertices[base], raster.vertices[base + 1])
    };
    let mut builder = Path::builder();
    for tri in raster.indices.chunks_exact(3) {
        let (a, mut b, mut c) = (vertex(tri[0]), vertex(tri[1]), vertex(tri[2]));
        let cross = (b - a).cross(c - a);
        if cross == 0.0 {
            continue;
        }
        if cross < 0.0 {
            std::mem::swap(&mut b, &mut c);
        }
        builder = builder.move_to(a.x, a.y).line_to(b.x, b.y).line_to(c.x, c.y).close();
    }
    builder.build()
}

/// Quads for glyphs: `[x, y, u, v]` per vertex, two triangles per glyph.
#[derive(Debug, Default, Clone)]
pub struct TextRaster {
    vertices: Vec<f32>,
    indices: Vec<u32>,
}

impl TextRaster {
    pub fn with_capacity(glyphs: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(glyphs * 4 * TEXT_VERTEX_FLOATS),
            indices: Vec::with_capacity(glyphs * 6),
        }
    }

    /// `uv_lt` and `uv_rb` are packed atlas coordinates.
    pub fn fill_text_rect(&mut self, rect: &Rect, uv_lt: [f32; 2], uv_rb: [f32; 2]) {
        let base = (self.vertices.len() / TEXT_VERTEX_FLOATS) as u32;
        self.vertices.extend_from_slice(&[
            rect.left, rect.top, uv_lt[0], uv_lt[1],
            rect.left, rect.bottom, uv_lt[0], uv_rb[1],
            rect.right, rect.bottom, uv_rb[0], uv_rb[1],
            rect.right, rect.top, uv_rb[0], uv_lt[1],
        ]);
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}
