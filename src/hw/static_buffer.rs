//! Meshes shared by every frame, uploaded once.

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::gpu::{BufferView, GpuDevice};

use super::stage_buffer::HwStageBuffer;

const CORNER_TOP_LEFT: u32 = 0;
const CORNER_TOP_RIGHT: u32 = 1;
const CORNER_BOTTOM_RIGHT: u32 = 2;
const CORNER_BOTTOM_LEFT: u32 = 3;

const REGION_CORNER: f32 = -1.0;
const REGION_EDGE: f32 = 0.0;
const REGION_CENTER: f32 = 1.0;

const OUTSIDE: u32 = 1;
const INSIDE: u32 = 0;

const CORNER_VERTEX_COUNT: u32 = 6;

/// Unit vertex of the instanced rounded-rect mesh: blend offset, packed corner index and
/// outside bit, then the region (corner, edge or center).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RRectVertex {
    pub packed: [f32; 4],
}

impl RRectVertex {
    const fn new(offset: [f32; 2], corner: u32, outside: u32, region: f32) -> Self {
        Self {
            packed: [offset[0], offset[1], (corner | (outside << 2)) as f32, region],
        }
    }
}

fn corner_vertices(corner: u32, center_offset: [f32; 2]) -> [RRectVertex; 6] {
    [
        RRectVertex::new([1.0, 0.0], corner, OUTSIDE, REGION_EDGE),
        RRectVertex::new([0.0, 1.0], corner, OUTSIDE, REGION_EDGE),
        RRectVertex::new([1.0, 1.0], corner, OUTSIDE, REGION_CORNER),
        RRectVertex::new([1.0, 0.0], corner, INSIDE, REGION_EDGE),
        RRectVertex::new([0.0, 1.0], corner, INSIDE, REGION_EDGE),
        RRectVertex::new(center_offset, corner, INSIDE, REGION_CENTER),
    ]
}

/// 24 vertices, six per corner.
pub fn rrect_vertices() -> Vec<RRectVertex> {
    let mut vertices = Vec::with_capacity(24);
    vertices.extend(corner_vertices(CORNER_TOP_LEFT, [1.0, 0.0]));
    vertices.extend(corner_vertices(CORNER_TOP_RIGHT, [0.0, 1.0]));
    vertices.extend(corner_vertices(CORNER_BOTTOM_RIGHT, [1.0, 0.0]));
    vertices.extend(corner_vertices(CORNER_BOTTOM_LEFT, [0.0, 1.0]));
    vertices
}

/// Four corner patches of four triangles, then four edge strips of three.
pub fn rrect_indices() -> Vec<u32> {
    let mut indices = Vec::with_capacity(84);
    for i in 0..4 {
        let base = i * CORNER_VERTEX_COUNT;
        indices.extend_from_slice(&[
            base, base + 2, base + 3,
            base + 1, base + 2, base + 4,
            base + 2, base + 3, base + 4,
            base + 3, base + 4, base + 5,
        ]);
    }
    for i in 0..4u32 {
        // Horizontal edges join the `x` offsets, vertical edges the `y` ones.
        let offset = i % 2;
        let prev = (if i == 0 { 3 } else { i - 1 }) * CORNER_VERTEX_COUNT + offset;
        let curr = i * CORNER_VERTEX_COUNT + offset;
        let center = (i + 1) * CORNER_VERTEX_COUNT - 1;
        indices.extend_from_slice(&[
            prev, prev + 3, curr,
            prev + 3, curr, curr + 3,
            prev + 3, curr + 3, center,
        ]);
    }
    indices
}

#[derive(Debug, Clone)]
struct StaticViews {
    rrect_vertex: BufferView,
    rrect_index: BufferView,
}

/// Owns its own stage buffer so the meshes survive the per-frame reset.
#[derive(Debug)]
pub struct HwStaticBuffer {
    stage_buffer: HwStageBuffer,
    views: Option<StaticViews>,
    needs_flush: bool,
}

impl HwStaticBuffer {
    pub fn new(device: &dyn GpuDevice) -> Self {
        Self {
            stage_buffer: HwStageBuffer::new(device),
            views: None,
            needs_flush: false,
        }
    }

    fn views(&mut self) -> &StaticViews {
        let stage_buffer = &mut self.stage_buffer;
        let needs_flush = &mut self.needs_flush;
        self.views.get_or_insert_with(|| {
            debug!("initializing static meshes");
            *needs_flush = true;
            StaticViews {
                rrect_vertex: stage_buffer.push_vertex(bytemuck::cast_slice(&rrect_vertices())),
                rrect_index: stage_buffer.push_index(bytemuck::cast_slice(&rrect_indices())),
            }
        })
    }

    pub fn rrect_vertex_view(&mut self) -> BufferView {
        self.views().rrect_vertex.clone()
    }

    pub fn rrect_index_view(&mut self) -> BufferView {
        self.views().rrect_index.clone()
    }

    /// Uploads the meshes the first time they are used; later calls do nothing.
    pub fn flush(&mut self) {
        if self.needs_flush {
            self.stage_buffer.flush();
        }
        self.needs_flush = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::HeadlessDevice;

    #[test]
    fn rrect_mesh_sizes() {
        assert_eq!(rrect_vertices().len(), 24);
        let indices = rrect_indices();
        assert_eq!(indices.len(), 84);
        assert!(indices.iter().all(|&i| i < 24));
    }

    #[test]
    fn corners_pack_their_index_and_outside_bit() {
        let vertices = rrect_vertices();
        assert_eq!(vertices[0].packed[2], 4.0);
        assert_eq!(vertices[6 + 3].packed[2], 1.0);
        assert_eq!(vertices[23].packed, [0.0, 1.0, 3.0, 1.0]);
    }

    #[test]
    fn uploads_once() {
        let device = HeadlessDevice::default();
        let mut statics = HwStaticBuffer::new(&device);
        let first = statics.rrect_vertex_view();
        statics.flush();
        let second = statics.rrect_vertex_view();
        assert_eq!(first.offset, second.offset);
        assert!(!statics.needs_flush);
        assert_eq!(statics.rrect_index_view().size, 84 * 4);
    }
}
