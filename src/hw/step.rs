//! One pass of a draw: a geometry, a fragment and the stencil policy they run under.

use crate::geometry::{Matrix, Rect};
use crate::gpu::{
    Command, CompareFunction, ScissorRect, StencilFaceState, StencilOperation, StencilState, TextureFormat,
};
use crate::paint::BlendMode;
use crate::path::FillType;
use crate::shader::fragment::prepare_fragment;
use crate::shader::{WgslFragment, WgslGeometry, WgslShaderWriter};

use super::pipeline_lib::{HwPipelineDescriptor, HwPipelineKey};
use super::{HwDrawContext, HwDrawState};

/// How a color pass decides which pixels a path covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageType {
    /// The mesh is the coverage; no stencil test.
    None,
    /// Any nonzero count, built with clamped increments. Used for strokes.
    NoZero,
    EvenOdd,
    Winding,
}

impl CoverageType {
    pub fn for_fill(fill_type: FillType) -> Self {
        match fill_type {
            FillType::Winding => CoverageType::Winding,
            FillType::EvenOdd => CoverageType::EvenOdd,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Accumulates winding counts with color writes off.
    Stencil { no_zero: bool },
    /// Writes color where the coverage test passes and resets the stencil.
    Color(CoverageType),
    /// Draws the contour fringe outside the stenciled interior.
    ColorAa(CoverageType),
    /// Writes the clip depth over the pixels a clip excludes.
    Clip { difference: bool, even_odd: bool },
}

impl StepKind {
    pub fn requires_stencil(&self) -> bool {
        match *self {
            StepKind::Color(coverage) => coverage != CoverageType::None,
            StepKind::Stencil { .. } | StepKind::ColorAa(_) | StepKind::Clip { .. } => true,
        }
    }

    pub fn requires_depth_write(&self) -> bool {
        matches!(self, StepKind::Clip { .. })
    }

    pub fn requires_color_write(&self) -> bool {
        matches!(self, StepKind::Color(_) | StepKind::ColorAa(_))
    }

    pub fn stencil_state(&self) -> StencilState {
        use StencilOperation::*;
        match *self {
            StepKind::Stencil { no_zero: true } => both_faces(stencil_face(CompareFunction::Always, Keep, IncrementClamp)),
            StepKind::Stencil { no_zero: false } => StencilState {
                front: stencil_face(CompareFunction::Always, Keep, IncrementWrap),
                back: stencil_face(CompareFunction::Always, Keep, DecrementWrap),
            },
            StepKind::Color(CoverageType::None) => StencilState::default(),
            StepKind::Color(CoverageType::EvenOdd) => both_faces(StencilFaceState {
                read_mask: 0x1,
                ..stencil_face(CompareFunction::NotEqual, Replace, Replace)
            }),
            StepKind::Color(_) => both_faces(stencil_face(CompareFunction::NotEqual, Keep, Replace)),
            StepKind::ColorAa(coverage) => {
                let mut face = stencil_face(CompareFunction::Equal, Keep, Keep);
                if coverage == CoverageType::EvenOdd {
                    face.read_mask = 0x1;
                }
                both_faces(face)
            }
            StepKind::Clip { difference, even_odd } => {
                let mut face = if difference {
                    stencil_face(CompareFunction::NotEqual, if even_odd { Replace } else { Keep }, Replace)
                } else {
                    stencil_face(CompareFunction::Equal, Replace, Replace)
                };
                if even_odd {
                    face.read_mask = 0x1;
                }
                both_faces(face)
            }
        }
    }

    /// Attachments a draw made of this step needs.
    pub fn draw_state(&self) -> HwDrawState {
        let mut state = HwDrawState::NONE;
        if self.requires_stencil() {
            state |= HwDrawState::STENCIL;
        }
        if self.requires_depth_write() {
            state |= HwDrawState::DEPTH;
        }
        state
    }
}

/// Fields of the owning draw that every step command needs.
#[derive(Debug, Clone, Copy)]
pub struct StepParams {
    pub transform: Matrix,
    pub clip_value: f32,
    pub scissor: Rect,
    pub color_format: TextureFormat,
    pub sample_count: u32,
    pub blend_mode: BlendMode,
    /// Attachments of the layer the draw renders into.
    pub layer_state: HwDrawState,
}

pub struct HwDrawStep<'a> {
    geometry: &'a dyn WgslGeometry,
    fragment: &'a dyn WgslFragment,
    kind: StepKind,
}

fn stencil_face(compare: CompareFunction, fail_op: StencilOperation, pass_op: StencilOperation) -> StencilFaceState {
    StencilFaceState {
        compare,
        fail_op,
        pass_op,
        ..Default::default()
    }
}

fn both_faces(face: StencilFaceState) -> StencilState {
    StencilState { front: face, back: face }
}

impl<'a> HwDrawStep<'a> {
    pub fn new(geometry: &'a dyn WgslGeometry, fragment: &'a dyn WgslFragment, kind: StepKind) -> Self {
        Self {
            geometry,
            fragment,
            kind,
        }
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn requires_stencil(&self) -> bool {
        self.kind.requires_stencil()
    }

    pub fn requires_depth_write(&self) -> bool {
        self.kind.requires_depth_write()
    }

    pub fn requires_color_write(&self) -> bool {
        self.kind.requires_color_write()
    }

    pub fn stencil_state(&self) -> StencilState {
        self.kind.stencil_state()
    }

    pub fn pipeline_descriptor(&self, params: &StepParams) -> HwPipelineDescriptor {
        let mut desc = HwPipelineDescriptor {
            color_format: params.color_format,
            sample_count: params.sample_count,
            buffers: self.geometry.buffer_layout(),
            ..Default::default()
        };
        if self.requires_color_write() {
            desc.blend_mode = params.blend_mode;
        } else {
            desc.color_mask = 0;
        }

        let ds = &mut desc.depth_stencil;
        let state = params.layer_state;
        if state.is_empty() {
            ds.format = TextureFormat::Invalid;
            ds.enable_stencil = false;
            ds.enable_depth = false;
        } else {
            ds.format = if state.contains(HwDrawState::DEPTH) {
                TextureFormat::Depth24Stencil8
            } else {
                TextureFormat::Stencil8
            };
            ds.enable_stencil = self.requires_stencil();
            if state.contains(HwDrawState::DEPTH) {
                ds.enable_depth = true;
                ds.depth_state.enable_write = self.requires_depth_write();
                ds.depth_state.compare = CompareFunction::Greater;
            }
            ds.stencil_state = self.stencil_state();
        }
        desc
    }

    /// Builds the command: pipeline first, then geometry buffers and uniforms, then the
    /// fragment's bindings. `stencil_cmd` lets a cover pass reuse an earlier mesh.
    pub fn generate_command(
        &self,
        ctx: &mut HwDrawContext<'_, '_>,
        params: &StepParams,
        stencil_cmd: Option<&Command>,
    ) -> Command {
        let mut cmd = Command {
            scissor_rect: scissor_rect(&params.scissor),
            ..Default::default()
        };

        let writer = WgslShaderWriter::new(self.geometry, self.fragment);
        let key = HwPipelineKey::new(writer.vs_shader_name(), writer.fs_shader_name());
        let desc = self.pipeline_descriptor(params);
        cmd.pipeline = Some(ctx.pipeline_lib.get_pipeline(&key, &desc, &writer));

        self.geometry
            .prepare_cmd(&mut cmd, ctx, &params.transform, params.clip_value, stencil_cmd);
        prepare_fragment(self.fragment, &mut cmd, ctx);
        cmd
    }
}

pub(crate) fn scissor_rect(rect: &Rect) -> ScissorRect {
    ScissorRect {
        x: rect.left.floor().max(0.0) as u32,
        y: rect.top.floor().max(0.0) as u32,
        width: rect.width().ceil().max(0.0) as u32,
        height: rect.height().ceil().max(0.0) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;
    use crate::paint::Paint;
    use crate::shader::fragment::StencilFragment;
    use crate::shader::geometry::PathGeometry;

    fn step_state(kind: StepKind, layer_state: HwDrawState) -> HwPipelineDescriptor {
        let path = Path::rect(&Rect::from_wh(4.0, 4.0));
        let paint = Paint::default();
        let geometry = PathGeometry::new(&path, &paint, false);
        let step = HwDrawStep::new(&geometry, &StencilFragment, kind);
        step.pipeline_descriptor(&StepParams {
            transform: Matrix::identity(),
            clip_value: 0.0,
            scissor: Rect::from_wh(4.0, 4.0),
            color_format: TextureFormat::Rgba8Unorm,
            sample_count: 1,
            blend_mode: BlendMode::Plus,
            layer_state,
        })
    }

    #[test]
    fn stencil_pass_counts_winding_without_color() {
        let desc = step_state(StepKind::Stencil { no_zero: false }, HwDrawState::STENCIL);
        assert_eq!(desc.color_mask, 0);
        assert_eq!(desc.blend_mode, BlendMode::SrcOver);
        assert_eq!(desc.depth_stencil.format, TextureFormat::Stencil8);
        assert!(desc.depth_stencil.enable_stencil);
        let stencil = desc.depth_stencil.stencil_state;
        assert_eq!(stencil.front.pass_op, StencilOperation::IncrementWrap);
        assert_eq!(stencil.back.pass_op, StencilOperation::DecrementWrap);
    }

    #[test]
    fn even_odd_cover_tests_the_low_bit() {
        let desc = step_state(StepKind::Color(CoverageType::EvenOdd), HwDrawState::STENCIL);
        let face = desc.depth_stencil.stencil_state.front;
        assert_eq!(face.compare, CompareFunction::NotEqual);
        assert_eq!(face.read_mask, 1);
        assert_eq!(face.fail_op, StencilOperation::Replace);
        assert_eq!(desc.blend_mode, BlendMode::Plus);
    }

    #[test]
    fn layer_without_attachments_disables_depth_stencil() {
        let desc = step_state(StepKind::Color(CoverageType::None), HwDrawState::NONE);
        assert_eq!(desc.depth_stencil.format, TextureFormat::Invalid);
        assert!(!desc.depth_stencil.enable_stencil);
        assert!(!desc.depth_stencil.enable_depth);
    }

    #[test]
    fn clip_writes_depth_under_a_depth_layer() {
        let desc = step_state(
            StepKind::Clip {
                difference: false,
                even_odd: false,
            },
            HwDrawState::STENCIL | HwDrawState::DEPTH,
        );
        assert_eq!(desc.depth_stencil.format, TextureFormat::Depth24Stencil8);
        assert!(desc.depth_stencil.enable_depth);
        assert!(desc.depth_stencil.depth_state.enable_write);
        assert_eq!(desc.depth_stencil.depth_state.compare, CompareFunction::Greater);
        assert_eq!(desc.color_mask, 0);

        let cover = step_state(StepKind::Color(CoverageType::None), HwDrawState::STENCIL | HwDrawState::DEPTH);
        assert!(!cover.depth_stencil.depth_state.enable_write);
        assert!(!cover.depth_stencil.enable_stencil);
    }

    #[test]
    fn scissor_rounds_outward() {
        let s = scissor_rect(&Rect::new(1.5, 2.2, 10.0, 10.0));
        assert_eq!(s, ScissorRect { x: 1, y: 2, width: 9, height: 8 });
    }
}
