use crate::geometry::{Matrix, Rect};
use crate::hw::layer_state::ClipId;
use crate::hw::step::{HwDrawStep, StepKind};
use crate::hw::{HwDrawContext, HwDrawState};
use crate::paint::{BlendMode, Paint};
use crate::path::{FillType, Path};
use crate::shader::fragment::StencilFragment;
use crate::shader::geometry::PathGeometry;

use super::DrawBase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipOp {
    #[default]
    Intersect,
    Difference,
}

/// A path clip.
///
/// Clips never touch color. They stencil the path, then write their clip depth into the
/// depth buffer over every pixel the clip excludes; later draws with a lower depth fail
/// the depth test there.
#[derive(Debug, Clone)]
pub struct HwDynamicPathClip {
    pub(crate) base: DrawBase,
    id: ClipId,
    path: Path,
    op: ClipOp,
    /// Layer bounds, covered when an intersect clip writes everything outside the path.
    layer_bounds: Rect,
}

impl HwDynamicPathClip {
    pub fn new(id: ClipId, transform: Matrix, path: Path, op: ClipOp, layer_bounds: Rect) -> Self {
        Self {
            base: DrawBase::new(transform, BlendMode::SrcOver),
            id,
            path,
            op,
            layer_bounds,
        }
    }

    pub fn id(&self) -> ClipId {
        self.id
    }

    pub fn op(&self) -> ClipOp {
        self.op
    }

    fn clip_kind(&self) -> StepKind {
        StepKind::Clip {
            difference: self.op == ClipOp::Difference,
            even_odd: self.path.fill_type() == FillType::EvenOdd,
        }
    }

    pub(crate) fn draw_state(&self) -> HwDrawState {
        HwDrawState::STENCIL | HwDrawState::DEPTH
    }

    pub(crate) fn generate_command(&mut self, ctx: &mut HwDrawContext<'_, '_>, layer_state: HwDrawState) {
        let params = self.base.step_params(layer_state);
        let paint = Paint::default();
        let geometry = PathGeometry::new(&self.path, &paint, false);

        let stencil = HwDrawStep::new(&geometry, &StencilFragment, StepKind::Stencil { no_zero: false })
            .generate_command(ctx, &params, None);

        let cover = match self.op {
            ClipOp::Difference => {
                HwDrawStep::new(&geometry, &StencilFragment, self.clip_kind()).generate_command(ctx, &params, Some(&stencil))
            }
            ClipOp::Intersect => {
                let bounds = Path::rect(&self.layer_bounds);
                let bounds_geometry = PathGeometry::new(&bounds, &paint, false);
                let mut bounds_params = params;
                bounds_params.transform = Matrix::identity();
                HwDrawStep::new(&bounds_geometry, &StencilFragment, self.clip_kind()).generate_command(
                    ctx,
                    &bounds_params,
                    None,
                )
            }
        };
        self.base.push_command(stencil);
        self.base.push_command(cover);
    }
}
