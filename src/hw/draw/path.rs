use crate::geometry::Matrix;
use crate::hw::path_raster::stroke_outline_path;
use crate::hw::step::{CoverageType, HwDrawStep, StepKind};
use crate::hw::{HwDrawContext, HwDrawState};
use crate::paint::Paint;
use crate::path::Path;
use crate::shader::fragment::StencilFragment;
use crate::shader::geometry::{PathAaGeometry, PathGeometry};

use super::{shading_fragment, DrawBase};

/// A path filled or stroked through the stencil buffer.
///
/// Convex fills without antialiasing draw in one pass. Everything else stencils the mesh
/// first, optionally draws an antialiasing fringe, then covers the mesh again where the
/// stencil test passes.
#[derive(Debug, Clone)]
pub struct HwDynamicPathDraw {
    pub(crate) base: DrawBase,
    path: Path,
    paint: Paint,
    is_stroke: bool,
}

impl HwDynamicPathDraw {
    pub fn new(transform: Matrix, path: Path, mut paint: Paint, is_stroke: bool) -> Self {
        let mut base = DrawBase::new(transform, paint.blend_mode);
        base.anti_alias = paint.anti_alias;
        // An antialiased stroke is drawn as the fill of its outline so it can get a fringe.
        let (path, is_stroke) = if is_stroke && paint.anti_alias {
            paint.fill_color = paint.stroke_color;
            (stroke_outline_path(&path, &paint, &transform), false)
        } else {
            (path, is_stroke)
        };
        Self {
            base,
            path,
            paint,
            is_stroke,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_stroke(&self) -> bool {
        self.is_stroke
    }

    /// Only a closed single contour counts as convex; an open outline always stencils.
    fn single_pass(&self) -> bool {
        !self.is_stroke && !self.base.anti_alias && self.path.is_convex()
    }

    pub fn coverage(&self) -> CoverageType {
        if self.single_pass() {
            CoverageType::None
        } else if self.is_stroke {
            CoverageType::NoZero
        } else {
            CoverageType::for_fill(self.path.fill_type())
        }
    }

    /// Step kinds in submission order.
    pub fn step_kinds(&self) -> Vec<StepKind> {
        let coverage = self.coverage();
        let mut kinds = Vec::with_capacity(3);
        if coverage != CoverageType::None {
            kinds.push(StepKind::Stencil {
                no_zero: coverage == CoverageType::NoZero,
            });
        }
        if self.base.anti_alias {
            kinds.push(StepKind::ColorAa(coverage));
        }
        kinds.push(StepKind::Color(coverage));
        kinds
    }

    pub(crate) fn draw_state(&self) -> HwDrawState {
        self.step_kinds()
            .iter()
            .fold(HwDrawState::NONE, |state, kind| state | kind.draw_state())
    }

    pub(crate) fn generate_command(&mut self, ctx: &mut HwDrawContext<'_, '_>, layer_state: HwDrawState) {
        let params = self.base.step_params(layer_state);
        let geometry = PathGeometry::new(&self.path, &self.paint, self.is_stroke);
        let aa_geometry = PathAaGeometry::new(&self.path);
        let fragment = shading_fragment(&self.paint, self.is_stroke);

        let mut stencil_cmd = None;
        let mut commands = Vec::with_capacity(3);
        for kind in self.step_kinds() {
            let cmd = match kind {
                StepKind::Stencil { .. } => {
                    let cmd = HwDrawStep::new(&geometry, &StencilFragment, kind).generate_command(ctx, &params, None);
                    stencil_cmd = Some(cmd.clone());
                    cmd
                }
                StepKind::ColorAa(_) => {
                    HwDrawStep::new(&aa_geometry, fragment.as_ref(), kind).generate_command(ctx, &params, None)
                }
                _ => HwDrawStep::new(&geometry, fragment.as_ref(), kind).generate_command(
                    ctx,
                    &params,
                    stencil_cmd.as_ref(),
                ),
            };
            commands.push(cmd);
        }
        for cmd in commands {
            self.base.push_command(cmd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::geometry::{point, Rect};
    use crate::hw::test_support::Fixture;
    use crate::path::FillType;

    fn triangle() -> Path {
        Path::polygon(&[point(0.0, 0.0), point(10.0, 0.0), point(5.0, 10.0)], true)
    }

    fn concave() -> Path {
        Path::polygon(
            &[
                point(0.0, 0.0),
                point(20.0, 0.0),
                point(10.0, 5.0),
                point(20.0, 20.0),
                point(0.0, 20.0),
            ],
            true,
        )
    }

    #[test]
    fn convex_fill_is_a_single_pass() {
        let draw = HwDynamicPathDraw::new(Matrix::identity(), triangle(), Paint::fill(Color::RED), false);
        assert_eq!(draw.step_kinds(), vec![StepKind::Color(CoverageType::None)]);
        assert_eq!(draw.draw_state(), HwDrawState::NONE);
    }

    #[test]
    fn concave_fill_stencils_by_fill_rule() {
        let draw = HwDynamicPathDraw::new(Matrix::identity(), concave(), Paint::default(), false);
        assert_eq!(
            draw.step_kinds(),
            vec![
                StepKind::Stencil { no_zero: false },
                StepKind::Color(CoverageType::Winding)
            ]
        );

        let even_odd = concave().with_fill_type(FillType::EvenOdd);
        let draw = HwDynamicPathDraw::new(Matrix::identity(), even_odd, Paint::default(), false);
        assert_eq!(draw.coverage(), CoverageType::EvenOdd);
        assert_eq!(draw.draw_state(), HwDrawState::STENCIL);
    }

    #[test]
    fn strokes_use_clamped_stencil_counts() {
        let paint = Paint::stroke(Color::BLACK, 2.0);
        let draw = HwDynamicPathDraw::new(Matrix::identity(), triangle(), paint, true);
        assert_eq!(
            draw.step_kinds(),
            vec![
                StepKind::Stencil { no_zero: true },
                StepKind::Color(CoverageType::NoZero)
            ]
        );
    }

    #[test]
    fn antialiased_fill_adds_a_fringe_pass() {
        let mut paint = Paint::fill(Color::RED);
        paint.anti_alias = true;
        let draw = HwDynamicPathDraw::new(Matrix::identity(), triangle(), paint, false);
        assert_eq!(
            draw.step_kinds(),
            vec![
                StepKind::Stencil { no_zero: false },
                StepKind::ColorAa(CoverageType::Winding),
                StepKind::Color(CoverageType::Winding)
            ]
        );
    }

    #[test]
    fn antialiased_stroke_becomes_an_outline_fill() {
        let mut paint = Paint::stroke(Color::BLACK, 4.0);
        paint.anti_alias = true;
        let line = Path::line(point(0.0, 0.0), point(50.0, 0.0));
        let draw = HwDynamicPathDraw::new(Matrix::identity(), line, paint, true);
        assert!(!draw.is_stroke());
        assert!(!draw.path().is_empty());
        assert_eq!(draw.coverage(), CoverageType::Winding);
    }

    #[test]
    fn cover_pass_reuses_the_stencil_mesh() {
        let mut fixture = Fixture::new();
        let mut draw = HwDynamicPathDraw::new(Matrix::identity(), concave(), Paint::default(), false);
        fixture.with_context(100.0, 100.0, |ctx| {
            draw.base.scissor = Rect::from_wh(100.0, 100.0);
            draw.generate_command(ctx, HwDrawState::STENCIL);
        });
        let commands = draw.base.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands.iter().all(|cmd| cmd.is_valid()));
        assert_eq!(commands[0].index_count, commands[1].index_count);
        assert_eq!(commands[0].vertex_buffer.offset, commands[1].vertex_buffer.offset);
        let targets: Vec<_> = commands
            .iter()
            .filter_map(|cmd| cmd.pipeline.as_ref())
            .map(|pipeline| pipeline.descriptor().target.write_mask)
            .collect();
        assert_eq!(targets[0], 0);
        assert_ne!(targets[1], 0);
    }
}
