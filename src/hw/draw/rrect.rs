use crate::geometry::{Matrix, RRect};
use crate::hw::step::{CoverageType, HwDrawStep, StepKind};
use crate::hw::{HwDrawContext, HwDrawState};
use crate::paint::Paint;
use crate::shader::fragment::SolidVertexColorFragment;
use crate::shader::geometry::{RRectGeometry, RRectItem};
use crate::shader::{WgslFragment, WgxFilter};

use super::{shading_fragment, DrawBase};

/// Instanced rounded rects. Rects with plain color paints batch into one instanced draw,
/// each instance carrying its own color and transform.
#[derive(Debug, Clone)]
pub struct HwDynamicRRectDraw {
    pub(crate) base: DrawBase,
    items: Vec<RRectItem>,
}

impl HwDynamicRRectDraw {
    pub fn new(transform: Matrix, rrect: RRect, paint: Paint) -> Self {
        let mut base = DrawBase::new(transform, paint.blend_mode);
        base.anti_alias = paint.anti_alias;
        Self {
            base,
            items: vec![RRectItem {
                rrect,
                paint,
                transform,
            }],
        }
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    fn first_paint(&self) -> Option<&Paint> {
        self.items.first().map(|item| &item.paint)
    }

    pub(crate) fn try_merge(&mut self, mut other: Self) -> Result<(), Self> {
        let (Some(a), Some(b)) = (self.first_paint(), other.first_paint()) else {
            return Err(other);
        };
        if a.shader.is_some() || b.shader.is_some() || !a.same_color_filter(b) {
            return Err(other);
        }
        self.items.append(&mut other.items);
        Ok(())
    }

    pub(crate) fn generate_command(&mut self, ctx: &mut HwDrawContext<'_, '_>, layer_state: HwDrawState) {
        let Some(paint) = self.first_paint() else {
            return;
        };
        let params = self.base.step_params(layer_state);
        let fragment: Box<dyn WgslFragment> = if paint.shader.is_some() {
            shading_fragment(paint, paint.is_stroke())
        } else {
            let mut fragment = SolidVertexColorFragment::new();
            if let Some(filter) = &paint.color_filter {
                fragment.set_filter(WgxFilter::make(filter));
            }
            Box::new(fragment)
        };
        let geometry = RRectGeometry::new(&self.items);
        let cmd = HwDrawStep::new(&geometry, fragment.as_ref(), StepKind::Color(CoverageType::None))
            .generate_command(ctx, &params, None);
        self.base.push_command(cmd);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::color::{Color, Color4f};
    use crate::geometry::{point, Rect};
    use crate::hw::test_support::Fixture;
    use crate::paint::{ColorFilter, GradientShader, Shader, TileMode};

    fn draw_with(paint: Paint) -> HwDynamicRRectDraw {
        let rrect = RRect::from_rect_xy(Rect::from_xywh(0.0, 0.0, 20.0, 10.0), 3.0, 3.0);
        HwDynamicRRectDraw::new(Matrix::identity(), rrect, paint)
    }

    #[test]
    fn shaders_block_merging() {
        let mut gradient_paint = Paint::default();
        gradient_paint.shader = Some(Arc::new(Shader::Gradient(GradientShader::linear(
            point(0.0, 0.0),
            point(10.0, 0.0),
            vec![Color4f::RED, Color4f::BLACK],
            vec![],
            TileMode::Clamp,
        ))));
        let mut a = draw_with(Paint::default());
        assert!(a.try_merge(draw_with(gradient_paint)).is_err());
        assert_eq!(a.item_count(), 1);
    }

    #[test]
    fn color_filters_must_match() {
        let filter = Arc::new(ColorFilter::LinearToSrgbGamma);
        let mut filtered = Paint::fill(Color::RED);
        filtered.color_filter = Some(filter.clone());
        let mut also_filtered = Paint::fill(Color::BLACK);
        also_filtered.color_filter = Some(filter);

        let mut a = draw_with(filtered);
        assert!(a.try_merge(draw_with(Paint::default())).is_err());
        assert!(a.try_merge(draw_with(also_filtered)).is_ok());
        assert_eq!(a.item_count(), 2);
    }

    #[test]
    fn merged_rects_draw_as_one_instanced_command() {
        let mut fixture = Fixture::new();
        let mut a = draw_with(Paint::fill(Color::RED));
        for _ in 0..3 {
            assert!(a.try_merge(draw_with(Paint::fill(Color::WHITE))).is_ok());
        }
        a.base.scissor = Rect::from_wh(64.0, 64.0);
        fixture.with_context(64.0, 64.0, |ctx| a.generate_command(ctx, HwDrawState::NONE));

        let commands = a.base.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].instance_count, 4);
        assert!(commands[0].is_instanced());
    }
}
