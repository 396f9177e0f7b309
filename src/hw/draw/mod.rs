//! Recorded draws.
//!
//! A draw goes through `prepare` (clip value and attachment needs), `generate_command`
//! (one command per step) and `draw` (commands handed to the layer's render pass). Draws
//! of the same kind recorded back to back may merge into one before any of that happens.

mod clip;
mod path;
mod rrect;
mod text;

pub use clip::{ClipOp, HwDynamicPathClip};
pub use path::HwDynamicPathDraw;
pub use rrect::HwDynamicRRectDraw;
pub use text::{HwDynamicSdfTextDraw, HwDynamicTextDraw, TextFragmentKind};

use crate::geometry::{Matrix, Rect};
use crate::gpu::{Command, GpuDevice, RenderPass, TextureFormat};
use crate::paint::{BlendMode, Paint, Shader};
use crate::shader::fragment::{GradientFragment, SolidColorFragment, TextureFragment};
use crate::shader::{WgslFragment, WgxFilter};

use super::layer::HwSubLayer;
use super::layer_state::ClipId;
use super::step::StepParams;
use super::{HwDrawContext, HwDrawState};

/// Bounds of a draw whose extent is unknown.
pub const UNBOUNDED: Rect = Rect::new(-1e9, -1e9, 1e9, 1e9);

/// State shared by every draw kind.
#[derive(Debug, Clone)]
pub struct DrawBase {
    pub transform: Matrix,
    pub blend_mode: BlendMode,
    pub clip_depth: u32,
    pub sample_count: u32,
    pub color_format: TextureFormat,
    pub scissor: Rect,
    /// Innermost clip in effect when the draw was recorded.
    pub clip_draw: Option<ClipId>,
    /// Bounds in the physical pixels of the owning layer.
    pub layer_space_bounds: Rect,
    pub anti_alias: bool,
    clip_value: f32,
    prepared: bool,
    draw_state: HwDrawState,
    commands: Vec<Command>,
}

impl DrawBase {
    pub fn new(transform: Matrix, blend_mode: BlendMode) -> Self {
        Self {
            transform,
            blend_mode,
            clip_depth: 0,
            sample_count: 1,
            color_format: TextureFormat::Rgba8Unorm,
            scissor: Rect::empty(),
            clip_draw: None,
            layer_space_bounds: UNBOUNDED,
            anti_alias: false,
            clip_value: 0.0,
            prepared: false,
            draw_state: HwDrawState::NONE,
            commands: Vec::new(),
        }
    }

    /// Clip depth normalized against the layer's depth range.
    pub fn clip_value(&self) -> f32 {
        self.clip_value
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub(crate) fn step_params(&self, layer_state: HwDrawState) -> StepParams {
        StepParams {
            transform: self.transform,
            clip_value: self.clip_value,
            scissor: self.scissor,
            color_format: self.color_format,
            sample_count: self.sample_count,
            blend_mode: self.blend_mode,
            layer_state,
        }
    }

    pub(crate) fn push_command(&mut self, command: Command) {
        self.commands.push(command);
    }

    fn same_batch(&self, other: &DrawBase) -> bool {
        self.transform == other.transform
            && self.clip_draw == other.clip_draw
            && self.scissor == other.scissor
            && self.blend_mode == other.blend_mode
    }
}

/// The fragment a paint shades with: its shader if any, else its fill or stroke color,
/// followed by its color filter.
pub(crate) fn shading_fragment(paint: &Paint, is_stroke: bool) -> Box<dyn WgslFragment> {
    let mut fragment: Box<dyn WgslFragment> = match paint.shader.as_deref() {
        Some(Shader::Gradient(gradient)) => Box::new(GradientFragment::new(gradient, paint.alpha())),
        Some(Shader::Image(image)) => Box::new(TextureFragment::new(image.clone(), paint.alpha())),
        None => {
            let color = if is_stroke {
                paint.stroke_color
            } else {
                paint.fill_color
            };
            Box::new(SolidColorFragment::new(color))
        }
    };
    if let Some(filter) = &paint.color_filter {
        fragment.set_filter(WgxFilter::make(filter));
    }
    fragment
}

pub enum HwDraw {
    Path(HwDynamicPathDraw),
    RRect(HwDynamicRRectDraw),
    Text(HwDynamicTextDraw),
    SdfText(HwDynamicSdfTextDraw),
    Clip(HwDynamicPathClip),
    Layer(Box<HwSubLayer>),
}

impl HwDraw {
    pub fn base(&self) -> &DrawBase {
        match self {
            HwDraw::Path(d) => &d.base,
            HwDraw::RRect(d) => &d.base,
            HwDraw::Text(d) => &d.base,
            HwDraw::SdfText(d) => &d.base,
            HwDraw::Clip(d) => &d.base,
            HwDraw::Layer(l) => l.base(),
        }
    }

    pub fn base_mut(&mut self) -> &mut DrawBase {
        match self {
            HwDraw::Path(d) => &mut d.base,
            HwDraw::RRect(d) => &mut d.base,
            HwDraw::Text(d) => &mut d.base,
            HwDraw::SdfText(d) => &mut d.base,
            HwDraw::Clip(d) => &mut d.base,
            HwDraw::Layer(l) => l.base_mut(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            HwDraw::Path(_) => "path",
            HwDraw::RRect(_) => "rrect",
            HwDraw::Text(_) => "text",
            HwDraw::SdfText(_) => "sdf_text",
            HwDraw::Clip(_) => "clip",
            HwDraw::Layer(layer) if layer.filter_layer().is_some() => "filter_layer",
            HwDraw::Layer(_) => "layer",
        }
    }

    /// Settles the clip value and reports the attachments the draw needs. Only the first
    /// call does any work.
    pub fn prepare(&mut self, ctx: &mut HwDrawContext<'_, '_>) -> HwDrawState {
        let total = ctx.total_clip_depth;
        let base = self.base_mut();
        if base.prepared {
            return base.draw_state;
        }
        base.prepared = true;
        base.clip_value = base.clip_depth as f32 / (total + 1) as f32;

        let state = match self {
            HwDraw::Path(d) => d.draw_state(),
            HwDraw::RRect(_) | HwDraw::Text(_) | HwDraw::SdfText(_) => HwDrawState::NONE,
            HwDraw::Clip(d) => d.draw_state(),
            HwDraw::Layer(l) => l.on_prepare(ctx),
        };
        self.base_mut().draw_state = state;
        state
    }

    /// Builds the commands of every step. `layer_state` is what the owning layer's render
    /// pass provides, which can be more than this draw asked for.
    pub fn generate_command(&mut self, ctx: &mut HwDrawContext<'_, '_>, layer_state: HwDrawState) {
        match self {
            HwDraw::Path(d) => d.generate_command(ctx, layer_state),
            HwDraw::RRect(d) => d.generate_command(ctx, layer_state),
            HwDraw::Text(d) => d.generate_command(ctx, layer_state),
            HwDraw::SdfText(d) => d.generate_command(ctx, layer_state),
            HwDraw::Clip(d) => d.generate_command(ctx, layer_state),
            HwDraw::Layer(l) => l.on_generate_command(ctx, layer_state),
        }
    }

    /// Hands the generated commands to `pass`. Sub layers render themselves first.
    pub fn draw(&mut self, device: &dyn GpuDevice, pass: &mut RenderPass) {
        if let HwDraw::Layer(layer) = self {
            layer.draw(device, pass);
            return;
        }
        for command in self.base_mut().commands.drain(..) {
            pass.add_command(command);
        }
    }

    /// Folds `other` into `self` when both batch together, giving it back otherwise.
    pub fn merge_if_possible(&mut self, other: HwDraw) -> Result<(), HwDraw> {
        if !self.base().same_batch(other.base()) {
            return Err(other);
        }
        let bounds = other.base().layer_space_bounds;
        let result = match (&mut *self, other) {
            (HwDraw::RRect(a), HwDraw::RRect(b)) => a.try_merge(b).map_err(HwDraw::RRect),
            (HwDraw::Text(a), HwDraw::Text(b)) => a.try_merge(b).map_err(HwDraw::Text),
            (HwDraw::SdfText(a), HwDraw::SdfText(b)) => a.try_merge(b).map_err(HwDraw::SdfText),
            (_, other) => Err(other),
        };
        if result.is_ok() {
            self.base_mut().layer_space_bounds.join(&bounds);
        }
        result
    }
}

impl std::fmt::Debug for HwDraw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HwDraw")
            .field("kind", &self.kind_name())
            .field("base", self.base())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::geometry::RRect;
    use crate::hw::test_support::Fixture;
    use crate::path::Path;

    fn rrect_draw(color: Color, x: f32) -> HwDraw {
        let rrect = RRect::from_rect_xy(Rect::from_xywh(x, 0.0, 10.0, 10.0), 2.0, 2.0);
        HwDraw::RRect(HwDynamicRRectDraw::new(Matrix::identity(), rrect, Paint::fill(color)))
    }

    #[test]
    fn rrects_with_plain_paints_merge_and_join_bounds() {
        let mut a = rrect_draw(Color::RED, 0.0);
        a.base_mut().layer_space_bounds = Rect::from_xywh(0.0, 0.0, 10.0, 10.0);
        let mut b = rrect_draw(Color::BLACK, 20.0);
        b.base_mut().layer_space_bounds = Rect::from_xywh(20.0, 0.0, 10.0, 10.0);

        assert!(a.merge_if_possible(b).is_ok());
        assert_eq!(a.base().layer_space_bounds, Rect::new(0.0, 0.0, 30.0, 10.0));
        let HwDraw::RRect(merged) = &a else {
            panic!("expected an rrect draw");
        };
        assert_eq!(merged.item_count(), 2);
    }

    #[test]
    fn different_scissors_or_kinds_do_not_merge() {
        let mut a = rrect_draw(Color::RED, 0.0);
        let mut b = rrect_draw(Color::RED, 20.0);
        b.base_mut().scissor = Rect::from_wh(5.0, 5.0);
        assert!(a.merge_if_possible(b).is_err());

        let path = HwDraw::Path(HwDynamicPathDraw::new(
            Matrix::identity(),
            Path::rect(&Rect::from_wh(4.0, 4.0)),
            Paint::default(),
            false,
        ));
        let back = a.merge_if_possible(path).unwrap_err();
        assert_eq!(back.kind_name(), "path");
    }

    #[test]
    fn prepare_computes_the_clip_value_once() {
        let mut fixture = Fixture::new();
        let mut draw = rrect_draw(Color::RED, 0.0);
        draw.base_mut().clip_depth = 3;
        fixture.with_context(100.0, 100.0, |ctx| {
            ctx.total_clip_depth = 7;
            assert_eq!(draw.prepare(ctx), HwDrawState::NONE);
            assert_eq!(draw.base().clip_value(), 3.0 / 8.0);
            ctx.total_clip_depth = 1;
            draw.prepare(ctx);
            assert_eq!(draw.base().clip_value(), 3.0 / 8.0);
        });
    }
}
