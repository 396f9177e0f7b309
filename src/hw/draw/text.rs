use crate::geometry::Matrix;
use crate::hw::step::{CoverageType, HwDrawStep, StepKind};
use crate::hw::{HwDrawContext, HwDrawState};
use crate::paint::BlendMode;
use crate::shader::fragment::{ColorEmojiFragment, ColorTextFragment, GradientTextFragment, SdfColorTextFragment};
use crate::shader::geometry::{GlyphRect, TextGeometry, TextGeometryKind};
use crate::shader::WgslFragment;

use super::DrawBase;

/// How the glyphs of an atlas run are shaded.
#[derive(Debug, Clone)]
pub enum TextFragmentKind {
    Color(ColorTextFragment),
    Emoji(ColorEmojiFragment),
    /// Carries the inverse of the gradient's local matrix for the vertex stage.
    Gradient {
        fragment: GradientTextFragment,
        inv_matrix: Matrix,
    },
}

impl TextFragmentKind {
    fn geometry_kind(&self) -> TextGeometryKind {
        match self {
            TextFragmentKind::Gradient { inv_matrix, .. } => TextGeometryKind::Gradient {
                inv_matrix: *inv_matrix,
            },
            _ => TextGeometryKind::SolidColor,
        }
    }

    fn as_fragment(&self) -> &dyn WgslFragment {
        match self {
            TextFragmentKind::Color(f) => f,
            TextFragmentKind::Emoji(f) => f,
            TextFragmentKind::Gradient { fragment, .. } => fragment,
        }
    }

    fn can_merge(&self, other: &Self) -> bool {
        match (self, other) {
            (TextFragmentKind::Color(a), TextFragmentKind::Color(b)) => a.can_merge(b),
            (TextFragmentKind::Emoji(a), TextFragmentKind::Emoji(b)) => a.can_merge(b),
            _ => false,
        }
    }
}

/// Glyph quads sampled from one atlas group.
#[derive(Debug, Clone)]
pub struct HwDynamicTextDraw {
    pub(crate) base: DrawBase,
    rects: Vec<GlyphRect>,
    fragment: TextFragmentKind,
}

impl HwDynamicTextDraw {
    pub fn new(transform: Matrix, blend_mode: BlendMode, rects: Vec<GlyphRect>, fragment: TextFragmentKind) -> Self {
        Self {
            base: DrawBase::new(transform, blend_mode),
            rects,
            fragment,
        }
    }

    pub fn glyph_count(&self) -> usize {
        self.rects.len()
    }

    pub(crate) fn try_merge(&mut self, mut other: Self) -> Result<(), Self> {
        let geometry = TextGeometry::new(self.fragment.geometry_kind(), &[]);
        let other_geometry = TextGeometry::new(other.fragment.geometry_kind(), &[]);
        if !geometry.can_merge(&other_geometry) || !self.fragment.can_merge(&other.fragment) {
            return Err(other);
        }
        self.rects.append(&mut other.rects);
        Ok(())
    }

    pub(crate) fn generate_command(&mut self, ctx: &mut HwDrawContext<'_, '_>, layer_state: HwDrawState) {
        let params = self.base.step_params(layer_state);
        let geometry = TextGeometry::new(self.fragment.geometry_kind(), &self.rects);
        let cmd = HwDrawStep::new(&geometry, self.fragment.as_fragment(), StepKind::Color(CoverageType::None))
            .generate_command(ctx, &params, None);
        self.base.push_command(cmd);
    }
}

/// Glyph quads sampled from a signed distance field atlas, for large or scaled text.
#[derive(Debug, Clone)]
pub struct HwDynamicSdfTextDraw {
    pub(crate) base: DrawBase,
    rects: Vec<GlyphRect>,
    fragment: SdfColorTextFragment,
}

impl HwDynamicSdfTextDraw {
    pub fn new(transform: Matrix, blend_mode: BlendMode, rects: Vec<GlyphRect>, fragment: SdfColorTextFragment) -> Self {
        Self {
            base: DrawBase::new(transform, blend_mode),
            rects,
            fragment,
        }
    }

    pub fn glyph_count(&self) -> usize {
        self.rects.len()
    }

    pub(crate) fn try_merge(&mut self, mut other: Self) -> Result<(), Self> {
        if !self.fragment.can_merge(&other.fragment) {
            return Err(other);
        }
        self.rects.append(&mut other.rects);
        Ok(())
    }

    pub(crate) fn generate_command(&mut self, ctx: &mut HwDrawContext<'_, '_>, layer_state: HwDrawState) {
        let params = self.base.step_params(layer_state);
        let geometry = TextGeometry::new(TextGeometryKind::SolidColor, &self.rects);
        let cmd = HwDrawStep::new(&geometry, &self.fragment, StepKind::Color(CoverageType::None))
            .generate_command(ctx, &params, None);
        self.base.push_command(cmd);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::color::Color4f;
    use crate::geometry::Rect;
    use crate::gpu::headless::HeadlessDevice;
    use crate::gpu::{GpuDevice, GpuTexture, SamplerDescriptor, TextureDescriptor, TextureFormat, TextureUsage};
    use crate::shader::fragment::TextTextures;
    use crate::text::MAX_NUM_TEXTURE_PER_ATLAS;

    fn textures(device: &HeadlessDevice) -> TextTextures {
        let texture: Arc<dyn GpuTexture> = device.create_texture(&TextureDescriptor::new(
            8,
            8,
            TextureFormat::R8Unorm,
            TextureUsage::TEXTURE_BINDING,
        ));
        TextTextures {
            textures: std::array::from_fn(|_| texture.clone()),
            sampler: device.create_sampler(&SamplerDescriptor::default()),
        }
    }

    fn glyph(x: f32) -> GlyphRect {
        GlyphRect {
            rect: Rect::from_xywh(x, 0.0, 8.0, 8.0),
            uv_lt: [0.0, 0.0],
            uv_rb: [8.0, 8.0],
        }
    }

    #[test]
    fn runs_on_the_same_atlas_and_color_merge() {
        let device = HeadlessDevice::default();
        let tex = textures(&device);
        let run = |x, color| {
            HwDynamicTextDraw::new(
                Matrix::identity(),
                BlendMode::SrcOver,
                vec![glyph(x)],
                TextFragmentKind::Color(ColorTextFragment::new(tex.clone(), color)),
            )
        };

        let mut a = run(0.0, Color4f::BLACK);
        assert!(a.try_merge(run(10.0, Color4f::BLACK)).is_ok());
        assert_eq!(a.glyph_count(), 2);
        assert!(a.try_merge(run(20.0, Color4f::RED)).is_err());

        let other_atlas = HwDynamicTextDraw::new(
            Matrix::identity(),
            BlendMode::SrcOver,
            vec![glyph(30.0)],
            TextFragmentKind::Color(ColorTextFragment::new(textures(&device), Color4f::BLACK)),
        );
        assert!(a.try_merge(other_atlas).is_err());
        assert_eq!(MAX_NUM_TEXTURE_PER_ATLAS, tex.textures.len());
    }
}
