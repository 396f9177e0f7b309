//! The typeface collaborator and the rasterization parameters glyphs are keyed by.
//!
//! Font loading, hinting and outline extraction are not part of this crate. A host plugs
//! its font stack in by implementing [`Typeface`]; the atlas asks it for coverage bitmaps
//! and the path tier asks it for outlines.

use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::geometry::Matrix;
use crate::paint::{Paint, PaintStyle, StrokeCap, StrokeJoin};
use crate::path::Path;

pub type GlyphId = u16;

/// Pixel layout of a rasterized glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlyphFormat {
    A8,
    Rgba32,
    Bgra32,
}

impl GlyphFormat {
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            GlyphFormat::A8 => 1,
            GlyphFormat::Rgba32 | GlyphFormat::Bgra32 => 4,
        }
    }
}

/// A rasterized glyph.
///
/// `origin_x` is the offset from the pen position to the left edge of the image and
/// `origin_y` the offset from the baseline up to its top edge, both in device pixels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GlyphImage {
    pub width: u32,
    pub height: u32,
    pub origin_x: f32,
    pub origin_y: f32,
    pub pixels: Vec<u8>,
}

impl GlyphImage {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Outline metrics at the font's nominal size, in user space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlyphMetrics {
    pub hori_bearing_x: f32,
    pub hori_bearing_y: f32,
    pub advance_x: f32,
    pub width: f32,
    pub height: f32,
}

/// Everything that changes the pixels of a rasterized glyph.
#[derive(Debug, Clone, Copy)]
pub struct ScalerContextDesc {
    pub typeface_id: u32,
    pub text_size: f32,
    pub scale_x: f32,
    pub skew_x: f32,
    /// Upper-left 2x2 of the device transform: scale x, skew x, skew y, scale y.
    pub transform: [f32; 4],
    pub context_scale: f32,
    pub stroke_width: f32,
    pub miter_limit: f32,
    pub cap: StrokeCap,
    pub join: StrokeJoin,
    pub fake_bold: bool,
}

impl ScalerContextDesc {
    /// Parameters for rasterizing `font` with `paint`. Stroke parameters only count for
    /// stroked paints so fill and stroke-and-fill runs share entries.
    pub fn new(font: &Font, paint: &Paint, context_scale: f32, transform: &Matrix) -> Self {
        let stroke = paint.style == PaintStyle::Stroke;
        Self {
            typeface_id: font.typeface().id(),
            text_size: font.size(),
            scale_x: font.scale_x(),
            skew_x: font.skew_x(),
            transform: [
                transform.scale_x(),
                transform.skew_x(),
                transform.skew_y(),
                transform.scale_y(),
            ],
            context_scale,
            stroke_width: if stroke { paint.stroke_width } else { 0.0 },
            miter_limit: if stroke {
                paint.miter_limit
            } else {
                Paint::DEFAULT_MITER_LIMIT
            },
            cap: if stroke { paint.cap } else { StrokeCap::default() },
            join: if stroke { paint.join } else { StrokeJoin::default() },
            fake_bold: font.is_embolden(),
        }
    }

    pub fn is_stroke(&self) -> bool {
        self.stroke_width > 0.0
    }

    /// The full device matrix a typeface should rasterize with.
    pub fn device_matrix(&self) -> Matrix {
        let [sx, kx, ky, sy] = self.transform;
        Matrix::scale(self.context_scale, self.context_scale)
            * Matrix::from_components(sx, kx, 0.0, ky, sy, 0.0)
    }

    fn bits(&self) -> [u32; 13] {
        [
            self.typeface_id,
            self.text_size.to_bits(),
            self.scale_x.to_bits(),
            self.skew_x.to_bits(),
            self.transform[0].to_bits(),
            self.transform[1].to_bits(),
            self.transform[2].to_bits(),
            self.transform[3].to_bits(),
            self.context_scale.to_bits(),
            self.stroke_width.to_bits(),
            self.miter_limit.to_bits(),
            (self.cap as u32) << 8 | self.join as u32,
            self.fake_bold as u32,
        ]
    }
}

impl PartialEq for ScalerContextDesc {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for ScalerContextDesc {}

impl Hash for ScalerContextDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// A font face as seen by the renderer.
pub trait Typeface: Debug + Send + Sync {
    /// Stable identity, part of every glyph cache key.
    fn id(&self) -> u32;

    /// Color fonts (emoji) rasterize to RGBA or BGRA and never use the SDF tier.
    fn contains_color_table(&self) -> bool {
        false
    }

    /// Bitmap strike size for fonts that only exist at one size.
    fn fixed_size(&self) -> Option<f32> {
        None
    }

    fn glyph_metrics(&self, glyph: GlyphId, size: f32) -> GlyphMetrics;

    /// Rasterizes one glyph. `None` or an empty image means nothing is drawn.
    fn glyph_image(&self, glyph: GlyphId, desc: &ScalerContextDesc) -> Option<GlyphImage>;

    /// The glyph outline at `size`, relative to the pen position.
    fn glyph_path(&self, glyph: GlyphId, size: f32) -> Option<Path>;

    fn glyph_format(&self) -> GlyphFormat {
        if self.contains_color_table() {
            GlyphFormat::Bgra32
        } else {
            GlyphFormat::A8
        }
    }
}

/// A typeface at a size, with synthetic styling.
#[derive(Debug, Clone)]
pub struct Font {
    typeface: Arc<dyn Typeface>,
    size: f32,
    scale_x: f32,
    skew_x: f32,
    embolden: bool,
}

impl Font {
    pub fn new(typeface: Arc<dyn Typeface>, size: f32) -> Self {
        Self {
            typeface,
            size,
            scale_x: 1.0,
            skew_x: 0.0,
            embolden: false,
        }
    }

    pub fn typeface(&self) -> &Arc<dyn Typeface> {
        &self.typeface
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn set_size(&mut self, size: f32) {
        self.size = size;
    }

    pub fn scale_x(&self) -> f32 {
        self.scale_x
    }

    pub fn set_scale_x(&mut self, scale_x: f32) {
        self.scale_x = scale_x;
    }

    pub fn skew_x(&self) -> f32 {
        self.skew_x
    }

    pub fn set_skew_x(&mut self, skew_x: f32) {
        self.skew_x = skew_x;
    }

    pub fn is_embolden(&self) -> bool {
        self.embolden
    }

    pub fn set_embolden(&mut self, embolden: bool) {
        self.embolden = embolden;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    #[derive(Debug)]
    struct Face;

    impl Typeface for Face {
        fn id(&self) -> u32 {
            7
        }

        fn glyph_metrics(&self, _: GlyphId, _: f32) -> GlyphMetrics {
            GlyphMetrics::default()
        }

        fn glyph_image(&self, _: GlyphId, _: &ScalerContextDesc) -> Option<GlyphImage> {
            None
        }

        fn glyph_path(&self, _: GlyphId, _: f32) -> Option<Path> {
            None
        }
    }

    #[test]
    fn fill_and_stroke_and_fill_share_a_key() {
        let font = Font::new(Arc::new(Face), 12.0);
        let mut fill = Paint::fill(Color::BLACK);
        fill.stroke_width = 5.0;
        let mut both = fill.clone();
        both.style = PaintStyle::StrokeAndFill;
        let stroke = Paint::stroke(Color::BLACK, 5.0);

        let m = Matrix::identity();
        let a = ScalerContextDesc::new(&font, &fill, 1.0, &m);
        let b = ScalerContextDesc::new(&font, &both, 1.0, &m);
        let c = ScalerContextDesc::new(&font, &stroke, 1.0, &m);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(c.is_stroke());
        assert_eq!(a.typeface_id, 7);
    }
}
