//! Paint attributes consumed by the draw pipeline: style, stroke parameters, shaders,
//! color filters and blend modes.

use std::sync::Arc;

use crate::color::{Color, Color4f};
use crate::geometry::{Matrix, Point, Rect};
use crate::texture::Texture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    Clear,
    Src,
    Dst,
    #[default]
    SrcOver,
    DstOver,
    SrcIn,
    DstIn,
    SrcOut,
    DstOut,
    SrcATop,
    DstATop,
    Xor,
    Plus,
    Modulate,
    Screen,
    Overlay,
    Darken,
    Lighten,
    Multiply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaintStyle {
    #[default]
    Fill,
    Stroke,
    StrokeAndFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StrokeCap {
    #[default]
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StrokeJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

/// How samples outside `[0, 1]` are folded back. The discriminants are the values the
/// shaders switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileMode {
    #[default]
    Clamp = 0,
    Repeat = 1,
    Mirror = 2,
    Decal = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MipmapMode {
    #[default]
    None,
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplingOptions {
    pub filter: FilterMode,
    pub mipmap: MipmapMode,
}

impl SamplingOptions {
    pub fn linear() -> Self {
        Self {
            filter: FilterMode::Linear,
            mipmap: MipmapMode::None,
        }
    }
}

/// Alpha interpretation of pixel data. The discriminants are the values the texture
/// fragment switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaType {
    Unknown = 0,
    Opaque = 1,
    #[default]
    Premul = 2,
    Unpremul = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorType {
    #[default]
    Rgba8888,
    Bgra8888,
    Rgb565,
    A8,
}

/// CPU pixels waiting to be uploaded to a texture.
#[derive(Debug, Clone, PartialEq)]
pub struct Pixmap {
    pub width: u32,
    pub height: u32,
    pub color_type: ColorType,
    pub alpha_type: AlphaType,
    pub pixels: Vec<u8>,
}

impl Pixmap {
    pub fn new(width: u32, height: u32, color_type: ColorType, alpha_type: AlphaType) -> Self {
        let bpp = match color_type {
            ColorType::Rgba8888 | ColorType::Bgra8888 => 4,
            ColorType::Rgb565 => 2,
            ColorType::A8 => 1,
        };
        Self {
            width,
            height,
            color_type,
            alpha_type,
            pixels: vec![0; (width * height * bpp) as usize],
        }
    }

    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            color_type: ColorType::Rgba8888,
            alpha_type: AlphaType::Unpremul,
            pixels,
        }
    }

    pub fn row_bytes(&self) -> usize {
        if self.height == 0 {
            0
        } else {
            self.pixels.len() / self.height as usize
        }
    }
}

/// An image is either GPU backed already or carries pixels that get uploaded on first use.
#[derive(Debug, Clone)]
pub enum Image {
    Texture(Arc<Texture>),
    Pixmap(Arc<Pixmap>),
}

impl Image {
    pub fn width(&self) -> u32 {
        match self {
            Image::Texture(t) => t.width(),
            Image::Pixmap(p) => p.width,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Image::Texture(t) => t.height(),
            Image::Pixmap(p) => p.height,
        }
    }

    pub fn alpha_type(&self) -> AlphaType {
        match self {
            Image::Texture(t) => t.alpha_type(),
            Image::Pixmap(p) => p.alpha_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageShader {
    pub image: Image,
    pub sampling: SamplingOptions,
    pub tile_x: TileMode,
    pub tile_y: TileMode,
    pub local_matrix: Matrix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GradientType {
    Linear,
    Radial,
    Conical,
    Sweep,
}

impl GradientType {
    pub fn name(&self) -> &'static str {
        match self {
            GradientType::Linear => "Linear",
            GradientType::Radial => "Radial",
            GradientType::Conical => "Conical",
            GradientType::Sweep => "Sweep",
        }
    }
}

/// Gradient parameters.
///
/// `points` and `radii` are interpreted per type: linear uses both points, radial uses
/// `points[0]` and `radii[0]`, conical uses both of each, and sweep stores the angle bias and
/// scale in `radii`.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientShader {
    pub kind: GradientType,
    pub colors: Vec<Color4f>,
    pub stops: Vec<f32>,
    pub points: [Point; 2],
    pub radii: [f32; 2],
    pub tile: TileMode,
    pub local_matrix: Matrix,
}

impl GradientShader {
    pub fn linear(from: Point, to: Point, colors: Vec<Color4f>, stops: Vec<f32>, tile: TileMode) -> Self {
        Self {
            kind: GradientType::Linear,
            colors,
            stops,
            points: [from, to],
            radii: [0.0; 2],
            tile,
            local_matrix: Matrix::identity(),
        }
    }

    pub fn radial(center: Point, radius: f32, colors: Vec<Color4f>, stops: Vec<f32>, tile: TileMode) -> Self {
        Self {
            kind: GradientType::Radial,
            colors,
            stops,
            points: [center, center],
            radii: [radius, 0.0],
            tile,
            local_matrix: Matrix::identity(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn two_point_conical(
        start: Point,
        start_radius: f32,
        end: Point,
        end_radius: f32,
        colors: Vec<Color4f>,
        stops: Vec<f32>,
        tile: TileMode,
    ) -> Self {
        Self {
            kind: GradientType::Conical,
            colors,
            stops,
            points: [start, end],
            radii: [start_radius, end_radius],
            tile,
            local_matrix: Matrix::identity(),
        }
    }

    /// Angles are in degrees, clockwise from the positive x axis.
    pub fn sweep(center: Point, start_angle: f32, end_angle: f32, colors: Vec<Color4f>, stops: Vec<f32>, tile: TileMode) -> Self {
        let sweep = end_angle - start_angle;
        let (bias, scale) = if sweep.abs() > f32::EPSILON {
            (-start_angle / 360.0, 360.0 / sweep)
        } else {
            (0.0, 1.0)
        };
        Self {
            kind: GradientType::Sweep,
            colors,
            stops,
            points: [center, center],
            radii: [bias, scale],
            tile,
            local_matrix: Matrix::identity(),
        }
    }

    pub fn with_local_matrix(mut self, m: Matrix) -> Self {
        self.local_matrix = m;
        self
    }
}

#[derive(Debug, Clone)]
pub enum Shader {
    Image(ImageShader),
    Gradient(GradientShader),
}

impl Shader {
    pub fn local_matrix(&self) -> Matrix {
        match self {
            Shader::Image(s) => s.local_matrix,
            Shader::Gradient(g) => g.local_matrix,
        }
    }

    pub fn as_gradient(&self) -> Option<&GradientShader> {
        match self {
            Shader::Gradient(g) => Some(g),
            Shader::Image(_) => None,
        }
    }
}

/// Per-pixel color transform applied after shading.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorFilter {
    Blend { color: Color, mode: BlendMode },
    /// Row-major 4x5 matrix; the last column is an additive bias in `[0, 1]` units.
    Matrix([f32; 20]),
    LinearToSrgbGamma,
    SrgbToLinearGamma,
    /// Applies `inner` first, then `outer`.
    Compose {
        outer: Arc<ColorFilter>,
        inner: Arc<ColorFilter>,
    },
}

impl ColorFilter {
    pub fn compose(outer: Arc<ColorFilter>, inner: Arc<ColorFilter>) -> Arc<ColorFilter> {
        Arc::new(ColorFilter::Compose { outer, inner })
    }

    /// Leaf filters in application order.
    pub fn flatten(&self) -> Vec<&ColorFilter> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into<'a>(&'a self, out: &mut Vec<&'a ColorFilter>) {
        match self {
            ColorFilter::Compose { outer, inner } => {
                inner.flatten_into(out);
                outer.flatten_into(out);
            }
            leaf => out.push(leaf),
        }
    }
}

/// Blur applied to the coverage of a single draw. Only the normal blur style exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskFilter {
    pub radius: f32,
}

impl MaskFilter {
    /// `None` for radii that would not blur anything.
    pub fn blur(radius: f32) -> Option<Arc<MaskFilter>> {
        (radius > 0.0 && radius.is_finite()).then(|| Arc::new(MaskFilter { radius }))
    }
}

/// Effects on the rendered pixels of a layer or of a single draw, in local units.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageFilter {
    Blur {
        radius_x: f32,
        radius_y: f32,
    },
    /// A blurred copy of the input, tinted with `color` and offset, drawn below the input.
    DropShadow {
        dx: f32,
        dy: f32,
        radius_x: f32,
        radius_y: f32,
        color: Color,
    },
    ColorFilter(Arc<ColorFilter>),
    Matrix(Matrix),
    /// Each entry is drawn over the previous ones; `None` stands for the unfiltered input.
    Merge(Vec<Option<Arc<ImageFilter>>>),
    /// Applies `inner` first, then `outer`.
    Compose {
        outer: Arc<ImageFilter>,
        inner: Arc<ImageFilter>,
    },
}

impl ImageFilter {
    pub fn blur(radius_x: f32, radius_y: f32) -> Arc<ImageFilter> {
        Arc::new(ImageFilter::Blur { radius_x, radius_y })
    }

    pub fn drop_shadow(dx: f32, dy: f32, radius_x: f32, radius_y: f32, color: Color) -> Arc<ImageFilter> {
        Arc::new(ImageFilter::DropShadow {
            dx,
            dy,
            radius_x,
            radius_y,
            color,
        })
    }

    pub fn compose(outer: Arc<ImageFilter>, inner: Arc<ImageFilter>) -> Arc<ImageFilter> {
        Arc::new(ImageFilter::Compose { outer, inner })
    }

    /// Conservative bounds of the output for content inside `src`.
    pub fn compute_fast_bounds(&self, src: &Rect) -> Rect {
        match self {
            ImageFilter::Blur { radius_x, radius_y } => src.outset(*radius_x, *radius_y),
            ImageFilter::DropShadow {
                dx,
                dy,
                radius_x,
                radius_y,
                ..
            } => {
                let mut bounds = Matrix::translate(*dx, *dy).map_rect(&src.outset(*radius_x, *radius_y));
                bounds.join(src);
                bounds
            }
            ImageFilter::ColorFilter(_) => *src,
            ImageFilter::Matrix(matrix) => matrix.map_rect(src),
            ImageFilter::Merge(inputs) => {
                let mut bounds = Rect::default();
                for input in inputs {
                    match input {
                        Some(filter) => bounds.join(&filter.compute_fast_bounds(src)),
                        None => bounds.join(src),
                    }
                }
                bounds
            }
            ImageFilter::Compose { outer, inner } => outer.compute_fast_bounds(&inner.compute_fast_bounds(src)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Paint {
    pub style: PaintStyle,
    pub fill_color: Color4f,
    pub stroke_color: Color4f,
    pub stroke_width: f32,
    pub miter_limit: f32,
    pub cap: StrokeCap,
    pub join: StrokeJoin,
    pub anti_alias: bool,
    pub blend_mode: BlendMode,
    pub shader: Option<Arc<Shader>>,
    pub color_filter: Option<Arc<ColorFilter>>,
    pub mask_filter: Option<Arc<MaskFilter>>,
    pub image_filter: Option<Arc<ImageFilter>>,
    /// Allow the SDF text tier for small device sizes.
    pub sdf_for_small_text: bool,
}

impl Default for Paint {
    fn default() -> Self {
        Self {
            style: PaintStyle::Fill,
            fill_color: Color4f::BLACK,
            stroke_color: Color4f::BLACK,
            stroke_width: 1.0,
            miter_limit: Self::DEFAULT_MITER_LIMIT,
            cap: StrokeCap::Butt,
            join: StrokeJoin::Miter,
            anti_alias: false,
            blend_mode: BlendMode::SrcOver,
            shader: None,
            color_filter: None,
            mask_filter: None,
            image_filter: None,
            sdf_for_small_text: false,
        }
    }
}

impl Paint {
    pub const DEFAULT_MITER_LIMIT: f32 = 4.0;

    pub fn fill(color: Color) -> Self {
        let mut paint = Self::default();
        paint.set_color(color);
        paint
    }

    pub fn stroke(color: Color, width: f32) -> Self {
        let mut paint = Self::fill(color);
        paint.style = PaintStyle::Stroke;
        paint.stroke_width = width;
        paint
    }

    /// Sets both the fill and the stroke color.
    pub fn set_color(&mut self, color: Color) {
        let c = color.to_color4f();
        self.fill_color = c;
        self.stroke_color = c;
    }

    pub fn alpha(&self) -> f32 {
        self.fill_color.alpha()
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.fill_color = self.fill_color.with_alpha(alpha);
        self.stroke_color = self.stroke_color.with_alpha(alpha);
    }

    pub fn is_stroke(&self) -> bool {
        self.style != PaintStyle::Fill
    }

    /// Conservative bounds of `bounds` once stroked with this paint.
    pub fn compute_fast_stroke_bounds(&self, bounds: &Rect) -> Rect {
        let mut radius = self.stroke_width.max(1.0) * 0.5;
        if self.join == StrokeJoin::Miter {
            radius *= self.miter_limit.max(1.0);
        }
        if self.cap == StrokeCap::Square {
            radius *= std::f32::consts::SQRT_2;
        }
        bounds.outset(radius, radius)
    }

    /// Conservative bounds of drawing `bounds` with this paint, stroke and filters included.
    pub fn compute_fast_bounds(&self, bounds: &Rect) -> Rect {
        let mut rect = if self.is_stroke() {
            self.compute_fast_stroke_bounds(bounds)
        } else {
            *bounds
        };
        if let Some(mask) = &self.mask_filter {
            rect = rect.outset(mask.radius, mask.radius);
        }
        if let Some(filter) = &self.image_filter {
            rect = filter.compute_fast_bounds(&rect);
        }
        rect
    }

    /// Draws with a mask or image filter render offscreen first.
    pub fn needs_offscreen_layer(&self) -> bool {
        self.mask_filter.is_some() || self.image_filter.is_some()
    }

    pub(crate) fn same_color_filter(&self, other: &Paint) -> bool {
        match (&self.color_filter, &other.color_filter) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_flattens_inner_first() {
        let a = Arc::new(ColorFilter::LinearToSrgbGamma);
        let b = Arc::new(ColorFilter::SrgbToLinearGamma);
        let composed = ColorFilter::compose(a.clone(), b.clone());
        let leaves = composed.flatten();
        assert_eq!(leaves, vec![&*b, &*a]);
    }

    #[test]
    fn sweep_encodes_bias_and_scale() {
        let g = GradientShader::sweep(Point::new(0.0, 0.0), 90.0, 270.0, vec![], vec![], TileMode::Clamp);
        assert_eq!(g.radii, [-0.25, 2.0]);
    }

    #[test]
    fn miter_join_widens_fast_bounds() {
        let mut paint = Paint::stroke(Color::BLACK, 2.0);
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(paint.compute_fast_stroke_bounds(&r), r.outset(4.0, 4.0));
        paint.join = StrokeJoin::Bevel;
        assert_eq!(paint.compute_fast_stroke_bounds(&r), r.outset(1.0, 1.0));
    }

    #[test]
    fn zero_radius_mask_filter_is_dropped() {
        assert!(MaskFilter::blur(0.0).is_none());
        assert!(MaskFilter::blur(f32::NAN).is_none());
        assert_eq!(MaskFilter::blur(3.0).map(|m| m.radius), Some(3.0));
    }

    #[test]
    fn drop_shadow_bounds_cover_source_and_shadow() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        let shadow = ImageFilter::drop_shadow(20.0, 5.0, 2.0, 2.0, Color::BLACK);
        assert_eq!(shadow.compute_fast_bounds(&r), Rect::new(0.0, 0.0, 32.0, 17.0));
    }

    #[test]
    fn composed_filter_bounds_apply_inner_first() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        let composed = ImageFilter::compose(
            Arc::new(ImageFilter::Matrix(Matrix::scale(2.0, 2.0))),
            ImageFilter::blur(1.0, 3.0),
        );
        assert_eq!(composed.compute_fast_bounds(&r), Rect::new(-2.0, -6.0, 22.0, 26.0));

        let merged = ImageFilter::Merge(vec![None, Some(ImageFilter::blur(4.0, 0.0))]);
        assert_eq!(merged.compute_fast_bounds(&r), Rect::new(-4.0, 0.0, 14.0, 10.0));
    }

    #[test]
    fn paint_fast_bounds_stack_stroke_mask_and_image_filter() {
        let mut paint = Paint::stroke(Color::BLACK, 2.0);
        paint.join = StrokeJoin::Round;
        paint.mask_filter = MaskFilter::blur(3.0);
        paint.image_filter = Some(ImageFilter::blur(1.0, 1.0));
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(paint.compute_fast_bounds(&r), r.outset(5.0, 5.0));
        assert!(paint.needs_offscreen_layer());
        assert!(!Paint::default().needs_offscreen_layer());
    }
}
