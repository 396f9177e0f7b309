//! Image filters applied to an offscreen layer before it is composited.
//!
//! A paint's mask filter and image filter are lowered into an [`HwFilter`] graph whose
//! radii and offsets are in layer units. When the layer is prepared, [`HwFilterLayer`]
//! plans the graph into offscreen passes. Each pass draws one or more textured quads into
//! a pooled texture, and the last output is what the layer composites into its parent.

use std::sync::Arc;

use tracing::{debug, trace_span};

use crate::color::Color;
use crate::geometry::{Matrix, Rect, Vec2};
use crate::gpu::{Command, GpuDevice, GpuTexture, RenderPassDescriptor, TextureDescriptor, TextureUsage, Viewport};
use crate::paint::{BlendMode, ColorFilter, ImageFilter, Paint};
use crate::shader::fragment::{BlurFragment, ImageFilterFragment};
use crate::shader::geometry::{FilterGeometry, FULL_TARGET};
use crate::shader::{WgslFragment, WgxFilter};

use super::render_pass_builder::HwRenderPassBuilder;
use super::step::{CoverageType, HwDrawStep, StepKind, StepParams};
use super::{HwDrawContext, HwDrawState};

const MAX_BLUR_SIGMA: f32 = 16.0;
const EIGHTH_DOWNSAMPLE_KERNEL_WIDTH_MAX: i32 = 41;

pub fn radius_to_sigma(radius: f32) -> f32 {
    if radius > 0.0 {
        radius * 0.57735 + 0.5
    } else {
        0.0
    }
}

fn sigma_to_radius(sigma: f32) -> f32 {
    if sigma > 0.5 {
        (sigma - 0.5) / 0.57735
    } else {
        0.0
    }
}

/// Downsampling factor for a blur of `sigma` pixels: a power of two in `[1/16, 1]` that
/// brings the sigma near 16 pixels.
pub fn blur_scale(sigma: f32) -> f32 {
    if sigma <= MAX_BLUR_SIGMA {
        return 1.0;
    }
    let exponent = (MAX_BLUR_SIGMA / sigma).log2().round().max(-4.0);
    let rounded = exponent.exp2();
    if rounded >= 0.125 {
        return rounded;
    }
    // An eighth is kept when its kernel stays small enough.
    let rounded_plus = (exponent + 1.0).exp2();
    let kernel_plus = (sigma_to_radius(sigma) * rounded_plus).round() as i32 * 2 + 1;
    if kernel_plus <= EIGHTH_DOWNSAMPLE_KERNEL_WIDTH_MAX {
        rounded_plus
    } else {
        rounded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurAxis {
    X,
    Y,
}

/// A filter graph over the content of a layer.
#[derive(Debug, Clone, PartialEq)]
pub enum HwFilter {
    /// The layer's own content.
    Source,
    DownSample {
        scale: f32,
        input: Box<HwFilter>,
    },
    /// One axis of a separable gaussian; `radius` is in layer units.
    Blur {
        radius: f32,
        axis: BlurAxis,
        input: Box<HwFilter>,
    },
    Color {
        filter: Arc<ColorFilter>,
        input: Box<HwFilter>,
    },
    /// Moves the input in layer space. Resampling waits for whatever consumes it.
    Matrix {
        matrix: Matrix,
        input: Box<HwFilter>,
    },
    /// Each input is drawn over the previous ones.
    Merge(Vec<HwFilter>),
}

impl HwFilter {
    /// Separable blur of `input`, downsampled first when the blur is wide in pixels.
    /// `pixel_scale` is pixels per layer unit.
    pub fn blur(radius_x: f32, radius_y: f32, pixel_scale: f32, input: HwFilter) -> HwFilter {
        let max_pixel_radius = radius_x.max(radius_y) * pixel_scale;
        let scale = blur_scale(radius_to_sigma(max_pixel_radius));
        let mut filter = input;
        if scale < 1.0 {
            filter = HwFilter::DownSample {
                scale,
                input: Box::new(filter),
            };
        }
        if radius_x > 0.0 {
            filter = HwFilter::Blur {
                radius: radius_x,
                axis: BlurAxis::X,
                input: Box::new(filter),
            };
        }
        if radius_y > 0.0 {
            filter = HwFilter::Blur {
                radius: radius_y,
                axis: BlurAxis::Y,
                input: Box::new(filter),
            };
        }
        filter
    }

    /// `input` over a blurred, tinted and offset copy of itself.
    pub fn drop_shadow(
        offset: Vec2,
        radius_x: f32,
        radius_y: f32,
        color: Color,
        pixel_scale: f32,
        input: HwFilter,
    ) -> HwFilter {
        let shadow = HwFilter::blur(radius_x, radius_y, pixel_scale, input.clone());
        let shadow = HwFilter::Color {
            filter: Arc::new(ColorFilter::Blend {
                color,
                mode: BlendMode::SrcIn,
            }),
            input: Box::new(shadow),
        };
        let shadow = HwFilter::Matrix {
            matrix: Matrix::translate(offset.x, offset.y),
            input: Box::new(shadow),
        };
        HwFilter::Merge(vec![shadow, input])
    }

    /// Lowers `paint`'s mask filter, then its image filter. `matrix` maps the paint's local
    /// units into layer units.
    pub fn from_paint(paint: &Paint, matrix: &Matrix, pixel_scale: f32) -> Option<HwFilter> {
        let mut filter = None;
        if let Some(mask) = &paint.mask_filter {
            let (rx, ry) = scaled_radii(matrix, mask.radius, mask.radius);
            filter = Some(HwFilter::blur(rx, ry, pixel_scale, HwFilter::Source));
        }
        if let Some(image_filter) = &paint.image_filter {
            let input = filter.unwrap_or(HwFilter::Source);
            filter = Some(Self::lower(image_filter, input, matrix, pixel_scale));
        }
        filter
    }

    fn lower(filter: &ImageFilter, input: HwFilter, matrix: &Matrix, pixel_scale: f32) -> HwFilter {
        match filter {
            ImageFilter::Blur { radius_x, radius_y } => {
                let (rx, ry) = scaled_radii(matrix, *radius_x, *radius_y);
                HwFilter::blur(rx, ry, pixel_scale, input)
            }
            ImageFilter::DropShadow {
                dx,
                dy,
                radius_x,
                radius_y,
                color,
            } => {
                let (rx, ry) = scaled_radii(matrix, *radius_x, *radius_y);
                let offset = map_vector(matrix, *dx, *dy);
                HwFilter::drop_shadow(offset, rx, ry, *color, pixel_scale, input)
            }
            ImageFilter::ColorFilter(color_filter) => HwFilter::Color {
                filter: color_filter.clone(),
                input: Box::new(input),
            },
            ImageFilter::Matrix(local) => {
                let conjugated = match matrix.invert() {
                    Some(inverse) => *matrix * *local * inverse,
                    None => *local,
                };
                HwFilter::Matrix {
                    matrix: conjugated,
                    input: Box::new(input),
                }
            }
            ImageFilter::Merge(inputs) => HwFilter::Merge(
                inputs
                    .iter()
                    .map(|entry| match entry {
                        Some(f) => Self::lower(f, input.clone(), matrix, pixel_scale),
                        None => input.clone(),
                    })
                    .collect(),
            ),
            ImageFilter::Compose { outer, inner } => {
                let inner = Self::lower(inner, input, matrix, pixel_scale);
                Self::lower(outer, inner, matrix, pixel_scale)
            }
        }
    }

    /// Bounds of the output for content inside `src`, both in layer units.
    pub fn fast_bounds(&self, src: &Rect) -> Rect {
        match self {
            HwFilter::Source => *src,
            HwFilter::DownSample { input, .. } | HwFilter::Color { input, .. } => input.fast_bounds(src),
            HwFilter::Blur { radius, axis, input } => {
                let bounds = input.fast_bounds(src);
                match axis {
                    BlurAxis::X => bounds.outset(*radius, 0.0),
                    BlurAxis::Y => bounds.outset(0.0, *radius),
                }
            }
            HwFilter::Matrix { matrix, input } => matrix.map_rect(&input.fast_bounds(src)),
            HwFilter::Merge(inputs) => {
                let mut bounds = Rect::default();
                for input in inputs {
                    bounds.join(&input.fast_bounds(src));
                }
                bounds
            }
        }
    }
}

fn scaled_radii(matrix: &Matrix, radius_x: f32, radius_y: f32) -> (f32, f32) {
    let sx = Vec2::new(matrix.scale_x(), matrix.skew_y()).length();
    let sy = Vec2::new(matrix.skew_x(), matrix.scale_y()).length();
    (radius_x * sx, radius_y * sy)
}

fn map_vector(matrix: &Matrix, dx: f32, dy: f32) -> Vec2 {
    Vec2::new(
        matrix.scale_x() * dx + matrix.skew_x() * dy,
        matrix.skew_y() * dx + matrix.scale_y() * dy,
    )
}

/// A texture produced while filtering and where it lands in layer units.
#[derive(Debug, Clone)]
pub struct FilterOutput {
    pub texture: Arc<dyn GpuTexture>,
    pub bounds: Rect,
    /// Applied to `bounds` when the output is drawn.
    pub matrix: Matrix,
}

impl FilterOutput {
    pub fn new(texture: Arc<dyn GpuTexture>, bounds: Rect) -> Self {
        Self {
            texture,
            bounds,
            matrix: Matrix::identity(),
        }
    }

    fn size(&self) -> (u32, u32) {
        let desc = self.texture.descriptor();
        (desc.width, desc.height)
    }

    /// Pixels per layer unit along each axis.
    fn pixel_scale(&self) -> Vec2 {
        let (width, height) = self.size();
        Vec2::new(
            width as f32 / self.bounds.width().max(f32::EPSILON),
            height as f32 / self.bounds.height().max(f32::EPSILON),
        )
    }
}

#[derive(Debug)]
enum FilterDraw {
    Image {
        texture: Arc<dyn GpuTexture>,
        color_filter: Option<Arc<ColorFilter>>,
        corners: [[f32; 2]; 4],
    },
    Blur {
        texture: Arc<dyn GpuTexture>,
        axis: BlurAxis,
        radius: f32,
        uv_scale: [f32; 2],
        uv_offset: [f32; 2],
    },
}

#[derive(Debug)]
struct FilterPass {
    target: Arc<dyn GpuTexture>,
    desc: Option<RenderPassDescriptor>,
    draws: Vec<FilterDraw>,
    commands: Vec<Command>,
}

struct FilterPlan {
    source: FilterOutput,
    pixel_scale: f32,
    max_size: u32,
    passes: Vec<FilterPass>,
}

impl FilterPlan {
    fn evaluate(&mut self, filter: &HwFilter, ctx: &mut HwDrawContext<'_, '_>) -> FilterOutput {
        match filter {
            HwFilter::Source => self.source.clone(),
            HwFilter::DownSample { scale, input } => {
                let input = self.evaluate_resolved(input, ctx);
                self.down_sample(input, *scale, ctx)
            }
            HwFilter::Blur { radius, axis, input } => {
                let input = self.evaluate_resolved(input, ctx);
                self.blur(input, *radius, *axis, ctx)
            }
            HwFilter::Color { filter, input } => {
                let input = self.evaluate_resolved(input, ctx);
                self.color(input, filter, ctx)
            }
            HwFilter::Matrix { matrix, input } => {
                let mut output = self.evaluate(input, ctx);
                output.matrix = *matrix * output.matrix;
                output
            }
            HwFilter::Merge(inputs) => {
                let outputs: Vec<FilterOutput> = inputs.iter().map(|input| self.evaluate(input, ctx)).collect();
                self.merge(outputs, ctx)
            }
        }
    }

    /// Evaluates `filter` and bakes a pending matrix into a fresh texture.
    fn evaluate_resolved(&mut self, filter: &HwFilter, ctx: &mut HwDrawContext<'_, '_>) -> FilterOutput {
        let output = self.evaluate(filter, ctx);
        if output.matrix.is_identity() {
            output
        } else {
            self.merge(vec![output], ctx)
        }
    }

    fn new_target(&self, width: u32, height: u32, ctx: &mut HwDrawContext<'_, '_>) -> Option<Arc<dyn GpuTexture>> {
        if width == 0 || height == 0 || width > self.max_size || height > self.max_size {
            debug!(width, height, "filter target out of range, skipping pass");
            return None;
        }
        let desc = TextureDescriptor::new(
            width,
            height,
            self.source.texture.descriptor().format,
            TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
        );
        Some(ctx.pool.obtain(&desc).texture().clone())
    }

    fn push_pass(&mut self, target: Arc<dyn GpuTexture>, draws: Vec<FilterDraw>, ctx: &mut HwDrawContext<'_, '_>) {
        let desc = HwRenderPassBuilder::new(target.clone()).build(ctx.device.as_ref(), ctx.pool);
        self.passes.push(FilterPass {
            target,
            desc: Some(desc),
            draws,
            commands: Vec::new(),
        });
    }

    fn down_sample(&mut self, input: FilterOutput, scale: f32, ctx: &mut HwDrawContext<'_, '_>) -> FilterOutput {
        let (width, height) = input.size();
        let width = (width as f32 * scale).ceil() as u32;
        let height = (height as f32 * scale).ceil() as u32;
        let Some(target) = self.new_target(width, height, ctx) else {
            return input;
        };
        let draw = FilterDraw::Image {
            texture: input.texture.clone(),
            color_filter: None,
            corners: FULL_TARGET,
        };
        self.push_pass(target.clone(), vec![draw], ctx);
        FilterOutput::new(target, input.bounds)
    }

    /// Grows the texture by the blur radius on both sides of `axis`, so nothing is cut off.
    fn blur(&mut self, input: FilterOutput, radius: f32, axis: BlurAxis, ctx: &mut HwDrawContext<'_, '_>) -> FilterOutput {
        let (width, height) = input.size();
        let scale = input.pixel_scale();
        let (axis_pixels, axis_scale) = match axis {
            BlurAxis::X => (width, scale.x),
            BlurAxis::Y => (height, scale.y),
        };
        let pixel_radius = radius * axis_scale;
        if pixel_radius <= 0.0 || !pixel_radius.is_finite() {
            return input;
        }
        let pad = pixel_radius.ceil() as u32;
        let (out_width, out_height) = match axis {
            BlurAxis::X => (width + 2 * pad, height),
            BlurAxis::Y => (width, height + 2 * pad),
        };
        let Some(target) = self.new_target(out_width, out_height, ctx) else {
            return input;
        };

        let stretch = (axis_pixels + 2 * pad) as f32 / axis_pixels as f32;
        let shift = -(pad as f32) / axis_pixels as f32;
        let pad_units = pad as f32 / axis_scale;
        let (uv_scale, uv_offset, bounds) = match axis {
            BlurAxis::X => ([stretch, 1.0], [shift, 0.0], input.bounds.outset(pad_units, 0.0)),
            BlurAxis::Y => ([1.0, stretch], [0.0, shift], input.bounds.outset(0.0, pad_units)),
        };
        let draw = FilterDraw::Blur {
            texture: input.texture.clone(),
            axis,
            radius: pixel_radius,
            uv_scale,
            uv_offset,
        };
        self.push_pass(target.clone(), vec![draw], ctx);
        FilterOutput::new(target, bounds)
    }

    fn color(&mut self, input: FilterOutput, filter: &Arc<ColorFilter>, ctx: &mut HwDrawContext<'_, '_>) -> FilterOutput {
        let (width, height) = input.size();
        let Some(target) = self.new_target(width, height, ctx) else {
            return input;
        };
        let draw = FilterDraw::Image {
            texture: input.texture.clone(),
            color_filter: Some(filter.clone()),
            corners: FULL_TARGET,
        };
        self.push_pass(target.clone(), vec![draw], ctx);
        FilterOutput::new(target, input.bounds)
    }

    /// Draws every output, matrix applied, into one texture at the layer's pixel scale.
    fn merge(&mut self, outputs: Vec<FilterOutput>, ctx: &mut HwDrawContext<'_, '_>) -> FilterOutput {
        let mut union = Rect::default();
        for output in &outputs {
            union.join(&output.matrix.map_rect(&output.bounds));
        }
        let width = (union.width() * self.pixel_scale).ceil().max(0.0) as u32;
        let height = (union.height() * self.pixel_scale).ceil().max(0.0) as u32;
        let target = if union.is_empty() {
            None
        } else {
            self.new_target(width, height, ctx)
        };
        let Some(target) = target else {
            return outputs.into_iter().next().unwrap_or_else(|| self.source.clone());
        };
        let bounds = Rect::from_xywh(
            union.left,
            union.top,
            width as f32 / self.pixel_scale,
            height as f32 / self.pixel_scale,
        );
        let draws = outputs
            .iter()
            .map(|output| FilterDraw::Image {
                texture: output.texture.clone(),
                color_filter: None,
                corners: clip_corners(&bounds, &output.matrix, &output.bounds),
            })
            .collect();
        self.push_pass(target.clone(), draws, ctx);
        FilterOutput::new(target, bounds)
    }
}

/// Corners of `rect` under `matrix`, in the clip space of a target covering `target`.
fn clip_corners(target: &Rect, matrix: &Matrix, rect: &Rect) -> [[f32; 2]; 4] {
    let to_clip = |x: f32, y: f32| {
        let p = matrix.map_xy(x, y);
        [
            (p.x - target.left) / target.width() * 2.0 - 1.0,
            1.0 - (p.y - target.top) / target.height() * 2.0,
        ]
    };
    [
        to_clip(rect.left, rect.top),
        to_clip(rect.left, rect.bottom),
        to_clip(rect.right, rect.top),
        to_clip(rect.right, rect.bottom),
    ]
}

/// The filter chain of an offscreen layer, planned once the layer's texture exists.
#[derive(Debug)]
pub struct HwFilterLayer {
    filter: HwFilter,
    flip_y: bool,
    passes: Vec<FilterPass>,
}

impl HwFilterLayer {
    pub fn new(filter: HwFilter, flip_y: bool) -> Self {
        Self {
            filter,
            flip_y,
            passes: Vec::new(),
        }
    }

    pub fn filter(&self) -> &HwFilter {
        &self.filter
    }

    /// Offscreen passes planned by the last `prepare`.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Plans the passes that turn `source` into the filtered output, and returns it.
    /// `pixel_scale` is the layer's pixels per unit.
    pub(crate) fn prepare(&mut self, ctx: &mut HwDrawContext<'_, '_>, source: FilterOutput, pixel_scale: f32) -> FilterOutput {
        let _span = trace_span!("filter_prepare").entered();
        let mut plan = FilterPlan {
            source,
            pixel_scale,
            max_size: ctx.device.max_texture_size(),
            passes: Vec::new(),
        };
        let output = plan.evaluate(&self.filter, ctx);
        self.passes = plan.passes;
        debug!(passes = self.passes.len(), "filter planned");
        output
    }

    pub(crate) fn generate_command(&mut self, ctx: &mut HwDrawContext<'_, '_>) {
        let flip_y = self.flip_y;
        for pass in &mut self.passes {
            let desc = pass.target.descriptor();
            let params = StepParams {
                transform: Matrix::identity(),
                clip_value: 0.0,
                scissor: Rect::from_wh(desc.width as f32, desc.height as f32),
                color_format: desc.format,
                sample_count: 1,
                blend_mode: BlendMode::SrcOver,
                layer_state: HwDrawState::NONE,
            };
            for draw in &pass.draws {
                let cmd = match draw {
                    FilterDraw::Image {
                        texture,
                        color_filter,
                        corners,
                    } => {
                        let geometry = FilterGeometry::new(*corners, flip_y);
                        let mut fragment = ImageFilterFragment::new(texture.clone());
                        if let Some(color_filter) = color_filter {
                            fragment.set_filter(WgxFilter::make(color_filter));
                        }
                        HwDrawStep::new(&geometry, &fragment, StepKind::Color(CoverageType::None))
                            .generate_command(ctx, &params, None)
                    }
                    FilterDraw::Blur {
                        texture,
                        axis,
                        radius,
                        uv_scale,
                        uv_offset,
                    } => {
                        let geometry = FilterGeometry::full_target(flip_y);
                        let unit = match axis {
                            BlurAxis::X => [1.0, 0.0],
                            BlurAxis::Y => [0.0, 1.0],
                        };
                        let fragment = BlurFragment::new(texture.clone(), unit, *radius, *uv_scale, *uv_offset);
                        HwDrawStep::new(&geometry, &fragment, StepKind::Color(CoverageType::None))
                            .generate_command(ctx, &params, None)
                    }
                };
                pass.commands.push(cmd);
            }
        }
    }

    /// Encodes and submits every pass in planning order.
    pub(crate) fn draw(&mut self, device: &dyn GpuDevice) {
        for pass in &mut self.passes {
            let Some(desc) = pass.desc.take() else {
                continue;
            };
            let size = pass.target.descriptor();
            let mut command_buffer = device.create_command_buffer();
            let mut render_pass = command_buffer.begin_render_pass(desc);
            render_pass.set_viewport(Viewport {
                x: 0.0,
                y: 0.0,
                width: size.width as f32,
                height: size.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            });
            for cmd in pass.commands.drain(..) {
                render_pass.add_command(cmd);
            }
            command_buffer.end_render_pass(render_pass);
            if !command_buffer.submit() {
                debug!("filter pass submit failed");
            }
        }
        self.passes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::gpu::TextureFormat;
    use crate::hw::test_support::Fixture;
    use crate::paint::MaskFilter;

    fn blur_axes(filter: &HwFilter) -> Vec<(BlurAxis, f32)> {
        match filter {
            HwFilter::Blur { radius, axis, input } => {
                let mut axes = blur_axes(input);
                axes.push((*axis, *radius));
                axes
            }
            HwFilter::DownSample { input, .. } | HwFilter::Color { input, .. } | HwFilter::Matrix { input, .. } => {
                blur_axes(input)
            }
            HwFilter::Source | HwFilter::Merge(_) => Vec::new(),
        }
    }

    #[test]
    fn blur_scale_is_a_power_of_two_near_sigma_sixteen() {
        assert_eq!(blur_scale(4.0), 1.0);
        assert_eq!(blur_scale(16.0), 1.0);
        assert_eq!(blur_scale(32.0), 0.5);
        assert_eq!(blur_scale(100.0), 0.125);
        assert_eq!(blur_scale(300.0), 0.0625);
        assert_eq!(blur_scale(10_000.0), 0.0625);
    }

    #[test]
    fn radius_to_sigma_keeps_zero() {
        assert_eq!(radius_to_sigma(0.0), 0.0);
        assert!((radius_to_sigma(10.0) - 6.2735).abs() < 1e-4);
    }

    fn down_sample_scale(filter: &HwFilter) -> Option<f32> {
        match filter {
            HwFilter::DownSample { scale, .. } => Some(*scale),
            HwFilter::Blur { input, .. } => down_sample_scale(input),
            _ => None,
        }
    }

    #[test]
    fn wide_blur_downsamples_first() {
        let small = HwFilter::blur(4.0, 4.0, 1.0, HwFilter::Source);
        assert_eq!(down_sample_scale(&small), None);
        assert_eq!(blur_axes(&small), vec![(BlurAxis::X, 4.0), (BlurAxis::Y, 4.0)]);

        // 120 pixels at two pixels per unit
        let wide = HwFilter::blur(60.0, 0.0, 2.0, HwFilter::Source);
        assert_eq!(down_sample_scale(&wide), Some(0.25));
        assert_eq!(blur_axes(&wide), vec![(BlurAxis::X, 60.0)]);
    }

    #[test]
    fn mask_filter_radius_follows_the_world_scale() {
        let mut paint = Paint::default();
        paint.mask_filter = MaskFilter::blur(3.0);
        let filter = HwFilter::from_paint(&paint, &Matrix::scale(2.0, 0.5), 1.0).unwrap();
        assert_eq!(blur_axes(&filter), vec![(BlurAxis::X, 6.0), (BlurAxis::Y, 1.5)]);
        assert!(HwFilter::from_paint(&Paint::default(), &Matrix::identity(), 1.0).is_none());
    }

    #[test]
    fn drop_shadow_offset_is_mapped_into_layer_units() {
        let mut paint = Paint::default();
        paint.image_filter = Some(ImageFilter::drop_shadow(4.0, 2.0, 0.0, 0.0, Color::BLACK));
        let filter = HwFilter::from_paint(&paint, &Matrix::scale(2.0, 3.0), 1.0).unwrap();
        let HwFilter::Merge(inputs) = &filter else {
            panic!("expected a merge, got {filter:?}");
        };
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[1], HwFilter::Source);
        let HwFilter::Matrix { matrix, .. } = &inputs[0] else {
            panic!("expected the shadow to be offset");
        };
        assert_eq!((matrix.translate_x(), matrix.translate_y()), (8.0, 6.0));

        let src = Rect::from_xywh(0.0, 0.0, 10.0, 10.0);
        assert_eq!(filter.fast_bounds(&src), Rect::new(0.0, 0.0, 18.0, 16.0));
    }

    #[test]
    fn matrix_filter_is_conjugated_by_the_world_matrix() {
        let mut paint = Paint::default();
        paint.image_filter = Some(Arc::new(ImageFilter::Matrix(Matrix::translate(5.0, 0.0))));
        let filter = HwFilter::from_paint(&paint, &Matrix::scale(2.0, 2.0), 1.0).unwrap();
        let src = Rect::from_xywh(0.0, 0.0, 10.0, 10.0);
        assert_eq!(filter.fast_bounds(&src), Rect::new(10.0, 0.0, 20.0, 10.0));
    }

    fn source(fixture: &Fixture, width: u32, height: u32) -> FilterOutput {
        let texture = fixture.device.create_texture(&TextureDescriptor::new(
            width,
            height,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
        ));
        FilterOutput::new(texture, Rect::from_xywh(10.0, 10.0, width as f32, height as f32))
    }

    #[test]
    fn blur_passes_grow_the_output_by_the_radius() {
        let mut fixture = Fixture::new();
        let src = source(&fixture, 20, 10);
        let mut layer = HwFilterLayer::new(HwFilter::blur(3.0, 2.5, 1.0, HwFilter::Source), false);
        let output = fixture.with_context(64.0, 64.0, |ctx| layer.prepare(ctx, src.clone(), 1.0));
        assert_eq!(layer.pass_count(), 2);
        let desc = output.texture.descriptor();
        assert_eq!((desc.width, desc.height), (26, 16));
        assert_eq!(output.bounds, Rect::new(7.0, 7.0, 33.0, 23.0));
        assert!(output.matrix.is_identity());
    }

    #[test]
    fn drop_shadow_plans_blur_tint_and_merge() {
        let mut fixture = Fixture::new();
        let device = fixture.device.clone();
        let src = source(&fixture, 16, 16);
        let filter = HwFilter::drop_shadow(Vec2::new(4.0, 4.0), 2.0, 2.0, Color::BLACK, 1.0, HwFilter::Source);
        let mut layer = HwFilterLayer::new(filter, false);
        let output = fixture.with_context(64.0, 64.0, |ctx| {
            let output = layer.prepare(ctx, src.clone(), 1.0);
            layer.generate_command(ctx);
            ctx.stage_buffer.flush();
            ctx.static_buffer.flush();
            output
        });
        // blur x, blur y, tint, merge
        assert_eq!(layer.pass_count(), 4);
        assert_eq!(output.bounds, Rect::new(10.0, 10.0, 32.0, 32.0));

        layer.draw(device.as_ref());
        let passes = fixture.headless.recorded_passes();
        assert_eq!(passes.len(), 4);
        assert!(passes.iter().take(3).all(|pass| pass.commands.len() == 1));
        assert_eq!(passes[3].commands.len(), 2);
        assert_eq!(passes[3].descriptor.target_width(), 22);
        assert_eq!(layer.pass_count(), 0);
    }

    #[test]
    fn blur_wider_than_the_max_texture_is_skipped() {
        let mut fixture = Fixture::new();
        let src = source(&fixture, 8, 8);
        let mut layer = HwFilterLayer::new(HwFilter::blur(1.0e6, 0.0, 1.0, HwFilter::Source), false);
        let output = fixture.with_context(64.0, 64.0, |ctx| layer.prepare(ctx, src.clone(), 1.0));
        // only the downsample survives
        assert_eq!(layer.pass_count(), 1);
        assert_eq!(output.texture.descriptor().width, 1);
        assert_eq!(output.bounds, src.bounds);
    }
}
