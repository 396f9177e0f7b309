//! Layers: the root layer renders into the surface, sub layers render offscreen and are
//! composited into their parent as a textured rect.

use std::sync::Arc;

use tracing::{debug, trace_span};

use crate::geometry::{Mat4, Matrix, Rect, Vec2};
use crate::gpu::{
    GpuDevice, GpuTexture, LoadOp, RenderPass, RenderPassDescriptor, TextureDescriptor, TextureFormat, TextureUsage,
    Viewport,
};
use crate::paint::{AlphaType, Image, ImageShader, Paint, PaintStyle, SamplingOptions, Shader, TileMode};
use crate::path::Path;
use crate::texture::Texture;

use super::draw::{DrawBase, HwDynamicPathClip, HwDynamicPathDraw, UNBOUNDED};
use super::filters::{FilterOutput, HwFilter, HwFilterLayer};
use super::layer_state::ClipId;
use super::render_pass_builder::HwRenderPassBuilder;
use super::{HwDraw, HwDrawContext, HwDrawState, HwLayerState};

/// Draws considered for merging with a new one, newest first.
const MAX_MERGE_LOOKBACK: usize = 5;

/// What the root and sub layers share: the draw list, the clip bookkeeping and the
/// mapping between canvas units and the layer's pixels.
#[derive(Debug)]
pub struct HwLayer {
    /// Canvas space, already rounded out to whole physical pixels.
    bounds: Rect,
    width: u32,
    height: u32,
    scale: f32,
    bounds_to_physical: Matrix,
    state: HwLayerState,
    draw_ops: Vec<HwDraw>,
    pending_clips: Vec<HwDraw>,
    next_clip_id: ClipId,
    sample_count: u32,
    color_format: TextureFormat,
    enable_merging: bool,
    layer_state: HwDrawState,
}

impl HwLayer {
    pub fn new(
        bounds: Rect,
        scale: f32,
        start_depth: u32,
        sample_count: u32,
        color_format: TextureFormat,
        enable_merging: bool,
    ) -> Self {
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let physical = Matrix::scale(scale, scale).map_rect(&bounds).round_out();
        let bounds = Matrix::scale(1.0 / scale, 1.0 / scale).map_rect(&physical);
        let bounds_to_physical = Matrix::scale(scale, scale) * Matrix::translate(-bounds.left, -bounds.top);

        let mut state = HwLayerState::new(start_depth);
        let width = physical.width().max(0.0) as u32;
        let height = physical.height().max(0.0) as u32;
        state.save_clip_bounds(&Rect::from_wh(width as f32, height as f32), true);
        Self {
            bounds,
            width,
            height,
            scale,
            bounds_to_physical,
            state,
            draw_ops: Vec::new(),
            pending_clips: Vec::new(),
            next_clip_id: 0,
            sample_count,
            color_format,
            enable_merging,
            layer_state: HwDrawState::NONE,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Physical pixels per canvas unit.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn bounds_to_physical(&self) -> Matrix {
        self.bounds_to_physical
    }

    pub fn state(&self) -> &HwLayerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut HwLayerState {
        &mut self.state
    }

    pub fn draw_ops(&self) -> &[HwDraw] {
        &self.draw_ops
    }

    /// Attachments the layer's render pass needs, known after `prepare`.
    pub fn layer_state(&self) -> HwDrawState {
        self.layer_state
    }

    pub fn color_format(&self) -> TextureFormat {
        self.color_format
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn next_clip_id(&mut self) -> ClipId {
        self.next_clip_id += 1;
        self.next_clip_id
    }

    /// Records `draw`. `local_bounds` is the draw's extent before its transform; `None`
    /// means unknown.
    pub fn add_draw(&mut self, mut draw: HwDraw, local_bounds: Option<Rect>) {
        self.draw_ops.append(&mut self.pending_clips);

        let base = draw.base_mut();
        base.color_format = self.color_format;
        base.sample_count = self.sample_count;
        base.scissor = self.state.current_clip_bounds();
        base.clip_draw = self.state.last_clip_draw();
        base.clip_depth = self.state.next_draw_depth();

        let mut bounds = match local_bounds {
            Some(local) => (self.bounds_to_physical * base.transform).map_rect(&local),
            None => UNBOUNDED,
        };
        if !bounds.intersect(&Rect::from_wh(self.width as f32, self.height as f32)) {
            bounds.set_empty();
        }
        base.layer_space_bounds = bounds;

        if self.enable_merging {
            match self.try_merge(draw) {
                Ok(()) => return,
                Err(back) => draw = back,
            }
        }
        self.draw_ops.push(draw);
    }

    fn try_merge(&mut self, mut draw: HwDraw) -> Result<(), HwDraw> {
        let bounds = draw.base().layer_space_bounds;
        for candidate in self.draw_ops.iter_mut().rev().take(MAX_MERGE_LOOKBACK) {
            match candidate.merge_if_possible(draw) {
                Ok(()) => return Ok(()),
                Err(back) => draw = back,
            }
            // Reordering past an overlapping draw would change what ends up on top.
            if candidate.base().layer_space_bounds.intersects(&bounds) {
                break;
            }
        }
        Err(draw)
    }

    /// Records a path clip. It reaches the draw list ahead of the next draw, or at flush.
    pub fn add_clip(&mut self, mut clip: HwDynamicPathClip) {
        let id = clip.id();
        clip.base.scissor = self.state.current_clip_bounds();
        clip.base.color_format = self.color_format;
        clip.base.sample_count = self.sample_count;
        self.pending_clips.push(HwDraw::Clip(clip));
        self.state.save_clip_op(id);
    }

    /// Narrows the scissor of later draws to `rect` under `matrix`.
    pub fn add_rect_clip(&mut self, rect: &Rect, matrix: &Matrix) {
        let physical = (self.bounds_to_physical * *matrix).map_rect(rect);
        self.state.save_clip_bounds(&physical, false);
    }

    fn sub_context<'c, 'p>(&self, ctx: &'c mut HwDrawContext<'_, 'p>) -> HwDrawContext<'c, 'p> {
        let b = &self.bounds;
        let mvp = Mat4::ortho(b.left, b.right, b.bottom, b.top);
        ctx.sub_context(mvp, self.state.draw_depth() + 1, Vec2::new(self.scale, self.scale))
    }

    /// Assigns the remaining clip depths and prepares every draw. Returns what the layer
    /// needs from its parent's pass, which is nothing for the layer itself.
    pub fn prepare(&mut self, ctx: &mut HwDrawContext<'_, '_>) -> HwDrawState {
        let _span = trace_span!("layer_prepare", draws = self.draw_ops.len()).entered();
        self.draw_ops.append(&mut self.pending_clips);
        self.state.flush_clip_depth();
        for (id, depth) in self.state.take_clip_depths() {
            if let Some(HwDraw::Clip(clip)) = self
                .draw_ops
                .iter_mut()
                .find(|draw| matches!(draw, HwDraw::Clip(clip) if clip.id() == id))
            {
                clip.base.clip_depth = depth;
            }
        }

        let mut sub = self.sub_context(ctx);
        let mut layer_state = HwDrawState::NONE;
        for draw in &mut self.draw_ops {
            layer_state |= draw.prepare(&mut sub);
        }
        self.layer_state = layer_state;
        HwDrawState::NONE
    }

    pub fn generate_command(&mut self, ctx: &mut HwDrawContext<'_, '_>) {
        let _span = trace_span!("layer_generate_command", draws = self.draw_ops.len()).entered();
        let layer_state = self.layer_state;
        let mut sub = self.sub_context(ctx);
        for draw in &mut self.draw_ops {
            draw.generate_command(&mut sub, layer_state);
        }
    }

    /// Encodes every draw into one render pass and submits it.
    pub fn draw(&mut self, device: &dyn GpuDevice, desc: RenderPassDescriptor) {
        let mut command_buffer = device.create_command_buffer();
        let mut pass = command_buffer.begin_render_pass(desc);
        pass.set_viewport(Viewport {
            x: 0.0,
            y: 0.0,
            width: self.width as f32,
            height: self.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        for draw in &mut self.draw_ops {
            draw.draw(device, &mut pass);
        }
        debug!(commands = pass.commands().len(), "layer pass");
        command_buffer.end_render_pass(pass);
        if !command_buffer.submit() {
            debug!("layer submit failed");
        }
        self.draw_ops.clear();
    }
}

/// The layer that renders into the surface's texture.
#[derive(Debug)]
pub struct HwRootLayer {
    layer: HwLayer,
    target: Arc<dyn GpuTexture>,
    clear_on_begin: bool,
    pass: Option<RenderPassDescriptor>,
}

impl HwRootLayer {
    /// `target` is in physical pixels; the layer bounds are that size divided by `scale`.
    pub fn new(target: Arc<dyn GpuTexture>, scale: f32, sample_count: u32, clear_on_begin: bool, enable_merging: bool) -> Self {
        let desc = target.descriptor();
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let bounds = Rect::from_wh(desc.width as f32 / scale, desc.height as f32 / scale);
        let layer = HwLayer::new(bounds, scale, 1, sample_count, desc.format, enable_merging);
        Self {
            layer,
            target,
            clear_on_begin,
            pass: None,
        }
    }

    pub fn layer(&self) -> &HwLayer {
        &self.layer
    }

    pub fn layer_mut(&mut self) -> &mut HwLayer {
        &mut self.layer
    }

    pub fn target(&self) -> &Arc<dyn GpuTexture> {
        &self.target
    }

    pub fn prepare(&mut self, ctx: &mut HwDrawContext<'_, '_>) {
        self.layer.prepare(ctx);
        let load_op = if self.clear_on_begin { LoadOp::Clear } else { LoadOp::Load };
        self.pass = Some(
            HwRenderPassBuilder::new(self.target.clone())
                .sample_count(self.layer.sample_count)
                .draw_state(self.layer.layer_state)
                .load_op(load_op)
                .build(ctx.device.as_ref(), ctx.pool),
        );
    }

    pub fn generate_command(&mut self, ctx: &mut HwDrawContext<'_, '_>) {
        self.layer.generate_command(ctx);
    }

    pub fn draw(&mut self, device: &dyn GpuDevice) {
        if let Some(desc) = self.pass.take() {
            self.layer.draw(device, desc);
        }
    }
}

/// Maps the pixels of a `width` x `height` texture onto `bounds`, as an image shader's
/// local matrix.
fn texture_matrix(bounds: &Rect, width: u32, height: u32, flip_y: bool) -> Matrix {
    let mut to_image = Matrix::scale(width as f32 / bounds.width(), height as f32 / bounds.height())
        * Matrix::translate(-bounds.left, -bounds.top);
    if flip_y {
        to_image = Matrix::translate(0.0, height as f32) * Matrix::scale(1.0, -1.0) * to_image;
    }
    to_image.invert().unwrap_or_default()
}

/// An offscreen layer opened by `save_layer`, or by a draw whose paint carries a mask or
/// image filter.
///
/// As a draw of its parent it goes through `prepare`, `generate_command` and `draw` like any
/// other; each phase runs its own children first. A filter layer then runs its filter
/// passes over the layer's texture. Last, a textured rect composites the result with the
/// layer paint's alpha, blend mode and color filter.
#[derive(Debug)]
pub struct HwSubLayer {
    base: DrawBase,
    layer: HwLayer,
    paint: Paint,
    flip_y: bool,
    filter: Option<HwFilterLayer>,
    back_draw: Option<Box<HwDraw>>,
    pass: Option<RenderPassDescriptor>,
}

impl HwSubLayer {
    pub fn new(layer: HwLayer, mut paint: Paint, flip_y: bool) -> Self {
        paint.mask_filter = None;
        paint.image_filter = None;
        let mut base = DrawBase::new(Matrix::identity(), paint.blend_mode);
        base.anti_alias = false;
        Self {
            base,
            layer,
            paint,
            flip_y,
            filter: None,
            back_draw: None,
            pass: None,
        }
    }

    /// A layer whose content goes through `filter` before it is composited.
    pub fn with_filter(layer: HwLayer, paint: Paint, flip_y: bool, filter: HwFilter) -> Self {
        let mut sub = Self::new(layer, paint, flip_y);
        sub.filter = Some(HwFilterLayer::new(filter, flip_y));
        sub
    }

    pub fn filter_layer(&self) -> Option<&HwFilterLayer> {
        self.filter.as_ref()
    }

    /// What the layer covers once filtered, in its parent's units.
    pub fn output_bounds(&self) -> Rect {
        match &self.filter {
            Some(filter) => filter.filter().fast_bounds(&self.layer.bounds),
            None => self.layer.bounds,
        }
    }

    pub fn base(&self) -> &DrawBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut DrawBase {
        &mut self.base
    }

    pub fn layer(&self) -> &HwLayer {
        &self.layer
    }

    pub fn layer_mut(&mut self) -> &mut HwLayer {
        &mut self.layer
    }

    fn back_draw(&self, output: &FilterOutput) -> HwDraw {
        let desc = output.texture.descriptor();
        let (width, height) = (desc.width, desc.height);
        let image = Texture::from_gpu_texture(output.texture.clone(), width, height, AlphaType::Premul);
        let mut paint = self.paint.clone();
        paint.style = PaintStyle::Fill;
        paint.anti_alias = false;
        paint.shader = Some(Arc::new(Shader::Image(ImageShader {
            image: Image::Texture(Arc::new(image)),
            sampling: SamplingOptions::default(),
            tile_x: TileMode::Clamp,
            tile_y: TileMode::Clamp,
            local_matrix: texture_matrix(&output.bounds, width, height, self.flip_y),
        })));

        let transform = self.base.transform * output.matrix;
        let mut draw = HwDynamicPathDraw::new(transform, Path::rect(&output.bounds), paint, false);
        draw.base.clip_depth = self.base.clip_depth;
        draw.base.clip_draw = self.base.clip_draw;
        draw.base.sample_count = self.base.sample_count;
        draw.base.color_format = self.base.color_format;
        draw.base.scissor = self.base.scissor;
        HwDraw::Path(draw)
    }

    pub(crate) fn on_prepare(&mut self, ctx: &mut HwDrawContext<'_, '_>) -> HwDrawState {
        let desc = TextureDescriptor::new(
            self.layer.width,
            self.layer.height,
            self.layer.color_format,
            TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
        );
        let target = ctx.pool.obtain(&desc).texture().clone();

        self.layer.prepare(ctx);
        self.pass = Some(
            HwRenderPassBuilder::new(target.clone())
                .sample_count(self.layer.sample_count)
                .draw_state(self.layer.layer_state)
                .load_op(LoadOp::Clear)
                .build(ctx.device.as_ref(), ctx.pool),
        );

        let source = FilterOutput::new(target, self.layer.bounds);
        let scale = self.layer.scale;
        let output = match &mut self.filter {
            Some(filter) => filter.prepare(ctx, source, scale),
            None => source,
        };
        let mut back_draw = self.back_draw(&output);
        let state = back_draw.prepare(ctx);
        self.back_draw = Some(Box::new(back_draw));
        state
    }

    pub(crate) fn on_generate_command(&mut self, ctx: &mut HwDrawContext<'_, '_>, layer_state: HwDrawState) {
        self.layer.generate_command(ctx);
        if let Some(filter) = &mut self.filter {
            filter.generate_command(ctx);
        }
        if let Some(back_draw) = &mut self.back_draw {
            back_draw.generate_command(ctx, layer_state);
        }
    }

    /// Renders the layer into its texture and runs the filter passes, then hands the
    /// composite command to the parent's pass.
    pub(crate) fn draw(&mut self, device: &dyn GpuDevice, parent: &mut RenderPass) {
        if let Some(desc) = self.pass.take() {
            self.layer.draw(device, desc);
        }
        if let Some(filter) = &mut self.filter {
            filter.draw(device);
        }
        if let Some(back_draw) = &mut self.back_draw {
            back_draw.draw(device, parent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::geometry::{point, RRect};
    use crate::hw::draw::{ClipOp, HwDynamicRRectDraw};
    use crate::hw::test_support::Fixture;

    fn layer(enable_merging: bool) -> HwLayer {
        HwLayer::new(Rect::from_wh(100.0, 100.0), 1.0, 1, 1, TextureFormat::Rgba8Unorm, enable_merging)
    }

    fn rrect(x: f32) -> (HwDraw, Option<Rect>) {
        let rect = Rect::from_xywh(x, 0.0, 10.0, 10.0);
        let draw = HwDynamicRRectDraw::new(Matrix::identity(), RRect::from_rect_xy(rect, 2.0, 2.0), Paint::fill(Color::RED));
        (HwDraw::RRect(draw), Some(rect))
    }

    fn concave_fill() -> (HwDraw, Option<Rect>) {
        let path = Path::polygon(
            &[point(0.0, 0.0), point(40.0, 0.0), point(20.0, 10.0), point(40.0, 40.0), point(0.0, 40.0)],
            true,
        );
        let bounds = path.bounds();
        (
            HwDraw::Path(HwDynamicPathDraw::new(Matrix::identity(), path, Paint::default(), false)),
            Some(bounds),
        )
    }

    #[test]
    fn content_scale_sizes_the_layer_in_pixels() {
        let layer = HwLayer::new(Rect::new(10.2, 10.0, 60.0, 35.0), 2.0, 1, 1, TextureFormat::Rgba8Unorm, true);
        assert_eq!((layer.width(), layer.height()), (100, 50));
        assert_eq!(layer.bounds(), Rect::new(10.0, 10.0, 60.0, 35.0));
        let origin = layer.bounds_to_physical().map_xy(10.0, 10.0);
        assert_eq!((origin.x, origin.y), (0.0, 0.0));
    }

    #[test]
    fn draws_merge_past_non_overlapping_draws() {
        let mut layer = layer(true);
        let (a, a_bounds) = rrect(0.0);
        layer.add_draw(a, a_bounds);
        let (path, _) = concave_fill();
        layer.add_draw(path, Some(Rect::from_xywh(80.0, 80.0, 10.0, 10.0)));
        let (b, b_bounds) = rrect(60.0);
        layer.add_draw(b, b_bounds);
        assert_eq!(layer.draw_ops().len(), 2);
    }

    #[test]
    fn overlapping_draws_block_merging() {
        let mut layer = layer(true);
        let (a, a_bounds) = rrect(50.0);
        layer.add_draw(a, a_bounds);
        let (path, path_bounds) = concave_fill();
        layer.add_draw(path, path_bounds);
        let (b, b_bounds) = rrect(0.0);
        layer.add_draw(b, b_bounds);
        assert_eq!(layer.draw_ops().len(), 3);
    }

    #[test]
    fn merging_can_be_turned_off() {
        let mut layer = layer(false);
        for x in [0.0, 20.0] {
            let (draw, bounds) = rrect(x);
            layer.add_draw(draw, bounds);
        }
        assert_eq!(layer.draw_ops().len(), 2);
    }

    #[test]
    fn draws_take_the_scissor_and_clip_in_effect() {
        let mut layer = layer(true);
        layer.state_mut().save();
        layer.add_rect_clip(&Rect::from_xywh(10.0, 10.0, 20.0, 20.0), &Matrix::identity());
        let id = layer.next_clip_id();
        let clip = HwDynamicPathClip::new(id, Matrix::identity(), Path::circle(20.0, 20.0, 10.0), ClipOp::Intersect, layer.bounds());
        layer.add_clip(clip);
        let (draw, bounds) = rrect(15.0);
        layer.add_draw(draw, bounds);

        let ops = layer.draw_ops();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].kind_name(), "clip");
        assert_eq!(ops[1].base().scissor, Rect::new(10.0, 10.0, 30.0, 30.0));
        assert_eq!(ops[1].base().clip_draw, Some(id));
        assert_eq!(ops[1].base().layer_space_bounds, Rect::new(15.0, 0.0, 25.0, 10.0));
    }

    #[test]
    fn prepare_gives_clips_depths_above_their_draws() {
        let mut fixture = Fixture::new();
        let mut layer = layer(true);
        layer.state_mut().save();
        let id = layer.next_clip_id();
        layer.add_clip(HwDynamicPathClip::new(id, Matrix::identity(), Path::circle(20.0, 20.0, 10.0), ClipOp::Difference, layer.bounds()));
        let (draw, bounds) = concave_fill();
        layer.add_draw(draw, bounds);
        layer.state_mut().restore();

        fixture.with_context(100.0, 100.0, |ctx| {
            assert_eq!(layer.prepare(ctx), HwDrawState::NONE);
        });
        let ops = layer.draw_ops();
        assert!(ops[0].base().clip_depth > ops[1].base().clip_depth);
        assert_eq!(layer.layer_state(), HwDrawState::STENCIL | HwDrawState::DEPTH);
    }

    #[test]
    fn sub_layer_renders_before_compositing_into_the_parent() {
        let mut fixture = Fixture::new();
        let device = fixture.device.clone();
        let target = device.create_texture(&TextureDescriptor::new(
            64,
            64,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
        ));
        let mut root = HwRootLayer::new(target, 1.0, 1, true, true);

        let mut child = HwLayer::new(Rect::from_xywh(8.0, 8.0, 32.0, 32.0), 1.0, 2, 1, TextureFormat::Rgba8Unorm, true);
        let (draw, bounds) = rrect(10.0);
        child.add_draw(draw, bounds);
        let mut paint = Paint::default();
        paint.set_alpha(0.5);
        root.layer_mut()
            .add_draw(HwDraw::Layer(Box::new(HwSubLayer::new(child, paint, false))), Some(Rect::from_xywh(8.0, 8.0, 32.0, 32.0)));

        fixture.with_context(64.0, 64.0, |ctx| {
            root.prepare(ctx);
            root.generate_command(ctx);
            ctx.stage_buffer.flush();
            ctx.static_buffer.flush();
            root.draw(device.as_ref());
        });

        let passes = fixture.headless.recorded_passes();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].descriptor.target_width(), 32);
        assert_eq!(passes[0].commands.len(), 1);
        assert_eq!(passes[1].descriptor.target_width(), 64);
        assert_eq!(passes[1].commands.len(), 1);
    }
}
