//! The recording canvas of a GPU surface.
//!
//! Draw calls are turned into [`HwDraw`]s on the current layer right away; nothing touches
//! the GPU until [`HwCanvas::flush`]. `save_layer` opens an offscreen [`HwSubLayer`] that
//! becomes a draw of its parent when the matching `restore` closes it.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, trace, trace_span};

use crate::cache::{HwRenderTargetCache, Pool};
use crate::config::{ContextOptions, SurfaceOptions};
use crate::geometry::{point, Mat4, Matrix, Point, RRect, Rect, Vec2};
use crate::gpu::{GpuDevice, GpuTexture};
use crate::paint::{BlendMode, Image, ImageShader, Paint, PaintStyle, SamplingOptions, Shader, TileMode};
use crate::path::Path;
use crate::text::{AtlasManager, Font, GlyphId, GlyphRun, TextRenderControl, TextRun};
use crate::texture::TextureManager;

use super::draw::{ClipOp, HwDynamicPathClip, HwDynamicPathDraw, HwDynamicRRectDraw};
use super::{
    HwDraw, HwDrawContext, HwFilter, HwLayer, HwPipelineLib, HwRootLayer, HwStageBuffer, HwStaticBuffer, HwSubLayer,
};

/// GPU-side state shared by every canvas of a context.
pub struct HwResources {
    pub device: Arc<dyn GpuDevice>,
    pub options: ContextOptions,
    pub stage_buffer: HwStageBuffer,
    pub static_buffer: HwStaticBuffer,
    pub pipeline_lib: HwPipelineLib,
    pub atlas_manager: AtlasManager,
    pub text_control: TextRenderControl,
    pub texture_manager: Arc<TextureManager>,
    pub render_targets: RefCell<HwRenderTargetCache>,
}

impl HwResources {
    pub fn new(device: Arc<dyn GpuDevice>, options: ContextOptions) -> Self {
        Self {
            stage_buffer: HwStageBuffer::new(device.as_ref()),
            static_buffer: HwStaticBuffer::new(device.as_ref()),
            pipeline_lib: HwPipelineLib::new(device.clone(), options.error_callback.clone()),
            atlas_manager: AtlasManager::new(device.clone(), options.larger_atlas_mask, options.text),
            text_control: TextRenderControl::new(options.text),
            texture_manager: Arc::new(TextureManager::new(device.clone())),
            render_targets: RefCell::new(HwRenderTargetCache::with_device(
                device.clone(),
                options.render_target_cache_bytes,
            )),
            device,
            options,
        }
    }
}

pub struct HwCanvas {
    resources: Rc<RefCell<HwResources>>,
    device: Arc<dyn GpuDevice>,
    ctx_scale: f32,
    enable_msaa: bool,
    sample_count: u32,
    clear_on_begin: bool,
    enable_merging: bool,
    enable_contour_aa: bool,
    enable_text_linear_filter: bool,
    /// One entry per open save; the last one is the current matrix.
    matrices: Vec<Matrix>,
    root: Option<HwRootLayer>,
    /// Offscreen layers opened by `save_layer`, innermost last.
    layers: Vec<HwSubLayer>,
    #[cfg(feature = "render_metrics")]
    metrics: crate::metrics::FlushMetrics,
}

impl HwCanvas {
    pub fn new(resources: Rc<RefCell<HwResources>>, surface: &SurfaceOptions) -> Self {
        let (device, options) = {
            let res = resources.borrow();
            (res.device.clone(), res.options.clone())
        };
        let enable_msaa = surface.sample_count > 1 && device.can_use_msaa();
        Self {
            resources,
            device,
            ctx_scale: if surface.content_scale > 0.0 { surface.content_scale } else { 1.0 },
            enable_msaa,
            sample_count: if enable_msaa { surface.sample_count } else { 1 },
            clear_on_begin: surface.clear_on_begin,
            enable_merging: options.enable_merging_draw_call,
            enable_contour_aa: options.enable_contour_aa,
            enable_text_linear_filter: options.enable_text_linear_filter,
            matrices: vec![Matrix::identity()],
            root: None,
            layers: Vec::new(),
            #[cfg(feature = "render_metrics")]
            metrics: crate::metrics::FlushMetrics::default(),
        }
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn context_scale(&self) -> f32 {
        self.ctx_scale
    }

    #[cfg(feature = "render_metrics")]
    pub fn flush_metrics(&self) -> &crate::metrics::FlushMetrics {
        &self.metrics
    }

    #[cfg(feature = "render_metrics")]
    pub fn reset_flush_metrics(&mut self) {
        self.metrics.reset();
    }

    /// Starts recording a frame that renders into `target`.
    pub fn begin_new_frame(&mut self, target: Arc<dyn GpuTexture>) {
        self.root = Some(HwRootLayer::new(
            target,
            self.ctx_scale,
            self.sample_count,
            self.clear_on_begin,
            self.enable_merging,
        ));
        self.layers.clear();
        self.matrices = vec![Matrix::identity()];
    }

    pub fn root_layer(&self) -> Option<&HwRootLayer> {
        self.root.as_ref()
    }

    pub fn open_layer_count(&self) -> usize {
        self.layers.len()
    }

    fn current_layer(&self) -> Option<&HwLayer> {
        if let Some(top) = self.layers.last() {
            return Some(top.layer());
        }
        self.root.as_ref().map(HwRootLayer::layer)
    }

    fn current_layer_mut(&mut self) -> Option<&mut HwLayer> {
        if let Some(top) = self.layers.last_mut() {
            return Some(top.layer_mut());
        }
        self.root.as_mut().map(HwRootLayer::layer_mut)
    }

    // Matrix stack.

    pub fn total_matrix(&self) -> Matrix {
        self.matrices.last().copied().unwrap_or_default()
    }

    fn set_top(&mut self, m: Matrix) {
        if let Some(top) = self.matrices.last_mut() {
            *top = m;
        }
    }

    pub fn concat(&mut self, m: &Matrix) {
        let total = self.total_matrix() * *m;
        self.set_top(total);
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.concat(&Matrix::translate(dx, dy));
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        self.concat(&Matrix::scale(sx, sy));
    }

    pub fn rotate(&mut self, degrees: f32) {
        self.concat(&Matrix::rotate(degrees));
    }

    pub fn set_matrix(&mut self, m: Matrix) {
        self.set_top(m);
    }

    pub fn reset_matrix(&mut self) {
        self.set_top(Matrix::identity());
    }

    pub fn save_count(&self) -> u32 {
        self.matrices.len() as u32
    }

    // Save and restore.

    pub fn save(&mut self) -> u32 {
        let count = self.save_count();
        self.matrices.push(self.total_matrix());
        if let Some(layer) = self.current_layer_mut() {
            layer.state_mut().save();
        }
        count
    }

    /// Opens an offscreen layer covering `bounds` (the current clip when `None`). The layer
    /// is composited with `paint`'s alpha, blend mode and color filter when restored, after
    /// its mask and image filters ran over it. If no layer can be allocated this behaves
    /// like `save` followed by `clip_rect`.
    pub fn save_layer(&mut self, bounds: Option<&Rect>, paint: Option<&Paint>) -> u32 {
        let count = self.save_count();
        let matrix = self.total_matrix();
        self.matrices.push(matrix);
        if self.current_layer().is_none() {
            return count;
        }

        let mut restore_paint = paint.cloned().unwrap_or_default();
        restore_paint.style = PaintStyle::Fill;
        let filter = HwFilter::from_paint(&restore_paint, &matrix, self.ctx_scale);
        match self.gen_layer(bounds, &matrix, filter.as_ref()) {
            Some(layer) => {
                trace!(width = layer.width(), height = layer.height(), "save_layer");
                self.push_sub_layer(layer, restore_paint, filter);
            }
            None => {
                debug!("save_layer fell back to save");
                if let Some(layer) = self.current_layer_mut() {
                    layer.state_mut().save();
                }
                if let Some(bounds) = bounds {
                    self.clip_rect(bounds, ClipOp::Intersect);
                }
            }
        }
        count
    }

    /// Sizes a layer for `bounds` under `matrix`, cut down to the current clip. With a
    /// `filter` the clip first grows by how far the filter moves pixels. `None` when the
    /// layer would be empty, not finite or larger than the device allows.
    fn gen_layer(&self, bounds: Option<&Rect>, matrix: &Matrix, filter: Option<&HwFilter>) -> Option<HwLayer> {
        let _span = trace_span!("gen_layer", filtered = filter.is_some()).entered();
        let parent = self.current_layer()?;
        let to_canvas = parent.bounds_to_physical().invert()?;
        let clip = to_canvas.map_rect(&parent.state().current_clip_bounds());

        let mut layer_bounds = match bounds {
            Some(bounds) => matrix.map_rect(bounds),
            None => clip,
        };
        let reach_clip = match filter {
            Some(filter) => {
                let spread = filter.fast_bounds(&clip);
                let reach = (clip.left - spread.left)
                    .max(clip.top - spread.top)
                    .max(spread.right - clip.right)
                    .max(spread.bottom - clip.bottom)
                    .max(0.0);
                clip.outset(reach, reach)
            }
            None => clip,
        };
        if !layer_bounds.intersect(&reach_clip) {
            return None;
        }

        let scale = self.ctx_scale;
        let width = layer_bounds.width() * scale;
        let height = layer_bounds.height() * scale;
        if !width.is_finite() || !height.is_finite() {
            return None;
        }
        let physical = Matrix::scale(scale, scale).map_rect(&layer_bounds).round_out();
        let (width, height) = (physical.width().abs() as u32, physical.height().abs() as u32);
        let max = self.device.max_texture_size();
        if width == 0 || height == 0 || width > max || height > max {
            return None;
        }

        let sample_count = if self.device.can_use_msaa() { self.sample_count } else { 1 };
        Some(HwLayer::new(
            layer_bounds,
            scale,
            parent.state().current_depth() + 1,
            sample_count,
            parent.color_format(),
            self.enable_merging,
        ))
    }

    pub fn restore(&mut self) {
        if self.matrices.len() <= 1 {
            return;
        }
        self.matrices.pop();

        if self.layers.last().is_some_and(|top| top.layer().state().self_depth() == 1) {
            self.close_top_layer();
            return;
        }
        if let Some(layer) = self.current_layer_mut() {
            layer.state_mut().restore();
        }
    }

    /// Restores until the save count is `count`, closing every layer opened above it.
    pub fn restore_to_count(&mut self, count: u32) {
        let count = count.max(1);
        while self.save_count() > count {
            self.restore();
        }
    }

    fn push_sub_layer(&mut self, layer: HwLayer, paint: Paint, filter: Option<HwFilter>) {
        let flip_y = self.device.capabilities().flip_y_for_sampled_layers;
        let sub = match filter {
            Some(filter) => HwSubLayer::with_filter(layer, paint, flip_y, filter),
            None => HwSubLayer::new(layer, paint, flip_y),
        };
        self.layers.push(sub);
    }

    fn close_top_layer(&mut self) {
        let Some(sub) = self.layers.pop() else {
            return;
        };
        let bounds = sub.output_bounds();
        if let Some(parent) = self.current_layer_mut() {
            parent.add_draw(HwDraw::Layer(Box::new(sub)), Some(bounds));
        }
    }

    // Clips.

    pub fn clip_rect(&mut self, rect: &Rect, op: ClipOp) {
        let matrix = self.total_matrix();
        if op == ClipOp::Difference || matrix.has_rotation() {
            self.clip_path(&Path::rect(rect), op);
            return;
        }
        if let Some(layer) = self.current_layer_mut() {
            layer.add_rect_clip(rect, &matrix);
        }
    }

    pub fn clip_path(&mut self, path: &Path, op: ClipOp) {
        let matrix = self.total_matrix();
        let Some(layer) = self.current_layer_mut() else {
            return;
        };
        if op != ClipOp::Difference {
            layer.add_rect_clip(&path.bounds(), &matrix);
        }
        let id = layer.next_clip_id();
        let clip = HwDynamicPathClip::new(id, matrix, path.clone(), op, layer.bounds());
        layer.add_clip(clip);
    }

    // Draws.

    /// Whether `bounds`, in local coordinates, lies entirely outside the current clip.
    pub fn quick_reject(&self, bounds: &Rect) -> bool {
        let Some(layer) = self.current_layer() else {
            return true;
        };
        let clip = layer.state().current_clip_bounds();
        if clip.is_empty() || !bounds.is_finite() {
            return true;
        }
        let physical = (layer.bounds_to_physical() * self.total_matrix()).map_rect(bounds);
        !physical.intersects(&clip)
    }

    pub fn draw_path(&mut self, path: &Path, paint: &Paint) {
        if self.current_layer().is_none() || path.is_empty() {
            return;
        }
        if let Some(Shader::Image(ImageShader { image: Image::Texture(texture), .. })) = paint.shader.as_deref() {
            if texture.gpu_texture().is_none() {
                return;
            }
        }
        let bounds = paint.compute_fast_bounds(&path.bounds());
        if self.quick_reject(&bounds) {
            return;
        }
        if paint.needs_offscreen_layer() {
            self.draw_filtered(&path.bounds(), paint, |canvas, working| {
                let transform = canvas.total_matrix();
                canvas.draw_path_internal(path, working, &transform);
            });
            return;
        }
        let transform = self.total_matrix();
        self.draw_path_internal(path, paint, &transform);
    }

    /// Runs `draw` inside a layer that applies `paint`'s mask and image filters when it is
    /// composited. `draw` gets `paint` without its filters; the composite keeps the blend
    /// mode and color filter. `local_bounds` is the unfiltered extent of the draw.
    fn draw_filtered(&mut self, local_bounds: &Rect, paint: &Paint, draw: impl FnOnce(&mut Self, &Paint)) {
        let matrix = self.total_matrix();
        let mut working = paint.clone();
        working.mask_filter = None;
        working.image_filter = None;
        working.color_filter = None;
        working.blend_mode = BlendMode::SrcOver;
        let layer_bounds = working.compute_fast_bounds(local_bounds);

        let mut restore = paint.clone();
        restore.style = PaintStyle::Fill;
        restore.shader = None;
        restore.set_alpha(1.0);
        let filter = HwFilter::from_paint(&restore, &matrix, self.ctx_scale);
        let Some(layer) = self.gen_layer(Some(&layer_bounds), &matrix, filter.as_ref()) else {
            debug!("filtered draw has no layer, skipping");
            return;
        };
        self.push_sub_layer(layer, restore, filter);
        draw(self, &working);
        self.close_top_layer();
    }

    /// Records the fill and stroke of `path` as separate draws, fill first.
    fn draw_path_internal(&mut self, path: &Path, paint: &Paint, transform: &Matrix) {
        let need_fill = paint.style != PaintStyle::Stroke;
        let need_stroke = paint.style != PaintStyle::Fill;
        let need_contour_aa = self.enable_contour_aa && !self.enable_msaa && paint.anti_alias;
        let Some(layer) = self.current_layer_mut() else {
            return;
        };

        if need_fill {
            let mut fill = paint.clone();
            fill.style = PaintStyle::Fill;
            fill.anti_alias = need_contour_aa;
            let draw = HwDynamicPathDraw::new(*transform, path.clone(), fill, false);
            layer.add_draw(HwDraw::Path(draw), Some(path.bounds()));
        }
        if need_stroke {
            let mut stroke = paint.clone();
            stroke.style = PaintStyle::Stroke;
            stroke.anti_alias = need_contour_aa;
            let bounds = stroke.compute_fast_stroke_bounds(&path.bounds());
            let draw = HwDynamicPathDraw::new(*transform, path.clone(), stroke, true);
            layer.add_draw(HwDraw::Path(draw), Some(bounds));
        }
    }

    pub fn draw_rect(&mut self, rect: &Rect, paint: &Paint) {
        self.draw_path(&Path::rect(rect), paint);
    }

    /// Only stroking paints draw anything.
    pub fn draw_line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, paint: &Paint) {
        if paint.style != PaintStyle::Stroke {
            return;
        }
        self.draw_path(&Path::line(point(x0, y0), point(x1, y1)), paint);
    }

    /// Fills the whole current layer.
    pub fn draw_paint(&mut self, paint: &Paint) {
        let Some(layer) = self.current_layer() else {
            return;
        };
        let Some(inverse) = self.total_matrix().invert() else {
            return;
        };
        let rect = inverse.map_rect(&layer.bounds());
        let mut fill = paint.clone();
        fill.style = PaintStyle::Fill;
        self.draw_rect(&rect, &fill);
    }

    /// Paints without a shader go through the instanced rrect draw, everything else is
    /// drawn as a path.
    pub fn draw_rrect(&mut self, rrect: &RRect, paint: &Paint) {
        if paint.shader.is_some() {
            self.draw_path(&Path::rrect(rrect), paint);
            return;
        }
        if self.quick_reject(&paint.compute_fast_bounds(&rrect.rect)) {
            return;
        }
        if paint.needs_offscreen_layer() {
            self.draw_filtered(&rrect.rect, paint, |canvas, working| canvas.draw_rrect(rrect, working));
            return;
        }
        let bounds = paint.compute_fast_bounds(&rrect.rect);
        let transform = self.total_matrix();
        let mut paint = paint.clone();
        paint.anti_alias = paint.anti_alias && !self.enable_msaa;
        if let Some(layer) = self.current_layer_mut() {
            let draw = HwDynamicRRectDraw::new(transform, *rrect, paint);
            layer.add_draw(HwDraw::RRect(draw), Some(bounds));
        }
    }

    pub fn draw_circle(&mut self, cx: f32, cy: f32, radius: f32, paint: &Paint) {
        let oval = Rect::new(cx - radius, cy - radius, cx + radius, cy + radius);
        self.draw_rrect(&RRect::from_oval(oval), paint);
    }

    /// Draws the `src` part of `image` into `dst`. Nothing outside `src` is sampled.
    pub fn draw_image_rect(&mut self, image: &Image, src: &Rect, dst: &Rect, sampling: SamplingOptions, paint: Option<&Paint>) {
        if src.width() == 0.0 || src.height() == 0.0 || dst.width() == 0.0 || dst.height() == 0.0 {
            return;
        }
        let mut paint = paint.cloned().unwrap_or_default();
        paint.style = PaintStyle::Fill;
        let local_matrix = Matrix::translate(dst.left, dst.top)
            * Matrix::scale(dst.width() / src.width(), dst.height() / src.height())
            * Matrix::translate(-src.left, -src.top);
        paint.shader = Some(Arc::new(Shader::Image(ImageShader {
            image: image.clone(),
            sampling,
            tile_x: TileMode::Decal,
            tile_y: TileMode::Decal,
            local_matrix,
        })));
        self.draw_path(&Path::rect(dst), &paint);
    }

    pub fn draw_image(&mut self, image: &Image, x: f32, y: f32, sampling: SamplingOptions, paint: Option<&Paint>) {
        let (w, h) = (image.width() as f32, image.height() as f32);
        self.draw_image_rect(image, &Rect::from_wh(w, h), &Rect::from_xywh(x, y, w, h), sampling, paint);
    }

    /// Draws `glyphs` at `positions`, both relative to `origin`.
    pub fn draw_glyphs(&mut self, glyphs: &[GlyphId], positions: &[Point], origin: Point, font: &Font, paint: &Paint) {
        if self.current_layer().is_none() || glyphs.is_empty() {
            return;
        }
        let transform = self.total_matrix();
        let run = TextRun {
            glyphs,
            positions,
            origin,
            font,
        };
        let resources = self.resources.clone();
        let runs = {
            let mut res = resources.borrow_mut();
            let res = &mut *res;
            GlyphRun::make(&run, paint, self.ctx_scale, &transform, &mut res.atlas_manager, &res.text_control)
        };

        for glyph_run in runs {
            match glyph_run {
                GlyphRun::Atlas(atlas_run) => {
                    let draw = atlas_run.draw(&mut resources.borrow_mut().atlas_manager, self.enable_text_linear_filter);
                    let mut bounds = atlas_run.local_bounds();
                    if atlas_run.is_stroke() {
                        bounds = paint.compute_fast_stroke_bounds(&bounds);
                    }
                    if let Some(layer) = self.current_layer_mut() {
                        layer.add_draw(draw, Some(bounds));
                    }
                }
                GlyphRun::Path { path, paint } => self.draw_path_internal(&path, &paint, &transform),
            }
        }
    }

    /// Renders everything recorded since `begin_new_frame` and ends the frame. Layers still
    /// open are closed first.
    pub fn flush(&mut self) {
        let _span = trace_span!("canvas_flush").entered();
        self.restore_to_count(1);
        let Some(mut root) = self.root.take() else {
            return;
        };
        if root.layer().is_empty() {
            return;
        }

        let mut guard = self.resources.borrow_mut();
        let res = &mut *guard;
        let device = res.device.clone();
        {
            let mut pool = Pool::new(&res.render_targets);
            let bounds = root.layer().bounds();
            let mut ctx = HwDrawContext {
                device: &device,
                stage_buffer: &mut res.stage_buffer,
                static_buffer: &mut res.static_buffer,
                pipeline_lib: &mut res.pipeline_lib,
                texture_manager: &res.texture_manager,
                pool: &mut pool,
                options: &res.options,
                mvp: Mat4::ortho(bounds.left, bounds.right, bounds.bottom, bounds.top),
                total_clip_depth: root.layer().state().draw_depth() + 1,
                scale: Vec2::new(self.ctx_scale, self.ctx_scale),
                ctx_scale: self.ctx_scale,
            };
            #[cfg(feature = "render_metrics")]
            let (started_at, mut timings) = (std::time::Instant::now(), crate::metrics::FlushTimings::default());
            #[cfg(feature = "render_metrics")]
            let mut phase = started_at;
            #[cfg(feature = "render_metrics")]
            let mut lap = |slot: &mut std::time::Duration| {
                let now = std::time::Instant::now();
                *slot = now - phase;
                phase = now;
            };

            root.prepare(&mut ctx);
            #[cfg(feature = "render_metrics")]
            lap(&mut timings.prepare);
            root.generate_command(&mut ctx);
            #[cfg(feature = "render_metrics")]
            lap(&mut timings.generate_command);
            ctx.stage_buffer.flush();
            ctx.static_buffer.flush();
            #[cfg(feature = "render_metrics")]
            lap(&mut timings.upload);
            root.draw(device.as_ref());
            #[cfg(feature = "render_metrics")]
            {
                lap(&mut timings.encode_and_submit);
                timings.total = started_at.elapsed();
                self.metrics.record(started_at, timings);
            }
        }
        res.render_targets.borrow_mut().purge_as_needed();
        self.matrices = vec![Matrix::identity()];
    }
}

impl std::fmt::Debug for HwCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HwCanvas")
            .field("ctx_scale", &self.ctx_scale)
            .field("sample_count", &self.sample_count)
            .field("save_count", &self.save_count())
            .field("open_layers", &self.layers.len())
            .field("recording", &self.root.is_some())
            .finish_non_exhaustive()
    }
}
