//! Splitting a positioned glyph run into draws.
//!
//! [`GlyphRun::make`] asks [`TextRenderControl`] for a tier, then builds one atlas run per
//! glyph group (a text draw can only bind the four textures of one group) or one path run
//! per glyph.

use tracing::trace_span;

use crate::geometry::{Matrix, Point, Rect};
use crate::hw::draw::{HwDynamicSdfTextDraw, HwDynamicTextDraw, TextFragmentKind};
use crate::hw::HwDraw;
use crate::paint::{FilterMode, Paint, PaintStyle, Shader};
use crate::path::Path;
use crate::shader::fragment::{
    ColorEmojiFragment, ColorTextFragment, GradientTextFragment, SdfColorTextFragment, TextTextures,
};
use crate::shader::geometry::GlyphRect;
use crate::shader::{WgslFragment, WgxFilter};

use super::atlas::{Atlas, AtlasFormat, AtlasManager, GlyphRegion};
use super::control::TextRenderControl;
use super::font::{Font, GlyphFormat, GlyphId};

/// Glyphs positioned relative to `origin`, in canvas units.
#[derive(Debug, Clone, Copy)]
pub struct TextRun<'a> {
    pub glyphs: &'a [GlyphId],
    pub positions: &'a [Point],
    pub origin: Point,
    pub font: &'a Font,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AtlasTier {
    Direct,
    Sdf,
}

/// Glyph quads of one atlas group.
///
/// Direct quads are already in canvas space and draw with an identity transform. SDF quads
/// are relative to the run origin and draw with the run's transform.
#[derive(Debug, Clone)]
pub struct AtlasGlyphRun {
    tier: AtlasTier,
    format: AtlasFormat,
    glyph_format: GlyphFormat,
    group: u32,
    rects: Vec<GlyphRect>,
    transform: Matrix,
    paint: Paint,
    is_stroke: bool,
}

impl AtlasGlyphRun {
    pub fn is_sdf(&self) -> bool {
        self.tier == AtlasTier::Sdf
    }

    pub fn group(&self) -> u32 {
        self.group
    }

    pub fn glyph_count(&self) -> usize {
        self.rects.len()
    }

    pub fn is_stroke(&self) -> bool {
        self.is_stroke
    }

    pub fn transform(&self) -> Matrix {
        self.transform
    }

    /// Union of the glyph quads before [`transform`](Self::transform).
    pub fn local_bounds(&self) -> Rect {
        self.rects.iter().fold(Rect::empty(), |mut bounds, glyph| {
            bounds.join(&glyph.rect);
            bounds
        })
    }

    /// Uploads the group's dirty bitmaps and builds the text draw.
    pub fn draw(&self, atlas_manager: &mut AtlasManager, linear_filter: bool) -> HwDraw {
        let _span = trace_span!("glyph_run_draw", glyphs = self.rects.len(), sdf = self.is_sdf()).entered();
        let atlas = atlas_manager.get_atlas(self.format);
        atlas.upload_atlas(self.group);
        let filter = if linear_filter || self.is_sdf() {
            FilterMode::Linear
        } else {
            FilterMode::Nearest
        };
        let textures = TextTextures {
            textures: atlas.textures(self.group),
            sampler: atlas.sampler(self.group, filter),
        };
        let color_filter = self.paint.color_filter.as_deref().map(WgxFilter::make);

        if self.is_sdf() {
            let mut fragment = SdfColorTextFragment::new(textures, self.paint.fill_color);
            if let Some(filter) = color_filter {
                fragment.set_filter(filter);
            }
            return HwDraw::SdfText(HwDynamicSdfTextDraw::new(
                self.transform,
                self.paint.blend_mode,
                self.rects.clone(),
                fragment,
            ));
        }

        let mut kind = if self.format == AtlasFormat::Rgba32 {
            TextFragmentKind::Emoji(ColorEmojiFragment::new(
                textures,
                self.glyph_format == GlyphFormat::Bgra32,
                self.paint.alpha(),
            ))
        } else if let Some(gradient) = self.paint.shader.as_deref().and_then(Shader::as_gradient) {
            // Quads are in canvas space, so gradient space is reached through the canvas
            // matrix as well as the shader's own.
            let inv_matrix = (self.transform * gradient.local_matrix).invert().unwrap_or_default();
            TextFragmentKind::Gradient {
                fragment: GradientTextFragment::new(textures, gradient, self.paint.alpha()),
                inv_matrix,
            }
        } else {
            let color = if self.is_stroke {
                self.paint.stroke_color
            } else {
                self.paint.fill_color
            };
            TextFragmentKind::Color(ColorTextFragment::new(textures, color))
        };
        if let Some(filter) = color_filter {
            match &mut kind {
                TextFragmentKind::Color(f) => f.set_filter(filter),
                TextFragmentKind::Emoji(f) => f.set_filter(filter),
                TextFragmentKind::Gradient { fragment, .. } => fragment.set_filter(filter),
            }
        }
        HwDraw::Text(HwDynamicTextDraw::new(
            Matrix::identity(),
            self.paint.blend_mode,
            self.rects.clone(),
            kind,
        ))
    }
}

#[derive(Debug, Clone)]
pub enum GlyphRun {
    Atlas(AtlasGlyphRun),
    /// One glyph outline, already placed, to be drawn like any other path.
    Path { path: Path, paint: Paint },
}

impl GlyphRun {
    /// Splits `run` into atlas runs or path runs. `transform` is the canvas matrix and
    /// `context_scale` the surface's physical pixels per canvas unit.
    pub fn make(
        run: &TextRun<'_>,
        paint: &Paint,
        context_scale: f32,
        transform: &Matrix,
        atlas_manager: &mut AtlasManager,
        control: &TextRenderControl,
    ) -> Vec<GlyphRun> {
        let _span = trace_span!("glyph_run_make", glyphs = run.glyphs.len()).entered();
        let typeface = run.font.typeface().as_ref();
        let max_scale = (transform.max_scale() * context_scale).abs();
        let device_size = run.font.size() * max_scale;

        if control.can_use_direct(device_size, transform, paint, typeface) {
            let glyph_format = typeface.glyph_format();
            if glyph_format != GlyphFormat::A8 {
                let mut fill = paint.clone();
                fill.style = PaintStyle::Fill;
                return direct_runs(run, &fill, false, glyph_format, context_scale, transform, atlas_manager);
            }
            let mut runs = Vec::new();
            if paint.style != PaintStyle::Stroke {
                let mut fill = paint.clone();
                fill.style = PaintStyle::Fill;
                runs.extend(direct_runs(run, &fill, false, glyph_format, context_scale, transform, atlas_manager));
            }
            if paint.style != PaintStyle::Fill {
                let mut stroke = paint.clone();
                stroke.style = PaintStyle::Stroke;
                runs.extend(direct_runs(run, &stroke, true, glyph_format, context_scale, transform, atlas_manager));
            }
            runs
        } else if control.can_use_sdf(device_size, paint, typeface) {
            sdf_runs(run, paint, context_scale, transform, atlas_manager)
        } else {
            path_runs(run, paint)
        }
    }
}

/// Looks every glyph up and buckets the ones with pixels by atlas group.
fn collect_regions(
    run: &TextRun<'_>,
    atlas: &mut Atlas,
    paint: &Paint,
    load_sdf: bool,
    context_scale: f32,
    transform: &Matrix,
) -> Vec<Vec<(usize, GlyphRegion)>> {
    let per_atlas = atlas.config().max_num_bitmap_per_atlas;
    let mut groups: Vec<Vec<(usize, GlyphRegion)>> = Vec::new();
    for (index, glyph) in run.glyphs.iter().enumerate() {
        let region = atlas.get_glyph_region(run.font, *glyph, paint, load_sdf, context_scale, transform);
        if !region.slot.region.has_area() {
            continue;
        }
        let group = (region.index_in_group / per_atlas) as usize;
        if groups.len() <= group {
            groups.resize_with(group + 1, Vec::new);
        }
        groups[group].push((index, region));
    }
    groups
}

fn glyph_uv(atlas: &Atlas, region: &GlyphRegion) -> ([f32; 2], [f32; 2]) {
    let r = region.slot.region;
    let lt = atlas.calculate_uv(region.index_in_group, r.x as u32, r.y as u32);
    let rb = atlas.calculate_uv(region.index_in_group, r.right() as u32, r.bottom() as u32);
    ([lt.x, lt.y], [rb.x, rb.y])
}

fn atlas_format_for(glyph_format: GlyphFormat) -> AtlasFormat {
    match glyph_format {
        GlyphFormat::A8 => AtlasFormat::A8,
        GlyphFormat::Rgba32 | GlyphFormat::Bgra32 => AtlasFormat::Rgba32,
    }
}

fn direct_runs(
    run: &TextRun<'_>,
    paint: &Paint,
    is_stroke: bool,
    glyph_format: GlyphFormat,
    context_scale: f32,
    transform: &Matrix,
    atlas_manager: &mut AtlasManager,
) -> Vec<GlyphRun> {
    let format = atlas_format_for(glyph_format);
    let atlas = atlas_manager.get_atlas(format);
    let groups = collect_regions(run, atlas, paint, false, context_scale, transform);

    let mut runs = Vec::with_capacity(groups.len());
    for (group, regions) in groups.into_iter().enumerate() {
        if regions.is_empty() {
            continue;
        }
        let rects = regions
            .iter()
            .filter_map(|(index, region)| {
                let position = run.positions.get(*index)?;
                let device = transform.map_xy(run.origin.x + position.x, run.origin.y + position.y);
                let (uv_lt, uv_rb) = glyph_uv(atlas, region);
                let x = device.x + region.slot.origin_x / context_scale;
                let y = device.y - region.slot.origin_y / context_scale;
                let w = (uv_rb[0] - uv_lt[0]) / context_scale;
                let h = (uv_rb[1] - uv_lt[1]) / context_scale;
                Some(GlyphRect {
                    rect: Rect::from_xywh(x, y, w, h),
                    uv_lt,
                    uv_rb,
                })
            })
            .collect();
        runs.push(GlyphRun::Atlas(AtlasGlyphRun {
            tier: AtlasTier::Direct,
            format,
            glyph_format,
            group: group as u32,
            rects,
            transform: *transform,
            paint: paint.clone(),
            is_stroke,
        }));
    }
    runs
}

fn sdf_runs(
    run: &TextRun<'_>,
    paint: &Paint,
    context_scale: f32,
    transform: &Matrix,
    atlas_manager: &mut AtlasManager,
) -> Vec<GlyphRun> {
    let atlas = atlas_manager.get_atlas(AtlasFormat::A8);
    let groups = collect_regions(run, atlas, paint, true, context_scale, transform);
    let run_transform = *transform * Matrix::translate(run.origin.x, run.origin.y);

    let mut runs = Vec::with_capacity(groups.len());
    for (group, regions) in groups.into_iter().enumerate() {
        if regions.is_empty() {
            continue;
        }
        let rects = regions
            .iter()
            .filter_map(|(index, region)| {
                let position = run.positions.get(*index)?;
                let (uv_lt, uv_rb) = glyph_uv(atlas, region);
                let scale = region.scale / context_scale;
                let x = position.x + region.slot.origin_x * scale;
                let y = position.y - region.slot.origin_y * scale;
                Some(GlyphRect {
                    rect: Rect::from_xywh(x, y, (uv_rb[0] - uv_lt[0]) * scale, (uv_rb[1] - uv_lt[1]) * scale),
                    uv_lt,
                    uv_rb,
                })
            })
            .collect();
        runs.push(GlyphRun::Atlas(AtlasGlyphRun {
            tier: AtlasTier::Sdf,
            format: AtlasFormat::A8,
            glyph_format: GlyphFormat::A8,
            group: group as u32,
            rects,
            transform: run_transform,
            paint: paint.clone(),
            is_stroke: false,
        }));
    }
    runs
}

fn path_runs(run: &TextRun<'_>, paint: &Paint) -> Vec<GlyphRun> {
    let typeface = run.font.typeface();
    run.glyphs
        .iter()
        .zip(run.positions)
        .filter_map(|(glyph, position)| {
            let path = typeface.glyph_path(*glyph, run.font.size())?;
            if path.is_empty() {
                return None;
            }
            let placed = Matrix::translate(run.origin.x + position.x, run.origin.y + position.y);
            Some(GlyphRun::Path {
                path: path.transformed(&placed),
                paint: paint.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::color::Color;
    use crate::config::TextRenderConfig;
    use crate::geometry::point;
    use crate::gpu::headless::HeadlessDevice;
    use crate::text::font::{GlyphImage, GlyphMetrics, ScalerContextDesc, Typeface};

    /// Square glyphs as large as the device text size; glyph 0 is a space.
    #[derive(Debug)]
    struct SquareFace {
        colorful: bool,
    }

    impl Typeface for SquareFace {
        fn id(&self) -> u32 {
            11
        }

        fn contains_color_table(&self) -> bool {
            self.colorful
        }

        fn glyph_metrics(&self, _: GlyphId, size: f32) -> GlyphMetrics {
            GlyphMetrics {
                advance_x: size,
                width: size,
                height: size,
                hori_bearing_y: size,
                ..Default::default()
            }
        }

        fn glyph_image(&self, glyph: GlyphId, desc: &ScalerContextDesc) -> Option<GlyphImage> {
            if glyph == 0 {
                return None;
            }
            let side = (desc.text_size * desc.context_scale * desc.transform[0]) as u32;
            let bpp = if self.colorful { 4 } else { 1 };
            Some(GlyphImage {
                width: side,
                height: side,
                origin_x: 0.0,
                origin_y: side as f32,
                pixels: vec![255; (side * side * bpp) as usize],
            })
        }

        fn glyph_path(&self, glyph: GlyphId, size: f32) -> Option<Path> {
            (glyph != 0).then(|| Path::rect(&Rect::new(0.0, -size, size, 0.0)))
        }
    }

    struct Setup {
        manager: AtlasManager,
        control: TextRenderControl,
        font: Font,
    }

    fn setup(size: f32, colorful: bool) -> Setup {
        let config = TextRenderConfig::default();
        Setup {
            manager: AtlasManager::new(Arc::new(HeadlessDevice::default()), 0, config),
            control: TextRenderControl::new(config),
            font: Font::new(Arc::new(SquareFace { colorful }), size),
        }
    }

    const GLYPHS: [GlyphId; 3] = [1, 0, 2];

    fn positions() -> [Point; 3] {
        [point(0.0, 0.0), point(20.0, 0.0), point(40.0, 0.0)]
    }

    fn make(setup: &mut Setup, paint: &Paint, transform: &Matrix) -> Vec<GlyphRun> {
        let positions = positions();
        let run = TextRun {
            glyphs: &GLYPHS,
            positions: &positions,
            origin: point(10.0, 50.0),
            font: &setup.font,
        };
        GlyphRun::make(&run, paint, 1.0, transform, &mut setup.manager, &setup.control)
    }

    fn atlas_runs(runs: &[GlyphRun]) -> Vec<&AtlasGlyphRun> {
        runs.iter()
            .filter_map(|run| match run {
                GlyphRun::Atlas(run) => Some(run),
                GlyphRun::Path { .. } => None,
            })
            .collect()
    }

    #[test]
    fn small_text_uses_the_direct_atlas_and_skips_blank_glyphs() {
        let mut setup = setup(12.0, false);
        let runs = make(&mut setup, &Paint::fill(Color::BLACK), &Matrix::identity());
        let atlas = atlas_runs(&runs);
        assert_eq!(atlas.len(), 1);
        assert!(!atlas[0].is_sdf());
        assert_eq!(atlas[0].glyph_count(), 2);
        // Baseline at y = 50, glyph top 12 px above it.
        assert_eq!(atlas[0].local_bounds(), Rect::new(10.0, 38.0, 62.0, 50.0));

        let HwDraw::Text(draw) = atlas[0].draw(&mut setup.manager, false) else {
            panic!("expected a text draw");
        };
        assert_eq!(draw.glyph_count(), 2);
    }

    #[test]
    fn stroke_and_fill_text_draws_fill_then_stroke() {
        let mut setup = setup(12.0, false);
        let mut paint = Paint::fill(Color::BLACK);
        paint.style = PaintStyle::StrokeAndFill;
        paint.stroke_width = 2.0;
        let runs = make(&mut setup, &paint, &Matrix::identity());
        let strokes: Vec<bool> = atlas_runs(&runs).iter().map(|run| run.is_stroke()).collect();
        assert_eq!(strokes, vec![false, true]);
    }

    #[test]
    fn color_fonts_only_fill() {
        let mut setup = setup(12.0, true);
        let runs = make(&mut setup, &Paint::stroke(Color::BLACK, 1.0), &Matrix::identity());
        let atlas = atlas_runs(&runs);
        assert_eq!(atlas.len(), 1);
        assert!(!atlas[0].is_stroke());
        assert_eq!(setup.manager.get_atlas(AtlasFormat::Rgba32).bitmap_count(), 1);
    }

    #[test]
    fn large_text_switches_to_distance_fields() {
        let mut setup = setup(170.0, false);
        let runs = make(&mut setup, &Paint::fill(Color::BLACK), &Matrix::identity());
        let atlas = atlas_runs(&runs);
        assert_eq!(atlas.len(), 1);
        assert!(atlas[0].is_sdf());
        assert_eq!(atlas[0].transform(), Matrix::translate(10.0, 50.0));
        assert!(matches!(atlas[0].draw(&mut setup.manager, false), HwDraw::SdfText(_)));
    }

    #[test]
    fn huge_text_falls_back_to_paths() {
        let mut setup = setup(100.0, false);
        let runs = make(&mut setup, &Paint::fill(Color::BLACK), &Matrix::scale(4.0, 4.0));
        assert_eq!(runs.len(), 2);
        let GlyphRun::Path { path, .. } = &runs[1] else {
            panic!("expected a path run");
        };
        assert_eq!(path.bounds(), Rect::new(50.0, -50.0, 150.0, 50.0));
        assert_eq!(setup.manager.get_atlas(AtlasFormat::A8).bitmap_count(), 0);
    }
}
