//! Glyph atlases.
//!
//! An [`Atlas`] owns a growing list of CPU bitmaps ("generations"). Every sixteen bitmaps (or
//! sixty-four with the larger layout) form a group that maps onto the four textures one text
//! draw can bind: each texture holds a 2x2 or 4x4 grid of bitmaps. Glyph quads address a
//! texel with `u | texture_index << 14` so the fragment shader can pick the texture.

use std::sync::Arc;

use tracing::{debug, trace_span};

use crate::config::TextRenderConfig;
use crate::geometry::{Matrix, Vec2};
use crate::gpu::{GpuDevice, GpuSampler, GpuTexture, SamplerDescriptor, TextureFormat};
use crate::paint::{FilterMode, Paint, StrokeCap, StrokeJoin};

use super::bitmap::{AtlasBitmap, GlyphSlot};
use super::font::{Font, GlyphId, GlyphImage, ScalerContextDesc};
use super::sdf::{Image, SdfGen, DF_PAD};
use super::texture_array::AtlasTextureArray;

/// Textures bound by one text draw. Matches the four texture slots of the text fragments.
pub const MAX_NUM_TEXTURE_PER_ATLAS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtlasFormat {
    A8 = 0,
    Rgba32 = 1,
}

impl AtlasFormat {
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            AtlasFormat::A8 => 1,
            AtlasFormat::Rgba32 => 4,
        }
    }

    pub const fn texture_format(self) -> TextureFormat {
        match self {
            AtlasFormat::A8 => TextureFormat::R8Unorm,
            AtlasFormat::Rgba32 => TextureFormat::Rgba8Unorm,
        }
    }
}

/// Bitmap and texture geometry of an atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasConfig {
    pub max_num_bitmap_per_texture: u32,
    pub max_num_bitmap_per_atlas: u32,
    pub col_mask: u32,
    pub row_mask: u32,
    pub row_shift: u32,
    pub max_bitmap_size: u32,
    pub max_texture_size: u32,
}

impl AtlasConfig {
    pub fn new(format: AtlasFormat, enable_larger_atlas: bool) -> Self {
        let per_texture = if enable_larger_atlas { 16 } else { 4 };
        let small = per_texture == 4;
        let max_bitmap_size = match format {
            AtlasFormat::A8 => 512,
            AtlasFormat::Rgba32 => 256,
        };
        Self {
            max_num_bitmap_per_texture: per_texture,
            max_num_bitmap_per_atlas: per_texture * MAX_NUM_TEXTURE_PER_ATLAS as u32,
            col_mask: if small { 0x1 } else { 0x3 },
            row_mask: if small { 0x2 } else { 0xC },
            row_shift: if small { 1 } else { 2 },
            max_bitmap_size,
            max_texture_size: max_bitmap_size * if small { 2 } else { 4 },
        }
    }

    /// Texture slot and top-left texel of bitmap `index` inside its group.
    fn placement(&self, index: u32) -> (u32, u32, u32) {
        let texture_index = (index % self.max_num_bitmap_per_atlas) / self.max_num_bitmap_per_texture;
        let in_texture = index % self.max_num_bitmap_per_texture;
        let start_x = self.max_bitmap_size * (in_texture & self.col_mask);
        let start_y = self.max_bitmap_size * ((in_texture & self.row_mask) >> self.row_shift);
        (texture_index, start_x, start_y)
    }
}

/// Cache key of a rasterized glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlyphKey {
    pub glyph_id: GlyphId,
    pub desc: ScalerContextDesc,
}

/// Result of an atlas lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphRegion {
    /// Bitmap index; `index / max_num_bitmap_per_atlas` is the group.
    pub index_in_group: u32,
    pub slot: GlyphSlot,
    /// Device size over the distance-field size for SDF glyphs, 1 otherwise.
    pub scale: f32,
}

pub struct Atlas {
    format: AtlasFormat,
    device: Arc<dyn GpuDevice>,
    config: AtlasConfig,
    text_config: TextRenderConfig,
    bitmaps: Vec<AtlasBitmap>,
    current_bitmap_index: usize,
    texture_arrays: Vec<Option<AtlasTextureArray>>,
    least_used_index: usize,
}

impl Atlas {
    pub fn new(
        format: AtlasFormat,
        device: Arc<dyn GpuDevice>,
        enable_larger_atlas: bool,
        text_config: TextRenderConfig,
    ) -> Self {
        Self {
            format,
            device,
            config: AtlasConfig::new(format, enable_larger_atlas),
            text_config,
            bitmaps: Vec::new(),
            current_bitmap_index: 0,
            texture_arrays: Vec::new(),
            least_used_index: 0,
        }
    }

    pub fn format(&self) -> AtlasFormat {
        self.format
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn bitmap_count(&self) -> usize {
        self.bitmaps.len()
    }

    pub fn current_bitmap_index(&self) -> usize {
        self.current_bitmap_index
    }

    /// Finds or rasterizes `glyph_id`.
    ///
    /// SDF glyphs are rasterized at the nearest distance-field size at or above the device
    /// size, without the device transform, and report the ratio in [`GlyphRegion::scale`].
    pub fn get_glyph_region(
        &mut self,
        font: &Font,
        glyph_id: GlyphId,
        paint: &Paint,
        load_sdf: bool,
        context_scale: f32,
        transform: &Matrix,
    ) -> GlyphRegion {
        let mut desc = ScalerContextDesc::new(font, paint, context_scale, transform);
        let mut scale = 1.0;
        if load_sdf {
            let text_size = font.size() * context_scale;
            let tier = if text_size <= self.text_config.small_df_font_size {
                self.text_config.small_df_font_size
            } else if text_size <= self.text_config.medium_df_font_size {
                self.text_config.medium_df_font_size
            } else {
                self.text_config.large_df_font_size
            };
            scale = text_size / tier;
            desc.text_size = tier;
            desc.transform = [1.0, 0.0, 0.0, 1.0];
            desc.context_scale = 1.0;
            // Distance fields are always generated from the filled outline.
            desc.stroke_width = 0.0;
            desc.miter_limit = Paint::DEFAULT_MITER_LIMIT;
            desc.cap = StrokeCap::default();
            desc.join = StrokeJoin::default();
        }
        let key = GlyphKey { glyph_id, desc };

        for (index, bitmap) in self.bitmaps.iter().enumerate() {
            if let Some(slot) = bitmap.glyph_slot(&key) {
                return GlyphRegion {
                    index_in_group: index as u32,
                    slot,
                    scale,
                };
            }
        }

        let (index, slot) = self.generate_glyph_region(font, key, load_sdf);
        GlyphRegion {
            index_in_group: index as u32,
            slot,
            scale,
        }
    }

    fn generate_glyph_region(&mut self, font: &Font, key: GlyphKey, load_sdf: bool) -> (usize, GlyphSlot) {
        let _span = trace_span!("atlas_generate_glyph", glyph = key.glyph_id).entered();
        let image = font
            .typeface()
            .glyph_image(key.glyph_id, &key.desc)
            .unwrap_or_default();
        let image = if load_sdf && !image.is_empty() {
            match sdf_image(&image) {
                Some(sdf) => sdf,
                None => {
                    debug!(glyph = key.glyph_id, "glyph image is not an 8-bit mask, skipping SDF");
                    GlyphImage::default()
                }
            }
        } else {
            image
        };
        self.insert_glyph(key, &image)
    }

    fn insert_glyph(&mut self, key: GlyphKey, image: &GlyphImage) -> (usize, GlyphSlot) {
        let size = self.config.max_bitmap_size;
        loop {
            if self.current_bitmap_index >= self.bitmaps.len() {
                self.current_bitmap_index = self.bitmaps.len();
                self.bitmaps
                    .push(AtlasBitmap::new(size, size, self.format.bytes_per_pixel()));
            }
            let slot = self.bitmaps[self.current_bitmap_index].generate_glyph_region(key, image);
            if slot.region.is_valid() {
                return (self.current_bitmap_index, slot);
            }
            debug!(generation = self.bitmaps.len(), "atlas bitmap full, starting a new one");
            self.current_bitmap_index = self.bitmaps.len();
        }
    }

    /// Uploads the dirty rows of every bitmap in `group`.
    pub fn upload_atlas(&mut self, group: u32) {
        let _span = trace_span!("atlas_upload", group).entered();
        let per_atlas = self.config.max_num_bitmap_per_atlas as usize;
        let start = group as usize * per_atlas;
        let end = self.bitmaps.len().min(start + per_atlas);
        let size = self.config.max_bitmap_size;
        let bpp = self.format.bytes_per_pixel() as usize;

        for index in start..end {
            let Some([_, top, _, bottom]) = self.bitmaps[index].dirty_rect() else {
                continue;
            };
            let (texture_index, start_x, start_y) = self.config.placement(index as u32);
            self.texture_array(group as usize);
            let array = self.texture_arrays[group as usize].as_mut().expect("texture array created above");
            let offset = size as usize * top as usize * bpp;
            array.upload(
                texture_index as usize,
                start_x,
                start_y + top as u32,
                size,
                (bottom - top) as u32,
                &self.bitmaps[index].pixels()[offset..],
            );
            self.bitmaps[index].set_all_clean();
        }
    }

    fn texture_array(&mut self, group: usize) -> &mut AtlasTextureArray {
        if group >= self.texture_arrays.len() {
            self.texture_arrays.resize_with(group + 1, || None);
        }
        let (device, size, format) = (&self.device, self.config.max_texture_size, self.format.texture_format());
        self.texture_arrays[group].get_or_insert_with(|| AtlasTextureArray::new(device.clone(), size, format))
    }

    /// Texel coordinate of `(x, y)` in bitmap `index`, with the texture slot packed into
    /// bits 14 and 15 of `u`.
    pub fn calculate_uv(&self, index: u32, x: u32, y: u32) -> Vec2 {
        let (texture_index, start_x, start_y) = self.config.placement(index);
        let u = (start_x + x) | ((texture_index & 0x3) << 14);
        let v = start_y + y;
        Vec2::new(u as f32, v as f32)
    }

    pub fn textures(&mut self, group: u32) -> [Arc<dyn GpuTexture>; MAX_NUM_TEXTURE_PER_ATLAS] {
        self.texture_array(group as usize).textures()
    }

    pub fn sampler(&mut self, group: u32, filter: FilterMode) -> Arc<dyn GpuSampler> {
        let desc = SamplerDescriptor::from_filter(filter);
        self.texture_array(group as usize).sampler(&desc)
    }

    /// Drops every bitmap past the first group, keeping the most recent generations.
    ///
    /// With at least two groups the newest group moves to the front. Otherwise the
    /// overflow bitmaps are swapped into the least recently used slots of the first group.
    /// Survivors are marked dirty since their texture slot changed.
    pub fn clear_extra_res(&mut self) {
        let per_atlas = self.config.max_num_bitmap_per_atlas as usize;
        let len = self.bitmaps.len();
        if len > per_atlas {
            if len >= per_atlas * 2 {
                for i in 0..per_atlas {
                    self.bitmaps.swap(len - per_atlas + i, i);
                    self.bitmaps[i].set_all_dirty();
                }
                self.least_used_index = 0;
                self.current_bitmap_index = per_atlas - 1;
            } else {
                for i in per_atlas..len {
                    self.bitmaps[i].set_all_dirty();
                    self.bitmaps.swap(self.least_used_index, i);
                    if i == self.current_bitmap_index {
                        self.current_bitmap_index = self.least_used_index;
                    }
                    self.least_used_index = (self.least_used_index + 1) % per_atlas;
                }
            }
            self.bitmaps.truncate(per_atlas);
            debug!(format = ?self.format, dropped = len - per_atlas, "recycled atlas bitmaps");
        }
        self.texture_arrays.truncate(1);
    }
}

impl std::fmt::Debug for Atlas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atlas")
            .field("format", &self.format)
            .field("config", &self.config)
            .field("bitmaps", &self.bitmaps.len())
            .field("current_bitmap_index", &self.current_bitmap_index)
            .finish_non_exhaustive()
    }
}

fn sdf_image(image: &GlyphImage) -> Option<GlyphImage> {
    let mask = Image::from_vec(image.width as usize, image.height as usize, image.pixels.clone())?;
    let field = SdfGen::generate_sdf_image(&mask);
    let pad = DF_PAD as f32;
    Some(GlyphImage {
        width: field.width() as u32,
        height: field.height() as u32,
        origin_x: image.origin_x - pad,
        origin_y: image.origin_y + pad,
        pixels: field.into_vec(),
    })
}

/// The A8 and RGBA atlases of a context, created on first use.
pub struct AtlasManager {
    device: Arc<dyn GpuDevice>,
    larger_atlas_mask: u32,
    text_config: TextRenderConfig,
    atlases: [Option<Atlas>; 2],
}

impl std::fmt::Debug for AtlasManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasManager")
            .field("larger_atlas_mask", &self.larger_atlas_mask)
            .field("text_config", &self.text_config)
            .field("atlases", &self.atlases)
            .finish_non_exhaustive()
    }
}

impl AtlasManager {
    /// Bit `n` of `larger_atlas_mask` enables the 4x4 layout for the format with
    /// discriminant `n`.
    pub fn new(device: Arc<dyn GpuDevice>, larger_atlas_mask: u32, text_config: TextRenderConfig) -> Self {
        Self {
            device,
            larger_atlas_mask,
            text_config,
            atlases: [None, None],
        }
    }

    pub fn get_atlas(&mut self, format: AtlasFormat) -> &mut Atlas {
        let index = format as usize;
        let larger = self.larger_atlas_mask & (1 << index) != 0;
        let (device, text_config) = (&self.device, self.text_config);
        self.atlases[index].get_or_insert_with(|| Atlas::new(format, device.clone(), larger, text_config))
    }

    pub fn clear_extra_res(&mut self) {
        for atlas in self.atlases.iter_mut().flatten() {
            atlas.clear_extra_res();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::{HeadlessDevice, HeadlessTexture};
    use crate::path::Path;
    use crate::text::font::{GlyphMetrics, Typeface};

    /// Rasterizes every glyph as a solid square as large as the requested text size.
    #[derive(Debug)]
    struct SquareFace;

    impl Typeface for SquareFace {
        fn id(&self) -> u32 {
            3
        }

        fn glyph_metrics(&self, _: GlyphId, _: f32) -> GlyphMetrics {
            GlyphMetrics::default()
        }

        fn glyph_image(&self, _: GlyphId, desc: &ScalerContextDesc) -> Option<GlyphImage> {
            let side = desc.text_size as u32;
            Some(GlyphImage {
                width: side,
                height: side,
                origin_x: 0.0,
                origin_y: side as f32,
                pixels: vec![200; (side * side) as usize],
            })
        }

        fn glyph_path(&self, _: GlyphId, _: f32) -> Option<Path> {
            None
        }
    }

    fn atlas(device: Arc<HeadlessDevice>) -> Atlas {
        Atlas::new(AtlasFormat::A8, device, false, TextRenderConfig::default())
    }

    fn font(size: f32) -> Font {
        Font::new(Arc::new(SquareFace), size)
    }

    #[test]
    fn config_matches_the_texture_grid() {
        let small = AtlasConfig::new(AtlasFormat::A8, false);
        assert_eq!((small.max_bitmap_size, small.max_texture_size), (512, 1024));
        assert_eq!(small.max_num_bitmap_per_atlas, 16);
        let large = AtlasConfig::new(AtlasFormat::Rgba32, true);
        assert_eq!((large.max_bitmap_size, large.max_texture_size), (256, 1024));
        assert_eq!(large.max_num_bitmap_per_atlas, 64);
    }

    #[test]
    fn uv_packs_the_texture_slot_into_high_bits() {
        let atlas = atlas(Arc::new(HeadlessDevice::default()));
        assert_eq!(atlas.calculate_uv(5, 3, 7), Vec2::new((512 + 3 | 1 << 14) as f32, 7.0));
        assert_eq!(atlas.calculate_uv(6, 0, 0), Vec2::new((1 << 14) as f32, 512.0));
        // Bitmap 16 starts the second group at slot zero again.
        assert_eq!(atlas.calculate_uv(16, 1, 1), Vec2::new(1.0, 1.0));
    }

    #[test]
    fn glyphs_are_cached_by_key() {
        let mut atlas = atlas(Arc::new(HeadlessDevice::default()));
        let paint = Paint::default();
        let m = Matrix::identity();
        let a = atlas.get_glyph_region(&font(12.0), 1, &paint, false, 1.0, &m);
        let b = atlas.get_glyph_region(&font(12.0), 1, &paint, false, 1.0, &m);
        let c = atlas.get_glyph_region(&font(12.0), 2, &paint, false, 1.0, &m);
        assert_eq!(a, b);
        assert_eq!(a.slot.region.width, 12);
        assert_ne!(a.slot.region, c.slot.region);
        assert_eq!(atlas.bitmap_count(), 1);
    }

    #[test]
    fn sdf_glyphs_use_the_distance_field_tiers() {
        let mut atlas = atlas(Arc::new(HeadlessDevice::default()));
        let paint = Paint::default();
        let region = atlas.get_glyph_region(&font(20.0), 1, &paint, true, 1.0, &Matrix::scale(3.0, 3.0));
        assert_eq!(region.scale, 20.0 / 32.0);
        assert_eq!(region.slot.region.width, 32 + 2 * DF_PAD as i32);

        // Same tier, different device size: the bitmap is shared.
        let other = atlas.get_glyph_region(&font(24.0), 1, &paint, true, 1.0, &Matrix::identity());
        assert_eq!(other.slot, region.slot);
        assert_eq!(other.scale, 24.0 / 32.0);
    }

    #[test]
    fn full_bitmaps_start_a_new_generation() {
        let mut atlas = atlas(Arc::new(HeadlessDevice::default()));
        let paint = Paint::default();
        let m = Matrix::identity();
        let big = font(300.0);
        for glyph in 0..3 {
            let region = atlas.get_glyph_region(&big, glyph, &paint, false, 1.0, &m);
            assert_eq!(region.index_in_group, glyph as u32);
        }
        assert_eq!(atlas.current_bitmap_index(), 2);
    }

    #[test]
    fn upload_writes_dirty_rows_and_cleans_the_bitmap() {
        let device = Arc::new(HeadlessDevice::default());
        let mut atlas = atlas(device.clone());
        let region = atlas.get_glyph_region(&font(8.0), 1, &Paint::default(), false, 1.0, &Matrix::identity());
        atlas.upload_atlas(0);
        assert_eq!(atlas.bitmaps[0].dirty_rect(), None);

        let textures = atlas.textures(0);
        let texture = textures[0].as_any().downcast_ref::<HeadlessTexture>().unwrap();
        let row = atlas.config().max_texture_size as usize;
        let r = region.slot.region;
        let pixels = texture.pixels();
        assert_eq!(pixels[r.y as usize * row + r.x as usize], 200);
        assert_eq!(pixels[r.y as usize * row + r.x as usize - 1], 0);
        assert_eq!(device.stats().textures_created(), 1);
    }

    #[test]
    fn clear_extra_res_keeps_the_newest_generation_in_the_first_group() {
        let mut atlas = atlas(Arc::new(HeadlessDevice::default()));
        let paint = Paint::default();
        let m = Matrix::identity();
        let big = font(300.0);
        for glyph in 0..17 {
            atlas.get_glyph_region(&big, glyph, &paint, false, 1.0, &m);
        }
        assert_eq!(atlas.bitmap_count(), 17);
        assert_eq!(atlas.current_bitmap_index(), 16);

        atlas.clear_extra_res();
        assert_eq!(atlas.bitmap_count(), 16);
        assert_eq!(atlas.current_bitmap_index(), 0);
        assert_eq!(atlas.bitmaps[0].dirty_rect(), Some([0, 0, 512, 512]));
        let newest = atlas.get_glyph_region(&big, 16, &paint, false, 1.0, &m);
        assert_eq!(newest.index_in_group, 0);
    }

    #[test]
    fn manager_creates_each_format_once() {
        let mut manager = AtlasManager::new(Arc::new(HeadlessDevice::default()), 0b10, TextRenderConfig::default());
        assert_eq!(manager.get_atlas(AtlasFormat::A8).config().max_num_bitmap_per_texture, 4);
        assert_eq!(manager.get_atlas(AtlasFormat::Rgba32).config().max_num_bitmap_per_texture, 16);
        manager.get_atlas(AtlasFormat::A8).get_glyph_region(
            &font(10.0),
            1,
            &Paint::default(),
            false,
            1.0,
            &Matrix::identity(),
        );
        assert_eq!(manager.get_atlas(AtlasFormat::A8).bitmap_count(), 1);
        manager.clear_extra_res();
    }
}
