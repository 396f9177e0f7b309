use ahash::AHashMap;

use super::allocator::{AtlasAllocator, AtlasRegion};
use super::atlas::GlyphKey;
use super::font::GlyphImage;

/// Transparent gutter around each glyph, split evenly between both sides.
pub const ATLAS_PADDING: u32 = 2;

/// Where a glyph landed, plus the image origin needed to position its quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphSlot {
    pub region: AtlasRegion,
    pub origin_x: f32,
    pub origin_y: f32,
}

/// Dirty area as `left, top, right, bottom`, padding included.
pub type DirtyRect = [i32; 4];

/// CPU copy of one atlas page and the glyphs packed into it.
#[derive(Debug)]
pub struct AtlasBitmap {
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
    allocator: AtlasAllocator,
    pixels: Vec<u8>,
    glyphs: AHashMap<GlyphKey, GlyphSlot>,
    dirty: Option<DirtyRect>,
}

impl AtlasBitmap {
    pub fn new(width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel,
            allocator: AtlasAllocator::new(width, height),
            pixels: vec![0; (width * height * bytes_per_pixel) as usize],
            glyphs: AHashMap::new(),
            dirty: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    pub fn glyph_slot(&self, key: &GlyphKey) -> Option<GlyphSlot> {
        self.glyphs.get(key).copied()
    }

    /// Packs `image` and copies its rows in.
    ///
    /// An empty image, or one that can never fit a page, gets [`AtlasRegion::EMPTY`] and is
    /// not remembered. A full page returns [`AtlasRegion::INVALID`].
    pub fn generate_glyph_region(&mut self, key: GlyphKey, image: &GlyphImage) -> GlyphSlot {
        let empty = GlyphSlot {
            region: AtlasRegion::EMPTY,
            origin_x: image.origin_x,
            origin_y: image.origin_y,
        };
        if image.is_empty() {
            return empty;
        }
        let padded_w = image.width + ATLAS_PADDING;
        let padded_h = image.height + ATLAS_PADDING;
        if padded_w > self.width - 2 || padded_h > self.height - 2 {
            return empty;
        }

        let padded = self.allocator.allocate_region(padded_w, padded_h);
        if !padded.is_valid() {
            return GlyphSlot {
                region: AtlasRegion::INVALID,
                ..empty
            };
        }

        let half = (ATLAS_PADDING / 2) as i32;
        let region = AtlasRegion::new(
            padded.x + half,
            padded.y + half,
            padded.width - ATLAS_PADDING as i32,
            padded.height - ATLAS_PADDING as i32,
        );
        let slot = GlyphSlot {
            region,
            ..empty
        };
        self.glyphs.insert(key, slot);

        let bpp = self.bytes_per_pixel as usize;
        let src_row = image.width as usize * bpp;
        let dst_row = self.width as usize * bpp;
        for (row, src) in image.pixels.chunks_exact(src_row).take(image.height as usize).enumerate() {
            let dst = (region.y as usize + row) * dst_row + region.x as usize * bpp;
            self.pixels[dst..dst + src_row].copy_from_slice(src);
        }

        // Includes the gutter so it uploads as zeros.
        self.join_dirty([padded.x, padded.y, padded.right(), padded.bottom()]);
        slot
    }

    fn join_dirty(&mut self, rect: DirtyRect) {
        self.dirty = Some(match self.dirty {
            None => rect,
            Some(d) => [d[0].min(rect[0]), d[1].min(rect[1]), d[2].max(rect[2]), d[3].max(rect[3])],
        });
    }

    pub fn dirty_rect(&self) -> Option<DirtyRect> {
        self.dirty
    }

    /// Forces a full re-upload, used when the page moves to another texture slot.
    pub fn set_all_dirty(&mut self) {
        self.dirty = Some([0, 0, self.width as i32, self.height as i32]);
    }

    pub fn set_all_clean(&mut self) {
        self.dirty = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::font::ScalerContextDesc;
    use crate::paint::{StrokeCap, StrokeJoin};

    fn key(glyph: u16) -> GlyphKey {
        GlyphKey {
            glyph_id: glyph,
            desc: ScalerContextDesc {
                typeface_id: 1,
                text_size: 12.0,
                scale_x: 1.0,
                skew_x: 0.0,
                transform: [1.0, 0.0, 0.0, 1.0],
                context_scale: 1.0,
                stroke_width: 0.0,
                miter_limit: 4.0,
                cap: StrokeCap::Butt,
                join: StrokeJoin::Miter,
                fake_bold: false,
            },
        }
    }

    fn image(width: u32, height: u32, value: u8) -> GlyphImage {
        GlyphImage {
            width,
            height,
            origin_x: 1.0,
            origin_y: 9.0,
            pixels: vec![value; (width * height) as usize],
        }
    }

    #[test]
    fn glyph_is_inset_by_half_the_padding() {
        let mut bitmap = AtlasBitmap::new(32, 32, 1);
        let slot = bitmap.generate_glyph_region(key(1), &image(4, 3, 0xAA));
        assert_eq!(slot.region, AtlasRegion::new(2, 2, 4, 3));
        assert_eq!(slot.origin_y, 9.0);
        assert_eq!(bitmap.dirty_rect(), Some([1, 1, 7, 6]));
        assert_eq!(bitmap.pixels()[2 * 32 + 2], 0xAA);
        assert_eq!(bitmap.pixels()[2 * 32 + 1], 0);
        assert_eq!(bitmap.glyph_slot(&key(1)), Some(slot));
        assert_eq!(bitmap.glyph_slot(&key(2)), None);
    }

    #[test]
    fn dirty_rect_accumulates_until_cleaned() {
        let mut bitmap = AtlasBitmap::new(32, 32, 1);
        bitmap.generate_glyph_region(key(1), &image(4, 4, 1));
        bitmap.generate_glyph_region(key(2), &image(4, 10, 1));
        assert_eq!(bitmap.dirty_rect(), Some([1, 1, 13, 13]));
        bitmap.set_all_clean();
        assert_eq!(bitmap.dirty_rect(), None);
        bitmap.set_all_dirty();
        assert_eq!(bitmap.dirty_rect(), Some([0, 0, 32, 32]));
    }

    #[test]
    fn empty_and_oversized_images_are_skipped() {
        let mut bitmap = AtlasBitmap::new(16, 16, 1);
        assert_eq!(bitmap.generate_glyph_region(key(1), &image(0, 0, 0)).region, AtlasRegion::EMPTY);
        assert_eq!(bitmap.generate_glyph_region(key(2), &image(13, 2, 0)).region, AtlasRegion::EMPTY);
        assert_eq!(bitmap.glyph_count(), 0);
        assert!(bitmap.generate_glyph_region(key(3), &image(12, 12, 0)).region.has_area());
        assert_eq!(bitmap.generate_glyph_region(key(4), &image(2, 2, 0)).region, AtlasRegion::INVALID);
    }
}
