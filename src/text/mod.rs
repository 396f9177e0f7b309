//! Glyph atlases and the three text tiers.
//!
//! Small text is rasterized at device size into a direct atlas, mid-size and scaled text
//! into a signed distance field atlas at one of three fixed sizes, and anything else is
//! drawn glyph by glyph as paths. [`TextRenderControl`] makes the choice per run.

pub mod allocator;
pub mod atlas;
pub mod bitmap;
pub mod control;
pub mod font;
pub mod glyph_run;
pub mod sdf;
pub mod texture_array;

pub use allocator::{AtlasAllocator, AtlasRegion};
pub use atlas::{Atlas, AtlasConfig, AtlasFormat, AtlasManager, GlyphKey, GlyphRegion, MAX_NUM_TEXTURE_PER_ATLAS};
pub use bitmap::{AtlasBitmap, GlyphSlot};
pub use control::TextRenderControl;
pub use font::{Font, GlyphFormat, GlyphId, GlyphImage, GlyphMetrics, ScalerContextDesc, Typeface};
pub use glyph_run::{AtlasGlyphRun, GlyphRun, TextRun};
pub use sdf::SdfGen;
pub use texture_array::AtlasTextureArray;
