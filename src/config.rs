use std::fmt;
use std::sync::Arc;

use crate::gpu::TextureFormat;

/// Callback invoked with a human readable message whenever a shader fails to compile.
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Options fixed at context creation.
#[derive(Clone)]
pub struct ContextOptions {
    /// Batch adjacent compatible draws into one command.
    pub enable_merging_draw_call: bool,
    /// Use per-vertex coverage along path edges when MSAA is off.
    pub enable_contour_aa: bool,
    /// Sample direct glyph atlases with linear filtering.
    pub enable_text_linear_filter: bool,
    pub max_resource_cache_bytes: usize,
    pub render_target_cache_bytes: usize,
    /// Bit `i` selects the larger atlas layout for atlas format `i` (0 = A8, 1 = RGBA).
    pub larger_atlas_mask: u32,
    pub text: TextRenderConfig,
    pub error_callback: Option<ErrorCallback>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            enable_merging_draw_call: true,
            enable_contour_aa: true,
            enable_text_linear_filter: false,
            max_resource_cache_bytes: 256 * 1024 * 1024,
            render_target_cache_bytes: 256 * 1024 * 1024,
            larger_atlas_mask: 0,
            text: TextRenderConfig::default(),
            error_callback: None,
        }
    }
}

impl fmt::Debug for ContextOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextOptions")
            .field("enable_merging_draw_call", &self.enable_merging_draw_call)
            .field("enable_contour_aa", &self.enable_contour_aa)
            .field("enable_text_linear_filter", &self.enable_text_linear_filter)
            .field("max_resource_cache_bytes", &self.max_resource_cache_bytes)
            .field("render_target_cache_bytes", &self.render_target_cache_bytes)
            .field("larger_atlas_mask", &self.larger_atlas_mask)
            .field("text", &self.text)
            .field("error_callback", &self.error_callback.is_some())
            .finish()
    }
}

/// Font-size thresholds that pick between the direct, SDF and path text tiers.
///
/// SDF glyphs are rasterized once at one of the three distance-field sizes and scaled on the
/// GPU. Direct atlas glyphs are rasterized at their device size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextRenderConfig {
    pub small_df_font_size: f32,
    pub medium_df_font_size: f32,
    pub large_df_font_size: f32,
    /// Device text sizes at or above this never use an atlas.
    pub max_direct_font_size: f32,
    /// Lowest device size that may switch to SDF when the paint asks for SDF on small text.
    pub min_sdf_font_size: f32,
    pub sdf_enabled: bool,
}

impl Default for TextRenderConfig {
    fn default() -> Self {
        Self {
            small_df_font_size: 32.0,
            medium_df_font_size: 72.0,
            large_df_font_size: 162.0,
            max_direct_font_size: 256.0,
            min_sdf_font_size: 16.0,
            sdf_enabled: true,
        }
    }
}

/// Options for an on-screen or offscreen surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceOptions {
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    pub content_scale: f32,
    pub format: TextureFormat,
    pub clear_on_begin: bool,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            sample_count: 1,
            content_scale: 1.0,
            format: TextureFormat::Rgba8Unorm,
            clear_on_begin: true,
        }
    }
}
