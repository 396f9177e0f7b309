use crate::config::TextRenderConfig;
use crate::geometry::Matrix;
use crate::paint::Paint;

use super::font::Typeface;

/// Picks the text tier for a run from its device size.
///
/// Direct atlas glyphs cover everything below [`TextRenderConfig::max_direct_font_size`]
/// when distance fields are off or the face is a color font. Otherwise direct glyphs stop
/// where SDF starts: at `min_sdf_font_size` for paints that ask for SDF on small text, at
/// `large_df_font_size` for the rest. Whatever neither tier takes is drawn as paths.
#[derive(Debug, Clone, Copy)]
pub struct TextRenderControl {
    config: TextRenderConfig,
}

impl TextRenderControl {
    pub fn new(config: TextRenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TextRenderConfig {
        &self.config
    }

    fn sdf_allowed(&self, typeface: &dyn Typeface) -> bool {
        self.config.sdf_enabled && !typeface.contains_color_table()
    }

    pub fn can_use_direct(&self, text_size: f32, _transform: &Matrix, paint: &Paint, typeface: &dyn Typeface) -> bool {
        let limit = if !self.sdf_allowed(typeface) {
            self.config.max_direct_font_size
        } else if paint.sdf_for_small_text {
            self.config.min_sdf_font_size
        } else {
            self.config.large_df_font_size
        };
        text_size < limit
    }

    pub fn can_use_sdf(&self, text_size: f32, paint: &Paint, typeface: &dyn Typeface) -> bool {
        if !self.sdf_allowed(typeface) {
            return false;
        }
        if text_size < self.config.min_sdf_font_size || text_size >= self.config.max_direct_font_size {
            return false;
        }
        paint.sdf_for_small_text || text_size >= self.config.large_df_font_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;
    use crate::text::font::{GlyphId, GlyphImage, GlyphMetrics, ScalerContextDesc};

    #[derive(Debug)]
    struct Face {
        colorful: bool,
    }

    impl Typeface for Face {
        fn id(&self) -> u32 {
            1
        }

        fn contains_color_table(&self) -> bool {
            self.colorful
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

    fn control(sdf_enabled: bool) -> TextRenderControl {
        TextRenderControl::new(TextRenderConfig {
            sdf_enabled,
            ..Default::default()
        })
    }

    #[test]
    fn without_sdf_everything_below_the_limit_is_direct() {
        let control = control(false);
        let paint = Paint::default();
        let m = Matrix::identity();
        for colorful in [false, true] {
            let face = Face { colorful };
            assert!(control.can_use_direct(14.0, &m, &paint, &face));
            assert!(control.can_use_direct(163.0, &m, &paint, &face));
            assert!(!control.can_use_direct(256.0, &m, &paint, &face));
            for size in [14.0, 163.0, 256.0] {
                assert!(!control.can_use_sdf(size, &paint, &face));
            }
        }
    }

    #[test]
    fn sdf_takes_large_text() {
        let control = control(true);
        let paint = Paint::default();
        let m = Matrix::identity();

        let plain = Face { colorful: false };
        assert!(control.can_use_direct(14.0, &m, &paint, &plain));
        assert!(!control.can_use_direct(163.0, &m, &paint, &plain));
        assert!(!control.can_use_direct(256.0, &m, &paint, &plain));
        assert!(!control.can_use_sdf(14.0, &paint, &plain));
        assert!(control.can_use_sdf(163.0, &paint, &plain));
        assert!(!control.can_use_sdf(256.0, &paint, &plain));

        let color = Face { colorful: true };
        assert!(control.can_use_direct(163.0, &m, &paint, &color));
        assert!(!control.can_use_direct(256.0, &m, &paint, &color));
        assert!(!control.can_use_sdf(163.0, &paint, &color));
    }

    #[test]
    fn small_text_sdf_starts_at_the_minimum_size() {
        let control = control(true);
        let mut paint = Paint::default();
        paint.sdf_for_small_text = true;
        let m = Matrix::identity();
        let plain = Face { colorful: false };
        assert!(control.can_use_direct(14.0, &m, &paint, &plain));
        assert!(!control.can_use_direct(18.0, &m, &paint, &plain));
        assert!(!control.can_use_sdf(14.0, &paint, &plain));
        assert!(control.can_use_sdf(18.0, &paint, &plain));
        assert!(control.can_use_sdf(163.0, &paint, &plain));
        assert!(!control.can_use_sdf(256.0, &paint, &plain));
    }
}
