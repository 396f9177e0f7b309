//! What a rendered scene should look like, and how to compare it with what came back
//! from `GpuContext::read_pixels`.

/// Source-over of a straight `src` color at `alpha` onto an opaque `dst`, rounded the way
/// an 8-bit target stores it.
pub fn src_over(src: [u8; 3], alpha: f32, dst: [u8; 3]) -> [u8; 3] {
    let mix = |s: u8, d: u8| (s as f32 * alpha + d as f32 * (1.0 - alpha)).round().clamp(0.0, 255.0) as u8;
    [mix(src[0], dst[0]), mix(src[1], dst[1]), mix(src[2], dst[2])]
}

/// The color a scene promises at one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelExpectation {
    pub x: u32,
    pub y: u32,
    pub rgba: [u8; 4],
    /// Largest difference accepted in any channel.
    pub tolerance: u8,
    pub label: &'static str,
}

impl PixelExpectation {
    pub const DEFAULT_TOLERANCE: u8 = 5;
    /// Blended results go through two roundings, one per layer or draw.
    pub const BLEND_TOLERANCE: u8 = 8;

    pub fn opaque(x: u32, y: u32, r: u8, g: u8, b: u8, label: &'static str) -> Self {
        Self {
            x,
            y,
            rgba: [r, g, b, 255],
            tolerance: Self::DEFAULT_TOLERANCE,
            label,
        }
    }

    /// The white backdrop every scene starts from, left untouched: clipped away, rejected,
    /// outside a shape or cut by the fill rule.
    pub fn backdrop(x: u32, y: u32, label: &'static str) -> Self {
        Self::opaque(x, y, 255, 255, 255, label)
    }

    /// Nothing ever written, or written with the clear blend mode.
    pub fn transparent(x: u32, y: u32, label: &'static str) -> Self {
        Self {
            rgba: [0; 4],
            ..Self::opaque(x, y, 0, 0, 0, label)
        }
    }

    /// `src` at `alpha` composited over an opaque `dst`.
    pub fn composited(x: u32, y: u32, src: [u8; 3], alpha: f32, dst: [u8; 3], label: &'static str) -> Self {
        let [r, g, b] = src_over(src, alpha, dst);
        Self::opaque(x, y, r, g, b, label).with_tolerance(Self::BLEND_TOLERANCE)
    }

    pub fn with_tolerance(mut self, tolerance: u8) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn accepts(&self, actual: [u8; 4]) -> bool {
        self.rgba
            .iter()
            .zip(actual)
            .all(|(expected, actual)| expected.abs_diff(actual) <= self.tolerance)
    }
}

/// A read-back frame: tightly packed RGBA8 rows.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pixels: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> Frame<'a> {
    pub fn new(pixels: &'a [u8], width: u32, height: u32) -> Self {
        Self { pixels, width, height }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let texel = self.pixels.get(offset..offset + 4)?;
        Some([texel[0], texel[1], texel[2], texel[3]])
    }

    /// One line per unmet expectation; empty when the frame meets all of them.
    pub fn failures(&self, expectations: &[PixelExpectation]) -> Vec<String> {
        expectations
            .iter()
            .filter_map(|e| match self.pixel(e.x, e.y) {
                None => Some(format!(
                    "[{}] ({},{}) lies outside the {}x{} frame",
                    e.label, e.x, e.y, self.width, self.height
                )),
                Some(actual) if !e.accepts(actual) => Some(format!(
                    "[{}] ({},{}) expected {:?} within {} but got {:?}",
                    e.label, e.x, e.y, e.rgba, e.tolerance, actual
                )),
                Some(_) => None,
            })
            .collect()
    }

    /// Pixels where the two frames differ at all. Frames of different sizes differ
    /// everywhere outside their common part.
    pub fn diff(&self, other: &Frame<'_>) -> Vec<(u32, u32)> {
        let width = self.width.max(other.width);
        let height = self.height.max(other.height);
        let mut differing = Vec::new();
        for y in 0..height {
            for x in 0..width {
                if self.pixel(x, y) != other.pixel(x, y) {
                    differing.push((x, y));
                }
            }
        }
        differing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn src_over_half_red_on_white() {
        assert_eq!(src_over([255, 0, 0], 0.5, [255, 255, 255]), [255, 128, 128]);
        assert_eq!(src_over([0, 0, 255], 0.5, [255, 128, 128]), [128, 64, 192]);
    }

    #[test]
    fn failures_name_the_label_and_the_pixel() {
        // 2x1: red, transparent
        let pixels = [255, 0, 0, 255, 0, 0, 0, 0];
        let frame = Frame::new(&pixels, 2, 1);
        let expectations = [
            PixelExpectation::opaque(0, 0, 252, 0, 0, "red within tolerance"),
            PixelExpectation::transparent(1, 0, "cleared"),
            PixelExpectation::backdrop(1, 0, "should be white"),
            PixelExpectation::backdrop(5, 0, "off the frame"),
        ];
        let failures = frame.failures(&expectations);
        assert_eq!(failures.len(), 2);
        assert!(failures[0].starts_with("[should be white] (1,0)"));
        assert!(failures[1].contains("outside the 2x1 frame"));
    }

    #[test]
    fn diff_lists_every_changed_pixel() {
        let a = [0u8; 16];
        let mut b = a;
        b[12] = 1;
        assert!(Frame::new(&a, 2, 2).diff(&Frame::new(&a, 2, 2)).is_empty());
        assert_eq!(Frame::new(&a, 2, 2).diff(&Frame::new(&b, 2, 2)), [(1, 1)]);
    }
}
