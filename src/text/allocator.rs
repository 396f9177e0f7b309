/// A rectangle inside an atlas bitmap, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AtlasRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl AtlasRegion {
    /// Returned when a request does not fit.
    pub const INVALID: AtlasRegion = AtlasRegion {
        x: -1,
        y: -1,
        width: 0,
        height: 0,
    };

    /// Returned for glyphs with nothing to draw, such as spaces.
    pub const EMPTY: AtlasRegion = AtlasRegion {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    };

    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// True when there are pixels to sample.
    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn overlaps(&self, other: &AtlasRegion) -> bool {
        self.x < other.right() && other.x < self.right() && self.y < other.bottom() && other.y < self.bottom()
    }
}

/// One skyline segment: it starts at `x`, spans `width` pixels and is filled up to `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SkylineNode {
    x: i32,
    y: i32,
    width: i32,
}

/// Skyline bin packer over a fixed-size rectangle.
///
/// A one pixel border is kept free on every side so bilinear sampling never reads a
/// neighbouring texel from outside the atlas.
///
/// ```
/// use tessera::text::{AtlasAllocator, AtlasRegion};
///
/// let mut allocator = AtlasAllocator::new(64, 64);
/// let a = allocator.allocate_region(10, 10);
/// let b = allocator.allocate_region(10, 10);
/// assert_eq!(a, AtlasRegion::new(1, 1, 10, 10));
/// assert_eq!(b, AtlasRegion::new(11, 1, 10, 10));
/// assert_eq!(allocator.allocate_region(63, 4), AtlasRegion::INVALID);
/// ```
#[derive(Debug, Clone)]
pub struct AtlasAllocator {
    width: i32,
    height: i32,
    nodes: Vec<SkylineNode>,
    used: u64,
}

impl AtlasAllocator {
    pub fn new(width: u32, height: u32) -> Self {
        let mut allocator = Self {
            width: width as i32,
            height: height as i32,
            nodes: Vec::new(),
            used: 0,
        };
        allocator.clear();
        allocator
    }

    pub fn width(&self) -> u32 {
        self.width as u32
    }

    pub fn height(&self) -> u32 {
        self.height as u32
    }

    /// Pixels handed out since the last clear.
    pub fn used_area(&self) -> u64 {
        self.used
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(SkylineNode {
            x: 1,
            y: 1,
            width: self.width - 2,
        });
        self.used = 0;
    }

    /// Places a `width` x `height` rectangle on the skyline segment that keeps its top
    /// lowest, preferring the narrower segment on ties.
    pub fn allocate_region(&mut self, width: u32, height: u32) -> AtlasRegion {
        if width == 0 || height == 0 {
            return AtlasRegion::INVALID;
        }
        let (w, h) = (width as i32, height as i32);
        let mut best: Option<(usize, i32, i32)> = None;
        let mut best_top = i32::MAX;
        let mut best_width = i32::MAX;

        for index in 0..self.nodes.len() {
            let Some(y) = self.query_fit_y(index, w, h) else {
                continue;
            };
            let node = self.nodes[index];
            let top = y + h;
            if top < best_top || (top == best_top && node.width > 0 && node.width < best_width) {
                best = Some((index, node.x, y));
                best_top = top;
                best_width = node.width;
            }
        }

        let Some((index, x, y)) = best else {
            return AtlasRegion::INVALID;
        };

        self.nodes.insert(index, SkylineNode { x, y: y + h, width: w });

        // Trim the segments now covered by the new one.
        let mut i = index + 1;
        while i < self.nodes.len() {
            let prev = self.nodes[i - 1];
            let prev_end = prev.x + prev.width;
            let node = &mut self.nodes[i];
            if node.x >= prev_end {
                break;
            }
            let shrink = prev_end - node.x;
            node.x += shrink;
            node.width -= shrink;
            if node.width > 0 {
                break;
            }
            self.nodes.remove(i);
        }

        self.merge_nodes();
        self.used += u64::from(width) * u64::from(height);
        AtlasRegion::new(x, y, w, h)
    }

    /// Top edge a rectangle would get when its left edge sits on node `index`.
    fn query_fit_y(&self, index: usize, width: i32, height: i32) -> Option<i32> {
        let first = self.nodes[index];
        if first.x + width > self.width - 1 {
            return None;
        }
        let mut y = first.y;
        let mut width_left = width;
        for node in &self.nodes[index..] {
            if width_left <= 0 {
                break;
            }
            y = y.max(node.y);
            if y + height > self.height - 1 {
                return None;
            }
            width_left -= node.width;
        }
        (width_left <= 0).then_some(y)
    }

    fn merge_nodes(&mut self) {
        let mut i = 0;
        while i + 1 < self.nodes.len() {
            if self.nodes[i].y == self.nodes[i + 1].y {
                self.nodes[i].width += self.nodes[i + 1].width;
                self.nodes.remove(i + 1);
            } else {
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_never_overlap_and_stay_inside_the_border() {
        let mut allocator = AtlasAllocator::new(128, 128);
        let sizes = [(10, 12), (30, 5), (7, 7), (64, 20), (3, 40), (25, 25), (50, 9), (11, 2)];
        let mut placed: Vec<AtlasRegion> = Vec::new();
        for round in 0..6 {
            for &(w, h) in &sizes {
                let region = allocator.allocate_region(w + round, h);
                if !region.is_valid() {
                    continue;
                }
                assert!(region.x >= 1 && region.y >= 1, "{region:?}");
                assert!(region.right() <= 127 && region.bottom() <= 127, "{region:?}");
                for other in &placed {
                    assert!(!region.overlaps(other), "{region:?} overlaps {other:?}");
                }
                placed.push(region);
            }
        }
        assert!(placed.len() > sizes.len());
    }

    #[test]
    fn lowest_top_wins_over_first_fit() {
        let mut allocator = AtlasAllocator::new(64, 64);
        allocator.allocate_region(20, 30);
        allocator.allocate_region(42, 10);
        // The right hand segment ends at y = 11, lower than the first one at y = 31.
        let region = allocator.allocate_region(20, 5);
        assert_eq!(region, AtlasRegion::new(21, 11, 20, 5));
    }

    #[test]
    fn empty_regions_are_invalid_and_take_no_space() {
        let mut allocator = AtlasAllocator::new(16, 16);
        assert!(!allocator.allocate_region(0, 5).is_valid());
        assert!(!allocator.allocate_region(5, 0).is_valid());
        assert_eq!(allocator.used_area(), 0);
        assert_eq!(allocator.allocate_region(14, 14), AtlasRegion::new(1, 1, 14, 14));
    }

    #[test]
    fn full_allocator_reports_invalid_until_cleared() {
        let mut allocator = AtlasAllocator::new(16, 16);
        assert!(allocator.allocate_region(14, 14).is_valid());
        assert_eq!(allocator.allocate_region(1, 1), AtlasRegion::INVALID);
        assert_eq!(allocator.used_area(), 196);
        allocator.clear();
        assert_eq!(allocator.allocate_region(1, 1), AtlasRegion::new(1, 1, 1, 1));
    }
}
