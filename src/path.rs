//! Path value type backed by `lyon::path::Path`.
//!
//! ```rust
//! use tessera::{Path, Rect};
//!
//! let triangle = Path::builder()
//!     .move_to(100.0, 100.0)
//!     .line_to(200.0, 200.0)
//!     .line_to(100.0, 200.0)
//!     .close()
//!     .build();
//! assert!(triangle.is_convex());
//! assert_eq!(triangle.bounds(), Rect::new(100.0, 100.0, 200.0, 200.0));
//! ```

use lyon::path::iterator::PathIterator;
use lyon::path::PathEvent;

use crate::geometry::{point, Matrix, Point, RRect, Rect};

/// Cubic control point distance that approximates a quarter ellipse.
const KAPPA: f32 = 0.552_284_8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillType {
    #[default]
    Winding,
    EvenOdd,
}

/// A flattened sub-path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Contour {
    pub points: Vec<Point>,
    pub closed: bool,
}

impl Contour {
    /// Twice the signed area. Positive means clockwise in y-down device space.
    pub fn signed_area2(&self) -> f32 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            sum += a.x * b.y - b.x * a.y;
        }
        sum
    }
}

#[derive(Debug, Clone)]
pub struct Path {
    inner: lyon::path::Path,
    fill_type: FillType,
    bounds: Rect,
}

impl Default for Path {
    fn default() -> Self {
        Self {
            inner: lyon::path::Path::new(),
            fill_type: FillType::Winding,
            bounds: Rect::empty(),
        }
    }
}

impl Path {
    pub fn builder() -> PathBuilder {
        PathBuilder::new()
    }

    fn from_lyon(inner: lyon::path::Path, fill_type: FillType) -> Self {
        let bounds = control_bounds(&inner);
        Self {
            inner,
            fill_type,
            bounds,
        }
    }

    pub fn rect(rect: &Rect) -> Path {
        Path::builder()
            .move_to(rect.left, rect.top)
            .line_to(rect.right, rect.top)
            .line_to(rect.right, rect.bottom)
            .line_to(rect.left, rect.bottom)
            .close()
            .build()
    }

    pub fn rrect(rrect: &RRect) -> Path {
        Path::builder().add_rrect(rrect).build()
    }

    pub fn oval(rect: &Rect) -> Path {
        Path::rrect(&RRect::from_oval(*rect))
    }

    pub fn circle(cx: f32, cy: f32, radius: f32) -> Path {
        Path::oval(&Rect::new(cx - radius, cy - radius, cx + radius, cy + radius))
    }

    pub fn line(from: Point, to: Point) -> Path {
        Path::builder()
            .move_to(from.x, from.y)
            .line_to(to.x, to.y)
            .build()
    }

    pub fn polygon(points: &[Point], closed: bool) -> Path {
        let mut builder = Path::builder();
        for (i, p) in points.iter().enumerate() {
            builder = if i == 0 {
                builder.move_to(p.x, p.y)
            } else {
                builder.line_to(p.x, p.y)
            };
        }
        if closed {
            builder = builder.close();
        }
        builder.build()
    }

    pub fn fill_type(&self) -> FillType {
        self.fill_type
    }

    pub fn set_fill_type(&mut self, fill_type: FillType) {
        self.fill_type = fill_type;
    }

    pub fn with_fill_type(mut self, fill_type: FillType) -> Self {
        self.fill_type = fill_type;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.inner.iter().next().is_none()
    }

    /// Bounds of all points, control points included.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn as_lyon(&self) -> &lyon::path::Path {
        &self.inner
    }

    pub fn transformed(&self, m: &Matrix) -> Path {
        Path::from_lyon(self.inner.clone().transformed(&m.0), self.fill_type)
    }

    /// Flattens curves into line contours. Degenerate contours with a single point are
    /// dropped.
    pub fn contours(&self, tolerance: f32) -> Vec<Contour> {
        let mut out = Vec::new();
        let mut current = Contour::default();
        for evt in self.inner.iter().flattened(tolerance.max(1e-3)) {
            match evt {
                PathEvent::Begin { at } => {
                    current = Contour {
                        points: vec![at],
                        closed: false,
                    };
                }
                PathEvent::Line { to, .. } => {
                    if current.points.last() != Some(&to) {
                        current.points.push(to);
                    }
                }
                PathEvent::End { first, close, .. } => {
                    if close && current.points.len() > 1 && current.points.last() == Some(&first) {
                        current.points.pop();
                    }
                    current.closed = close;
                    if current.points.len() > 1 {
                        out.push(std::mem::take(&mut current));
                    }
                }
                PathEvent::Quadratic { to, .. } | PathEvent::Cubic { to, .. } => {
                    current.points.push(to);
                }
            }
        }
        out
    }

    /// A single closed contour that only turns one way and winds once. Open contours are
    /// never reported convex, even when filling would close them into a convex shape.
    pub fn is_convex(&self) -> bool {
        let contours = self.contours(0.25);
        match contours.as_slice() {
            [contour] => contour.closed && is_convex_polygon(&contour.points),
            _ => false,
        }
    }
}

fn control_bounds(path: &lyon::path::Path) -> Rect {
    let mut bounds: Option<Rect> = None;
    let mut add = |p: Point| {
        let r = bounds.get_or_insert(Rect::new(p.x, p.y, p.x, p.y));
        r.left = r.left.min(p.x);
        r.top = r.top.min(p.y);
        r.right = r.right.max(p.x);
        r.bottom = r.bottom.max(p.y);
    };
    for evt in path.iter() {
        match evt {
            PathEvent::Begin { at } => add(at),
            PathEvent::Line { to, .. } => add(to),
            PathEvent::Quadratic { ctrl, to, .. } => {
                add(ctrl);
                add(to);
            }
            PathEvent::Cubic {
                ctrl1, ctrl2, to, ..
            } => {
                add(ctrl1);
                add(ctrl2);
                add(to);
            }
            PathEvent::End { .. } => {}
        }
    }
    bounds.unwrap_or_default()
}

pub(crate) fn is_convex_polygon(points: &[Point]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f32;
    let mut x_flips = 0;
    let mut y_flips = 0;
    let mut last_dx = 0.0f32;
    let mut last_dy = 0.0f32;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        let c = points[(i + 2) % n];
        let cross = (b - a).cross(c - b);
        if cross != 0.0 {
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        let d = b - a;
        if d.x != 0.0 {
            if last_dx != 0.0 && d.x.signum() != last_dx.signum() {
                x_flips += 1;
            }
            last_dx = d.x;
        }
        if d.y != 0.0 {
            if last_dy != 0.0 && d.y.signum() != last_dy.signum() {
                y_flips += 1;
            }
            last_dy = d.y;
        }
    }
    sign != 0.0 && x_flips <= 2 && y_flips <= 2
}

/// Chained path construction.
pub struct PathBuilder {
    inner: lyon::path::path::Builder,
    fill_type: FillType,
    open: bool,
    last: Point,
}

impl Default for PathBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PathBuilder {
    pub fn new() -> Self {
        Self {
            inner: lyon::path::Path::builder(),
            fill_type: FillType::Winding,
            open: false,
            last: point(0.0, 0.0),
        }
    }

    pub fn fill_type(mut self, fill_type: FillType) -> Self {
        self.fill_type = fill_type;
        self
    }

    pub fn move_to(mut self, x: f32, y: f32) -> Self {
        if self.open {
            self.inner.end(false);
        }
        self.inner.begin(point(x, y));
        self.open = true;
        self.last = point(x, y);
        self
    }

    fn ensure_open(&mut self) {
        if !self.open {
            self.inner.begin(self.last);
            self.open = true;
        }
    }

    pub fn line_to(mut self, x: f32, y: f32) -> Self {
        self.ensure_open();
        self.inner.line_to(point(x, y));
        self.last = point(x, y);
        self
    }

    pub fn quad_to(mut self, cx: f32, cy: f32, x: f32, y: f32) -> Self {
        self.ensure_open();
        self.inner.quadratic_bezier_to(point(cx, cy), point(x, y));
        self.last = point(x, y);
        self
    }

    pub fn cubic_to(mut self, c1x: f32, c1y: f32, c2x: f32, c2y: f32, x: f32, y: f32) -> Self {
        self.ensure_open();
        self.inner
            .cubic_bezier_to(point(c1x, c1y), point(c2x, c2y), point(x, y));
        self.last = point(x, y);
        self
    }

    pub fn close(mut self) -> Self {
        if self.open {
            self.inner.end(true);
            self.open = false;
        }
        self
    }

    /// Appends a closed rounded rect, clockwise from the top edge.
    pub fn add_rrect(self, rrect: &RRect) -> Self {
        let r = rrect.rect;
        let [ul, ur, lr, ll] = rrect.radii;
        let mut b = self.move_to(r.left + ul.x, r.top).line_to(r.right - ur.x, r.top);
        if ur.x > 0.0 && ur.y > 0.0 {
            b = b.cubic_to(
                r.right - ur.x + ur.x * KAPPA,
                r.top,
                r.right,
                r.top + ur.y - ur.y * KAPPA,
                r.right,
                r.top + ur.y,
            );
        }
        b = b.line_to(r.right, r.bottom - lr.y);
        if lr.x > 0.0 && lr.y > 0.0 {
            b = b.cubic_to(
                r.right,
                r.bottom - lr.y + lr.y * KAPPA,
                r.right - lr.x + lr.x * KAPPA,
                r.bottom,
                r.right - lr.x,
                r.bottom,
            );
        }
        b = b.line_to(r.left + ll.x, r.bottom);
        if ll.x > 0.0 && ll.y > 0.0 {
            b = b.cubic_to(
                r.left + ll.x - ll.x * KAPPA,
                r.bottom,
                r.left,
                r.bottom - ll.y + ll.y * KAPPA,
                r.left,
                r.bottom - ll.y,
            );
        }
        b = b.line_to(r.left, r.top + ul.y);
        if ul.x > 0.0 && ul.y > 0.0 {
            b = b.cubic_to(
                r.left,
                r.top + ul.y - ul.y * KAPPA,
                r.left + ul.x - ul.x * KAPPA,
                r.top,
                r.left + ul.x,
                r.top,
            );
        }
        b.close()
    }

    pub fn build(mut self) -> Path {
        if self.open {
            self.inner.end(false);
        }
        Path::from_lyon(self.inner.build(), self.fill_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_flattens_to_one_closed_contour() {
        let path = Path::rect(&Rect::new(0.0, 0.0, 10.0, 5.0));
        let contours = path.contours(0.25);
        assert_eq!(contours.len(), 1);
        assert!(contours[0].closed);
        assert_eq!(contours[0].points.len(), 4);
        assert!(contours[0].signed_area2() > 0.0);
    }

    #[test]
    fn concave_and_multi_contour_paths_are_not_convex() {
        let arrow = Path::polygon(
            &[
                point(0.0, 0.0),
                point(10.0, 5.0),
                point(0.0, 10.0),
                point(4.0, 5.0),
            ],
            true,
        );
        assert!(!arrow.is_convex());

        let two = Path::builder()
            .move_to(0.0, 0.0)
            .line_to(1.0, 0.0)
            .line_to(1.0, 1.0)
            .close()
            .move_to(5.0, 5.0)
            .line_to(6.0, 5.0)
            .line_to(6.0, 6.0)
            .close()
            .build();
        assert!(!two.is_convex());
        assert!(Path::circle(0.0, 0.0, 10.0).is_convex());
    }

    #[test]
    fn open_contours_are_not_reported_convex() {
        let open = Path::polygon(&[point(100.0, 100.0), point(200.0, 200.0), point(100.0, 200.0)], false);
        assert!(!open.is_convex());
        assert_eq!(open.contours(0.25).len(), 1);
    }

    #[test]
    fn self_crossing_star_is_not_convex() {
        // Every turn has the same sign, but the outline wraps around twice.
        let star: Vec<Point> = (0..5)
            .map(|k| {
                let angle = (-90.0 + 144.0 * k as f32).to_radians();
                point(30.0 * angle.cos(), 30.0 * angle.sin())
            })
            .collect();
        assert!(!Path::polygon(&star, true).is_convex());
    }

    #[test]
    fn transformed_moves_bounds() {
        let path = Path::rect(&Rect::new(0.0, 0.0, 10.0, 10.0))
            .transformed(&Matrix::translate(5.0, 0.0));
        assert_eq!(path.bounds(), Rect::new(5.0, 0.0, 15.0, 10.0));
    }
}
