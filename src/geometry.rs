//! Value types shared by the whole pipeline: 2D affine matrices, rectangles and the
//! column-major 4x4 matrices uploaded to shaders.

use std::ops::Mul;

use euclid::default::Transform2D;

pub type Point = euclid::default::Point2D<f32>;
pub type Vec2 = euclid::default::Vector2D<f32>;

pub fn point(x: f32, y: f32) -> Point {
    Point::new(x, y)
}

/// A 2D affine transform.
///
/// Multiplication follows the usual matrix convention: `a * b` maps a point through `b`
/// first and then through `a`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix(pub Transform2D<f32>);

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    pub fn identity() -> Self {
        Self(Transform2D::identity())
    }

    pub fn translate(x: f32, y: f32) -> Self {
        Self(Transform2D::translation(x, y))
    }

    pub fn scale(x: f32, y: f32) -> Self {
        Self(Transform2D::scale(x, y))
    }

    /// Clockwise on screen, since y points down.
    pub fn rotate(degrees: f32) -> Self {
        Self(Transform2D::rotation(euclid::Angle::degrees(degrees)))
    }

    /// Builds a matrix from its scale, skew and translation components.
    pub fn from_components(
        scale_x: f32,
        skew_x: f32,
        trans_x: f32,
        skew_y: f32,
        scale_y: f32,
        trans_y: f32,
    ) -> Self {
        Self(Transform2D::new(
            scale_x, skew_y, skew_x, scale_y, trans_x, trans_y,
        ))
    }

    pub fn scale_x(&self) -> f32 {
        self.0.m11
    }

    pub fn skew_x(&self) -> f32 {
        self.0.m21
    }

    pub fn skew_y(&self) -> f32 {
        self.0.m12
    }

    pub fn scale_y(&self) -> f32 {
        self.0.m22
    }

    pub fn translate_x(&self) -> f32 {
        self.0.m31
    }

    pub fn translate_y(&self) -> f32 {
        self.0.m32
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    pub fn has_rotation(&self) -> bool {
        self.skew_x() != 0.0 || self.skew_y() != 0.0
    }

    pub fn invert(&self) -> Option<Matrix> {
        self.0.inverse().map(Matrix)
    }

    pub fn map_point(&self, p: Point) -> Point {
        self.0.transform_point(p)
    }

    pub fn map_xy(&self, x: f32, y: f32) -> Point {
        self.map_point(point(x, y))
    }

    /// Bounding box of the four mapped corners.
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            self.map_xy(rect.left, rect.top),
            self.map_xy(rect.right, rect.top),
            self.map_xy(rect.right, rect.bottom),
            self.map_xy(rect.left, rect.bottom),
        ];
        let mut out = Rect::new(corners[0].x, corners[0].y, corners[0].x, corners[0].y);
        for c in &corners[1..] {
            out.left = out.left.min(c.x);
            out.top = out.top.min(c.y);
            out.right = out.right.max(c.x);
            out.bottom = out.bottom.max(c.y);
        }
        out
    }

    /// The largest axis scale of the 2x2 part.
    pub fn max_scale(&self) -> f32 {
        let sx = Vec2::new(self.scale_x(), self.skew_y()).length();
        let sy = Vec2::new(self.skew_x(), self.scale_y()).length();
        sx.max(sy)
    }

    /// Column-major 4x4 layout used by `mat4x4<f32>` uniforms.
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_matrix(self)
    }
}

impl Mul for Matrix {
    type Output = Matrix;

    fn mul(self, rhs: Matrix) -> Matrix {
        Matrix(rhs.0.then(&self.0))
    }
}

/// Axis-aligned rectangle stored as left, top, right, bottom.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn empty() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    pub fn from_wh(w: f32, h: f32) -> Self {
        Self::new(0.0, 0.0, w, h)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> Point {
        point(
            (self.left + self.right) * 0.5,
            (self.top + self.bottom) * 0.5,
        )
    }

    pub fn is_empty(&self) -> bool {
        !(self.left < self.right && self.top < self.bottom)
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite()
            && self.top.is_finite()
            && self.right.is_finite()
            && self.bottom.is_finite()
    }

    pub fn set_empty(&mut self) {
        *self = Self::empty();
    }

    /// Intersects in place. Returns false, leaving `self` untouched, when the two do not
    /// overlap.
    pub fn intersect(&mut self, other: &Rect) -> bool {
        let l = self.left.max(other.left);
        let t = self.top.max(other.top);
        let r = self.right.min(other.right);
        let b = self.bottom.min(other.bottom);
        if l < r && t < b {
            *self = Rect::new(l, t, r, b);
            true
        } else {
            false
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        let mut tmp = *self;
        tmp.intersect(other)
    }

    /// Grows to cover `other`. Empty rects are ignored on either side.
    pub fn join(&mut self, other: &Rect) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = *other;
            return;
        }
        self.left = self.left.min(other.left);
        self.top = self.top.min(other.top);
        self.right = self.right.max(other.right);
        self.bottom = self.bottom.max(other.bottom);
    }

    pub fn outset(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(
            self.left - dx,
            self.top - dy,
            self.right + dx,
            self.bottom + dy,
        )
    }

    pub fn round_out(&self) -> Rect {
        Rect::new(
            self.left.floor(),
            self.top.floor(),
            self.right.ceil(),
            self.bottom.ceil(),
        )
    }

    pub fn contains(&self, other: &Rect) -> bool {
        !other.is_empty()
            && self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }
}

/// A rectangle with per-corner elliptical radii, ordered upper-left, upper-right,
/// lower-right, lower-left.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RRect {
    pub rect: Rect,
    pub radii: [Vec2; 4],
}

impl RRect {
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            rect,
            radii: [Vec2::zero(); 4],
        }
    }

    pub fn from_rect_xy(rect: Rect, rx: f32, ry: f32) -> Self {
        let rx = rx.max(0.0).min(rect.width() * 0.5);
        let ry = ry.max(0.0).min(rect.height() * 0.5);
        Self {
            rect,
            radii: [Vec2::new(rx, ry); 4],
        }
    }

    pub fn from_oval(rect: Rect) -> Self {
        Self::from_rect_xy(rect, rect.width() * 0.5, rect.height() * 0.5)
    }

    pub fn is_rect(&self) -> bool {
        self.radii.iter().all(|r| r.x == 0.0 || r.y == 0.0)
    }

    pub fn is_oval(&self) -> bool {
        let rx = self.rect.width() * 0.5;
        let ry = self.rect.height() * 0.5;
        self.radii
            .iter()
            .all(|r| (r.x - rx).abs() < f32::EPSILON && (r.y - ry).abs() < f32::EPSILON)
    }

    /// True when all four corners share one radius pair.
    pub fn is_simple(&self) -> bool {
        self.radii.iter().all(|r| *r == self.radii[0])
    }
}

/// Column-major 4x4 matrix with the same memory layout as WGSL `mat4x4<f32>`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Mat4(pub [f32; 16]);

impl Default for Mat4 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mat4 {
    pub fn identity() -> Self {
        let mut m = [0.0; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        Self(m)
    }

    /// Orthographic projection mapping `[left, right] x [top, bottom]` to clip space with
    /// y pointing down on screen.
    pub fn ortho(left: f32, right: f32, bottom: f32, top: f32) -> Self {
        let mut m = [0.0; 16];
        m[0] = 2.0 / (right - left);
        m[5] = 2.0 / (top - bottom);
        m[10] = -1.0;
        m[12] = -(right + left) / (right - left);
        m[13] = -(top + bottom) / (top - bottom);
        m[15] = 1.0;
        Self(m)
    }

    pub fn from_matrix(m: &Matrix) -> Self {
        let mut out = Self::identity().0;
        out[0] = m.scale_x();
        out[1] = m.skew_y();
        out[4] = m.skew_x();
        out[5] = m.scale_y();
        out[12] = m.translate_x();
        out[13] = m.translate_y();
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Transforms a homogeneous point.
    pub fn map(&self, v: [f32; 4]) -> [f32; 4] {
        let m = &self.0;
        let mut out = [0.0; 4];
        for (row, o) in out.iter_mut().enumerate() {
            *o = m[row] * v[0] + m[4 + row] * v[1] + m[8 + row] * v[2] + m[12 + row] * v[3];
        }
        out
    }
}
