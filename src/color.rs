/// An 8-bit RGBA color.
///
/// # Examples
///
/// ```
/// use tessera::Color;
///
/// let red = Color::rgb(255, 0, 0);
/// assert_eq!(red.to_color4f().0, [1.0, 0.0, 0.0, 1.0]);
///
/// // Packed ARGB, as used by most 2D APIs.
/// let green = Color::from_argb(0xff00ff00);
/// assert_eq!(green, Color::rgb(0, 255, 0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const TRANSPARENT: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);
    pub const BLUE: Self = Self([0, 0, 255, 255]);

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    pub fn from_argb(argb: u32) -> Self {
        Self([
            (argb >> 16) as u8,
            (argb >> 8) as u8,
            argb as u8,
            (argb >> 24) as u8,
        ])
    }

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }

    pub fn to_color4f(&self) -> Color4f {
        Color4f([
            self.0[0] as f32 / 255.0,
            self.0[1] as f32 / 255.0,
            self.0[2] as f32 / 255.0,
            self.0[3] as f32 / 255.0,
        ])
    }
}

/// Unpremultiplied floating point color in `[0, 1]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Color4f(pub [f32; 4]);

impl Color4f {
    pub const TRANSPARENT: Self = Self([0.0, 0.0, 0.0, 0.0]);
    pub const BLACK: Self = Self([0.0, 0.0, 0.0, 1.0]);
    pub const WHITE: Self = Self([1.0, 1.0, 1.0, 1.0]);
    pub const RED: Self = Self([1.0, 0.0, 0.0, 1.0]);

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self([r, g, b, a])
    }

    pub fn alpha(&self) -> f32 {
        self.0[3]
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.0[3] = alpha;
        self
    }

    pub fn premultiplied(&self) -> [f32; 4] {
        let a = self.0[3];
        [self.0[0] * a, self.0[1] * a, self.0[2] * a, a]
    }

    pub fn to_color(&self) -> Color {
        let c = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Color([c(self.0[0]), c(self.0[1]), c(self.0[2]), c(self.0[3])])
    }
}

impl From<Color> for Color4f {
    fn from(value: Color) -> Self {
        value.to_color4f()
    }
}
