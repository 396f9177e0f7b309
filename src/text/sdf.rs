//! Signed distance fields for the SDF text tier.
//!
//! The generator seeds edge pixels with an anti-aliasing aware sub-pixel distance estimate
//! and then propagates distance vectors with a two-pass 8-neighbour sweep (8SSEDT). The
//! output is padded by [`DF_PAD`] pixels on every side and encodes the signed distance so
//! that 128 sits on the outline, with larger values inside the glyph.

use crate::geometry::Vec2;

/// Padding added on each side of the source bitmap.
pub const DF_PAD: u32 = 4;

const MAX_DIST: f32 = 2000.0;
const MAX_DIST_VEC: Vec2 = Vec2::new(1000.0, 1000.0);
const SQRT2: f32 = std::f32::consts::SQRT_2;
const TOLERANCE: f32 = 1.0 / 4096.0;
/// Distances are clamped to this many pixels before quantization.
const WIDTH: f32 = 4.0;
const MAGNIFICATION: f32 = 32.0;

/// A dense row-major grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Copy> Image<T> {
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Option<Self> {
        (data.len() == width * height).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.data[y * self.width + x] = value;
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

pub struct SdfGen;

impl SdfGen {
    /// Converts an 8-bit coverage mask into an 8-bit distance field, growing it by
    /// [`DF_PAD`] pixels on each side.
    pub fn generate_sdf_image(src: &Image<u8>) -> Image<u8> {
        let pad = DF_PAD as usize;
        let mut padded = Image::filled(src.width() + 2 * pad, src.height() + 2 * pad, 0u8);
        for y in 0..src.height() {
            for x in 0..src.width() {
                padded.set(pad + x, pad + y, src.get(x, y));
            }
        }
        let distances = generate_df(&to_float_image(&padded));
        to_int_image(&padded, &distances)
    }
}

fn nearly_zero(value: f32) -> bool {
    value.abs() < TOLERANCE
}

fn find_edges(image: &Image<f32>) -> Image<u8> {
    let (w, h) = (image.width(), image.height());
    let mut edges = Image::filled(w, h, 0u8);
    if w < 2 || h < 2 {
        return edges;
    }
    for y in 0..h - 1 {
        for x in 0..w - 1 {
            let value = image.get(x, y);
            if value == 0.0 {
                continue;
            }
            let edge = if value < 1.0 || x == 0 || y == 0 {
                true
            } else {
                let neighbours = [
                    (x - 1, y - 1),
                    (x, y - 1),
                    (x + 1, y - 1),
                    (x - 1, y),
                    (x + 1, y),
                    (x - 1, y + 1),
                    (x, y + 1),
                    (x + 1, y + 1),
                ];
                neighbours.iter().any(|&(nx, ny)| image.get(nx, ny) == 0.0)
            };
            if edge {
                edges.set(x, y, 1);
            }
        }
    }
    edges
}

/// Sobel gradients with sqrt(2) weights on the axis taps, normalized.
fn compute_gradients(image: &Image<f32>, edges: &Image<u8>) -> Image<Vec2> {
    let (w, h) = (image.width(), image.height());
    let mut gradients = Image::filled(w, h, Vec2::zero());
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            if edges.get(x, y) == 0 {
                continue;
            }
            let p = |dx: usize, dy: usize| image.get(x + dx - 1, y + dy - 1);
            let g = Vec2::new(
                p(2, 0) - p(0, 0) + SQRT2 * p(2, 1) - SQRT2 * p(0, 1) + p(2, 2) - p(0, 2),
                p(0, 2) - p(0, 0) + SQRT2 * p(1, 2) - SQRT2 * p(1, 0) + p(2, 2) - p(2, 0),
            );
            let len = g.length();
            if len > 0.0 {
                gradients.set(x, y, g / len);
            }
        }
    }
    gradients
}

/// Distance from a pixel center to an edge crossing it with coverage `alpha`, assuming the
/// edge is a straight line perpendicular to `direction`.
fn edge_distance(alpha: f32, direction: Vec2) -> (f32, Vec2) {
    let dist = if nearly_zero(direction.x) || nearly_zero(direction.y) {
        0.5 - alpha
    } else {
        let (mut d0, mut d1) = (direction.x.abs(), direction.y.abs());
        if d0 < d1 {
            std::mem::swap(&mut d0, &mut d1);
        }
        let a1 = 0.5 * d1 / d0;
        if alpha < a1 {
            0.5 * (d0 + d1) - (2.0 * d0 * d1 * alpha).sqrt()
        } else if alpha < 1.0 - a1 {
            (0.5 - alpha) * d0
        } else {
            -0.5 * (d0 + d1) + (2.0 * d0 * d1 * (1.0 - alpha)).sqrt()
        }
    };
    (dist, direction * dist)
}

struct DistanceField {
    distances: Image<f32>,
    vectors: Image<Vec2>,
}

impl DistanceField {
    fn compare(&mut self, x: i32, y: i32, dx: i32, dy: i32) {
        let (cx, cy) = (x as usize, y as usize);
        let (ox, oy) = ((x + dx) as usize, (y + dy) as usize);
        let candidate = self.vectors.get(ox, oy) + Vec2::new(dx as f32, dy as f32);
        let len = candidate.length();
        if len < self.distances.get(cx, cy) {
            self.distances.set(cx, cy, len);
            self.vectors.set(cx, cy, candidate);
        }
    }

    fn propagate(&mut self) {
        let height = self.distances.height() as i32;
        let width = self.distances.width() as i32;

        for y in 1..height {
            for x in 1..width - 1 {
                self.compare(x, y, 0, -1);
                self.compare(x, y, -1, 0);
                self.compare(x, y, -1, -1);
                self.compare(x, y, 1, -1);
            }
            for x in (0..width - 1).rev() {
                self.compare(x, y, 1, 0);
            }
        }

        for y in (0..height - 1).rev() {
            for x in 1..width - 1 {
                self.compare(x, y, -1, 0);
            }
            for x in (0..width - 1).rev() {
                self.compare(x, y, 0, 1);
                if x > 0 {
                    self.compare(x, y, -1, 1);
                }
                self.compare(x, y, 1, 0);
                self.compare(x, y, 1, 1);
            }
        }
    }
}

fn generate_df(image: &Image<f32>) -> Image<f32> {
    let (w, h) = (image.width(), image.height());
    let edges = find_edges(image);
    let gradients = compute_gradients(image, &edges);

    let mut field = DistanceField {
        distances: Image::filled(w, h, MAX_DIST),
        vectors: Image::filled(w, h, MAX_DIST_VEC),
    };
    for y in 0..h {
        for x in 0..w {
            if edges.get(x, y) == 0 {
                continue;
            }
            let (dist, vec) = edge_distance(image.get(x, y), gradients.get(x, y));
            field.distances.set(x, y, dist.abs());
            field.vectors.set(x, y, vec);
        }
    }
    field.propagate();
    field.distances
}

fn to_float_image(image: &Image<u8>) -> Image<f32> {
    Image {
        width: image.width,
        height: image.height,
        data: image.data.iter().map(|&a| a as f32 / 255.0).collect(),
    }
}

fn to_int_image(coverage: &Image<u8>, distances: &Image<f32>) -> Image<u8> {
    let data = coverage
        .data
        .iter()
        .zip(&distances.data)
        .map(|(&alpha, &dist)| {
            let signed = if alpha > 127 { dist } else { -dist };
            let d = (signed.clamp(-WIDTH, WIDTH * 127.0 / 128.0) + WIDTH) * MAGNIFICATION;
            d.round() as u8
        })
        .collect();
    Image {
        width: coverage.width,
        height: coverage.height,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: usize, from: usize, to: usize) -> Image<u8> {
        let mut img = Image::filled(size, size, 0u8);
        for y in from..to {
            for x in from..to {
                img.set(x, y, 255);
            }
        }
        img
    }

    #[test]
    fn output_is_padded_on_every_side() {
        let out = SdfGen::generate_sdf_image(&square(8, 2, 6));
        assert_eq!(out.width(), 8 + 2 * DF_PAD as usize);
        assert_eq!(out.height(), 8 + 2 * DF_PAD as usize);
    }

    #[test]
    fn inside_is_bright_and_far_outside_is_zero() {
        let out = SdfGen::generate_sdf_image(&square(12, 2, 10));
        let pad = DF_PAD as usize;
        let center = out.get(pad + 6, pad + 6);
        let corner = out.get(0, 0);
        let edge = out.get(pad + 2, pad + 6);
        assert!(center > 200, "center {center}");
        assert_eq!(corner, 0);
        assert!(edge > corner && edge < center, "edge {edge}");
        assert!(edge >= 128);
    }

    #[test]
    fn values_rise_towards_the_middle_of_the_shape() {
        let out = SdfGen::generate_sdf_image(&square(12, 2, 10));
        let row = DF_PAD as usize + 6;
        let middle = DF_PAD as usize + 6;
        for x in 0..middle {
            assert!(out.get(x, row) <= out.get(x + 1, row), "x = {x}");
        }
        // One pixel outside the outline sits half a pixel away.
        assert_eq!(out.get(DF_PAD as usize + 1, row), 112);
    }
}
