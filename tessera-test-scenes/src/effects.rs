//! A single row of tiles for fill rules on self-overlapping paths and for filtered draws.

use std::sync::Arc;

use tessera::{
    Color, ColorFilter, FillType, HwCanvas, ImageFilter, MaskFilter, Matrix, Paint, Path, PathBuilder, RRect, Rect,
};

use crate::expectations::PixelExpectation;
use crate::scene::px;

const TILE_SIZE: u32 = 80;
const TILES: u32 = 6;

pub const EFFECTS_WIDTH: u32 = TILE_SIZE * TILES;
pub const EFFECTS_HEIGHT: u32 = TILE_SIZE;

fn tile_origin(tile_number: u32) -> (f32, f32) {
    (((tile_number - 1) * TILE_SIZE) as f32, 0.0)
}

/// A five-pointed star drawn in one stroke, so its inner pentagon has a winding number of two.
pub fn pentagram(cx: f32, cy: f32, radius: f32, fill_type: FillType) -> Path {
    let mut builder = PathBuilder::new().fill_type(fill_type);
    for k in 0..5 {
        let angle = (-90.0 + 144.0 * k as f32).to_radians();
        let (x, y) = (cx + radius * angle.cos(), cy + radius * angle.sin());
        builder = if k == 0 { builder.move_to(x, y) } else { builder.line_to(x, y) };
    }
    builder.close().build()
}

/// Draws the effects row into `canvas` and returns the pixels it should produce.
///
/// The canvas must belong to a surface of `EFFECTS_WIDTH` x `EFFECTS_HEIGHT` with a
/// content scale of 1.
pub fn build_effects_scene(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    canvas.draw_paint(&Paint::fill(Color::WHITE));

    let mut expectations = Vec::new();
    expectations.extend(star(canvas, 1, FillType::Winding));
    expectations.extend(star(canvas, 2, FillType::EvenOdd));
    expectations.extend(blurred_layer(canvas));
    expectations.extend(drop_shadow_layer(canvas));
    expectations.extend(mask_blurred_rrect(canvas));
    expectations.extend(shifted_and_recolored_layer(canvas));
    expectations
}

fn star(canvas: &mut HwCanvas, tile: u32, fill_type: FillType) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(tile);
    let (cx, cy) = (ox + 40.0, oy + 40.0);
    canvas.draw_path(&pentagram(cx, cy, 30.0, fill_type), &Paint::fill(Color::BLUE));
    let center = match fill_type {
        FillType::Winding => PixelExpectation::opaque(px(cx), px(cy), 0, 0, 255, "star center, winding"),
        FillType::EvenOdd => PixelExpectation::backdrop(px(cx), px(cy), "star center, even-odd"),
    };
    vec![
        center,
        PixelExpectation::opaque(px(cx), px(cy - 20.0), 0, 0, 255, "star top point"),
        PixelExpectation::backdrop(px(cx), px(cy + 20.0), "between the lower points"),
    ]
}

fn blurred_layer(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(3);
    let mut paint = Paint::default();
    paint.image_filter = Some(ImageFilter::blur(4.0, 4.0));
    canvas.save_layer(Some(&Rect::from_xywh(ox, oy, 80.0, 80.0)), Some(&paint));
    canvas.draw_rect(&Rect::from_xywh(ox + 20.0, oy + 20.0, 40.0, 40.0), &Paint::fill(Color::RED));
    canvas.restore();
    vec![
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 40.0), 255, 0, 0, "blur keeps the solid middle"),
        // Two pixels outside the left edge: about a quarter of the red spreads out here.
        PixelExpectation::composited(px(ox + 18.0), px(oy + 40.0), [255, 0, 0], 0.25, [255, 255, 255], "blur halo")
            .with_tolerance(60),
        PixelExpectation::backdrop(px(ox + 5.0), px(oy + 5.0), "blur does not reach the tile corner"),
    ]
}

fn drop_shadow_layer(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(4);
    let mut paint = Paint::default();
    paint.image_filter = Some(ImageFilter::drop_shadow(8.0, 8.0, 2.0, 2.0, Color::BLACK));
    canvas.save_layer(Some(&Rect::from_xywh(ox, oy, 80.0, 80.0)), Some(&paint));
    canvas.draw_rect(&Rect::from_xywh(ox + 10.0, oy + 10.0, 40.0, 40.0), &Paint::fill(Color::BLUE));
    canvas.restore();
    vec![
        PixelExpectation::opaque(px(ox + 30.0), px(oy + 30.0), 0, 0, 255, "shadow stays below its source"),
        PixelExpectation::opaque(px(ox + 54.0), px(oy + 35.0), 0, 0, 0, "shadow right of the source")
            .with_tolerance(16),
        PixelExpectation::backdrop(px(ox + 70.0), px(oy + 70.0), "past the shadow"),
        PixelExpectation::backdrop(px(ox + 5.0), px(oy + 5.0), "shadow only falls down and right"),
    ]
}

fn mask_blurred_rrect(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(5);
    let mut paint = Paint::fill(Color::GREEN);
    paint.mask_filter = MaskFilter::blur(3.0);
    let rrect = RRect::from_rect_xy(Rect::from_xywh(ox + 15.0, oy + 15.0, 50.0, 50.0), 10.0, 10.0);
    canvas.draw_rrect(&rrect, &paint);
    vec![
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 40.0), 0, 255, 0, "mask blur keeps the middle"),
        PixelExpectation::backdrop(px(ox + 40.0), px(oy + 76.0), "mask blur fades before the tile edge"),
    ]
}

fn shifted_and_recolored_layer(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(6);
    #[rustfmt::skip]
    let swap_red_green = [
        0.0, 1.0, 0.0, 0.0, 0.0,
        1.0, 0.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0, 0.0,
    ];
    let recolor = Arc::new(ImageFilter::ColorFilter(Arc::new(ColorFilter::Matrix(swap_red_green))));
    let shift = Arc::new(ImageFilter::Matrix(Matrix::translate(20.0, 0.0)));
    let mut paint = Paint::default();
    paint.image_filter = Some(ImageFilter::compose(shift, recolor));
    canvas.save_layer(Some(&Rect::from_xywh(ox, oy, 80.0, 80.0)), Some(&paint));
    canvas.draw_rect(&Rect::from_xywh(ox + 10.0, oy + 30.0, 20.0, 20.0), &Paint::fill(Color::RED));
    canvas.restore();
    vec![
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 40.0), 0, 255, 0, "recolored copy lands shifted"),
        PixelExpectation::backdrop(px(ox + 20.0), px(oy + 40.0), "nothing left at the source spot"),
    ]
}
