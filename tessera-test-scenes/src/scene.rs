use std::sync::Arc;

use tessera::{
    point, BlendMode, ClipOp, Color, ColorFilter, FillType, GradientShader, HwCanvas, Image, Paint, PathBuilder,
    Pixmap, RRect, Rect, SamplingOptions, Shader, TileMode,
};

use crate::expectations::{src_over, PixelExpectation};

// ── Grid layout constants ────────────────────────────────────────────────────

const TILE_SIZE: u32 = 80;
const COLUMNS: u32 = 6;
const ROWS: u32 = 4;

pub const CANVAS_WIDTH: u32 = TILE_SIZE * COLUMNS;
pub const CANVAS_HEIGHT: u32 = TILE_SIZE * ROWS;

/// Returns the pixel origin (top-left corner) of tile number `n` (1-based).
fn tile_origin(tile_number: u32) -> (f32, f32) {
    let index = tile_number - 1;
    let column = index % COLUMNS;
    let row = index / COLUMNS;
    ((column * TILE_SIZE) as f32, (row * TILE_SIZE) as f32)
}

pub(crate) fn px(v: f32) -> u32 {
    v as u32
}

const WHITE: [u8; 3] = [255, 255, 255];
const RED: [u8; 3] = [255, 0, 0];
const GREEN: [u8; 3] = [0, 255, 0];
const BLUE: [u8; 3] = [0, 0, 255];

/// Draws the whole main test scene into `canvas` and returns the pixels it should produce.
///
/// The canvas must belong to a surface of `CANVAS_WIDTH` x `CANVAS_HEIGHT` with a content
/// scale of 1.
pub fn build_main_scene(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let mut expectations: Vec<PixelExpectation> = Vec::new();

    canvas.draw_paint(&Paint::fill(Color::WHITE));

    expectations.extend(tile_01_rect_solid(canvas));
    expectations.extend(tile_02_rounded_rect_solid(canvas));
    expectations.extend(tile_03_circle(canvas));
    expectations.extend(tile_04_open_triangle(canvas));
    expectations.extend(tile_05_quad_bezier(canvas));
    expectations.extend(tile_06_winding_overlap(canvas));
    expectations.extend(tile_07_even_odd_overlap(canvas));
    expectations.extend(tile_08_rect_clip(canvas));
    expectations.extend(tile_09_circle_path_clip(canvas));
    expectations.extend(tile_10_difference_clip(canvas));
    expectations.extend(tile_11_nested_clip_restore(canvas));
    expectations.extend(tile_12_translate(canvas));
    expectations.extend(tile_13_scale(canvas));
    expectations.extend(tile_14_rotate_45(canvas));
    expectations.extend(tile_15_stroke_rect(canvas));
    expectations.extend(tile_16_thick_line(canvas));
    expectations.extend(tile_17_alpha_overlap(canvas));
    expectations.extend(tile_18_save_layer_alpha(canvas));
    expectations.extend(tile_19_linear_gradient(canvas));
    expectations.extend(tile_20_checkerboard_image(canvas));
    expectations.extend(tile_21_matrix_color_filter(canvas));
    expectations.extend(tile_22_tiny_rect(canvas));
    expectations.extend(tile_23_canvas_edge(canvas));
    expectations.extend(tile_24_clear_blend(canvas));

    expectations
}

// ── Shapes ───────────────────────────────────────────────────────────────────

fn tile_01_rect_solid(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(1);
    canvas.draw_rect(&Rect::from_xywh(ox + 10.0, oy + 10.0, 60.0, 60.0), &Paint::fill(Color::RED));
    vec![
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 40.0), 255, 0, 0, "t01 rect center"),
        PixelExpectation::opaque(px(ox + 12.0), px(oy + 12.0), 255, 0, 0, "t01 rect near corner"),
        PixelExpectation::backdrop(px(ox + 5.0), px(oy + 5.0), "t01 outside rect"),
    ]
}

fn tile_02_rounded_rect_solid(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(2);
    let rrect = RRect::from_rect_xy(Rect::from_xywh(ox + 10.0, oy + 10.0, 60.0, 60.0), 20.0, 20.0);
    canvas.draw_rrect(&rrect, &Paint::fill(Color::BLUE));
    vec![
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 40.0), 0, 0, 255, "t02 rrect center"),
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 12.0), 0, 0, 255, "t02 rrect top edge"),
        PixelExpectation::backdrop(px(ox + 12.0), px(oy + 12.0), "t02 rounded corner cut"),
    ]
}

fn tile_03_circle(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(3);
    canvas.draw_circle(ox + 40.0, oy + 40.0, 25.0, &Paint::fill(Color::GREEN));
    vec![
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 40.0), 0, 255, 0, "t03 circle center"),
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 20.0), 0, 255, 0, "t03 circle inside top"),
        PixelExpectation::backdrop(px(ox + 20.0), px(oy + 20.0), "t03 outside circle"),
    ]
}

fn tile_04_open_triangle(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(4);
    // Left open, so the fill goes through stencil and cover.
    let path = PathBuilder::new()
        .move_to(ox + 40.0, oy + 10.0)
        .line_to(ox + 70.0, oy + 70.0)
        .line_to(ox + 10.0, oy + 70.0)
        .build();
    canvas.draw_path(&path, &Paint::fill(Color::GREEN));
    vec![
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 50.0), 0, 255, 0, "t04 triangle interior"),
        PixelExpectation::backdrop(px(ox + 15.0), px(oy + 15.0), "t04 outside triangle"),
        PixelExpectation::backdrop(px(ox + 65.0), px(oy + 20.0), "t04 outside triangle right"),
    ]
}

fn tile_05_quad_bezier(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(5);
    let path = PathBuilder::new()
        .move_to(ox + 10.0, oy + 70.0)
        .quad_to(ox + 40.0, oy - 10.0, ox + 70.0, oy + 70.0)
        .close()
        .build();
    canvas.draw_path(&path, &Paint::fill(Color::rgb(255, 128, 0)));
    vec![
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 55.0), 255, 128, 0, "t05 bezier interior"),
        PixelExpectation::backdrop(px(ox + 12.0), px(oy + 20.0), "t05 outside curve"),
    ]
}

/// Two overlapping rects in one path: the overlap stays filled under winding.
fn overlapping_rects(ox: f32, oy: f32, fill_type: FillType) -> tessera::Path {
    PathBuilder::new()
        .fill_type(fill_type)
        .move_to(ox + 10.0, oy + 10.0)
        .line_to(ox + 50.0, oy + 10.0)
        .line_to(ox + 50.0, oy + 50.0)
        .line_to(ox + 10.0, oy + 50.0)
        .close()
        .move_to(ox + 30.0, oy + 30.0)
        .line_to(ox + 70.0, oy + 30.0)
        .line_to(ox + 70.0, oy + 70.0)
        .line_to(ox + 30.0, oy + 70.0)
        .close()
        .build()
}

fn tile_06_winding_overlap(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(6);
    canvas.draw_path(&overlapping_rects(ox, oy, FillType::Winding), &Paint::fill(Color::RED));
    vec![
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 40.0), 255, 0, 0, "t06 winding overlap filled"),
        PixelExpectation::opaque(px(ox + 20.0), px(oy + 20.0), 255, 0, 0, "t06 first rect"),
        PixelExpectation::backdrop(px(ox + 60.0), px(oy + 20.0), "t06 outside both"),
    ]
}

fn tile_07_even_odd_overlap(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(7);
    canvas.draw_path(&overlapping_rects(ox, oy, FillType::EvenOdd), &Paint::fill(Color::RED));
    vec![
        PixelExpectation::backdrop(px(ox + 40.0), px(oy + 40.0), "t07 even-odd overlap empty"),
        PixelExpectation::opaque(px(ox + 20.0), px(oy + 20.0), 255, 0, 0, "t07 first rect"),
        PixelExpectation::opaque(px(ox + 60.0), px(oy + 60.0), 255, 0, 0, "t07 second rect"),
    ]
}

// ── Clips ────────────────────────────────────────────────────────────────────

fn tile_08_rect_clip(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(8);
    canvas.save();
    canvas.clip_rect(&Rect::from_xywh(ox + 20.0, oy + 20.0, 40.0, 40.0), ClipOp::Intersect);
    canvas.draw_rect(&Rect::from_xywh(ox + 5.0, oy + 5.0, 70.0, 70.0), &Paint::fill(Color::BLUE));
    canvas.restore();
    vec![
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 40.0), 0, 0, 255, "t08 inside clip"),
        PixelExpectation::backdrop(px(ox + 10.0), px(oy + 10.0), "t08 clipped away"),
    ]
}

fn tile_09_circle_path_clip(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(9);
    canvas.save();
    canvas.clip_path(&tessera::Path::circle(ox + 40.0, oy + 40.0, 25.0), ClipOp::Intersect);
    canvas.draw_rect(&Rect::from_xywh(ox, oy, 80.0, 80.0), &Paint::fill(Color::RED));
    canvas.restore();
    vec![
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 40.0), 255, 0, 0, "t09 inside circle clip"),
        PixelExpectation::backdrop(px(ox + 20.0), px(oy + 20.0), "t09 clip corner"),
        PixelExpectation::backdrop(px(ox + 5.0), px(oy + 40.0), "t09 clip left"),
    ]
}

fn tile_10_difference_clip(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(10);
    canvas.save();
    canvas.clip_rect(&Rect::from_xywh(ox + 30.0, oy + 30.0, 20.0, 20.0), ClipOp::Difference);
    canvas.draw_rect(&Rect::from_xywh(ox + 10.0, oy + 10.0, 60.0, 60.0), &Paint::fill(Color::GREEN));
    canvas.restore();
    vec![
        PixelExpectation::backdrop(px(ox + 40.0), px(oy + 40.0), "t10 hole"),
        PixelExpectation::opaque(px(ox + 20.0), px(oy + 20.0), 0, 255, 0, "t10 around hole"),
    ]
}

fn tile_11_nested_clip_restore(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(11);
    canvas.save();
    canvas.clip_rect(&Rect::from_xywh(ox + 10.0, oy + 10.0, 60.0, 60.0), ClipOp::Intersect);
    canvas.save();
    canvas.clip_rect(&Rect::from_xywh(ox + 10.0, oy + 10.0, 30.0, 30.0), ClipOp::Intersect);
    canvas.draw_rect(&Rect::from_xywh(ox, oy, 80.0, 80.0), &Paint::fill(Color::RED));
    canvas.restore();
    // Only the outer clip applies again.
    canvas.draw_rect(&Rect::from_xywh(ox + 40.0, oy + 40.0, 40.0, 40.0), &Paint::fill(Color::BLUE));
    canvas.restore();
    vec![
        PixelExpectation::opaque(px(ox + 25.0), px(oy + 25.0), 255, 0, 0, "t11 inner clip"),
        PixelExpectation::backdrop(px(ox + 55.0), px(oy + 25.0), "t11 outside inner clip"),
        PixelExpectation::opaque(px(ox + 55.0), px(oy + 55.0), 0, 0, 255, "t11 outer clip after restore"),
        PixelExpectation::backdrop(px(ox + 75.0), px(oy + 75.0), "t11 outside outer clip"),
    ]
}

// ── Transforms ───────────────────────────────────────────────────────────────

fn tile_12_translate(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(12);
    canvas.save();
    canvas.translate(ox + 30.0, oy + 30.0);
    canvas.draw_rect(&Rect::from_wh(40.0, 40.0), &Paint::fill(Color::BLUE));
    canvas.restore();
    vec![
        PixelExpectation::opaque(px(ox + 50.0), px(oy + 50.0), 0, 0, 255, "t12 translated rect"),
        PixelExpectation::backdrop(px(ox + 20.0), px(oy + 20.0), "t12 original spot empty"),
    ]
}

fn tile_13_scale(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(13);
    canvas.save();
    canvas.translate(ox + 10.0, oy + 10.0);
    canvas.scale(3.0, 2.0);
    canvas.draw_rect(&Rect::from_wh(20.0, 20.0), &Paint::fill(Color::RED));
    canvas.restore();
    vec![
        PixelExpectation::opaque(px(ox + 65.0), px(oy + 45.0), 255, 0, 0, "t13 scaled x"),
        PixelExpectation::backdrop(px(ox + 40.0), px(oy + 60.0), "t13 below scaled y"),
    ]
}

fn tile_14_rotate_45(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(14);
    canvas.save();
    canvas.translate(ox + 40.0, oy + 40.0);
    canvas.rotate(45.0);
    canvas.draw_rect(&Rect::from_xywh(-20.0, -20.0, 40.0, 40.0), &Paint::fill(Color::GREEN));
    canvas.restore();
    // A diamond: its corners reach ~28px out along the axes.
    vec![
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 40.0), 0, 255, 0, "t14 rotated center"),
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 15.0), 0, 255, 0, "t14 rotated top corner"),
        PixelExpectation::backdrop(px(ox + 22.0), px(oy + 22.0), "t14 cut corner"),
    ]
}

// ── Strokes ──────────────────────────────────────────────────────────────────

fn tile_15_stroke_rect(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(15);
    canvas.draw_rect(&Rect::from_xywh(ox + 15.0, oy + 15.0, 50.0, 50.0), &Paint::stroke(Color::BLUE, 6.0));
    vec![
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 15.0), 0, 0, 255, "t15 top stroke"),
        PixelExpectation::opaque(px(ox + 15.0), px(oy + 40.0), 0, 0, 255, "t15 left stroke"),
        PixelExpectation::backdrop(px(ox + 40.0), px(oy + 40.0), "t15 hollow center"),
    ]
}

fn tile_16_thick_line(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(16);
    canvas.draw_line(ox + 10.0, oy + 40.0, ox + 70.0, oy + 40.0, &Paint::stroke(Color::RED, 8.0));
    // Fill style draws nothing for a line.
    canvas.draw_line(ox + 10.0, oy + 60.0, ox + 70.0, oy + 60.0, &Paint::fill(Color::RED));
    vec![
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 40.0), 255, 0, 0, "t16 line center"),
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 37.0), 255, 0, 0, "t16 line width"),
        PixelExpectation::backdrop(px(ox + 40.0), px(oy + 50.0), "t16 beside line"),
        PixelExpectation::backdrop(px(ox + 40.0), px(oy + 60.0), "t16 filled line skipped"),
    ]
}

// ── Blending and layers ──────────────────────────────────────────────────────

fn tile_17_alpha_overlap(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(17);
    let mut red = Paint::fill(Color::RED);
    red.set_alpha(0.5);
    let mut blue = Paint::fill(Color::BLUE);
    blue.set_alpha(0.5);
    canvas.draw_rect(&Rect::from_xywh(ox + 10.0, oy + 10.0, 40.0, 40.0), &red);
    canvas.draw_rect(&Rect::from_xywh(ox + 30.0, oy + 30.0, 40.0, 40.0), &blue);
    vec![
        PixelExpectation::composited(px(ox + 20.0), px(oy + 20.0), RED, 0.5, WHITE, "t17 half red over white"),
        PixelExpectation::composited(px(ox + 60.0), px(oy + 60.0), BLUE, 0.5, WHITE, "t17 half blue over white"),
        PixelExpectation::composited(
            px(ox + 40.0),
            px(oy + 40.0),
            BLUE,
            0.5,
            src_over(RED, 0.5, WHITE),
            "t17 blue over red",
        ),
    ]
}

fn tile_18_save_layer_alpha(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(18);
    let mut layer_paint = Paint::default();
    layer_paint.set_alpha(0.5);
    let bounds = Rect::from_xywh(ox + 10.0, oy + 10.0, 60.0, 60.0);
    canvas.save_layer(Some(&bounds), Some(&layer_paint));
    // Overlapping opaque draws inside the layer must not double up.
    canvas.draw_rect(&Rect::from_xywh(ox + 10.0, oy + 10.0, 40.0, 60.0), &Paint::fill(Color::GREEN));
    canvas.draw_rect(&Rect::from_xywh(ox + 30.0, oy + 10.0, 40.0, 60.0), &Paint::fill(Color::GREEN));
    canvas.restore();
    vec![
        PixelExpectation::composited(px(ox + 20.0), px(oy + 40.0), GREEN, 0.5, WHITE, "t18 layer alpha"),
        PixelExpectation::composited(px(ox + 40.0), px(oy + 40.0), GREEN, 0.5, WHITE, "t18 overlap composited once"),
        PixelExpectation::backdrop(px(ox + 5.0), px(oy + 5.0), "t18 outside layer"),
    ]
}

// ── Shaders and filters ──────────────────────────────────────────────────────

fn tile_19_linear_gradient(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(19);
    let gradient = GradientShader::linear(
        point(ox + 10.0, oy),
        point(ox + 70.0, oy),
        vec![Color::RED.to_color4f(), Color::BLUE.to_color4f()],
        vec![0.0, 1.0],
        TileMode::Clamp,
    );
    let mut paint = Paint::fill(Color::BLACK);
    paint.shader = Some(Arc::new(Shader::Gradient(gradient)));
    canvas.draw_rect(&Rect::from_xywh(ox + 10.0, oy + 10.0, 60.0, 60.0), &paint);
    vec![
        PixelExpectation::opaque(px(ox + 11.0), px(oy + 40.0), 255, 0, 0, "t19 gradient start").with_tolerance(12),
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 40.0), 128, 0, 128, "t19 gradient middle").with_tolerance(12),
        PixelExpectation::opaque(px(ox + 69.0), px(oy + 40.0), 0, 0, 255, "t19 gradient end").with_tolerance(12),
    ]
}

/// 4x4 black and white checkerboard, white in the top-left cell.
fn checkerboard() -> Image {
    let mut pixels = Vec::with_capacity(4 * 4 * 4);
    for y in 0..4 {
        for x in 0..4 {
            let v = if (x + y) % 2 == 0 { 255 } else { 0 };
            pixels.extend_from_slice(&[v, v, v, 255]);
        }
    }
    Image::Pixmap(Arc::new(Pixmap::from_rgba(4, 4, pixels)))
}

fn tile_20_checkerboard_image(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(20);
    // Gray backdrop so the white cells can be told apart from the background.
    canvas.draw_rect(&Rect::from_xywh(ox + 5.0, oy + 5.0, 70.0, 70.0), &Paint::fill(Color::rgb(128, 128, 128)));
    let image = checkerboard();
    canvas.draw_image_rect(
        &image,
        &Rect::from_wh(4.0, 4.0),
        &Rect::from_xywh(ox + 10.0, oy + 10.0, 60.0, 60.0),
        SamplingOptions::default(),
        None,
    );
    // 15px cells.
    vec![
        PixelExpectation::opaque(px(ox + 17.0), px(oy + 17.0), 255, 255, 255, "t20 cell (0,0) white"),
        PixelExpectation::opaque(px(ox + 32.0), px(oy + 17.0), 0, 0, 0, "t20 cell (1,0) black"),
        PixelExpectation::opaque(px(ox + 32.0), px(oy + 32.0), 255, 255, 255, "t20 cell (1,1) white"),
        PixelExpectation::opaque(px(ox + 62.0), px(oy + 17.0), 0, 0, 0, "t20 cell (3,0) black"),
        PixelExpectation::opaque(px(ox + 7.0), px(oy + 7.0), 128, 128, 128, "t20 backdrop"),
    ]
}

fn tile_21_matrix_color_filter(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(21);
    #[rustfmt::skip]
    let swap_red_green = [
        0.0, 1.0, 0.0, 0.0, 0.0,
        1.0, 0.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0, 0.0,
    ];
    let mut paint = Paint::fill(Color::RED);
    paint.color_filter = Some(Arc::new(ColorFilter::Matrix(swap_red_green)));
    canvas.draw_rect(&Rect::from_xywh(ox + 10.0, oy + 10.0, 60.0, 60.0), &paint);
    vec![PixelExpectation::opaque(px(ox + 40.0), px(oy + 40.0), 0, 255, 0, "t21 red filtered to green")]
}

// ── Edge cases ───────────────────────────────────────────────────────────────

fn tile_22_tiny_rect(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(22);
    canvas.draw_rect(&Rect::from_xywh(ox + 40.0, oy + 40.0, 1.0, 1.0), &Paint::fill(Color::BLACK));
    // Zero-area draws are dropped.
    canvas.draw_rect(&Rect::from_xywh(ox + 20.0, oy + 20.0, 0.0, 10.0), &Paint::fill(Color::BLACK));
    vec![
        PixelExpectation::opaque(px(ox + 40.0), px(oy + 40.0), 0, 0, 0, "t22 single pixel"),
        PixelExpectation::backdrop(px(ox + 41.0), px(oy + 40.0), "t22 right of pixel"),
        PixelExpectation::backdrop(px(ox + 20.0), px(oy + 25.0), "t22 zero width"),
    ]
}

fn tile_23_canvas_edge(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, _) = tile_origin(23);
    let bottom = CANVAS_HEIGHT as f32;
    canvas.draw_rect(&Rect::from_xywh(ox + 20.0, bottom - 20.0, 40.0, 60.0), &Paint::fill(Color::BLUE));
    // Entirely off the canvas.
    canvas.draw_rect(&Rect::from_xywh(ox + 20.0, bottom + 10.0, 40.0, 40.0), &Paint::fill(Color::RED));
    vec![
        PixelExpectation::opaque(px(ox + 40.0), CANVAS_HEIGHT - 1, 0, 0, 255, "t23 last row"),
        PixelExpectation::opaque(px(ox + 40.0), CANVAS_HEIGHT - 15, 0, 0, 255, "t23 partly visible"),
        PixelExpectation::backdrop(px(ox + 40.0), CANVAS_HEIGHT - 30, "t23 above shape"),
    ]
}

fn tile_24_clear_blend(canvas: &mut HwCanvas) -> Vec<PixelExpectation> {
    let (ox, oy) = tile_origin(24);
    canvas.draw_rect(&Rect::from_xywh(ox + 10.0, oy + 10.0, 60.0, 60.0), &Paint::fill(Color::RED));
    let mut clear = Paint::fill(Color::BLACK);
    clear.blend_mode = BlendMode::Clear;
    canvas.draw_rect(&Rect::from_xywh(ox + 30.0, oy + 30.0, 20.0, 20.0), &clear);
    vec![
        PixelExpectation::transparent(px(ox + 40.0), px(oy + 40.0), "t24 cleared"),
        PixelExpectation::opaque(px(ox + 20.0), px(oy + 20.0), 255, 0, 0, "t24 untouched"),
    ]
}
