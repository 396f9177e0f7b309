//! Pipeline reuse across frames and surfaces of one context.

use std::sync::Arc;

use tessera::gpu::headless::HeadlessDevice;
use tessera::{BlendMode, Color, ContextOptions, GpuContext, Paint, Rect, SurfaceOptions};

fn context() -> (Arc<HeadlessDevice>, GpuContext) {
    let device = Arc::new(HeadlessDevice::default());
    let context = GpuContext::new(device.clone(), ContextOptions::default());
    (device, context)
}

fn options() -> SurfaceOptions {
    SurfaceOptions {
        width: 64,
        height: 64,
        ..SurfaceOptions::default()
    }
}

fn draw_red_square(surface: &mut tessera::GpuSurface, blend_mode: BlendMode) {
    let mut paint = Paint::fill(Color::RED);
    paint.blend_mode = blend_mode;
    surface
        .lock_canvas()
        .draw_rect(&Rect::from_xywh(8.0, 8.0, 32.0, 32.0), &paint);
    surface.flush_and_submit();
}

#[test]
fn repeated_frames_compile_shaders_once() {
    let (device, context) = context();
    let mut surface = context.create_surface(&options()).unwrap();

    draw_red_square(&mut surface, BlendMode::SrcOver);
    let compiles = device.stats().shader_compiles();
    let pipelines = context.pipeline_lib().pipeline_count();
    assert!(compiles > 0);

    for _ in 0..5 {
        draw_red_square(&mut surface, BlendMode::SrcOver);
    }
    assert_eq!(device.stats().shader_compiles(), compiles);
    assert_eq!(context.pipeline_lib().pipeline_count(), pipelines);
}

#[test]
fn a_new_blend_mode_adds_a_variant_without_recompiling() {
    let (device, context) = context();
    let mut surface = context.create_surface(&options()).unwrap();

    draw_red_square(&mut surface, BlendMode::SrcOver);
    let compiles = device.stats().shader_compiles();
    let buckets = context.pipeline_lib().bucket_count();
    let pipelines = context.pipeline_lib().pipeline_count();

    draw_red_square(&mut surface, BlendMode::Plus);
    assert_eq!(device.stats().shader_compiles(), compiles);
    assert_eq!(context.pipeline_lib().bucket_count(), buckets);
    assert_eq!(context.pipeline_lib().pipeline_count(), pipelines + 1);
}

#[test]
fn surfaces_of_one_context_share_compiled_programs() {
    let (device, context) = context();
    let mut first = context.create_surface(&options()).unwrap();
    let mut second = context.create_surface(&options()).unwrap();

    draw_red_square(&mut first, BlendMode::SrcOver);
    let compiles = device.stats().shader_compiles();
    draw_red_square(&mut second, BlendMode::SrcOver);
    assert_eq!(device.stats().shader_compiles(), compiles);
}
