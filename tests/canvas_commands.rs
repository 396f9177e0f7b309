//! Draw calls recorded on the headless backend, checked command by command.

use std::sync::Arc;

use tessera::gpu::headless::{HeadlessBuffer, HeadlessDevice, RecordedPass};
use tessera::gpu::{Command, CompareFunction, StencilOperation};
use tessera::{
    Color, ContextOptions, GpuContext, GpuSurface, Paint, PathBuilder, RRect, Rect, SurfaceOptions,
};

fn setup(options: ContextOptions) -> (Arc<HeadlessDevice>, GpuContext, GpuSurface) {
    let device = Arc::new(HeadlessDevice::default());
    let context = GpuContext::new(device.clone(), options);
    let surface = context
        .create_surface(&SurfaceOptions {
            width: 128,
            height: 128,
            ..SurfaceOptions::default()
        })
        .unwrap();
    (device, context, surface)
}

fn shader_names(cmd: &Command) -> (String, String) {
    let pipeline = cmd.pipeline.as_ref().expect("command without pipeline");
    let desc = pipeline.descriptor();
    (
        desc.vertex_function.label().to_string(),
        desc.fragment_function.label().to_string(),
    )
}

/// The floats a command's uniform binding points at, read back from the headless buffer.
fn uniform_floats(cmd: &Command, name: &str) -> Vec<f32> {
    let binding = cmd
        .uniform_bindings
        .iter()
        .find(|u| u.name == name)
        .unwrap_or_else(|| panic!("no uniform named {name}"));
    let buffer = binding.buffer.buffer.as_ref().expect("unbound uniform");
    let headless = buffer
        .as_any()
        .downcast_ref::<HeadlessBuffer>()
        .expect("not a headless buffer");
    let start = binding.buffer.offset as usize;
    let end = start + binding.buffer.size as usize;
    headless.contents()[start..end]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn only_pass(device: &HeadlessDevice) -> RecordedPass {
    let mut passes = device.recorded_passes();
    assert_eq!(passes.len(), 1, "expected a single render pass");
    passes.remove(0)
}

#[test]
fn open_triangle_is_stenciled_then_covered() {
    let (device, _context, mut surface) = setup(ContextOptions::default());
    let triangle = PathBuilder::new()
        .move_to(64.0, 10.0)
        .line_to(118.0, 118.0)
        .line_to(10.0, 118.0)
        .build();
    surface
        .lock_canvas()
        .draw_path(&triangle, &Paint::fill(Color::GREEN));
    surface.flush_and_submit();

    let pass = only_pass(&device);
    assert_eq!(pass.commands.len(), 2);

    let (stencil_vs, stencil_fs) = shader_names(&pass.commands[0]);
    assert_eq!(stencil_vs, "VS_Path");
    assert_eq!(stencil_fs, "FS_Stencil");
    let stencil = pass.commands[0].pipeline.as_ref().unwrap().descriptor();
    assert!(stencil.depth_stencil.enable_stencil);
    assert_eq!(stencil.target.write_mask, 0, "the stencil step writes no color");

    let (cover_vs, cover_fs) = shader_names(&pass.commands[1]);
    assert_eq!(cover_vs, "VS_Path");
    assert_eq!(cover_fs, "FS_SolidColor");
    let cover = pass.commands[1].pipeline.as_ref().unwrap().descriptor();
    let face = cover.depth_stencil.stencil_state.front;
    assert_eq!(face.compare, CompareFunction::NotEqual);
    assert_eq!(face.pass_op, StencilOperation::Replace);
    assert_eq!(face.fail_op, StencilOperation::Keep);
    assert_eq!(&uniform_floats(&pass.commands[1], "uColor")[..4], &[0.0, 1.0, 0.0, 1.0]);
}

#[test]
fn closed_triangle_fills_in_one_pass() {
    let (device, _context, mut surface) = setup(ContextOptions::default());
    let triangle = PathBuilder::new()
        .move_to(64.0, 10.0)
        .line_to(118.0, 118.0)
        .line_to(10.0, 118.0)
        .close()
        .build();
    surface
        .lock_canvas()
        .draw_path(&triangle, &Paint::fill(Color::GREEN));
    surface.flush_and_submit();

    let pass = only_pass(&device);
    assert_eq!(pass.commands.len(), 1);
    assert_eq!(shader_names(&pass.commands[0]).1, "FS_SolidColor");
}

#[test]
fn adjacent_rrects_merge_into_one_instanced_command() {
    let (device, _context, mut surface) = setup(ContextOptions::default());
    let canvas = surface.lock_canvas();
    for i in 0..3 {
        let rect = Rect::from_xywh(10.0 + i as f32 * 30.0, 10.0, 20.0, 20.0);
        canvas.draw_rrect(&RRect::from_rect_xy(rect, 4.0, 4.0), &Paint::fill(Color::BLUE));
    }
    surface.flush_and_submit();

    let pass = only_pass(&device);
    assert_eq!(pass.commands.len(), 1);
    assert_eq!(pass.commands[0].instance_count, 3);
    assert!(shader_names(&pass.commands[0]).0.starts_with("VS_RRect"));
}

#[test]
fn rrects_stay_separate_without_merging() {
    let options = ContextOptions {
        enable_merging_draw_call: false,
        ..ContextOptions::default()
    };
    let (device, _context, mut surface) = setup(options);
    let canvas = surface.lock_canvas();
    for i in 0..3 {
        let rect = Rect::from_xywh(10.0 + i as f32 * 30.0, 10.0, 20.0, 20.0);
        canvas.draw_rrect(&RRect::from_rect_xy(rect, 4.0, 4.0), &Paint::fill(Color::BLUE));
    }
    surface.flush_and_submit();

    let pass = only_pass(&device);
    assert_eq!(pass.commands.len(), 3);
    assert!(pass.commands.iter().all(|cmd| cmd.instance_count == 1));
}

#[test]
fn layers_render_before_the_root_pass() {
    let (device, _context, mut surface) = setup(ContextOptions::default());
    let canvas = surface.lock_canvas();
    let mut layer_paint = Paint::default();
    layer_paint.set_alpha(0.5);
    canvas.save_layer(Some(&Rect::from_xywh(16.0, 16.0, 64.0, 64.0)), Some(&layer_paint));
    canvas.draw_rect(&Rect::from_xywh(16.0, 16.0, 64.0, 64.0), &Paint::fill(Color::RED));
    canvas.restore();
    surface.flush_and_submit();

    let passes = device.recorded_passes();
    assert_eq!(passes.len(), 2);
    assert_eq!(passes[0].descriptor.target_width(), 64);
    assert_eq!(passes[1].descriptor.target_width(), 128);

    let composite = &passes[1].commands;
    assert_eq!(composite.len(), 1);
    assert!(shader_names(&composite[0]).1.starts_with("FS_Texture"));
}

#[test]
fn nothing_is_recorded_for_rejected_draws() {
    let (device, _context, mut surface) = setup(ContextOptions::default());
    let canvas = surface.lock_canvas();
    canvas.draw_rect(&Rect::from_xywh(500.0, 500.0, 10.0, 10.0), &Paint::fill(Color::RED));
    canvas.draw_line(0.0, 0.0, 50.0, 50.0, &Paint::fill(Color::RED));
    surface.flush_and_submit();

    let pass = only_pass(&device);
    assert!(pass.commands.is_empty());
}
