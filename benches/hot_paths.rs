use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use tessera::color::Color4f;
use tessera::gpu::headless::HeadlessDevice;
use tessera::hw::{HwPipelineDescriptor, HwPipelineKey, HwPipelineLib};
use tessera::shader::fragment::SolidColorFragment;
use tessera::shader::geometry::PathGeometry;
use tessera::shader::WgslShaderWriter;
use tessera::text::AtlasAllocator;
use tessera::{BlendMode, Paint, Path, Rect};

/// Glyph-like sizes, cycled so rows fill unevenly.
const GLYPH_SIZES: [(u32, u32); 6] = [(7, 12), (9, 14), (12, 16), (5, 9), (14, 18), (10, 10)];

fn bench_atlas_packing(c: &mut Criterion) {
    c.bench_function("atlas_pack_2048_until_full", |b| {
        b.iter(|| {
            let mut allocator = AtlasAllocator::new(2048, 2048);
            let mut placed = 0u32;
            for (w, h) in GLYPH_SIZES.iter().cycle().take(20_000) {
                if allocator.allocate_region(*w, *h).is_valid() {
                    placed += 1;
                }
            }
            black_box((placed, allocator.used_area()));
        })
    });
}

fn bench_pipeline_lookup(c: &mut Criterion) {
    let device = Arc::new(HeadlessDevice::default());
    let mut lib = HwPipelineLib::new(device, None);
    let path = Path::rect(&Rect::from_wh(10.0, 10.0));
    let paint = Paint::default();
    let geometry = PathGeometry::new(&path, &paint, false);
    let fragment = SolidColorFragment::new(Color4f::BLACK);
    let writer = WgslShaderWriter::new(&geometry, &fragment);
    let key = HwPipelineKey::new(writer.vs_shader_name(), writer.fs_shader_name());
    let descriptors: Vec<HwPipelineDescriptor> = [BlendMode::SrcOver, BlendMode::Plus, BlendMode::DstIn]
        .into_iter()
        .map(|blend_mode| HwPipelineDescriptor {
            blend_mode,
            ..HwPipelineDescriptor::default()
        })
        .collect();
    for desc in &descriptors {
        lib.get_pipeline(&key, desc, &writer);
    }

    c.bench_function("pipeline_lookup_cached_variants", |b| {
        b.iter(|| {
            for desc in &descriptors {
                black_box(lib.get_pipeline(&key, desc, &writer));
            }
        })
    });
}

criterion_group!(hot_paths, bench_atlas_packing, bench_pipeline_lookup);
criterion_main!(hot_paths);
