//! Compiled pipelines, shader functions and samplers, cached for the life of a context.

use std::sync::Arc;

use ahash::AHashMap;
use tracing::{debug, trace_span};

use crate::config::ErrorCallback;
use crate::gpu::{
    BlendFactor, ColorTargetState, DepthStencilState, GpuDevice, GpuRenderPipeline, GpuSampler,
    GpuShaderFunction, RenderPipelineDescriptor, SamplerDescriptor, ShaderFunctionDescriptor, ShaderStage,
    TextureFormat, VertexBufferLayout, COLOR_WRITE_ALL,
};
use crate::paint::BlendMode;
use crate::shader::WgslShaderWriter;

/// Identity of a bucket of pipelines that share their shader programs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HwPipelineKey {
    pub vs_name: String,
    pub fs_name: String,
    pub vs_constants: Vec<i32>,
    pub fs_constants: Vec<i32>,
}

impl HwPipelineKey {
    pub fn new(vs_name: impl Into<String>, fs_name: impl Into<String>) -> Self {
        Self {
            vs_name: vs_name.into(),
            fs_name: fs_name.into(),
            vs_constants: Vec::new(),
            fs_constants: Vec::new(),
        }
    }
}

/// The fixed-function state a draw step asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct HwPipelineDescriptor {
    pub color_mask: u32,
    pub blend_mode: BlendMode,
    pub color_format: TextureFormat,
    pub sample_count: u32,
    pub depth_stencil: DepthStencilState,
    pub buffers: Vec<VertexBufferLayout>,
}

impl Default for HwPipelineDescriptor {
    fn default() -> Self {
        Self {
            color_mask: COLOR_WRITE_ALL,
            blend_mode: BlendMode::SrcOver,
            color_format: TextureFormat::Rgba8Unorm,
            sample_count: 1,
            depth_stencil: DepthStencilState::default(),
            buffers: Vec::new(),
        }
    }
}

impl HwPipelineDescriptor {
    pub fn target(&self) -> ColorTargetState {
        let (src_blend_factor, dst_blend_factor) = blend_factors(self.blend_mode);
        ColorTargetState {
            format: self.color_format,
            src_blend_factor,
            dst_blend_factor,
            write_mask: self.color_mask,
        }
    }

    fn to_render_pipeline(
        &self,
        vertex_function: Arc<dyn GpuShaderFunction>,
        fragment_function: Arc<dyn GpuShaderFunction>,
        label: &str,
    ) -> RenderPipelineDescriptor {
        RenderPipelineDescriptor {
            vertex_function,
            fragment_function,
            buffers: self.buffers.clone(),
            target: self.target(),
            depth_stencil: self.depth_stencil,
            sample_count: self.sample_count,
            label: label.to_string(),
        }
    }
}

/// Source and destination factors of a premultiplied blend mode. Separable and
/// non-separable modes that fixed-function blending cannot express fall back to
/// source-over.
pub fn blend_factors(mode: BlendMode) -> (BlendFactor, BlendFactor) {
    use BlendFactor::*;
    match mode {
        BlendMode::Clear => (Zero, Zero),
        BlendMode::Src => (One, Zero),
        BlendMode::Dst => (Zero, One),
        BlendMode::DstOver => (OneMinusDstAlpha, One),
        BlendMode::SrcIn => (DstAlpha, Zero),
        BlendMode::DstIn => (Zero, SrcAlpha),
        BlendMode::SrcOut => (OneMinusDstAlpha, Zero),
        BlendMode::DstOut => (Zero, OneMinusSrcAlpha),
        BlendMode::SrcATop => (DstAlpha, OneMinusSrcAlpha),
        BlendMode::DstATop => (OneMinusDstAlpha, SrcAlpha),
        BlendMode::Xor => (OneMinusDstAlpha, OneMinusSrcAlpha),
        BlendMode::Plus => (One, One),
        BlendMode::SrcOver => (One, OneMinusSrcAlpha),
        mode => {
            debug!(?mode, "no fixed-function factors for blend mode, drawing source-over");
            (One, OneMinusSrcAlpha)
        }
    }
}

type FunctionKey = (String, Vec<i32>);

pub struct HwPipelineLib {
    device: Arc<dyn GpuDevice>,
    error_callback: Option<ErrorCallback>,
    /// The first pipeline of each bucket is the one the shaders were compiled for.
    pipelines: AHashMap<HwPipelineKey, Vec<Arc<dyn GpuRenderPipeline>>>,
    functions: AHashMap<FunctionKey, Arc<dyn GpuShaderFunction>>,
    samplers: AHashMap<SamplerDescriptor, Arc<dyn GpuSampler>>,
}

impl HwPipelineLib {
    pub fn new(device: Arc<dyn GpuDevice>, error_callback: Option<ErrorCallback>) -> Self {
        Self {
            device,
            error_callback,
            pipelines: AHashMap::new(),
            functions: AHashMap::new(),
            samplers: AHashMap::new(),
        }
    }

    /// Finds or builds the pipeline for `key` in the state `desc` asks for.
    ///
    /// Shader source is generated by `writer` only when no function of that name and
    /// those constants was compiled before. A pipeline whose shaders failed to compile is
    /// cached like any other and stays invalid, so the error callback fires once.
    pub fn get_pipeline(
        &mut self,
        key: &HwPipelineKey,
        desc: &HwPipelineDescriptor,
        writer: &WgslShaderWriter<'_>,
    ) -> Arc<dyn GpuRenderPipeline> {
        let _span = trace_span!("get_pipeline", vs = %key.vs_name, fs = %key.fs_name).entered();

        if let Some(bucket) = self.pipelines.get_mut(key) {
            let base = bucket[0].clone();
            let base_desc = base.descriptor();
            let requested = desc.to_render_pipeline(
                base_desc.vertex_function.clone(),
                base_desc.fragment_function.clone(),
                &key.fs_name,
            );
            if let Some(found) = bucket.iter().find(|p| p.descriptor().same_state(&requested)) {
                return found.clone();
            }
            debug!(fs = %key.fs_name, "new pipeline variant");
            let variant = if self.device.supports_pipeline_clone() {
                self.device.clone_pipeline(&base, requested)
            } else {
                self.device.create_render_pipeline(requested)
            };
            bucket.push(variant.clone());
            return variant;
        }

        let vs = self.shader_function(
            &key.vs_name,
            ShaderStage::VERTEX,
            &key.vs_constants,
            "vs_main",
            || writer.gen_vs_source(),
        );
        let fs = self.shader_function(
            &key.fs_name,
            ShaderStage::FRAGMENT,
            &key.fs_constants,
            "fs_main",
            || writer.gen_fs_source(),
        );
        let pipeline = self
            .device
            .create_render_pipeline(desc.to_render_pipeline(vs, fs, &key.fs_name));
        self.pipelines.insert(key.clone(), vec![pipeline.clone()]);
        pipeline
    }

    fn shader_function(
        &mut self,
        name: &str,
        stage: ShaderStage,
        constants: &[i32],
        entry_point: &str,
        source: impl FnOnce() -> String,
    ) -> Arc<dyn GpuShaderFunction> {
        let function_key = (name.to_string(), constants.to_vec());
        if let Some(function) = self.functions.get(&function_key) {
            return function.clone();
        }
        let function = self.device.create_shader_function(&ShaderFunctionDescriptor {
            label: name.to_string(),
            stage,
            source: source(),
            entry_point: entry_point.to_string(),
            constant_values: constants.to_vec(),
            error_callback: self.error_callback.clone(),
        });
        self.functions.insert(function_key, function.clone());
        function
    }

    pub fn sampler(&mut self, desc: &SamplerDescriptor) -> Arc<dyn GpuSampler> {
        self.samplers
            .entry(*desc)
            .or_insert_with(|| self.device.create_sampler(desc))
            .clone()
    }

    /// Number of pipeline buckets, one per distinct shader pair.
    pub fn bucket_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Number of pipelines across all buckets.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for HwPipelineLib {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HwPipelineLib")
            .field("buckets", &self.pipelines.len())
            .field("functions", &self.functions.len())
            .field("samplers", &self.samplers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::color::Color4f;
    use crate::geometry::Matrix;
    use crate::gpu::headless::HeadlessDevice;
    use crate::gpu::Command;
    use crate::hw::HwDrawContext;
    use crate::paint::Paint;
    use crate::path::Path;
    use crate::shader::fragment::SolidColorFragment;
    use crate::shader::geometry::PathGeometry;
    use crate::shader::{ShaderFlags, WgslGeometry};

    fn lib() -> (Arc<HeadlessDevice>, HwPipelineLib) {
        let device = Arc::new(HeadlessDevice::default());
        let lib = HwPipelineLib::new(device.clone(), None);
        (device, lib)
    }

    fn green_triangle() -> Path {
        Path::builder()
            .move_to(100.0, 100.0)
            .line_to(200.0, 200.0)
            .line_to(100.0, 200.0)
            .close()
            .build()
    }

    #[test]
    fn same_key_and_state_compiles_once() {
        let (device, mut lib) = lib();
        let path = green_triangle();
        let paint = Paint::default();
        let geometry = PathGeometry::new(&path, &paint, false);
        let fragment = SolidColorFragment::new(Color4f::new(0.0, 1.0, 0.0, 1.0));
        let writer = WgslShaderWriter::new(&geometry, &fragment);
        let key = HwPipelineKey::new(writer.vs_shader_name(), writer.fs_shader_name());
        let desc = HwPipelineDescriptor::default();

        let first = lib.get_pipeline(&key, &desc, &writer);
        let second = lib.get_pipeline(&key, &desc, &writer);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.is_valid());
        assert_eq!(device.stats().shader_compiles(), 2);
        assert_eq!(device.stats().pipelines_created(), 1);
        assert_eq!(first.descriptor().label, "FS_SolidColor");
    }

    #[test]
    fn state_variants_share_the_compiled_program() {
        let (device, mut lib) = lib();
        let path = green_triangle();
        let paint = Paint::default();
        let geometry = PathGeometry::new(&path, &paint, false);
        let fragment = SolidColorFragment::new(Color4f::BLACK);
        let writer = WgslShaderWriter::new(&geometry, &fragment);
        let key = HwPipelineKey::new(writer.vs_shader_name(), writer.fs_shader_name());

        let src_over = lib.get_pipeline(&key, &HwPipelineDescriptor::default(), &writer);
        let plus = HwPipelineDescriptor {
            blend_mode: BlendMode::Plus,
            ..Default::default()
        };
        let additive = lib.get_pipeline(&key, &plus, &writer);
        let again = lib.get_pipeline(&key, &plus, &writer);

        assert!(!Arc::ptr_eq(&src_over, &additive));
        assert!(Arc::ptr_eq(&additive, &again));
        assert_eq!(device.stats().shader_compiles(), 2);
        assert_eq!(device.stats().pipelines_cloned(), 1);
        assert_eq!(lib.bucket_count(), 1);
        assert_eq!(lib.pipeline_count(), 2);
        assert_eq!(additive.descriptor().target.src_blend_factor, BlendFactor::One);
        assert_eq!(additive.descriptor().target.dst_blend_factor, BlendFactor::One);
    }

    struct BrokenGeometry;

    impl WgslGeometry for BrokenGeometry {
        fn flags(&self) -> ShaderFlags {
            ShaderFlags::empty()
        }

        fn name(&self) -> String {
            "Broken".to_string()
        }

        fn gen_source_wgsl(&self) -> String {
            "@vertex fn vs_main( -> {".to_string()
        }

        fn buffer_layout(&self) -> Vec<VertexBufferLayout> {
            Vec::new()
        }

        fn prepare_cmd(
            &self,
            _cmd: &mut Command,
            _ctx: &mut HwDrawContext<'_, '_>,
            _transform: &Matrix,
            _clip_depth: f32,
            _stencil_cmd: Option<&Command>,
        ) {
        }
    }

    #[test]
    fn compile_errors_report_once_and_yield_an_invalid_pipeline() {
        let device = Arc::new(HeadlessDevice::default());
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = errors.clone();
        let callback: ErrorCallback = Arc::new(move |_msg: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut lib = HwPipelineLib::new(device.clone(), Some(callback));

        let fragment = SolidColorFragment::new(Color4f::BLACK);
        let writer = WgslShaderWriter::new(&BrokenGeometry, &fragment);
        let key = HwPipelineKey::new(writer.vs_shader_name(), writer.fs_shader_name());
        let first = lib.get_pipeline(&key, &HwPipelineDescriptor::default(), &writer);
        let second = lib.get_pipeline(&key, &HwPipelineDescriptor::default(), &writer);

        assert!(!first.is_valid());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn samplers_are_deduplicated() {
        let (_device, mut lib) = lib();
        let a = lib.sampler(&SamplerDescriptor::linear());
        let b = lib.sampler(&SamplerDescriptor::linear());
        let c = lib.sampler(&SamplerDescriptor::default());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn porter_duff_factors() {
        use BlendFactor::*;
        assert_eq!(blend_factors(BlendMode::SrcOver), (One, OneMinusSrcAlpha));
        assert_eq!(blend_factors(BlendMode::DstIn), (Zero, SrcAlpha));
        assert_eq!(blend_factors(BlendMode::Xor), (OneMinusDstAlpha, OneMinusSrcAlpha));
        assert_eq!(blend_factors(BlendMode::Multiply), (One, OneMinusSrcAlpha));
    }

    /// Counts DEBUG events on the current thread.
    #[derive(Default)]
    struct DebugEvents(AtomicUsize);

    impl tracing::Subscriber for DebugEvents {
        fn enabled(&self, _: &tracing::Metadata<'_>) -> bool {
            true
        }
        fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
            tracing::span::Id::from_u64(1)
        }
        fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}
        fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}
        fn event(&self, event: &tracing::Event<'_>) {
            if *event.metadata().level() == tracing::Level::DEBUG {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        fn enter(&self, _: &tracing::span::Id) {}
        fn exit(&self, _: &tracing::span::Id) {}
    }

    #[test]
    fn advanced_modes_log_their_source_over_fallback() {
        let events = Arc::new(DebugEvents::default());
        tracing::subscriber::with_default(events.clone(), || {
            blend_factors(BlendMode::SrcOver);
            blend_factors(BlendMode::Plus);
        });
        assert_eq!(events.0.load(Ordering::SeqCst), 0);
        tracing::subscriber::with_default(events.clone(), || {
            blend_factors(BlendMode::Multiply);
            blend_factors(BlendMode::Screen);
        });
        assert_eq!(events.0.load(Ordering::SeqCst), 2);
    }
}
