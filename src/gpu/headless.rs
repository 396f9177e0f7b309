//! A recording backend with no rasterizer.
//!
//! Buffers and textures live in CPU memory, render passes are kept as submitted and every
//! compile or pipeline creation is counted. It stands in for a driver in tests and reports
//! program-object semantics: cloning a pipeline reuses the compiled program.

use std::any::Any;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, error};

use super::*;
use crate::error::{Result, TesseraError};
use crate::shader::reflect::reflect_bind_groups;

#[derive(Debug, Clone, Copy)]
pub struct HeadlessOptions {
    pub max_texture_size: u32,
    pub buffer_alignment: u32,
    pub supports_msaa: bool,
    pub tile_msaa: bool,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            max_texture_size: 8192,
            buffer_alignment: 256,
            supports_msaa: true,
            tile_msaa: false,
        }
    }
}

/// Call counters, read by tests.
#[derive(Debug, Default)]
pub struct HeadlessStats {
    pub shader_compiles: AtomicUsize,
    pub pipelines_created: AtomicUsize,
    pub pipelines_cloned: AtomicUsize,
    pub textures_created: AtomicUsize,
    pub buffers_created: AtomicUsize,
    pub submits: AtomicUsize,
}

impl HeadlessStats {
    pub fn shader_compiles(&self) -> usize {
        self.shader_compiles.load(Ordering::Relaxed)
    }

    pub fn pipelines_created(&self) -> usize {
        self.pipelines_created.load(Ordering::Relaxed)
    }

    pub fn pipelines_cloned(&self) -> usize {
        self.pipelines_cloned.load(Ordering::Relaxed)
    }

    pub fn textures_created(&self) -> usize {
        self.textures_created.load(Ordering::Relaxed)
    }
}

/// A render pass as it was submitted.
#[derive(Debug, Clone)]
pub struct RecordedPass {
    pub descriptor: RenderPassDescriptor,
    pub strategy: MsaaStrategy,
    pub commands: Vec<Command>,
}

#[derive(Debug, Default)]
pub struct HeadlessDevice {
    options: HeadlessOptions,
    stats: HeadlessStats,
    passes: Mutex<Vec<RecordedPass>>,
    next_program: AtomicU64,
}

impl HeadlessDevice {
    pub fn new(options: HeadlessOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn stats(&self) -> &HeadlessStats {
        &self.stats
    }

    /// Every pass submitted so far, oldest first.
    pub fn recorded_passes(&self) -> Vec<RecordedPass> {
        self.passes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_recorded_passes(&self) {
        self.passes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[derive(Debug)]
pub struct HeadlessBuffer {
    usage: BufferUsage,
    data: RwLock<Vec<u8>>,
}

impl HeadlessBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl GpuBuffer for HeadlessBuffer {
    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn size(&self) -> u64 {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len() as u64
    }

    fn upload_data(&self, data: &[u8]) {
        let mut buf = self.data.write().unwrap_or_else(PoisonError::into_inner);
        buf.clear();
        buf.extend_from_slice(data);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct HeadlessTexture {
    desc: TextureDescriptor,
    pixels: RwLock<Vec<u8>>,
}

impl HeadlessTexture {
    pub fn pixels(&self) -> Vec<u8> {
        self.pixels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fill(&self, color: &ColorValue) {
        let bpp = self.desc.format.bytes_per_pixel() as usize;
        if self.desc.is_renderbuffer() || bpp != 4 {
            return;
        }
        let c = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let mut px = [c(color.r), c(color.g), c(color.b), c(color.a)];
        if self.desc.format == TextureFormat::Bgra8Unorm {
            px.swap(0, 2);
        }
        let mut pixels = self.pixels.write().unwrap_or_else(PoisonError::into_inner);
        for chunk in pixels.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }
}

impl GpuTexture for HeadlessTexture {
    fn descriptor(&self) -> &TextureDescriptor {
        &self.desc
    }

    fn upload_data(&self, x: u32, y: u32, width: u32, height: u32, data: &[u8]) {
        if self.desc.is_renderbuffer() {
            debug!("ignoring upload into a renderbuffer texture");
            return;
        }
        let bpp = self.desc.format.bytes_per_pixel() as usize;
        let tex_row = self.desc.width as usize * bpp;
        let src_row = width as usize * bpp;
        let mut pixels = self.pixels.write().unwrap_or_else(PoisonError::into_inner);
        for row in 0..height as usize {
            let dst_y = y as usize + row;
            if dst_y >= self.desc.height as usize {
                break;
            }
            let dst = dst_y * tex_row + x as usize * bpp;
            let src = row * src_row;
            let len = src_row.min(tex_row.saturating_sub(x as usize * bpp));
            if src + len > data.len() {
                break;
            }
            pixels[dst..dst + len].copy_from_slice(&data[src..src + len]);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct HeadlessSampler {
    desc: SamplerDescriptor,
}

impl GpuSampler for HeadlessSampler {
    fn descriptor(&self) -> &SamplerDescriptor {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct HeadlessShaderFunction {
    label: String,
    stage: ShaderStage,
    source: String,
    valid: bool,
    bind_groups: Vec<BindGroup>,
}

impl HeadlessShaderFunction {
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl GpuShaderFunction for HeadlessShaderFunction {
    fn label(&self) -> &str {
        &self.label
    }

    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn bind_groups(&self) -> &[BindGroup] {
        &self.bind_groups
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct HeadlessPipeline {
    base: PipelineBase,
    program: u64,
}

impl HeadlessPipeline {
    /// Identifier of the compiled program. Clones share it with their base.
    pub fn program(&self) -> u64 {
        self.program
    }
}

impl GpuRenderPipeline for HeadlessPipeline {
    fn descriptor(&self) -> &RenderPipelineDescriptor {
        &self.base.descriptor
    }

    fn is_valid(&self) -> bool {
        self.base.valid
    }

    fn bind_groups(&self) -> &[BindGroup] {
        &self.base.bind_groups
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct HeadlessCommandBuffer<'a> {
    device: &'a HeadlessDevice,
    passes: Vec<RecordedPass>,
}

impl GpuCommandBuffer for HeadlessCommandBuffer<'_> {
    fn begin_render_pass(&mut self, desc: RenderPassDescriptor) -> RenderPass {
        let strategy = choose_msaa_strategy(
            desc.sample_count(),
            desc.color_attachment.resolve_texture.is_some() && self.device.can_use_msaa(),
            &self.device.capabilities(),
        );
        RenderPass::new(desc, strategy)
    }

    fn end_render_pass(&mut self, pass: RenderPass) {
        let color = &pass.descriptor().color_attachment;
        if color.load_op == LoadOp::Clear {
            let target = color.resolve_texture.as_ref().or(color.texture.as_ref());
            if let Some(tex) = target.and_then(|t| t.as_any().downcast_ref::<HeadlessTexture>()) {
                tex.fill(&color.clear_value);
            }
        }
        self.passes.push(RecordedPass {
            descriptor: pass.descriptor().clone(),
            strategy: pass.strategy(),
            commands: pass.commands().to_vec(),
        });
    }

    fn submit(self: Box<Self>) -> bool {
        self.device.stats.submits.fetch_add(1, Ordering::Relaxed);
        self.device
            .passes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(self.passes);
        true
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_buffer(&self, usage: BufferUsage) -> Arc<dyn GpuBuffer> {
        self.stats.buffers_created.fetch_add(1, Ordering::Relaxed);
        Arc::new(HeadlessBuffer {
            usage,
            data: RwLock::new(Vec::new()),
        })
    }

    fn create_shader_function(&self, desc: &ShaderFunctionDescriptor) -> Arc<dyn GpuShaderFunction> {
        self.stats.shader_compiles.fetch_add(1, Ordering::Relaxed);
        let (valid, bind_groups) = match reflect_bind_groups(&desc.label, &desc.source, desc.stage) {
            Ok(groups) => (true, groups),
            Err(err) => {
                error!(shader = %desc.label, "{err}");
                if let Some(cb) = &desc.error_callback {
                    cb(&err.to_string());
                }
                (false, Vec::new())
            }
        };
        Arc::new(HeadlessShaderFunction {
            label: desc.label.clone(),
            stage: desc.stage,
            source: desc.source.clone(),
            valid,
            bind_groups,
        })
    }

    fn create_render_pipeline(&self, desc: RenderPipelineDescriptor) -> Arc<dyn GpuRenderPipeline> {
        self.stats.pipelines_created.fetch_add(1, Ordering::Relaxed);
        Arc::new(HeadlessPipeline {
            base: PipelineBase::new(desc),
            program: self.next_program.fetch_add(1, Ordering::Relaxed),
        })
    }

    fn clone_pipeline(
        &self,
        base: &Arc<dyn GpuRenderPipeline>,
        desc: RenderPipelineDescriptor,
    ) -> Arc<dyn GpuRenderPipeline> {
        let Some(headless) = base.as_any().downcast_ref::<HeadlessPipeline>() else {
            return self.create_render_pipeline(desc);
        };
        self.stats.pipelines_cloned.fetch_add(1, Ordering::Relaxed);
        let mut cloned = PipelineBase::new(desc);
        cloned.valid &= headless.base.valid;
        Arc::new(HeadlessPipeline {
            base: cloned,
            program: headless.program,
        })
    }

    fn supports_pipeline_clone(&self) -> bool {
        true
    }

    fn create_command_buffer(&self) -> Box<dyn GpuCommandBuffer + '_> {
        Box::new(HeadlessCommandBuffer {
            device: self,
            passes: Vec::new(),
        })
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> Arc<dyn GpuSampler> {
        Arc::new(HeadlessSampler { desc: *desc })
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> Arc<dyn GpuTexture> {
        self.stats.textures_created.fetch_add(1, Ordering::Relaxed);
        let pixels = if desc.is_renderbuffer() {
            Vec::new()
        } else {
            vec![0; desc.bytes()]
        };
        Arc::new(HeadlessTexture {
            desc: *desc,
            pixels: RwLock::new(pixels),
        })
    }

    fn can_use_msaa(&self) -> bool {
        self.options.supports_msaa
    }

    fn buffer_alignment(&self) -> u32 {
        self.options.buffer_alignment
    }

    fn max_texture_size(&self) -> u32 {
        self.options.max_texture_size
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            tile_msaa: self.options.tile_msaa,
            flip_y_for_sampled_layers: false,
        }
    }

    fn read_pixels(&self, texture: &Arc<dyn GpuTexture>, rect: &Rect) -> Result<Vec<u8>> {
        let tex = texture
            .as_any()
            .downcast_ref::<HeadlessTexture>()
            .ok_or_else(|| TesseraError::ReadPixels("texture does not belong to this device".into()))?;
        let desc = tex.descriptor();
        if desc.is_renderbuffer() || desc.format.bytes_per_pixel() != 4 {
            return Err(TesseraError::ReadPixels(format!(
                "cannot read {:?} texture",
                desc.format
            )));
        }
        let r = rect.round_out();
        let (x0, y0) = (r.left.max(0.0) as usize, r.top.max(0.0) as usize);
        let x1 = (r.right as usize).min(desc.width as usize);
        let y1 = (r.bottom as usize).min(desc.height as usize);
        if x0 >= x1 || y0 >= y1 {
            return Ok(Vec::new());
        }
        let pixels = tex.pixels();
        let row = desc.width as usize * 4;
        let mut out = Vec::with_capacity((x1 - x0) * (y1 - y0) * 4);
        for y in y0..y1 {
            out.extend_from_slice(&pixels[y * row + x0 * 4..y * row + x1 * 4]);
        }
        if desc.format == TextureFormat::Bgra8Unorm {
            for px in out.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_upload_writes_sub_rect() {
        let device = HeadlessDevice::default();
        let tex = device.create_texture(&TextureDescriptor::new(
            4,
            4,
            TextureFormat::R8Unorm,
            TextureUsage::COPY_DST,
        ));
        tex.upload_data(1, 2, 2, 1, &[7, 9]);
        let pixels = tex.as_any().downcast_ref::<HeadlessTexture>().unwrap().pixels();
        assert_eq!(&pixels[8..12], &[0, 7, 9, 0]);
    }

    #[test]
    fn broken_shader_reports_through_callback() {
        let device = HeadlessDevice::default();
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = seen.clone();
        let f = device.create_shader_function(&ShaderFunctionDescriptor {
            label: "broken".into(),
            stage: ShaderStage::VERTEX,
            source: "fn main( {".into(),
            entry_point: "vs_main".into(),
            constant_values: vec![],
            error_callback: Some(Arc::new(move |msg: &str| {
                *sink.lock().unwrap() = msg.to_string();
            })),
        });
        assert!(!f.is_valid());
        assert!(seen.lock().unwrap().contains("broken"));
        assert_eq!(device.stats().shader_compiles(), 1);
    }

    #[test]
    fn clear_pass_fills_color_texture() {
        let device = HeadlessDevice::default();
        let tex = device.create_texture(&TextureDescriptor::new(
            2,
            2,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
        ));
        let mut cmd = device.create_command_buffer();
        let mut desc = RenderPassDescriptor::default();
        desc.color_attachment.texture = Some(tex.clone());
        desc.color_attachment.load_op = LoadOp::Clear;
        desc.color_attachment.clear_value = ColorValue {
            r: 1.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        };
        let pass = cmd.begin_render_pass(desc);
        assert_eq!(pass.strategy(), MsaaStrategy::Direct);
        cmd.end_render_pass(pass);
        assert!(cmd.submit());
        let px = device.read_pixels(&tex, &Rect::from_wh(1.0, 1.0)).unwrap();
        assert_eq!(px, vec![255, 0, 0, 255]);
        assert_eq!(device.recorded_passes().len(), 1);
    }
}
