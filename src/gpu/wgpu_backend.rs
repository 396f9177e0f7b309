//! `wgpu` implementation of the GPU traits.
//!
//! Render passes are encoded when they are handed back to the command buffer. Bind groups
//! are created per command from the pipeline's reflected layouts, so geometries and
//! fragments never see `wgpu` types.

use std::any::Any;
use std::num::NonZeroU64;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error, warn};

use super::*;
use crate::error::{Result, TesseraError};
use crate::shader::reflect::{parse_and_validate, reflect_module, BindingKind};

const READBACK_ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

pub fn to_wgpu_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        // No packed 24 or 16 bit color formats; pixels are expanded before upload.
        TextureFormat::Rgb8Unorm | TextureFormat::Rgb565Unorm | TextureFormat::Rgba8Unorm => {
            wgpu::TextureFormat::Rgba8Unorm
        }
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Stencil8 => wgpu::TextureFormat::Stencil8,
        TextureFormat::Depth24Stencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        TextureFormat::Invalid => wgpu::TextureFormat::Rgba8Unorm,
    }
}

pub fn from_wgpu_texture_format(format: wgpu::TextureFormat) -> TextureFormat {
    match format {
        wgpu::TextureFormat::R8Unorm => TextureFormat::R8Unorm,
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => {
            TextureFormat::Rgba8Unorm
        }
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => {
            TextureFormat::Bgra8Unorm
        }
        wgpu::TextureFormat::Stencil8 => TextureFormat::Stencil8,
        wgpu::TextureFormat::Depth24PlusStencil8 => TextureFormat::Depth24Stencil8,
        _ => TextureFormat::Invalid,
    }
}

pub fn to_wgpu_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut out = wgpu::TextureUsages::empty();
    if usage.contains(TextureUsage::COPY_SRC) {
        out |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        out |= wgpu::TextureUsages::COPY_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        out |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::STORAGE_BINDING) {
        out |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        out |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    out
}

pub fn to_wgpu_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut out = wgpu::BufferUsages::COPY_DST;
    if usage.contains(BufferUsage::VERTEX) {
        out |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        out |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        out |= wgpu::BufferUsages::UNIFORM;
    }
    out
}

pub fn to_wgpu_blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::Src => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrc => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::Dst => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDst => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::SrcAlphaSaturated => wgpu::BlendFactor::SrcAlphaSaturated,
    }
}

pub fn to_wgpu_compare(compare: CompareFunction) -> wgpu::CompareFunction {
    match compare {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

pub fn to_wgpu_stencil_op(op: StencilOperation) -> wgpu::StencilOperation {
    match op {
        StencilOperation::Keep => wgpu::StencilOperation::Keep,
        StencilOperation::Zero => wgpu::StencilOperation::Zero,
        StencilOperation::Replace => wgpu::StencilOperation::Replace,
        StencilOperation::Invert => wgpu::StencilOperation::Invert,
        StencilOperation::IncrementClamp => wgpu::StencilOperation::IncrementClamp,
        StencilOperation::DecrementClamp => wgpu::StencilOperation::DecrementClamp,
        StencilOperation::IncrementWrap => wgpu::StencilOperation::IncrementWrap,
        StencilOperation::DecrementWrap => wgpu::StencilOperation::DecrementWrap,
    }
}

pub fn to_wgpu_address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

pub fn to_wgpu_filter(filter: SamplerFilter) -> wgpu::FilterMode {
    match filter {
        SamplerFilter::Nearest => wgpu::FilterMode::Nearest,
        SamplerFilter::Linear => wgpu::FilterMode::Linear,
    }
}

pub fn to_wgpu_mipmap_filter(mode: SamplerMipmap) -> wgpu::FilterMode {
    match mode {
        SamplerMipmap::None | SamplerMipmap::Nearest => wgpu::FilterMode::Nearest,
        SamplerMipmap::Linear => wgpu::FilterMode::Linear,
    }
}

pub fn to_wgpu_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32 => wgpu::VertexFormat::Float32,
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
    }
}

pub fn to_wgpu_step_mode(mode: VertexStepMode) -> wgpu::VertexStepMode {
    match mode {
        VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
        VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
    }
}

pub fn to_wgpu_shader_stages(stages: ShaderStage) -> wgpu::ShaderStages {
    let mut out = wgpu::ShaderStages::NONE;
    if stages.contains(ShaderStage::VERTEX) {
        out |= wgpu::ShaderStages::VERTEX;
    }
    if stages.contains(ShaderStage::FRAGMENT) {
        out |= wgpu::ShaderStages::FRAGMENT;
    }
    out
}

fn to_wgpu_store_op(op: StoreOp) -> wgpu::StoreOp {
    match op {
        StoreOp::Store => wgpu::StoreOp::Store,
        StoreOp::Discard => wgpu::StoreOp::Discard,
    }
}

fn to_wgpu_stencil_face(face: &StencilFaceState) -> wgpu::StencilFaceState {
    wgpu::StencilFaceState {
        compare: to_wgpu_compare(face.compare),
        fail_op: to_wgpu_stencil_op(face.fail_op),
        depth_fail_op: to_wgpu_stencil_op(face.depth_fail_op),
        pass_op: to_wgpu_stencil_op(face.pass_op),
    }
}

/// `None` when the pass has no depth/stencil attachment, signalled by an invalid format.
fn to_wgpu_depth_stencil(state: &DepthStencilState) -> Option<wgpu::DepthStencilState> {
    if state.format == TextureFormat::Invalid {
        return None;
    }
    let stencil = if state.enable_stencil {
        let s = &state.stencil_state;
        wgpu::StencilState {
            front: to_wgpu_stencil_face(&s.front),
            back: to_wgpu_stencil_face(&s.back),
            read_mask: s.front.read_mask,
            write_mask: s.front.write_mask,
        }
    } else {
        wgpu::StencilState::default()
    };
    let (depth_write_enabled, depth_compare) = if state.enable_depth {
        (
            state.depth_state.enable_write,
            to_wgpu_compare(state.depth_state.compare),
        )
    } else {
        (false, wgpu::CompareFunction::Always)
    };
    Some(wgpu::DepthStencilState {
        format: to_wgpu_texture_format(state.format),
        depth_write_enabled,
        depth_compare,
        stencil,
        bias: wgpu::DepthBiasState::default(),
    })
}

/// Returns `(unpadded, padded)` bytes per row for a texture-to-buffer copy.
fn compute_padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> (u32, u32) {
    let unpadded = width * bytes_per_pixel;
    let padded = unpadded.div_ceil(READBACK_ROW_ALIGNMENT) * READBACK_ROW_ALIGNMENT;
    (unpadded, padded)
}

fn copy_padded_readback_rows(
    data: &[u8],
    height: u32,
    unpadded_bytes_per_row: u32,
    padded_bytes_per_row: u32,
    output: &mut Vec<u8>,
) {
    let output_size = (unpadded_bytes_per_row * height) as usize;
    output.resize(output_size, 0);

    if padded_bytes_per_row == unpadded_bytes_per_row {
        output.copy_from_slice(&data[..output_size]);
        return;
    }

    for row in 0..height {
        let padded_offset = (row * padded_bytes_per_row) as usize;
        let unpadded_offset = (row * unpadded_bytes_per_row) as usize;
        let row_data = &data[padded_offset..padded_offset + unpadded_bytes_per_row as usize];
        output[unpadded_offset..unpadded_offset + unpadded_bytes_per_row as usize]
            .copy_from_slice(row_data);
    }
}

#[derive(Debug)]
pub struct WgpuBuffer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    usage: BufferUsage,
    raw: RwLock<Option<wgpu::Buffer>>,
}

impl WgpuBuffer {
    pub fn raw(&self) -> Option<wgpu::Buffer> {
        self.raw.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl GpuBuffer for WgpuBuffer {
    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn size(&self) -> u64 {
        self.raw
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |b| b.size())
    }

    fn upload_data(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let aligned_len = (data.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let mut raw = self.raw.write().unwrap_or_else(PoisonError::into_inner);
        if raw.as_ref().is_none_or(|b| b.size() < aligned_len) {
            *raw = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("tessera_stage_buffer"),
                size: aligned_len,
                usage: to_wgpu_buffer_usage(self.usage),
                mapped_at_creation: false,
            }));
        }
        let Some(buffer) = raw.as_ref() else {
            return;
        };
        if data.len() as u64 == aligned_len {
            self.queue.write_buffer(buffer, 0, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(aligned_len as usize, 0);
            self.queue.write_buffer(buffer, 0, &padded);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct WgpuTexture {
    desc: TextureDescriptor,
    queue: Arc<wgpu::Queue>,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl WgpuTexture {
    pub fn raw(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

impl GpuTexture for WgpuTexture {
    fn descriptor(&self) -> &TextureDescriptor {
        &self.desc
    }

    fn upload_data(&self, x: u32, y: u32, width: u32, height: u32, data: &[u8]) {
        if self.desc.is_renderbuffer() || width == 0 || height == 0 {
            return;
        }
        let bpp = self.desc.format.bytes_per_pixel();
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * bpp),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct WgpuSampler {
    desc: SamplerDescriptor,
    raw: wgpu::Sampler,
}

impl GpuSampler for WgpuSampler {
    fn descriptor(&self) -> &SamplerDescriptor {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct WgpuShaderFunction {
    label: String,
    stage: ShaderStage,
    entry_point: String,
    module: Option<wgpu::ShaderModule>,
    bind_groups: Vec<BindGroup>,
}

impl GpuShaderFunction for WgpuShaderFunction {
    fn label(&self) -> &str {
        &self.label
    }

    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn is_valid(&self) -> bool {
        self.module.is_some()
    }

    fn bind_groups(&self) -> &[BindGroup] {
        &self.bind_groups
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct WgpuPipeline {
    base: PipelineBase,
    layouts: Vec<wgpu::BindGroupLayout>,
    raw: Option<wgpu::RenderPipeline>,
}

impl GpuRenderPipeline for WgpuPipeline {
    fn descriptor(&self) -> &RenderPipelineDescriptor {
        &self.base.descriptor
    }

    fn is_valid(&self) -> bool {
        self.base.valid && self.raw.is_some()
    }

    fn bind_groups(&self) -> &[BindGroup] {
        &self.base.bind_groups
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl WgpuDevice {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue }
    }

    /// Requests a high-performance adapter with no surface and creates a device on it.
    pub async fn request_headless() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| TesseraError::AdapterUnavailable)?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("tessera"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await?;
        Ok(Self::new(Arc::new(device), Arc::new(queue)))
    }

    pub fn raw_device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn raw_queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Wraps an externally owned texture, e.g. a swapchain image, as a render target.
    pub fn wrap_texture(&self, texture: wgpu::Texture) -> Arc<dyn GpuTexture> {
        let desc = TextureDescriptor {
            width: texture.width(),
            height: texture.height(),
            mip_level_count: texture.mip_level_count(),
            sample_count: texture.sample_count(),
            format: from_wgpu_texture_format(texture.format()),
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
            storage_mode: StorageMode::Private,
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Arc::new(WgpuTexture {
            desc,
            queue: self.queue.clone(),
            texture,
            view,
        })
    }

    fn build_layouts(&self, groups: &[BindGroup]) -> Vec<wgpu::BindGroupLayout> {
        let count = groups.iter().map(|g| g.group + 1).max().unwrap_or(0);
        (0..count)
            .map(|index| {
                let entries: Vec<wgpu::BindGroupLayoutEntry> = groups
                    .iter()
                    .find(|g| g.group == index)
                    .map(|g| {
                        g.entries
                            .iter()
                            .map(|e| wgpu::BindGroupLayoutEntry {
                                binding: e.binding,
                                visibility: to_wgpu_shader_stages(e.stages),
                                ty: match e.kind {
                                    BindingKind::UniformBuffer => wgpu::BindingType::Buffer {
                                        ty: wgpu::BufferBindingType::Uniform,
                                        has_dynamic_offset: false,
                                        min_binding_size: e
                                            .ty
                                            .as_ref()
                                            .and_then(|t| NonZeroU64::new(t.size as u64)),
                                    },
                                    BindingKind::Texture => wgpu::BindingType::Texture {
                                        sample_type: wgpu::TextureSampleType::Float {
                                            filterable: true,
                                        },
                                        view_dimension: wgpu::TextureViewDimension::D2,
                                        multisampled: false,
                                    },
                                    BindingKind::Sampler => wgpu::BindingType::Sampler(
                                        wgpu::SamplerBindingType::Filtering,
                                    ),
                                },
                                count: None,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                self.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("tessera_bind_group_layout"),
                        entries: &entries,
                    })
            })
            .collect()
    }

    fn build_pipeline(&self, base: &PipelineBase, layouts: &[wgpu::BindGroupLayout]) -> Option<wgpu::RenderPipeline> {
        let desc = &base.descriptor;
        let vs = desc.vertex_function.as_any().downcast_ref::<WgpuShaderFunction>()?;
        let fs = desc.fragment_function.as_any().downcast_ref::<WgpuShaderFunction>()?;
        let layout_refs: Vec<&wgpu::BindGroupLayout> = layouts.iter().collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&desc.label),
                bind_group_layouts: &layout_refs,
                push_constant_ranges: &[],
            });

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = desc
            .buffers
            .iter()
            .map(|b| {
                b.attributes
                    .iter()
                    .map(|a| wgpu::VertexAttribute {
                        format: to_wgpu_vertex_format(a.format),
                        offset: a.offset,
                        shader_location: a.shader_location,
                    })
                    .collect()
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = desc
            .buffers
            .iter()
            .zip(&attributes)
            .map(|(b, attrs)| wgpu::VertexBufferLayout {
                array_stride: b.array_stride,
                step_mode: to_wgpu_step_mode(b.step_mode),
                attributes: attrs,
            })
            .collect();

        let blend = wgpu::BlendComponent {
            src_factor: to_wgpu_blend_factor(desc.target.src_blend_factor),
            dst_factor: to_wgpu_blend_factor(desc.target.dst_blend_factor),
            operation: wgpu::BlendOperation::Add,
        };
        let targets = [Some(wgpu::ColorTargetState {
            format: to_wgpu_texture_format(desc.target.format),
            blend: Some(wgpu::BlendState {
                color: blend,
                alpha: blend,
            }),
            write_mask: wgpu::ColorWrites::from_bits_truncate(desc.target.write_mask),
        })];

        Some(self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&desc.label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: vs.module.as_ref()?,
                entry_point: Some(&vs.entry_point),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: to_wgpu_depth_stencil(&desc.depth_stencil),
            multisample: wgpu::MultisampleState {
                count: desc.sample_count.max(1),
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            fragment: Some(wgpu::FragmentState {
                module: fs.module.as_ref()?,
                entry_point: Some(&fs.entry_point),
                compilation_options: Default::default(),
                targets: &targets,
            }),
            multiview: None,
            cache: None,
        }))
    }

    fn map_readback_buffer_into(&self, buffer: &wgpu::Buffer, mapped_bytes: &mut Vec<u8>) -> Result<()> {
        mapped_bytes.clear();

        let buffer_slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            if sender.send(result).is_err() {
                warn!("Failed to send map_async result from callback");
            }
        });

        let _ = self.device.poll(wgpu::MaintainBase::Wait);

        receiver
            .recv()
            .map_err(|e| TesseraError::ReadPixels(e.to_string()))?
            .map_err(|e| TesseraError::ReadPixels(e.to_string()))?;

        let mapped_range = buffer_slice.get_mapped_range();
        mapped_bytes.extend_from_slice(&mapped_range);
        drop(mapped_range);
        buffer.unmap();
        Ok(())
    }
}

pub struct WgpuCommandBuffer<'a> {
    device: &'a WgpuDevice,
    encoder: wgpu::CommandEncoder,
}

fn texture_view(texture: &Option<Arc<dyn GpuTexture>>) -> Option<&wgpu::TextureView> {
    texture
        .as_ref()
        .and_then(|t| t.as_any().downcast_ref::<WgpuTexture>())
        .map(WgpuTexture::view)
}

fn create_bind_groups(device: &wgpu::Device, pipeline: &WgpuPipeline, cmd: &Command) -> Option<Vec<wgpu::BindGroup>> {
    let mut out = Vec::with_capacity(pipeline.layouts.len());
    for (index, layout) in pipeline.layouts.iter().enumerate() {
        let group = index as u32;
        let mut buffers = Vec::new();
        for u in cmd.uniform_bindings.iter().filter(|u| u.group == group) {
            let raw = u
                .buffer
                .buffer
                .as_ref()?
                .as_any()
                .downcast_ref::<WgpuBuffer>()?
                .raw()?;
            buffers.push((u.binding, raw, u.buffer.offset, u.buffer.size));
        }
        let mut entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .map(|(binding, raw, offset, size)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: raw,
                    offset: *offset,
                    size: NonZeroU64::new(*size),
                }),
            })
            .collect();
        for t in cmd.texture_bindings.iter().filter(|t| t.group == group) {
            let tex = t.texture.as_any().downcast_ref::<WgpuTexture>()?;
            entries.push(wgpu::BindGroupEntry {
                binding: t.binding,
                resource: wgpu::BindingResource::TextureView(&tex.view),
            });
        }
        for s in cmd.sampler_bindings.iter().filter(|s| s.group == group) {
            let sampler = s.sampler.as_any().downcast_ref::<WgpuSampler>()?;
            entries.push(wgpu::BindGroupEntry {
                binding: s.binding,
                resource: wgpu::BindingResource::Sampler(&sampler.raw),
            });
        }
        out.push(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tessera_bind_group"),
            layout,
            entries: &entries,
        }));
    }
    Some(out)
}

fn raw_buffer(view: &BufferView) -> Option<wgpu::Buffer> {
    view.buffer
        .as_ref()?
        .as_any()
        .downcast_ref::<WgpuBuffer>()?
        .raw()
}

impl GpuCommandBuffer for WgpuCommandBuffer<'_> {
    fn begin_render_pass(&mut self, desc: RenderPassDescriptor) -> RenderPass {
        let strategy = choose_msaa_strategy(
            desc.sample_count(),
            desc.color_attachment.resolve_texture.is_some(),
            &self.device.capabilities(),
        );
        RenderPass::new(desc, strategy)
    }

    fn end_render_pass(&mut self, pass: RenderPass) {
        let desc = pass.descriptor();
        let Some(color_view) = texture_view(&desc.color_attachment.texture) else {
            warn!("render pass without a usable color attachment");
            return;
        };
        let resolve_view = match pass.strategy() {
            MsaaStrategy::Direct => None,
            _ => texture_view(&desc.color_attachment.resolve_texture),
        };
        let c = desc.color_attachment.clear_value;
        let color_load = match desc.color_attachment.load_op {
            LoadOp::Load => wgpu::LoadOp::Load,
            LoadOp::Clear | LoadOp::DontCare => wgpu::LoadOp::Clear(wgpu::Color {
                r: c.r,
                g: c.g,
                b: c.b,
                a: c.a,
            }),
        };
        let ds_texture = desc
            .stencil_attachment
            .texture
            .as_ref()
            .or(desc.depth_attachment.texture.as_ref());
        let ds_view = ds_texture
            .and_then(|t| t.as_any().downcast_ref::<WgpuTexture>())
            .map(WgpuTexture::view);
        let has_depth = ds_texture.is_some_and(|t| t.descriptor().format == TextureFormat::Depth24Stencil8);
        let depth_stencil_attachment = ds_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: has_depth.then(|| wgpu::Operations {
                load: match desc.depth_attachment.load_op {
                    LoadOp::Load => wgpu::LoadOp::Load,
                    _ => wgpu::LoadOp::Clear(desc.depth_attachment.clear_value),
                },
                store: to_wgpu_store_op(desc.depth_attachment.store_op),
            }),
            stencil_ops: Some(wgpu::Operations {
                load: match desc.stencil_attachment.load_op {
                    LoadOp::Load => wgpu::LoadOp::Load,
                    _ => wgpu::LoadOp::Clear(desc.stencil_attachment.clear_value),
                },
                store: to_wgpu_store_op(desc.stencil_attachment.store_op),
            }),
        });

        let (target_w, target_h) = (desc.target_width(), desc.target_height());
        let device = self.device.device.clone();
        let mut rpass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tessera_render_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: resolve_view,
                ops: wgpu::Operations {
                    load: color_load,
                    store: to_wgpu_store_op(desc.color_attachment.store_op),
                },
            })],
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        if let Some(vp) = pass.viewport() {
            rpass.set_viewport(vp.x, vp.y, vp.width, vp.height, vp.min_depth, vp.max_depth);
        }

        for cmd in pass.commands() {
            let Some(pipeline) = cmd
                .pipeline
                .as_ref()
                .and_then(|p| p.as_any().downcast_ref::<WgpuPipeline>())
            else {
                continue;
            };
            let Some(raw_pipeline) = &pipeline.raw else {
                continue;
            };
            let sx = cmd.scissor_rect.x.min(target_w);
            let sy = cmd.scissor_rect.y.min(target_h);
            let sw = cmd.scissor_rect.width.min(target_w - sx);
            let sh = cmd.scissor_rect.height.min(target_h - sy);
            if sw == 0 || sh == 0 {
                continue;
            }
            let Some(bind_groups) = create_bind_groups(&device, pipeline, cmd) else {
                debug!("skipping command with foreign resources");
                continue;
            };
            let (Some(vertex), Some(index)) = (raw_buffer(&cmd.vertex_buffer), raw_buffer(&cmd.index_buffer)) else {
                continue;
            };

            rpass.set_pipeline(raw_pipeline);
            for (i, bg) in bind_groups.iter().enumerate() {
                rpass.set_bind_group(i as u32, bg, &[]);
            }
            rpass.set_stencil_reference(cmd.stencil_reference);
            rpass.set_scissor_rect(sx, sy, sw, sh);
            let vb = &cmd.vertex_buffer;
            rpass.set_vertex_buffer(0, vertex.slice(vb.offset..vb.offset + vb.size));
            let mut instances = 1;
            if cmd.is_instanced() {
                if let Some(instance) = raw_buffer(&cmd.instance_buffer) {
                    let ib = &cmd.instance_buffer;
                    rpass.set_vertex_buffer(1, instance.slice(ib.offset..ib.offset + ib.size));
                    instances = cmd.instance_count;
                }
            }
            let ix = &cmd.index_buffer;
            rpass.set_index_buffer(index.slice(ix.offset..ix.offset + ix.size), wgpu::IndexFormat::Uint32);
            rpass.draw_indexed(0..cmd.index_count, 0, 0..instances);
        }
    }

    fn submit(self: Box<Self>) -> bool {
        self.device
            .queue
            .submit(std::iter::once(self.encoder.finish()));
        true
    }
}

impl GpuDevice for WgpuDevice {
    fn create_buffer(&self, usage: BufferUsage) -> Arc<dyn GpuBuffer> {
        Arc::new(WgpuBuffer {
            device: self.device.clone(),
            queue: self.queue.clone(),
            usage,
            raw: RwLock::new(None),
        })
    }

    fn create_shader_function(&self, desc: &ShaderFunctionDescriptor) -> Arc<dyn GpuShaderFunction> {
        let reflected = parse_and_validate(&desc.label, &desc.source)
            .and_then(|module| reflect_module(&desc.label, &module, desc.stage));
        let (module, bind_groups) = match reflected {
            Ok(groups) => {
                let module = self
                    .device
                    .create_shader_module(wgpu::ShaderModuleDescriptor {
                        label: Some(&desc.label),
                        source: wgpu::ShaderSource::Wgsl(desc.source.as_str().into()),
                    });
                (Some(module), groups)
            }
            Err(err) => {
                error!(shader = %desc.label, "{err}");
                if let Some(cb) = &desc.error_callback {
                    cb(&err.to_string());
                }
                (None, Vec::new())
            }
        };
        Arc::new(WgpuShaderFunction {
            label: desc.label.clone(),
            stage: desc.stage,
            entry_point: desc.entry_point.clone(),
            module,
            bind_groups,
        })
    }

    fn create_render_pipeline(&self, desc: RenderPipelineDescriptor) -> Arc<dyn GpuRenderPipeline> {
        let base = PipelineBase::new(desc);
        if !base.valid {
            return Arc::new(WgpuPipeline {
                base,
                layouts: Vec::new(),
                raw: None,
            });
        }
        let layouts = self.build_layouts(&base.bind_groups);
        let raw = self.build_pipeline(&base, &layouts);
        Arc::new(WgpuPipeline { base, layouts, raw })
    }

    fn clone_pipeline(
        &self,
        _base: &Arc<dyn GpuRenderPipeline>,
        desc: RenderPipelineDescriptor,
    ) -> Arc<dyn GpuRenderPipeline> {
        self.create_render_pipeline(desc)
    }

    fn supports_pipeline_clone(&self) -> bool {
        false
    }

    fn create_command_buffer(&self) -> Box<dyn GpuCommandBuffer + '_> {
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tessera_command_buffer"),
            });
        Box::new(WgpuCommandBuffer {
            device: self,
            encoder,
        })
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> Arc<dyn GpuSampler> {
        let raw = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("tessera_sampler"),
            address_mode_u: to_wgpu_address_mode(desc.address_mode_u),
            address_mode_v: to_wgpu_address_mode(desc.address_mode_v),
            address_mode_w: to_wgpu_address_mode(desc.address_mode_w),
            mag_filter: to_wgpu_filter(desc.mag_filter),
            min_filter: to_wgpu_filter(desc.min_filter),
            mipmap_filter: to_wgpu_mipmap_filter(desc.mipmap_filter),
            ..Default::default()
        });
        Arc::new(WgpuSampler { desc: *desc, raw })
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> Arc<dyn GpuTexture> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tessera_texture"),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_level_count.max(1),
            sample_count: desc.sample_count.max(1),
            dimension: wgpu::TextureDimension::D2,
            format: to_wgpu_texture_format(desc.format),
            usage: to_wgpu_texture_usage(desc.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Arc::new(WgpuTexture {
            desc: *desc,
            queue: self.queue.clone(),
            texture,
            view,
        })
    }

    fn can_use_msaa(&self) -> bool {
        true
    }

    fn buffer_alignment(&self) -> u32 {
        self.device.limits().min_uniform_buffer_offset_alignment
    }

    fn max_texture_size(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities::default()
    }

    fn read_pixels(&self, texture: &Arc<dyn GpuTexture>, rect: &Rect) -> Result<Vec<u8>> {
        let tex = texture
            .as_any()
            .downcast_ref::<WgpuTexture>()
            .ok_or_else(|| TesseraError::ReadPixels("texture does not belong to this device".into()))?;
        let desc = tex.descriptor();
        if desc.is_renderbuffer() || desc.format.bytes_per_pixel() != 4 {
            return Err(TesseraError::ReadPixels(format!("cannot read {:?} texture", desc.format)));
        }
        let r = rect.round_out();
        let x = r.left.max(0.0) as u32;
        let y = r.top.max(0.0) as u32;
        let width = (r.right.max(0.0) as u32).min(desc.width).saturating_sub(x);
        let height = (r.bottom.max(0.0) as u32).min(desc.height).saturating_sub(y);
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let (unpadded_bytes_per_row, padded_bytes_per_row) = compute_padded_bytes_per_row(width, 4);
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tessera_readback_buffer"),
            size: (padded_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tessera_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let mut mapped = Vec::new();
        self.map_readback_buffer_into(&readback, &mut mapped)?;
        let mut out = Vec::new();
        copy_padded_readback_rows(&mapped, height, unpadded_bytes_per_row, padded_bytes_per_row, &mut out);
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
    fn padded_rows_are_stripped() {
        let (unpadded, padded) = compute_padded_bytes_per_row(3, 4);
        assert_eq!((unpadded, padded), (12, 256));
        let mut data = vec![0u8; 512];
        data[..12].copy_from_slice(&[1; 12]);
        data[256..268].copy_from_slice(&[2; 12]);
        let mut out = Vec::new();
        copy_padded_readback_rows(&data, 2, unpadded, padded, &mut out);
        assert_eq!(&out[..12], &[1; 12]);
        assert_eq!(&out[12..], &[2; 12]);
    }

    #[test]
    fn format_mapping_round_trips_renderable_formats() {
        for f in [
            TextureFormat::R8Unorm,
            TextureFormat::Rgba8Unorm,
            TextureFormat::Bgra8Unorm,
            TextureFormat::Stencil8,
            TextureFormat::Depth24Stencil8,
        ] {
            assert_eq!(from_wgpu_texture_format(to_wgpu_texture_format(f)), f);
        }
    }
}
