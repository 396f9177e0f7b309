//! Backend-neutral GPU value types. Every backend maps these to its native constants.

use std::sync::Arc;

use bitflags::bitflags;
use smallvec::SmallVec;

use super::{GpuBuffer, GpuRenderPipeline, GpuSampler, GpuShaderFunction, GpuTexture};
use crate::config::ErrorCallback;
use crate::paint::{FilterMode, MipmapMode, SamplingOptions, TileMode};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct BufferUsage: u32 {
        const VERTEX = 0x01;
        const INDEX = 0x02;
        const UNIFORM = 0x04;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 0x01;
        const COPY_DST = 0x02;
        const TEXTURE_BINDING = 0x04;
        const STORAGE_BINDING = 0x08;
        const RENDER_ATTACHMENT = 0x10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ShaderStage: u32 {
        const VERTEX = 0x01;
        const FRAGMENT = 0x02;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureFormat {
    R8Unorm,
    Rgb8Unorm,
    Rgb565Unorm,
    Rgba8Unorm,
    Bgra8Unorm,
    Stencil8,
    Depth24Stencil8,
    Invalid,
}

impl TextureFormat {
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::R8Unorm | TextureFormat::Stencil8 => 1,
            TextureFormat::Rgb565Unorm => 2,
            // 24-bit RGB is padded to 4 bytes on every backend.
            TextureFormat::Rgb8Unorm
            | TextureFormat::Rgba8Unorm
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Depth24Stencil8 => 4,
            TextureFormat::Invalid => 0,
        }
    }

    pub const fn has_stencil(self) -> bool {
        matches!(self, TextureFormat::Stencil8 | TextureFormat::Depth24Stencil8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum StorageMode {
    HostVisible,
    #[default]
    Private,
    Memoryless,
}

/// Texture creation parameters. Ordered field by field so it can key ordered caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub storage_mode: StorageMode,
}

impl TextureDescriptor {
    pub fn new(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            width,
            height,
            mip_level_count: 1,
            sample_count: 1,
            format,
            usage,
            storage_mode: StorageMode::Private,
        }
    }

    /// Multisampled or stencil textures can only be render targets, never sampled or
    /// uploaded to.
    pub fn is_renderbuffer(&self) -> bool {
        self.sample_count > 1 || self.format.has_stencil()
    }

    pub fn bytes(&self) -> usize {
        self.width as usize
            * self.height as usize
            * self.format.bytes_per_pixel() as usize
            * self.sample_count.max(1) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

impl From<TileMode> for AddressMode {
    fn from(value: TileMode) -> Self {
        match value {
            TileMode::Clamp | TileMode::Decal => AddressMode::ClampToEdge,
            TileMode::Repeat => AddressMode::Repeat,
            TileMode::Mirror => AddressMode::MirrorRepeat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerFilter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerMipmap {
    #[default]
    None,
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerDescriptor {
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub mag_filter: SamplerFilter,
    pub min_filter: SamplerFilter,
    pub mipmap_filter: SamplerMipmap,
}

impl SamplerDescriptor {
    pub fn from_sampling(options: &SamplingOptions) -> Self {
        let filter = match options.filter {
            FilterMode::Nearest => SamplerFilter::Nearest,
            FilterMode::Linear => SamplerFilter::Linear,
        };
        Self {
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: match options.mipmap {
                MipmapMode::None => SamplerMipmap::None,
                MipmapMode::Nearest => SamplerMipmap::Nearest,
                MipmapMode::Linear => SamplerMipmap::Linear,
            },
            ..Default::default()
        }
    }

    /// Clamped sampling with the same filter for magnification and minification.
    pub fn from_filter(filter: FilterMode) -> Self {
        Self::from_sampling(&SamplingOptions {
            filter,
            mipmap: MipmapMode::None,
        })
    }

    pub fn linear() -> Self {
        Self {
            mag_filter: SamplerFilter::Linear,
            min_filter: SamplerFilter::Linear,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    #[default]
    Keep,
    Zero,
    Replace,
    Invert,
    IncrementClamp,
    DecrementClamp,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    pub compare: CompareFunction,
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
    pub read_mask: u32,
    pub write_mask: u32,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            compare: CompareFunction::Always,
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
            read_mask: 0xFFFF_FFFF,
            write_mask: 0xFFFF_FFFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StencilState {
    pub front: StencilFaceState,
    pub back: StencilFaceState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub enable_write: bool,
    pub compare: CompareFunction,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            enable_write: true,
            compare: CompareFunction::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub enable_stencil: bool,
    pub stencil_state: StencilState,
    pub enable_depth: bool,
    pub depth_state: DepthState,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            format: TextureFormat::Stencil8,
            enable_stencil: false,
            stencil_state: StencilState::default(),
            enable_depth: false,
            depth_state: DepthState::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub const fn size(self) -> u64 {
        match self {
            VertexFormat::Float32 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepMode {
    #[default]
    Vertex,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub format: VertexFormat,
    pub offset: u64,
    pub shader_location: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub step_mode: VertexStepMode,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    Src,
    OneMinusSrc,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
    OneMinusDst,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturated,
}

pub const COLOR_WRITE_ALL: u32 = 0xF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTargetState {
    pub format: TextureFormat,
    pub src_blend_factor: BlendFactor,
    pub dst_blend_factor: BlendFactor,
    pub write_mask: u32,
}

impl Default for ColorTargetState {
    fn default() -> Self {
        Self {
            format: TextureFormat::Bgra8Unorm,
            src_blend_factor: BlendFactor::One,
            dst_blend_factor: BlendFactor::OneMinusSrcAlpha,
            write_mask: COLOR_WRITE_ALL,
        }
    }
}

/// Everything a render pipeline is built from.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor {
    pub vertex_function: Arc<dyn GpuShaderFunction>,
    pub fragment_function: Arc<dyn GpuShaderFunction>,
    pub buffers: Vec<VertexBufferLayout>,
    pub target: ColorTargetState,
    pub depth_stencil: DepthStencilState,
    pub sample_count: u32,
    pub label: String,
}

impl RenderPipelineDescriptor {
    /// True when the fixed-function state matches. Shader functions are not compared.
    pub fn same_state(&self, other: &RenderPipelineDescriptor) -> bool {
        self.buffers == other.buffers
            && self.target == other.target
            && self.depth_stencil == other.depth_stencil
            && self.sample_count == other.sample_count
    }
}

/// Source and compile options of one shader stage.
#[derive(Clone)]
pub struct ShaderFunctionDescriptor {
    pub label: String,
    pub stage: ShaderStage,
    pub source: String,
    pub entry_point: String,
    pub constant_values: Vec<i32>,
    pub error_callback: Option<ErrorCallback>,
}

impl std::fmt::Debug for ShaderFunctionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderFunctionDescriptor")
            .field("label", &self.label)
            .field("stage", &self.stage)
            .field("entry_point", &self.entry_point)
            .field("constant_values", &self.constant_values)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorValue {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadOp {
    #[default]
    DontCare,
    Load,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreOp {
    #[default]
    Store,
    Discard,
}

#[derive(Debug, Clone, Default)]
pub struct Attachment<T> {
    pub texture: Option<Arc<dyn GpuTexture>>,
    pub resolve_texture: Option<Arc<dyn GpuTexture>>,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_value: T,
}

pub type ColorAttachment = Attachment<ColorValue>;
pub type StencilAttachment = Attachment<u32>;
pub type DepthAttachment = Attachment<f32>;

#[derive(Debug, Clone, Default)]
pub struct RenderPassDescriptor {
    pub color_attachment: ColorAttachment,
    pub stencil_attachment: StencilAttachment,
    pub depth_attachment: DepthAttachment,
}

impl RenderPassDescriptor {
    pub fn target_width(&self) -> u32 {
        self.color_attachment
            .texture
            .as_ref()
            .map_or(0, |t| t.descriptor().width)
    }

    pub fn target_height(&self) -> u32 {
        self.color_attachment
            .texture
            .as_ref()
            .map_or(0, |t| t.descriptor().height)
    }

    pub fn sample_count(&self) -> u32 {
        self.color_attachment
            .texture
            .as_ref()
            .map_or(1, |t| t.descriptor().sample_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A byte range inside a GPU buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferView {
    pub buffer: Option<Arc<dyn GpuBuffer>>,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct UniformBinding {
    pub stages: ShaderStage,
    pub group: u32,
    pub binding: u32,
    pub name: String,
    pub buffer: BufferView,
}

#[derive(Debug, Clone)]
pub struct TextureBinding {
    pub stages: ShaderStage,
    pub group: u32,
    pub binding: u32,
    pub name: String,
    pub texture: Arc<dyn GpuTexture>,
}

#[derive(Debug, Clone)]
pub struct SamplerBinding {
    pub stages: ShaderStage,
    pub group: u32,
    pub binding: u32,
    pub name: String,
    pub sampler: Arc<dyn GpuSampler>,
}

/// The full binding state of one draw call.
#[derive(Debug, Clone, Default)]
pub struct Command {
    pub pipeline: Option<Arc<dyn GpuRenderPipeline>>,
    pub index_buffer: BufferView,
    pub vertex_buffer: BufferView,
    pub instance_buffer: BufferView,
    pub uniform_bindings: SmallVec<[UniformBinding; 4]>,
    pub texture_bindings: SmallVec<[TextureBinding; 4]>,
    pub sampler_bindings: SmallVec<[SamplerBinding; 4]>,
    pub stencil_reference: u32,
    pub index_count: u32,
    pub instance_count: u32,
    pub scissor_rect: ScissorRect,
}

impl Command {
    pub fn is_valid(&self) -> bool {
        let Some(pipeline) = &self.pipeline else {
            return false;
        };
        pipeline.is_valid()
            && self.index_count > 0
            && self.vertex_buffer.buffer.is_some()
            && self.index_buffer.buffer.is_some()
            && self.uniform_bindings.iter().all(|u| u.buffer.buffer.is_some())
    }

    pub fn is_instanced(&self) -> bool {
        self.instance_count > 0 && self.instance_buffer.buffer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_order_by_size_first() {
        let small = TextureDescriptor::new(16, 16, TextureFormat::Rgba8Unorm, TextureUsage::empty());
        let large = TextureDescriptor::new(32, 8, TextureFormat::R8Unorm, TextureUsage::empty());
        assert!(small < large);
    }

    #[test]
    fn stencil_and_msaa_textures_are_renderbuffers() {
        let mut desc = TextureDescriptor::new(8, 8, TextureFormat::Stencil8, TextureUsage::RENDER_ATTACHMENT);
        assert!(desc.is_renderbuffer());
        desc.format = TextureFormat::Rgba8Unorm;
        assert!(!desc.is_renderbuffer());
        desc.sample_count = 4;
        assert!(desc.is_renderbuffer());
        assert_eq!(desc.bytes(), 8 * 8 * 4 * 4);
    }

    #[test]
    fn empty_command_is_invalid() {
        let cmd = Command::default();
        assert!(!cmd.is_valid());
        assert!(!cmd.is_instanced());
    }
}
