//! Backend-neutral GPU resource model.
//!
//! Each resource kind is a trait object. A backend implements all of them and hands them
//! out through [`GpuDevice`]. The draw engine above only ever sees the traits, plus the
//! plain data in [`types`].

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use tracing::warn;

pub mod headless;
pub mod types;
pub mod wgpu_backend;

pub use types::*;

use crate::error::Result;
use crate::geometry::Rect;
use crate::shader::reflect::{merge_bind_groups, BindGroup};

pub trait GpuBuffer: Debug + Send + Sync {
    fn usage(&self) -> BufferUsage;
    fn size(&self) -> u64;
    /// Replaces the whole content, growing the buffer when needed.
    fn upload_data(&self, data: &[u8]);
    fn as_any(&self) -> &dyn Any;
}

pub trait GpuTexture: Debug + Send + Sync {
    fn descriptor(&self) -> &TextureDescriptor;

    fn bytes(&self) -> usize {
        self.descriptor().bytes()
    }

    /// Writes a sub-rectangle of tightly packed rows. Renderbuffer textures ignore uploads.
    fn upload_data(&self, x: u32, y: u32, width: u32, height: u32, data: &[u8]);

    fn as_any(&self) -> &dyn Any;
}

pub trait GpuSampler: Debug + Send + Sync {
    fn descriptor(&self) -> &SamplerDescriptor;
    fn as_any(&self) -> &dyn Any;
}

pub trait GpuShaderFunction: Debug + Send + Sync {
    fn label(&self) -> &str;
    fn stage(&self) -> ShaderStage;
    fn is_valid(&self) -> bool;
    fn bind_groups(&self) -> &[BindGroup];
    fn as_any(&self) -> &dyn Any;
}

pub trait GpuRenderPipeline: Debug + Send + Sync {
    fn descriptor(&self) -> &RenderPipelineDescriptor;
    fn is_valid(&self) -> bool;
    /// Vertex and fragment bind groups merged.
    fn bind_groups(&self) -> &[BindGroup];

    fn bind_group(&self, index: u32) -> Option<&BindGroup> {
        self.bind_groups().iter().find(|g| g.group == index)
    }

    fn as_any(&self) -> &dyn Any;
}

/// Records render passes and submits them in order.
pub trait GpuCommandBuffer {
    fn begin_render_pass(&mut self, desc: RenderPassDescriptor) -> RenderPass;
    /// Hands a finished pass back for encoding.
    fn end_render_pass(&mut self, pass: RenderPass);
    fn submit(self: Box<Self>) -> bool;
}

/// Optional features a backend may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCapabilities {
    /// Multisampled rendering resolved on tile memory, with no separate resolve blit.
    pub tile_msaa: bool,
    /// Sampled offscreen layers are upside down and must be flipped when composited.
    pub flip_y_for_sampled_layers: bool,
}

pub trait GpuDevice: Send + Sync {
    fn create_buffer(&self, usage: BufferUsage) -> Arc<dyn GpuBuffer>;

    /// Always returns a function; compile failures produce one whose `is_valid` is false
    /// after the error callback has been invoked.
    fn create_shader_function(&self, desc: &ShaderFunctionDescriptor) -> Arc<dyn GpuShaderFunction>;

    fn create_render_pipeline(&self, desc: RenderPipelineDescriptor) -> Arc<dyn GpuRenderPipeline>;

    /// Builds a pipeline that reuses the compiled program of `base` with different fixed
    /// function state. Only meaningful when [`GpuDevice::supports_pipeline_clone`] is true.
    fn clone_pipeline(
        &self,
        base: &Arc<dyn GpuRenderPipeline>,
        desc: RenderPipelineDescriptor,
    ) -> Arc<dyn GpuRenderPipeline>;

    fn supports_pipeline_clone(&self) -> bool;

    fn create_command_buffer(&self) -> Box<dyn GpuCommandBuffer + '_>;

    fn create_sampler(&self, desc: &SamplerDescriptor) -> Arc<dyn GpuSampler>;

    fn create_texture(&self, desc: &TextureDescriptor) -> Arc<dyn GpuTexture>;

    fn can_use_msaa(&self) -> bool;

    /// Minimum offset alignment of uniform buffer bindings.
    fn buffer_alignment(&self) -> u32;

    fn max_texture_size(&self) -> u32;

    fn capabilities(&self) -> DeviceCapabilities;

    /// Reads back a region of a color texture as tightly packed RGBA8 rows.
    fn read_pixels(&self, texture: &Arc<dyn GpuTexture>, rect: &Rect) -> Result<Vec<u8>>;
}

/// Commands collected for one render pass.
#[derive(Debug)]
pub struct RenderPass {
    descriptor: RenderPassDescriptor,
    strategy: MsaaStrategy,
    commands: Vec<Command>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
}

impl RenderPass {
    pub fn new(descriptor: RenderPassDescriptor, strategy: MsaaStrategy) -> Self {
        Self {
            descriptor,
            strategy,
            commands: Vec::new(),
            viewport: None,
            scissor: None,
        }
    }

    /// Invalid commands are dropped here.
    pub fn add_command(&mut self, command: Command) {
        if !command.is_valid() {
            return;
        }
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn descriptor(&self) -> &RenderPassDescriptor {
        &self.descriptor
    }

    pub fn strategy(&self) -> MsaaStrategy {
        self.strategy
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    pub fn set_scissor(&mut self, scissor: ScissorRect) {
        self.scissor = Some(scissor);
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn scissor(&self) -> Option<ScissorRect> {
        self.scissor
    }
}

/// How a render pass deals with a multisampled color attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsaaStrategy {
    /// Render straight into the color attachment.
    Direct,
    /// Render into a multisampled target, then resolve into the single-sampled one.
    MsaaResolve,
    /// Multisample on tile memory and write resolved pixels directly.
    TileMsaa,
}

pub fn choose_msaa_strategy(
    sample_count: u32,
    has_resolve_target: bool,
    caps: &DeviceCapabilities,
) -> MsaaStrategy {
    if sample_count <= 1 || !has_resolve_target {
        MsaaStrategy::Direct
    } else if caps.tile_msaa {
        MsaaStrategy::TileMsaa
    } else {
        MsaaStrategy::MsaaResolve
    }
}

/// Shared pipeline bookkeeping: the descriptor plus the merged bind groups.
#[derive(Debug, Clone)]
pub struct PipelineBase {
    pub descriptor: RenderPipelineDescriptor,
    pub bind_groups: Vec<BindGroup>,
    pub valid: bool,
}

impl PipelineBase {
    pub fn new(descriptor: RenderPipelineDescriptor) -> Self {
        let mut valid =
            descriptor.vertex_function.is_valid() && descriptor.fragment_function.is_valid();
        let bind_groups = match merge_bind_groups(
            descriptor.vertex_function.bind_groups(),
            descriptor.fragment_function.bind_groups(),
        ) {
            Ok(groups) => groups,
            Err(err) => {
                warn!(label = %descriptor.label, "{err}");
                valid = false;
                Vec::new()
            }
        };
        Self {
            descriptor,
            bind_groups,
            valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msaa_strategy_depends_on_samples_resolve_and_tile_support() {
        let plain = DeviceCapabilities::default();
        let tile = DeviceCapabilities {
            tile_msaa: true,
            ..Default::default()
        };
        assert_eq!(choose_msaa_strategy(1, true, &tile), MsaaStrategy::Direct);
        assert_eq!(choose_msaa_strategy(4, false, &plain), MsaaStrategy::Direct);
        assert_eq!(choose_msaa_strategy(4, true, &plain), MsaaStrategy::MsaaResolve);
        assert_eq!(choose_msaa_strategy(4, true, &tile), MsaaStrategy::TileMsaa);
    }
}
