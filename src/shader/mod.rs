//! WGSL shader composition.
//!
//! Every draw step pairs a [`WgslGeometry`] (vertex data and vertex stage) with a
//! [`WgslFragment`] (shading). Most of them are snippets that [`writer::WgslShaderWriter`]
//! stitches into complete vertex and fragment modules; text shaders are self-contained.
//! The composed shader names identify pipelines, so two draws with equal names share one.

pub mod common;
pub mod filter;
pub mod fragment;
pub mod geometry;
pub mod reflect;
pub mod writer;

use std::sync::Arc;

use bitflags::bitflags;
use tracing::trace;

use crate::gpu::{
    Command, GpuRenderPipeline, GpuSampler, GpuTexture, SamplerBinding, TextureBinding, UniformBinding,
    VertexBufferLayout,
};
use crate::geometry::Matrix;
use crate::hw::HwDrawContext;

pub use filter::WgxFilter;
pub use reflect::{BindGroup, BindGroupEntry, BindingKind, UniformBlock, UniformType};
pub use writer::WgslShaderWriter;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderFlags: u32 {
        /// Pieces are spliced by the writer rather than providing a whole module.
        const SNIPPET = 1 << 0;
        /// A fragment that adds vertex outputs and vertex uniforms.
        const AFFECTS_VERTEX = 1 << 1;
        /// A geometry that scales the fragment color by a coverage mask.
        const AFFECTS_FRAGMENT = 1 << 2;
    }
}

/// The vertex half of a draw step.
///
/// Snippet geometries provide a `VSInput` struct and a `vs_main` body that assigns
/// `output.pos` and `local_pos`; the writer declares both.
pub trait WgslGeometry {
    fn flags(&self) -> ShaderFlags {
        ShaderFlags::SNIPPET
    }

    /// Short name, e.g. `Path`, used to build `VS_Path`.
    fn name(&self) -> String;

    /// Full shader name of a self-contained geometry.
    fn shader_name(&self) -> String {
        format!("VS_{}", self.name())
    }

    /// Whole vertex module of a self-contained geometry.
    fn gen_source_wgsl(&self) -> String {
        String::new()
    }

    fn vs_functions(&self) -> String {
        String::new()
    }

    fn vs_uniforms(&self) -> String {
        String::new()
    }

    fn vs_input(&self) -> String {
        String::new()
    }

    fn vs_main(&self) -> String {
        String::new()
    }

    /// Extra vertex outputs, one `name: type` per entry.
    fn varyings(&self) -> Vec<String> {
        Vec::new()
    }

    fn fs_name_suffix(&self) -> String {
        String::new()
    }

    fn fs_functions(&self) -> String {
        String::new()
    }

    /// Fragment code that writes `mask_alpha`.
    fn fs_mask(&self) -> String {
        String::new()
    }

    fn buffer_layout(&self) -> Vec<VertexBufferLayout>;

    /// Fills vertex and index buffers plus the vertex uniforms of `cmd`.
    ///
    /// `stencil_cmd` is the command of an earlier step over the same geometry; its buffers
    /// are reused instead of rasterizing again.
    fn prepare_cmd(
        &self,
        cmd: &mut Command,
        ctx: &mut HwDrawContext<'_, '_>,
        transform: &Matrix,
        clip_depth: f32,
        stencil_cmd: Option<&Command>,
    );
}

/// The shading half of a draw step.
pub trait WgslFragment {
    fn flags(&self) -> ShaderFlags {
        ShaderFlags::SNIPPET
    }

    /// Short name, e.g. `SolidColor`, used to build `FS_SolidColor`.
    fn name(&self) -> String;

    fn shader_name(&self) -> String {
        format!("FS_{}", self.name())
    }

    /// Whole fragment module of a self-contained fragment, including the filter.
    fn gen_source_wgsl(&self) -> String {
        String::new()
    }

    fn vs_name_suffix(&self) -> String {
        String::new()
    }

    fn vs_functions(&self) -> String {
        String::new()
    }

    fn vs_uniforms(&self) -> String {
        String::new()
    }

    /// Vertex code assigning this fragment's varyings from `input` and `local_pos`.
    fn vs_assign(&self) -> String {
        String::new()
    }

    fn varyings(&self) -> Vec<String> {
        Vec::new()
    }

    fn fs_functions(&self) -> String {
        String::new()
    }

    fn fs_uniforms(&self) -> String {
        String::new()
    }

    /// Fragment code that writes the premultiplied `color`.
    fn fs_main(&self) -> String {
        String::new()
    }

    /// First group-1 binding free for a color filter.
    fn next_binding(&self) -> u32;

    fn filter(&self) -> Option<&WgxFilter>;

    fn set_filter(&mut self, filter: WgxFilter);

    /// Binds textures, samplers and fragment uniforms.
    fn prepare_cmd(&self, cmd: &mut Command, ctx: &mut HwDrawContext<'_, '_>);
}

fn pipeline_of(cmd: &Command) -> Option<Arc<dyn GpuRenderPipeline>> {
    cmd.pipeline.as_ref().filter(|p| p.is_valid()).cloned()
}

/// Uploads the uniform named `name`, letting `fill` write its members.
///
/// Returns `false` when the command has no valid pipeline or the pipeline does not
/// declare the uniform.
pub fn upload_uniform(
    cmd: &mut Command,
    ctx: &mut HwDrawContext<'_, '_>,
    name: &str,
    fill: impl FnOnce(&mut UniformBlock<'_>),
) -> bool {
    let Some(pipeline) = pipeline_of(cmd) else {
        return false;
    };
    let Some((group, entry)) = reflect::find_entry(pipeline.bind_groups(), name) else {
        trace!(name, "uniform not declared by pipeline");
        return false;
    };
    let Some(ty) = entry.ty.as_ref() else {
        return false;
    };
    let mut block = UniformBlock::new(ty);
    fill(&mut block);
    let buffer = ctx.stage_buffer.push_uniform(block.bytes());
    cmd.uniform_bindings.push(UniformBinding {
        stages: entry.stages,
        group,
        binding: entry.binding,
        name: entry.name.clone(),
        buffer,
    });
    true
}

/// Uploads a non-struct uniform from raw bytes.
pub fn upload_uniform_bytes(cmd: &mut Command, ctx: &mut HwDrawContext<'_, '_>, name: &str, data: &[u8]) -> bool {
    upload_uniform(cmd, ctx, name, |block| block.set_all(data))
}

pub fn bind_texture(cmd: &mut Command, name: &str, texture: Arc<dyn GpuTexture>) -> bool {
    let Some(pipeline) = pipeline_of(cmd) else {
        return false;
    };
    let Some((group, entry)) = reflect::find_entry(pipeline.bind_groups(), name) else {
        return false;
    };
    cmd.texture_bindings.push(TextureBinding {
        stages: entry.stages,
        group,
        binding: entry.binding,
        name: entry.name.clone(),
        texture,
    });
    true
}

pub fn bind_sampler(cmd: &mut Command, name: &str, sampler: Arc<dyn GpuSampler>) -> bool {
    let Some(pipeline) = pipeline_of(cmd) else {
        return false;
    };
    let Some((group, entry)) = reflect::find_entry(pipeline.bind_groups(), name) else {
        return false;
    };
    cmd.sampler_bindings.push(SamplerBinding {
        stages: entry.stages,
        group,
        binding: entry.binding,
        name: entry.name.clone(),
        sampler,
    });
    true
}
