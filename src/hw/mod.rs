//! The hardware draw engine.
//!
//! A frame is recorded into a tree of layers. Each layer keeps a list of draws, each draw
//! is made of one or more steps, and each step becomes one [`Command`](crate::gpu::Command).
//! [`HwCanvas::flush`] walks the tree three times: `prepare` settles clip depths and the
//! depth/stencil needs of every layer, `generate_command` builds the commands, and `draw`
//! encodes them into render passes, children before parents.

use std::sync::Arc;

use bitflags::bitflags;

use crate::cache::RenderTargetPool;
use crate::config::ContextOptions;
use crate::geometry::{Mat4, Vec2};
use crate::gpu::GpuDevice;
use crate::texture::TextureManager;

pub mod canvas;
pub mod draw;
pub mod filters;
pub mod layer;
pub mod layer_state;
pub mod path_raster;
pub mod pipeline_lib;
pub mod render_pass_builder;
pub mod stage_buffer;
pub mod static_buffer;
pub mod step;

pub use canvas::HwCanvas;
pub use draw::HwDraw;
pub use filters::{HwFilter, HwFilterLayer};
pub use layer::{HwLayer, HwRootLayer, HwSubLayer};
pub use layer_state::HwLayerState;
pub use pipeline_lib::{HwPipelineDescriptor, HwPipelineKey, HwPipelineLib};
pub use render_pass_builder::HwRenderPassBuilder;
pub use stage_buffer::HwStageBuffer;
pub use static_buffer::HwStaticBuffer;
pub use step::{CoverageType, HwDrawStep, StepKind};

bitflags! {
    /// Attachments a draw, or the union of a layer's draws, needs besides color.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HwDrawState: u8 {
        const STENCIL = 1 << 0;
        const DEPTH = 1 << 1;
    }
}

impl HwDrawState {
    pub const NONE: HwDrawState = HwDrawState::empty();
}

/// Everything a draw touches while it prepares and generates commands.
///
/// Layers build one per pass over their children, with the projection, clip depth
/// total and scale of that layer.
pub struct HwDrawContext<'a, 'p> {
    pub device: &'a Arc<dyn GpuDevice>,
    pub stage_buffer: &'a mut HwStageBuffer,
    pub static_buffer: &'a mut HwStaticBuffer,
    pub pipeline_lib: &'a mut HwPipelineLib,
    pub texture_manager: &'a Arc<TextureManager>,
    pub pool: &'a mut RenderTargetPool<'p>,
    pub options: &'a ContextOptions,
    /// Layer bounds to clip space.
    pub mvp: Mat4,
    pub total_clip_depth: u32,
    /// Physical pixels per layer unit.
    pub scale: Vec2,
    pub ctx_scale: f32,
}

impl<'p> HwDrawContext<'_, 'p> {
    /// A context for the children of a layer, sharing every resource of `self`.
    pub fn sub_context(&mut self, mvp: Mat4, total_clip_depth: u32, scale: Vec2) -> HwDrawContext<'_, 'p> {
        HwDrawContext {
            device: self.device,
            stage_buffer: &mut *self.stage_buffer,
            static_buffer: &mut *self.static_buffer,
            pipeline_lib: &mut *self.pipeline_lib,
            texture_manager: self.texture_manager,
            pool: &mut *self.pool,
            options: self.options,
            mvp,
            total_clip_depth,
            scale,
            ctx_scale: self.ctx_scale,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::RefCell;

    use super::*;
    use crate::cache::{HwRenderTargetCache, Pool};
    use crate::gpu::headless::HeadlessDevice;

    /// Owns every resource a draw context borrows.
    pub struct Fixture {
        pub headless: Arc<HeadlessDevice>,
        pub device: Arc<dyn GpuDevice>,
        pub stage_buffer: HwStageBuffer,
        pub static_buffer: HwStaticBuffer,
        pub pipeline_lib: HwPipelineLib,
        pub texture_manager: Arc<TextureManager>,
        pub cache: RefCell<HwRenderTargetCache>,
        pub options: ContextOptions,
    }

    impl Fixture {
        pub fn new() -> Self {
            let headless = Arc::new(HeadlessDevice::default());
            let device: Arc<dyn GpuDevice> = headless.clone();
            let options = ContextOptions::default();
            Self {
                stage_buffer: HwStageBuffer::new(device.as_ref()),
                static_buffer: HwStaticBuffer::new(device.as_ref()),
                pipeline_lib: HwPipelineLib::new(device.clone(), options.error_callback.clone()),
                texture_manager: Arc::new(TextureManager::new(device.clone())),
                cache: RefCell::new(HwRenderTargetCache::with_device(device.clone(), 1 << 24)),
                headless,
                device,
                options,
            }
        }

        /// Runs `f` with a context whose projection covers `width` x `height`.
        pub fn with_context<R>(&mut self, width: f32, height: f32, f: impl FnOnce(&mut HwDrawContext<'_, '_>) -> R) -> R {
            let mut pool = Pool::new(&self.cache);
            let mut ctx = HwDrawContext {
                device: &self.device,
                stage_buffer: &mut self.stage_buffer,
                static_buffer: &mut self.static_buffer,
                pipeline_lib: &mut self.pipeline_lib,
                texture_manager: &self.texture_manager,
                pool: &mut pool,
                options: &self.options,
                mvp: Mat4::ortho(0.0, width, height, 0.0),
                total_clip_depth: 1,
                scale: Vec2::new(1.0, 1.0),
                ctx_scale: 1.0,
            };
            f(&mut ctx)
        }
    }
}
