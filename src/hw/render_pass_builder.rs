use std::sync::Arc;

use crate::cache::RenderTargetPool;
use crate::gpu::{
    ColorAttachment, ColorValue, DepthAttachment, GpuDevice, GpuTexture, LoadOp, RenderPassDescriptor,
    StencilAttachment, StorageMode, StoreOp, TextureDescriptor, TextureFormat, TextureUsage,
};

use super::HwDrawState;

/// Assembles the attachments of a layer's render pass.
///
/// Depth and stencil only exist inside the pass: they are cleared on load, discarded on
/// store and backed by memoryless pool textures.
pub struct HwRenderPassBuilder {
    target: Arc<dyn GpuTexture>,
    sample_count: u32,
    draw_state: HwDrawState,
    load_op: LoadOp,
    store_op: StoreOp,
    clear_color: ColorValue,
}

impl HwRenderPassBuilder {
    pub fn new(target: Arc<dyn GpuTexture>) -> Self {
        Self {
            target,
            sample_count: 1,
            draw_state: HwDrawState::NONE,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
            clear_color: ColorValue::default(),
        }
    }

    pub fn sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count.max(1);
        self
    }

    pub fn draw_state(mut self, draw_state: HwDrawState) -> Self {
        self.draw_state = draw_state;
        self
    }

    pub fn load_op(mut self, load_op: LoadOp) -> Self {
        self.load_op = load_op;
        self
    }

    pub fn store_op(mut self, store_op: StoreOp) -> Self {
        self.store_op = store_op;
        self
    }

    pub fn clear_color(mut self, clear_color: ColorValue) -> Self {
        self.clear_color = clear_color;
        self
    }

    pub fn build(&self, device: &dyn GpuDevice, pool: &mut RenderTargetPool<'_>) -> RenderPassDescriptor {
        let width = self.target.descriptor().width;
        let height = self.target.descriptor().height;
        let sample_count = if device.can_use_msaa() { self.sample_count } else { 1 };

        let mut color = ColorAttachment {
            texture: Some(self.target.clone()),
            resolve_texture: None,
            load_op: self.load_op,
            store_op: self.store_op,
            clear_value: self.clear_color,
        };
        if sample_count > 1 {
            let mut desc = TextureDescriptor::new(
                width,
                height,
                self.target.descriptor().format,
                TextureUsage::RENDER_ATTACHMENT,
            );
            desc.sample_count = sample_count;
            desc.storage_mode = StorageMode::Memoryless;
            color.texture = Some(pool.obtain(&desc).texture().clone());
            color.resolve_texture = Some(self.target.clone());
        }

        let mut pass = RenderPassDescriptor {
            color_attachment: color,
            ..Default::default()
        };
        if self.draw_state.is_empty() {
            return pass;
        }

        let format = if self.draw_state.contains(HwDrawState::DEPTH) {
            TextureFormat::Depth24Stencil8
        } else {
            TextureFormat::Stencil8
        };
        let mut desc = TextureDescriptor::new(width, height, format, TextureUsage::RENDER_ATTACHMENT);
        desc.sample_count = sample_count;
        desc.storage_mode = StorageMode::Memoryless;
        let depth_stencil = pool.obtain(&desc).texture().clone();

        if self.draw_state.contains(HwDrawState::STENCIL) {
            pass.stencil_attachment = StencilAttachment {
                texture: Some(depth_stencil.clone()),
                resolve_texture: None,
                load_op: LoadOp::Clear,
                store_op: StoreOp::Discard,
                clear_value: 0,
            };
        }
        if self.draw_state.contains(HwDrawState::DEPTH) {
            pass.depth_attachment = DepthAttachment {
                texture: Some(depth_stencil),
                resolve_texture: None,
                load_op: LoadOp::Clear,
                store_op: StoreOp::Discard,
                clear_value: 0.0,
            };
        }
        pass
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::cache::{HwRenderTargetCache, Pool};
    use crate::gpu::headless::HeadlessDevice;

    fn target(device: &HeadlessDevice) -> Arc<dyn GpuTexture> {
        device.create_texture(&TextureDescriptor::new(
            32,
            16,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        ))
    }

    #[test]
    fn no_draw_state_means_color_only() {
        let device = Arc::new(HeadlessDevice::default());
        let cache = RefCell::new(HwRenderTargetCache::with_device(device.clone(), 1 << 20));
        let mut pool = Pool::new(&cache);
        let pass = HwRenderPassBuilder::new(target(&device))
            .load_op(LoadOp::Load)
            .build(device.as_ref(), &mut pool);
        assert_eq!(pass.color_attachment.load_op, LoadOp::Load);
        assert!(pass.stencil_attachment.texture.is_none());
        assert!(pass.depth_attachment.texture.is_none());
    }

    #[test]
    fn depth_shares_a_combined_texture_with_stencil() {
        let device = Arc::new(HeadlessDevice::default());
        let cache = RefCell::new(HwRenderTargetCache::with_device(device.clone(), 1 << 20));
        let mut pool = Pool::new(&cache);
        let pass = HwRenderPassBuilder::new(target(&device))
            .draw_state(HwDrawState::STENCIL | HwDrawState::DEPTH)
            .build(device.as_ref(), &mut pool);

        let stencil = pass.stencil_attachment.texture.as_ref().map(|t| t.descriptor().format);
        assert_eq!(stencil, Some(TextureFormat::Depth24Stencil8));
        assert_eq!(pass.stencil_attachment.store_op, StoreOp::Discard);
        assert_eq!(pass.depth_attachment.load_op, LoadOp::Clear);
        assert!(pass.depth_attachment.texture.is_some());
    }

    #[test]
    fn msaa_renders_into_a_pooled_target_resolving_to_the_layer() {
        let device = Arc::new(HeadlessDevice::default());
        let cache = RefCell::new(HwRenderTargetCache::with_device(device.clone(), 1 << 24));
        let mut pool = Pool::new(&cache);
        let layer = target(&device);
        let pass = HwRenderPassBuilder::new(layer.clone())
            .sample_count(4)
            .draw_state(HwDrawState::STENCIL)
            .build(device.as_ref(), &mut pool);

        let color = &pass.color_attachment;
        assert_eq!(color.texture.as_ref().map(|t| t.descriptor().sample_count), Some(4));
        assert!(color.resolve_texture.as_ref().is_some_and(|t| Arc::ptr_eq(t, &layer)));
        let stencil = pass.stencil_attachment.texture.as_ref().map(|t| t.descriptor().format);
        assert_eq!(stencil, Some(TextureFormat::Stencil8));
        assert!(pass.depth_attachment.texture.is_none());
    }
}
