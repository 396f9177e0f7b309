use std::sync::Arc;

use super::{HwResource, HwResourceAllocator, HwResourceCache, Pool};
use crate::gpu::{GpuDevice, GpuTexture, TextureDescriptor};

/// An offscreen texture reused across layers and frames.
#[derive(Debug)]
pub struct HwRenderTarget {
    texture: Arc<dyn GpuTexture>,
}

impl HwRenderTarget {
    pub fn texture(&self) -> &Arc<dyn GpuTexture> {
        &self.texture
    }
}

impl HwResource for HwRenderTarget {
    type Key = TextureDescriptor;

    fn key(&self) -> &TextureDescriptor {
        self.texture.descriptor()
    }

    fn bytes(&self) -> usize {
        self.texture.bytes()
    }
}

pub struct HwRenderTargetAllocator {
    device: Arc<dyn GpuDevice>,
}

impl HwResourceAllocator<HwRenderTarget> for HwRenderTargetAllocator {
    fn allocate_resource(&mut self, key: &TextureDescriptor) -> Arc<HwRenderTarget> {
        Arc::new(HwRenderTarget {
            texture: self.device.create_texture(key),
        })
    }
}

pub type HwRenderTargetCache = HwResourceCache<HwRenderTarget>;
pub type RenderTargetPool<'c> = Pool<'c, HwRenderTarget>;

impl HwRenderTargetCache {
    pub fn with_device(device: Arc<dyn GpuDevice>, max_bytes: usize) -> Self {
        HwResourceCache::new(Box::new(HwRenderTargetAllocator { device }), max_bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::gpu::headless::HeadlessDevice;
    use crate::gpu::{StorageMode, TextureFormat, TextureUsage};

    fn stencil_desc(w: u32, h: u32) -> TextureDescriptor {
        let mut desc = TextureDescriptor::new(w, h, TextureFormat::Stencil8, TextureUsage::RENDER_ATTACHMENT);
        desc.storage_mode = StorageMode::Memoryless;
        desc
    }

    #[test]
    fn frames_reuse_the_same_texture() {
        let device = Arc::new(HeadlessDevice::default());
        let cache = RefCell::new(HwRenderTargetCache::with_device(device.clone(), 1 << 20));

        let first = {
            let mut pool = Pool::new(&cache);
            pool.obtain(&stencil_desc(64, 64)).texture().clone()
        };
        let second = {
            let mut pool = Pool::new(&cache);
            pool.obtain(&stencil_desc(64, 64)).texture().clone()
        };
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(device.stats().textures_created(), 1);
        assert_eq!(cache.borrow().purgeable_bytes(), 64 * 64);
    }

    #[test]
    fn different_descriptors_do_not_alias() {
        let device = Arc::new(HeadlessDevice::default());
        let cache = RefCell::new(HwRenderTargetCache::with_device(device.clone(), 1 << 20));
        let mut pool = Pool::new(&cache);
        let a = pool.obtain(&stencil_desc(64, 64));
        let b = pool.obtain(&stencil_desc(64, 32));
        assert!(!Arc::ptr_eq(a.texture(), b.texture()));
    }
}
