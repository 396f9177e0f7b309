use std::sync::Arc;

use ahash::AHashMap;

use crate::gpu::{
    GpuDevice, GpuSampler, GpuTexture, SamplerDescriptor, StorageMode, TextureDescriptor, TextureFormat,
    TextureUsage,
};

use super::atlas::MAX_NUM_TEXTURE_PER_ATLAS;

/// The GPU side of one atlas group: up to four square textures, created on first upload.
pub struct AtlasTextureArray {
    device: Arc<dyn GpuDevice>,
    size: u32,
    format: TextureFormat,
    textures: [Option<Arc<dyn GpuTexture>>; MAX_NUM_TEXTURE_PER_ATLAS],
    samplers: AHashMap<SamplerDescriptor, Arc<dyn GpuSampler>>,
}

impl AtlasTextureArray {
    pub fn new(device: Arc<dyn GpuDevice>, size: u32, format: TextureFormat) -> Self {
        Self {
            device,
            size,
            format,
            textures: Default::default(),
            samplers: AHashMap::new(),
        }
    }

    fn texture_at(&mut self, index: usize) -> &Arc<dyn GpuTexture> {
        let (device, size, format) = (&self.device, self.size, self.format);
        self.textures[index].get_or_insert_with(|| {
            let mut desc =
                TextureDescriptor::new(size, size, format, TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST);
            desc.storage_mode = StorageMode::Private;
            device.create_texture(&desc)
        })
    }

    /// Writes `height` full-width rows of one bitmap into texture `index`.
    pub fn upload(&mut self, index: usize, x: u32, y: u32, width: u32, height: u32, data: &[u8]) {
        if index >= MAX_NUM_TEXTURE_PER_ATLAS {
            return;
        }
        self.texture_at(index).upload_data(x, y, width, height, data);
    }

    /// All four slots. Slots that were never uploaded to reuse an existing texture, since
    /// the text fragment always binds four.
    pub fn textures(&mut self) -> [Arc<dyn GpuTexture>; MAX_NUM_TEXTURE_PER_ATLAS] {
        let fallback = match self.textures.iter().flatten().next().cloned() {
            Some(texture) => texture,
            None => self.texture_at(0).clone(),
        };
        std::array::from_fn(|i| self.textures[i].clone().unwrap_or_else(|| fallback.clone()))
    }

    pub fn texture_count(&self) -> usize {
        self.textures.iter().flatten().count()
    }

    /// One sampler serves every texture of the group.
    pub fn sampler(&mut self, desc: &SamplerDescriptor) -> Arc<dyn GpuSampler> {
        let device = &self.device;
        self.samplers
            .entry(*desc)
            .or_insert_with(|| device.create_sampler(desc))
            .clone()
    }
}

impl std::fmt::Debug for AtlasTextureArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasTextureArray")
            .field("size", &self.size)
            .field("format", &self.format)
            .field("textures", &self.texture_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::HeadlessDevice;

    #[test]
    fn textures_are_created_lazily_and_padded_to_four() {
        let device = Arc::new(HeadlessDevice::default());
        let mut array = AtlasTextureArray::new(device.clone(), 64, TextureFormat::R8Unorm);
        assert_eq!(array.texture_count(), 0);

        array.upload(2, 0, 0, 4, 1, &[1, 2, 3, 4]);
        assert_eq!(array.texture_count(), 1);
        let textures = array.textures();
        assert!(textures.iter().all(|t| Arc::ptr_eq(t, &textures[2])));
        assert_eq!(device.stats().textures_created(), 1);

        array.upload(9, 0, 0, 1, 1, &[1]);
        assert_eq!(array.texture_count(), 1);
    }

    #[test]
    fn samplers_are_shared_per_descriptor() {
        let device = Arc::new(HeadlessDevice::default());
        let mut array = AtlasTextureArray::new(device, 64, TextureFormat::R8Unorm);
        let a = array.sampler(&SamplerDescriptor::default());
        let b = array.sampler(&SamplerDescriptor::default());
        let c = array.sampler(&SamplerDescriptor::linear());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
