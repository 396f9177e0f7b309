//! Images on the GPU.
//!
//! A [`Texture`] may be created before its GPU resource exists: pixels handed to
//! [`Texture::deferred_upload_image`] are only turned into a GPU texture the first time a
//! draw asks for it. [`TextureManager`] is the one structure here that other threads touch,
//! so it sits behind an `RwLock`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use ahash::AHashMap;
use tracing::{debug, trace};

use crate::error::{Result, TesseraError};
use crate::gpu::{GpuDevice, GpuTexture, TextureDescriptor, TextureFormat, TextureUsage};
use crate::paint::{AlphaType, ColorType, Pixmap};

pub type TextureId = u64;

/// Progress of a texture's GPU resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadState {
    /// Nothing allocated yet.
    #[default]
    Unknown,
    /// Allocated, content not written.
    Created,
    Uploaded,
}

pub fn texture_format_for(color_type: ColorType) -> TextureFormat {
    match color_type {
        ColorType::Rgba8888 => TextureFormat::Rgba8Unorm,
        ColorType::Bgra8888 => TextureFormat::Bgra8Unorm,
        ColorType::Rgb565 => TextureFormat::Rgb565Unorm,
        ColorType::A8 => TextureFormat::R8Unorm,
    }
}

#[derive(Default)]
struct TextureState {
    upload: UploadState,
    gpu: Option<Arc<dyn GpuTexture>>,
    pending: Option<Arc<Pixmap>>,
}

pub struct Texture {
    width: u32,
    height: u32,
    format: TextureFormat,
    alpha_type: AlphaType,
    device: Option<Arc<dyn GpuDevice>>,
    state: Mutex<TextureState>,
}

impl Texture {
    /// A texture whose GPU resource is allocated on first use.
    pub fn new(device: Arc<dyn GpuDevice>, width: u32, height: u32, format: TextureFormat, alpha_type: AlphaType) -> Self {
        Self {
            width,
            height,
            format,
            alpha_type,
            device: Some(device),
            state: Mutex::new(TextureState::default()),
        }
    }

    /// Wraps an existing GPU texture, such as a layer's render target.
    pub fn from_gpu_texture(texture: Arc<dyn GpuTexture>, width: u32, height: u32, alpha_type: AlphaType) -> Self {
        let format = texture.descriptor().format;
        Self {
            width,
            height,
            format,
            alpha_type,
            device: None,
            state: Mutex::new(TextureState {
                upload: UploadState::Uploaded,
                gpu: Some(texture),
                pending: None,
            }),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn alpha_type(&self) -> AlphaType {
        self.alpha_type
    }

    pub fn upload_state(&self) -> UploadState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).upload
    }

    /// Remembers `pixmap` to be written by the next [`gpu_texture`](Self::gpu_texture).
    pub fn deferred_upload_image(&self, pixmap: Arc<Pixmap>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending = Some(pixmap);
    }

    /// The GPU texture, allocating it and committing a deferred upload first if needed.
    /// `None` for a texture without a device whose resource was never provided.
    pub fn gpu_texture(&self) -> Option<Arc<dyn GpuTexture>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.upload == UploadState::Unknown {
            let device = self.device.as_ref()?;
            let desc = TextureDescriptor::new(
                self.width,
                self.height,
                self.format,
                TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            );
            state.gpu = Some(device.create_texture(&desc));
            state.upload = UploadState::Created;
            trace!(width = self.width, height = self.height, "texture created");
        }
        if let Some(pixmap) = state.pending.take() {
            if let Some(gpu) = &state.gpu {
                gpu.upload_data(0, 0, pixmap.width.min(self.width), pixmap.height.min(self.height), &pixmap.pixels);
                state.upload = UploadState::Uploaded;
            }
        }
        state.gpu.clone()
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("alpha_type", &self.alpha_type)
            .field("upload_state", &self.upload_state())
            .finish()
    }
}

/// Textures of one context.
///
/// Pixmaps drawn directly get a texture cached by pixmap identity. Textures registered
/// explicitly get an id that other threads can look up or drop.
pub struct TextureManager {
    device: Arc<dyn GpuDevice>,
    by_pixmap: RwLock<AHashMap<usize, (Weak<Pixmap>, Arc<Texture>)>>,
    registered: RwLock<AHashMap<TextureId, Arc<Texture>>>,
    next_id: AtomicU64,
}

impl TextureManager {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self {
            device,
            by_pixmap: RwLock::new(AHashMap::new()),
            registered: RwLock::new(AHashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The texture for `pixmap`, created with a deferred upload the first time.
    pub fn find_or_create_texture(&self, pixmap: &Arc<Pixmap>) -> Arc<Texture> {
        let key = Arc::as_ptr(pixmap) as usize;
        {
            let map = self.by_pixmap.read().unwrap_or_else(PoisonError::into_inner);
            if let Some((weak, texture)) = map.get(&key) {
                if weak.upgrade().is_some_and(|live| Arc::ptr_eq(&live, pixmap)) {
                    return texture.clone();
                }
            }
        }

        let texture = Arc::new(Texture::new(
            self.device.clone(),
            pixmap.width,
            pixmap.height,
            texture_format_for(pixmap.color_type),
            pixmap.alpha_type,
        ));
        texture.deferred_upload_image(pixmap.clone());

        let mut map = self.by_pixmap.write().unwrap_or_else(PoisonError::into_inner);
        // Entries of dropped pixmaps can never match again.
        map.retain(|_, (weak, _)| weak.strong_count() > 0);
        map.insert(key, (Arc::downgrade(pixmap), texture.clone()));
        texture
    }

    pub fn register_texture(&self, texture: Arc<Texture>) -> TextureId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registered
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, texture);
        id
    }

    pub fn query(&self, id: TextureId) -> Option<Arc<Texture>> {
        self.registered
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn drop_texture(&self, id: TextureId) -> Result<()> {
        let removed = self
            .registered
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        match removed {
            Some(_) => {
                debug!(id, "texture dropped");
                Ok(())
            }
            None => Err(TesseraError::TextureNotFound(id)),
        }
    }

    pub fn texture_count(&self) -> usize {
        self.registered.read().unwrap_or_else(PoisonError::into_inner).len()
            + self.by_pixmap.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl std::fmt::Debug for TextureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureManager")
            .field("textures", &self.texture_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::gpu::headless::{HeadlessDevice, HeadlessTexture};

    fn manager() -> (Arc<HeadlessDevice>, TextureManager) {
        let device = Arc::new(HeadlessDevice::default());
        (device.clone(), TextureManager::new(device))
    }

    #[test]
    fn upload_is_deferred_until_first_use() {
        let (device, manager) = manager();
        let pixmap = Arc::new(Pixmap::from_rgba(2, 1, vec![1, 2, 3, 4, 5, 6, 7, 8]));
        let texture = manager.find_or_create_texture(&pixmap);
        assert_eq!(texture.upload_state(), UploadState::Unknown);
        assert_eq!(device.stats().textures_created(), 0);

        let gpu = texture.gpu_texture().unwrap();
        assert_eq!(texture.upload_state(), UploadState::Uploaded);
        let headless = gpu.as_any().downcast_ref::<HeadlessTexture>().unwrap();
        assert_eq!(headless.pixels()[..8], [1, 2, 3, 4, 5, 6, 7, 8]);

        let again = texture.gpu_texture().unwrap();
        assert!(Arc::ptr_eq(&gpu, &again));
        assert_eq!(device.stats().textures_created(), 1);
    }

    #[test]
    fn the_same_pixmap_maps_to_the_same_texture() {
        let (_, manager) = manager();
        let pixmap = Arc::new(Pixmap::new(4, 4, ColorType::A8, AlphaType::Premul));
        let a = manager.find_or_create_texture(&pixmap);
        let b = manager.find_or_create_texture(&pixmap);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.format(), TextureFormat::R8Unorm);

        let other = Arc::new(Pixmap::new(4, 4, ColorType::A8, AlphaType::Premul));
        assert!(!Arc::ptr_eq(&a, &manager.find_or_create_texture(&other)));
    }

    #[test]
    fn registered_textures_can_be_dropped_from_another_thread() {
        let (device, manager) = manager();
        let manager = Arc::new(manager);
        let texture = Arc::new(Texture::new(device, 8, 8, TextureFormat::Rgba8Unorm, AlphaType::Premul));
        let id = manager.register_texture(texture.clone());
        assert!(manager.query(id).is_some_and(|t| Arc::ptr_eq(&t, &texture)));

        let remote = manager.clone();
        let dropped = thread::spawn(move || remote.drop_texture(id)).join().unwrap();
        assert!(dropped.is_ok());
        assert!(manager.query(id).is_none());
        assert!(matches!(manager.drop_texture(id), Err(TesseraError::TextureNotFound(i)) if i == id));
    }

    #[test]
    fn wrapped_gpu_textures_are_already_uploaded() {
        let (device, _) = manager();
        let gpu = device.create_texture(&TextureDescriptor::new(
            4,
            4,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING,
        ));
        let texture = Texture::from_gpu_texture(gpu.clone(), 4, 4, AlphaType::Premul);
        assert_eq!(texture.upload_state(), UploadState::Uploaded);
        assert!(texture.gpu_texture().is_some_and(|t| Arc::ptr_eq(&t, &gpu)));
    }
}
