//! Entry points: a [`GpuContext`] owns the device and every cache shared between its
//! surfaces, and a [`GpuSurface`] hands out the canvas that records into one target.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{ContextOptions, SurfaceOptions};
use crate::error::{Result, TesseraError};
use crate::geometry::Rect;
use crate::gpu::headless::HeadlessDevice;
use crate::gpu::wgpu_backend::WgpuDevice;
use crate::gpu::{GpuDevice, GpuTexture, TextureDescriptor, TextureUsage};
use crate::hw::canvas::HwResources;
use crate::hw::{HwCanvas, HwPipelineLib};
use crate::paint::{AlphaType, Image};
use crate::text::AtlasManager;
use crate::texture::{Texture, TextureManager};

pub struct GpuContext {
    device: Arc<dyn GpuDevice>,
    resources: Rc<RefCell<HwResources>>,
    texture_manager: Arc<TextureManager>,
}

impl GpuContext {
    pub fn new(device: Arc<dyn GpuDevice>, options: ContextOptions) -> Self {
        let resources = HwResources::new(device.clone(), options);
        let texture_manager = resources.texture_manager.clone();
        Self {
            device,
            resources: Rc::new(RefCell::new(resources)),
            texture_manager,
        }
    }

    /// A context on the recording backend, for tests and tools without a GPU.
    pub fn new_headless(options: ContextOptions) -> Self {
        Self::new(Arc::new(HeadlessDevice::default()), options)
    }

    /// A context on the first high-performance adapter `wgpu` finds.
    pub async fn new_wgpu(options: ContextOptions) -> Result<Self> {
        let device = WgpuDevice::request_headless().await?;
        info!(max_texture_size = device.max_texture_size(), "wgpu context created");
        Ok(Self::new(Arc::new(device), options))
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    pub fn options(&self) -> ContextOptions {
        self.resources.borrow().options.clone()
    }

    fn check_size(&self, width: u32, height: u32) -> Result<()> {
        let max = self.device.max_texture_size();
        if width == 0 || height == 0 || width > max || height > max {
            return Err(TesseraError::InvalidTextureSize { width, height, max });
        }
        Ok(())
    }

    fn make_surface(&self, options: &SurfaceOptions, usage: TextureUsage) -> Result<GpuSurface> {
        self.check_size(options.width, options.height)?;
        let target = self.device.create_texture(&TextureDescriptor::new(
            options.width,
            options.height,
            options.format,
            usage,
        ));
        Ok(self.wrap_surface(target, options))
    }

    /// An offscreen surface of `options.width` x `options.height` physical pixels.
    pub fn create_surface(&self, options: &SurfaceOptions) -> Result<GpuSurface> {
        self.make_surface(options, TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC)
    }

    /// Like [`create_surface`](Self::create_surface), but the result can also be sampled
    /// through [`make_snapshot`](Self::make_snapshot).
    pub fn create_render_target(&self, options: &SurfaceOptions) -> Result<GpuSurface> {
        self.make_surface(
            options,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC | TextureUsage::TEXTURE_BINDING,
        )
    }

    /// A surface over a texture owned elsewhere, such as a swapchain image. The size and
    /// format come from the texture.
    pub fn wrap_surface(&self, target: Arc<dyn GpuTexture>, options: &SurfaceOptions) -> GpuSurface {
        let desc = *target.descriptor();
        let options = SurfaceOptions {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            ..*options
        };
        debug!(width = options.width, height = options.height, "surface created");
        GpuSurface {
            canvas: HwCanvas::new(self.resources.clone(), &options),
            target,
            options,
            locked: false,
        }
    }

    /// The surface's content as an image other canvases can draw. `None` unless the surface
    /// came from [`create_render_target`](Self::create_render_target).
    pub fn make_snapshot(&self, surface: &GpuSurface) -> Option<Image> {
        let desc = surface.target.descriptor();
        if !desc.usage.contains(TextureUsage::TEXTURE_BINDING) {
            return None;
        }
        let texture = Texture::from_gpu_texture(surface.target.clone(), desc.width, desc.height, AlphaType::Premul);
        Some(Image::Texture(Arc::new(texture)))
    }

    /// Reads `rect` of the surface back as tightly packed RGBA8 rows.
    pub fn read_pixels(&self, surface: &GpuSurface, rect: &Rect) -> Result<Vec<u8>> {
        let bounds = Rect::from_wh(surface.options.width as f32, surface.options.height as f32);
        if rect.is_empty() || !bounds.contains(rect) {
            return Err(TesseraError::ReadPixels(format!(
                "{rect:?} is outside the {}x{} surface",
                surface.options.width, surface.options.height
            )));
        }
        self.device.read_pixels(&surface.target, rect)
    }

    /// Caps the bytes kept by the offscreen render target cache and evicts down to it.
    pub fn set_resource_cache_limit(&self, bytes: usize) {
        let res = self.resources.borrow();
        let mut cache = res.render_targets.borrow_mut();
        cache.set_max_bytes(bytes);
        cache.purge_as_needed();
    }

    pub fn pipeline_lib(&self) -> Ref<'_, HwPipelineLib> {
        Ref::map(self.resources.borrow(), |res| &res.pipeline_lib)
    }

    pub fn atlas_manager(&self) -> RefMut<'_, AtlasManager> {
        RefMut::map(self.resources.borrow_mut(), |res| &mut res.atlas_manager)
    }

    pub fn texture_manager(&self) -> &Arc<TextureManager> {
        &self.texture_manager
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("max_texture_size", &self.device.max_texture_size())
            .field("texture_manager", &self.texture_manager)
            .finish_non_exhaustive()
    }
}

/// A render target plus the canvas that records into it.
#[derive(Debug)]
pub struct GpuSurface {
    canvas: HwCanvas,
    target: Arc<dyn GpuTexture>,
    options: SurfaceOptions,
    locked: bool,
}

impl GpuSurface {
    pub fn width(&self) -> u32 {
        self.options.width
    }

    pub fn height(&self) -> u32 {
        self.options.height
    }

    pub fn options(&self) -> &SurfaceOptions {
        &self.options
    }

    pub fn target(&self) -> &Arc<dyn GpuTexture> {
        &self.target
    }

    /// Points the next frame at a new texture of the same size, e.g. the next swapchain
    /// image. Ignored while a frame is being recorded.
    pub fn set_target(&mut self, target: Arc<dyn GpuTexture>) {
        if !self.locked {
            self.target = target;
        }
    }

    /// The canvas of the current frame, starting a new frame if none is open.
    pub fn lock_canvas(&mut self) -> &mut HwCanvas {
        if !self.locked {
            self.canvas.begin_new_frame(self.target.clone());
            self.locked = true;
        }
        &mut self.canvas
    }

    /// Renders and submits the open frame, if any.
    pub fn flush_and_submit(&mut self) {
        if self.locked {
            self.canvas.flush();
            self.locked = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::paint::{Paint, SamplingOptions};

    fn surface_options(width: u32, height: u32) -> SurfaceOptions {
        SurfaceOptions {
            width,
            height,
            ..SurfaceOptions::default()
        }
    }

    #[test]
    fn surfaces_must_fit_the_device() {
        let context = GpuContext::new_headless(ContextOptions::default());
        assert!(matches!(
            context.create_surface(&surface_options(0, 10)),
            Err(TesseraError::InvalidTextureSize { width: 0, .. })
        ));
        assert!(context.create_surface(&surface_options(10_000, 10)).is_err());
        assert!(context.create_surface(&surface_options(16, 16)).is_ok());
    }

    #[test]
    fn a_cleared_frame_reads_back_transparent() {
        let context = GpuContext::new_headless(ContextOptions::default());
        let mut surface = context.create_surface(&surface_options(4, 4)).unwrap();
        surface.lock_canvas();
        surface.flush_and_submit();
        let pixels = context.read_pixels(&surface, &Rect::from_wh(2.0, 2.0)).unwrap();
        assert_eq!(pixels.len(), 2 * 2 * 4);
        assert!(context.read_pixels(&surface, &Rect::from_wh(8.0, 8.0)).is_err());
    }

    #[test]
    fn snapshots_need_a_render_target() {
        let context = GpuContext::new_headless(ContextOptions::default());
        let plain = context.create_surface(&surface_options(8, 8)).unwrap();
        assert!(context.make_snapshot(&plain).is_none());

        let target = context.create_render_target(&surface_options(8, 8)).unwrap();
        let image = context.make_snapshot(&target).unwrap();
        assert_eq!((image.width(), image.height()), (8, 8));

        let mut other = context.create_surface(&surface_options(16, 16)).unwrap();
        let canvas = other.lock_canvas();
        canvas.draw_image(&image, 4.0, 4.0, SamplingOptions::default(), None);
        assert_eq!(canvas.root_layer().map(|r| r.layer().draw_ops().len()), Some(1));
    }

    #[test]
    fn surfaces_share_the_pipeline_lib() {
        let context = GpuContext::new_headless(ContextOptions::default());
        let mut a = context.create_surface(&surface_options(16, 16)).unwrap();
        let mut b = context.create_surface(&surface_options(16, 16)).unwrap();
        let mut counts = Vec::new();
        for surface in [&mut a, &mut b] {
            surface
                .lock_canvas()
                .draw_rect(&Rect::from_wh(8.0, 8.0), &Paint::fill(Color::RED));
            surface.flush_and_submit();
            counts.push(context.pipeline_lib().pipeline_count());
        }
        assert!(counts[0] > 0);
        assert_eq!(counts[0], counts[1]);
    }
}
