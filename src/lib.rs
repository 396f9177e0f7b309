//! Tessera is the GPU core of a 2D vector renderer.
//!
//! Paths are filled by stencil-and-cover, rounded rects and glyphs are instanced, and every
//! draw is shaded by a WGSL program composed from a geometry part and a fragment part.
//! Offscreen layers, clip paths and three text tiers (direct atlas, signed distance field,
//! outlines) sit on top of a small GPU abstraction with a `wgpu` backend and a recording
//! headless backend.
//!
//! ```
//! use tessera::{Color, ContextOptions, GpuContext, Paint, Rect, SurfaceOptions};
//!
//! let context = GpuContext::new_headless(ContextOptions::default());
//! let mut surface = context
//!     .create_surface(&SurfaceOptions { width: 64, height: 64, ..Default::default() })
//!     .unwrap();
//! surface
//!     .lock_canvas()
//!     .draw_rect(&Rect::from_xywh(8.0, 8.0, 32.0, 32.0), &Paint::fill(Color::RED));
//! surface.flush_and_submit();
//! ```

pub use wgpu;

pub mod cache;
pub mod color;
pub mod config;
pub mod context;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod hw;
#[cfg(feature = "render_metrics")]
pub mod metrics;
pub mod paint;
pub mod path;
pub mod shader;
pub mod text;
pub mod texture;

pub use color::{Color, Color4f};
pub use config::{ContextOptions, ErrorCallback, SurfaceOptions, TextRenderConfig};
pub use context::{GpuContext, GpuSurface};
pub use error::{Result, TesseraError};
pub use geometry::{point, Matrix, Point, RRect, Rect};
pub use hw::draw::ClipOp;
pub use hw::HwCanvas;
pub use paint::{
    AlphaType, BlendMode, ColorFilter, ColorType, FilterMode, GradientShader, Image, ImageFilter, ImageShader,
    MaskFilter, Paint, PaintStyle, Pixmap, SamplingOptions, Shader, StrokeCap, StrokeJoin, TileMode,
};
pub use path::{FillType, Path, PathBuilder};
pub use text::{Font, GlyphId, Typeface};
pub use texture::{Texture, TextureManager};
