//! Pooled GPU resources with byte-budget eviction.

mod render_target;
mod resource_cache;

pub use render_target::{HwRenderTarget, HwRenderTargetAllocator, HwRenderTargetCache, RenderTargetPool};
pub use resource_cache::{HwResource, HwResourceAllocator, HwResourceCache, Pool};
