//! Fragment shaders: solid colors, gradients, images, text and filter passes.

mod gradient;
mod image_filter;
mod text;
mod texture;

pub use gradient::{GradientFragment, GradientWgsl};
pub use image_filter::{BlurFragment, ImageFilterFragment};
pub use text::{ColorEmojiFragment, ColorTextFragment, GradientTextFragment, SdfColorTextFragment, TextTextures};
pub use texture::TextureFragment;

use crate::color::Color4f;
use crate::gpu::Command;
use crate::hw::HwDrawContext;

use super::{upload_uniform_bytes, ShaderFlags, WgslFragment, WgxFilter};

/// Binds the fragment's resources, then its filter's.
pub fn prepare_fragment(fragment: &dyn WgslFragment, cmd: &mut Command, ctx: &mut HwDrawContext<'_, '_>) {
    fragment.prepare_cmd(cmd, ctx);
    if let Some(filter) = fragment.filter() {
        filter.setup_bind_group(cmd, ctx);
    }
}

pub(crate) fn init_filter(next_binding: u32, mut filter: WgxFilter) -> WgxFilter {
    filter.init_binding(next_binding);
    filter
}

/// A uniform color, unpremultiplied on the CPU side.
#[derive(Debug, Clone)]
pub struct SolidColorFragment {
    color: Color4f,
    filter: Option<WgxFilter>,
}

impl SolidColorFragment {
    pub fn new(color: Color4f) -> Self {
        Self { color, filter: None }
    }
}

impl WgslFragment for SolidColorFragment {
    fn name(&self) -> String {
        "SolidColor".to_string()
    }

    fn fs_uniforms(&self) -> String {
        "\n@group(1) @binding(0) var<uniform> uColor: vec4<f32>;\n".to_string()
    }

    fn fs_main(&self) -> String {
        "  color = vec4<f32>(uColor.rgb * uColor.a, uColor.a);\n".to_string()
    }

    fn next_binding(&self) -> u32 {
        1
    }

    fn filter(&self) -> Option<&WgxFilter> {
        self.filter.as_ref()
    }

    fn set_filter(&mut self, filter: WgxFilter) {
        self.filter = Some(init_filter(self.next_binding(), filter));
    }

    fn prepare_cmd(&self, cmd: &mut Command, ctx: &mut HwDrawContext<'_, '_>) {
        upload_uniform_bytes(cmd, ctx, "uColor", bytemuck::bytes_of(&self.color));
    }
}

/// Per-instance color passed through from the vertex stage.
#[derive(Debug, Clone, Default)]
pub struct SolidVertexColorFragment {
    filter: Option<WgxFilter>,
}

impl SolidVertexColorFragment {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WgslFragment for SolidVertexColorFragment {
    fn flags(&self) -> ShaderFlags {
        ShaderFlags::SNIPPET | ShaderFlags::AFFECTS_VERTEX
    }

    fn name(&self) -> String {
        "SolidVertexColor".to_string()
    }

    fn vs_name_suffix(&self) -> String {
        "SolidVertexColor".to_string()
    }

    fn vs_assign(&self) -> String {
        "  output.f_color = input.color;\n".to_string()
    }

    fn varyings(&self) -> Vec<String> {
        vec!["f_color: vec4<f32>".to_string()]
    }

    fn fs_main(&self) -> String {
        "  color = vec4<f32>(input.f_color.rgb * input.f_color.a, input.f_color.a);\n".to_string()
    }

    fn next_binding(&self) -> u32 {
        0
    }

    fn filter(&self) -> Option<&WgxFilter> {
        self.filter.as_ref()
    }

    fn set_filter(&mut self, filter: WgxFilter) {
        self.filter = Some(init_filter(self.next_binding(), filter));
    }

    fn prepare_cmd(&self, _cmd: &mut Command, _ctx: &mut HwDrawContext<'_, '_>) {}
}

/// Writes nothing; used by stencil and clip steps whose color writes are masked.
#[derive(Debug, Clone, Copy, Default)]
pub struct StencilFragment;

impl WgslFragment for StencilFragment {
    fn name(&self) -> String {
        "Stencil".to_string()
    }

    fn fs_main(&self) -> String {
        "  color = vec4<f32>(0.0);\n".to_string()
    }

    fn next_binding(&self) -> u32 {
        0
    }

    fn filter(&self) -> Option<&WgxFilter> {
        None
    }

    fn set_filter(&mut self, _filter: WgxFilter) {}

    fn prepare_cmd(&self, _cmd: &mut Command, _ctx: &mut HwDrawContext<'_, '_>) {}
}
