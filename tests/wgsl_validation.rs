//! Every composed shader variant must parse and validate with naga.

use std::sync::Arc;

use tessera::color::Color4f;
use tessera::geometry::{point, Matrix, RRect, Rect};
use tessera::gpu::headless::HeadlessDevice;
use tessera::gpu::{GpuDevice, SamplerDescriptor, TextureDescriptor, TextureFormat, TextureUsage};
use tessera::shader::fragment::{
    BlurFragment, ColorEmojiFragment, ColorTextFragment, GradientFragment, GradientTextFragment, ImageFilterFragment,
    SdfColorTextFragment, SolidColorFragment, SolidVertexColorFragment, StencilFragment, TextTextures,
    TextureFragment,
};
use tessera::shader::geometry::{
    FilterGeometry, PathAaGeometry, PathGeometry, RRectGeometry, RRectItem, TextGeometry, TextGeometryKind,
};
use tessera::shader::reflect::parse_and_validate;
use tessera::shader::{WgslFragment, WgslGeometry, WgslShaderWriter, WgxFilter};
use tessera::text::MAX_NUM_TEXTURE_PER_ATLAS;
use tessera::{
    BlendMode, Color, ColorFilter, GradientShader, Image, ImageShader, Paint, Path, Pixmap, SamplingOptions, TileMode,
};

fn validate(geometry: &dyn WgslGeometry, fragment: &dyn WgslFragment) {
    let writer = WgslShaderWriter::new(geometry, fragment);
    let vs_name = writer.vs_shader_name();
    let fs_name = writer.fs_shader_name();
    if let Err(err) = parse_and_validate(&vs_name, &writer.gen_vs_source()) {
        panic!("{vs_name} (with {fs_name}) failed validation: {err}");
    }
    if let Err(err) = parse_and_validate(&fs_name, &writer.gen_fs_source()) {
        panic!("{fs_name} (with {vs_name}) failed validation: {err}");
    }
}

fn gradients() -> Vec<GradientShader> {
    let colors = vec![
        Color::RED.to_color4f(),
        Color::GREEN.to_color4f(),
        Color::BLUE.to_color4f(),
    ];
    let stops = vec![0.0, 0.5, 1.0];
    vec![
        GradientShader::linear(point(0.0, 0.0), point(10.0, 0.0), colors.clone(), stops.clone(), TileMode::Clamp),
        GradientShader::radial(point(5.0, 5.0), 5.0, colors.clone(), stops.clone(), TileMode::Repeat),
        GradientShader::two_point_conical(
            point(2.0, 2.0),
            1.0,
            point(6.0, 6.0),
            5.0,
            colors.clone(),
            stops.clone(),
            TileMode::Mirror,
        ),
        GradientShader::sweep(point(5.0, 5.0), 0.0, 360.0, colors, stops, TileMode::Decal),
    ]
}

fn filters() -> Vec<ColorFilter> {
    let mut identity = [0.0; 20];
    for i in 0..4 {
        identity[i * 5 + i] = 1.0;
    }
    vec![
        ColorFilter::Blend {
            color: Color::RED,
            mode: BlendMode::SrcIn,
        },
        ColorFilter::Matrix(identity),
        ColorFilter::LinearToSrgbGamma,
        ColorFilter::SrgbToLinearGamma,
    ]
}

fn image_shader() -> ImageShader {
    ImageShader {
        image: Image::Pixmap(Arc::new(Pixmap::from_rgba(1, 1, vec![255, 0, 0, 255]))),
        sampling: SamplingOptions::linear(),
        tile_x: TileMode::Repeat,
        tile_y: TileMode::Decal,
        local_matrix: Matrix::identity(),
    }
}

/// Fragments that pair with the path and rrect geometries.
fn shape_fragments() -> Vec<Box<dyn WgslFragment>> {
    let mut fragments: Vec<Box<dyn WgslFragment>> = vec![
        Box::new(SolidColorFragment::new(Color4f::BLACK)),
        Box::new(TextureFragment::new(image_shader(), 1.0)),
    ];
    for gradient in gradients() {
        fragments.push(Box::new(GradientFragment::new(&gradient, 0.5)));
    }
    for filter in filters() {
        let mut fragment = SolidColorFragment::new(Color4f::BLACK);
        fragment.set_filter(WgxFilter::make(&filter));
        fragments.push(Box::new(fragment));

        let mut fragment = TextureFragment::new(image_shader(), 1.0);
        fragment.set_filter(WgxFilter::make(&filter));
        fragments.push(Box::new(fragment));
    }
    let composed = ColorFilter::compose(
        Arc::new(ColorFilter::LinearToSrgbGamma),
        Arc::new(ColorFilter::Blend {
            color: Color::BLUE,
            mode: BlendMode::Multiply,
        }),
    );
    let mut fragment = GradientFragment::new(&gradients()[0], 1.0);
    fragment.set_filter(WgxFilter::make(&composed));
    fragments.push(Box::new(fragment));
    fragments
}

#[test]
fn path_geometries_validate_with_every_fragment() {
    let path = Path::rect(&Rect::from_wh(10.0, 10.0));
    let fill = Paint::default();
    let stroke = Paint::stroke(Color::BLACK, 2.0);
    let fill_geometry = PathGeometry::new(&path, &fill, false);
    let stroke_geometry = PathGeometry::new(&path, &stroke, true);
    let aa_geometry = PathAaGeometry::new(&path);

    validate(&fill_geometry, &StencilFragment);
    for fragment in shape_fragments() {
        validate(&fill_geometry, fragment.as_ref());
        validate(&stroke_geometry, fragment.as_ref());
        validate(&aa_geometry, fragment.as_ref());
    }
}

#[test]
fn rrect_geometry_validates_with_every_fragment() {
    let items = vec![RRectItem {
        rrect: RRect::from_rect_xy(Rect::from_wh(20.0, 10.0), 3.0, 3.0),
        paint: Paint::fill(Color::RED),
        transform: Matrix::identity(),
    }];
    let geometry = RRectGeometry::new(&items);

    validate(&geometry, &SolidVertexColorFragment::new());
    for filter in filters() {
        let mut fragment = SolidVertexColorFragment::new();
        fragment.set_filter(WgxFilter::make(&filter));
        validate(&geometry, &fragment);
    }
    for fragment in shape_fragments() {
        validate(&geometry, fragment.as_ref());
    }
}

fn text_textures(device: &HeadlessDevice) -> TextTextures {
    let textures = std::array::from_fn::<_, MAX_NUM_TEXTURE_PER_ATLAS, _>(|_| {
        device.create_texture(&TextureDescriptor::new(
            8,
            8,
            TextureFormat::R8Unorm,
            TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        ))
    });
    TextTextures {
        textures,
        sampler: device.create_sampler(&SamplerDescriptor::linear()),
    }
}

#[test]
fn text_shaders_validate() {
    let device = HeadlessDevice::default();
    let textures = text_textures(&device);
    let solid = TextGeometry::new(TextGeometryKind::SolidColor, &[]);

    validate(&solid, &ColorTextFragment::new(textures.clone(), Color4f::BLACK));
    validate(&solid, &SdfColorTextFragment::new(textures.clone(), Color4f::BLACK));
    validate(&solid, &ColorEmojiFragment::new(textures.clone(), true, 1.0));
    validate(&solid, &ColorEmojiFragment::new(textures.clone(), false, 0.5));

    for gradient in gradients() {
        let geometry = TextGeometry::new(
            TextGeometryKind::Gradient {
                inv_matrix: Matrix::identity(),
            },
            &[],
        );
        validate(&geometry, &GradientTextFragment::new(textures.clone(), &gradient, 1.0));
    }

    for filter in filters() {
        let mut fragment = ColorTextFragment::new(textures.clone(), Color4f::BLACK);
        fragment.set_filter(WgxFilter::make(&filter));
        validate(&solid, &fragment);
    }
}

#[test]
fn filter_pass_shaders_validate() {
    let device = HeadlessDevice::default();
    let texture = device.create_texture(&TextureDescriptor::new(
        8,
        8,
        TextureFormat::Rgba8Unorm,
        TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
    ));
    let geometry = FilterGeometry::full_target(false);

    validate(&geometry, &ImageFilterFragment::new(texture.clone()));
    validate(&geometry, &BlurFragment::new(texture.clone(), [1.0, 0.0], 4.0, [1.5, 1.0], [-0.25, 0.0]));
    for filter in filters() {
        let mut fragment = ImageFilterFragment::new(texture.clone());
        fragment.set_filter(WgxFilter::make(&filter));
        validate(&geometry, &fragment);
    }
}
