//! Stitches a geometry and a fragment into vertex and fragment modules.

use std::sync::LazyLock;

use regex::Regex;

use super::{ShaderFlags, WgslFragment, WgslGeometry};

/// `name: type` with an optional `@interpolate(..)` attribute in front.
static VARYING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(?:@interpolate\s*\([^)]*\)\s*)?([A-Za-z_]\w*)\s*:").ok());

/// True when `decl` declares a varying whose name starts with `prefix`.
pub fn varying_has_prefix(decl: &str, prefix: &str) -> bool {
    VARYING
        .as_ref()
        .and_then(|re| re.captures(decl))
        .and_then(|c| c.get(1))
        .is_some_and(|name| name.as_str().starts_with(prefix))
}

pub struct WgslShaderWriter<'a> {
    geometry: &'a dyn WgslGeometry,
    fragment: &'a dyn WgslFragment,
}

impl<'a> WgslShaderWriter<'a> {
    pub fn new(geometry: &'a dyn WgslGeometry, fragment: &'a dyn WgslFragment) -> Self {
        Self { geometry, fragment }
    }

    fn fragment_affects_vertex(&self) -> bool {
        self.fragment.flags().contains(ShaderFlags::AFFECTS_VERTEX)
    }

    fn geometry_affects_fragment(&self) -> bool {
        self.geometry.flags().contains(ShaderFlags::AFFECTS_FRAGMENT)
    }

    /// `VS_<geometry>[_<fragment vertex suffix>]`, or the geometry's own name when it is
    /// self-contained.
    pub fn vs_shader_name(&self) -> String {
        if !self.geometry.flags().contains(ShaderFlags::SNIPPET) {
            return self.geometry.shader_name();
        }
        let mut name = format!("VS_{}", self.geometry.name());
        if self.fragment_affects_vertex() {
            name.push('_');
            name.push_str(&self.fragment.vs_name_suffix());
        }
        name
    }

    /// `FS_<fragment>[_<geometry fragment suffix>][_<filter>]`.
    pub fn fs_shader_name(&self) -> String {
        let mut name = if self.fragment.flags().contains(ShaderFlags::SNIPPET) {
            let mut name = format!("FS_{}", self.fragment.name());
            if self.geometry_affects_fragment() {
                name.push('_');
                name.push_str(&self.geometry.fs_name_suffix());
            }
            name
        } else {
            self.fragment.shader_name()
        };
        if let Some(filter) = self.fragment.filter() {
            name.push('_');
            name.push_str(&filter.name());
        }
        name
    }

    /// Fragment varyings first, then geometry varyings; locations follow this order.
    fn varyings(&self) -> Vec<String> {
        let mut varyings = self.fragment.varyings();
        debug_assert!(varyings.iter().all(|v| varying_has_prefix(v, "f_")));
        let geometry = self.geometry.varyings();
        debug_assert!(geometry.iter().all(|v| varying_has_prefix(v, "v_")));
        varyings.extend(geometry);
        varyings
    }

    pub fn gen_vs_source(&self) -> String {
        if !self.geometry.flags().contains(ShaderFlags::SNIPPET) {
            return self.geometry.gen_source_wgsl();
        }
        let with_fragment = self.fragment_affects_vertex();
        let mut src = self.geometry.vs_functions();
        if with_fragment {
            src += &self.fragment.vs_functions();
        }
        src += &self.geometry.vs_uniforms();
        if with_fragment {
            src += &self.fragment.vs_uniforms();
        }
        src += &self.geometry.vs_input();

        src += "\nstruct VSOutput {\n  @builtin(position) pos: vec4<f32>,\n";
        for (location, varying) in self.varyings().iter().enumerate() {
            src += &format!("  @location({location}) {varying},\n");
        }
        src += "};\n\n@vertex\nfn vs_main(input: VSInput) -> VSOutput {\n  var output: VSOutput;\n  var local_pos: vec2<f32>;\n";
        src += &self.geometry.vs_main();
        if with_fragment {
            src += &self.fragment.vs_assign();
        }
        src += "  return output;\n}\n";
        src
    }

    pub fn gen_fs_source(&self) -> String {
        if !self.fragment.flags().contains(ShaderFlags::SNIPPET) {
            return self.fragment.gen_source_wgsl();
        }
        let with_mask = self.geometry_affects_fragment();
        let mut src = self.fragment.fs_functions();
        if with_mask {
            src += &self.geometry.fs_functions();
        }
        if let Some(filter) = self.fragment.filter() {
            src += &filter.gen_source_wgsl();
        }
        src += &self.fragment.fs_uniforms();

        let varyings = self.varyings();
        if varyings.is_empty() {
            src += "\n@fragment\nfn fs_main() -> @location(0) vec4<f32> {\n";
        } else {
            src += "\nstruct FSInput {\n";
            for (location, varying) in varyings.iter().enumerate() {
                src += &format!("  @location({location}) {varying},\n");
            }
            src += "};\n\n@fragment\nfn fs_main(input: FSInput) -> @location(0) vec4<f32> {\n";
        }
        src += "  var color: vec4<f32>;\n";
        src += &self.fragment.fs_main();
        if self.fragment.filter().is_some() {
            src += "  color = filter_color(color);\n";
        }
        if with_mask {
            src += "  var mask_alpha: f32 = 1.0;\n";
            src += &self.geometry.fs_mask();
            src += "  color = color * mask_alpha;\n";
        }
        src += "  return color;\n}\n";
        src
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varying_prefixes() {
        assert!(varying_has_prefix("f_color: vec4<f32>", "f_"));
        assert!(varying_has_prefix("@interpolate(flat) v_rect: vec4<f32>", "v_"));
        assert!(!varying_has_prefix("v_pos_aa: f32", "f_"));
        assert!(!varying_has_prefix("color", "c"));
    }
}
