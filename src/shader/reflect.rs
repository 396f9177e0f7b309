//! Bind-group reflection of generated WGSL through `naga`.
//!
//! Geometries and fragments never hard-code uniform layouts. They look up an entry by name
//! and write struct members by name into a [`UniformBlock`], whose size and member offsets
//! come from the reflected module.

use naga::proc::Layouter;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, TypeInner};

use crate::error::{Result, TesseraError};
use crate::gpu::ShaderStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    UniformBuffer,
    Texture,
    Sampler,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformMember {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// Layout of a uniform buffer binding. Non-struct uniforms have no members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformType {
    pub name: String,
    pub size: u32,
    pub members: Vec<UniformMember>,
}

impl UniformType {
    pub fn member(&self, name: &str) -> Option<&UniformMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub name: String,
    pub kind: BindingKind,
    pub stages: ShaderStage,
    pub ty: Option<UniformType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroup {
    pub group: u32,
    pub entries: Vec<BindGroupEntry>,
}

impl BindGroup {
    pub fn entry(&self, name: &str) -> Option<&BindGroupEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Finds an entry by variable name across all groups.
pub fn find_entry<'a>(groups: &'a [BindGroup], name: &str) -> Option<(u32, &'a BindGroupEntry)> {
    groups
        .iter()
        .find_map(|g| g.entry(name).map(|e| (g.group, e)))
}

/// CPU image of one uniform buffer, laid out as the shader expects.
#[derive(Debug, Clone)]
pub struct UniformBlock<'a> {
    ty: &'a UniformType,
    bytes: Vec<u8>,
}

impl<'a> UniformBlock<'a> {
    pub fn new(ty: &'a UniformType) -> Self {
        Self {
            ty,
            bytes: vec![0; ty.size as usize],
        }
    }

    /// Writes `data` at the offset of `member`. Data longer than the member is truncated;
    /// unknown members are ignored and reported as `false`.
    pub fn set(&mut self, member: &str, data: &[u8]) -> bool {
        let Some(m) = self.ty.member(member) else {
            return false;
        };
        let start = m.offset as usize;
        let len = data.len().min(m.size as usize);
        self.bytes[start..start + len].copy_from_slice(&data[..len]);
        true
    }

    pub fn set_pod<T: bytemuck::Pod>(&mut self, member: &str, value: &T) -> bool {
        self.set(member, bytemuck::bytes_of(value))
    }

    /// Overwrites the block from its start. Used for uniforms that are not structs.
    pub fn set_all(&mut self, data: &[u8]) {
        let len = data.len().min(self.bytes.len());
        self.bytes[..len].copy_from_slice(&data[..len]);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Parses and validates WGSL, returning the naga module.
pub fn parse_and_validate(name: &str, source: &str) -> Result<naga::Module> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| TesseraError::ShaderCompile {
        name: name.to_string(),
        message: e.emit_to_string(source),
    })?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| TesseraError::ShaderCompile {
            name: name.to_string(),
            message: e.emit_to_string(source),
        })?;
    Ok(module)
}

/// Reflects every resource binding declared by `source`. All of them are attributed to
/// `stage`, since each generated module holds a single entry point.
pub fn reflect_bind_groups(name: &str, source: &str, stage: ShaderStage) -> Result<Vec<BindGroup>> {
    let module = parse_and_validate(name, source)?;
    reflect_module(name, &module, stage)
}

pub fn reflect_module(name: &str, module: &naga::Module, stage: ShaderStage) -> Result<Vec<BindGroup>> {
    let mut layouter = Layouter::default();
    layouter
        .update(module.to_ctx())
        .map_err(|e| TesseraError::ShaderReflect {
            name: name.to_string(),
            message: e.to_string(),
        })?;

    let mut groups: Vec<BindGroup> = Vec::new();
    for (_, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else {
            continue;
        };
        let inner = &module.types[var.ty].inner;
        let kind = match (var.space, inner) {
            (AddressSpace::Uniform, _) => BindingKind::UniformBuffer,
            (AddressSpace::Handle, TypeInner::Image { .. }) => BindingKind::Texture,
            (AddressSpace::Handle, TypeInner::Sampler { .. }) => BindingKind::Sampler,
            _ => {
                return Err(TesseraError::ShaderReflect {
                    name: name.to_string(),
                    message: format!("unsupported binding `{}`", var.name.as_deref().unwrap_or("?")),
                })
            }
        };
        let ty = (kind == BindingKind::UniformBuffer).then(|| {
            let members = match inner {
                TypeInner::Struct { members, .. } => members
                    .iter()
                    .map(|m| UniformMember {
                        name: m.name.clone().unwrap_or_default(),
                        offset: m.offset,
                        size: layouter[m.ty].size,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            UniformType {
                name: module.types[var.ty]
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{:?}", inner)),
                size: layouter[var.ty].size,
                members,
            }
        });
        let entry = BindGroupEntry {
            binding: binding.binding,
            name: var.name.clone().unwrap_or_default(),
            kind,
            stages: stage,
            ty,
        };
        match groups.iter_mut().find(|g| g.group == binding.group) {
            Some(g) => g.entries.push(entry),
            None => groups.push(BindGroup {
                group: binding.group,
                entries: vec![entry],
            }),
        }
    }
    for g in &mut groups {
        g.entries.sort_by_key(|e| e.binding);
    }
    groups.sort_by_key(|g| g.group);
    Ok(groups)
}

/// Merges the vertex and fragment bind groups of one pipeline.
///
/// Entries sharing a group and binding must agree on name and kind; their stage masks are
/// combined. Any disagreement is a conflict and makes the pipeline unusable.
pub fn merge_bind_groups(vs: &[BindGroup], fs: &[BindGroup]) -> Result<Vec<BindGroup>> {
    let mut merged: Vec<BindGroup> = vs.to_vec();
    for group in fs {
        let Some(target) = merged.iter_mut().find(|g| g.group == group.group) else {
            merged.push(group.clone());
            continue;
        };
        for entry in &group.entries {
            match target.entries.iter_mut().find(|e| e.binding == entry.binding) {
                Some(existing) => {
                    if existing.name != entry.name || existing.kind != entry.kind || existing.ty != entry.ty {
                        return Err(TesseraError::BindGroupConflict { group: group.group });
                    }
                    existing.stages |= entry.stages;
                }
                None => target.entries.push(entry.clone()),
            }
        }
        target.entries.sort_by_key(|e| e.binding);
    }
    merged.sort_by_key(|g| g.group);
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = r#"
struct CommonSlot {
  mvp : mat4x4<f32>,
  transform : mat4x4<f32>,
  info : vec2<f32>,
};
@group(0) @binding(0) var<uniform> common_slot : CommonSlot;
@vertex
fn vs_main(@location(0) a_pos : vec2<f32>) -> @builtin(position) vec4<f32> {
  return common_slot.mvp * vec4<f32>(a_pos, common_slot.info.x, 1.0);
}
"#;

    const FS: &str = r#"
@group(1) @binding(0) var<uniform> uColor : vec4<f32>;
@group(1) @binding(1) var uSampler : sampler;
@group(1) @binding(2) var uTexture : texture_2d<f32>;
@fragment
fn fs_main() -> @location(0) vec4<f32> {
  return uColor * textureSample(uTexture, uSampler, vec2<f32>(0.5, 0.5));
}
"#;

    #[test]
    fn reflects_struct_offsets() {
        let groups = reflect_bind_groups("vs", VS, ShaderStage::VERTEX).unwrap();
        assert_eq!(groups.len(), 1);
        let entry = groups[0].entry("common_slot").unwrap();
        let ty = entry.ty.as_ref().unwrap();
        assert_eq!(ty.name, "CommonSlot");
        assert_eq!(ty.member("transform").unwrap().offset, 64);
        assert_eq!(ty.member("info").unwrap().offset, 128);
        assert_eq!(ty.size, 144);
    }

    #[test]
    fn reflects_textures_and_samplers() {
        let groups = reflect_bind_groups("fs", FS, ShaderStage::FRAGMENT).unwrap();
        let kinds: Vec<_> = groups[0].entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![BindingKind::UniformBuffer, BindingKind::Sampler, BindingKind::Texture]
        );
        assert_eq!(groups[0].entry("uColor").unwrap().ty.as_ref().unwrap().size, 16);
    }

    #[test]
    fn merge_unions_stages_and_rejects_conflicts() {
        let vs = reflect_bind_groups("vs", VS, ShaderStage::VERTEX).unwrap();
        let fs = reflect_bind_groups("fs", FS, ShaderStage::FRAGMENT).unwrap();
        let merged = merge_bind_groups(&vs, &fs).unwrap();
        assert_eq!(merged.len(), 2);

        let merged = merge_bind_groups(&vs, &vs).unwrap();
        assert_eq!(merged[0].entries[0].stages, ShaderStage::VERTEX);

        let mut clash = fs.clone();
        clash[0].group = 0;
        assert!(matches!(
            merge_bind_groups(&vs, &clash),
            Err(TesseraError::BindGroupConflict { group: 0 })
        ));
    }

    #[test]
    fn uniform_block_writes_by_member_name() {
        let groups = reflect_bind_groups("vs", VS, ShaderStage::VERTEX).unwrap();
        let ty = groups[0].entry("common_slot").unwrap().ty.clone().unwrap();
        let mut block = UniformBlock::new(&ty);
        assert!(block.set_pod("info", &[0.5f32, 2.0]));
        assert!(!block.set_pod("missing", &1.0f32));
        assert_eq!(&block.bytes()[128..136], bytemuck::bytes_of(&[0.5f32, 2.0]));
    }
}
