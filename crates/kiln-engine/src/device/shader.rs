//! WGSL for the built-in programs.
//!
//! One vertex/fragment pair serves every program kind; the kind selects a
//! branch through the first word of `Globals::params`. Variants differ only
//! in which vertex attributes exist and which texture dimension is sampled,
//! since WGSL has no optional inputs.

use bytemuck::{Pod, Zeroable};

use crate::driver::ProgramKind;

pub(super) const MODE_PRIMITIVE: u32 = 0;
pub(super) const MODE_TILE: u32 = 1;
pub(super) const MODE_BORDER_TILE: u32 = 2;
pub(super) const MODE_BORDER_TILE_LINE: u32 = 3;
pub(super) const MODE_QUAD_LAYER: u32 = 4;
pub(super) const MODE_QUAD: u32 = 5;
pub(super) const MODE_SPRITES: u32 = 6;

pub(super) const FLAG_ROTATION: u32 = 1 << 1;

pub(super) const ATTR_TEX: u8 = 1 << 1;
pub(super) const ATTR_COLOR: u8 = 1 << 2;

/// Per-draw uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub(super) struct Globals {
    pub ortho: [[f32; 4]; 2],
    pub color: [f32; 4],
    /// `offset.xy`, `dir.xy`
    pub offset_dir: [f32; 4],
    /// `center.xy`, rotation, unused
    pub center_rotation: [f32; 4],
    /// mode, jump index, quad offset, flags
    pub params: [u32; 4],
}

impl Globals {
    pub fn for_kind(kind: Option<ProgramKind>) -> Self {
        let mode = match kind {
            None | Some(ProgramKind::Primitive { .. } | ProgramKind::Primitive3D { .. }) => {
                MODE_PRIMITIVE
            }
            Some(ProgramKind::Tile { .. }) => MODE_TILE,
            Some(ProgramKind::BorderTile { .. }) => MODE_BORDER_TILE,
            Some(ProgramKind::BorderTileLine { .. }) => MODE_BORDER_TILE_LINE,
            Some(ProgramKind::QuadLayer { .. }) => MODE_QUAD_LAYER,
            Some(ProgramKind::Quad { .. }) => MODE_QUAD,
            Some(ProgramKind::SpriteMultiple) => MODE_SPRITES,
        };
        let mut flags = 0;
        if let Some(ProgramKind::Quad { rotation: true, .. }) = kind {
            flags |= FLAG_ROTATION;
        }
        Self {
            ortho: [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]],
            color: [1.0; 4],
            offset_dir: [0.0; 4],
            center_rotation: [0.0; 4],
            params: [mode, 1, 0, flags],
        }
    }
}

/// Texture dimension a shader variant samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum Sampled {
    None,
    D2,
    D2Array,
    D3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) struct ShaderKey {
    /// `ATTR_*` bits present besides the position.
    pub attributes: u8,
    pub sampled: Sampled,
}

const COMMON: &str = r#"
struct Globals {
    ortho0: vec4<f32>,
    ortho1: vec4<f32>,
    color: vec4<f32>,
    offset_dir: vec4<f32>,
    center_rotation: vec4<f32>,
    params: vec4<u32>,
};

@group(0) @binding(0) var<uniform> g: Globals;
@group(0) @binding(1) var<storage, read> items: array<vec4<f32>>;

struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) tex: vec3<f32>,
    @location(1) color: vec4<f32>,
};

fn rotate_around(p: vec2<f32>, center: vec2<f32>, angle: f32) -> vec2<f32> {
    let s = sin(angle);
    let c = cos(angle);
    let d = p - center;
    return center + vec2<f32>(d.x * c - d.y * s, d.x * s + d.y * c);
}

fn shade(v: VsIn) -> VsOut {
    var pos = v.pos;
    var color = VERTEX_COLOR;
    switch g.params.x {
        case 1u: {
            color = g.color;
        }
        case 2u: {
            let jump = max(g.params.y, 1u);
            let step = vec2<f32>(f32(v.instance % jump), f32(v.instance / jump));
            pos = pos + g.offset_dir.xy + g.offset_dir.zw * step;
            color = g.color;
        }
        case 3u: {
            pos = pos + g.offset_dir.xy + g.offset_dir.zw * f32(v.instance);
            color = g.color;
        }
        case 4u: {
            let quad = v.vertex / 4u - g.params.z;
            let info = items[quad * 2u + 1u];
            pos = rotate_around(pos, vec2<f32>(0.0, 0.0), info.z) + info.xy;
            color = items[quad * 2u] * color;
        }
        case 5u: {
            if ((g.params.w & 2u) != 0u) {
                pos = rotate_around(pos, g.center_rotation.xy, g.center_rotation.z);
            }
            color = g.color * color;
        }
        case 6u: {
            let sprite = items[v.instance];
            pos = rotate_around(pos, g.center_rotation.xy, sprite.w) * sprite.z + sprite.xy;
            color = g.color * color;
        }
        default: {}
    }
    var out: VsOut;
    let p = vec4<f32>(pos, 0.0, 1.0);
    out.clip = vec4<f32>(dot(g.ortho0, p), dot(g.ortho1, p), 0.0, 1.0);
    out.tex = VERTEX_TEX;
    out.color = color;
    return out;
}

@vertex
fn vs_main(v: VsIn) -> VsOut {
    return shade(v);
}
"#;

fn vertex_input(key: ShaderKey) -> String {
    let mut fields = vec!["    @location(0) pos: vec2<f32>,".to_string()];
    if key.attributes & ATTR_TEX != 0 {
        fields.push("    @location(1) tex: vec3<f32>,".to_string());
    }
    if key.attributes & ATTR_COLOR != 0 {
        fields.push("    @location(2) color: vec4<f32>,".to_string());
    }
    fields.push("    @builtin(vertex_index) vertex: u32,".to_string());
    fields.push("    @builtin(instance_index) instance: u32,".to_string());
    format!("struct VsIn {{\n{}\n}};\n", fields.join("\n"))
}

fn fragment(sampled: Sampled) -> &'static str {
    match sampled {
        Sampled::None => {
            r#"
@fragment
fn fs_main(frag: VsOut) -> @location(0) vec4<f32> {
    return frag.color;
}
"#
        }
        Sampled::D2 => {
            r#"
@group(1) @binding(0) var t: texture_2d<f32>;
@group(1) @binding(1) var s: sampler;

@fragment
fn fs_main(frag: VsOut) -> @location(0) vec4<f32> {
    return textureSample(t, s, frag.tex.xy) * frag.color;
}
"#
        }
        Sampled::D2Array => {
            r#"
@group(1) @binding(0) var t: texture_2d_array<f32>;
@group(1) @binding(1) var s: sampler;

@fragment
fn fs_main(frag: VsOut) -> @location(0) vec4<f32> {
    let layer = i32(round(frag.tex.z));
    return textureSample(t, s, frag.tex.xy, layer) * frag.color;
}
"#
        }
        Sampled::D3 => {
            r#"
@group(1) @binding(0) var t: texture_3d<f32>;
@group(1) @binding(1) var s: sampler;

@fragment
fn fs_main(frag: VsOut) -> @location(0) vec4<f32> {
    return textureSample(t, s, frag.tex) * frag.color;
}
"#
        }
    }
}

/// Full WGSL module for one variant.
pub(super) fn source(key: ShaderKey) -> String {
    let tex = if key.attributes & ATTR_TEX != 0 {
        "v.tex"
    } else {
        "vec3<f32>(0.0, 0.0, 0.0)"
    };
    let color = if key.attributes & ATTR_COLOR != 0 {
        "v.color"
    } else {
        "vec4<f32>(1.0, 1.0, 1.0, 1.0)"
    };
    let common = COMMON
        .replace("VERTEX_TEX", tex)
        .replace("VERTEX_COLOR", color);
    format!("{}{}{}", vertex_input(key), common, fragment(key.sampled))
}

/// Fullscreen blit of the offscreen target onto the surface.
pub(super) const BLIT: &str = r#"
@group(0) @binding(0) var t: texture_2d<f32>;
@group(0) @binding(1) var s: sampler;

struct BlitOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> BlitOut {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: BlitOut;
    out.clip = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(frag: BlitOut) -> @location(0) vec4<f32> {
    return textureSample(t, s, frag.uv);
}
"#;
