use super::{InputDecl, InputKind, ProgramDesc};
use crate::compile::plan::PixelFormat;
use crate::foundation::core::{Rgba8, luminance};

pub(crate) const CAPTURE: &str = "u_capture";
pub(crate) const THRESHOLD: &str = "u_threshold";

pub(crate) static DESC: ProgramDesc = ProgramDesc {
    name: "mask",
    inputs: &[
        InputDecl {
            name: CAPTURE,
            kind: InputKind::Surface(PixelFormat::Rgba8Unorm),
        },
        InputDecl {
            name: THRESHOLD,
            kind: InputKind::Float,
        },
    ],
    output: PixelFormat::R8Uint,
    wgsl: r#"
@group(0) @binding(0) var u_capture: texture_2d<f32>;

struct Params {
  threshold: f32,
  _pad0: f32,
  _pad1: f32,
  _pad2: f32,
};
@group(0) @binding(1) var<uniform> params: Params;

@fragment
fn fs(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<u32> {
  let c = textureLoad(u_capture, vec2<i32>(floor(pos.xy)), 0);
  let lum = c.r * 0.25 + c.g * 0.40 + c.b * 0.35;
  return vec4<u32>(select(0u, 1u, lum > params.threshold), 0u, 0u, 0u);
}
"#,
};

/// Mask kernel: `1` when the weighted luminance is strictly above `threshold`.
pub(crate) fn texel(px: Rgba8, threshold: f32) -> u8 {
    u8::from(luminance(px) > threshold)
}
