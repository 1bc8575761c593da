use super::{InputDecl, InputKind, ProgramDesc};
use crate::compile::plan::PixelFormat;
use crate::foundation::core::{KeyIndex, Rgba8, luminance, quantize_key};

pub(crate) const CAPTURE: &str = "u_capture";

pub(crate) static DESC: ProgramDesc = ProgramDesc {
    name: "key",
    inputs: &[InputDecl {
        name: CAPTURE,
        kind: InputKind::Surface(PixelFormat::Rgba8Unorm),
    }],
    output: PixelFormat::Rg16Uint,
    wgsl: r#"
@group(0) @binding(0) var u_capture: texture_2d<f32>;

@fragment
fn fs(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<u32> {
  let p = vec2<i32>(floor(pos.xy));
  let c = textureLoad(u_capture, p, 0);
  let lum = clamp(c.r * 0.25 + c.g * 0.40 + c.b * 0.35, 0.0, 1.0);
  let key = u32(floor(lum * 8192.0 + 0.5));
  return vec4<u32>(key, u32(p.y), 0u, 0u);
}
"#,
};

/// Key kernel: quantized brightness paired with the texel's own row.
pub(crate) fn texel(px: Rgba8, y: u32) -> KeyIndex {
    KeyIndex {
        key: quantize_key(luminance(px)),
        row: y as u16,
    }
}
