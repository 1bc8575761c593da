use super::{Fetch, InputDecl, InputKind, ProgramDesc};
use crate::compile::plan::PixelFormat;
use crate::foundation::core::{KeyIndex, Rgba8};

pub(crate) const CAPTURE: &str = "u_capture";
pub(crate) const KEYS: &str = "u_keys";

pub(crate) static DESC: ProgramDesc = ProgramDesc {
    name: "composite",
    inputs: &[
        InputDecl {
            name: CAPTURE,
            kind: InputKind::Surface(PixelFormat::Rgba8Unorm),
        },
        InputDecl {
            name: KEYS,
            kind: InputKind::Surface(PixelFormat::Rg16Uint),
        },
    ],
    output: PixelFormat::Rgba8Unorm,
    wgsl: r#"
@group(0) @binding(0) var u_capture: texture_2d<f32>;
@group(0) @binding(1) var u_keys: texture_2d<u32>;

@fragment
fn fs(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
  let p = vec2<i32>(floor(pos.xy));
  let row = i32(textureLoad(u_keys, p, 0).y);
  return textureLoad(u_capture, vec2<i32>(p.x, row), 0);
}
"#,
};

/// Composite kernel: the captured color of the row the network moved to `(x, y)`.
pub(crate) fn texel<C, K>(capture: &C, keys: &K, x: u32, y: u32) -> Rgba8
where
    C: Fetch<Rgba8>,
    K: Fetch<KeyIndex>,
{
    let sorted = keys.fetch(x, y);
    capture.fetch(x, u32::from(sorted.row))
}
