use super::{Fetch, InputDecl, InputKind, ProgramDesc};
use crate::compile::plan::PixelFormat;

pub(crate) const MASK: &str = "u_mask";

pub(crate) static DESC: ProgramDesc = ProgramDesc {
    name: "span",
    inputs: &[InputDecl {
        name: MASK,
        kind: InputKind::Surface(PixelFormat::R8Uint),
    }],
    output: PixelFormat::R16Uint,
    wgsl: r#"
@group(0) @binding(0) var u_mask: texture_2d<u32>;

@fragment
fn fs(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<u32> {
  let p = vec2<i32>(floor(pos.xy));
  let own = textureLoad(u_mask, p, 0).x;
  var count = 0u;
  var prev = 0u;
  for (var y = 0; y <= p.y; y = y + 1) {
    let cur = textureLoad(u_mask, vec2<i32>(p.x, y), 0).x;
    if (cur == 1u && prev == 0u) {
      count = count + 1u;
    }
    prev = cur;
  }
  return vec4<u32>(count * own, 0u, 0u, 0u);
}
"#,
};

/// Span kernel: number of inactive-to-active boundaries from the top of column `x` down to
/// row `y`, multiplied by the texel's own mask value.
///
/// The row above row 0 counts as inactive, so every active texel gets a nonzero run id and
/// inactive texels always read 0. Texels of one run share an id; runs further down a column
/// get strictly larger ids.
pub(crate) fn texel<M: Fetch<u8>>(mask: &M, x: u32, y: u32) -> u16 {
    let own = mask.fetch(x, y);
    if own == 0 {
        return 0;
    }
    let mut count: u16 = 0;
    // Top edge is an inactive boundary: a run starting at row 0 must get a nonzero id.
    let mut prev = 0u8;
    for row in 0..=y {
        let cur = mask.fetch(x, row);
        if cur == 1 && prev == 0 {
            count = count.saturating_add(1);
        }
        prev = cur;
    }
    count * u16::from(own)
}
