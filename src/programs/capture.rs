use super::{Fetch, InputDecl, InputKind, ProgramDesc};
use crate::compile::plan::PixelFormat;
use crate::foundation::core::{Extent, Rgba8};

pub(crate) const SOURCE: &str = "u_source";
pub(crate) const OUT_WIDTH: &str = "u_out_width";
pub(crate) const OUT_HEIGHT: &str = "u_out_height";

pub(crate) static DESC: ProgramDesc = ProgramDesc {
    name: "capture",
    inputs: &[
        InputDecl {
            name: SOURCE,
            kind: InputKind::Surface(PixelFormat::Rgba8Unorm),
        },
        InputDecl {
            name: OUT_WIDTH,
            kind: InputKind::Int,
        },
        InputDecl {
            name: OUT_HEIGHT,
            kind: InputKind::Int,
        },
    ],
    output: PixelFormat::Rgba8Unorm,
    wgsl: r#"
@group(0) @binding(0) var u_source: texture_2d<f32>;

struct Params {
  out_width: i32,
  out_height: i32,
  _pad0: i32,
  _pad1: i32,
};
@group(0) @binding(1) var<uniform> params: Params;

@fragment
fn fs(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
  let dims = vec2<i32>(textureDimensions(u_source));
  if (dims.x == 0 || dims.y == 0 || params.out_width <= 0 || params.out_height <= 0) {
    return vec4<f32>(0.0);
  }
  let p = floor(pos.xy);
  let sx = i32(floor((p.x + 0.5) * f32(dims.x) / f32(params.out_width)));
  let sy = i32(floor((p.y + 0.5) * f32(dims.y) / f32(params.out_height)));
  return textureLoad(u_source, vec2<i32>(min(sx, dims.x - 1), min(sy, dims.y - 1)), 0);
}
"#,
};

/// Nearest-neighbour source coordinate for output coordinate `o` along one axis:
/// `floor((o + 0.5) * src / dst)`.
pub(crate) fn nearest(o: u32, src: u32, dst: u32) -> u32 {
    if dst == 0 || src == 0 {
        return 0;
    }
    let s = (2 * u64::from(o) + 1) * u64::from(src) / (2 * u64::from(dst));
    (s as u32).min(src - 1)
}

/// Capture kernel: sample the source at the texel mapped from `(x, y)` of an `out` surface.
pub(crate) fn texel<S: Fetch<Rgba8>>(source: &S, out: Extent, x: u32, y: u32) -> Rgba8 {
    let src = source.extent();
    if src.is_empty() {
        return [0; 4];
    }
    source.fetch(
        nearest(x, src.width, out.width),
        nearest(y, src.height, out.height),
    )
}
