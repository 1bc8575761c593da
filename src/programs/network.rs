//! Compare-exchange sub-pass of the bitonic sorting network.
//!
//! The network over a column of `H` rows has `N = ceil(log2 H)` merge passes; pass `p` runs the
//! sub-passes `step = p, p-1, .., 0`. Every comparator places the smaller key (ascending) at
//! the lower row, which is what lets run containment be a per-comparison predicate: a run
//! embedded in a column behaves as if everything above it were `-inf` and everything below
//! `+inf`, so comparators that cross its edge are no-ops and the run sorts on its own.

use super::{Fetch, InputDecl, InputKind, ProgramDesc};
use crate::compile::plan::PixelFormat;
use crate::config::SortDirection;
use crate::foundation::core::KeyIndex;

pub(crate) const KEYS: &str = "u_keys";
pub(crate) const SPAN: &str = "u_span";
pub(crate) const STEP: &str = "u_step";
pub(crate) const PASS: &str = "u_pass";

pub(crate) static DESC: ProgramDesc = ProgramDesc {
    name: "sort_step",
    inputs: &[
        InputDecl {
            name: KEYS,
            kind: InputKind::Surface(PixelFormat::Rg16Uint),
        },
        InputDecl {
            name: SPAN,
            kind: InputKind::Surface(PixelFormat::R16Uint),
        },
        InputDecl {
            name: STEP,
            kind: InputKind::Int,
        },
        InputDecl {
            name: PASS,
            kind: InputKind::Int,
        },
    ],
    output: PixelFormat::Rg16Uint,
    wgsl: r#"
@group(0) @binding(0) var u_keys: texture_2d<u32>;
@group(0) @binding(1) var u_span: texture_2d<u32>;

struct Params {
  step: i32,
  pass_index: i32,
  _pad0: i32,
  _pad1: i32,
};
@group(0) @binding(2) var<uniform> params: Params;

@fragment
fn fs(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<u32> {
  let p = vec2<i32>(floor(pos.xy));
  let own = textureLoad(u_keys, p, 0);
  if (params.step == 0) {
    return own;
  }
  let height = i32(textureDimensions(u_keys).y);
  let descending = params.step < 0;
  let step = abs(params.step) - 1;
  let d = 1 << u32(step);
  let lower = (p.y & d) == 0;

  var partner: i32;
  if (step == params.pass_index) {
    partner = p.y ^ ((d << 1u) - 1);
  } else if (lower) {
    partner = p.y + d;
  } else {
    partner = p.y - d;
  }
  if (partner < 0 || partner >= height) {
    return own;
  }

  let q = vec2<i32>(p.x, partner);
  let own_span = textureLoad(u_span, p, 0).x;
  if (own_span == 0u || own_span != textureLoad(u_span, q, 0).x) {
    return own;
  }

  let other = textureLoad(u_keys, q, 0);
  var take_other: bool;
  if (lower != descending) {
    take_other = own.x > other.x;
  } else {
    take_other = other.x > own.x;
  }
  return select(own, other, take_other);
}
"#,
};

/// Row compared against `y` in the sub-pass `(pass, step)`, and whether `y` is the lower
/// (smaller row) side of that comparator.
///
/// The first sub-pass of a pass mirrors rows inside blocks of `2^(step+1)`; later sub-passes
/// compare rows `2^step` apart. The partner may lie past the last real row; such comparators
/// belong to the virtual padding and are skipped by the caller.
pub fn partner_row(y: u32, pass: u32, step: u32) -> (u32, bool) {
    let d = 1u32 << step;
    let lower = y & d == 0;
    let partner = if step == pass {
        y ^ ((d << 1) - 1)
    } else if lower {
        y + d
    } else {
        y - d
    };
    (partner, lower)
}

/// Run-equality predicate: both texels belong to the same run and that run is live.
pub fn same_run(own_span: u16, other_span: u16) -> bool {
    own_span != 0 && own_span == other_span
}

/// Sort-step kernel for texel `(x, y)`.
///
/// `encoded_step` carries the bit position and the direction (see
/// [`SortDirection::encode_step`]). The texel keeps its own pair unless its partner is in range
/// and in the same run, and the pair order is strictly wrong; equal keys never swap.
pub(crate) fn texel<K, S>(
    keys: &K,
    spans: &S,
    encoded_step: i32,
    pass: i32,
    x: u32,
    y: u32,
) -> KeyIndex
where
    K: Fetch<KeyIndex>,
    S: Fetch<u16>,
{
    let own = keys.fetch(x, y);
    let Some((step, direction)) = SortDirection::decode_step(encoded_step) else {
        return own;
    };
    if step >= u32::BITS - 1 || pass < 0 {
        return own;
    }

    let (partner, lower) = partner_row(y, pass as u32, step);
    if partner >= keys.extent().height {
        return own;
    }
    if !same_run(spans.fetch(x, y), spans.fetch(x, partner)) {
        return own;
    }

    let other = keys.fetch(x, partner);
    let descending = direction == SortDirection::Descending;
    let take_other = if lower != descending {
        own.key > other.key
    } else {
        other.key > own.key
    };
    if take_other { other } else { own }
}

#[cfg(test)]
#[path = "../../tests/unit/programs/network.rs"]
mod tests;
