//! Per-pixel programs executed by full-surface passes.
//!
//! Each program is declared once as a [`ProgramDesc`]: its named inputs, its output texel
//! format and its WGSL fragment source. The CPU backend evaluates the matching Rust kernel for
//! every output texel; the GPU backend compiles the WGSL. Both read inputs through absolute
//! texel coordinates only.

pub(crate) mod capture;
pub(crate) mod composite;
pub(crate) mod key;
pub(crate) mod mask;
pub(crate) mod network;
pub(crate) mod span;

use crate::compile::plan::PixelFormat;
use crate::foundation::core::Extent;

/// The programs a frame is built from, in pipeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Program {
    /// Resample the external source into the display-sized capture surface.
    Capture,
    /// Classify texels as active/inactive.
    Mask,
    /// Per-texel run id from a vertical prefix scan of the mask.
    Span,
    /// Derive `(key, row)` pairs from the capture.
    Key,
    /// One compare-exchange sub-pass of the bitonic network.
    SortStep,
    /// Gather captured colors through the sorted row indices.
    Composite,
}

impl Program {
    /// Every program, in pipeline order.
    pub const ALL: [Program; 6] = [
        Program::Capture,
        Program::Mask,
        Program::Span,
        Program::Key,
        Program::SortStep,
        Program::Composite,
    ];

    /// Declarative description used to compile and bind this program.
    pub fn desc(self) -> &'static ProgramDesc {
        match self {
            Program::Capture => &capture::DESC,
            Program::Mask => &mask::DESC,
            Program::Span => &span::DESC,
            Program::Key => &key::DESC,
            Program::SortStep => &network::DESC,
            Program::Composite => &composite::DESC,
        }
    }
}

/// Kind of a named program input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    /// A surface of the given texel format, read with absolute texel fetches.
    Surface(PixelFormat),
    /// A signed integer scalar.
    Int,
    /// A float scalar.
    Float,
}

/// One declared input of a program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputDecl {
    /// Name used when binding the input.
    pub name: &'static str,
    /// Expected kind.
    pub kind: InputKind,
}

/// Declarative description of a per-pixel program.
///
/// Surface inputs bind to consecutive slots in declaration order; scalar inputs are packed, in
/// declaration order, into one 16-byte parameter block placed after the last surface.
#[derive(Debug)]
pub struct ProgramDesc {
    /// Stable program name, used in logs and labels.
    pub name: &'static str,
    /// Declared inputs.
    pub inputs: &'static [InputDecl],
    /// Format of the single output surface.
    pub output: PixelFormat,
    /// WGSL fragment source (entry point `fs`), appended to the full-screen vertex stage.
    pub wgsl: &'static str,
}

impl ProgramDesc {
    /// Look up a declared input by name.
    pub fn input(&self, name: &str) -> Option<&InputDecl> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Declared surface inputs, in binding-slot order.
    pub fn surface_inputs(&self) -> impl Iterator<Item = &InputDecl> {
        self.inputs
            .iter()
            .filter(|i| matches!(i.kind, InputKind::Surface(_)))
    }

    /// Declared scalar inputs, in parameter-block order.
    pub fn scalar_inputs(&self) -> impl Iterator<Item = &InputDecl> {
        self.inputs
            .iter()
            .filter(|i| !matches!(i.kind, InputKind::Surface(_)))
    }
}

/// Shared vertex stage: one triangle covering the whole target.
#[cfg(feature = "gpu")]
pub(crate) const FULLSCREEN_VS: &str = r#"
@vertex
fn vs(@builtin(vertex_index) vi: u32) -> @builtin(position) vec4<f32> {
  var p = array<vec2<f32>, 3>(
    vec2<f32>(-1.0, -1.0),
    vec2<f32>( 3.0, -1.0),
    vec2<f32>(-1.0,  3.0),
  );
  return vec4<f32>(p[vi], 0.0, 1.0);
}
"#;

/// Read-only texel access by absolute coordinate.
///
/// Out-of-range fetches and unbound inputs read as the default texel, so a kernel never
/// panics on a missing binding.
pub trait Fetch<T> {
    /// Dimensions of the underlying surface.
    fn extent(&self) -> Extent;
    /// Texel at `(x, y)`.
    fn fetch(&self, x: u32, y: u32) -> T;
}

/// Row-major borrowed view over a surface's texels.
#[derive(Clone, Copy, Debug)]
pub struct TexelView<'a, T> {
    texels: &'a [T],
    extent: Extent,
}

impl<'a, T> TexelView<'a, T> {
    /// Wrap a row-major slice. The slice must hold `extent.texel_count()` texels.
    pub fn new(texels: &'a [T], extent: Extent) -> Self {
        debug_assert_eq!(texels.len(), extent.texel_count());
        Self { texels, extent }
    }

    /// View standing in for an input that could not be resolved.
    pub fn unbound() -> Self {
        Self {
            texels: &[],
            extent: Extent {
                width: 0,
                height: 0,
            },
        }
    }
}

impl<T: Copy + Default> Fetch<T> for TexelView<'_, T> {
    fn extent(&self) -> Extent {
        self.extent
    }

    fn fetch(&self, x: u32, y: u32) -> T {
        if x >= self.extent.width || y >= self.extent.height {
            return T::default();
        }
        let idx = (y as usize) * (self.extent.width as usize) + (x as usize);
        self.texels.get(idx).copied().unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/programs/mod.rs"]
mod tests;
