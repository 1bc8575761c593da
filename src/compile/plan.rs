use crate::{
    config::{SortDirection, SortOpts},
    foundation::core::Extent,
    programs::{Program, capture, composite, key, mask, network, span},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
/// Identifier of a surface handed out by a backend. Ids are never reused after release.
pub struct SurfaceId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
/// Per-texel storage formats.
pub enum PixelFormat {
    /// Straight-alpha RGBA color, 8 bits per channel.
    Rgba8Unorm,
    /// Single unsigned byte (mask).
    R8Uint,
    /// Single unsigned 16-bit value (run id).
    R16Uint,
    /// Two unsigned 16-bit values (key, row).
    Rg16Uint,
}

impl PixelFormat {
    /// Bytes per texel.
    pub fn texel_bytes(self) -> usize {
        match self {
            PixelFormat::Rgba8Unorm | PixelFormat::Rg16Uint => 4,
            PixelFormat::R8Uint => 1,
            PixelFormat::R16Uint => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
/// Surface declaration: dimensions + pixel format.
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl SurfaceDesc {
    pub fn new(extent: Extent, format: PixelFormat) -> Self {
        Self {
            width: extent.width,
            height: extent.height,
            format,
        }
    }

    pub fn extent(&self) -> Extent {
        Extent {
            width: self.width,
            height: self.height,
        }
    }

    /// Storage size in bytes, saturating.
    pub fn byte_len(&self) -> usize {
        self.extent()
            .texel_count()
            .saturating_mul(self.format.texel_bytes())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
/// Value bound to a named program input.
pub enum Binding {
    Surface(SurfaceId),
    Int(i32),
    Float(f32),
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
/// Ordered named inputs for one pass.
pub struct Bindings {
    entries: Vec<(&'static str, Binding)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn surface(mut self, name: &'static str, id: SurfaceId) -> Self {
        self.entries.push((name, Binding::Surface(id)));
        self
    }

    pub fn int(mut self, name: &'static str, value: i32) -> Self {
        self.entries.push((name, Binding::Int(value)));
        self
    }

    pub fn float(mut self, name: &'static str, value: f32) -> Self {
        self.entries.push((name, Binding::Float(value)));
        self
    }

    /// Last value bound under `name`.
    pub fn get(&self, name: &str) -> Option<Binding> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, b)| *b)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Binding)> + '_ {
        self.entries.iter().copied()
    }

    /// Surfaces read by the pass.
    pub fn surfaces(&self) -> impl Iterator<Item = SurfaceId> + '_ {
        self.entries.iter().filter_map(|(_, b)| match b {
            Binding::Surface(id) => Some(*id),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
/// One full-surface invocation: a program, its inputs and its single output.
pub struct PlannedPass {
    pub program: Program,
    pub bindings: Bindings,
    pub output: SurfaceId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// Parameters of one compare-exchange sub-pass.
pub struct SortStepParams {
    /// Merge pass index, `0..N`.
    pub pass: u32,
    /// Bit position, `pass, pass-1, .., 0`.
    pub step: u32,
    /// Signed uniform value carrying step and direction.
    pub encoded_step: i32,
}

/// The sub-pass schedule of the bitonic network for `extent.height` rows.
pub fn sort_schedule(extent: Extent, direction: SortDirection) -> Vec<SortStepParams> {
    let passes = extent.sort_pass_count();
    let mut out = Vec::with_capacity(extent.sort_sub_pass_count() as usize);
    for pass in 0..passes {
        for step in (0..=pass).rev() {
            out.push(SortStepParams {
                pass,
                step,
                encoded_step: direction.encode_step(step),
            });
        }
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// The two key/index buffers with named roles. Each sub-pass reads `source` and writes
/// `destination`; [`PingPong::swap`] exchanges the roles afterwards.
pub struct PingPong {
    source: SurfaceId,
    destination: SurfaceId,
}

impl PingPong {
    pub fn new(source: SurfaceId, destination: SurfaceId) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn source(&self) -> SurfaceId {
        self.source
    }

    pub fn destination(&self) -> SurfaceId {
        self.destination
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.source, &mut self.destination);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Surfaces owned by a session for one extent.
pub struct FrameSurfaces {
    pub extent: Extent,
    pub capture: SurfaceId,
    pub mask: SurfaceId,
    pub span: SurfaceId,
    pub keys: [SurfaceId; 2],
    pub output: SurfaceId,
}

impl FrameSurfaces {
    /// Declarations in allocation order: capture, mask, span, keys ×2, output.
    pub fn descs(extent: Extent) -> [SurfaceDesc; 6] {
        [
            SurfaceDesc::new(extent, PixelFormat::Rgba8Unorm),
            SurfaceDesc::new(extent, PixelFormat::R8Uint),
            SurfaceDesc::new(extent, PixelFormat::R16Uint),
            SurfaceDesc::new(extent, PixelFormat::Rg16Uint),
            SurfaceDesc::new(extent, PixelFormat::Rg16Uint),
            SurfaceDesc::new(extent, PixelFormat::Rgba8Unorm),
        ]
    }

    pub fn ids(&self) -> [SurfaceId; 6] {
        [
            self.capture,
            self.mask,
            self.span,
            self.keys[0],
            self.keys[1],
            self.output,
        ]
    }
}

#[derive(Clone, Debug, serde::Serialize)]
/// Ordered passes for one frame.
///
/// `sorted` names the key/index buffer holding the last network write (the one Composite
/// reads); it is taken from the ping-pong state, not from iteration parity.
pub struct FramePlan {
    pub extent: Extent,
    pub passes: Vec<PlannedPass>,
    pub sorted: SurfaceId,
    pub output: SurfaceId,
}

impl FramePlan {
    pub fn sub_pass_count(&self) -> usize {
        self.passes
            .iter()
            .filter(|p| p.program == Program::SortStep)
            .count()
    }
}

/// Build the pass sequence Capture → Mask → Span → Key → network → Composite.
pub fn compile_frame(surfaces: &FrameSurfaces, source: SurfaceId, opts: &SortOpts) -> FramePlan {
    let extent = surfaces.extent;
    let schedule = sort_schedule(extent, opts.direction);
    let mut passes = Vec::with_capacity(5 + schedule.len());

    passes.push(PlannedPass {
        program: Program::Capture,
        bindings: Bindings::new()
            .surface(capture::SOURCE, source)
            .int(capture::OUT_WIDTH, extent.width as i32)
            .int(capture::OUT_HEIGHT, extent.height as i32),
        output: surfaces.capture,
    });
    passes.push(PlannedPass {
        program: Program::Mask,
        bindings: Bindings::new()
            .surface(mask::CAPTURE, surfaces.capture)
            .float(mask::THRESHOLD, opts.threshold),
        output: surfaces.mask,
    });
    passes.push(PlannedPass {
        program: Program::Span,
        bindings: Bindings::new().surface(span::MASK, surfaces.mask),
        output: surfaces.span,
    });

    let mut keys = PingPong::new(surfaces.keys[0], surfaces.keys[1]);
    passes.push(PlannedPass {
        program: Program::Key,
        bindings: Bindings::new().surface(key::CAPTURE, surfaces.capture),
        output: keys.source(),
    });

    for sub in &schedule {
        passes.push(PlannedPass {
            program: Program::SortStep,
            bindings: Bindings::new()
                .surface(network::KEYS, keys.source())
                .surface(network::SPAN, surfaces.span)
                .int(network::STEP, sub.encoded_step)
                .int(network::PASS, sub.pass as i32),
            output: keys.destination(),
        });
        keys.swap();
    }

    passes.push(PlannedPass {
        program: Program::Composite,
        bindings: Bindings::new()
            .surface(composite::CAPTURE, surfaces.capture)
            .surface(composite::KEYS, keys.source()),
        output: surfaces.output,
    });

    FramePlan {
        extent,
        passes,
        sorted: keys.source(),
        output: surfaces.output,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compile/plan.rs"]
mod tests;
