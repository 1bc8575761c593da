use crate::{
    compile::plan::{FramePlan, PixelFormat, SurfaceDesc, SurfaceId},
    foundation::core::{KEY_SCALE, KeyIndex, Rgba8},
    foundation::error::{SortError, SortResult},
    render::passes::{PassBackend, PlanReport, ProgramSet, execute_plan},
};

/// A frame as straight-alpha RGBA8 pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
}

/// Texel storage of one surface, row-major, typed by its [`PixelFormat`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TexelData {
    Rgba8(Vec<Rgba8>),
    R8(Vec<u8>),
    R16(Vec<u16>),
    Rg16(Vec<KeyIndex>),
}

impl TexelData {
    /// Zero-filled storage for `desc`.
    pub fn zeroed(desc: &SurfaceDesc) -> Self {
        let n = desc.extent().texel_count();
        match desc.format {
            PixelFormat::Rgba8Unorm => Self::Rgba8(vec![[0; 4]; n]),
            PixelFormat::R8Uint => Self::R8(vec![0; n]),
            PixelFormat::R16Uint => Self::R16(vec![0; n]),
            PixelFormat::Rg16Uint => Self::Rg16(vec![KeyIndex::default(); n]),
        }
    }

    pub fn format(&self) -> PixelFormat {
        match self {
            Self::Rgba8(_) => PixelFormat::Rgba8Unorm,
            Self::R8(_) => PixelFormat::R8Uint,
            Self::R16(_) => PixelFormat::R16Uint,
            Self::Rg16(_) => PixelFormat::Rg16Uint,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Rgba8(v) => v.len(),
            Self::R8(v) => v.len(),
            Self::R16(v) => v.len(),
            Self::Rg16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the texels as RGBA8 for inspection.
    ///
    /// Color passes through; mask is white/black; run ids become a grey ramp; key pairs put
    /// the key in red/blue and the low byte of the row index in green.
    pub fn to_debug_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * 4);
        match self {
            Self::Rgba8(v) => v.iter().for_each(|px| out.extend_from_slice(px)),
            Self::R8(v) => v.iter().for_each(|&m| {
                let g = if m != 0 { 255 } else { 0 };
                out.extend_from_slice(&[g, g, g, 255]);
            }),
            Self::R16(v) => v.iter().for_each(|&id| {
                let g = (u32::from(id) * 40).min(255) as u8;
                out.extend_from_slice(&[g, g, g, 255]);
            }),
            Self::Rg16(v) => v.iter().for_each(|k| {
                let g = (f32::from(k.key) / KEY_SCALE * 255.0).round().min(255.0) as u8;
                out.extend_from_slice(&[g, (k.row & 0xff) as u8, g, 255]);
            }),
        }
        out
    }
}

/// Contents of a surface copied back from a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceReadback {
    pub desc: SurfaceDesc,
    pub texels: TexelData,
}

impl SurfaceReadback {
    /// Readback of an RGBA8 surface as a frame. Other formats are rejected.
    pub fn into_frame(self) -> SortResult<FrameRGBA> {
        match self.texels {
            TexelData::Rgba8(px) => Ok(FrameRGBA {
                width: self.desc.width,
                height: self.desc.height,
                data: px.into_iter().flatten().collect(),
            }),
            other => Err(SortError::validation(format!(
                "surface holds {:?} texels, not rgba8",
                other.format()
            ))),
        }
    }

    /// Readback of any surface as a frame, through [`TexelData::to_debug_rgba8`].
    pub fn into_debug_frame(self) -> FrameRGBA {
        FrameRGBA {
            width: self.desc.width,
            height: self.desc.height,
            data: self.texels.to_debug_rgba8(),
        }
    }
}

/// A backend that can run a compiled [`FramePlan`].
pub trait RenderBackend: PassBackend {
    /// Which implementation this is.
    fn kind(&self) -> BackendKind;

    /// Execute every pass of `plan` with the compiled `programs`.
    fn render_plan(&mut self, plan: &FramePlan, programs: &ProgramSet) -> SortResult<PlanReport> {
        execute_plan(self, plan, programs)
    }

    /// Read an RGBA8 surface back as a frame.
    fn readback_rgba8(&mut self, id: SurfaceId) -> SortResult<FrameRGBA> {
        self.readback(id)?.into_frame()
    }
}

/// Available backend kinds.
///
/// - `Cpu` is always available.
/// - `Gpu` requires the `gpu` cargo feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Per-texel kernels on the CPU, rows in parallel with rayon.
    Cpu,
    /// WGSL programs on a `wgpu` device.
    #[cfg(feature = "gpu")]
    Gpu,
}

/// Backend-agnostic settings.
#[derive(Clone, Debug)]
pub struct RenderSettings {
    /// Maximum bytes of live surfaces. Exceeding it is an allocation failure.
    pub max_surface_bytes: usize,
    /// Override the number of rayon worker threads of the CPU backend. `None` uses the
    /// global rayon pool.
    pub threads: Option<usize>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_surface_bytes: 1 << 30,
            threads: None,
        }
    }
}

/// Create a backend implementation.
///
/// - `BackendKind::Cpu` is always available.
/// - `BackendKind::Gpu` requires the `gpu` cargo feature and an adapter.
pub fn create_backend(
    kind: BackendKind,
    settings: &RenderSettings,
) -> SortResult<Box<dyn RenderBackend>> {
    match kind {
        BackendKind::Cpu => Ok(Box::new(crate::render::cpu::CpuBackend::new(
            settings.clone(),
        )?)),
        #[cfg(feature = "gpu")]
        BackendKind::Gpu => Ok(Box::new(crate::render::gpu::GpuBackend::new(
            settings.clone(),
        )?)),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/backend.rs"]
mod tests;
