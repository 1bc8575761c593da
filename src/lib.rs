//! pixsort is a brightness-keyed pixel sorter built as a chain of full-surface passes.
//!
//! Every frame runs Capture → Mask → Span → Key → a bitonic sorting network → Composite.
//! Each column is split into runs of texels brighter than a threshold, and every run is
//! sorted by quantized luminance on its own while everything else stays in place. The
//! network is a fixed schedule of compare-exchange passes over ping-pong key buffers, so the
//! same plan runs on the CPU backend (rayon) or, with the `gpu` feature, as WGSL on `wgpu`.
//!
//! - Configure [`SortOpts`]
//! - Create a backend with [`create_backend`] and a [`SortSession`]
//! - Call [`SortSession::render_frame`] per frame, or [`sort_image`] once
#![forbid(unsafe_code)]

mod foundation;

pub(crate) mod compile;
pub(crate) mod config;
pub(crate) mod programs;
pub(crate) mod render;
pub(crate) mod session;

pub use crate::compile::plan::{
    Binding, Bindings, FramePlan, FrameSurfaces, PingPong, PixelFormat, PlannedPass,
    SortStepParams, SurfaceDesc, SurfaceId, compile_frame, sort_schedule,
};
pub use crate::config::{SortDirection, SortOpts};
pub use crate::foundation::core::{
    DEFAULT_THRESHOLD, Extent, KEY_SCALE, KeyIndex, LUMA_WEIGHTS, MAX_EXTENT, ResizeEvent,
    Rgba8, luminance, quantize_key,
};
pub use crate::foundation::error::{SortError, SortResult};
pub use crate::programs::{InputDecl, InputKind, Program, ProgramDesc};
pub use crate::programs::network::{partner_row, same_run};
pub use crate::render::backend::{
    BackendKind, FrameRGBA, RenderBackend, RenderSettings, SurfaceReadback, TexelData,
    create_backend,
};
pub use crate::render::cpu::CpuBackend;
#[cfg(feature = "gpu")]
pub use crate::render::gpu::GpuBackend;
pub use crate::render::passes::{
    PassBackend, PlanReport, ProgramHandle, ProgramSet, ResolvedInputs, execute_plan,
    resolve_inputs,
};
pub use crate::render::surface_registry::SurfaceStats;
pub use crate::session::sort_session::{
    FrameOutcome, SessionStats, SortSession, SurfaceRole, sort_image,
};
