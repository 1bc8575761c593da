use crate::{
    compile::plan::{FramePlan, FrameSurfaces, PixelFormat, SurfaceDesc, SurfaceId, compile_frame},
    config::SortOpts,
    foundation::core::{Extent, ResizeEvent},
    foundation::error::{SortError, SortResult},
    programs::Program,
    render::{
        backend::{FrameRGBA, RenderBackend, RenderSettings, SurfaceReadback},
        cpu::CpuBackend,
        passes::{PlanReport, ProgramSet},
        surface_registry::SurfaceStats,
    },
};
use image::RgbaImage;

/// Session surfaces that can be read back for inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceRole {
    /// The resampled source color the frame sorted.
    Capture,
    /// Active/inactive classification.
    Mask,
    /// Per-texel run ids.
    Span,
    /// The `(key, row)` buffer holding the network's final write.
    Keys,
    /// The sorted color output.
    Output,
}

/// Result of one [`SortSession::render_frame`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    /// Every pass was attempted; `output` holds the frame.
    Rendered {
        output: SurfaceId,
        report: PlanReport,
    },
    /// The frame was dropped before touching any pipeline surface.
    Skipped { reason: String },
}

impl FrameOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered { .. })
    }
}

/// Per-session counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_rendered: u64,
    pub frames_skipped: u64,
    /// Compare-exchange sub-passes executed over all frames.
    pub sub_passes_executed: u64,
    /// Times the pipeline surfaces were (re)created.
    pub reallocations: u64,
    /// Pipeline surfaces released, by resize or failure recovery.
    pub surfaces_released: u64,
    /// Passes not run because their program is disabled.
    pub passes_skipped: u64,
    /// Passes the backend refused to run.
    pub passes_failed: u64,
}

#[derive(Clone, Copy, Debug)]
struct SourceSurface {
    id: SurfaceId,
    width: u32,
    height: u32,
}

/// Frame loop owning every pipeline surface of one output extent.
///
/// The session front-loads program compilation, then per frame uploads the source color,
/// compiles the frame plan and runs it on its backend. A resize releases every surface
/// before the next frame recreates them at the new extent.
pub struct SortSession {
    backend: Box<dyn RenderBackend>,
    opts: SortOpts,
    programs: ProgramSet,
    extent: Extent,
    surfaces: Option<FrameSurfaces>,
    source: Option<SourceSurface>,
    sorted: Option<SurfaceId>,
    stats: SessionStats,
}

impl SortSession {
    /// Create a session drawing into `extent` texels.
    ///
    /// Programs that fail to build are disabled and logged; surfaces that cannot be
    /// allocated are retried by the next frame.
    #[tracing::instrument(skip(backend, opts), fields(backend = ?backend.kind()))]
    pub fn new(
        backend: Box<dyn RenderBackend>,
        extent: Extent,
        opts: SortOpts,
    ) -> SortResult<Self> {
        opts.validate()?;
        let extent = Extent::new(extent.width, extent.height)?;
        let mut backend = backend;
        let programs = ProgramSet::compile(backend.as_mut());

        let mut session = Self {
            backend,
            opts,
            programs,
            extent,
            surfaces: None,
            source: None,
            sorted: None,
            stats: SessionStats::default(),
        };
        if let Err(e) = session.ensure_surfaces() {
            if !e.is_frame_fatal() {
                return Err(e);
            }
            tracing::warn!(error = %e, "initial surface allocation failed");
        }
        Ok(session)
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn opts(&self) -> &SortOpts {
        &self.opts
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn surface_stats(&self) -> SurfaceStats {
        self.backend.surface_stats()
    }

    /// Surfaces of the current extent, if allocated.
    pub fn surfaces(&self) -> Option<&FrameSurfaces> {
        self.surfaces.as_ref()
    }

    /// Programs that failed to build and whose passes are skipped.
    pub fn disabled_programs(&self) -> Vec<Program> {
        self.programs.failed().iter().map(|(p, _)| *p).collect()
    }

    /// Sort one frame of `source`.
    ///
    /// A pending `resize` is applied before anything else. Allocation failures skip the frame
    /// and leave no partially created surfaces behind; the next frame retries.
    #[tracing::instrument(
        skip(self, source),
        fields(src_width = source.width(), src_height = source.height())
    )]
    pub fn render_frame(
        &mut self,
        source: &RgbaImage,
        resize: Option<ResizeEvent>,
    ) -> SortResult<FrameOutcome> {
        if let Some(ev) = resize {
            self.resize(ev.extent()?);
        }
        if !self.opts.resample
            && (source.width(), source.height()) != (self.extent.width, self.extent.height)
        {
            return Err(SortError::validation(format!(
                "source {}x{} does not match output {}x{} and resampling is off",
                source.width(),
                source.height(),
                self.extent.width,
                self.extent.height
            )));
        }

        let surfaces = match self.ensure_surfaces() {
            Ok(s) => s,
            Err(e) => return self.skip_or_fail(e),
        };
        let source_id = match self.ensure_source(source.width(), source.height()) {
            Ok(id) => id,
            Err(e) => return self.skip_or_fail(e),
        };
        self.backend.upload_rgba8(source_id, source.as_raw())?;

        let plan = compile_frame(&surfaces, source_id, &self.opts);
        tracing::debug!(
            passes = plan.passes.len(),
            sub_passes = plan.sub_pass_count(),
            "compiled frame plan"
        );
        let report = match self.backend.render_plan(&plan, &self.programs) {
            Ok(r) => r,
            Err(e) if e.is_frame_fatal() => {
                // Surfaces may hold partial results; recreate them next frame.
                self.release_surfaces();
                return self.skip_or_fail(e);
            }
            Err(e) => return Err(e),
        };

        self.sorted = Some(plan.sorted);
        self.record(&plan, &report);
        Ok(FrameOutcome::Rendered {
            output: plan.output,
            report,
        })
    }

    /// Read a session surface back as RGBA8.
    ///
    /// Capture and output are returned as-is; the other roles go through the debug
    /// visualization of [`crate::TexelData::to_debug_rgba8`].
    pub fn readback_rgba8(&mut self, role: SurfaceRole) -> SortResult<FrameRGBA> {
        let rb = self.readback_surface(role)?;
        match role {
            SurfaceRole::Capture | SurfaceRole::Output => rb.into_frame(),
            SurfaceRole::Mask | SurfaceRole::Span | SurfaceRole::Keys => {
                Ok(rb.into_debug_frame())
            }
        }
    }

    /// Raw texels of a session surface.
    pub fn readback_surface(&mut self, role: SurfaceRole) -> SortResult<SurfaceReadback> {
        let surfaces = self
            .surfaces
            .ok_or_else(|| SortError::validation("no surfaces allocated for this extent"))?;
        let id = match role {
            SurfaceRole::Capture => surfaces.capture,
            SurfaceRole::Mask => surfaces.mask,
            SurfaceRole::Span => surfaces.span,
            SurfaceRole::Keys => self.sorted.unwrap_or(surfaces.keys[0]),
            SurfaceRole::Output => surfaces.output,
        };
        self.backend.readback(id)
    }

    fn resize(&mut self, extent: Extent) {
        if extent == self.extent && self.surfaces.is_some() {
            tracing::debug!("resize to current extent ignored");
            return;
        }
        tracing::info!(
            from_width = self.extent.width,
            from_height = self.extent.height,
            to_width = extent.width,
            to_height = extent.height,
            "resizing session"
        );
        self.release_surfaces();
        self.extent = extent;
    }

    fn ensure_surfaces(&mut self) -> SortResult<FrameSurfaces> {
        if let Some(s) = self.surfaces {
            return Ok(s);
        }

        let descs = FrameSurfaces::descs(self.extent);
        let mut ids = Vec::with_capacity(descs.len());
        for desc in &descs {
            match self.backend.allocate_surface(desc) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    for id in ids {
                        if let Err(re) = self.backend.release_surface(id) {
                            tracing::warn!(?id, error = %re, "release after failed allocation");
                        }
                    }
                    return Err(e);
                }
            }
        }
        let [capture, mask, span, key_a, key_b, output]: [SurfaceId; 6] = ids
            .try_into()
            .map_err(|_| SortError::backend("surface set is incomplete"))?;

        let surfaces = FrameSurfaces {
            extent: self.extent,
            capture,
            mask,
            span,
            keys: [key_a, key_b],
            output,
        };
        self.stats.reallocations += 1;
        tracing::info!(
            width = self.extent.width,
            height = self.extent.height,
            "allocated pipeline surfaces"
        );
        self.surfaces = Some(surfaces);
        Ok(surfaces)
    }

    fn ensure_source(&mut self, width: u32, height: u32) -> SortResult<SurfaceId> {
        if let Some(s) = self.source {
            if s.width == width && s.height == height {
                return Ok(s.id);
            }
            self.backend.release_surface(s.id)?;
            self.source = None;
        }
        let desc = SurfaceDesc {
            width,
            height,
            format: PixelFormat::Rgba8Unorm,
        };
        let id = self.backend.allocate_surface(&desc)?;
        self.source = Some(SourceSurface { id, width, height });
        Ok(id)
    }

    fn release_surfaces(&mut self) {
        let Some(surfaces) = self.surfaces.take() else {
            return;
        };
        self.sorted = None;
        for id in surfaces.ids() {
            match self.backend.release_surface(id) {
                Ok(()) => self.stats.surfaces_released += 1,
                Err(e) => tracing::warn!(?id, error = %e, "surface release failed"),
            }
        }
    }

    fn skip_or_fail(&mut self, e: SortError) -> SortResult<FrameOutcome> {
        if !e.is_frame_fatal() {
            return Err(e);
        }
        tracing::warn!(error = %e, "frame skipped");
        self.stats.frames_skipped += 1;
        Ok(FrameOutcome::Skipped {
            reason: e.to_string(),
        })
    }

    fn record(&mut self, plan: &FramePlan, report: &PlanReport) {
        self.stats.frames_rendered += 1;
        self.stats.sub_passes_executed += report.sub_passes_executed;
        self.stats.passes_skipped += report.passes_skipped;
        self.stats.passes_failed += report.passes_failed;
        tracing::debug!(
            executed = report.passes_executed,
            skipped = report.passes_skipped,
            failed = report.passes_failed,
            planned = plan.passes.len(),
            "frame rendered"
        );
    }
}

impl Drop for SortSession {
    fn drop(&mut self) {
        self.release_surfaces();
        if let Some(s) = self.source.take() {
            let _ = self.backend.release_surface(s.id);
        }
    }
}

/// Sort a single image on the CPU backend with the image's own dimensions.
pub fn sort_image(image: &RgbaImage, opts: &SortOpts) -> SortResult<RgbaImage> {
    let extent = Extent::new(image.width(), image.height())?;
    let backend = Box::new(CpuBackend::new(RenderSettings::default())?);
    let mut session = SortSession::new(backend, extent, opts.clone())?;
    match session.render_frame(image, None)? {
        FrameOutcome::Rendered { .. } => {}
        FrameOutcome::Skipped { reason } => return Err(SortError::allocation(reason)),
    }
    let frame = session.readback_rgba8(SurfaceRole::Output)?;
    RgbaImage::from_raw(frame.width, frame.height, frame.data)
        .ok_or_else(|| SortError::backend("output frame size mismatch"))
}

#[cfg(test)]
#[path = "../../tests/unit/session/sort_session.rs"]
mod tests;
