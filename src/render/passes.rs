use crate::{
    compile::plan::{Binding, Bindings, FramePlan, SurfaceDesc, SurfaceId},
    foundation::error::{SortError, SortResult},
    programs::{InputKind, Program, ProgramDesc},
    render::{backend::SurfaceReadback, surface_registry::SurfaceStats},
};
use std::collections::HashMap;

/// Handle of a program compiled by a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Collaborator operations the pipeline needs from a device.
pub trait PassBackend {
    fn allocate_surface(&mut self, desc: &SurfaceDesc) -> SortResult<SurfaceId>;

    fn release_surface(&mut self, id: SurfaceId) -> SortResult<()>;

    /// Replace the texels of an RGBA8 surface with tightly packed straight-alpha bytes.
    fn upload_rgba8(&mut self, id: SurfaceId, rgba: &[u8]) -> SortResult<()>;

    fn compile_program(&mut self, program: Program) -> SortResult<ProgramHandle>;

    /// Run `program` once over every texel of `output`.
    ///
    /// Inputs that cannot be resolved are reported and left unbound; an error return means
    /// the pass did not run at all.
    fn invoke(
        &mut self,
        program: ProgramHandle,
        bindings: &Bindings,
        output: SurfaceId,
    ) -> SortResult<()>;

    fn readback(&mut self, id: SurfaceId) -> SortResult<SurfaceReadback>;

    fn surface_stats(&self) -> SurfaceStats;
}

/// Programs compiled for one backend. Programs that failed to build are absent and their
/// passes are skipped.
#[derive(Debug, Default)]
pub struct ProgramSet {
    handles: HashMap<Program, ProgramHandle>,
    failed: Vec<(Program, String)>,
}

impl ProgramSet {
    /// Compile every program. A build failure disables that program only.
    pub fn compile<B: PassBackend + ?Sized>(backend: &mut B) -> Self {
        let mut set = Self::default();
        for program in Program::ALL {
            match backend.compile_program(program) {
                Ok(handle) => {
                    set.handles.insert(program, handle);
                }
                Err(e) => {
                    tracing::error!(program = program.desc().name, error = %e, "program disabled");
                    set.failed.push((program, e.to_string()));
                }
            }
        }
        set
    }

    pub fn handle(&self, program: Program) -> Option<ProgramHandle> {
        self.handles.get(&program).copied()
    }

    /// Programs that failed to build, with the build error.
    pub fn failed(&self) -> &[(Program, String)] {
        &self.failed
    }
}

/// Outcome of running one [`FramePlan`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlanReport {
    pub passes_executed: u64,
    pub sub_passes_executed: u64,
    /// Passes whose program is disabled.
    pub passes_skipped: u64,
    /// Passes the backend refused to run.
    pub passes_failed: u64,
}

/// Run `plan` in order.
///
/// Each pass is recovered at its own boundary: a disabled program or a failed invocation
/// leaves that pass's output as it was and the remaining passes still run. Only a
/// frame-fatal error (device allocation) stops the plan.
pub fn execute_plan<B: PassBackend + ?Sized>(
    backend: &mut B,
    plan: &FramePlan,
    programs: &ProgramSet,
) -> SortResult<PlanReport> {
    let mut report = PlanReport::default();
    tracing::debug!(
        width = plan.extent.width,
        height = plan.extent.height,
        passes = plan.passes.len(),
        "executing frame plan"
    );

    for pass in &plan.passes {
        let name = pass.program.desc().name;
        let Some(handle) = programs.handle(pass.program) else {
            tracing::debug!(program = name, "skipping pass of disabled program");
            report.passes_skipped += 1;
            continue;
        };
        match backend.invoke(handle, &pass.bindings, pass.output) {
            Ok(()) => {
                report.passes_executed += 1;
                if pass.program == Program::SortStep {
                    report.sub_passes_executed += 1;
                }
            }
            Err(e) if e.is_frame_fatal() => return Err(e),
            Err(e) => {
                tracing::error!(program = name, error = %e, "pass failed");
                report.passes_failed += 1;
            }
        }
    }

    Ok(report)
}

/// A program's declared inputs resolved against a pass's bindings.
///
/// Every declared input is present: resolution failures are recorded in
/// [`ResolvedInputs::issues`] and the input reads as unbound (no surface, scalar zero).
#[derive(Debug, Default)]
pub struct ResolvedInputs {
    surfaces: Vec<(&'static str, Option<(SurfaceId, SurfaceDesc)>)>,
    scalars: Vec<(&'static str, Binding)>,
    issues: Vec<SortError>,
}

impl ResolvedInputs {
    pub fn surface(&self, name: &str) -> Option<(SurfaceId, SurfaceDesc)> {
        self.surfaces
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, s)| *s)
    }

    /// Surface inputs in binding-slot order.
    pub fn surfaces(&self) -> impl Iterator<Item = Option<(SurfaceId, SurfaceDesc)>> + '_ {
        self.surfaces.iter().map(|(_, s)| *s)
    }

    pub fn int(&self, name: &str) -> i32 {
        match self.scalar(name) {
            Some(Binding::Int(v)) => v,
            _ => 0,
        }
    }

    pub fn float(&self, name: &str) -> f32 {
        match self.scalar(name) {
            Some(Binding::Float(v)) => v,
            _ => 0.0,
        }
    }

    fn scalar(&self, name: &str) -> Option<Binding> {
        self.scalars
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, b)| *b)
    }

    /// Scalars packed in declaration order into the 16-byte parameter block.
    pub fn param_block(&self) -> [u8; 16] {
        let mut block = [0u8; 16];
        for (slot, (_, b)) in block.chunks_exact_mut(4).zip(&self.scalars) {
            let bytes = match *b {
                Binding::Int(v) => v.to_le_bytes(),
                Binding::Float(v) => v.to_le_bytes(),
                Binding::Surface(_) => [0; 4],
            };
            slot.copy_from_slice(&bytes);
        }
        block
    }

    pub fn issues(&self) -> &[SortError] {
        &self.issues
    }
}

/// Match `bindings` against the inputs `desc` declares.
///
/// A surface input resolves only to a live surface of the declared format that is not the
/// pass's own output. Unknown names, missing inputs and kind mismatches are logged and the
/// input is left unbound.
pub fn resolve_inputs(
    desc: &ProgramDesc,
    bindings: &Bindings,
    output: SurfaceId,
    lookup: impl Fn(SurfaceId) -> Option<SurfaceDesc>,
) -> ResolvedInputs {
    let mut out = ResolvedInputs::default();
    let issue = |out: &mut ResolvedInputs, msg: String| {
        tracing::warn!(program = desc.name, "{msg}");
        out.issues.push(SortError::binding(msg));
    };

    for (name, _) in bindings.iter() {
        if desc.input(name).is_none() {
            issue(&mut out, format!("'{name}' is not an input of {}", desc.name));
        }
    }

    for input in desc.inputs {
        let bound = bindings.get(input.name);
        match input.kind {
            InputKind::Surface(format) => {
                let resolved = match bound {
                    Some(Binding::Surface(id)) if id == output => {
                        issue(&mut out, format!("'{}' reads the pass output {id:?}", input.name));
                        None
                    }
                    Some(Binding::Surface(id)) => match lookup(id) {
                        Some(d) if d.format == format => Some((id, d)),
                        Some(d) => {
                            issue(
                                &mut out,
                                format!(
                                    "'{}' expects {format:?}, {id:?} is {:?}",
                                    input.name, d.format
                                ),
                            );
                            None
                        }
                        None => {
                            issue(&mut out, format!("'{}' names unknown {id:?}", input.name));
                            None
                        }
                    },
                    Some(other) => {
                        let msg = format!("'{}' expects a surface, got {other:?}", input.name);
                        issue(&mut out, msg);
                        None
                    }
                    None => {
                        issue(&mut out, format!("'{}' is not bound", input.name));
                        None
                    }
                };
                out.surfaces.push((input.name, resolved));
            }
            InputKind::Int | InputKind::Float => {
                let value = match (input.kind, bound) {
                    (InputKind::Int, Some(b @ Binding::Int(_))) => b,
                    (InputKind::Float, Some(b @ Binding::Float(_))) => b,
                    (kind, b) => {
                        match b {
                            Some(b) => issue(
                                &mut out,
                                format!("'{}' expects {kind:?}, got {b:?}", input.name),
                            ),
                            None => issue(&mut out, format!("'{}' is not bound", input.name)),
                        }
                        if kind == InputKind::Int {
                            Binding::Int(0)
                        } else {
                            Binding::Float(0.0)
                        }
                    }
                };
                out.scalars.push((input.name, value));
            }
        }
    }

    out
}

#[cfg(test)]
#[path = "../../tests/unit/render/passes.rs"]
mod tests;
