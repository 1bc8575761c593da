use crate::{
    compile::plan::{Bindings, PixelFormat, SurfaceDesc, SurfaceId},
    foundation::core::{Extent, KeyIndex, Rgba8},
    foundation::error::{SortError, SortResult},
    programs::{
        Fetch, InputKind, Program, TexelView, capture, composite, key, mask, network, span,
    },
    render::{
        backend::{BackendKind, RenderBackend, RenderSettings, SurfaceReadback, TexelData},
        passes::{PassBackend, ProgramHandle, ResolvedInputs, resolve_inputs},
        surface_registry::{SurfaceRegistry, SurfaceRegistryOpts, SurfaceStats},
    },
};
use rayon::prelude::*;
use std::collections::HashMap;

/// Backend evaluating each program's Rust kernel for every output texel.
///
/// Surfaces are typed texel vectors. A pass takes its output surface out of the store while
/// it runs, so inputs are read-only and a pass can never observe its own writes.
pub struct CpuBackend {
    registry: SurfaceRegistry,
    texels: HashMap<SurfaceId, TexelData>,
    programs: Vec<Program>,
    pool: Option<rayon::ThreadPool>,
    binding_issues: u64,
}

impl CpuBackend {
    pub fn new(settings: RenderSettings) -> SortResult<Self> {
        let pool = match settings.threads {
            Some(n) => Some(build_thread_pool(n)?),
            None => None,
        };
        Ok(Self {
            registry: SurfaceRegistry::new(SurfaceRegistryOpts::new(settings.max_surface_bytes)),
            texels: HashMap::new(),
            programs: Vec::new(),
            pool,
            binding_issues: 0,
        })
    }

    /// Binding problems reported by all passes so far.
    pub fn binding_issues(&self) -> u64 {
        self.binding_issues
    }
}

impl PassBackend for CpuBackend {
    fn allocate_surface(&mut self, desc: &SurfaceDesc) -> SortResult<SurfaceId> {
        let id = self.registry.register(*desc)?;
        self.texels.insert(id, TexelData::zeroed(desc));
        Ok(id)
    }

    fn release_surface(&mut self, id: SurfaceId) -> SortResult<()> {
        self.registry.release(id)?;
        self.texels.remove(&id);
        Ok(())
    }

    fn upload_rgba8(&mut self, id: SurfaceId, rgba: &[u8]) -> SortResult<()> {
        let desc = self
            .registry
            .desc(id)
            .ok_or_else(|| SortError::validation(format!("upload to unknown surface {id:?}")))?;
        if desc.format != PixelFormat::Rgba8Unorm {
            return Err(SortError::validation(format!(
                "upload expects an rgba8 surface, {id:?} is {:?}",
                desc.format
            )));
        }
        if rgba.len() != desc.byte_len() {
            return Err(SortError::validation(format!(
                "upload of {} bytes into {}x{} rgba8 surface",
                rgba.len(),
                desc.width,
                desc.height
            )));
        }
        let px = rgba
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        self.texels.insert(id, TexelData::Rgba8(px));
        Ok(())
    }

    fn compile_program(&mut self, program: Program) -> SortResult<ProgramHandle> {
        let desc = program.desc();
        // Surface slots come first and scalars must fit the 16-byte parameter block.
        let scalars = desc.scalar_inputs().count();
        let first_scalar = desc
            .inputs
            .iter()
            .position(|i| !matches!(i.kind, InputKind::Surface(_)))
            .unwrap_or(desc.inputs.len());
        if scalars > 4 || desc.inputs.len() - first_scalar != scalars {
            return Err(SortError::program_build(format!(
                "{}: inputs do not fit the binding layout",
                desc.name
            )));
        }

        let handle = ProgramHandle(
            self.programs
                .len()
                .try_into()
                .map_err(|_| SortError::program_build("program handle overflow"))?,
        );
        self.programs.push(program);
        tracing::debug!(program = desc.name, "compiled cpu program");
        Ok(handle)
    }

    fn invoke(
        &mut self,
        program: ProgramHandle,
        bindings: &Bindings,
        output: SurfaceId,
    ) -> SortResult<()> {
        let program = *self
            .programs
            .get(program.0 as usize)
            .ok_or_else(|| SortError::validation(format!("unknown program {program:?}")))?;
        let desc = program.desc();
        let out_desc = self.registry.desc(output).ok_or_else(|| {
            SortError::binding(format!("{}: output {output:?} is not allocated", desc.name))
        })?;
        if out_desc.format != desc.output {
            return Err(SortError::validation(format!(
                "{} writes {:?}, output {output:?} is {:?}",
                desc.name, desc.output, out_desc.format
            )));
        }

        let registry = &self.registry;
        let inputs = resolve_inputs(desc, bindings, output, |id| registry.desc(id));
        self.binding_issues += inputs.issues().len() as u64;

        let mut out = self
            .texels
            .remove(&output)
            .ok_or_else(|| SortError::backend(format!("{output:?} has no storage")))?;
        let res = run_kernel(
            program,
            &inputs,
            &self.texels,
            out_desc.extent(),
            &mut out,
            self.pool.as_ref(),
        );
        self.texels.insert(output, out);
        tracing::trace!(program = desc.name, ?output, "cpu pass");
        res
    }

    fn readback(&mut self, id: SurfaceId) -> SortResult<SurfaceReadback> {
        let desc = self
            .registry
            .desc(id)
            .ok_or_else(|| SortError::validation(format!("readback of unknown surface {id:?}")))?;
        let texels = self
            .texels
            .get(&id)
            .cloned()
            .ok_or_else(|| SortError::backend(format!("{id:?} has no storage")))?;
        Ok(SurfaceReadback { desc, texels })
    }

    fn surface_stats(&self) -> SurfaceStats {
        self.registry.stats()
    }
}

impl RenderBackend for CpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }
}

fn build_thread_pool(threads: usize) -> SortResult<rayon::ThreadPool> {
    if threads == 0 {
        return Err(SortError::validation("'threads' must be >= 1 when set"));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| SortError::backend(format!("failed to build rayon thread pool: {e}")))
}

fn view<'a, T>(
    inputs: &ResolvedInputs,
    texels: &'a HashMap<SurfaceId, TexelData>,
    name: &str,
    pick: impl Fn(&'a TexelData) -> Option<&'a [T]>,
) -> TexelView<'a, T> {
    inputs
        .surface(name)
        .and_then(|(id, desc)| Some(TexelView::new(pick(texels.get(&id)?)?, desc.extent())))
        .unwrap_or_else(TexelView::unbound)
}

fn rgba8(t: &TexelData) -> Option<&[Rgba8]> {
    match t {
        TexelData::Rgba8(v) => Some(v),
        _ => None,
    }
}

fn r8(t: &TexelData) -> Option<&[u8]> {
    match t {
        TexelData::R8(v) => Some(v),
        _ => None,
    }
}

fn r16(t: &TexelData) -> Option<&[u16]> {
    match t {
        TexelData::R16(v) => Some(v),
        _ => None,
    }
}

fn rg16(t: &TexelData) -> Option<&[KeyIndex]> {
    match t {
        TexelData::Rg16(v) => Some(v),
        _ => None,
    }
}

fn run_kernel(
    program: Program,
    inputs: &ResolvedInputs,
    texels: &HashMap<SurfaceId, TexelData>,
    extent: Extent,
    out: &mut TexelData,
    pool: Option<&rayon::ThreadPool>,
) -> SortResult<()> {
    match (program, out) {
        (Program::Capture, TexelData::Rgba8(out)) => {
            let source = view(inputs, texels, capture::SOURCE, rgba8);
            let target = Extent {
                width: inputs.int(capture::OUT_WIDTH).max(0) as u32,
                height: inputs.int(capture::OUT_HEIGHT).max(0) as u32,
            };
            fill(pool, out, extent, |x, y| capture::texel(&source, target, x, y));
        }
        (Program::Mask, TexelData::R8(out)) => {
            let capture = view(inputs, texels, mask::CAPTURE, rgba8);
            let threshold = inputs.float(mask::THRESHOLD);
            fill(pool, out, extent, |x, y| {
                mask::texel(capture.fetch(x, y), threshold)
            });
        }
        (Program::Span, TexelData::R16(out)) => {
            let m = view(inputs, texels, span::MASK, r8);
            fill(pool, out, extent, |x, y| span::texel(&m, x, y));
        }
        (Program::Key, TexelData::Rg16(out)) => {
            let capture = view(inputs, texels, key::CAPTURE, rgba8);
            fill(pool, out, extent, |x, y| key::texel(capture.fetch(x, y), y));
        }
        (Program::SortStep, TexelData::Rg16(out)) => {
            let keys = view(inputs, texels, network::KEYS, rg16);
            let spans = view(inputs, texels, network::SPAN, r16);
            let step = inputs.int(network::STEP);
            let pass = inputs.int(network::PASS);
            fill(pool, out, extent, |x, y| {
                network::texel(&keys, &spans, step, pass, x, y)
            });
        }
        (Program::Composite, TexelData::Rgba8(out)) => {
            let capture = view(inputs, texels, composite::CAPTURE, rgba8);
            let keys = view(inputs, texels, composite::KEYS, rg16);
            fill(pool, out, extent, |x, y| {
                composite::texel(&capture, &keys, x, y)
            });
        }
        (program, out) => {
            return Err(SortError::validation(format!(
                "{} cannot write {:?} texels",
                program.desc().name,
                out.format()
            )));
        }
    }
    Ok(())
}

/// Evaluate `f` for every texel of `out`, rows in parallel.
fn fill<T, F>(pool: Option<&rayon::ThreadPool>, out: &mut [T], extent: Extent, f: F)
where
    T: Send,
    F: Fn(u32, u32) -> T + Sync,
{
    if extent.is_empty() {
        return;
    }
    let width = extent.width as usize;
    match pool {
        Some(pool) => pool.install(|| fill_rows(out, width, &f)),
        None => fill_rows(out, width, &f),
    }
}

fn fill_rows<T, F>(out: &mut [T], width: usize, f: &F)
where
    T: Send,
    F: Fn(u32, u32) -> T + Sync,
{
    out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        for (x, t) in row.iter_mut().enumerate() {
            *t = f(x as u32, y as u32);
        }
    });
}

#[cfg(test)]
#[path = "../../tests/unit/render/cpu.rs"]
mod tests;
