use std::collections::HashMap;

use crate::{
    compile::plan::{Bindings, PixelFormat, SurfaceDesc, SurfaceId},
    foundation::core::KeyIndex,
    foundation::error::{SortError, SortResult},
    programs::{FULLSCREEN_VS, InputKind, Program},
    render::{
        backend::{BackendKind, RenderBackend, RenderSettings, SurfaceReadback, TexelData},
        passes::{PassBackend, ProgramHandle, resolve_inputs},
        surface_registry::{SurfaceRegistry, SurfaceRegistryOpts, SurfaceStats},
    },
};

struct GpuSurface {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuProgram {
    program: Program,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

/// Backend running each program's WGSL as one full-screen triangle draw per pass.
///
/// Zero-sized surfaces are tracked but own no texture; passes into them are no-ops.
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    registry: SurfaceRegistry,
    surfaces: HashMap<SurfaceId, Option<GpuSurface>>,
    programs: Vec<GpuProgram>,
    // 1x1 zero textures standing in for unbound inputs, per format.
    fallbacks: HashMap<PixelFormat, GpuSurface>,
}

impl GpuBackend {
    pub fn new(settings: RenderSettings) -> SortResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                SortError::backend("no gpu adapter available")
            }
            other => SortError::backend(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("pixsort_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| SortError::backend(format!("wgpu request_device failed: {e:?}")))?;

        let max_dimension = device.limits().max_texture_dimension_2d;
        tracing::info!(
            adapter = ?adapter.get_info().name,
            max_dimension,
            "gpu backend ready"
        );
        Ok(Self {
            device,
            queue,
            registry: SurfaceRegistry::new(
                SurfaceRegistryOpts::new(settings.max_surface_bytes)
                    .with_device_limit(max_dimension),
            ),
            surfaces: HashMap::new(),
            programs: Vec::new(),
            fallbacks: HashMap::new(),
        })
    }

    fn create_texture(&self, width: u32, height: u32, format: PixelFormat) -> GpuSurface {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("pixsort_surface"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuSurface { texture, view }
    }

    fn ensure_fallback(&mut self, format: PixelFormat) {
        if !self.fallbacks.contains_key(&format) {
            // New textures are zero-initialized by wgpu.
            let surface = self.create_texture(1, 1, format);
            self.fallbacks.insert(format, surface);
        }
    }
}

impl PassBackend for GpuBackend {
    fn allocate_surface(&mut self, desc: &SurfaceDesc) -> SortResult<SurfaceId> {
        let id = self.registry.register(*desc)?;
        if desc.extent().is_empty() {
            self.surfaces.insert(id, None);
            return Ok(id);
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let surface = self.create_texture(desc.width, desc.height, desc.format);
        let invalid = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        if let Some(err) = invalid.or(oom) {
            self.registry.release(id)?;
            return Err(SortError::allocation(format!(
                "texture {}x{} {:?}: {err}",
                desc.width, desc.height, desc.format
            )));
        }
        self.surfaces.insert(id, Some(surface));
        Ok(id)
    }

    fn release_surface(&mut self, id: SurfaceId) -> SortResult<()> {
        self.registry.release(id)?;
        if let Some(Some(surface)) = self.surfaces.remove(&id) {
            surface.texture.destroy();
        }
        Ok(())
    }

    fn upload_rgba8(&mut self, id: SurfaceId, rgba: &[u8]) -> SortResult<()> {
        let desc = self
            .registry
            .desc(id)
            .ok_or_else(|| SortError::validation(format!("upload to unknown surface {id:?}")))?;
        if desc.format != PixelFormat::Rgba8Unorm || rgba.len() != desc.byte_len() {
            return Err(SortError::validation(format!(
                "upload of {} bytes into {}x{} {:?} surface",
                rgba.len(),
                desc.width,
                desc.height,
                desc.format
            )));
        }
        let Some(Some(surface)) = self.surfaces.get(&id) else {
            return Ok(());
        };
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &surface.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * 4),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn compile_program(&mut self, program: Program) -> SortResult<ProgramHandle> {
        let desc = program.desc();
        let device = &self.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut entries = Vec::with_capacity(desc.inputs.len());
        for (slot, input) in desc.surface_inputs().enumerate() {
            let InputKind::Surface(format) = input.kind else {
                continue;
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: sample_type(format),
                },
                count: None,
            });
        }
        if desc.scalar_inputs().next().is_some() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: entries.len() as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(16),
                },
                count: None,
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.name),
            entries: &entries,
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.name),
            source: wgpu::ShaderSource::Wgsl(format!("{FULLSCREEN_VS}\n{}", desc.wgsl).into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.name),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.name),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: texture_format(desc.output),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(SortError::program_build(format!("{}: {err}", desc.name)));
        }

        let handle = ProgramHandle(
            self.programs
                .len()
                .try_into()
                .map_err(|_| SortError::program_build("program handle overflow"))?,
        );
        self.programs.push(GpuProgram {
            program,
            pipeline,
            bind_group_layout,
        });
        tracing::debug!(program = desc.name, "compiled gpu program");
        Ok(handle)
    }

    fn invoke(
        &mut self,
        program: ProgramHandle,
        bindings: &Bindings,
        output: SurfaceId,
    ) -> SortResult<()> {
        let index = program.0 as usize;
        let desc = self
            .programs
            .get(index)
            .ok_or_else(|| SortError::validation(format!("unknown program {program:?}")))?
            .program
            .desc();
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
        for input in desc.surface_inputs() {
            if let InputKind::Surface(format) = input.kind {
                self.ensure_fallback(format);
            }
        }

        let Some(Some(target)) = self.surfaces.get(&output) else {
            return Ok(());
        };
        let gpu_program = &self.programs[index];

        let mut views = Vec::new();
        for (input, resolved) in desc.surface_inputs().zip(inputs.surfaces()) {
            let InputKind::Surface(format) = input.kind else {
                continue;
            };
            let bound = resolved
                .and_then(|(id, _)| self.surfaces.get(&id))
                .and_then(|s| s.as_ref());
            let view = match bound.or_else(|| self.fallbacks.get(&format)) {
                Some(s) => &s.view,
                None => return Err(SortError::backend("fallback texture missing")),
            };
            views.push(view);
        }

        let params = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pixsort_params"),
            size: 16,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue.write_buffer(&params, 0, &inputs.param_block());

        let mut entries: Vec<wgpu::BindGroupEntry<'_>> = views
            .iter()
            .enumerate()
            .map(|(slot, view)| wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        if desc.scalar_inputs().next().is_some() {
            entries.push(wgpu::BindGroupEntry {
                binding: entries.len() as u32,
                resource: params.as_entire_binding(),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(desc.name),
            layout: &gpu_program.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(desc.name),
            });
        {
            let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(desc.name),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rp.set_pipeline(&gpu_program.pipeline);
            rp.set_bind_group(0, &bind_group, &[]);
            rp.draw(0..3, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
        tracing::trace!(program = desc.name, ?output, "gpu pass");
        Ok(())
    }

    fn readback(&mut self, id: SurfaceId) -> SortResult<SurfaceReadback> {
        let desc = self
            .registry
            .desc(id)
            .ok_or_else(|| SortError::validation(format!("readback of unknown surface {id:?}")))?;
        let Some(Some(surface)) = self.surfaces.get(&id) else {
            return Ok(SurfaceReadback {
                desc,
                texels: TexelData::zeroed(&desc),
            });
        };

        let row_bytes = desc.width * desc.format.texel_bytes() as u32;
        let bytes_per_row = align_to(row_bytes, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pixsort_readback"),
            size: u64::from(bytes_per_row) * u64::from(desc.height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pixsort_readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &surface.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(desc.height),
                },
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| SortError::backend(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| SortError::backend("readback channel closed"))?
            .map_err(|e| SortError::backend(format!("readback map failed: {e:?}")))?;

        let mapped = slice.get_mapped_range();
        let mut packed = Vec::with_capacity(row_bytes as usize * desc.height as usize);
        for row in 0..desc.height as usize {
            let start = row * bytes_per_row as usize;
            packed.extend_from_slice(&mapped[start..start + row_bytes as usize]);
        }
        drop(mapped);
        buffer.unmap();

        Ok(SurfaceReadback {
            desc,
            texels: decode_texels(desc.format, &packed),
        })
    }

    fn surface_stats(&self) -> SurfaceStats {
        self.registry.stats()
    }
}

impl RenderBackend for GpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }
}

fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::R8Uint => wgpu::TextureFormat::R8Uint,
        PixelFormat::R16Uint => wgpu::TextureFormat::R16Uint,
        PixelFormat::Rg16Uint => wgpu::TextureFormat::Rg16Uint,
    }
}

fn sample_type(format: PixelFormat) -> wgpu::TextureSampleType {
    match format {
        PixelFormat::Rgba8Unorm => wgpu::TextureSampleType::Float { filterable: false },
        _ => wgpu::TextureSampleType::Uint,
    }
}

fn decode_texels(format: PixelFormat, bytes: &[u8]) -> TexelData {
    let u16_at = |c: &[u8], i: usize| u16::from_le_bytes([c[i], c[i + 1]]);
    match format {
        PixelFormat::Rgba8Unorm => {
            TexelData::Rgba8(bytes.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]).collect())
        }
        PixelFormat::R8Uint => TexelData::R8(bytes.to_vec()),
        PixelFormat::R16Uint => {
            TexelData::R16(bytes.chunks_exact(2).map(|c| u16_at(c, 0)).collect())
        }
        PixelFormat::Rg16Uint => TexelData::Rg16(
            bytes
                .chunks_exact(4)
                .map(|c| KeyIndex {
                    key: u16_at(c, 0),
                    row: u16_at(c, 2),
                })
                .collect(),
        ),
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}
