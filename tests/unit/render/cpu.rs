use super::*;

fn backend() -> CpuBackend {
    CpuBackend::new(RenderSettings::default()).unwrap()
}

fn alloc(b: &mut CpuBackend, w: u32, h: u32, format: PixelFormat) -> SurfaceId {
    b.allocate_surface(&SurfaceDesc::new(Extent { width: w, height: h }, format))
        .unwrap()
}

fn grey(v: u8) -> [u8; 4] {
    [v, v, v, 255]
}

#[test]
fn mask_pass_thresholds_uploaded_color() {
    let mut b = backend();
    let color = alloc(&mut b, 2, 1, PixelFormat::Rgba8Unorm);
    let out = alloc(&mut b, 2, 1, PixelFormat::R8Uint);
    b.upload_rgba8(color, &[grey(10), grey(200)].concat()).unwrap();

    let h = b.compile_program(Program::Mask).unwrap();
    let bindings = Bindings::new()
        .surface(mask::CAPTURE, color)
        .float(mask::THRESHOLD, 0.1);
    b.invoke(h, &bindings, out).unwrap();

    let rb = b.readback(out).unwrap();
    assert_eq!(rb.texels, TexelData::R8(vec![0, 1]));
    assert_eq!(b.binding_issues(), 0);
}

#[test]
fn capture_pass_resamples_nearest() {
    let mut b = backend();
    let src = alloc(&mut b, 2, 2, PixelFormat::Rgba8Unorm);
    let dst = alloc(&mut b, 4, 4, PixelFormat::Rgba8Unorm);
    b.upload_rgba8(src, &[grey(1), grey(2), grey(3), grey(4)].concat())
        .unwrap();

    let h = b.compile_program(Program::Capture).unwrap();
    let bindings = Bindings::new()
        .surface(capture::SOURCE, src)
        .int(capture::OUT_WIDTH, 4)
        .int(capture::OUT_HEIGHT, 4);
    b.invoke(h, &bindings, dst).unwrap();

    let frame = b.readback_rgba8(dst).unwrap();
    let px = |x: usize, y: usize| frame.data[(y * 4 + x) * 4];
    assert_eq!([px(0, 0), px(1, 0), px(2, 0), px(3, 0)], [1, 1, 2, 2]);
    assert_eq!([px(0, 3), px(3, 3)], [3, 4]);
}

#[test]
fn unresolved_inputs_run_unbound() {
    let mut b = backend();
    let out = alloc(&mut b, 3, 2, PixelFormat::R16Uint);
    let h = b.compile_program(Program::Span).unwrap();

    // Nothing bound: the pass still runs and reads zeros.
    b.invoke(h, &Bindings::new(), out).unwrap();
    assert_eq!(b.binding_issues(), 1);
    assert_eq!(b.readback(out).unwrap().texels, TexelData::R16(vec![0; 6]));
}

#[test]
fn pass_cannot_read_its_own_output() {
    let mut b = backend();
    let keys = alloc(&mut b, 1, 2, PixelFormat::Rg16Uint);
    let span = alloc(&mut b, 1, 2, PixelFormat::R16Uint);
    let h = b.compile_program(Program::SortStep).unwrap();
    let bindings = Bindings::new()
        .surface(network::KEYS, keys)
        .surface(network::SPAN, span)
        .int(network::STEP, 1)
        .int(network::PASS, 0);
    b.invoke(h, &bindings, keys).unwrap();
    assert_eq!(b.binding_issues(), 1);
}

#[test]
fn output_of_wrong_format_is_rejected() {
    let mut b = backend();
    let out = alloc(&mut b, 1, 1, PixelFormat::R8Uint);
    let h = b.compile_program(Program::Composite).unwrap();
    assert!(matches!(
        b.invoke(h, &Bindings::new(), out),
        Err(SortError::Validation(_))
    ));
}

#[test]
fn budget_overflow_is_an_allocation_error() {
    let mut b = CpuBackend::new(RenderSettings {
        max_surface_bytes: 64,
        threads: None,
    })
    .unwrap();
    let desc = SurfaceDesc::new(Extent { width: 8, height: 8 }, PixelFormat::Rgba8Unorm);
    let err = b.allocate_surface(&desc).unwrap_err();
    assert!(err.is_frame_fatal());
    assert_eq!(b.surface_stats().live_surfaces, 0);
}

#[test]
fn release_drops_storage() {
    let mut b = backend();
    let id = alloc(&mut b, 4, 4, PixelFormat::Rgba8Unorm);
    b.release_surface(id).unwrap();
    assert!(b.readback(id).is_err());
    assert_eq!(b.surface_stats().live_bytes, 0);
    assert_eq!(b.surface_stats().released_total, 1);
}

#[test]
fn upload_size_is_checked() {
    let mut b = backend();
    let id = alloc(&mut b, 2, 2, PixelFormat::Rgba8Unorm);
    assert!(b.upload_rgba8(id, &[0; 4]).is_err());
}

#[test]
fn dedicated_pool_matches_global_pool() {
    let mut pooled = CpuBackend::new(RenderSettings {
        threads: Some(2),
        ..RenderSettings::default()
    })
    .unwrap();
    let mut global = backend();
    let px: Vec<u8> = (0..16u8).flat_map(|v| grey(v * 16)).collect();

    let run = |b: &mut CpuBackend| {
        let color = alloc(b, 4, 4, PixelFormat::Rgba8Unorm);
        let keys = alloc(b, 4, 4, PixelFormat::Rg16Uint);
        b.upload_rgba8(color, &px).unwrap();
        let h = b.compile_program(Program::Key).unwrap();
        b.invoke(h, &Bindings::new().surface(key::CAPTURE, color), keys)
            .unwrap();
        b.readback(keys).unwrap()
    };
    assert_eq!(run(&mut pooled), run(&mut global));
}

#[test]
fn zero_threads_is_rejected() {
    let res = CpuBackend::new(RenderSettings {
        threads: Some(0),
        ..RenderSettings::default()
    });
    assert!(res.is_err());
}
