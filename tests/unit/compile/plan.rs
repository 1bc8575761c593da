use super::*;

fn surfaces(w: u32, h: u32) -> FrameSurfaces {
    FrameSurfaces {
        extent: Extent::new(w, h).unwrap(),
        capture: SurfaceId(10),
        mask: SurfaceId(11),
        span: SurfaceId(12),
        keys: [SurfaceId(13), SurfaceId(14)],
        output: SurfaceId(15),
    }
}

fn programs(plan: &FramePlan) -> Vec<Program> {
    plan.passes.iter().map(|p| p.program).collect()
}

#[test]
fn stages_run_in_pipeline_order() {
    let plan = compile_frame(&surfaces(4, 6), SurfaceId(1), &SortOpts::default());
    let progs = programs(&plan);
    assert_eq!(
        &progs[..4],
        &[Program::Capture, Program::Mask, Program::Span, Program::Key]
    );
    assert_eq!(*progs.last().unwrap(), Program::Composite);
    assert!(
        progs[4..progs.len() - 1]
            .iter()
            .all(|p| *p == Program::SortStep)
    );
}

#[test]
fn sub_pass_count_is_triangular_in_log_height() {
    for (h, n) in [(0u32, 0usize), (1, 0), (2, 1), (6, 6), (8, 6), (9, 10), (1080, 66)] {
        let plan = compile_frame(&surfaces(3, h), SurfaceId(1), &SortOpts::default());
        assert_eq!(plan.sub_pass_count(), n, "height {h}");
    }
}

#[test]
fn schedule_descends_steps_within_each_pass() {
    let s = sort_schedule(Extent::new(1, 8).unwrap(), SortDirection::Ascending);
    let pairs: Vec<(u32, u32)> = s.iter().map(|p| (p.pass, p.step)).collect();
    assert_eq!(pairs, vec![(0, 0), (1, 1), (1, 0), (2, 2), (2, 1), (2, 0)]);
    assert!(s.iter().all(|p| p.encoded_step == p.step as i32 + 1));

    let d = sort_schedule(Extent::new(1, 8).unwrap(), SortDirection::Descending);
    assert!(d.iter().all(|p| p.encoded_step == -(p.step as i32 + 1)));
}

#[test]
fn no_pass_reads_its_own_output() {
    let plan = compile_frame(&surfaces(5, 37), SurfaceId(1), &SortOpts::default());
    for p in &plan.passes {
        assert!(
            p.bindings.surfaces().all(|s| s != p.output),
            "{:?} reads and writes {:?}",
            p.program,
            p.output
        );
    }
}

#[test]
fn ping_pong_alternates_and_exposes_final_buffer() {
    let s = surfaces(2, 8);
    let plan = compile_frame(&s, SurfaceId(1), &SortOpts::default());

    let key_pass = &plan.passes[3];
    assert_eq!(key_pass.output, s.keys[0]);

    let mut expected_src = s.keys[0];
    for p in plan.passes.iter().filter(|p| p.program == Program::SortStep) {
        assert_eq!(
            p.bindings.get(network::KEYS),
            Some(Binding::Surface(expected_src))
        );
        let dst = if expected_src == s.keys[0] {
            s.keys[1]
        } else {
            s.keys[0]
        };
        assert_eq!(p.output, dst);
        expected_src = dst;
    }
    assert_eq!(plan.sorted, expected_src);

    let composite = plan.passes.last().unwrap();
    assert_eq!(
        composite.bindings.get(composite::KEYS),
        Some(Binding::Surface(plan.sorted))
    );
    assert_eq!(composite.output, s.output);
}

#[test]
fn zero_passes_leave_keys_in_first_buffer() {
    let s = surfaces(3, 1);
    let plan = compile_frame(&s, SurfaceId(1), &SortOpts::default());
    assert_eq!(plan.sorted, s.keys[0]);
    assert_eq!(plan.passes.len(), 5);
}

#[test]
fn ping_pong_swap_exchanges_roles() {
    let mut pp = PingPong::new(SurfaceId(1), SurfaceId(2));
    assert_eq!((pp.source(), pp.destination()), (SurfaceId(1), SurfaceId(2)));
    pp.swap();
    assert_eq!((pp.source(), pp.destination()), (SurfaceId(2), SurfaceId(1)));
    pp.swap();
    assert_eq!((pp.source(), pp.destination()), (SurfaceId(1), SurfaceId(2)));
}

#[test]
fn bindings_resolve_last_value_by_name() {
    let b = Bindings::new()
        .int("u_step", 1)
        .float("u_threshold", 0.5)
        .int("u_step", 3);
    assert_eq!(b.get("u_step"), Some(Binding::Int(3)));
    assert_eq!(b.get("u_threshold"), Some(Binding::Float(0.5)));
    assert_eq!(b.get("u_missing"), None);
    assert_eq!(b.surfaces().count(), 0);
}

#[test]
fn byte_len_tracks_format() {
    let e = Extent::new(4, 3).unwrap();
    assert_eq!(SurfaceDesc::new(e, PixelFormat::R8Uint).byte_len(), 12);
    assert_eq!(SurfaceDesc::new(e, PixelFormat::R16Uint).byte_len(), 24);
    assert_eq!(SurfaceDesc::new(e, PixelFormat::Rg16Uint).byte_len(), 48);
    assert_eq!(SurfaceDesc::new(e, PixelFormat::Rgba8Unorm).byte_len(), 48);
}

#[test]
fn threshold_and_direction_flow_into_bindings() {
    let opts = SortOpts {
        threshold: 0.25,
        direction: SortDirection::Descending,
        ..SortOpts::default()
    };
    let plan = compile_frame(&surfaces(2, 4), SurfaceId(1), &opts);
    assert_eq!(
        plan.passes[1].bindings.get(mask::THRESHOLD),
        Some(Binding::Float(0.25))
    );
    for p in plan.passes.iter().filter(|p| p.program == Program::SortStep) {
        match p.bindings.get(network::STEP) {
            Some(Binding::Int(v)) => assert!(v < 0),
            other => panic!("unexpected step binding {other:?}"),
        }
    }
}
