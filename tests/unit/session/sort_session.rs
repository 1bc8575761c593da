use super::*;
use image::Rgba;

fn cpu(max_surface_bytes: usize) -> Box<dyn RenderBackend> {
    Box::new(
        CpuBackend::new(RenderSettings {
            max_surface_bytes,
            threads: None,
        })
        .unwrap(),
    )
}

fn session(w: u32, h: u32) -> SortSession {
    SortSession::new(cpu(1 << 24), Extent::new(w, h).unwrap(), SortOpts::default()).unwrap()
}

fn solid(w: u32, h: u32, v: u8) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba([v, v, v, 255]))
}

#[test]
fn new_session_allocates_the_surface_set() {
    let s = session(4, 3);
    let st = s.surface_stats();
    assert_eq!(st.live_surfaces, 6);
    assert_eq!(s.stats().reallocations, 1);
    let surfaces = s.surfaces().unwrap();
    assert_eq!(surfaces.extent, Extent::new(4, 3).unwrap());
}

#[test]
fn rendering_counts_frames_and_sub_passes() {
    let mut s = session(2, 5);
    let img = solid(2, 5, 200);
    assert!(s.render_frame(&img, None).unwrap().is_rendered());
    assert!(s.render_frame(&img, None).unwrap().is_rendered());

    let st = s.stats();
    assert_eq!(st.frames_rendered, 2);
    // 5 rows: 3 merge passes, 6 sub-passes per frame.
    assert_eq!(st.sub_passes_executed, 12);
    assert_eq!(st.reallocations, 1);
}

#[test]
fn resize_releases_before_recreating() {
    let mut s = session(4, 4);
    let old = *s.surfaces().unwrap();
    let img = solid(4, 4, 90);
    s.render_frame(&img, None).unwrap();

    let out = s
        .render_frame(&img, Some(ResizeEvent { width: 3, height: 7 }))
        .unwrap();
    assert!(out.is_rendered());

    let new = *s.surfaces().unwrap();
    assert_eq!(new.extent, Extent::new(3, 7).unwrap());
    for id in old.ids() {
        assert!(!new.ids().contains(&id));
    }
    assert_eq!(s.stats().surfaces_released, 6);
    assert_eq!(s.stats().reallocations, 2);
    // Six pipeline surfaces plus the source.
    assert_eq!(s.surface_stats().live_surfaces, 7);

    let frame = s.readback_rgba8(SurfaceRole::Output).unwrap();
    assert_eq!((frame.width, frame.height), (3, 7));
}

#[test]
fn resize_to_same_extent_keeps_surfaces() {
    let mut s = session(2, 2);
    let before = *s.surfaces().unwrap();
    s.render_frame(&solid(2, 2, 0), Some(ResizeEvent { width: 2, height: 2 }))
        .unwrap();
    assert_eq!(*s.surfaces().unwrap(), before);
    assert_eq!(s.stats().surfaces_released, 0);
}

#[test]
fn allocation_failure_skips_the_frame_without_leaks() {
    // Room for the 2x2 set but not for an 8x8 one.
    let mut s = SortSession::new(cpu(200), Extent::new(2, 2).unwrap(), SortOpts::default())
        .unwrap();
    let out = s
        .render_frame(&solid(2, 2, 1), Some(ResizeEvent { width: 8, height: 8 }))
        .unwrap();
    assert!(matches!(out, FrameOutcome::Skipped { .. }));
    assert_eq!(s.stats().frames_skipped, 1);
    assert!(s.surfaces().is_none());
    assert_eq!(s.surface_stats().live_surfaces, 0);

    // Shrinking again recovers.
    let out = s
        .render_frame(&solid(2, 2, 1), Some(ResizeEvent { width: 2, height: 2 }))
        .unwrap();
    assert!(out.is_rendered());
}

#[test]
fn size_mismatch_without_resampling_is_rejected() {
    let opts = SortOpts {
        resample: false,
        ..SortOpts::default()
    };
    let mut s = SortSession::new(cpu(1 << 20), Extent::new(2, 2).unwrap(), opts).unwrap();
    assert!(matches!(
        s.render_frame(&solid(3, 2, 1), None),
        Err(SortError::Validation(_))
    ));
    assert!(s.render_frame(&solid(2, 2, 1), None).unwrap().is_rendered());
}

#[test]
fn invalid_options_are_rejected() {
    let opts = SortOpts {
        threshold: f32::NAN,
        ..SortOpts::default()
    };
    assert!(SortSession::new(cpu(1 << 20), Extent::new(1, 1).unwrap(), opts).is_err());
}

#[test]
fn zero_height_frame_is_a_no_op() {
    let mut s = session(3, 0);
    let out = s.render_frame(&solid(3, 0, 10), None).unwrap();
    assert!(out.is_rendered());
    assert_eq!(s.stats().sub_passes_executed, 0);
    assert!(s.readback_rgba8(SurfaceRole::Output).unwrap().data.is_empty());
}

#[test]
fn debug_roles_read_back_as_rgba8() {
    let mut s = session(1, 3);
    s.render_frame(&solid(1, 3, 255), None).unwrap();
    let mask = s.readback_rgba8(SurfaceRole::Mask).unwrap();
    assert_eq!(mask.data, vec![255; 12]);
    let span = s.readback_surface(SurfaceRole::Span).unwrap();
    assert_eq!(span.texels, crate::render::backend::TexelData::R16(vec![1, 1, 1]));
}

#[test]
fn sort_image_sorts_a_column() {
    let mut img = RgbaImage::new(1, 4);
    for (y, v) in [200u8, 120, 250, 150].into_iter().enumerate() {
        img.put_pixel(0, y as u32, Rgba([v, v, v, 255]));
    }
    let out = sort_image(&img, &SortOpts::default()).unwrap();
    let col: Vec<u8> = (0..4).map(|y| out.get_pixel(0, y)[0]).collect();
    assert_eq!(col, vec![120, 150, 200, 250]);
}
