use super::*;

#[test]
fn extent_rejects_dimensions_past_ceiling() {
    assert!(Extent::new(MAX_EXTENT, MAX_EXTENT).is_ok());
    assert!(Extent::new(MAX_EXTENT + 1, 4).is_err());
    assert!(Extent::new(4, MAX_EXTENT + 1).is_err());
}

#[test]
fn pass_counts_follow_ceil_log2() {
    let cases = [
        (0, 0),
        (1, 0),
        (2, 1),
        (3, 2),
        (4, 2),
        (5, 3),
        (6, 3),
        (8, 3),
        (9, 4),
        (1080, 11),
        (MAX_EXTENT, 16),
    ];
    for (h, n) in cases {
        let e = Extent::new(1, h).unwrap();
        assert_eq!(e.sort_pass_count(), n, "height {h}");
        assert_eq!(e.sort_sub_pass_count(), n * (n + 1) / 2, "height {h}");
    }
}

#[test]
fn padded_height_covers_height() {
    for h in [0u32, 1, 2, 3, 6, 7, 8, 600] {
        let e = Extent::new(1, h).unwrap();
        assert!(e.padded_height() >= h);
        assert!(e.padded_height().is_power_of_two());
    }
}

#[test]
fn luminance_uses_weighted_channels() {
    assert_eq!(luminance([0, 0, 0, 255]), 0.0);
    assert!((luminance([255, 255, 255, 0]) - 1.0).abs() < 1e-6);
    assert!((luminance([255, 0, 0, 255]) - 0.25).abs() < 1e-6);
    assert!((luminance([0, 255, 0, 255]) - 0.40).abs() < 1e-6);
    assert!((luminance([0, 0, 255, 255]) - 0.35).abs() < 1e-6);
}

#[test]
fn quantize_key_spans_thirteen_bits() {
    assert_eq!(quantize_key(0.0), 0);
    assert_eq!(quantize_key(1.0), 8192);
    assert_eq!(quantize_key(0.5), 4096);
    assert_eq!(quantize_key(2.0), 8192);
}

#[test]
fn resize_event_validates_extent() {
    let ev = ResizeEvent {
        width: 640,
        height: 480,
    };
    assert_eq!(ev.extent().unwrap(), Extent::new(640, 480).unwrap());
    let bad = ResizeEvent {
        width: MAX_EXTENT * 2,
        height: 1,
    };
    assert!(bad.extent().is_err());
}
