use super::*;
use crate::foundation::core::Extent;
use crate::programs::TexelView;

fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Run the whole network over one column with two ping-pong buffers.
fn run_network(keys: &[u16], spans: &[u16], direction: SortDirection) -> Vec<KeyIndex> {
    let h = keys.len() as u32;
    let e = Extent {
        width: 1,
        height: h,
    };
    let mut src: Vec<KeyIndex> = keys
        .iter()
        .enumerate()
        .map(|(row, &key)| KeyIndex {
            key,
            row: row as u16,
        })
        .collect();
    let mut dst = src.clone();
    let passes = e.sort_pass_count();
    for pass in 0..passes {
        for step in (0..=pass).rev() {
            let kv = TexelView::new(&src, e);
            let sv = TexelView::new(spans, e);
            for (y, out) in dst.iter_mut().enumerate() {
                *out = texel(&kv, &sv, direction.encode_step(step), pass as i32, 0, y as u32);
            }
            std::mem::swap(&mut src, &mut dst);
        }
    }
    src
}

/// Run ids the way the span stage computes them.
fn spans_for(mask: &[u8]) -> Vec<u16> {
    let e = Extent {
        width: 1,
        height: mask.len() as u32,
    };
    let v = TexelView::new(mask, e);
    (0..mask.len() as u32)
        .map(|y| crate::programs::span::texel(&v, 0, y))
        .collect()
}

fn runs(mask: &[u8]) -> Vec<std::ops::Range<usize>> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, &m) in mask.iter().enumerate() {
        match (m, start) {
            (1, None) => start = Some(i),
            (0, Some(s)) => {
                out.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push(s..mask.len());
    }
    out
}

#[test]
fn partner_rows_follow_butterfly_then_half_cleaner() {
    // First sub-pass of pass 1 mirrors inside blocks of 4.
    assert_eq!(partner_row(0, 1, 1), (3, true));
    assert_eq!(partner_row(1, 1, 1), (2, true));
    assert_eq!(partner_row(2, 1, 1), (1, false));
    assert_eq!(partner_row(3, 1, 1), (0, false));
    // Later sub-pass of pass 1 compares neighbours.
    assert_eq!(partner_row(0, 1, 0), (1, true));
    assert_eq!(partner_row(1, 1, 0), (0, false));
    // Pass 2, step 1: distance 2.
    assert_eq!(partner_row(5, 2, 1), (7, true));
    assert_eq!(partner_row(7, 2, 1), (5, false));
}

#[test]
fn partners_are_symmetric() {
    for pass in 0..6 {
        for step in 0..=pass {
            for y in 0..64u32 {
                let (q, lower) = partner_row(y, pass, step);
                let (back, q_lower) = partner_row(q, pass, step);
                assert_eq!(back, y);
                assert_ne!(lower, q_lower);
                assert_eq!(lower, q > y);
            }
        }
    }
}

#[test]
fn run_predicate_requires_equal_live_ids() {
    assert!(same_run(3, 3));
    assert!(!same_run(0, 0));
    assert!(!same_run(2, 3));
    assert!(!same_run(1, 0));
}

#[test]
fn zero_step_uniform_is_a_no_op() {
    let keys = [KeyIndex { key: 9, row: 0 }, KeyIndex { key: 1, row: 1 }];
    let spans = [1u16, 1];
    let e = Extent {
        width: 1,
        height: 2,
    };
    let kv = TexelView::new(&keys, e);
    let sv = TexelView::new(&spans, e);
    assert_eq!(texel(&kv, &sv, 0, 0, 0, 0), keys[0]);
    assert_eq!(texel(&kv, &sv, 1, 0, 0, 0), keys[1]);
}

#[test]
fn whole_active_column_sorts_ascending_and_descending() {
    for h in 1..=33usize {
        let keys: Vec<u16> = (0..h as u64).map(|i| (mix64(i + 17) % 8193) as u16).collect();
        let spans = vec![1u16; h];

        let asc = run_network(&keys, &spans, SortDirection::Ascending);
        let mut expected = keys.clone();
        expected.sort_unstable();
        assert_eq!(
            asc.iter().map(|k| k.key).collect::<Vec<_>>(),
            expected,
            "height {h}"
        );

        let desc = run_network(&keys, &spans, SortDirection::Descending);
        expected.reverse();
        assert_eq!(
            desc.iter().map(|k| k.key).collect::<Vec<_>>(),
            expected,
            "height {h}"
        );
    }
}

#[test]
fn output_is_a_permutation_of_rows() {
    let keys: Vec<u16> = (0..23u64).map(|i| (mix64(i) % 7) as u16).collect();
    let spans = vec![1u16; keys.len()];
    let out = run_network(&keys, &spans, SortDirection::Ascending);
    let mut rows: Vec<u16> = out.iter().map(|k| k.row).collect();
    rows.sort_unstable();
    assert_eq!(rows, (0..23u16).collect::<Vec<_>>());
    for k in &out {
        assert_eq!(k.key, keys[k.row as usize]);
    }
}

#[test]
fn runs_sort_independently_and_inactive_rows_never_move() {
    for seed in 0..200u64 {
        let h = 1 + (mix64(seed) % 40) as usize;
        let mask: Vec<u8> = (0..h as u64)
            .map(|i| u8::from(mix64(seed * 1000 + i) % 4 != 0))
            .collect();
        let keys: Vec<u16> = (0..h as u64)
            .map(|i| (mix64(seed * 7919 + i) % 8193) as u16)
            .collect();
        let spans = spans_for(&mask);
        let out = run_network(&keys, &spans, SortDirection::Ascending);

        for (y, &m) in mask.iter().enumerate() {
            if m == 0 {
                assert_eq!(out[y].row as usize, y, "seed {seed} row {y} moved");
                assert_eq!(out[y].key, keys[y]);
            }
        }
        for r in runs(&mask) {
            let mut expected: Vec<u16> = keys[r.clone()].to_vec();
            expected.sort_unstable();
            let got: Vec<u16> = out[r.clone()].iter().map(|k| k.key).collect();
            assert_eq!(got, expected, "seed {seed} run {r:?}");
            assert!(
                out[r.clone()].iter().all(|k| r.contains(&(k.row as usize))),
                "seed {seed}: an entry crossed the edge of run {r:?}"
            );
        }
    }
}

#[test]
fn sorted_runs_are_left_unchanged() {
    let keys: Vec<u16> = vec![5, 1, 2, 2, 9, 0, 3, 4, 4, 8];
    let mask: Vec<u8> = vec![1, 1, 1, 1, 1, 0, 1, 1, 1, 1];
    let spans = spans_for(&mask);
    let once = run_network(&keys, &spans, SortDirection::Ascending);
    let sorted_keys: Vec<u16> = once.iter().map(|k| k.key).collect();
    let twice = run_network(&sorted_keys, &spans, SortDirection::Ascending);
    for (y, k) in twice.iter().enumerate() {
        assert_eq!(k.row as usize, y, "row {y} moved on an already sorted input");
    }
}

#[test]
fn equal_keys_never_swap() {
    let keys = vec![4u16; 8];
    let spans = vec![1u16; 8];
    let out = run_network(&keys, &spans, SortDirection::Ascending);
    for (y, k) in out.iter().enumerate() {
        assert_eq!(k.row as usize, y);
    }
}
