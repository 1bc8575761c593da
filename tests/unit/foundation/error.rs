use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        SortError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        SortError::allocation("x")
            .to_string()
            .contains("allocation error:")
    );
    assert!(
        SortError::program_build("x")
            .to_string()
            .contains("program build error:")
    );
    assert!(SortError::binding("x").to_string().contains("binding error:"));
    assert!(SortError::backend("x").to_string().contains("backend error:"));
    assert!(
        SortError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = SortError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn only_allocation_failures_are_frame_fatal() {
    assert!(SortError::allocation("oom").is_frame_fatal());
    assert!(!SortError::program_build("bad").is_frame_fatal());
    assert!(!SortError::binding("u_mask").is_frame_fatal());
    assert!(!SortError::validation("x").is_frame_fatal());
}
