/// Convenience result type used across pixsort.
pub type SortResult<T> = Result<T, SortError>;

/// Top-level error taxonomy used by pipeline and backend APIs.
#[derive(thiserror::Error, Debug)]
pub enum SortError {
    /// Invalid user-provided options, extents or plan data.
    #[error("validation error: {0}")]
    Validation(String),

    /// A surface could not be created at the requested size or format.
    #[error("allocation error: {0}")]
    Allocation(String),

    /// A per-pixel program failed to compile or link.
    #[error("program build error: {0}")]
    ProgramBuild(String),

    /// A named pass input could not be resolved.
    #[error("binding error: {0}")]
    Binding(String),

    /// Device, submission or readback failure inside a backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// Errors when serializing or deserializing options.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SortError {
    /// Build a [`SortError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`SortError::Allocation`] value.
    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::Allocation(msg.into())
    }

    /// Build a [`SortError::ProgramBuild`] value.
    pub fn program_build(msg: impl Into<String>) -> Self {
        Self::ProgramBuild(msg.into())
    }

    /// Build a [`SortError::Binding`] value.
    pub fn binding(msg: impl Into<String>) -> Self {
        Self::Binding(msg.into())
    }

    /// Build a [`SortError::Backend`] value.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Build a [`SortError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// `true` for failures that only cost the current frame (the next resize or recreate is
    /// the recovery path).
    pub fn is_frame_fatal(&self) -> bool {
        matches!(self, Self::Allocation(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
