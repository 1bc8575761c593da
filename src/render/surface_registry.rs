use crate::compile::plan::{SurfaceDesc, SurfaceId};
use crate::foundation::core::MAX_EXTENT;
use crate::foundation::error::{SortError, SortResult};
use std::collections::HashMap;

/// Registry configuration for live surfaces.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SurfaceRegistryOpts {
    /// Maximum bytes held by live surfaces. Exceeding it is an allocation failure.
    pub(crate) max_live_bytes: usize,
    /// Largest width or height a backend can create. Never above [`MAX_EXTENT`].
    pub(crate) max_dimension: u32,
}

impl SurfaceRegistryOpts {
    pub(crate) fn new(max_live_bytes: usize) -> Self {
        Self {
            max_live_bytes,
            max_dimension: MAX_EXTENT,
        }
    }

    /// Caps surface sides at a device limit such as `max_texture_dimension_2d`.
    pub(crate) fn with_device_limit(mut self, limit: u32) -> Self {
        self.max_dimension = limit.min(MAX_EXTENT);
        self
    }
}

/// Live and lifetime surface counters of a backend.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceStats {
    /// Surfaces currently allocated.
    pub live_surfaces: usize,
    /// Bytes held by live surfaces.
    pub live_bytes: usize,
    /// Surfaces ever allocated.
    pub allocated_total: u64,
    /// Surfaces ever released.
    pub released_total: u64,
    /// Allocation requests refused.
    pub refused_total: u64,
}

/// Bookkeeping for backend surfaces, keyed by [`SurfaceId`].
///
/// Ids are handed out monotonically and never reused, so a stale id from before a resize
/// can never alias a newer surface.
pub(crate) struct SurfaceRegistry {
    opts: SurfaceRegistryOpts,
    stats: SurfaceStats,
    next_id: u32,
    // Hash lookup is fine here: this is per-pass, not per-texel.
    live: HashMap<SurfaceId, SurfaceDesc>,
}

impl SurfaceRegistry {
    pub(crate) fn new(opts: SurfaceRegistryOpts) -> Self {
        Self {
            opts,
            stats: SurfaceStats::default(),
            next_id: 0,
            live: HashMap::new(),
        }
    }

    pub(crate) fn stats(&self) -> SurfaceStats {
        self.stats
    }

    pub(crate) fn desc(&self, id: SurfaceId) -> Option<SurfaceDesc> {
        self.live.get(&id).copied()
    }

    pub(crate) fn register(&mut self, desc: SurfaceDesc) -> SortResult<SurfaceId> {
        let max = self.opts.max_dimension.min(MAX_EXTENT);
        if desc.width > max || desc.height > max {
            self.stats.refused_total = self.stats.refused_total.saturating_add(1);
            return Err(SortError::allocation(format!(
                "surface {}x{} exceeds the {max} texel ceiling",
                desc.width, desc.height
            )));
        }

        let bytes = desc.byte_len();
        if self.stats.live_bytes.saturating_add(bytes) > self.opts.max_live_bytes {
            self.stats.refused_total = self.stats.refused_total.saturating_add(1);
            return Err(SortError::allocation(format!(
                "surface {}x{} {:?} needs {bytes} bytes, {} of {} already live",
                desc.width,
                desc.height,
                desc.format,
                self.stats.live_bytes,
                self.opts.max_live_bytes
            )));
        }

        let id = SurfaceId(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| SortError::allocation("surface id space exhausted"))?;
        self.live.insert(id, desc);

        self.stats.live_surfaces = self.live.len();
        self.stats.live_bytes = self.stats.live_bytes.saturating_add(bytes);
        self.stats.allocated_total = self.stats.allocated_total.saturating_add(1);
        Ok(id)
    }

    pub(crate) fn release(&mut self, id: SurfaceId) -> SortResult<SurfaceDesc> {
        let desc = self
            .live
            .remove(&id)
            .ok_or_else(|| SortError::validation(format!("release of unknown surface {id:?}")))?;
        self.stats.live_surfaces = self.live.len();
        self.stats.live_bytes = self.stats.live_bytes.saturating_sub(desc.byte_len());
        self.stats.released_total = self.stats.released_total.saturating_add(1);
        Ok(desc)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/surface_registry.rs"]
mod tests;
