use crate::foundation::error::{SortError, SortResult};

/// Largest supported surface dimension.
///
/// Row indices travel through the network in 16-bit texels, so `H_pad = 2^16` is the ceiling.
pub const MAX_EXTENT: u32 = 1 << 16;

/// Default activity threshold on the weighted luminance scale.
pub const DEFAULT_THRESHOLD: f32 = 0.1;

/// Per-channel luminance weights (R, G, B).
pub const LUMA_WEIGHTS: [f32; 3] = [0.25, 0.40, 0.35];

/// Brightness-to-key quantization factor (13 bits of resolution).
pub const KEY_SCALE: f32 = 8192.0;

/// Straight-alpha RGBA8 texel.
pub type Rgba8 = [u8; 4];

/// One element of the sort lane: quantized brightness plus the row the texel came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct KeyIndex {
    /// Sort key, `round(luminance * KEY_SCALE)`.
    pub key: u16,
    /// Original row of the texel this key was derived from.
    pub row: u16,
}

/// Surface dimensions in texels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Extent {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
}

impl Extent {
    /// Create a validated extent with both dimensions `<= MAX_EXTENT`.
    pub fn new(width: u32, height: u32) -> SortResult<Self> {
        if width > MAX_EXTENT || height > MAX_EXTENT {
            return Err(SortError::validation(format!(
                "extent {width}x{height} exceeds the {MAX_EXTENT} texel ceiling"
            )));
        }
        Ok(Self { width, height })
    }

    /// Total number of texels.
    pub fn texel_count(self) -> usize {
        (self.width as usize).saturating_mul(self.height as usize)
    }

    /// Return `true` when the extent holds no texels.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Height rounded up to the next power of two (the virtual network size).
    pub fn padded_height(self) -> u32 {
        self.height.max(1).next_power_of_two()
    }

    /// Number of bitonic merge passes, `ceil(log2(height))`.
    ///
    /// Heights 0 and 1 need no passes.
    pub fn sort_pass_count(self) -> u32 {
        if self.height <= 1 {
            return 0;
        }
        u32::BITS - (self.height - 1).leading_zeros()
    }

    /// Total compare-exchange sub-passes, `N * (N + 1) / 2`.
    pub fn sort_sub_pass_count(self) -> u32 {
        let n = self.sort_pass_count();
        n * (n + 1) / 2
    }
}

/// External notification that the output surface changed size.
///
/// Delivered into [`crate::SortSession::render_frame`] before the frame that must observe it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResizeEvent {
    /// New output width.
    pub width: u32,
    /// New output height.
    pub height: u32,
}

impl ResizeEvent {
    /// Validated extent carried by this event.
    pub fn extent(self) -> SortResult<Extent> {
        Extent::new(self.width, self.height)
    }
}

/// Weighted luminance of a straight-alpha RGBA8 texel, in `[0, 1]`.
///
/// Alpha does not participate.
pub fn luminance(px: Rgba8) -> f32 {
    let r = f32::from(px[0]) / 255.0;
    let g = f32::from(px[1]) / 255.0;
    let b = f32::from(px[2]) / 255.0;
    r * LUMA_WEIGHTS[0] + g * LUMA_WEIGHTS[1] + b * LUMA_WEIGHTS[2]
}

/// Quantize a luminance value into an unsigned sort key.
pub fn quantize_key(luminance: f32) -> u16 {
    (luminance.clamp(0.0, 1.0) * KEY_SCALE).round() as u16
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
