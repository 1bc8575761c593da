use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::foundation::core::DEFAULT_THRESHOLD;
use crate::foundation::error::{SortError, SortResult};

/// Order in which each run is arranged top-to-bottom.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Darkest key at the top of the run.
    #[default]
    Ascending,
    /// Brightest key at the top of the run.
    Descending,
}

impl SortDirection {
    /// Encode a sort-network bit position into the signed step uniform.
    ///
    /// The sign carries the direction; the magnitude is `step + 1` so step 0 still has a sign.
    pub fn encode_step(self, step: u32) -> i32 {
        let magnitude = step as i32 + 1;
        match self {
            Self::Ascending => magnitude,
            Self::Descending => -magnitude,
        }
    }

    /// Inverse of [`SortDirection::encode_step`]. Returns `None` for the invalid value 0.
    pub fn decode_step(encoded: i32) -> Option<(u32, Self)> {
        match encoded {
            0 => None,
            e if e > 0 => Some(((e - 1) as u32, Self::Ascending)),
            e => Some(((-e - 1) as u32, Self::Descending)),
        }
    }
}

/// Pipeline options, fixed for the lifetime of a [`crate::SortSession`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SortOpts {
    /// Texels with weighted luminance strictly above this value take part in sorting.
    pub threshold: f32,
    /// Ordering applied inside every run.
    pub direction: SortDirection,
    /// Resample a differently-sized source into the output extent. When `false`, a size
    /// mismatch is a validation error.
    pub resample: bool,
}

impl Default for SortOpts {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            direction: SortDirection::Ascending,
            resample: true,
        }
    }
}

impl SortOpts {
    /// Parse options from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> SortResult<Self> {
        let opts: Self = serde_json::from_reader(r)
            .map_err(|e| SortError::serde(format!("parse sort options JSON: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    /// Parse options from a JSON string.
    pub fn from_json_str(s: &str) -> SortResult<Self> {
        Self::from_reader(s.as_bytes())
    }

    /// Parse options from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> SortResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            SortError::validation(format!("open sort options '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Reject thresholds that cannot be compared against `[0, 1]` luminance.
    pub fn validate(&self) -> SortResult<()> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(SortError::validation(format!(
                "threshold must be a finite value in [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
