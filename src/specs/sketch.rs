use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::{
    error::{OptimizerErr, Result},
    hashing::SaltSource,
    specs::AdamSpec,
};

const CLEAN_INTERVAL: NonZeroU64 = NonZeroU64::new(1000).unwrap();
const DIAGNOSTIC_INTERVAL: NonZeroU64 = NonZeroU64::new(125).unwrap();

/// Sizing and scheduling of the sketches backing a sparse parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchSpec {
    /// Share of the table's rows the sketch spends, split across the hash rows.
    pub size_fraction: f32,
    /// The amount of hash rows.
    pub rows: usize,
    pub salts: SaltSource,
    /// Steps between two decays of the second moment sketch.
    pub clean_interval: NonZeroU64,
    /// Factor the second moment sketch is scaled by on each decay.
    pub clean_alpha: f32,
    /// Keep exact per-key shadows and report the sketch error.
    ///
    /// On by default. The shadows are two dense `rows × width` tables per
    /// sparse parameter, so enabling this gives up the memory the sketches
    /// save. Turn it off outside of tuning runs.
    pub diagnostics: bool,
    /// Steps between two diagnostic reports.
    pub diagnostic_interval: NonZeroU64,
}

impl Default for SketchSpec {
    fn default() -> Self {
        Self {
            size_fraction: 0.2,
            rows: 3,
            salts: SaltSource::Reference,
            clean_interval: CLEAN_INTERVAL,
            clean_alpha: 0.25,
            diagnostics: true,
            diagnostic_interval: DIAGNOSTIC_INTERVAL,
        }
    }
}

impl SketchSpec {
    /// Checks the size fraction lies in `[0, 1]` and the decay factor in `[0, 1)`.
    pub fn validate(&self) -> Result<()> {
        check_size_fraction(self.size_fraction)?;
        if !(0. ..1.).contains(&self.clean_alpha) {
            return Err(OptimizerErr::InvalidDecay(self.clean_alpha));
        }

        Ok(())
    }

    /// The amount of hash rows, never less than one.
    pub fn hash_rows(&self) -> usize {
        self.rows.max(1)
    }

    /// The amount of buckets per hash row for a table of `keys` rows.
    ///
    /// `floor(keys * size_fraction / rows)`, clamped to at least one bucket.
    pub fn range(&self, keys: usize) -> usize {
        let range = keys as f64 * self.size_fraction as f64 / self.hash_rows() as f64;
        (range as usize).max(1)
    }
}

/// Fails with `InvalidSizeFraction` unless `fraction` lies in `[0, 1]`.
pub(crate) fn check_size_fraction(fraction: f32) -> Result<()> {
    if !(0. ..=1.).contains(&fraction) {
        return Err(OptimizerErr::InvalidSizeFraction(fraction));
    }

    Ok(())
}

/// How a parameter receiving dense gradients stores its second moment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxSpec {
    /// Exact per-coordinate Adam moments.
    #[default]
    Exact,
    /// A `DenseHashCompressor` with `floor(width * size_fraction)` buckets per row.
    Hashed { size_fraction: f32 },
}

/// Everything a parameter group shares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGroupSpec {
    pub adam: AdamSpec,
    pub sketch: SketchSpec,
    pub aux: AuxSpec,
}

impl AuxSpec {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Exact => Ok(()),
            Self::Hashed { size_fraction } => check_size_fraction(size_fraction),
        }
    }
}

impl ParamGroupSpec {
    pub fn validate(&self) -> Result<()> {
        self.adam.validate()?;
        self.sketch.validate()?;
        self.aux.validate()
    }
}
