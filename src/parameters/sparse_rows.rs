use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{OptimizerErr, Result};

/// A row-sparse view over a `rows × width` table.
///
/// Each key in `indices` names one table row and owns `width` consecutive
/// entries of `values`. This is both the shape of a sparse gradient and the
/// shape every sketch returns its estimates in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseRows {
    rows: usize,
    width: usize,
    indices: Vec<i64>,
    values: Vec<f32>,
}

impl SparseRows {
    /// Creates a new `SparseRows`.
    ///
    /// # Arguments
    /// * `rows` - The amount of rows of the dense table this batch addresses.
    /// * `width` - The amount of values per key.
    /// * `indices` - The row keys, one per `width` values.
    /// * `values` - The row-major values.
    ///
    /// # Returns
    /// A `SizeMismatch` error if `values` doesn't hold exactly `width` values per key.
    pub fn new(rows: usize, width: usize, indices: Vec<i64>, values: Vec<f32>) -> Result<Self> {
        let expected = indices.len() * width;
        if values.len() != expected {
            return Err(OptimizerErr::SizeMismatch {
                expected,
                got: values.len(),
            });
        }

        Ok(Self {
            rows,
            width,
            indices,
            values,
        })
    }

    /// Creates a batch of zeroed rows for `indices`.
    pub fn zeros(rows: usize, width: usize, indices: Vec<i64>) -> Self {
        let values = vec![0.; indices.len() * width];
        Self {
            rows,
            width,
            indices,
            values,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn indices(&self) -> &[i64] {
        &self.indices
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    /// The amount of keys in the batch.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Iterates over `(key, row values)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &[f32])> {
        self.indices
            .iter()
            .copied()
            .zip(self.values.chunks(self.width.max(1)))
    }

    /// Returns a batch with the same keys and `f` applied to every value.
    pub fn map_values<F>(&self, f: F) -> Self
    where
        F: Fn(f32) -> f32,
    {
        Self {
            rows: self.rows,
            width: self.width,
            indices: self.indices.clone(),
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Checks that every key lies in `[0, rows)`.
    ///
    /// # Returns
    /// A `KeyOutOfRange` error naming the first offending key.
    pub fn check_keys(&self) -> Result<()> {
        match self
            .indices
            .iter()
            .find(|&&key| key < 0 || key as u64 >= self.rows as u64)
        {
            Some(&key) => Err(OptimizerErr::KeyOutOfRange {
                key,
                rows: self.rows,
            }),
            None => Ok(()),
        }
    }

    /// Whether every key appears at most once.
    pub fn is_coalesced(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.indices.len());
        self.indices.iter().all(|key| seen.insert(*key))
    }

    /// Sums the rows of duplicated keys and sorts the keys.
    ///
    /// The sparse update is non-linear in repeated keys, so callers holding a
    /// gradient built by scattering must coalesce it before stepping.
    pub fn coalesce(&self) -> Self {
        let mut merged: BTreeMap<i64, Vec<f32>> = BTreeMap::new();
        for (key, row) in self.iter() {
            let acc = merged.entry(key).or_insert_with(|| vec![0.; self.width]);
            acc.iter_mut().zip(row).for_each(|(a, v)| *a += v);
        }

        let indices = merged.keys().copied().collect();
        let values = merged.into_values().flatten().collect();
        Self {
            rows: self.rows,
            width: self.width,
            indices,
            values,
        }
    }
}
