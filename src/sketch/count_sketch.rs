use log::debug;

use super::{
    Sketch, SketchKind, SketchSnapshot,
    table::{HashedTable, Polarity},
};
use crate::{
    error::{OptimizerErr, Result},
    hashing::Salt,
    parameters::SparseRows,
    specs::SketchSpec,
};

/// Count sketch over signed running sums.
///
/// Each hash row adds `sign(key, row) * value` to the key's bucket and reads
/// the bucket back multiplied by the same sign. Colliding keys contribute
/// zero-mean noise, and the median across rows discards the noisiest rows,
/// so the estimate is unbiased and may be negative.
#[derive(Debug)]
pub struct CountSketch {
    table: HashedTable,
}

impl CountSketch {
    /// Creates a new `CountSketch`.
    ///
    /// # Arguments
    /// * `keys` - The amount of rows of the table being summarized.
    /// * `depth` - Lanes per key.
    /// * `spec` - Hash rows, size fraction and salt source.
    ///
    /// # Returns
    /// An `InvalidDepth` error if `depth` is zero.
    pub fn new(keys: usize, depth: usize, spec: &SketchSpec) -> Result<Self> {
        spec.validate()?;
        let rows = spec.hash_rows();
        let range = spec.range(keys);
        let table = HashedTable::new(keys, range, depth, spec.salts.salts(rows))?;
        debug!(keys = keys, rows = rows, range = range, depth = depth; "created count sketch");
        Ok(Self { table })
    }

    /// Restores a sketch from a `CountSketch` snapshot.
    pub fn from_snapshot(snapshot: SketchSnapshot) -> Result<Self> {
        if snapshot.kind != SketchKind::CountSketch {
            return Err(OptimizerErr::InvalidSnapshot(format!(
                "expected a count sketch snapshot, got {:?}",
                snapshot.kind
            )));
        }

        Ok(Self {
            table: HashedTable::restore(snapshot)?,
        })
    }
}

/// Median of the per-row estimates.
///
/// With an even amount of rows the two middle values are averaged.
pub(crate) fn median(rows: &mut [f32]) -> f32 {
    rows.sort_unstable_by(f32::total_cmp);

    let mid = rows.len() / 2;
    if rows.len() % 2 == 1 {
        rows[mid]
    } else {
        (rows[mid - 1] + rows[mid]) / 2.
    }
}

impl Sketch for CountSketch {
    fn update_retrieve(&self, key: i64, lane: usize, value: f32) -> Result<f32> {
        self.table.update_retrieve(key, lane, value, Polarity::Signed, median)
    }

    fn update(&self, batch: &SparseRows, beta: f32) -> Result<SparseRows> {
        self.table
            .accumulate(batch, 1. - beta, Polarity::Signed, median)
    }

    fn estimate(&self, indices: &[i64]) -> SparseRows {
        self.table.query(indices, Polarity::Signed, median)
    }

    fn clean(&self, alpha: f32) {
        self.table.scale(alpha);
    }

    fn snapshot(&self) -> SketchSnapshot {
        self.table.snapshot(SketchKind::CountSketch)
    }

    fn rows(&self) -> usize {
        self.table.rows()
    }

    fn range(&self) -> usize {
        self.table.range()
    }

    fn depth(&self) -> usize {
        self.table.depth()
    }

    fn salts(&self) -> &[Salt] {
        self.table.salts()
    }
}
