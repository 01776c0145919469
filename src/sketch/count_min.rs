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

/// Count-Min sketch over non-negative running sums.
///
/// The estimate of a `(key, lane)` is the minimum over its hash rows. Other
/// keys can only add to a shared bucket, so the estimate never falls below
/// the key's own accumulation and equals it when nothing else collided.
#[derive(Debug)]
pub struct CountMinSketch {
    table: HashedTable,
}

impl CountMinSketch {
    /// Creates a new `CountMinSketch`.
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
        debug!(keys = keys, rows = rows, range = range, depth = depth; "created count-min sketch");
        Ok(Self { table })
    }

    /// Restores a sketch from a `CountMin` snapshot.
    pub fn from_snapshot(snapshot: SketchSnapshot) -> Result<Self> {
        if snapshot.kind != SketchKind::CountMin {
            return Err(OptimizerErr::InvalidSnapshot(format!(
                "expected a count-min snapshot, got {:?}",
                snapshot.kind
            )));
        }

        Ok(Self {
            table: HashedTable::restore(snapshot)?,
        })
    }
}

fn minimum(rows: &mut [f32]) -> f32 {
    rows.iter().copied().fold(f32::INFINITY, f32::min)
}

impl Sketch for CountMinSketch {
    fn update_retrieve(&self, key: i64, lane: usize, value: f32) -> Result<f32> {
        self.table.update_retrieve(key, lane, value, Polarity::Unsigned, minimum)
    }

    fn update(&self, batch: &SparseRows, beta: f32) -> Result<SparseRows> {
        self.table
            .accumulate(batch, 1. - beta, Polarity::Unsigned, minimum)
    }

    fn estimate(&self, indices: &[i64]) -> SparseRows {
        self.table.query(indices, Polarity::Unsigned, minimum)
    }

    fn clean(&self, alpha: f32) {
        self.table.scale(alpha);
    }

    fn snapshot(&self) -> SketchSnapshot {
        self.table.snapshot(SketchKind::CountMin)
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
