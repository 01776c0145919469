use std::sync::atomic::Ordering;

use atomic_float::AtomicF32;
use parking_lot::RwLock;
use rayon::prelude::*;

use crate::{
    error::{OptimizerErr, Result},
    hashing::{self, Salt},
    parameters::SparseRows,
    sketch::{SketchKind, SketchSnapshot},
};

/// Whether a row's contribution is multiplied by the key's pseudo-random sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Polarity {
    Unsigned,
    Signed,
}

/// The storage shared by every sketch.
///
/// Updates hold the read side of the lock and race on the cells through
/// `fetch_add`; decay holds the write side, so an update never observes a
/// partially scaled table.
#[derive(Debug)]
pub(super) struct HashedTable {
    keys: usize,
    rows: usize,
    range: usize,
    depth: usize,
    salts: Box<[Salt]>,
    cells: RwLock<Box<[AtomicF32]>>,
}

impl HashedTable {
    /// Creates a new zeroed `HashedTable`.
    ///
    /// # Arguments
    /// * `keys` - The amount of rows of the table being summarized.
    /// * `range` - Buckets per hash row.
    /// * `depth` - Lanes per bucket.
    /// * `salts` - One salt per hash row.
    pub fn new(keys: usize, range: usize, depth: usize, salts: Vec<Salt>) -> Result<Self> {
        if depth == 0 {
            return Err(OptimizerErr::InvalidDepth);
        }

        let cells = capacity(salts.len(), range, depth)?;
        Ok(Self {
            keys,
            rows: salts.len(),
            range,
            depth,
            salts: salts.into_boxed_slice(),
            cells: RwLock::new((0..cells).map(|_| AtomicF32::new(0.)).collect()),
        })
    }

    /// Rebuilds a table from a snapshot after checking its layout.
    pub fn restore(snapshot: SketchSnapshot) -> Result<Self> {
        let SketchSnapshot {
            keys,
            rows,
            range,
            depth,
            salts,
            cells,
            ..
        } = snapshot;

        if depth == 0 {
            return Err(OptimizerErr::InvalidDepth);
        }
        if rows == 0 || range == 0 {
            return Err(OptimizerErr::InvalidSnapshot(format!(
                "empty layout: {rows} rows of {range} buckets"
            )));
        }
        if salts.len() != rows {
            return Err(OptimizerErr::InvalidSnapshot(format!(
                "expected {rows} salts, got {}",
                salts.len()
            )));
        }
        let expected = capacity(rows, range, depth)?;
        if cells.len() != expected {
            return Err(OptimizerErr::InvalidSnapshot(format!(
                "expected {expected} cells, got {}",
                cells.len()
            )));
        }

        Ok(Self {
            keys,
            rows,
            range,
            depth,
            salts: salts.into_boxed_slice(),
            cells: RwLock::new(cells.into_iter().map(AtomicF32::new).collect()),
        })
    }

    #[cfg(test)]
    pub fn keys(&self) -> usize {
        self.keys
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn range(&self) -> usize {
        self.range
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn salts(&self) -> &[Salt] {
        &self.salts
    }

    /// The first cell of `key`'s bucket in hash row `row` and the sign it uses there.
    #[inline]
    fn slot(&self, row: usize, key: i64, polarity: Polarity) -> (usize, f32) {
        let salt = self.salts[row];
        let bucket = hashing::bucket(key, salt, self.range);
        let sign = match polarity {
            Polarity::Unsigned => 1.,
            Polarity::Signed => hashing::sign(key, salt),
        };
        ((row * self.range + bucket) * self.depth, sign)
    }

    fn check_lane(&self, lane: usize) -> Result<()> {
        if lane >= self.depth {
            return Err(OptimizerErr::LaneOutOfRange {
                lane,
                depth: self.depth,
            });
        }
        Ok(())
    }

    fn check_batch(&self, batch: &SparseRows) -> Result<()> {
        if batch.width() != self.depth {
            return Err(OptimizerErr::SizeMismatch {
                expected: self.depth,
                got: batch.width(),
            });
        }
        Ok(())
    }

    /// Adds `value` into every hash row of `(key, lane)` and combines the
    /// post-add row values.
    pub fn update_retrieve<F>(
        &self,
        key: i64,
        lane: usize,
        value: f32,
        polarity: Polarity,
        combine: F,
    ) -> Result<f32>
    where
        F: Fn(&mut [f32]) -> f32,
    {
        self.check_lane(lane)?;

        let guard = self.cells.read();
        let cells: &[AtomicF32] = &guard;
        let mut rows: Vec<f32> = (0..self.rows)
            .map(|row| {
                let (slot, sign) = self.slot(row, key, polarity);
                let delta = sign * value;
                sign * (cells[slot + lane].fetch_add(delta, Ordering::Relaxed) + delta)
            })
            .collect();

        Ok(combine(&mut rows))
    }

    /// Fused hash, accumulate and retrieve over a whole batch.
    ///
    /// One work item per batch row; the lanes of a row never overlap, distinct
    /// keys may share a bucket and meet only through the atomic addition.
    ///
    /// # Arguments
    /// * `batch` - The keys and values to add, `depth` values per key.
    /// * `scale` - Factor applied to every value before it's added.
    /// * `polarity` - Whether rows are signed.
    /// * `combine` - Reduces the per-row post-add values of one `(key, lane)`.
    ///
    /// # Returns
    /// The combined estimates in the batch's shape.
    pub fn accumulate<F>(
        &self,
        batch: &SparseRows,
        scale: f32,
        polarity: Polarity,
        combine: F,
    ) -> Result<SparseRows>
    where
        F: Fn(&mut [f32]) -> f32 + Sync,
    {
        self.check_batch(batch)?;

        let mut out = SparseRows::zeros(batch.rows(), self.depth, batch.indices().to_vec());
        let guard = self.cells.read();
        let cells: &[AtomicF32] = &guard;

        out.values_mut()
            .par_chunks_mut(self.depth)
            .zip(batch.values().par_chunks(self.depth))
            .zip(batch.indices().par_iter())
            .for_each_init(
                || {
                    (
                        Vec::<(usize, f32)>::with_capacity(self.rows),
                        Vec::<f32>::with_capacity(self.rows),
                    )
                },
                |(slots, scratch), ((out_row, values), &key)| {
                    slots.clear();
                    slots.extend((0..self.rows).map(|row| self.slot(row, key, polarity)));

                    for (lane, (out, &value)) in out_row.iter_mut().zip(values).enumerate() {
                        scratch.clear();
                        scratch.extend(slots.iter().map(|&(slot, sign)| {
                            let delta = sign * scale * value;
                            sign * (cells[slot + lane].fetch_add(delta, Ordering::Relaxed) + delta)
                        }));
                        *out = combine(scratch);
                    }
                },
            );

        Ok(out)
    }

    /// Reads the combined estimates for `indices` without writing.
    pub fn query<F>(&self, indices: &[i64], polarity: Polarity, combine: F) -> SparseRows
    where
        F: Fn(&mut [f32]) -> f32 + Sync,
    {
        let mut out = SparseRows::zeros(self.keys, self.depth, indices.to_vec());
        let guard = self.cells.read();
        let cells: &[AtomicF32] = &guard;

        out.values_mut()
            .par_chunks_mut(self.depth)
            .zip(indices.par_iter())
            .for_each_init(
                || Vec::<f32>::with_capacity(self.rows),
                |scratch, (out_row, &key)| {
                    for (lane, out) in out_row.iter_mut().enumerate() {
                        scratch.clear();
                        scratch.extend((0..self.rows).map(|row| {
                            let (slot, sign) = self.slot(row, key, polarity);
                            sign * cells[slot + lane].load(Ordering::Relaxed)
                        }));
                        *out = combine(scratch);
                    }
                },
            );

        out
    }

    /// Multiplies every cell by `alpha` while holding the table exclusively.
    pub fn scale(&self, alpha: f32) {
        let guard = self.cells.write();
        let cells: &[AtomicF32] = &guard;
        cells.par_iter().for_each(|cell| {
            let value = cell.load(Ordering::Relaxed);
            cell.store(value * alpha, Ordering::Relaxed);
        });
    }

    /// Copies the layout and the cells out while holding the table exclusively.
    pub fn snapshot(&self, kind: SketchKind) -> SketchSnapshot {
        let guard = self.cells.write();
        SketchSnapshot {
            kind,
            keys: self.keys,
            rows: self.rows,
            range: self.range,
            depth: self.depth,
            salts: self.salts.to_vec(),
            cells: guard.iter().map(|cell| cell.load(Ordering::Relaxed)).collect(),
        }
    }
}

/// The amount of cells of a `rows × range × depth` table.
fn capacity(rows: usize, range: usize, depth: usize) -> Result<usize> {
    rows.checked_mul(range)
        .and_then(|cells| cells.checked_mul(depth))
        .ok_or(OptimizerErr::CapacityOverflow { rows, range, depth })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::SaltSource;

    fn table(range: usize, depth: usize) -> HashedTable {
        HashedTable::new(100, range, depth, SaltSource::Reference.salts(3)).unwrap()
    }

    #[test]
    fn rejects_zero_depth() {
        let err = HashedTable::new(100, 4, 0, SaltSource::Reference.salts(3)).unwrap_err();
        assert_eq!(err, OptimizerErr::InvalidDepth);
    }

    #[test]
    fn rejects_overflowing_layouts() {
        let err = HashedTable::new(100, usize::MAX / 2, 4, SaltSource::Reference.salts(3));
        assert!(matches!(err, Err(OptimizerErr::CapacityOverflow { depth: 4, .. })));

        let mut snapshot = table(4, 1).snapshot(SketchKind::CountSketch);
        snapshot.range = usize::MAX;
        assert!(matches!(
            HashedTable::restore(snapshot),
            Err(OptimizerErr::CapacityOverflow { .. })
        ));
    }

    #[test]
    fn update_retrieve_reads_its_own_addition() {
        let table = table(8, 2);
        let first = table
            .update_retrieve(5, 1, 2., Polarity::Unsigned, |rows| rows[0])
            .unwrap();
        let second = table
            .update_retrieve(5, 1, 3., Polarity::Unsigned, |rows| rows[0])
            .unwrap();
        assert_eq!(first, 2.);
        assert_eq!(second, 5.);
    }

    #[test]
    fn update_retrieve_checks_the_lane() {
        let table = table(8, 2);
        let err = table
            .update_retrieve(5, 2, 1., Polarity::Unsigned, |rows| rows[0])
            .unwrap_err();
        assert_eq!(err, OptimizerErr::LaneOutOfRange { lane: 2, depth: 2 });
    }

    #[test]
    fn signed_rows_read_back_the_signed_value() {
        let table = table(8, 1);
        let rows = table
            .update_retrieve(11, 0, -1.5, Polarity::Signed, |rows| rows.iter().sum())
            .unwrap();
        assert_eq!(rows, -4.5);
    }

    #[test]
    fn accumulate_rejects_wrong_width() {
        let table = table(8, 2);
        let batch = SparseRows::zeros(100, 3, vec![1]);
        assert!(table.accumulate(&batch, 1., Polarity::Unsigned, |r| r[0]).is_err());
    }

    #[test]
    fn scale_multiplies_every_cell() {
        let table = table(4, 1);
        let batch = SparseRows::new(100, 1, vec![0, 1, 2], vec![4., 8., 12.]).unwrap();
        table.accumulate(&batch, 1., Polarity::Unsigned, |r| r[0]).unwrap();

        let before = table.snapshot(SketchKind::CountMin).cells;
        table.scale(0.5);
        let after = table.snapshot(SketchKind::CountMin).cells;

        for (b, a) in before.iter().zip(&after) {
            assert_eq!(*a, b * 0.5);
        }
    }

    #[test]
    fn restore_rejects_truncated_cells() {
        let table = table(4, 2);
        let mut snapshot = table.snapshot(SketchKind::CountMin);
        snapshot.cells.pop();
        assert!(matches!(
            HashedTable::restore(snapshot),
            Err(OptimizerErr::InvalidSnapshot(_))
        ));
    }
}
