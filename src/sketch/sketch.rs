use crate::{error::Result, hashing::Salt, parameters::SparseRows, sketch::SketchSnapshot};

/// A fixed-size hashed summary of per-key running sums.
///
/// Every method takes `&self`: concurrent updates meet only through atomic
/// additions, and `clean` waits for them to drain before scaling.
pub trait Sketch: Send + Sync {
    /// Adds `value` to `(key, lane)` and returns the estimate right after it.
    ///
    /// # Returns
    /// A `LaneOutOfRange` error if `lane` is not below the sketch's depth.
    fn update_retrieve(&self, key: i64, lane: usize, value: f32) -> Result<f32>;

    /// Folds a batch into the sketch as an additive moving average.
    ///
    /// Each value is added scaled by `1 - beta`. The previous value of a bucket
    /// is never read before the addition, so the decay half of the moving
    /// average is left to `clean`.
    ///
    /// # Arguments
    /// * `batch` - One row of `depth` values per key, keys unique.
    /// * `beta` - The moving average coefficient.
    ///
    /// # Returns
    /// The post-update estimates in the batch's shape, or a `SizeMismatch`
    /// error if the batch width isn't the sketch's depth.
    fn update(&self, batch: &SparseRows, beta: f32) -> Result<SparseRows>;

    /// Reads the current estimates for `indices` without modifying the sketch.
    fn estimate(&self, indices: &[i64]) -> SparseRows;

    /// Scales every bucket by `alpha`.
    fn clean(&self, alpha: f32);

    fn snapshot(&self) -> SketchSnapshot;

    /// Hash rows.
    fn rows(&self) -> usize;

    /// Buckets per hash row.
    fn range(&self) -> usize;

    /// Lanes per bucket.
    fn depth(&self) -> usize;

    fn salts(&self) -> &[Salt];
}
