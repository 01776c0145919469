use std::sync::atomic::Ordering;

use atomic_float::AtomicF32;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::{OptimizerErr, Result},
    hashing::{self, Salt},
    specs::check_size_fraction,
};

const DEFAULT_EPS: f32 = 1e-10;

/// The update kernel a compressor routes to, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kernel {
    /// One bucket per coordinate: a plain per-coordinate adaptive update.
    Direct,
    /// Coordinates share buckets through the stage, update and commit phases.
    Hashed,
}

/// The persistable state of a `DenseHashCompressor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressorSnapshot {
    pub rows: usize,
    pub width: usize,
    pub range: usize,
    pub salt: Salt,
    pub eps: f32,
    pub aux: Vec<f32>,
}

/// A per-row auxiliary buffer of `range` buckets shared by `width` coordinates.
///
/// Every row of the parameter hashes its coordinates into its own `range`
/// buckets, so coordinates sharing a bucket share one adaptive learning rate.
#[derive(Debug, Clone)]
pub struct DenseHashCompressor {
    rows: usize,
    width: usize,
    range: usize,
    salt: Salt,
    eps: f32,
    kernel: Kernel,
    aux: Box<[f32]>,
}

impl DenseHashCompressor {
    /// Creates a new `DenseHashCompressor`.
    ///
    /// # Arguments
    /// * `rows` - The amount of parameter rows.
    /// * `width` - The amount of coordinates per row.
    /// * `size_fraction` - Buckets per row relative to `width`, at least one bucket.
    ///
    /// # Returns
    /// An `InvalidDepth` error if `width` is zero, or `InvalidSizeFraction` if
    /// `size_fraction` lies outside `[0, 1]`.
    pub fn new(rows: usize, width: usize, size_fraction: f32) -> Result<Self> {
        if width == 0 {
            return Err(OptimizerErr::InvalidDepth);
        }
        check_size_fraction(size_fraction)?;

        let range = ((width as f64 * size_fraction as f64) as usize).clamp(1, width);
        debug!(rows = rows, width = width, range = range; "created dense hash compressor");

        Ok(Self {
            rows,
            width,
            range,
            salt: Salt::REFERENCE[0],
            eps: DEFAULT_EPS,
            kernel: Self::route(range, width),
            aux: vec![0.; rows * range].into_boxed_slice(),
        })
    }

    /// Replaces the stabilizing term added under the square root.
    pub fn with_eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }

    /// Restores a compressor after checking the snapshot's layout.
    pub fn from_snapshot(snapshot: CompressorSnapshot) -> Result<Self> {
        let CompressorSnapshot {
            rows,
            width,
            range,
            salt,
            eps,
            aux,
        } = snapshot;

        if width == 0 {
            return Err(OptimizerErr::InvalidDepth);
        }
        if range == 0 || range > width {
            return Err(OptimizerErr::InvalidSnapshot(format!(
                "range {range} outside [1, {width}]"
            )));
        }
        if aux.len() != rows * range {
            return Err(OptimizerErr::InvalidSnapshot(format!(
                "expected {} auxiliary values, got {}",
                rows * range,
                aux.len()
            )));
        }

        Ok(Self {
            rows,
            width,
            range,
            salt,
            eps,
            kernel: Self::route(range, width),
            aux: aux.into_boxed_slice(),
        })
    }

    fn route(range: usize, width: usize) -> Kernel {
        if range == width {
            Kernel::Direct
        } else {
            Kernel::Hashed
        }
    }

    pub fn snapshot(&self) -> CompressorSnapshot {
        CompressorSnapshot {
            rows: self.rows,
            width: self.width,
            range: self.range,
            salt: self.salt,
            eps: self.eps,
            aux: self.aux.to_vec(),
        }
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Buckets per row.
    pub fn range(&self) -> usize {
        self.range
    }

    /// The auxiliary buffer, `rows × range` row-major.
    pub fn aux(&self) -> &[f32] {
        &self.aux
    }

    /// The bucket coordinate `col` of row `row` maps to.
    pub fn bucket(&self, row: usize, col: usize) -> usize {
        match self.kernel {
            Kernel::Direct => col,
            Kernel::Hashed => {
                hashing::bucket((row * self.width + col) as i64, self.salt, self.range)
            }
        }
    }

    /// Scales every bucket by `alpha`.
    pub fn clean(&mut self, alpha: f32) {
        self.aux.par_iter_mut().for_each(|v| *v *= alpha);
    }

    /// Applies one adaptive step to `params` and folds `grad²` into the buckets.
    ///
    /// Every coordinate moves by `-lr * g / sqrt(v + eps)` where
    /// `v = beta * old + (1 - beta) * g²` and `old` is its bucket's value at
    /// the start of the step.
    ///
    /// # Arguments
    /// * `params` - The `rows × width` parameter, updated in place.
    /// * `grad` - The dense gradient of `params`.
    /// * `lr` - The learning rate.
    /// * `beta` - The moving average coefficient of the buckets.
    ///
    /// # Returns
    /// A `SizeMismatch` error if either slice isn't `rows × width`.
    pub fn update(&mut self, params: &mut [f32], grad: &[f32], lr: f32, beta: f32) -> Result<()> {
        let expected = self.rows * self.width;
        for got in [params.len(), grad.len()] {
            if got != expected {
                return Err(OptimizerErr::SizeMismatch { expected, got });
            }
        }

        match self.kernel {
            Kernel::Direct => self.direct_update(params, grad, lr, beta),
            Kernel::Hashed => self.hashed_update(params, grad, lr, beta),
        }

        Ok(())
    }

    fn direct_update(&mut self, params: &mut [f32], grad: &[f32], lr: f32, beta: f32) {
        let eps = self.eps;

        params
            .par_chunks_mut(self.width)
            .zip(grad.par_chunks(self.width))
            .zip(self.aux.par_chunks_mut(self.width))
            .for_each(|((p_row, g_row), aux_row)| {
                p_row
                    .iter_mut()
                    .zip(g_row)
                    .zip(aux_row.iter_mut())
                    .for_each(|((p, &g), v)| {
                        *v = beta * *v + (1. - beta) * g * g;
                        *p -= lr * g / (*v + eps).sqrt();
                    });
            });
    }

    fn hashed_update(&mut self, params: &mut [f32], grad: &[f32], lr: f32, beta: f32) {
        let Self {
            width,
            range,
            salt,
            eps,
            ..
        } = *self;

        params
            .par_chunks_mut(width)
            .zip(grad.par_chunks(width))
            .zip(self.aux.par_chunks_mut(range))
            .enumerate()
            .for_each(|(row, ((p_row, g_row), aux_row))| {
                // Stage: every coordinate reads the bucket values of the previous step.
                let staged = aux_row.to_vec();
                let acc: Vec<AtomicF32> = (0..range).map(|_| AtomicF32::new(0.)).collect();
                let offset = row * width;

                // Update: the parameter has no collisions, only `acc` is shared.
                p_row
                    .par_iter_mut()
                    .zip(g_row.par_iter())
                    .enumerate()
                    .for_each(|(col, (p, &g))| {
                        let value = g * g;
                        let bucket = hashing::bucket((offset + col) as i64, salt, range);
                        let v = beta * staged[bucket] + (1. - beta) * value;
                        *p -= lr * g / (v + eps).sqrt();
                        acc[bucket].fetch_add(value, Ordering::Relaxed);
                    });

                // Commit: one increment per bucket.
                aux_row
                    .iter_mut()
                    .zip(&staged)
                    .zip(&acc)
                    .for_each(|((v, &old), sum)| {
                        *v += (1. - beta) * (sum.load(Ordering::Relaxed) - old);
                    });
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_by_range() {
        let direct = DenseHashCompressor::new(4, 8, 1.).unwrap();
        assert_eq!(direct.kernel(), Kernel::Direct);
        assert_eq!(direct.aux().len(), 32);

        let hashed = DenseHashCompressor::new(4, 8, 0.25).unwrap();
        assert_eq!(hashed.kernel(), Kernel::Hashed);
        assert_eq!(hashed.range(), 2);
        assert_eq!(hashed.aux().len(), 8);

        let clamped = DenseHashCompressor::new(4, 8, 0.01).unwrap();
        assert_eq!(clamped.range(), 1);
    }

    #[test]
    fn rejects_zero_width_and_bad_fractions() {
        assert_eq!(
            DenseHashCompressor::new(4, 0, 0.2).unwrap_err(),
            OptimizerErr::InvalidDepth
        );
        assert_eq!(
            DenseHashCompressor::new(4, 8, 1.5).unwrap_err(),
            OptimizerErr::InvalidSizeFraction(1.5)
        );
    }

    #[test]
    fn rejects_mismatched_buffers() {
        let mut compressor = DenseHashCompressor::new(2, 4, 0.5).unwrap();
        let mut params = vec![0.; 8];
        let err = compressor.update(&mut params, &[0.; 7], 0.1, 0.9).unwrap_err();
        assert_eq!(err, OptimizerErr::SizeMismatch { expected: 8, got: 7 });
    }

    #[test]
    fn direct_kernel_is_a_per_coordinate_moving_average() {
        const BETA: f32 = 0.9;
        const G: f32 = 0.5;

        let mut compressor = DenseHashCompressor::new(1, 3, 1.).unwrap();
        let mut params = vec![0.; 3];
        let grad = vec![G; 3];

        compressor.update(&mut params, &grad, 0.1, BETA).unwrap();
        let v1 = compressor.aux()[0];
        assert!((v1 - (1. - BETA) * G * G).abs() < 1e-7);

        compressor.update(&mut params, &grad, 0.1, BETA).unwrap();
        let v2 = compressor.aux()[0];
        assert!((v2 - (BETA * v1 + (1. - BETA) * G * G)).abs() < 1e-7);
    }

    #[test]
    fn hashed_kernel_shares_one_statistic_per_bucket() {
        const BETA: f32 = 0.5;

        let mut compressor = DenseHashCompressor::new(1, 16, 0.0625).unwrap();
        assert_eq!(compressor.range(), 1);

        let mut params = vec![0.; 16];
        let grad: Vec<f32> = (0..16).map(|i| i as f32 / 8.).collect();
        compressor.update(&mut params, &grad, 1., BETA).unwrap();

        // Every coordinate saw the same staged zero, so v depends only on its own g.
        for (p, g) in params.iter().zip(&grad) {
            let v = (1. - BETA) * g * g;
            let expected = -g / (v + DEFAULT_EPS).sqrt();
            assert!((p - expected).abs() < 1e-4, "{p} vs {expected}");
        }

        let sum: f32 = grad.iter().map(|g| g * g).sum();
        assert!((compressor.aux()[0] - (1. - BETA) * sum).abs() < 1e-4);
    }

    #[test]
    fn hashed_kernel_matches_a_sequential_reference() {
        const BETA: f32 = 0.9;
        const LR: f32 = 0.01;
        const ROWS: usize = 3;
        const WIDTH: usize = 20;

        let mut compressor = DenseHashCompressor::new(ROWS, WIDTH, 0.25).unwrap();
        let mut params = vec![1.; ROWS * WIDTH];
        let grad: Vec<f32> = (0..ROWS * WIDTH).map(|i| ((i % 7) as f32 - 3.) / 4.).collect();

        let mut expected_params = params.clone();
        let mut expected_aux = vec![0.; ROWS * compressor.range()];

        for _ in 0..2 {
            for row in 0..ROWS {
                let range = compressor.range();
                let staged = expected_aux[row * range..(row + 1) * range].to_vec();
                let mut acc = vec![0.; range];

                for col in 0..WIDTH {
                    let g = grad[row * WIDTH + col];
                    let b = compressor.bucket(row, col);
                    let v = BETA * staged[b] + (1. - BETA) * g * g;
                    expected_params[row * WIDTH + col] -= LR * g / (v + DEFAULT_EPS).sqrt();
                    acc[b] += g * g;
                }
                for b in 0..range {
                    expected_aux[row * range + b] += (1. - BETA) * (acc[b] - staged[b]);
                }
            }
            compressor.update(&mut params, &grad, LR, BETA).unwrap();
        }

        for (got, want) in params.iter().zip(&expected_params) {
            assert!((got - want).abs() < 1e-5);
        }
        for (got, want) in compressor.aux().iter().zip(&expected_aux) {
            assert!((got - want).abs() < 1e-5);
        }
    }

    #[test]
    fn clean_scales_the_buffer() {
        let mut compressor = DenseHashCompressor::new(2, 4, 1.).unwrap();
        let mut params = vec![0.; 8];
        compressor.update(&mut params, &[1.; 8], 0.1, 0.).unwrap();

        compressor.clean(0.25);
        assert!(compressor.aux().iter().all(|&v| v == 0.25));
    }

    #[test]
    fn snapshot_round_trip() {
        let mut compressor = DenseHashCompressor::new(2, 6, 0.5).unwrap().with_eps(1e-6);
        let mut params = vec![0.; 12];
        compressor.update(&mut params, &[0.3; 12], 0.1, 0.9).unwrap();

        let json = serde_json::to_string(&compressor.snapshot()).unwrap();
        let restored =
            DenseHashCompressor::from_snapshot(serde_json::from_str(&json).unwrap()).unwrap();

        assert_eq!(restored.kernel(), Kernel::Hashed);
        assert_eq!(restored.snapshot(), compressor.snapshot());
    }

    #[test]
    fn restore_rejects_bad_layouts() {
        let mut snapshot = DenseHashCompressor::new(2, 6, 0.5).unwrap().snapshot();
        snapshot.aux.push(0.);
        assert!(DenseHashCompressor::from_snapshot(snapshot.clone()).is_err());

        snapshot.aux.pop();
        snapshot.range = 7;
        assert!(DenseHashCompressor::from_snapshot(snapshot).is_err());
    }
}
