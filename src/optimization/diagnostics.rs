use std::num::NonZeroU64;

use log::info;
use serde::Serialize;

use crate::parameters::SparseRows;

/// Mean absolute error of the sketched moments against their exact shadows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorReport {
    /// The step the report was emitted on.
    pub step: u64,
    /// Mean per step of `Σ|m_sketch - m_exact|` over the touched entries.
    pub exp_avg_error: f64,
    /// Mean per step of `Σ|v_sketch - v_exact|` over the touched entries.
    pub exp_avg_sq_error: f64,
    /// Steps aggregated into the means.
    pub samples: u64,
}

/// Accumulates sketch errors and emits a report every `interval` steps.
#[derive(Debug, Clone)]
pub struct ErrorTracker {
    interval: NonZeroU64,
    exp_avg_error: f64,
    exp_avg_sq_error: f64,
    samples: u64,
}

impl ErrorTracker {
    pub fn new(interval: NonZeroU64) -> Self {
        Self {
            interval,
            exp_avg_error: 0.,
            exp_avg_sq_error: 0.,
            samples: 0,
        }
    }

    /// Adds one step's summed errors.
    pub fn record(&mut self, exp_avg_error: f64, exp_avg_sq_error: f64) {
        self.exp_avg_error += exp_avg_error;
        self.exp_avg_sq_error += exp_avg_sq_error;
        self.samples += 1;
    }

    /// Emits and resets the running means when `step` hits the interval.
    ///
    /// # Returns
    /// The report for the window ending at `step`, if any.
    pub fn poll(&mut self, step: u64) -> Option<ErrorReport> {
        if step % self.interval.get() != 0 || self.samples == 0 {
            return None;
        }

        let samples = self.samples as f64;
        let report = ErrorReport {
            step,
            exp_avg_error: self.exp_avg_error / samples,
            exp_avg_sq_error: self.exp_avg_sq_error / samples,
            samples: self.samples,
        };

        info!(
            step = report.step,
            exp_avg_error = report.exp_avg_error,
            exp_avg_sq_error = report.exp_avg_sq_error;
            "sketch error report"
        );

        self.exp_avg_error = 0.;
        self.exp_avg_sq_error = 0.;
        self.samples = 0;
        Some(report)
    }
}

/// Exact per-entry moving averages of a `rows × width` table.
#[derive(Debug, Clone)]
pub(crate) struct ExactShadow {
    width: usize,
    exp_avg: Box<[f32]>,
    exp_avg_sq: Box<[f32]>,
}

impl ExactShadow {
    pub fn new(rows: usize, width: usize) -> Self {
        Self {
            width,
            exp_avg: vec![0.; rows * width].into_boxed_slice(),
            exp_avg_sq: vec![0.; rows * width].into_boxed_slice(),
        }
    }

    /// Updates the touched entries and measures how far the sketched moments
    /// are from them.
    ///
    /// # Arguments
    /// * `grad` - The step's gradient, keys already validated.
    /// * `exp_avg` - The first moment sketch estimates for `grad`'s keys.
    /// * `exp_avg_sq` - The second moment sketch estimates for `grad`'s keys.
    /// * `beta1`, `beta2` - The moving average coefficients.
    ///
    /// # Returns
    /// The summed absolute errors of both moments.
    pub fn update(
        &mut self,
        grad: &SparseRows,
        exp_avg: &SparseRows,
        exp_avg_sq: &SparseRows,
        beta1: f32,
        beta2: f32,
    ) -> (f64, f64) {
        let width = self.width;
        let mut errors = (0., 0.);

        for ((key, g_row), (m_row, v_row)) in grad.iter().zip(
            exp_avg
                .values()
                .chunks(width.max(1))
                .zip(exp_avg_sq.values().chunks(width.max(1))),
        ) {
            let offset = key as usize * width;
            let exact_m = &mut self.exp_avg[offset..offset + width];
            let exact_v = &mut self.exp_avg_sq[offset..offset + width];

            for lane in 0..width {
                let g = g_row[lane];
                exact_m[lane] += (1. - beta1) * (g - exact_m[lane]);
                exact_v[lane] += (1. - beta2) * (g * g - exact_v[lane]);

                errors.0 += (m_row[lane] - exact_m[lane]).abs() as f64;
                errors.1 += (v_row[lane] - exact_v[lane]).abs() as f64;
            }
        }

        errors
    }

    #[cfg(test)]
    pub fn exp_avg(&self) -> &[f32] {
        &self.exp_avg
    }

    #[cfg(test)]
    pub fn exp_avg_sq(&self) -> &[f32] {
        &self.exp_avg_sq
    }
}
