use std::borrow::Cow;

use log::debug;
use rayon::prelude::*;

use super::{ErrorReport, ErrorTracker, diagnostics::ExactShadow};
use crate::{
    error::{OptimizerErr, Result},
    parameters::SparseRows,
    sketch::{CountMinSketch, CountSketch, Sketch},
    specs::{AdamSpec, SketchSpec},
};

/// Adam over a row-sparse table whose moments live in sketches.
///
/// The first moment is held by a `CountSketch` and the second by a
/// `CountMinSketch`, both keyed by row with one lane per column. Memory is
/// proportional to the sketch size instead of the table size.
#[derive(Debug)]
pub struct SparseMomentEstimator {
    rows: usize,
    width: usize,
    adam: AdamSpec,
    sketch: SketchSpec,
    step: u64,
    exp_avg: CountSketch,
    exp_avg_sq: CountMinSketch,
    shadow: Option<ExactShadow>,
    tracker: Option<ErrorTracker>,
}

impl SparseMomentEstimator {
    /// Creates a new `SparseMomentEstimator`.
    ///
    /// # Arguments
    /// * `rows` - The amount of rows of the table, the valid keys are `[0, rows)`.
    /// * `width` - The amount of values per row.
    /// * `adam` - The update hyperparameters.
    /// * `sketch` - Sketch sizing, decay schedule and diagnostics.
    ///
    /// # Returns
    /// A new estimator or an error if either spec doesn't validate.
    pub fn new(rows: usize, width: usize, adam: &AdamSpec, sketch: &SketchSpec) -> Result<Self> {
        adam.validate()?;
        sketch.validate()?;

        let (shadow, tracker) = if sketch.diagnostics {
            (
                Some(ExactShadow::new(rows, width)),
                Some(ErrorTracker::new(sketch.diagnostic_interval)),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            rows,
            width,
            adam: *adam,
            sketch: *sketch,
            step: 0,
            exp_avg: CountSketch::new(rows, width, sketch)?,
            exp_avg_sq: CountMinSketch::new(rows, width, sketch)?,
            shadow,
            tracker,
        })
    }

    pub fn step_count(&self) -> u64 {
        self.step
    }

    pub fn exp_avg(&self) -> &CountSketch {
        &self.exp_avg
    }

    pub fn exp_avg_sq(&self) -> &CountMinSketch {
        &self.exp_avg_sq
    }

    /// Applies one sparse Adam step to the touched rows of `params`.
    ///
    /// Keys of `grad` must be unique. The update is not linear in a repeated
    /// key, so a scattered gradient should go through `SparseRows::coalesce`
    /// first.
    ///
    /// # Arguments
    /// * `params` - The row-major `rows × width` table.
    /// * `grad` - The gradient of the touched rows.
    ///
    /// # Returns
    /// The diagnostic report if this step closed a window, or an error if the
    /// shapes don't match or a key is out of range. Nothing is mutated on error.
    pub fn step(&mut self, params: &mut [f32], grad: &SparseRows) -> Result<Option<ErrorReport>> {
        self.check(params, grad)?;

        let AdamSpec {
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            weight_decay: wd,
            ..
        } = self.adam;

        self.step += 1;
        let grad = self.decayed(params, grad, wd)?;

        if self.step % self.sketch.clean_interval.get() == 0 {
            debug!(
                step = self.step,
                alpha = self.sketch.clean_alpha;
                "cleaning second moment sketch"
            );
            self.exp_avg_sq.clean(self.sketch.clean_alpha);
        }

        let numer = self.exp_avg.update(&grad, b1)?;
        let second = self.exp_avg_sq.update(&grad.map_values(|g| g * g), b2)?;
        let step_size = self.adam.step_size(self.step);
        let width = self.width;

        let shadow = self.shadow.as_mut();
        let (_, errors) = rayon::join(
            || {
                let deltas: Vec<f32> = numer
                    .values()
                    .par_iter()
                    .zip(second.values().par_iter())
                    .map(|(m, v)| step_size * m / (v.sqrt() + eps))
                    .collect();

                for (key, delta) in numer.indices().iter().zip(deltas.chunks(width.max(1))) {
                    let offset = *key as usize * width;
                    params[offset..offset + width]
                        .iter_mut()
                        .zip(delta)
                        .for_each(|(p, d)| *p -= d);
                }
            },
            || shadow.map(|shadow| shadow.update(&grad, &numer, &second, b1, b2)),
        );

        let step = self.step;
        Ok(self.tracker.as_mut().and_then(|tracker| {
            let (exp_avg_error, exp_avg_sq_error) = errors?;
            tracker.record(exp_avg_error, exp_avg_sq_error);
            tracker.poll(step)
        }))
    }

    fn check(&self, params: &[f32], grad: &SparseRows) -> Result<()> {
        if params.len() != self.rows * self.width {
            return Err(OptimizerErr::SizeMismatch {
                expected: self.rows * self.width,
                got: params.len(),
            });
        }
        if grad.width() != self.width {
            return Err(OptimizerErr::SizeMismatch {
                expected: self.width,
                got: grad.width(),
            });
        }
        if grad.rows() != self.rows {
            return Err(OptimizerErr::SizeMismatch {
                expected: self.rows,
                got: grad.rows(),
            });
        }
        grad.check_keys()
    }

    /// Folds the L2 penalty of the touched rows into the gradient.
    fn decayed<'a>(
        &self,
        params: &[f32],
        grad: &'a SparseRows,
        wd: f32,
    ) -> Result<Cow<'a, SparseRows>> {
        if wd == 0. {
            return Ok(Cow::Borrowed(grad));
        }

        let width = self.width;
        let values = grad
            .indices()
            .par_iter()
            .zip(grad.values().par_chunks(width.max(1)))
            .flat_map_iter(move |(&key, row)| {
                let offset = key as usize * width;
                row.iter()
                    .zip(&params[offset..offset + width])
                    .map(move |(g, p)| g + wd * p)
            })
            .collect();

        SparseRows::new(self.rows, width, grad.indices().to_vec(), values).map(Cow::Owned)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, num::NonZeroU64};

    use super::*;
    use crate::{
        hashing::bucket,
        optimization::{Adam, Optimizer},
    };

    /// Picks keys that share no bucket with each other in any hash row.
    fn collision_free_keys(estimator: &SparseMomentEstimator, count: usize) -> Vec<i64> {
        let sketch = estimator.exp_avg();
        let mut taken: Vec<HashSet<usize>> = vec![HashSet::new(); sketch.rows()];
        let mut keys = Vec::new();

        for key in 0..estimator.rows as i64 {
            let buckets: Vec<usize> = sketch
                .salts()
                .iter()
                .map(|&salt| bucket(key, salt, sketch.range()))
                .collect();
            if buckets.iter().zip(&taken).any(|(b, row)| row.contains(b)) {
                continue;
            }

            buckets.iter().zip(taken.iter_mut()).for_each(|(&b, row)| {
                row.insert(b);
            });
            keys.push(key);
            if keys.len() == count {
                break;
            }
        }

        keys
    }

    fn quiet_sketch() -> SketchSpec {
        SketchSpec {
            diagnostics: false,
            ..Default::default()
        }
    }

    #[test]
    fn collision_free_step_matches_dense_adam() {
        let (rows, width) = (1000, 4);
        let adam = AdamSpec::default();
        let mut estimator =
            SparseMomentEstimator::new(rows, width, &adam, &quiet_sketch()).unwrap();

        let keys = collision_free_keys(&estimator, 5);
        assert_eq!(keys.len(), 5);

        let values: Vec<f32> = (0..keys.len() * width)
            .map(|i| (i as f32 - 9.) / 4.)
            .collect();
        let grad = SparseRows::new(rows, width, keys.clone(), values.clone()).unwrap();

        let mut dense_grad = vec![0.; rows * width];
        for (key, row) in grad.iter() {
            let offset = key as usize * width;
            dense_grad[offset..offset + width].copy_from_slice(row);
        }

        let initial: Vec<f32> = (0..rows * width).map(|i| (i % 13) as f32 / 13.).collect();
        let mut sparse_params = initial.clone();
        let mut dense_params = initial.clone();

        estimator.step(&mut sparse_params, &grad).unwrap();
        Adam::new(rows * width, adam)
            .unwrap()
            .update_params(&dense_grad, &mut dense_params)
            .unwrap();

        for (i, (s, d)) in sparse_params.iter().zip(&dense_params).enumerate() {
            assert!((s - d).abs() < 1e-6, "entry {i}: {s} vs {d}");
        }
    }

    #[test]
    fn diagnostics_do_not_change_the_update() {
        let (rows, width) = (64, 3);
        let adam = AdamSpec::default();
        let loud = SketchSpec {
            diagnostic_interval: NonZeroU64::new(4).unwrap(),
            ..Default::default()
        };

        let mut with = SparseMomentEstimator::new(rows, width, &adam, &loud).unwrap();
        let mut without = SparseMomentEstimator::new(rows, width, &adam, &quiet_sketch()).unwrap();
        let mut params_with = vec![0.5; rows * width];
        let mut params_without = params_with.clone();

        let mut reports = 0;
        for step in 0..12i64 {
            let keys: Vec<i64> = (0..8).map(|k| (k * 7 + step * 3) % rows as i64).collect();
            let values = (0..keys.len() * width)
                .map(|i| ((i as i64 + step) % 5 - 2) as f32)
                .collect();
            let grad = SparseRows::new(rows, width, keys, values).unwrap();

            reports += with.step(&mut params_with, &grad).unwrap().is_some() as usize;
            assert_eq!(without.step(&mut params_without, &grad).unwrap(), None);
        }

        assert_eq!(reports, 3);
        assert_eq!(params_with, params_without);
    }

    #[test]
    fn rejects_bad_keys_before_mutating() {
        let mut estimator =
            SparseMomentEstimator::new(10, 2, &AdamSpec::default(), &SketchSpec::default())
                .unwrap();
        let mut params = vec![1.; 20];

        let grad = SparseRows::new(10, 2, vec![3, 10], vec![1.; 4]).unwrap();
        assert_eq!(
            estimator.step(&mut params, &grad),
            Err(OptimizerErr::KeyOutOfRange { key: 10, rows: 10 })
        );

        let grad = SparseRows::new(10, 2, vec![-1], vec![1.; 2]).unwrap();
        assert!(estimator.step(&mut params, &grad).is_err());

        assert_eq!(estimator.step_count(), 0);
        assert_eq!(params, vec![1.; 20]);
        assert_eq!(estimator.exp_avg_sq().estimate(&[3]).values(), &[0., 0.]);
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let mut estimator =
            SparseMomentEstimator::new(10, 2, &AdamSpec::default(), &SketchSpec::default())
                .unwrap();

        let grad = SparseRows::new(10, 3, vec![1], vec![1.; 3]).unwrap();
        assert!(estimator.step(&mut vec![0.; 20], &grad).is_err());

        let grad = SparseRows::new(10, 2, vec![1], vec![1.; 2]).unwrap();
        assert!(estimator.step(&mut vec![0.; 19], &grad).is_err());
    }

    #[test]
    fn cleans_the_second_moment_on_schedule() {
        let adam = AdamSpec {
            beta2: 0.5,
            ..Default::default()
        };
        let sketch = SketchSpec {
            clean_interval: NonZeroU64::new(2).unwrap(),
            clean_alpha: 0.5,
            diagnostics: false,
            ..Default::default()
        };
        let mut estimator = SparseMomentEstimator::new(100, 1, &adam, &sketch).unwrap();
        let mut params = vec![0.; 100];
        let grad = SparseRows::new(100, 1, vec![7], vec![1.]).unwrap();

        estimator.step(&mut params, &grad).unwrap();
        assert_eq!(estimator.exp_avg_sq().estimate(&[7]).values(), &[0.5]);

        // cleaned to 0.25 before adding 0.5
        estimator.step(&mut params, &grad).unwrap();
        assert_eq!(estimator.exp_avg_sq().estimate(&[7]).values(), &[0.75]);

        estimator.step(&mut params, &grad).unwrap();
        assert_eq!(estimator.exp_avg_sq().estimate(&[7]).values(), &[1.25]);
    }

    #[test]
    fn reports_the_drift_between_sketch_and_shadow() {
        let sketch = SketchSpec {
            diagnostic_interval: NonZeroU64::new(2).unwrap(),
            ..Default::default()
        };
        let mut estimator =
            SparseMomentEstimator::new(100, 1, &AdamSpec::default(), &sketch).unwrap();
        let mut params = vec![0.; 100];
        let grad = SparseRows::new(100, 1, vec![7], vec![1.]).unwrap();

        assert_eq!(estimator.step(&mut params, &grad).unwrap(), None);
        let report = estimator.step(&mut params, &grad).unwrap().unwrap();

        // sketch m = 0.2, exact m = 0.19, no error on the first step
        assert_eq!(report.step, 2);
        assert_eq!(report.samples, 2);
        assert!((report.exp_avg_error - 0.005).abs() < 1e-6, "{report:?}");
        assert!(report.exp_avg_sq_error > 0.);
    }

    #[test]
    fn weight_decay_moves_untouched_gradients() {
        let adam = AdamSpec {
            weight_decay: 0.5,
            ..Default::default()
        };
        let mut estimator = SparseMomentEstimator::new(10, 1, &adam, &quiet_sketch()).unwrap();
        let mut params = vec![2.; 10];
        let grad = SparseRows::new(10, 1, vec![4], vec![0.]).unwrap();

        estimator.step(&mut params, &grad).unwrap();

        assert!((params[4] - (2. - 1e-3)).abs() < 1e-6);
        assert!(params.iter().enumerate().all(|(i, &p)| i == 4 || p == 2.));
    }

    #[test]
    fn large_batches_follow_the_sketch_estimates() {
        let (rows, width) = (2000, 8);
        let adam = AdamSpec {
            weight_decay: 0.1,
            ..Default::default()
        };
        let sketch = SketchSpec {
            size_fraction: 1.,
            ..quiet_sketch()
        };
        let mut estimator = SparseMomentEstimator::new(rows, width, &adam, &sketch).unwrap();

        let keys = collision_free_keys(&estimator, 200);
        assert_eq!(keys.len(), 200);
        let values = (0..keys.len() * width)
            .map(|i| (i % 11) as f32 - 5.)
            .collect();
        let grad = SparseRows::new(rows, width, keys.clone(), values).unwrap();
        let initial: Vec<f32> = (0..rows * width).map(|i| (i % 7) as f32 / 7.).collect();
        let mut params = initial.clone();

        estimator.step(&mut params, &grad).unwrap();

        let m = estimator.exp_avg().estimate(&keys);
        let v = estimator.exp_avg_sq().estimate(&keys);
        let step_size = adam.step_size(1);
        for ((key, m_row), v_row) in m.iter().zip(v.values().chunks(width)) {
            let offset = key as usize * width;
            for (j, (m, v)) in m_row.iter().zip(v_row).enumerate() {
                let expected = initial[offset + j] - step_size * m / (v.sqrt() + adam.epsilon);
                assert!((params[offset + j] - expected).abs() < 1e-6, "key {key} lane {j}");
            }
        }
        let touched: HashSet<i64> = keys.into_iter().collect();
        for key in (0..rows).filter(|key| !touched.contains(&(*key as i64))) {
            let offset = key * width;
            assert_eq!(params[offset..offset + width], initial[offset..offset + width]);
        }
    }
}
