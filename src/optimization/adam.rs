use super::Optimizer;
use crate::{
    error::{OptimizerErr, Result},
    specs::AdamSpec,
};

/// Adam with exact per-coordinate moments.
#[derive(Debug)]
pub struct Adam {
    spec: AdamSpec,
    step: u64,
    exp_avg: Box<[f32]>,
    exp_avg_sq: Box<[f32]>,
    max_exp_avg_sq: Option<Box<[f32]>>,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `spec` - The hyperparameters.
    ///
    /// # Returns
    /// A new `Adam` instance or an error if `spec` doesn't validate.
    pub fn new(len: usize, spec: AdamSpec) -> Result<Self> {
        spec.validate()?;

        Ok(Self {
            spec,
            step: 0,
            exp_avg: vec![0.; len].into_boxed_slice(),
            exp_avg_sq: vec![0.; len].into_boxed_slice(),
            max_exp_avg_sq: spec.amsgrad.then(|| vec![0.; len].into_boxed_slice()),
        })
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn exp_avg(&self) -> &[f32] {
        &self.exp_avg
    }

    pub fn exp_avg_sq(&self) -> &[f32] {
        &self.exp_avg_sq
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        if grad.len() != params.len() || params.len() != self.exp_avg.len() {
            return Err(OptimizerErr::SizeMismatch {
                expected: self.exp_avg.len(),
                got: if grad.len() != self.exp_avg.len() {
                    grad.len()
                } else {
                    params.len()
                },
            });
        }

        let AdamSpec {
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            weight_decay: wd,
            ..
        } = self.spec;

        self.step += 1;
        let step_size = self.spec.step_size(self.step);

        let moments = params
            .iter_mut()
            .zip(grad)
            .zip(self.exp_avg.iter_mut())
            .zip(self.exp_avg_sq.iter_mut());

        match self.max_exp_avg_sq.as_deref_mut() {
            Some(max_exp_avg_sq) => {
                moments
                    .zip(max_exp_avg_sq.iter_mut())
                    .for_each(|((((p, &g), m), v), v_max)| {
                        let g = g + wd * *p;
                        *m = b1 * *m + (1. - b1) * g;
                        *v = b2 * *v + (1. - b2) * g * g;
                        *v_max = v_max.max(*v);
                        *p -= step_size * *m / (v_max.sqrt() + eps);
                    });
            }
            None => {
                moments.for_each(|(((p, &g), m), v)| {
                    let g = g + wd * *p;
                    *m = b1 * *m + (1. - b1) * g;
                    *v = b2 * *v + (1. - b2) * g * g;
                    *p -= step_size * *m / (v.sqrt() + eps);
                });
            }
        }

        Ok(())
    }
}
