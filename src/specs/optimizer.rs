use serde::{Deserialize, Serialize};

use crate::error::{OptimizerErr, Result};

/// The hyperparameters shared by the dense and the sparse update paths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamSpec {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    /// L2 penalty folded into the gradient before the moments are updated.
    pub weight_decay: f32,
    /// Normalize by the running maximum of the second moment (dense path only).
    pub amsgrad: bool,
}

impl Default for AdamSpec {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: 0.,
            amsgrad: false,
        }
    }
}

impl AdamSpec {
    /// Checks the construction-time constraints.
    ///
    /// # Returns
    /// An error unless `learning_rate >= 0`, `epsilon >= 0` and both betas lie in `[0, 1)`.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate >= 0.) {
            return Err(OptimizerErr::InvalidLearningRate(self.learning_rate));
        }
        if !(self.epsilon >= 0.) {
            return Err(OptimizerErr::InvalidEpsilon(self.epsilon));
        }

        for (index, value) in [self.beta1, self.beta2].into_iter().enumerate() {
            if !(0. ..1.).contains(&value) {
                return Err(OptimizerErr::InvalidBeta { index, value });
            }
        }

        Ok(())
    }

    /// The bias-corrected step size after `step` updates.
    ///
    /// `lr * sqrt(1 - beta2^step) / (1 - beta1^step)`, shared by both paths.
    pub fn step_size(&self, step: u64) -> f32 {
        let step = step.min(i32::MAX as u64) as i32;
        let bias_correction1 = 1. - self.beta1.powi(step);
        let bias_correction2 = 1. - self.beta2.powi(step);
        self.learning_rate * bias_correction2.sqrt() / bias_correction1
    }
}
