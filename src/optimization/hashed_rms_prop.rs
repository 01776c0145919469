use super::Optimizer;
use crate::{
    compression::DenseHashCompressor,
    error::{OptimizerErr, Result},
    specs::AdamSpec,
};

/// Drives a `DenseHashCompressor` as a dense optimizer.
///
/// The compressor carries only the second moment, so the step is an
/// RMSProp-style update with `beta2` as the bucket coefficient.
#[derive(Debug)]
pub struct HashedRmsProp {
    learning_rate: f32,
    beta: f32,
    weight_decay: f32,
    compressor: DenseHashCompressor,
}

impl HashedRmsProp {
    /// Creates a new `HashedRmsProp`.
    ///
    /// # Arguments
    /// * `rows`, `width` - The shape of the parameter.
    /// * `size_fraction` - Buckets per row relative to `width`.
    /// * `spec` - The group's hyperparameters.
    pub fn new(rows: usize, width: usize, size_fraction: f32, spec: &AdamSpec) -> Result<Self> {
        spec.validate()?;

        Ok(Self {
            learning_rate: spec.learning_rate,
            beta: spec.beta2,
            weight_decay: spec.weight_decay,
            compressor: DenseHashCompressor::new(rows, width, size_fraction)?,
        })
    }

    pub fn compressor(&self) -> &DenseHashCompressor {
        &self.compressor
    }

    pub fn compressor_mut(&mut self) -> &mut DenseHashCompressor {
        &mut self.compressor
    }
}

impl Optimizer for HashedRmsProp {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        if grad.len() != params.len() {
            return Err(OptimizerErr::SizeMismatch {
                expected: params.len(),
                got: grad.len(),
            });
        }

        let (lr, beta) = (self.learning_rate, self.beta);
        if self.weight_decay == 0. {
            return self.compressor.update(params, grad, lr, beta);
        }

        let wd = self.weight_decay;
        let grad: Vec<f32> = grad.iter().zip(params.iter()).map(|(g, p)| g + wd * p).collect();
        self.compressor.update(params, &grad, lr, beta)
    }
}
