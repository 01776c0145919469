use crate::error::Result;

/// Defines the strategy for updating dense parameters from their gradient.
pub trait Optimizer {
    /// Updates `params` in place using `grad`.
    ///
    /// # Arguments
    /// * `grad` - The gradient of `params`.
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// A `SizeMismatch` error if the lengths of `grad` and `params` differ.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;
}
