use super::{Adam, ErrorReport, HashedRmsProp, Optimizer, SparseMomentEstimator};
use crate::{
    error::{OptimizerErr, Result},
    parameters::Gradient,
    specs::{AuxSpec, ParamGroupSpec},
};

/// The optimizer state of a single parameter.
///
/// Which variant a parameter gets is decided by the first gradient it
/// receives and never changes afterwards.
#[derive(Debug)]
pub enum MomentState {
    Dense(Adam),
    Sparse(SparseMomentEstimator),
    Hashed(HashedRmsProp),
}

impl MomentState {
    /// Creates the state matching the kind of `grad`.
    ///
    /// # Arguments
    /// * `rows`, `width` - The shape of the parameter.
    /// * `grad` - The first gradient seen for the parameter.
    /// * `spec` - The parameter group's configuration.
    pub fn for_gradient(
        rows: usize,
        width: usize,
        grad: &Gradient,
        spec: &ParamGroupSpec,
    ) -> Result<Self> {
        let state = match (grad, spec.aux) {
            (Gradient::Sparse(_), _) => Self::Sparse(SparseMomentEstimator::new(
                rows,
                width,
                &spec.adam,
                &spec.sketch,
            )?),
            (Gradient::Dense(_), AuxSpec::Exact) => {
                Self::Dense(Adam::new(rows * width, spec.adam)?)
            }
            (Gradient::Dense(_), AuxSpec::Hashed { size_fraction }) => {
                Self::Hashed(HashedRmsProp::new(rows, width, size_fraction, &spec.adam)?)
            }
        };

        Ok(state)
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse(_))
    }

    /// Applies `grad` to `params`.
    ///
    /// # Arguments
    /// * `name` - The parameter's name, used in errors.
    /// * `params` - The parameter's values.
    /// * `grad` - The parameter's gradient.
    ///
    /// # Returns
    /// A diagnostic report from the sparse path, or a `GradientKindChanged`
    /// error if `grad` is not the kind this state was created for.
    pub fn apply(
        &mut self,
        name: &str,
        params: &mut [f32],
        grad: &Gradient,
    ) -> Result<Option<ErrorReport>> {
        match (self, grad) {
            (Self::Dense(adam), Gradient::Dense(grad)) => {
                adam.update_params(grad, params).map(|_| None)
            }
            (Self::Hashed(opt), Gradient::Dense(grad)) => {
                opt.update_params(grad, params).map(|_| None)
            }
            (Self::Sparse(estimator), Gradient::Sparse(grad)) => estimator.step(params, grad),
            _ => Err(OptimizerErr::GradientKindChanged {
                param: name.to_string(),
            }),
        }
    }
}
