use log::{debug, warn};

use super::{ErrorReport, MomentState};
use crate::{error::Result, parameters::Parameter, specs::ParamGroupSpec};

/// Parameters sharing one configuration, each with its lazily created state.
#[derive(Debug)]
pub struct ParamGroup {
    spec: ParamGroupSpec,
    params: Vec<Parameter>,
    states: Vec<Option<MomentState>>,
}

impl ParamGroup {
    /// Creates a new `ParamGroup`.
    ///
    /// # Returns
    /// An error if `spec` doesn't validate.
    pub fn new(spec: ParamGroupSpec, params: Vec<Parameter>) -> Result<Self> {
        spec.validate()?;

        let states = params.iter().map(|_| None).collect();
        Ok(Self {
            spec,
            params,
            states,
        })
    }

    pub fn spec(&self) -> &ParamGroupSpec {
        &self.spec
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut [Parameter] {
        &mut self.params
    }

    /// The state of the parameter at `index`, if it has been stepped.
    pub fn state(&self, index: usize) -> Option<&MomentState> {
        self.states.get(index)?.as_ref()
    }
}

/// What a call to `SketchedAdam::step` did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Parameters that had a gradient and were updated.
    pub updated: usize,
    /// Sketch error reports emitted during the step, by parameter name.
    pub diagnostics: Vec<(String, ErrorReport)>,
}

/// Adam whose row-sparse parameters keep their moments in sketches.
///
/// Parameters receiving dense gradients are stepped with exact Adam, or with
/// a `HashedRmsProp` when their group asks for a hashed auxiliary state.
#[derive(Debug, Default)]
pub struct SketchedAdam {
    groups: Vec<ParamGroup>,
}

impl SketchedAdam {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group of parameters sharing `spec`.
    ///
    /// # Returns
    /// An error if `spec` doesn't validate.
    pub fn add_param_group(&mut self, spec: ParamGroupSpec, params: Vec<Parameter>) -> Result<()> {
        self.groups.push(ParamGroup::new(spec, params)?);
        Ok(())
    }

    pub fn groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    fn params(&self) -> impl Iterator<Item = &Parameter> {
        self.groups.iter().flat_map(|group| group.params.iter())
    }

    /// Finds the first parameter called `name`.
    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params().find(|param| param.name() == name)
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.groups
            .iter_mut()
            .flat_map(|group| group.params.iter_mut())
            .find(|param| param.name() == name)
    }

    /// Drops every pending gradient.
    pub fn zero_grad(&mut self) {
        self.groups
            .iter_mut()
            .flat_map(|group| group.params.iter_mut())
            .for_each(Parameter::zero_grad);
    }

    /// Updates every parameter holding a gradient.
    ///
    /// Parameters without a gradient are skipped. The gradients are left in
    /// place, call `zero_grad` before the next backward pass.
    ///
    /// # Returns
    /// The step report, or the first error met. Parameters visited before the
    /// failing one keep their update.
    pub fn step(&mut self) -> Result<StepReport> {
        let mut report = StepReport::default();

        for group in self.groups.iter_mut() {
            let spec = group.spec;

            for (param, slot) in group.params.iter_mut().zip(group.states.iter_mut()) {
                let (rows, width) = (param.rows(), param.width());
                let (name, data, grad) = param.split_mut();
                let Some(grad) = grad else {
                    continue;
                };

                let state = match slot.take() {
                    Some(state) => slot.insert(state),
                    None => {
                        let state = MomentState::for_gradient(rows, width, grad, &spec)?;
                        debug!(param = name, sparse = state.is_sparse(); "created optimizer state");
                        slot.insert(state)
                    }
                };

                if let Some(diagnostic) = state.apply(name, data, grad)? {
                    report.diagnostics.push((name.to_string(), diagnostic));
                }
                report.updated += 1;
            }
        }

        if report.updated == 0 {
            warn!("optimizer step without any gradient");
        }

        Ok(report)
    }

    /// Evaluates `closure` and then steps.
    ///
    /// # Arguments
    /// * `closure` - Recomputes the loss and attaches fresh gradients.
    ///
    /// # Returns
    /// The loss returned by `closure` and the step report.
    pub fn step_with<F>(&mut self, closure: F) -> Result<(f32, StepReport)>
    where
        F: FnOnce(&mut Self) -> Result<f32>,
    {
        let loss = closure(self)?;
        let report = self.step()?;
        Ok((loss, report))
    }
}
