use crate::{
    error::{OptimizerErr, Result},
    initialization::ParamGen,
    parameters::SparseRows,
};

/// The gradient attached to a parameter after a backward pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Gradient {
    /// One value per parameter entry, row-major.
    Dense(Vec<f32>),
    /// Only the touched rows, e.g. the looked-up rows of an embedding table.
    Sparse(SparseRows),
}

impl Gradient {
    pub fn is_sparse(&self) -> bool {
        matches!(self, Gradient::Sparse(_))
    }
}

/// A `rows × width` table of trainable values and its pending gradient.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    rows: usize,
    width: usize,
    data: Vec<f32>,
    grad: Option<Gradient>,
}

impl Parameter {
    /// Creates a new `Parameter`.
    ///
    /// # Arguments
    /// * `name` - A label used in logs and errors.
    /// * `rows` - The amount of rows.
    /// * `width` - The amount of values per row.
    /// * `data` - The initial row-major values.
    ///
    /// # Returns
    /// A `SizeMismatch` error if `data` doesn't hold `rows * width` values.
    pub fn new(name: impl Into<String>, rows: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * width {
            return Err(OptimizerErr::SizeMismatch {
                expected: rows * width,
                got: data.len(),
            });
        }

        Ok(Self {
            name: name.into(),
            rows,
            width,
            data,
            grad: None,
        })
    }

    pub fn zeros(name: impl Into<String>, rows: usize, width: usize) -> Self {
        Self {
            name: name.into(),
            rows,
            width,
            data: vec![0.; rows * width],
            grad: None,
        }
    }

    /// Creates a new `Parameter` filled by a parameter generator.
    ///
    /// # Returns
    /// A `SizeMismatch` error if the generator runs out before `rows * width` values.
    pub fn generate<G: ParamGen>(
        name: impl Into<String>,
        rows: usize,
        width: usize,
        param_gen: &mut G,
    ) -> Result<Self> {
        let mut data = vec![0.; rows * width];
        let written = param_gen.fill(&mut data);
        if written != data.len() {
            return Err(OptimizerErr::SizeMismatch {
                expected: data.len(),
                got: written,
            });
        }

        Self::new(name, rows, width, data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn grad(&self) -> Option<&Gradient> {
        self.grad.as_ref()
    }

    /// Attaches a gradient after checking it matches the parameter's shape.
    pub fn set_grad(&mut self, grad: Gradient) -> Result<()> {
        match &grad {
            Gradient::Dense(values) if values.len() != self.data.len() => {
                return Err(OptimizerErr::SizeMismatch {
                    expected: self.data.len(),
                    got: values.len(),
                });
            }
            Gradient::Sparse(rows) if rows.width() != self.width => {
                return Err(OptimizerErr::SizeMismatch {
                    expected: self.width,
                    got: rows.width(),
                });
            }
            Gradient::Sparse(rows) if rows.rows() != self.rows => {
                return Err(OptimizerErr::SizeMismatch {
                    expected: self.rows,
                    got: rows.rows(),
                });
            }
            _ => {}
        }

        self.grad = Some(grad);
        Ok(())
    }

    pub fn zero_grad(&mut self) {
        self.grad = None;
    }

    /// Splits the parameter into its name, its values and its gradient.
    pub(crate) fn split_mut(&mut self) -> (&str, &mut [f32], Option<&Gradient>) {
        (&self.name, &mut self.data, self.grad.as_ref())
    }
}
