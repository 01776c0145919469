use std::{
    error::Error,
    fmt::{self, Display},
};

use rand_distr::{NormalError, uniform::Error as UniformError};

/// The result type of the `RandParamGen` constructors.
pub type Result<T> = std::result::Result<T, RandErr>;

/// The distribution a `RandParamGen` was asked for can't be built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RandErr {
    Normal(NormalError),
    Uniform(UniformError),
}

impl From<NormalError> for RandErr {
    fn from(value: NormalError) -> Self {
        Self::Normal(value)
    }
}

impl From<UniformError> for RandErr {
    fn from(value: UniformError) -> Self {
        Self::Uniform(value)
    }
}

impl Display for RandErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal(e) => write!(f, "invalid normal initializer: {e}"),
            Self::Uniform(e) => write!(f, "invalid uniform initializer: {e}"),
        }
    }
}

impl Error for RandErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Normal(e) => Some(e),
            Self::Uniform(e) => Some(e),
        }
    }
}
