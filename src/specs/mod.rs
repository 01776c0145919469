//! Serializable configuration of the optimizer and its auxiliary structures.

mod optimizer;
mod sketch;
mod training;

pub use optimizer::AdamSpec;
pub(crate) use sketch::check_size_fraction;
pub use sketch::{AuxSpec, ParamGroupSpec, SketchSpec};
pub use training::TrainingSpec;
