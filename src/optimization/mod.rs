mod adam;
mod diagnostics;
mod driver;
mod hashed_rms_prop;
mod moment;
mod optimizer;
mod sparse_adam;

pub use adam::Adam;
pub use diagnostics::{ErrorReport, ErrorTracker};
pub use driver::{ParamGroup, SketchedAdam, StepReport};
pub use hashed_rms_prop::HashedRmsProp;
pub use moment::MomentState;
pub use optimizer::Optimizer;
pub use sparse_adam::SparseMomentEstimator;
