//! Adam with sketched optimizer state.
//!
//! Row-sparse parameters such as embedding tables keep their first moment in
//! a `CountSketch` and their second moment in a `CountMinSketch`, so the
//! optimizer state grows with the sketch size instead of the table size.
//! Dense parameters are stepped with exact Adam or with a hashed second
//! moment through `DenseHashCompressor`.

pub mod compression;
pub mod error;
pub mod hashing;
pub mod initialization;
pub mod optimization;
pub mod parameters;
pub mod sketch;
pub mod specs;

pub use error::{OptimizerErr, Result};
pub use optimization::{SketchedAdam, StepReport};
pub use parameters::{Gradient, Parameter, SparseRows};
