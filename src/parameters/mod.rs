mod parameter;
mod sparse_rows;

pub use parameter::{Gradient, Parameter};
pub use sparse_rows::SparseRows;
