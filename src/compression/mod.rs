//! Hash-compressed second moments for parameters that receive dense gradients.

mod dense_hash;

pub use dense_hash::{CompressorSnapshot, DenseHashCompressor, Kernel};
