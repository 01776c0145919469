//! Hashed accumulators standing in for per-key optimizer state.
//!
//! Both sketches share one storage layout: `rows × range × depth` atomic cells,
//! where a key owns one bucket per hash row and `depth` lanes inside it.
//! Updates are fused, so the value read back for a `(key, lane)` is the cell
//! right after that key's own addition.
//!
//! # Usage
//!
//! ```rust
//! # use sketched_adam::parameters::SparseRows;
//! # use sketched_adam::sketch::{CountMinSketch, Sketch};
//! # use sketched_adam::specs::SketchSpec;
//! let sketch = CountMinSketch::new(1000, 4, &SketchSpec::default()).unwrap();
//! let batch = SparseRows::new(1000, 4, vec![7], vec![1., 2., 3., 4.]).unwrap();
//! let estimate = sketch.update(&batch, 0.).unwrap();
//! assert!(estimate.values()[3] >= 4.);
//! ```

mod count_min;
mod count_sketch;
#[allow(clippy::module_inception)]
mod sketch;
mod snapshot;
mod table;

pub use count_min::CountMinSketch;
pub use count_sketch::CountSketch;
pub use sketch::Sketch;
pub use snapshot::{SketchKind, SketchSnapshot};
