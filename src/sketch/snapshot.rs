use serde::{Deserialize, Serialize};

use crate::hashing::Salt;

/// Which estimator a snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SketchKind {
    CountMin,
    CountSketch,
}

/// The persistable state of a sketch: its layout, salts and cells.
///
/// Holds no trace of the thread pool that produced it, so it restores under
/// any execution topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SketchSnapshot {
    pub kind: SketchKind,
    pub keys: usize,
    pub rows: usize,
    pub range: usize,
    pub depth: usize,
    pub salts: Vec<Salt>,
    pub cells: Vec<f32>,
}
