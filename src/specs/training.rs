use serde::{Deserialize, Serialize};

use super::ParamGroupSpec;

/// The synthetic workload run by the demo binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSpec {
    pub steps: usize,
    pub embedding_rows: usize,
    pub embedding_dim: usize,
    /// Rows looked up per step.
    pub batch_size: usize,
    pub projection_rows: usize,
    pub seed: Option<u64>,
    pub embedding: ParamGroupSpec,
    pub projection: ParamGroupSpec,
}

impl Default for TrainingSpec {
    fn default() -> Self {
        Self {
            steps: 500,
            embedding_rows: 10_000,
            embedding_dim: 32,
            batch_size: 256,
            projection_rows: 64,
            seed: None,
            embedding: ParamGroupSpec::default(),
            projection: ParamGroupSpec::default(),
        }
    }
}
