use std::{error::Error, fmt};

/// The crate's result type.
pub type Result<T> = std::result::Result<T, OptimizerErr>;

/// Failures raised while building or stepping the optimizer and its sketches.
///
/// Numerical hazards are never reported here: every denominator carries an
/// epsilon, and a non-coalesced sparse gradient is a caller contract violation
/// rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizerErr {
    InvalidLearningRate(f32),
    InvalidEpsilon(f32),
    InvalidBeta {
        index: usize,
        value: f32,
    },
    InvalidDecay(f32),
    InvalidSizeFraction(f32),
    /// A sketch or compressor was asked to hold zero lanes per row.
    InvalidDepth,
    SizeMismatch {
        expected: usize,
        got: usize,
    },
    LaneOutOfRange {
        lane: usize,
        depth: usize,
    },
    KeyOutOfRange {
        key: i64,
        rows: usize,
    },
    /// A parameter resolved to one gradient layout and later received the other.
    GradientKindChanged {
        param: String,
    },
    /// The cell count of a `rows × range × depth` table doesn't fit in memory.
    CapacityOverflow {
        rows: usize,
        range: usize,
        depth: usize,
    },
    InvalidSnapshot(String),
}

impl fmt::Display for OptimizerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLearningRate(lr) => write!(f, "invalid learning rate: {lr}"),
            Self::InvalidEpsilon(eps) => write!(f, "invalid epsilon value: {eps}"),
            Self::InvalidBeta { index, value } => {
                write!(f, "invalid beta parameter at index {index}: {value}")
            }
            Self::InvalidDecay(alpha) => {
                write!(f, "invalid decay factor: {alpha}, expected a value in [0, 1)")
            }
            Self::InvalidSizeFraction(fraction) => {
                write!(f, "invalid size fraction: {fraction}, expected a value in [0, 1]")
            }
            Self::InvalidDepth => f.write_str("lane depth must be at least 1"),
            Self::SizeMismatch { expected, got } => {
                write!(f, "size mismatch: expected {expected} values, got {got}")
            }
            Self::LaneOutOfRange { lane, depth } => {
                write!(f, "lane {lane} out of range for depth {depth}")
            }
            Self::KeyOutOfRange { key, rows } => {
                write!(f, "key {key} out of range for a table of {rows} rows")
            }
            Self::GradientKindChanged { param } => write!(
                f,
                "parameter {param} switched between dense and sparse gradients"
            ),
            Self::CapacityOverflow { rows, range, depth } => write!(
                f,
                "a table of {rows} rows, {range} buckets and {depth} lanes overflows"
            ),
            Self::InvalidSnapshot(msg) => write!(f, "invalid snapshot: {msg}"),
        }
    }
}

impl Error for OptimizerErr {}
