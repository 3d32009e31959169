/// Error types shared by every kernel.
///
/// Kernels never recover from an error: each variant is fatal to the call
/// and propagates to the caller unmodified.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, KernelError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    /// Unrecognized mode string for batchnorm/dropout configuration.
    #[error("Invalid forward mode \"{mode}\" (expected \"train\" or \"test\")")]
    InvalidMode { mode: String },

    /// Incompatible tensor shapes in an operation.
    #[error("Shape mismatch in {op}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Tensor has the wrong number of dimensions.
    #[error("{op} expects a rank-{expected} tensor, got shape {shape:?}")]
    RankMismatch {
        op: &'static str,
        expected: usize,
        shape: Vec<usize>,
    },

    /// Flat buffer length disagrees with the requested shape.
    #[error("Data length {len} does not match shape {shape:?}")]
    DataLength { len: usize, shape: Vec<usize> },

    /// Class label outside [0, C).
    #[error("Label {label} at row {index} out of range for {classes} classes")]
    LabelOutOfRange {
        index: usize,
        label: usize,
        classes: usize,
    },

    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument { arg: &'static str, reason: String },

    /// Malformed configuration record.
    #[error("Config error: {0}")]
    Config(String),
}

impl KernelError {
    pub fn shape_mismatch(op: &'static str, expected: &[usize], got: &[usize]) -> Self {
        KernelError::ShapeMismatch {
            op,
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        KernelError::InvalidArgument { arg, reason: reason.into() }
    }
}
