use thiserror::Error;

use crate::DType;

/// Runtime tensor errors.
#[derive(Error, Debug)]
pub enum SygnalError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Invalid axis {axis} for tensor with {ndim} dimensions")]
    InvalidAxis { axis: usize, ndim: usize },

    #[error("DType mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    #[error("Expected {expected} elements for shape {shape:?}, got {got}")]
    ElementCount {
        expected: usize,
        got: usize,
        shape: Vec<usize>,
    },

    #[error("Operation not supported for dtype {0}")]
    UnsupportedDType(DType),

    #[error("Storage error: {0}")]
    StorageError(String),
}
