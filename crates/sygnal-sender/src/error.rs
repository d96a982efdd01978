//! Error types for the sender.

use thiserror::Error;

use sygnal_core::{Device, SygnalError};

/// Invalid hyperparameters. Raised by [`crate::Sender::new`], never while decoding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("vocab_size ({vocab_size}) must equal {expected_name} ({expected}) when using {mode}")]
    VocabSizeMismatch {
        vocab_size: usize,
        expected: usize,
        expected_name: &'static str,
        mode: &'static str,
    },

    #[error("Sender case with cell_type '{0}' is undefined")]
    UnsupportedCell(String),

    #[error("Inconsistent strategy flags: {0}")]
    InconsistentFlags(&'static str),

    #[error("{name} must be greater than zero")]
    ZeroDimension { name: &'static str },

    #[error("{name} ({id}) is out of range for vocab_size {vocab_size}")]
    SymbolOutOfRange {
        name: &'static str,
        id: usize,
        vocab_size: usize,
    },

    #[error("Temperature must be finite and positive, got {0}")]
    InvalidTemperature(f32),

    #[error("Commitment weight must be finite and non-negative, got {0}")]
    InvalidBeta(f32),

    #[error("Device {0} is not available: the tensor engine is CPU-only")]
    UnsupportedDevice(Device),
}

/// Umbrella error for fallible sender entry points outside the decode loop.
#[derive(Error, Debug)]
pub enum SenderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tensor(#[from] SygnalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),
}
