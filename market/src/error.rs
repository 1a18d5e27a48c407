use thiserror::Error;

use crate::metric::ExpressionError;

#[derive(Error, Debug, PartialEq)]
pub enum MarketError {
    #[error("index {index} out of range for logical length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("range [{lo}, {hi}) is invalid for logical length {len}")]
    InvalidRange { lo: usize, hi: usize, len: usize },

    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("scale {scale:?} is not supported by the {metric} metric")]
    UnsupportedScale { metric: &'static str, scale: crate::metric::Scale },

    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("instrument {0} is already registered")]
    DuplicateInstrument(String),

    #[error("no usable historical rows for {0}")]
    EmptyHistory(String),

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}
