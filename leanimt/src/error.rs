//! Error types for LeanIMT operations.

use thiserror::Error;

use crate::store::StoreError;

/// Error reported by a leaf encoder or decoder.
#[derive(Debug, Clone, Error)]
#[error("codec error: {0}")]
pub struct CodecError(pub String);

impl CodecError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors from LeanIMT operations.
#[derive(Debug, Error)]
pub enum LeanImtError {
    #[error("leaf index {index} is out of range for size {size}")]
    IndexOutOfRange { index: usize, size: usize },
    #[error("leaf index {0} is repeated")]
    DuplicateIndex(usize),
    #[error("there are no leaves to insert")]
    EmptyBatch,
    #[error("indices and leaves do not correspond: {indices} != {leaves}")]
    LengthMismatch { indices: usize, leaves: usize },
    #[error("corrupted data: {0}")]
    CorruptedData(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
