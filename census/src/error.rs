//! Error types for census operations.

use alloy_primitives::Address;
use leanimt::{LeanImtError, StoreError};
use thiserror::Error;

/// Errors from census operations.
#[derive(Debug, Error)]
pub enum CensusError {
    #[error("address {0} already exists in census")]
    AddressAlreadyExists(Address),
    #[error("address {0} not found in census")]
    AddressNotFound(Address),
    #[error("address {0} is repeated in the batch")]
    DuplicateAddress(Address),
    #[error("weight exceeds 88 bits")]
    WeightOverflow,
    #[error("addresses and weights do not correspond")]
    LengthMismatch,
    #[error("census data corruption detected: {0}")]
    DataCorruption(String),
    #[error("census is empty")]
    EmptyCensus,
    #[error("invalid census dump: {0}")]
    BadCensusDump(String),
    #[error(transparent)]
    Tree(#[from] LeanImtError),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
