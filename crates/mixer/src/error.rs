//! Error types for the mixing service.

use ringvrm_crypto::CryptoError;
use thiserror::Error;

/// Errors that can occur in the mixing service
#[derive(Error, Debug)]
pub enum MixerError {
    /// Pool id is unknown or the pool has expired
    #[error("Pool not found: {0}")]
    PoolNotFound(String),

    /// Pool exists but no longer accepts joins
    #[error("Pool not accepting joins: {0}")]
    PoolNotAccepting(String),

    /// Requested amount is outside the pool's bounds
    #[error("Amount out of range: {0}")]
    AmountOutOfRange(String),

    /// Key image was already spent through this service
    #[error("Duplicate key image: {0}")]
    DuplicateKeyImage(String),

    /// Mix depth is outside the configured limits
    #[error("Invalid mix depth: {0}")]
    InvalidMixDepth(String),

    /// Request is structurally invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Transaction id is unknown
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Ring signature layer rejected the request
    #[error("Ring signature error: {0}")]
    Crypto(#[from] CryptoError),
}

pub type Result<T> = std::result::Result<T, MixerError>;
